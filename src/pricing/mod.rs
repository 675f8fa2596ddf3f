//! Pricing engine: filtering, outlier detection, undercut, and failsafes.
//!
//! Converts a market snapshot for one item into a single price decision.
//! The work is split in two so that a quote can be cached and re-settled
//! against a different current price later in the same sweep:
//!
//! 1. `quote`: everything that only depends on the market and the policy;
//! 2. `settle`: the comparison against the listing's current price.

pub mod filter;
pub mod undercut;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashSet;
use tracing::{debug, warn};

use crate::config::PricingConfig;
use crate::types::{
    ItemId, ListingObservation, OutlierSkip, PriceDecision, PriceOutcome, SellerId,
};

// ---------------------------------------------------------------------------
// Inputs and intermediate results
// ---------------------------------------------------------------------------

/// What is known about the listing being priced.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ItemContext {
    pub label: String,
    /// Catalog identity; `None` when the label could not be resolved.
    pub item_id: Option<ItemId>,
    pub stack_size: u32,
    pub is_hq: bool,
    pub can_be_hq: bool,
    /// Price currently set on the listing.
    pub current_price: Option<u32>,
}

/// Market-derived target price, independent of the current listing price.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quote {
    pub target: u32,
    pub reference_price: u32,
    pub reference_seller: SellerId,
    pub outlier: Option<OutlierSkip>,
}

/// A quote, or the skip outcome that prevented one.
pub type QuoteResult = Result<Quote, PriceOutcome>;

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct PricingEngine {
    config: PricingConfig,
}

impl PricingEngine {
    pub fn new(config: PricingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PricingConfig {
        &self.config
    }

    /// Swap in new settings; takes effect on the next evaluation.
    pub fn set_config(&mut self, config: PricingConfig) {
        self.config = config;
    }

    /// Full evaluation: quote the market, then settle against the item's
    /// current price.
    pub fn evaluate(
        &self,
        observations: &[ListingObservation],
        item: &ItemContext,
        own_sellers: &HashSet<SellerId>,
    ) -> PriceDecision {
        let quote = self.quote(observations, item, own_sellers);
        self.settle(&quote, item)
    }

    /// Compute the target price from the market alone.
    pub fn quote(
        &self,
        observations: &[ListingObservation],
        item: &ItemContext,
        own_sellers: &HashSet<SellerId>,
    ) -> QuoteResult {
        if observations.is_empty() {
            return Err(PriceOutcome::SkipNoData);
        }

        let policy = item.item_id.and_then(|id| self.config.policy_for(id));
        if policy.is_some_and(|p| p.ignore) {
            return Err(PriceOutcome::SkipIgnored);
        }

        let mut candidates: Vec<&ListingObservation> =
            if self.config.match_stack_size && item.stack_size > 1 {
                filter::filter_stack_size(observations, item.stack_size, self.config.max_stack_size)
            } else {
                observations.iter().collect()
            };

        if self.config.hq_only && item.is_hq && item.can_be_hq {
            candidates = filter::filter_hq(candidates);
        }

        if candidates.is_empty() {
            debug!(item = %item.label, "No comparable listings after filtering");
            return Err(PriceOutcome::SkipNoData);
        }

        candidates.sort_by_key(|l| l.price_per_unit);

        let (reference, outlier) =
            filter::select_reference(&candidates, self.config.outlier_protection)
                .ok_or(PriceOutcome::SkipNoData)?;

        let lowest = reference.price_per_unit;
        let own_listing = own_sellers.contains(&reference.seller_id);

        let mut target = undercut::candidate_price(lowest, own_listing, policy, &self.config);

        if let Some(min) = policy.map(|p| p.min_price).filter(|&m| m > 0) {
            if target < min {
                debug!(item = %item.label, target, min, "Raising candidate to item floor");
                target = min;
            }
        }

        let target = target.min(lowest).max(1);

        debug!(
            item = %item.label,
            lowest,
            target,
            own_listing,
            candidates = candidates.len(),
            "Quote computed"
        );

        Ok(Quote { target, reference_price: lowest, reference_seller: reference.seller_id, outlier })
    }

    /// Compare a quote with the listing's current price.
    pub fn settle(&self, quote: &QuoteResult, item: &ItemContext) -> PriceDecision {
        let (outcome, reference_price, outlier) = match quote {
            Err(skip) => (skip.clone(), None, None),
            Ok(q) => (self.compare(q.target, item), Some(q.reference_price), q.outlier),
        };

        PriceDecision {
            outcome,
            old_price: item.current_price,
            item_label: item.label.clone(),
            reference_price,
            outlier,
        }
    }

    fn compare(&self, target: u32, item: &ItemContext) -> PriceOutcome {
        let current = match item.current_price {
            Some(p) if p > 0 => p,
            _ => return PriceOutcome::Error("Could not read current price.".to_string()),
        };

        let change = cut_percent(current, target);
        if change < -self.config.max_cut_pct {
            warn!(
                item = %item.label,
                current,
                target,
                change = %change.round_dp(2),
                max_cut = %self.config.max_cut_pct,
                "Cut exceeds configured maximum"
            );
            return PriceOutcome::SkipPolicyLimit;
        }

        if target == current {
            PriceOutcome::SkipOptimal
        } else {
            PriceOutcome::Apply(target)
        }
    }
}

/// Signed relative change from `old` to `new` in percent; negative is a cut.
pub fn cut_percent(old: u32, new: u32) -> Decimal {
    if old == 0 {
        return Decimal::ZERO;
    }
    (Decimal::from(new) - Decimal::from(old)) / Decimal::from(old) * dec!(100)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
