//! Shared types for the PINCH automation core.
//!
//! These types form the data model used across all modules. They are kept
//! free of behaviour beyond small helpers so that the pricing, scheduling,
//! and orchestration layers can depend on them without cycles.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Catalog identity of a tradeable item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemId(pub u32);

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identity of the seller that owns a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SellerId(pub u64);

// ---------------------------------------------------------------------------
// Market observations
// ---------------------------------------------------------------------------

/// One competing sell offer as seen in a market query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingObservation {
    pub item_id: ItemId,
    pub price_per_unit: u32,
    pub quantity: u32,
    pub is_hq: bool,
    pub seller_id: SellerId,
    /// Position of the listing in the snapshot as presented to the user.
    pub rank: usize,
}

/// A full response to one market query, ascending by price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub request_id: u64,
    /// Item the snapshot describes; `None` when the query returned nothing.
    pub item_id: Option<ItemId>,
    pub listings: Vec<ListingObservation>,
}

impl MarketSnapshot {
    /// Whether this snapshot can be used for the item currently handled.
    /// An unknown identity on either side is accepted.
    pub fn applies_to(&self, item: Option<ItemId>) -> bool {
        match (self.item_id, item) {
            (Some(snapshot_item), Some(wanted)) => snapshot_item == wanted,
            _ => true,
        }
    }
}

// ---------------------------------------------------------------------------
// Pricing decisions
// ---------------------------------------------------------------------------

/// What to do with a single listing after evaluating the market.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PriceOutcome {
    /// Set the listing to this price.
    Apply(u32),
    /// The computed price equals the current one.
    SkipOptimal,
    /// Per-item policy says leave it alone.
    SkipIgnored,
    /// No comparable listings.
    SkipNoData,
    /// The change would exceed the configured maximum cut.
    SkipPolicyLimit,
    /// External state could not be interpreted.
    Error(String),
}

impl PriceOutcome {
    pub fn is_apply(&self) -> bool {
        matches!(self, PriceOutcome::Apply(_))
    }

    /// Fault behind a skip or error outcome. `None` when nothing went wrong.
    pub fn fault(&self) -> Option<FaultKind> {
        match self {
            PriceOutcome::Apply(_) | PriceOutcome::SkipOptimal => None,
            PriceOutcome::SkipIgnored | PriceOutcome::SkipPolicyLimit => Some(FaultKind::PolicyRejected),
            PriceOutcome::SkipNoData => Some(FaultKind::DataUnavailable),
            PriceOutcome::Error(_) => Some(FaultKind::Malformed),
        }
    }

    /// Human-readable reason used in sweep reports for non-apply outcomes.
    pub fn reason(&self) -> &str {
        match self {
            PriceOutcome::Apply(_) => "Price adjusted.",
            PriceOutcome::SkipOptimal => "Price already optimal.",
            PriceOutcome::SkipIgnored => "Item Ignored (Config).",
            PriceOutcome::SkipNoData => "No market data / No competition.",
            PriceOutcome::SkipPolicyLimit => "Cut limit exceeded.",
            PriceOutcome::Error(reason) => reason,
        }
    }
}

impl fmt::Display for PriceOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PriceOutcome::Apply(p) => write!(f, "APPLY {p}"),
            PriceOutcome::SkipOptimal => write!(f, "SKIP (optimal)"),
            PriceOutcome::SkipIgnored => write!(f, "SKIP (ignored)"),
            PriceOutcome::SkipNoData => write!(f, "SKIP (no data)"),
            PriceOutcome::SkipPolicyLimit => write!(f, "SKIP (cut limit)"),
            PriceOutcome::Error(e) => write!(f, "ERROR ({e})"),
        }
    }
}

/// Listing skipped as bait during outlier detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutlierSkip {
    /// Rank of the cheapest skipped listing.
    pub bait_rank: usize,
    /// How many listings were walked past.
    pub skipped: usize,
}

/// Result of evaluating one item against the market.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceDecision {
    pub outcome: PriceOutcome,
    pub old_price: Option<u32>,
    pub item_label: String,
    /// Price of the listing the candidate was derived from.
    pub reference_price: Option<u32>,
    pub outlier: Option<OutlierSkip>,
}

impl fmt::Display for PriceDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.old_price {
            Some(old) => write!(f, "{}: {} (was {old})", self.item_label, self.outcome),
            None => write!(f, "{}: {}", self.item_label, self.outcome),
        }
    }
}

/// Per-item override keyed by item identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemPolicy {
    /// Never price below this. Zero disables the floor.
    #[serde(default)]
    pub min_price: u32,
    #[serde(default)]
    pub ignore: bool,
    /// Match the lowest listing instead of undercutting it.
    #[serde(default)]
    pub match_only: bool,
}

// ---------------------------------------------------------------------------
// Lifetime statistics
// ---------------------------------------------------------------------------

/// One completed sale, parsed from a system message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleRecord {
    pub item_name: String,
    pub price: u64,
    pub is_hq: bool,
    pub city: String,
    pub timestamp: DateTime<Utc>,
}

/// Maximum number of sales kept in the rolling history.
pub const MAX_SALES_HISTORY: usize = 100;

/// Counters that outlive a single sweep.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LifetimeStats {
    pub total_undercuts_made: u64,
    pub total_gil_earned: u64,
    pub total_items_sold: u64,
    #[serde(default)]
    pub sales_history: Vec<SaleRecord>,
}

impl fmt::Display for LifetimeStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "undercuts={} | sold={} | earned={} gil",
            self.total_undercuts_made, self.total_items_sold, self.total_gil_earned,
        )
    }
}

impl LifetimeStats {
    /// Record a sale, trimming the history to the newest entries.
    pub fn record_sale(&mut self, sale: SaleRecord) {
        self.total_gil_earned += sale.price;
        self.total_items_sold += 1;
        self.sales_history.push(sale);
        self.trim_history();
    }

    /// Drop the oldest sales beyond [`MAX_SALES_HISTORY`]. Returns how many
    /// were dropped.
    pub fn trim_history(&mut self) -> usize {
        let excess = self.sales_history.len().saturating_sub(MAX_SALES_HISTORY);
        self.sales_history.drain(..excess);
        excess
    }
}

// ---------------------------------------------------------------------------
// Fault taxonomy
// ---------------------------------------------------------------------------

/// Classification of everything that can go wrong while handling an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FaultKind {
    /// Target surface absent or closed. Always retried.
    NotReady,
    /// Waited past a bounded threshold.
    Timeout,
    /// Computed price violates a safety bound.
    PolicyRejected,
    /// No usable listings.
    DataUnavailable,
    /// Unexpected or unreadable external state.
    Malformed,
    /// Ends the whole chain.
    Fatal,
}

impl FaultKind {
    /// Whether this fault is reported as an error rather than a skip.
    pub fn is_error(&self) -> bool {
        matches!(self, FaultKind::Malformed | FaultKind::Fatal)
    }
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultKind::NotReady => write!(f, "not ready"),
            FaultKind::Timeout => write!(f, "timeout"),
            FaultKind::PolicyRejected => write!(f, "policy rejected"),
            FaultKind::DataUnavailable => write!(f, "data unavailable"),
            FaultKind::Malformed => write!(f, "malformed"),
            FaultKind::Fatal => write!(f, "fatal"),
        }
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for PINCH.
#[derive(Debug, thiserror::Error)]
pub enum PinchError {
    #[error("An operation is already running")]
    Busy,

    #[error("Surface not ready: {0}")]
    NotReady(crate::ports::Surface),

    #[error("All sellers are disabled in the configuration")]
    AllSellersDisabled,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
