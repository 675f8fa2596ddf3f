//! Candidate price computation.
//!
//! Turns the reference listing's price into the price we want to list at:
//! match or undercut depending on policy, then optional cosmetic rounding.

use crate::config::{PricingConfig, PricingMode, UndercutMode};
use crate::types::ItemPolicy;

/// Candidate before floors and the reference ceiling are applied.
///
/// - the reference belongs to one of our own sellers and self-undercut is
///   off, or the mode is `PoliteMatch`, or the item is match-only → `lowest`;
/// - otherwise the configured fixed or percentage undercut, floored at 1.
pub fn candidate_price(
    lowest: u32,
    own_listing: bool,
    policy: Option<&ItemPolicy>,
    config: &PricingConfig,
) -> u32 {
    let matching = (own_listing && !config.undercut_self)
        || config.mode == PricingMode::PoliteMatch
        || policy.is_some_and(|p| p.match_only);

    let price = if matching {
        lowest
    } else {
        match config.undercut_mode {
            UndercutMode::Fixed => lowest.saturating_sub(config.undercut_amount.max(1)),
            UndercutMode::Percentage => {
                let pct = config.undercut_amount.clamp(1, 99) as u64;
                (lowest as u64 * (100 - pct) / 100) as u32
            }
        }
    };

    let price = price.max(1);
    if config.mode == PricingMode::CleanNumbers {
        clean_number(price)
    } else {
        price
    }
}

/// Round down to a tidy figure depending on magnitude.
pub fn clean_number(price: u32) -> u32 {
    let rounded = if price > 100_000 {
        price / 1000 * 1000
    } else if price > 10_000 {
        price / 100 * 100
    } else if price > 1000 {
        price / 50 * 50
    } else {
        price
    };
    rounded.max(1)
}
