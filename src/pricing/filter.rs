//! Candidate filtering and reference-listing selection.
//!
//! Narrows a raw market snapshot down to the listings that are actually
//! comparable with the item being priced, then picks the listing to price
//! against, walking past suspected bait.

use tracing::debug;

use crate::types::{ListingObservation, OutlierSkip};

/// Keep listings whose stack is at least half of ours, or a full stack.
/// Falls back to every listing when nothing survives: a wrong-sized listing
/// is still better than no data.
pub fn filter_stack_size<'a>(
    listings: &'a [ListingObservation],
    stack_size: u32,
    max_stack_size: u32,
) -> Vec<&'a ListingObservation> {
    let kept: Vec<_> = listings
        .iter()
        .filter(|l| l.quantity as u64 * 2 >= stack_size as u64 || l.quantity == max_stack_size)
        .collect();

    if kept.is_empty() {
        debug!(stack_size, total = listings.len(), "Stack filter emptied set, using all listings");
        listings.iter().collect()
    } else {
        kept
    }
}

/// Keep HQ listings only. May return an empty set.
pub fn filter_hq<'a>(listings: Vec<&'a ListingObservation>) -> Vec<&'a ListingObservation> {
    listings.into_iter().filter(|l| l.is_hq).collect()
}

/// Pick the reference listing from price-sorted candidates.
///
/// With outlier protection on, a listing priced under half of the next one
/// is treated as bait and skipped; the walk continues while that holds and
/// stops at the first non-outlier pair.
pub fn select_reference<'a>(
    sorted: &[&'a ListingObservation],
    outlier_protection: bool,
) -> Option<(&'a ListingObservation, Option<OutlierSkip>)> {
    let first = *sorted.first()?;
    if !outlier_protection {
        return Some((first, None));
    }

    let mut idx = 0;
    while idx + 1 < sorted.len()
        && (sorted[idx].price_per_unit as u64) * 2 < sorted[idx + 1].price_per_unit as u64
    {
        idx += 1;
    }

    let outlier = (idx > 0).then(|| OutlierSkip { bait_rank: first.rank, skipped: idx });
    if let Some(skip) = outlier {
        debug!(
            bait_rank = skip.bait_rank,
            bait_price = first.price_per_unit,
            reference_price = sorted[idx].price_per_unit,
            skipped = skip.skipped,
            "Outlier listing skipped"
        );
    }

    Some((sorted[idx], outlier))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
