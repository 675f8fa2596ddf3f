//! Sales ledger: parses "item sold" system messages.

use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::OnceLock;
use tracing::debug;

use crate::items::{clean_item_name, is_hq_label};
use crate::types::SaleRecord;

fn sale_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)sale in the (?<city>.+) markets sold for (?<price>[\d,.]+) gil")
            .unwrap_or_else(|e| panic!("invalid sale pattern: {e}"))
    })
}

/// Parse a system message such as
/// `"The Cobalt Ingot you put up for sale in the Limsa Lominsa markets sold for 1,234 gil."`
///
/// Returns `None` for anything that is not a sale notice.
pub fn parse_sale(text: &str, at: DateTime<Utc>) -> Option<SaleRecord> {
    if !text.to_lowercase().contains("sold for") {
        return None;
    }

    let caps = sale_pattern().captures(text)?;
    let whole = caps.get(0)?;

    let mut prefix = &text[..whole.start()];
    if prefix.get(..4).is_some_and(|p| p.eq_ignore_ascii_case("the ")) {
        prefix = &prefix[4..];
    }
    let raw_item = match find_ignore_ascii_case(prefix, " you put up") {
        Some(idx) if idx > 0 => &prefix[..idx],
        _ => prefix,
    }
    .trim();

    let digits: String = caps["price"].chars().filter(char::is_ascii_digit).collect();
    let price: u64 = digits.parse().ok()?;

    let record = SaleRecord {
        item_name: clean_item_name(raw_item),
        price,
        is_hq: is_hq_label(raw_item) || text.contains("(HQ)"),
        city: caps["city"].to_string(),
        timestamp: at,
    };
    debug!(item = %record.item_name, price, city = %record.city, "Parsed sale");
    Some(record)
}

/// Byte offset of the first ASCII-case-insensitive match of `needle`.
/// Only char boundaries are tried, so the offset is always sliceable.
fn find_ignore_ascii_case(haystack: &str, needle: &str) -> Option<usize> {
    haystack.char_indices().map(|(i, _)| i).find(|&i| {
        haystack.get(i..i + needle.len()).is_some_and(|s| s.eq_ignore_ascii_case(needle))
    })
}
