//! Item labels and localized menu vocabulary.
//!
//! Host labels carry private-use glyphs (HQ and collectable markers), control
//! characters, and leading decoration. Everything that keys on an item name
//! (catalog lookup, reports, sales) goes through [`clean_item_name`] first.

/// HQ marker glyph.
pub const HQ_GLYPH: char = '\u{E03C}';
/// Collectable marker glyph.
pub const COLLECTABLE_GLYPH: char = '\u{E03B}';

pub const UNKNOWN_ITEM: &str = "Unknown Item";

/// Menu entry fragments meaning "adjust price" across client languages.
pub const PRICE_TERMS: &[&str] = &["price", "preis", "価格", "prix"];

/// Menu entry fragments meaning "return"/"take back".
pub const RETURN_TERMS: &[&str] = &["return", "take", "rückgabe", "mettre", "戻す"];

pub const TO_SELLER_TERMS: &[&str] = &["retainer", "gehilfen", "servant", "リテイナー"];
pub const TO_INVENTORY_TERMS: &[&str] = &["inventory", "besitz", "inventaire", "所持品"];

/// Where an unlisted item goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnlistDestination {
    Inventory,
    Seller,
}

impl UnlistDestination {
    fn terms(self) -> &'static [&'static str] {
        match self {
            UnlistDestination::Inventory => TO_INVENTORY_TERMS,
            UnlistDestination::Seller => TO_SELLER_TERMS,
        }
    }
}

/// Strip glyphs, control characters and leading decoration from a label.
pub fn clean_item_name(raw: &str) -> String {
    let stripped: String = raw
        .chars()
        .filter(|&c| !c.is_control() && c != HQ_GLYPH && c != COLLECTABLE_GLYPH)
        .collect();

    let trimmed = stripped
        .trim_start_matches(|c: char| !(c.is_alphanumeric() || matches!(c, '(' | '[' | '{' | '<')))
        .trim();

    if trimmed.is_empty() {
        UNKNOWN_ITEM.to_string()
    } else {
        trimmed.to_string()
    }
}

pub fn is_hq_label(raw: &str) -> bool {
    raw.contains(HQ_GLYPH)
}

/// Index of the first menu entry that adjusts the price.
pub fn find_price_entry(entries: &[String]) -> Option<usize> {
    entries.iter().position(|e| {
        let lower = e.to_lowercase();
        PRICE_TERMS.iter().any(|t| lower.contains(t))
    })
}

/// Index of the first menu entry that returns the item to `dest`.
pub fn find_unlist_entry(entries: &[String], dest: UnlistDestination) -> Option<usize> {
    entries.iter().position(|e| {
        let lower = e.to_lowercase();
        RETURN_TERMS.iter().any(|t| lower.contains(t))
            && dest.terms().iter().any(|t| lower.contains(t))
    })
}
