//! Per-sweep statistics and the report rendered from them.

use rust_decimal::Decimal;
use std::fmt::Write as _;

use crate::notify::group_thousands;
use crate::pricing::cut_percent;
use crate::types::FaultKind;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEntry {
    pub item: String,
    pub old_price: u32,
    pub new_price: u32,
    /// Absolute change in percent, two decimals.
    pub change_pct: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkipEntry {
    pub item: String,
    pub reason: String,
    /// `None` for listings left alone because they were already optimal.
    pub fault: Option<FaultKind>,
}

/// Finished report for one seller (or one sell list).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SweepReport {
    pub seller_label: String,
    pub changes: Vec<ChangeEntry>,
    pub skips: Vec<SkipEntry>,
    pub errors: Vec<SkipEntry>,
}

impl SweepReport {
    pub fn total_checked(&self) -> usize {
        self.changes.len() + self.skips.len() + self.errors.len()
    }

    /// Number of entries caused by `kind`.
    pub fn fault_count(&self, kind: FaultKind) -> usize {
        self.skips.iter().chain(&self.errors).filter(|e| e.fault == Some(kind)).count()
    }

    /// Markdown rendering used by log and webhook sinks.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let unchanged = self.skips.len() + self.errors.len();
        let _ = writeln!(
            out,
            "📊 **Summary**: {} items | ✅ {} adjusted | ⏭️ {} unchanged",
            self.total_checked(),
            self.changes.len(),
            unchanged
        );
        out.push('\n');

        if !self.changes.is_empty() {
            out.push_str("**PRICE ADJUSTMENTS**\n");
            for c in &self.changes {
                let _ = writeln!(
                    out,
                    "• **{}**: ~~{}~~ → **{}** `({:.2}%)`",
                    c.item,
                    group_thousands(c.old_price as u64),
                    group_thousands(c.new_price as u64),
                    c.change_pct
                );
            }
            out.push('\n');
        }

        if unchanged > 0 {
            out.push_str("**UNCHANGED / SKIPPED**\n");
            for s in &self.skips {
                let _ = writeln!(out, "• {}: *{}*", s.item, s.reason);
            }
            for e in &self.errors {
                let _ = writeln!(out, "• ⚠️ {}: *{}*", e.item, e.reason);
            }
        }

        out
    }
}

/// Accumulates outcomes while a sweep is running.
#[derive(Debug, Clone, Default)]
pub struct OperationStats {
    report: SweepReport,
}

impl OperationStats {
    pub fn new(seller_label: impl Into<String>) -> Self {
        Self { report: SweepReport { seller_label: seller_label.into(), ..Default::default() } }
    }

    pub fn add_change(&mut self, item: &str, old_price: u32, new_price: u32) {
        self.report.changes.push(ChangeEntry {
            item: item.to_string(),
            old_price,
            new_price,
            change_pct: cut_percent(old_price, new_price).abs().round_dp(2),
        });
    }

    /// Listing checked and left as it was.
    pub fn add_skip(&mut self, item: &str, reason: &str) {
        self.report.skips.push(SkipEntry { item: item.to_string(), reason: reason.to_string(), fault: None });
    }

    /// Listing abandoned because of `kind`. Malformed and fatal faults are
    /// reported as errors, the rest as skips.
    pub fn add_fault(&mut self, item: &str, kind: FaultKind, reason: &str) {
        let entry = SkipEntry { item: item.to_string(), reason: reason.to_string(), fault: Some(kind) };
        if kind.is_error() {
            self.report.errors.push(entry);
        } else {
            self.report.skips.push(entry);
        }
    }

    pub fn report(&self) -> &SweepReport {
        &self.report
    }

    pub fn finish(self) -> SweepReport {
        self.report
    }
}

/// One-line notice for an applied change, e.g.
/// `Cobalt Ingot: Pinching from 1,000 to 999 gil, a cut of 0.1%`.
pub fn price_change_message(item: &str, old_price: u32, new_price: u32) -> String {
    let direction = if old_price > new_price { "a cut" } else { "an increase" };
    let pct = cut_percent(old_price, new_price).abs().round_dp(2).normalize();
    format!(
        "{item}: Pinching from {} to {} gil, {direction} of {pct}%",
        group_thousands(old_price as u64),
        group_thousands(new_price as u64),
    )
}
