//! Ports to the host environment.
//!
//! The automation core never touches the host UI, item catalog, or report
//! delivery directly. It talks to them through the traits below, which the
//! host (or `crate::sim` in dry runs and tests) implements. Every method is
//! synchronous and returns a neutral "not ready" value instead of failing
//! when the surface in question is absent.

use std::fmt;

use crate::engine::report::SweepReport;
use crate::types::{ItemId, LifetimeStats, SaleRecord};

// ---------------------------------------------------------------------------
// UI vocabulary
// ---------------------------------------------------------------------------

/// Host windows the automation interacts with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Surface {
    /// List of the user's sellers.
    SellerList,
    /// Per-seller menu shown after selecting a seller.
    SellerMenu,
    /// A seller's current sell listings.
    SellList,
    /// Context menu opened on a listing.
    ContextMenu,
    /// Price adjustment window for one listing.
    PriceWindow,
    /// Market comparison results.
    SearchResults,
    /// Conversation dialog shown when a seller is summoned.
    Dialog,
}

impl fmt::Display for Surface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Surface::SellerList => "seller list",
            Surface::SellerMenu => "seller menu",
            Surface::SellList => "sell list",
            Surface::ContextMenu => "context menu",
            Surface::PriceWindow => "price window",
            Surface::SearchResults => "search results",
            Surface::Dialog => "dialog",
        };
        write!(f, "{name}")
    }
}

/// Actions fired against a surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    SelectSeller(usize),
    OpenSellList,
    OpenListingMenu(usize),
    ChooseMenuEntry(usize),
    OpenComparison,
    InspectListing(usize),
    /// `true` confirms the pending price, `false` cancels.
    ConfirmPrice(bool),
    AdvanceDialog,
}

/// Contents of the price adjustment window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceWindow {
    /// Raw item label, possibly carrying glyphs.
    pub label: String,
    pub quantity: u32,
    /// `None` when the price field could not be read.
    pub asking_price: Option<u32>,
}

/// UI query and action port.
pub trait UiPort {
    fn is_visible(&self, surface: Surface) -> bool;

    fn close(&mut self, surface: Surface);

    /// Fire an action. `None` means the surface is not present or ready,
    /// `Some(false)` means it refused the action.
    fn fire(&mut self, surface: Surface, action: Action) -> Option<bool>;

    /// Number of rows on a list surface, zero when absent.
    fn listing_count(&self, surface: Surface) -> usize;

    /// Names shown on the seller list, in display order.
    fn seller_names(&self) -> Vec<String>;

    /// Name of the seller whose sell list is open.
    fn sell_list_owner(&self) -> Option<String>;

    fn read_price_window(&self) -> Option<PriceWindow>;

    /// Write a price into the price window without confirming it.
    fn set_pending_price(&mut self, price: u32) -> bool;

    /// Entry labels of the open context menu.
    fn menu_entries(&self) -> Vec<String>;
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// Catalog row for an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogEntry {
    pub item_id: ItemId,
    pub can_be_hq: bool,
}

/// Item-name lookup service.
pub trait CatalogPort {
    /// Resolve a cleaned item name.
    fn resolve(&self, clean_name: &str) -> Option<CatalogEntry>;
}

/// Catalog that knows nothing; every item prices on its raw label.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyCatalog;

impl CatalogPort for EmptyCatalog {
    fn resolve(&self, _clean_name: &str) -> Option<CatalogEntry> {
        None
    }
}

// ---------------------------------------------------------------------------
// Report sink
// ---------------------------------------------------------------------------

/// Receives finished reports and notices. Delivery is the sink's business;
/// implementations must not block.
#[cfg_attr(test, mockall::automock)]
pub trait ReportSink {
    /// Hand over a finished sweep report.
    fn flush(&self, report: SweepReport);

    /// Short lifecycle notice ("started", "finished", safety aborts).
    fn notice(&self, message: &str);

    /// Emergency alert raised by an incoming direct message.
    fn alert(&self, sender: &str, message: &str);

    /// A sale was recorded.
    fn sale(&self, _sale: &SaleRecord, _lifetime: &LifetimeStats) {}
}

/// Sink that forwards everything to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl ReportSink for LogSink {
    fn flush(&self, report: SweepReport) {
        tracing::info!(
            seller = %report.seller_label,
            changes = report.changes.len(),
            skips = report.skips.len(),
            errors = report.errors.len(),
            "Sweep report\n{}",
            report.render()
        );
    }

    fn notice(&self, message: &str) {
        tracing::info!("{message}");
    }

    fn alert(&self, sender: &str, message: &str) {
        tracing::warn!(sender, message, "Emergency stop");
    }

    fn sale(&self, sale: &SaleRecord, lifetime: &LifetimeStats) {
        tracing::info!(
            item = %sale.item_name,
            price = sale.price,
            city = %sale.city,
            lifetime = %lifetime,
            "Item sold"
        );
    }
}
