//! Simulated host surface for dry runs and testing.
//!
//! Provides deterministic `UiPort` and `CatalogPort` implementations backed
//! by an in-memory model of sellers, their listings, and the market. All
//! state sits behind a shared handle so that test code can inspect and
//! steer it while the orchestrator owns the port.

use std::cell::{Ref, RefCell, RefMut};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use crate::engine::Orchestrator;
use crate::items::{clean_item_name, find_unlist_entry, UnlistDestination};
use crate::ports::{Action, CatalogEntry, CatalogPort, PriceWindow, Surface, UiPort};
use crate::types::{ItemId, ListingObservation, MarketSnapshot, SellerId};

/// Context menu shown for a normal sell listing.
pub const LISTING_MENU: &[&str] =
    &["Adjust Price", "Return Items to Inventory", "Return Items to Retainer"];

// ---------------------------------------------------------------------------
// Model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimListing {
    /// Raw label, may carry the HQ glyph.
    pub label: String,
    pub item_id: ItemId,
    pub quantity: u32,
    pub price: u32,
    /// Overrides the default context menu when set.
    pub menu: Option<Vec<String>>,
    /// Price field shows nothing readable.
    pub price_hidden: bool,
}

impl SimListing {
    pub fn new(label: &str, item_id: u32, quantity: u32, price: u32) -> Self {
        Self {
            label: label.to_string(),
            item_id: ItemId(item_id),
            quantity,
            price,
            menu: None,
            price_hidden: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimSeller {
    pub name: String,
    pub listings: Vec<SimListing>,
}

impl SimSeller {
    pub fn new(name: &str, listings: Vec<SimListing>) -> Self {
        Self { name: name.to_string(), listings }
    }
}

#[derive(Debug, Default)]
pub struct SimState {
    pub sellers: Vec<SimSeller>,
    /// Competing listings per item, in any order.
    pub market: HashMap<ItemId, Vec<(u32, u32, bool)>>,
    pub visible: HashSet<Surface>,
    pub active_seller: Option<usize>,
    pub menu_target: Option<usize>,
    pub window_target: Option<usize>,
    pub pending_price: Option<u32>,
    /// Answer comparison queries; off simulates a market that never replies.
    pub market_responds: bool,
    /// Show a dialog whenever a seller is selected.
    pub dialogs: bool,
    pub dialogs_advanced: u32,
    pub pending_snapshot: Option<MarketSnapshot>,
    pub next_request_id: u64,
    pub comparisons: u32,
    pub inspected: Vec<usize>,
    pub unlisted: Vec<(String, UnlistDestination)>,
    pub fired: Vec<(Surface, Action)>,
}

impl SimState {
    fn active(&self) -> Option<&SimSeller> {
        self.active_seller.and_then(|i| self.sellers.get(i))
    }

    fn active_mut(&mut self) -> Option<&mut SimSeller> {
        let idx = self.active_seller?;
        self.sellers.get_mut(idx)
    }

    fn listing(&self, idx: Option<usize>) -> Option<&SimListing> {
        self.active().and_then(|s| s.listings.get(idx?))
    }

    fn snapshot_for(&mut self, item_id: ItemId) -> MarketSnapshot {
        self.next_request_id += 1;
        let mut offers = self.market.get(&item_id).cloned().unwrap_or_default();
        offers.sort_by_key(|&(price, _, _)| price);
        let listings = offers
            .into_iter()
            .enumerate()
            .map(|(rank, (price, quantity, is_hq))| ListingObservation {
                item_id,
                price_per_unit: price,
                quantity,
                is_hq,
                seller_id: SellerId(9_000 + rank as u64),
                rank,
            })
            .collect();
        MarketSnapshot { request_id: self.next_request_id, item_id: Some(item_id), listings }
    }

    fn choose_entry(&mut self, entry: usize) -> Option<bool> {
        let target = self.menu_target?;
        let menu = self.menu_for(target);
        let label = menu.get(entry)?.to_lowercase();
        self.visible.remove(&Surface::ContextMenu);

        if label.contains("price") {
            self.window_target = Some(target);
            self.pending_price = None;
            self.visible.insert(Surface::PriceWindow);
            return Some(true);
        }

        let dest = [UnlistDestination::Inventory, UnlistDestination::Seller]
            .into_iter()
            .find(|&d| find_unlist_entry(&menu[entry..=entry], d).is_some())?;
        let seller = self.active_mut()?;
        if target >= seller.listings.len() {
            return Some(false);
        }
        let removed = seller.listings.remove(target);
        self.unlisted.push((removed.label, dest));
        Some(true)
    }

    fn menu_for(&self, idx: usize) -> Vec<String> {
        self.listing(Some(idx))
            .and_then(|l| l.menu.clone())
            .unwrap_or_else(|| LISTING_MENU.iter().map(|s| s.to_string()).collect())
    }
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Shared handle to the simulated host.
#[derive(Debug, Clone, Default)]
pub struct SimHost(Rc<RefCell<SimState>>);

impl SimHost {
    pub fn new(sellers: Vec<SimSeller>) -> Self {
        let state = SimState {
            sellers,
            market_responds: true,
            dialogs: true,
            ..Default::default()
        };
        Self(Rc::new(RefCell::new(state)))
    }

    pub fn state(&self) -> Ref<'_, SimState> {
        self.0.borrow()
    }

    pub fn state_mut(&self) -> RefMut<'_, SimState> {
        self.0.borrow_mut()
    }

    /// Competing offers `(price, quantity, is_hq)` for an item.
    pub fn set_market(&self, item_id: u32, offers: Vec<(u32, u32, bool)>) {
        self.state_mut().market.insert(ItemId(item_id), offers);
    }

    pub fn open_seller_list(&self) {
        self.state_mut().visible.insert(Surface::SellerList);
    }

    /// Open seller `idx`'s sell list directly.
    pub fn open_sell_list(&self, idx: usize) {
        let mut s = self.state_mut();
        s.active_seller = Some(idx);
        s.visible.insert(Surface::SellList);
    }

    pub fn ui(&self) -> Box<dyn UiPort> {
        Box::new(SimUi(self.clone()))
    }

    /// Catalog knowing every item listed by any seller.
    pub fn catalog(&self) -> Box<dyn CatalogPort> {
        let entries = self
            .state()
            .sellers
            .iter()
            .flat_map(|s| s.listings.iter())
            .map(|l| (clean_item_name(&l.label), CatalogEntry { item_id: l.item_id, can_be_hq: true }))
            .collect();
        Box::new(SimCatalog { entries })
    }

    pub fn take_pending_snapshot(&self) -> Option<MarketSnapshot> {
        self.state_mut().pending_snapshot.take()
    }

    /// Listing prices of seller `idx`, in display order.
    pub fn prices(&self, idx: usize) -> Vec<u32> {
        self.state().sellers[idx].listings.iter().map(|l| l.price).collect()
    }

    /// Deliver host events the orchestrator is waiting on.
    pub fn pump(&self, orchestrator: &mut Orchestrator) {
        if let Some(snapshot) = self.take_pending_snapshot() {
            orchestrator.on_market_snapshot(snapshot);
        }
        let dialog = self.state().visible.contains(&Surface::Dialog);
        if dialog {
            orchestrator.on_dialog_shown();
        }
    }
}

// ---------------------------------------------------------------------------
// Ports
// ---------------------------------------------------------------------------

struct SimUi(SimHost);

impl UiPort for SimUi {
    fn is_visible(&self, surface: Surface) -> bool {
        self.0.state().visible.contains(&surface)
    }

    fn close(&mut self, surface: Surface) {
        let mut s = self.0.state_mut();
        s.visible.remove(&surface);
        match surface {
            Surface::ContextMenu => s.menu_target = None,
            Surface::PriceWindow => {
                s.window_target = None;
                s.pending_price = None;
            }
            Surface::SellerMenu => s.active_seller = None,
            _ => {}
        }
    }

    fn fire(&mut self, surface: Surface, action: Action) -> Option<bool> {
        let mut s = self.0.state_mut();
        if !s.visible.contains(&surface) {
            return None;
        }
        s.fired.push((surface, action));

        match (surface, action) {
            (Surface::SellerList, Action::SelectSeller(i)) => {
                if i >= s.sellers.len() {
                    return Some(false);
                }
                s.active_seller = Some(i);
                s.visible.insert(Surface::SellerMenu);
                if s.dialogs {
                    s.visible.insert(Surface::Dialog);
                }
                Some(true)
            }
            (Surface::SellerMenu, Action::OpenSellList) => {
                s.visible.insert(Surface::SellList);
                Some(true)
            }
            (Surface::SellList, Action::OpenListingMenu(i)) => {
                let count = s.active().map_or(0, |seller| seller.listings.len());
                if i >= count {
                    return Some(false);
                }
                s.menu_target = Some(i);
                s.visible.insert(Surface::ContextMenu);
                Some(true)
            }
            (Surface::ContextMenu, Action::ChooseMenuEntry(entry)) => s.choose_entry(entry),
            (Surface::PriceWindow, Action::OpenComparison) => {
                let item_id = s.listing(s.window_target)?.item_id;
                s.comparisons += 1;
                s.visible.insert(Surface::SearchResults);
                if s.market_responds {
                    let snapshot = s.snapshot_for(item_id);
                    s.pending_snapshot = Some(snapshot);
                }
                Some(true)
            }
            (Surface::SearchResults, Action::InspectListing(rank)) => {
                s.inspected.push(rank);
                Some(true)
            }
            (Surface::PriceWindow, Action::ConfirmPrice(accept)) => {
                if accept {
                    let (Some(target), Some(price)) = (s.window_target, s.pending_price) else {
                        return Some(false);
                    };
                    if let Some(listing) = s.active_mut().and_then(|seller| seller.listings.get_mut(target)) {
                        listing.price = price;
                    }
                }
                s.visible.remove(&Surface::PriceWindow);
                s.window_target = None;
                s.pending_price = None;
                Some(true)
            }
            (Surface::Dialog, Action::AdvanceDialog) => {
                s.dialogs_advanced += 1;
                s.visible.remove(&Surface::Dialog);
                Some(true)
            }
            _ => Some(false),
        }
    }

    fn listing_count(&self, surface: Surface) -> usize {
        let s = self.0.state();
        if !s.visible.contains(&surface) {
            return 0;
        }
        match surface {
            Surface::SellerList => s.sellers.len(),
            Surface::SellList => s.active().map_or(0, |seller| seller.listings.len()),
            _ => 0,
        }
    }

    fn seller_names(&self) -> Vec<String> {
        self.0.state().sellers.iter().map(|s| s.name.clone()).collect()
    }

    fn sell_list_owner(&self) -> Option<String> {
        self.0.state().active().map(|s| s.name.clone())
    }

    fn read_price_window(&self) -> Option<PriceWindow> {
        let s = self.0.state();
        if !s.visible.contains(&Surface::PriceWindow) {
            return None;
        }
        let listing = s.listing(s.window_target)?;
        Some(PriceWindow {
            label: listing.label.clone(),
            quantity: listing.quantity,
            asking_price: (!listing.price_hidden).then_some(listing.price),
        })
    }

    fn set_pending_price(&mut self, price: u32) -> bool {
        let mut s = self.0.state_mut();
        if !s.visible.contains(&Surface::PriceWindow) {
            return false;
        }
        s.pending_price = Some(price);
        true
    }

    fn menu_entries(&self) -> Vec<String> {
        let s = self.0.state();
        match (s.visible.contains(&Surface::ContextMenu), s.menu_target) {
            (true, Some(target)) => s.menu_for(target),
            _ => Vec::new(),
        }
    }
}

struct SimCatalog {
    entries: HashMap<String, CatalogEntry>,
}

impl CatalogPort for SimCatalog {
    fn resolve(&self, clean_name: &str) -> Option<CatalogEntry> {
        self.entries.get(clean_name).copied()
    }
}
