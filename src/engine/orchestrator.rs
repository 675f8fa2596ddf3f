//! Sweep orchestrator.
//!
//! Owns the task scheduler and everything the steps operate on. The host
//! drives it by calling [`Orchestrator::tick`] once per frame and forwards
//! its events (market results, pointer samples, chat messages, dialogs)
//! through the `on_*` methods.
//!
//! Three sweeps are supported:
//! - seller sweep: every enabled seller, one after another;
//! - sell-list sweep: the sell list that is currently open;
//! - bulk unlist: return every listing to the inventory or the seller.

use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use std::time::Duration;
use tracing::{error, info, warn};

use super::chain;
use super::report::OperationStats;
use super::safety::PointerMonitor;
use crate::config::AppConfig;
use crate::humanize::HumanizationPolicy;
use crate::items::UnlistDestination;
use crate::ports::{Action, CatalogPort, ReportSink, Surface, UiPort};
use crate::pricing::{ItemContext, PricingEngine, Quote, QuoteResult};
use crate::sales::parse_sale;
use crate::scheduler::{Clock, StepControl, StepResult, StopReason, TaskScheduler};
use crate::types::{LifetimeStats, MarketSnapshot, PinchError, PriceDecision, SaleRecord, SellerId};

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// Per-item working state, reset at the start of every item chain.
#[derive(Debug, Default)]
pub struct ItemState {
    /// Label as shown by the host, glyphs included. Cache key.
    pub raw_label: String,
    pub context: Option<ItemContext>,
    /// Set once the item is abandoned; later steps pass straight through.
    pub skipped: bool,
    pub quote: Option<QuoteResult>,
    pub decision: Option<PriceDecision>,
    pub wait_started: Option<Duration>,
}

impl ItemState {
    /// Clean label for reports, "Unknown" before the price window was read.
    pub fn label(&self) -> &str {
        self.context.as_ref().map_or("Unknown", |c| c.label.as_str())
    }
}

/// Progress through the current sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Progress {
    pub current: usize,
    pub total: usize,
}

/// Everything steps can read and mutate.
pub struct SweepContext {
    pub ui: Box<dyn UiPort>,
    pub catalog: Box<dyn CatalogPort>,
    pub sink: Box<dyn ReportSink>,
    pub pricing: PricingEngine,
    pub humanizer: HumanizationPolicy,
    pub config: AppConfig,
    pub own_sellers: HashSet<SellerId>,
    pub clock: Rc<dyn Clock>,

    pub item: ItemState,
    /// Latest market result, consumed by the item waiting for it.
    pub pending_snapshot: Option<MarketSnapshot>,
    /// Quotes keyed by raw label, valid for one sweep.
    pub cache: HashMap<String, Quote>,
    pub stats: Option<OperationStats>,
    pub lifetime: LifetimeStats,
    pub progress: Progress,
    pub items_processed: u64,
    /// Auto-advance seller dialogs while set.
    pub skip_dialogs: bool,
}

impl SweepContext {
    fn reset_sweep(&mut self) {
        self.item = ItemState::default();
        self.pending_snapshot = None;
        self.cache.clear();
        self.stats = None;
        self.progress = Progress::default();
        self.items_processed = 0;
        self.humanizer.reset();
    }

    pub(crate) fn now(&self) -> Duration {
        self.clock.now()
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct Orchestrator {
    scheduler: TaskScheduler<SweepContext>,
    cx: SweepContext,
    pointer: PointerMonitor,
}

impl Orchestrator {
    pub fn new(
        mut config: AppConfig,
        ui: Box<dyn UiPort>,
        catalog: Box<dyn CatalogPort>,
        sink: Box<dyn ReportSink>,
        humanizer: HumanizationPolicy,
        clock: Rc<dyn Clock>,
    ) -> Self {
        config.validate();
        let mut scheduler = TaskScheduler::new(Rc::clone(&clock), &config.scheduler);
        scheduler.set_cleanup(|cx: &mut SweepContext| {
            cx.skip_dialogs = false;
            cx.item = ItemState::default();
            cx.pending_snapshot = None;
            if let Some(stats) = cx.stats.take() {
                warn!(
                    seller = %stats.report().seller_label,
                    checked = stats.report().total_checked(),
                    "Discarding partial sweep report"
                );
            }
        });

        let pointer = PointerMonitor::new(config.safety.pointer_threshold);
        let cx = SweepContext {
            ui,
            catalog,
            sink,
            pricing: PricingEngine::new(config.pricing.clone()),
            humanizer,
            config,
            own_sellers: HashSet::new(),
            clock,
            item: ItemState::default(),
            pending_snapshot: None,
            cache: HashMap::new(),
            stats: None,
            lifetime: LifetimeStats::default(),
            progress: Progress::default(),
            items_processed: 0,
            skip_dialogs: false,
        };

        Self { scheduler, cx, pointer }
    }

    // -- Accessors ------------------------------------------------------------

    pub fn is_busy(&self) -> bool {
        self.scheduler.is_busy()
    }

    pub fn progress(&self) -> Progress {
        self.cx.progress
    }

    pub fn last_stop(&self) -> Option<&StopReason> {
        self.scheduler.last_stop()
    }

    pub fn current_step(&self) -> Option<&str> {
        self.scheduler.current()
    }

    /// 0–100 score for how varied recent delays were.
    pub fn humanization_score(&self) -> u8 {
        self.cx.humanizer.generator().humanization_score()
    }

    pub fn lifetime_stats(&self) -> &LifetimeStats {
        &self.cx.lifetime
    }

    pub fn set_lifetime_stats(&mut self, stats: LifetimeStats) {
        self.cx.lifetime = stats;
    }

    pub fn config(&self) -> &AppConfig {
        &self.cx.config
    }

    /// Replace the configuration. Applies from the next step on.
    pub fn set_config(&mut self, mut config: AppConfig) {
        config.validate();
        self.scheduler.set_config(&config.scheduler);
        self.pointer.set_threshold(config.safety.pointer_threshold);
        self.cx.pricing.set_config(config.pricing.clone());
        self.cx.config = config;
    }

    /// Sellers whose listings are matched instead of undercut.
    pub fn set_own_sellers(&mut self, sellers: HashSet<SellerId>) {
        self.cx.own_sellers = sellers;
    }

    // -- Sweeps ---------------------------------------------------------------

    /// Sweep every enabled seller on the open seller list.
    pub fn start_seller_sweep(&mut self) -> Result<(), PinchError> {
        if self.is_busy() {
            return Err(PinchError::Busy);
        }
        if self.cx.config.sellers.all_disabled() {
            self.cx.sink.notice("All sellers are disabled. Enable at least one in the configuration.");
            return Err(PinchError::AllSellersDisabled);
        }
        if !self.cx.ui.is_visible(Surface::SellerList) {
            return Err(PinchError::NotReady(Surface::SellerList));
        }

        self.cx.reset_sweep();
        self.pointer.reset();

        let names = self.cx.ui.seller_names();
        let enabled: Vec<(usize, String)> = names
            .into_iter()
            .enumerate()
            .filter(|(_, name)| self.cx.config.sellers.is_enabled(name))
            .collect();

        info!(sellers = enabled.len(), "Starting seller sweep");
        self.cx.sink.notice("[Started] Auto Pinch all.");
        self.cx.skip_dialogs = true;

        for (i, name) in enabled {
            self.enqueue_seller(i, name);
        }

        self.scheduler.enqueue("CleanupDialogs", |cx: &mut SweepContext, _: &mut StepControl<SweepContext>| {
            cx.skip_dialogs = false;
            StepResult::Continue
        });
        self.scheduler.enqueue("FinishLog", |cx: &mut SweepContext, _: &mut StepControl<SweepContext>| {
            info!(undercuts = cx.lifetime.total_undercuts_made, "Seller sweep finished");
            cx.sink.notice("[Finished] Auto Pinch.");
            StepResult::Continue
        });
        Ok(())
    }

    fn enqueue_seller(&mut self, i: usize, name: String) {
        let s = &mut self.scheduler;

        s.enqueue(format!("SelectSeller_{i}"), move |cx: &mut SweepContext, _: &mut StepControl<SweepContext>| {
            chain::navigate(cx, Surface::SellerList, Action::SelectSeller(i))
        });
        s.enqueue(format!("WaitSellerMenu_{i}"), |cx: &mut SweepContext, ctl: &mut StepControl<SweepContext>| {
            chain::wait_visible(cx, ctl, Surface::SellerMenu)
        });
        s.enqueue(format!("InitStats_{i}"), move |cx: &mut SweepContext, _: &mut StepControl<SweepContext>| {
            info!(seller = %name, "Now pinching items of seller");
            cx.stats = Some(OperationStats::new(name.clone()));
            StepResult::Continue
        });
        let d = self.cx.humanizer.reaction_delay();
        s.delay_next(d);

        s.enqueue(format!("OpenSellList_{i}"), |cx: &mut SweepContext, _: &mut StepControl<SweepContext>| {
            chain::navigate(cx, Surface::SellerMenu, Action::OpenSellList)
        });
        s.enqueue(format!("WaitSellList_{i}"), |cx: &mut SweepContext, ctl: &mut StepControl<SweepContext>| {
            chain::wait_visible(cx, ctl, Surface::SellList)
        });
        s.enqueue(format!("QueueItems_{i}"), |cx: &mut SweepContext, ctl: &mut StepControl<SweepContext>| {
            let count = cx.ui.listing_count(Surface::SellList);
            cx.progress = Progress { current: 0, total: count };
            let tasks = (0..count).flat_map(|idx| chain::item_chain(cx, idx, count)).collect();
            ctl.insert_all(tasks);
            StepResult::Continue
        });

        let d = self.cx.humanizer.reaction_delay();
        s.delay_next(d);
        s.enqueue(format!("CloseSellList_{i}"), |cx: &mut SweepContext, _: &mut StepControl<SweepContext>| {
            cx.ui.close(Surface::SellList);
            StepResult::Continue
        });
        let d = self.cx.humanizer.reaction_delay();
        s.delay_next(d);
        s.enqueue(format!("Report_{i}"), |cx: &mut SweepContext, _: &mut StepControl<SweepContext>| {
            chain::send_report(cx);
            StepResult::Continue
        });
        s.enqueue(format!("CloseSellerMenu_{i}"), |cx: &mut SweepContext, _: &mut StepControl<SweepContext>| {
            cx.ui.close(Surface::SellerMenu);
            StepResult::Continue
        });
        let d = self.cx.humanizer.reaction_delay() + 200;
        s.delay_next(d);
    }

    /// Reprice every listing on the sell list that is currently open.
    pub fn start_sell_list_sweep(&mut self) -> Result<(), PinchError> {
        if self.is_busy() {
            return Err(PinchError::Busy);
        }
        if !self.cx.ui.is_visible(Surface::SellList) {
            return Err(PinchError::NotReady(Surface::SellList));
        }

        self.cx.reset_sweep();
        self.pointer.reset();

        let owner = self.cx.ui.sell_list_owner().unwrap_or_else(|| "Unknown".to_string());
        let count = self.cx.ui.listing_count(Surface::SellList);
        info!(seller = %owner, listings = count, "Starting sell-list sweep");

        self.cx.stats = Some(OperationStats::new(owner));
        self.cx.progress = Progress { current: 0, total: count };

        for idx in 0..count {
            for task in chain::item_chain(&mut self.cx, idx, count) {
                self.scheduler.push(task);
            }
        }
        self.scheduler.enqueue("Report", |cx: &mut SweepContext, _: &mut StepControl<SweepContext>| {
            chain::send_report(cx);
            StepResult::Continue
        });
        Ok(())
    }

    /// Return every listing on the open sell list to `dest`, last row first.
    pub fn start_unlist(&mut self, dest: UnlistDestination) -> Result<(), PinchError> {
        if self.is_busy() {
            return Err(PinchError::Busy);
        }
        if !self.cx.ui.is_visible(Surface::SellList) {
            return Err(PinchError::NotReady(Surface::SellList));
        }

        self.cx.reset_sweep();
        self.pointer.reset();

        let count = self.cx.ui.listing_count(Surface::SellList);
        self.cx.progress = Progress { current: 0, total: count };
        info!(listings = count, ?dest, "Starting bulk unlist");

        for idx in (0..count).rev() {
            for task in chain::unlist_chain(&mut self.cx, idx, dest) {
                self.scheduler.push(task);
            }
        }
        self.scheduler.enqueue("FinishLog", |cx: &mut SweepContext, _: &mut StepControl<SweepContext>| {
            cx.sink.notice("[Finished] Unlisting items.");
            StepResult::Continue
        });
        Ok(())
    }

    // -- Driving --------------------------------------------------------------

    /// Advance the current sweep by at most one step.
    pub fn tick(&mut self) {
        if !self.scheduler.is_busy() {
            return;
        }
        self.scheduler.tick(&mut self.cx);

        if self.scheduler.is_busy() {
            return;
        }
        self.pointer.reset();
        match self.scheduler.last_stop() {
            Some(StopReason::Aborted { step }) => {
                let msg = format!("[Aborted] Stopped at {step}.");
                self.cx.sink.notice(&msg);
            }
            Some(StopReason::TimedOut { step, elapsed }) => {
                let msg = format!("[Aborted] {step} timed out after {}ms.", elapsed.as_millis());
                self.cx.sink.notice(&msg);
            }
            _ => {}
        }
    }

    /// Stop everything. No-op when idle.
    pub fn abort(&mut self) {
        if !self.is_busy() {
            return;
        }
        self.scheduler.abort(&mut self.cx);
        self.pointer.reset();
    }

    // -- Host events ----------------------------------------------------------

    /// Market query result.
    pub fn on_market_snapshot(&mut self, snapshot: MarketSnapshot) {
        if self.is_busy() {
            self.cx.pending_snapshot = Some(snapshot);
        }
    }

    /// Pointer position sample.
    pub fn on_pointer_moved(&mut self, x: f32, y: f32) {
        if !self.cx.config.safety.pointer_guard || !self.is_busy() {
            self.pointer.reset();
            return;
        }
        if self.pointer.sample(x, y) {
            warn!(x, y, "Pointer moved during sweep, aborting");
            self.abort();
            self.cx.sink.notice("[Safety] Aborted due to mouse movement.");
        }
    }

    /// Incoming direct message from another player.
    pub fn on_direct_message(&mut self, sender: &str, message: &str) {
        if !self.cx.config.safety.stop_on_message || !self.is_busy() {
            return;
        }
        error!(sender, "Direct message received during sweep, emergency stop");
        self.abort();
        self.cx.sink.alert(sender, message);
    }

    /// System chat line; records sales. Returns the parsed sale, if any.
    pub fn on_system_message(&mut self, text: &str) -> Option<SaleRecord> {
        let sale = parse_sale(text, Utc::now())?;
        self.cx.lifetime.record_sale(sale.clone());
        info!(
            item = %sale.item_name,
            price = sale.price,
            total_earned = self.cx.lifetime.total_gil_earned,
            "Sale recorded"
        );
        self.cx.sink.sale(&sale, &self.cx.lifetime);
        Some(sale)
    }

    /// A seller dialog appeared.
    pub fn on_dialog_shown(&mut self) {
        if !self.is_busy() {
            self.cx.skip_dialogs = false;
            return;
        }
        if self.cx.skip_dialogs {
            self.cx.ui.fire(Surface::Dialog, Action::AdvanceDialog);
        }
    }
}
