//! Step chains and the steps they are built from.
//!
//! An item chain reprices one listing: open its context menu, open the
//! price window, query (or reuse) the market, decide, apply. Every step
//! after the first checks `cx.item.skipped` and passes straight through
//! once the item has been abandoned.

use tracing::{debug, error, info, warn};

use super::orchestrator::{ItemState, SweepContext};
use super::report::price_change_message;
use crate::humanize::HumanizationPolicy;
use crate::items::{self, UnlistDestination};
use crate::ports::{Action, Surface};
use crate::pricing::ItemContext;
use crate::scheduler::{StepControl, StepResult, Task};
use crate::types::{FaultKind, PriceDecision, PriceOutcome};

type Ctl = StepControl<SweepContext>;

const MISCLICK_FIRST_EXTRA_MS: u64 = 200;
const MISCLICK_SECOND_EXTRA_MS: u64 = 400;

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Fire a navigation action. Refusal ends the chain.
pub(crate) fn navigate(cx: &mut SweepContext, surface: Surface, action: Action) -> StepResult {
    match cx.ui.fire(surface, action) {
        None => fail(cx, FaultKind::NotReady, "Surface not ready."),
        Some(true) => StepResult::Continue,
        Some(false) => {
            warn!(%surface, ?action, "Navigation refused");
            fail(cx, FaultKind::Fatal, "Navigation refused.")
        }
    }
}

/// Wait for `surface`, then give the "user" a moment to notice it.
pub(crate) fn wait_visible(cx: &mut SweepContext, ctl: &mut Ctl, surface: Surface) -> StepResult {
    if cx.ui.is_visible(surface) {
        ctl.insert_delay_next(cx.humanizer.reaction_delay());
        StepResult::Continue
    } else {
        StepResult::Retry
    }
}

pub(crate) fn send_report(cx: &mut SweepContext) {
    if let Some(stats) = cx.stats.take() {
        cx.sink.flush(stats.finish());
    }
}

/// Turn a fault into a step result. Not-ready waits, fatal ends the chain,
/// anything else abandons the item and lets the chain continue.
fn fail(cx: &mut SweepContext, kind: FaultKind, reason: &str) -> StepResult {
    match kind {
        FaultKind::NotReady => StepResult::Retry,
        FaultKind::Fatal => {
            error!(item = %cx.item.label(), reason, "Fatal fault, ending chain");
            StepResult::Abort
        }
        _ => {
            record_fault(cx, kind, reason);
            cx.item.skipped = true;
            StepResult::Continue
        }
    }
}

fn record_fault(cx: &mut SweepContext, kind: FaultKind, reason: &str) {
    let label = cx.item.label().to_string();
    if kind.is_error() {
        warn!(item = %label, %kind, reason, "Item abandoned");
    } else {
        debug!(item = %label, %kind, reason, "Item skipped");
    }
    if let Some(stats) = cx.stats.as_mut() {
        stats.add_fault(&label, kind, reason);
    }
}

// ---------------------------------------------------------------------------
// Item chain
// ---------------------------------------------------------------------------

/// Build the repricing chain for listing `index` of `count`.
///
/// Micro-breaks and misclicks are decided here, once per item.
pub(crate) fn item_chain(cx: &mut SweepContext, index: usize, count: usize) -> Vec<Task<SweepContext>> {
    let humanization = cx.config.humanization.clone();
    let mut tasks = vec![Task::step("ResetItem", reset_item)];

    if humanization.advanced && cx.humanizer.should_take_micro_break() {
        tasks.push(Task::step("MicroBreak", |cx: &mut SweepContext, ctl: &mut Ctl| {
            let ms = cx.humanizer.micro_break_delay();
            debug!(ms, "Taking a micro-break");
            ctl.insert_delay_next(ms);
            StepResult::Continue
        }));
    }

    if humanization.misclicks && index + 1 < count && cx.humanizer.should_misclick() {
        let neighbour = index + 1;
        tasks.push(Task::step("Misclick_Open", move |cx: &mut SweepContext, _: &mut Ctl| {
            match cx.ui.fire(Surface::SellList, Action::OpenListingMenu(neighbour)) {
                None => StepResult::Retry,
                Some(_) => StepResult::Continue,
            }
        }));
        tasks.push(Task::step("Misclick_Delay1", |cx: &mut SweepContext, ctl: &mut Ctl| {
            ctl.insert_delay_next(cx.humanizer.reaction_delay() + MISCLICK_FIRST_EXTRA_MS);
            StepResult::Continue
        }));
        tasks.push(Task::step("Misclick_Close", |cx: &mut SweepContext, _: &mut Ctl| {
            cx.ui.close(Surface::ContextMenu);
            StepResult::Continue
        }));
        tasks.push(Task::step("Misclick_Delay2", |cx: &mut SweepContext, ctl: &mut Ctl| {
            ctl.insert_delay_next(cx.humanizer.reaction_delay() + MISCLICK_SECOND_EXTRA_MS);
            StepResult::Continue
        }));
    }

    tasks.push(Task::step("PointerTravel", |cx: &mut SweepContext, ctl: &mut Ctl| {
        ctl.insert_delay_next(cx.humanizer.pointer_travel_delay());
        StepResult::Continue
    }));
    tasks.push(Task::step(format!("OpenMenu_{index}"), move |cx: &mut SweepContext, _: &mut Ctl| {
        navigate(cx, Surface::SellList, Action::OpenListingMenu(index))
    }));
    tasks.push(Task::step("WaitMenu", |cx: &mut SweepContext, ctl: &mut Ctl| {
        wait_visible(cx, ctl, Surface::ContextMenu)
    }));
    tasks.push(Task::step(format!("AdjustPrice_{index}"), adjust_price));
    tasks.push(Task::step("WaitPriceWindow", |cx: &mut SweepContext, ctl: &mut Ctl| {
        if cx.item.skipped {
            return StepResult::Continue;
        }
        wait_visible(cx, ctl, Surface::PriceWindow)
    }));
    tasks.push(Task::step(format!("Settle_{index}"), read_item));
    tasks.push(Task::step(format!("Compare_{index}"), compare));
    tasks.push(Task::step("WaitResults", |cx: &mut SweepContext, ctl: &mut Ctl| {
        if cx.item.skipped || cx.item.quote.is_some() {
            return StepResult::Continue;
        }
        wait_visible(cx, ctl, Surface::SearchResults)
    }));
    tasks.push(Task::step("WaitPrice", wait_price));
    tasks.push(Task::step(format!("BaitCheck_{index}"), bait_check));
    tasks.push(Task::step("KeepOpen", keep_open));
    tasks.push(Task::step(format!("Decide_{index}"), decide));
    tasks.push(Task::step(format!("Apply_{index}"), apply));
    tasks.push(Task::step(format!("Advance_{index}"), advance));

    tasks
}

fn reset_item(cx: &mut SweepContext, _: &mut Ctl) -> StepResult {
    cx.item = ItemState::default();
    cx.pending_snapshot = None;
    StepResult::Continue
}

fn adjust_price(cx: &mut SweepContext, _: &mut Ctl) -> StepResult {
    let entries = cx.ui.menu_entries();
    match items::find_price_entry(&entries) {
        Some(entry) => navigate(cx, Surface::ContextMenu, Action::ChooseMenuEntry(entry)),
        None => {
            debug!(?entries, "No price entry in menu, skipping listing");
            cx.item.skipped = true;
            cx.ui.close(Surface::ContextMenu);
            StepResult::Continue
        }
    }
}

/// Read the price window and resolve the item. Waits before a fresh
/// market query so it does not fire the instant the window opens.
fn read_item(cx: &mut SweepContext, ctl: &mut Ctl) -> StepResult {
    if cx.item.skipped {
        return StepResult::Continue;
    }
    let window = match cx.ui.read_price_window() {
        Some(w) if !w.label.is_empty() => w,
        _ => return fail(cx, FaultKind::NotReady, "Price window not readable yet."),
    };

    let clean = items::clean_item_name(&window.label);
    let entry = cx.catalog.resolve(&clean);
    let context = ItemContext {
        label: clean,
        item_id: entry.map(|e| e.item_id),
        stack_size: window.quantity,
        is_hq: items::is_hq_label(&window.label),
        can_be_hq: entry.map_or(true, |e| e.can_be_hq),
        current_price: window.asking_price,
    };
    debug!(
        item = %context.label,
        item_id = ?context.item_id,
        stack = context.stack_size,
        current = ?context.current_price,
        "Price window read"
    );

    if !cx.cache.contains_key(&window.label) {
        ctl.insert_delay_next(cx.config.delays.settle_ms);
    }
    cx.item.raw_label = window.label;
    cx.item.context = Some(context);
    StepResult::Continue
}

fn compare(cx: &mut SweepContext, _: &mut Ctl) -> StepResult {
    if cx.item.skipped {
        return StepResult::Continue;
    }
    if let Some(quote) = cx.cache.get(&cx.item.raw_label) {
        debug!(item = %cx.item.label(), target = quote.target, "Reusing cached quote");
        cx.item.quote = Some(Ok(*quote));
        return StepResult::Continue;
    }
    match cx.ui.fire(Surface::PriceWindow, Action::OpenComparison) {
        None => fail(cx, FaultKind::NotReady, "Price window not ready."),
        Some(true) => StepResult::Continue,
        Some(false) => fail(cx, FaultKind::Malformed, "Market comparison refused."),
    }
}

fn wait_price(cx: &mut SweepContext, _: &mut Ctl) -> StepResult {
    if cx.item.skipped || cx.item.quote.is_some() {
        return StepResult::Continue;
    }

    let now = cx.now();
    let started = *cx.item.wait_started.get_or_insert(now);

    let item_id = cx.item.context.as_ref().and_then(|c| c.item_id);
    if let Some(snapshot) = cx.pending_snapshot.take() {
        if snapshot.applies_to(item_id) {
            if let Some(context) = cx.item.context.as_ref() {
                let quote = cx.pricing.quote(&snapshot.listings, context, &cx.own_sellers);
                debug!(
                    item = %context.label,
                    request_id = snapshot.request_id,
                    listings = snapshot.listings.len(),
                    "Market data received"
                );
                cx.item.quote = Some(quote);
                return StepResult::Continue;
            }
        } else {
            debug!(
                wanted = ?item_id,
                got = ?snapshot.item_id,
                "Discarding market data for another item"
            );
        }
    }

    if now.saturating_sub(started).as_millis() as u64 > cx.config.delays.price_timeout_ms {
        warn!(item = %cx.item.label(), "Market data timed out");
        return fail(cx, FaultKind::Timeout, "Skipped (Market data timeout).");
    }
    StepResult::Retry
}

fn bait_check(cx: &mut SweepContext, ctl: &mut Ctl) -> StepResult {
    if !cx.config.humanization.inspect_bait || cx.item.skipped {
        return StepResult::Continue;
    }
    let outlier = match &cx.item.quote {
        Some(Ok(quote)) => quote.outlier,
        _ => None,
    };
    if let Some(skip) = outlier {
        if cx.ui.is_visible(Surface::SearchResults) {
            debug!(rank = skip.bait_rank, "Inspecting suspected bait listing");
            cx.ui.fire(Surface::SearchResults, Action::InspectListing(skip.bait_rank));
            ctl.insert_delay_next(cx.humanizer.bait_inspection_delay());
        }
    }
    StepResult::Continue
}

fn keep_open(cx: &mut SweepContext, ctl: &mut Ctl) -> StepResult {
    let delays = &cx.config.delays;
    let mut ms = cx
        .humanizer
        .generator_mut()
        .next_delay(delays.keep_open_min_ms, delays.keep_open_max_ms, delays.strategy);
    if cx.config.humanization.advanced {
        ms = cx.humanizer.cognitive_delay(ms);
    }
    if cx.config.humanization.fatigue {
        ms += cx.items_processed * cx.config.humanization.fatigue_step_ms;
    }
    ctl.insert_delay_next(ms);
    StepResult::Continue
}

fn decide(cx: &mut SweepContext, ctl: &mut Ctl) -> StepResult {
    if cx.item.skipped {
        return StepResult::Continue;
    }
    cx.ui.close(Surface::SearchResults);
    if !cx.ui.is_visible(Surface::PriceWindow) {
        return fail(cx, FaultKind::NotReady, "Price window closed.");
    }

    let Some(context) = cx.item.context.as_ref() else {
        return fail(cx, FaultKind::Malformed, "Could not read current price.");
    };
    let quote = cx.item.quote.clone().unwrap_or(Err(PriceOutcome::SkipNoData));
    let decision = cx.pricing.settle(&quote, context);

    if cx.config.humanization.advanced {
        if let Some(old) = decision.old_price {
            let mut hesitation = cx.humanizer.value_delay(old);
            if let PriceOutcome::Apply(new) = decision.outcome {
                hesitation += HumanizationPolicy::typing_delay(old, new);
            }
            ctl.insert_delay_next(hesitation);
        }
    }

    debug!(item = %decision.item_label, outcome = %decision.outcome, "Price decided");
    cx.item.decision = Some(decision);
    StepResult::Continue
}

fn apply(cx: &mut SweepContext, _: &mut Ctl) -> StepResult {
    if cx.item.skipped {
        cx.ui.close(Surface::SearchResults);
        cx.ui.close(Surface::PriceWindow);
        return StepResult::Continue;
    }
    let Some(PriceDecision { outcome, old_price, item_label, .. }) = cx.item.decision.clone() else {
        cx.ui.close(Surface::PriceWindow);
        return StepResult::Continue;
    };

    let step = match outcome {
        PriceOutcome::Apply(new) => {
            let old = old_price.unwrap_or_default();
            if !cx.ui.set_pending_price(new) {
                record_fault(cx, FaultKind::Malformed, "Could not set price.");
                StepResult::Continue
            } else {
                match cx.ui.fire(Surface::PriceWindow, Action::ConfirmPrice(true)) {
                    None => return StepResult::Retry,
                    Some(false) => record_fault(cx, FaultKind::Malformed, "Price change rejected."),
                    Some(true) => {
                        remember_quote(cx);
                        info!("{}", price_change_message(&item_label, old, new));
                        if let Some(stats) = cx.stats.as_mut() {
                            stats.add_change(&item_label, old, new);
                        }
                        cx.lifetime.total_undercuts_made += 1;
                    }
                }
                StepResult::Continue
            }
        }
        PriceOutcome::SkipOptimal | PriceOutcome::SkipPolicyLimit => {
            if cx.ui.fire(Surface::PriceWindow, Action::ConfirmPrice(false)).is_none() {
                return StepResult::Retry;
            }
            match outcome.fault() {
                None => {
                    remember_quote(cx);
                    if let Some(stats) = cx.stats.as_mut() {
                        stats.add_skip(&item_label, outcome.reason());
                    }
                }
                Some(kind) => {
                    warn!(
                        item = %item_label,
                        max_cut = %cx.config.pricing.max_cut_pct,
                        "Item ignored because it would cut the price too far"
                    );
                    record_fault(cx, kind, outcome.reason());
                }
            }
            StepResult::Continue
        }
        PriceOutcome::SkipIgnored | PriceOutcome::SkipNoData | PriceOutcome::Error(_) => {
            if let Some(kind) = outcome.fault() {
                record_fault(cx, kind, outcome.reason());
            }
            StepResult::Continue
        }
    };

    cx.ui.close(Surface::PriceWindow);
    step
}

/// Cache the quote under the raw label for later listings of the same item.
fn remember_quote(cx: &mut SweepContext) {
    if let Some(Ok(quote)) = &cx.item.quote {
        cx.cache.entry(cx.item.raw_label.clone()).or_insert(*quote);
    }
}

fn advance(cx: &mut SweepContext, _: &mut Ctl) -> StepResult {
    cx.progress.current += 1;
    cx.items_processed += 1;
    StepResult::Continue
}

// ---------------------------------------------------------------------------
// Unlist chain
// ---------------------------------------------------------------------------

pub(crate) fn unlist_chain(
    cx: &mut SweepContext,
    index: usize,
    dest: UnlistDestination,
) -> Vec<Task<SweepContext>> {
    vec![
        Task::step(format!("OpenMenu_{index}"), move |cx: &mut SweepContext, _: &mut Ctl| {
            navigate(cx, Surface::SellList, Action::OpenListingMenu(index))
        }),
        Task::delay(cx.humanizer.pointer_travel_delay()),
        Task::step("WaitMenu", |cx: &mut SweepContext, _: &mut Ctl| {
            if cx.ui.is_visible(Surface::ContextMenu) {
                StepResult::Continue
            } else {
                StepResult::Retry
            }
        }),
        Task::step(format!("Withdraw_{index}"), move |cx: &mut SweepContext, _: &mut Ctl| {
            let entries = cx.ui.menu_entries();
            match items::find_unlist_entry(&entries, dest) {
                Some(entry) => match cx.ui.fire(Surface::ContextMenu, Action::ChooseMenuEntry(entry)) {
                    None => StepResult::Retry,
                    Some(_) => StepResult::Continue,
                },
                None => {
                    warn!(index, ?dest, "No matching return entry, closing menu");
                    cx.ui.close(Surface::ContextMenu);
                    StepResult::Continue
                }
            }
        }),
        Task::delay(cx.humanizer.reaction_delay()),
        Task::step("Advance", advance),
    ]
}
