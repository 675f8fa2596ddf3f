//! Full sweeps over the simulated host.

use rand::rngs::mock::StepRng;
use rust_decimal_macros::dec;
use std::collections::HashSet;

use pinch::config::{AppConfig, ALL_DISABLED_SENTINEL};
use pinch::items::UnlistDestination;
use pinch::ports::{Action, Surface};
use pinch::scheduler::StopReason;
use pinch::sim::{SimHost, SimListing, SimSeller};
use pinch::types::{FaultKind, ItemId, ItemPolicy, ListingObservation, MarketSnapshot, PinchError, SellerId};

use crate::harness::{make_sell_list_host, make_two_seller_host, Harness, FRAME_MS};

/// Five competing offers, one of them bait.
fn make_five_offer_market(host: &SimHost) {
    host.set_market(5380, vec![(50, 1, false), (48, 1, false), (47, 1, false), (47, 1, false), (1, 1, false)]);
}

fn make_maple(price: u32) -> SimListing {
    SimListing::new("Maple Log", 5380, 1, price)
}

#[test]
fn test_seller_sweep_reprices_every_seller() {
    let host = make_two_seller_host();
    host.open_seller_list();
    let mut h = Harness::new(AppConfig::default(), host);

    h.orchestrator.start_seller_sweep().unwrap();
    h.run_to_idle();

    assert_eq!(h.orchestrator.last_stop(), Some(&StopReason::Completed));
    assert_eq!(h.host.prices(0), vec![1_198, 939, 1_198]);
    assert_eq!(h.host.prices(1), vec![299]);

    let reports = h.sink.reports();
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].seller_label, "Retainer A");
    assert_eq!(reports[0].changes.len(), 3);
    assert_eq!(reports[0].changes[1].item, "Darksteel Ore");
    assert_eq!(reports[0].changes[1].new_price, 939);
    assert_eq!(reports[1].seller_label, "Retainer B");
    assert!(reports[1].changes.is_empty());
    assert_eq!(reports[1].skips[0].reason, "Price already optimal.");

    let notices = h.sink.notices();
    assert_eq!(notices.first().map(String::as_str), Some("[Started] Auto Pinch all."));
    assert_eq!(notices.last().map(String::as_str), Some("[Finished] Auto Pinch."));

    assert_eq!(h.orchestrator.lifetime_stats().total_undercuts_made, 3);
    // Repeated Cobalt Ingot reuses the first quote.
    assert_eq!(h.host.state().comparisons, 3);
    assert_eq!(h.host.state().dialogs_advanced, 2);
}

#[test]
fn test_seller_sweep_skips_disabled_sellers() {
    let host = make_two_seller_host();
    host.open_seller_list();
    let mut config = AppConfig::default();
    config.sellers.enabled.insert("Retainer B".to_string());
    let mut h = Harness::new(config, host);

    h.orchestrator.start_seller_sweep().unwrap();
    h.run_to_idle();

    assert_eq!(h.host.prices(0), vec![1_250, 980, 1_300]);
    let reports = h.sink.reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].seller_label, "Retainer B");
}

#[test]
fn test_all_disabled_sentinel_refuses_to_start() {
    let host = make_two_seller_host();
    host.open_seller_list();
    let mut config = AppConfig::default();
    config.sellers.enabled.insert(ALL_DISABLED_SENTINEL.to_string());
    let mut h = Harness::new(config, host);

    let err = h.orchestrator.start_seller_sweep().unwrap_err();
    assert!(matches!(err, PinchError::AllSellersDisabled));
    assert!(!h.orchestrator.is_busy());
    assert_eq!(h.sink.notices().len(), 1);
}

#[test]
fn test_seller_sweep_needs_seller_list() {
    let mut h = Harness::new(AppConfig::default(), make_two_seller_host());
    let err = h.orchestrator.start_seller_sweep().unwrap_err();
    assert!(matches!(err, PinchError::NotReady(Surface::SellerList)));
    assert!(h.sink.notices().is_empty());
}

#[test]
fn test_second_start_while_busy_is_rejected() {
    let mut h = Harness::new(AppConfig::default(), make_sell_list_host(vec![make_maple(50)]));
    make_five_offer_market(&h.host);

    h.orchestrator.start_sell_list_sweep().unwrap();
    h.frame();
    assert!(matches!(h.orchestrator.start_sell_list_sweep(), Err(PinchError::Busy)));
    assert!(matches!(h.orchestrator.start_unlist(UnlistDestination::Inventory), Err(PinchError::Busy)));

    h.run_to_idle();
    assert_eq!(h.sink.reports().len(), 1);
}

#[test]
fn test_sell_list_sweep_skips_bait_and_reuses_quote() {
    let mut h = Harness::new(
        AppConfig::default(),
        make_sell_list_host(vec![make_maple(50), make_maple(46), make_maple(47)]),
    );
    make_five_offer_market(&h.host);

    h.orchestrator.start_sell_list_sweep().unwrap();
    h.run_to_idle();

    // Bait at 1 is skipped, 47 is the reference.
    assert_eq!(h.host.prices(0), vec![46, 46, 46]);
    assert_eq!(h.host.state().comparisons, 1);

    let report = &h.sink.reports()[0];
    assert_eq!(report.seller_label, "Retainer A");
    assert_eq!(report.changes.len(), 2);
    assert_eq!(report.changes[0].old_price, 50);
    assert_eq!(report.changes[0].change_pct, dec!(8.00));
    assert_eq!(report.skips.len(), 1);
    assert_eq!(report.skips[0].reason, "Price already optimal.");
    assert_eq!(report.total_checked(), 3);

    let progress = h.orchestrator.progress();
    assert_eq!((progress.current, progress.total), (3, 3));
}

#[test]
fn test_cut_limit_leaves_price_and_is_not_cached() {
    let mut config = AppConfig::default();
    config.pricing.outlier_protection = false;
    config.pricing.max_cut_pct = dec!(10);
    let mut h = Harness::new(config, make_sell_list_host(vec![make_maple(50), make_maple(48)]));
    make_five_offer_market(&h.host);

    h.orchestrator.start_sell_list_sweep().unwrap();
    h.run_to_idle();

    assert_eq!(h.host.prices(0), vec![50, 48]);
    assert_eq!(h.host.state().comparisons, 2);
    let report = &h.sink.reports()[0];
    assert!(report.changes.is_empty());
    assert!(report.skips.iter().all(|s| s.reason == "Cut limit exceeded."));
    assert_eq!(h.orchestrator.lifetime_stats().total_undercuts_made, 0);
}

#[test]
fn test_ignored_item_is_reported_and_untouched() {
    let mut config = AppConfig::default();
    config.pricing.set_policy(ItemId(5380), ItemPolicy { ignore: true, ..Default::default() });
    let mut h = Harness::new(config, make_sell_list_host(vec![make_maple(50)]));
    make_five_offer_market(&h.host);

    h.orchestrator.start_sell_list_sweep().unwrap();
    h.run_to_idle();

    assert_eq!(h.host.prices(0), vec![50]);
    assert_eq!(h.sink.reports()[0].skips[0].reason, "Item Ignored (Config).");
}

#[test]
fn test_item_floor_raises_target() {
    let mut config = AppConfig::default();
    config.pricing.set_policy(ItemId(5380), ItemPolicy { min_price: 47, ..Default::default() });
    let mut h = Harness::new(config, make_sell_list_host(vec![make_maple(50)]));
    make_five_offer_market(&h.host);

    h.orchestrator.start_sell_list_sweep().unwrap();
    h.run_to_idle();

    assert_eq!(h.host.prices(0), vec![47]);
}

#[test]
fn test_own_seller_is_matched_not_undercut() {
    let mut h = Harness::new(AppConfig::default(), make_sell_list_host(vec![make_maple(310)]));
    h.host.set_market(5380, vec![(300, 1, false), (320, 1, false)]);
    h.orchestrator.set_own_sellers(HashSet::from([SellerId(9_000)]));

    h.orchestrator.start_sell_list_sweep().unwrap();
    h.run_to_idle();

    assert_eq!(h.host.prices(0), vec![300]);
}

#[test]
fn test_market_timeout_skips_item() {
    let mut h = Harness::new(AppConfig::default(), make_sell_list_host(vec![make_maple(50), make_maple(60)]));
    make_five_offer_market(&h.host);
    h.host.state_mut().market_responds = false;

    h.orchestrator.start_sell_list_sweep().unwrap();
    h.run_to_idle();

    assert_eq!(h.orchestrator.last_stop(), Some(&StopReason::Completed));
    assert_eq!(h.host.prices(0), vec![50, 60]);
    let report = &h.sink.reports()[0];
    assert_eq!(report.skips.len(), 2);
    assert!(report.skips.iter().all(|s| s.reason == "Skipped (Market data timeout)."));
    assert!(!h.host.state().visible.contains(&Surface::PriceWindow));
}

#[test]
fn test_listing_without_price_entry_is_passed_over() {
    let mut mannequin = SimListing::new("Glamour Set", 9999, 1, 10_000);
    mannequin.menu = Some(vec!["Try On".to_string(), "Remove".to_string()]);
    let mut h = Harness::new(AppConfig::default(), make_sell_list_host(vec![mannequin, make_maple(50)]));
    make_five_offer_market(&h.host);

    h.orchestrator.start_sell_list_sweep().unwrap();
    h.run_to_idle();

    assert_eq!(h.host.prices(0), vec![10_000, 46]);
    let report = &h.sink.reports()[0];
    assert_eq!(report.total_checked(), 1);
    assert_eq!(report.changes[0].item, "Maple Log");
}

#[test]
fn test_humanized_sweep_reaches_same_prices() {
    let host = make_two_seller_host();
    host.open_seller_list();
    let mut config = AppConfig::default();
    config.humanization.advanced = true;
    config.humanization.misclicks = true;
    config.humanization.inspect_bait = true;
    let mut h = Harness::with_seed(config, host, 42);

    h.orchestrator.start_seller_sweep().unwrap();
    h.run_to_idle();

    assert_eq!(h.orchestrator.last_stop(), Some(&StopReason::Completed));
    assert_eq!(h.host.prices(0), vec![1_198, 939, 1_198]);
    assert_eq!(h.host.prices(1), vec![299]);
    // Darksteel's 1-gil bait sits at rank 0.
    assert_eq!(h.host.state().inspected, vec![0]);
    assert!(h.orchestrator.humanization_score() <= 100);
}

#[test]
fn test_unlist_returns_listings_last_first() {
    let listings = vec![
        SimListing::new("Cobalt Ingot", 5057, 99, 1_250),
        SimListing::new("Maple Log", 5380, 99, 300),
        SimListing::new("Iron Ore", 5111, 99, 40),
    ];
    let mut h = Harness::new(AppConfig::default(), make_sell_list_host(listings));

    h.orchestrator.start_unlist(UnlistDestination::Seller).unwrap();
    h.run_to_idle();

    assert!(h.host.prices(0).is_empty());
    let unlisted: Vec<String> = h.host.state().unlisted.iter().map(|(label, _)| label.clone()).collect();
    assert_eq!(unlisted, vec!["Iron Ore", "Maple Log", "Cobalt Ingot"]);
    assert!(h.host.state().unlisted.iter().all(|(_, dest)| *dest == UnlistDestination::Seller));
    assert_eq!(h.sink.notices().last().map(String::as_str), Some("[Finished] Unlisting items."));
}

#[test]
fn test_unlist_without_matching_entry_keeps_listing() {
    let mut odd = SimListing::new("Glamour Set", 9999, 1, 10_000);
    odd.menu = Some(vec!["Try On".to_string()]);
    let mut h = Harness::new(
        AppConfig::default(),
        make_sell_list_host(vec![odd, SimListing::new("Maple Log", 5380, 1, 300)]),
    );

    h.orchestrator.start_unlist(UnlistDestination::Inventory).unwrap();
    h.run_to_idle();

    assert_eq!(h.host.prices(0), vec![10_000]);
    assert_eq!(h.orchestrator.last_stop(), Some(&StopReason::Completed));
}

#[test]
fn test_stuck_surface_times_out_and_discards_report() {
    let mut h = Harness::new(AppConfig::default(), make_sell_list_host(vec![make_maple(50)]));
    make_five_offer_market(&h.host);

    h.orchestrator.start_sell_list_sweep().unwrap();
    h.host.state_mut().visible.remove(&Surface::SellList);
    h.run_to_idle();

    assert!(matches!(
        h.orchestrator.last_stop(),
        Some(StopReason::TimedOut { step, .. }) if step == "OpenMenu_0"
    ));
    assert!(h.sink.reports().is_empty());
    let notice = h.sink.notices().last().cloned().unwrap();
    assert!(notice.starts_with("[Aborted] OpenMenu_0 timed out after"));
}

#[test]
fn test_new_sweep_after_finish() {
    let mut h = Harness::new(AppConfig::default(), make_sell_list_host(vec![make_maple(50)]));
    make_five_offer_market(&h.host);

    h.orchestrator.start_sell_list_sweep().unwrap();
    h.run_to_idle();
    h.host.set_market(5380, vec![(40, 1, false)]);
    h.orchestrator.start_sell_list_sweep().unwrap();
    h.run_to_idle();

    assert_eq!(h.host.prices(0), vec![39]);
    assert_eq!(h.sink.reports().len(), 2);
    assert_eq!(h.host.state().comparisons, 2);
}

#[test]
fn test_seller_sweep_without_dialogs() {
    let host = SimHost::new(vec![SimSeller::new("Solo", vec![make_maple(80)])]);
    host.open_seller_list();
    host.state_mut().dialogs = false;
    host.set_market(5380, vec![(75, 1, false)]);
    let mut h = Harness::new(AppConfig::default(), host);

    h.orchestrator.start_seller_sweep().unwrap();
    h.run_to_idle();

    assert_eq!(h.host.prices(0), vec![74]);
    assert_eq!(h.host.state().dialogs_advanced, 0);
}

#[test]
fn test_snapshot_for_other_item_is_discarded() {
    let mut h = Harness::new(AppConfig::default(), make_sell_list_host(vec![make_maple(50)]));
    make_five_offer_market(&h.host);
    h.host.state_mut().market_responds = false;

    h.orchestrator.start_sell_list_sweep().unwrap();
    h.run_until_step("WaitResults");
    // A late answer to an earlier Cobalt Ingot query.
    h.orchestrator.on_market_snapshot(MarketSnapshot {
        request_id: 99,
        item_id: Some(ItemId(5057)),
        listings: vec![ListingObservation {
            item_id: ItemId(5057),
            price_per_unit: 10,
            quantity: 1,
            is_hq: false,
            seller_id: SellerId(1),
            rank: 0,
        }],
    });
    h.run_to_idle();

    assert_eq!(h.host.prices(0), vec![50]);
    let report = &h.sink.reports()[0];
    assert_eq!(report.skips.len(), 1);
    assert_eq!(report.skips[0].reason, "Skipped (Market data timeout).");
    assert_eq!(report.fault_count(FaultKind::Timeout), 1);
}

#[test]
fn test_misclick_and_micro_break_leave_prices_intact() {
    let mut config = AppConfig::default();
    config.humanization.advanced = true;
    config.humanization.misclicks = true;
    // A source stuck at zero takes every micro-break and every misclick.
    let mut h = Harness::with_rng(
        config,
        make_sell_list_host(vec![make_maple(50), make_maple(60)]),
        Box::new(StepRng::new(0, 0)),
    );
    make_five_offer_market(&h.host);

    h.orchestrator.start_sell_list_sweep().unwrap();
    let frames = h.run_to_idle();

    assert_eq!(h.orchestrator.last_stop(), Some(&StopReason::Completed));
    assert_eq!(h.host.prices(0), vec![46, 46]);

    let opened: Vec<Action> = h
        .host
        .state()
        .fired
        .iter()
        .filter(|(surface, _)| *surface == Surface::SellList)
        .map(|&(_, action)| action)
        .collect();
    // The first item misclicks its neighbour; the last row has none.
    assert_eq!(
        opened,
        vec![Action::OpenListingMenu(1), Action::OpenListingMenu(0), Action::OpenListingMenu(1)]
    );
    assert!(!h.host.state().visible.contains(&Surface::ContextMenu));
    // Two micro-breaks of at least 4 s each.
    assert!(frames as u64 * FRAME_MS >= 8_000);
}

#[test]
fn test_unreadable_price_is_error_and_sweep_continues() {
    let mut hidden = make_maple(50);
    hidden.price_hidden = true;
    let mut h = Harness::new(AppConfig::default(), make_sell_list_host(vec![hidden, make_maple(60)]));
    make_five_offer_market(&h.host);

    h.orchestrator.start_sell_list_sweep().unwrap();
    h.run_to_idle();

    assert_eq!(h.orchestrator.last_stop(), Some(&StopReason::Completed));
    assert_eq!(h.host.prices(0), vec![50, 46]);
    let report = &h.sink.reports()[0];
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].reason, "Could not read current price.");
    assert_eq!(report.errors[0].fault, Some(FaultKind::Malformed));
    assert_eq!(report.changes.len(), 1);
    assert_eq!(report.changes[0].old_price, 60);
}

#[test]
fn test_short_budget_still_lets_market_timeout_skip() {
    let mut config = AppConfig::default();
    config.scheduler.time_budget_ms = 1_000;
    let mut h = Harness::new(config, make_sell_list_host(vec![make_maple(50), make_maple(60)]));
    make_five_offer_market(&h.host);
    h.host.state_mut().market_responds = false;

    h.orchestrator.start_sell_list_sweep().unwrap();
    h.run_to_idle();

    assert_eq!(h.orchestrator.last_stop(), Some(&StopReason::Completed));
    let report = &h.sink.reports()[0];
    assert_eq!(report.fault_count(FaultKind::Timeout), 2);
}
