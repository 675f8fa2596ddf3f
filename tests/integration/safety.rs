//! Emergency stops and host events arriving mid-sweep.

use pinch::config::AppConfig;
use pinch::ports::Surface;
use pinch::scheduler::StopReason;
use pinch::sim::SimListing;

use crate::harness::{make_sell_list_host, make_two_seller_host, Harness};

fn make_running_sweep(config: AppConfig) -> Harness {
    let mut h = Harness::new(
        config,
        make_sell_list_host(vec![
            SimListing::new("Maple Log", 5380, 1, 300),
            SimListing::new("Maple Log", 5380, 1, 310),
        ]),
    );
    h.host.set_market(5380, vec![(290, 1, false)]);
    h.orchestrator.start_sell_list_sweep().unwrap();
    h.run_until_step("KeepOpen");
    h
}

#[test]
fn test_pointer_jump_aborts_sweep() {
    let mut h = make_running_sweep(AppConfig::default());

    h.orchestrator.on_pointer_moved(100.0, 100.0);
    h.orchestrator.on_pointer_moved(110.0, 105.0);
    assert!(h.orchestrator.is_busy());
    h.orchestrator.on_pointer_moved(400.0, 400.0);

    assert!(!h.orchestrator.is_busy());
    assert_eq!(h.orchestrator.last_stop(), Some(&StopReason::Cancelled));
    assert_eq!(h.sink.notices().last().map(String::as_str), Some("[Safety] Aborted due to mouse movement."));
    // Partial report is dropped.
    assert!(h.sink.reports().is_empty());
    assert_eq!(h.host.prices(0), vec![300, 310]);
}

#[test]
fn test_pointer_guard_disabled_ignores_movement() {
    let mut config = AppConfig::default();
    config.safety.pointer_guard = false;
    let mut h = make_running_sweep(config);

    h.orchestrator.on_pointer_moved(0.0, 0.0);
    h.orchestrator.on_pointer_moved(900.0, 900.0);
    assert!(h.orchestrator.is_busy());

    h.run_to_idle();
    assert_eq!(h.host.prices(0), vec![289, 289]);
}

#[test]
fn test_pointer_samples_while_idle_do_not_carry_over() {
    let mut h = Harness::new(
        AppConfig::default(),
        make_sell_list_host(vec![SimListing::new("Maple Log", 5380, 1, 300)]),
    );
    h.host.set_market(5380, vec![(290, 1, false)]);

    h.orchestrator.on_pointer_moved(0.0, 0.0);
    h.orchestrator.start_sell_list_sweep().unwrap();
    h.orchestrator.on_pointer_moved(900.0, 900.0);

    assert!(h.orchestrator.is_busy());
}

#[test]
fn test_direct_message_raises_alert_and_stops() {
    let mut h = make_running_sweep(AppConfig::default());

    h.orchestrator.on_direct_message("Curious Player", "are you a bot?");

    assert!(!h.orchestrator.is_busy());
    assert_eq!(
        h.sink.alerts(),
        vec![("Curious Player".to_string(), "are you a bot?".to_string())]
    );
}

#[test]
fn test_direct_message_ignored_when_disabled_or_idle() {
    let mut config = AppConfig::default();
    config.safety.stop_on_message = false;
    let mut h = make_running_sweep(config);
    h.orchestrator.on_direct_message("Someone", "hello");
    assert!(h.orchestrator.is_busy());

    h.run_to_idle();
    h.orchestrator.on_direct_message("Someone", "hello again");
    assert!(h.sink.alerts().is_empty());
}

#[test]
fn test_external_abort_closes_out_cleanly() {
    let host = make_two_seller_host();
    host.open_seller_list();
    let mut h = Harness::new(AppConfig::default(), host);
    h.orchestrator.start_seller_sweep().unwrap();
    h.run_until_step("WaitSellerMenu_0");

    h.orchestrator.abort();
    assert_eq!(h.orchestrator.last_stop(), Some(&StopReason::Cancelled));
    assert!(h.orchestrator.current_step().is_none());

    // Dialogs shown after the abort are left for the user.
    h.host.state_mut().visible.insert(Surface::Dialog);
    h.host.pump(&mut h.orchestrator);
    assert!(h.host.state().visible.contains(&Surface::Dialog));

    // A fresh sweep can start once the seller list is back.
    h.host.state_mut().visible.remove(&Surface::Dialog);
    h.orchestrator.start_seller_sweep().unwrap();
    h.run_to_idle();
    assert_eq!(h.host.prices(0), vec![1_198, 939, 1_198]);
    assert_eq!(h.sink.reports().len(), 2);
}

#[test]
fn test_sale_message_updates_lifetime_stats() {
    let mut h = Harness::new(AppConfig::default(), make_two_seller_host());

    let sale = h
        .orchestrator
        .on_system_message(
            "The Cobalt Ingot you put up for sale in the Limsa Lominsa markets sold for 1,198 gil.",
        )
        .unwrap();
    assert_eq!(sale.item_name, "Cobalt Ingot");
    assert!(h.orchestrator.on_system_message("You obtain 3 Cobalt Ingots.").is_none());

    let stats = h.orchestrator.lifetime_stats();
    assert_eq!(stats.total_items_sold, 1);
    assert_eq!(stats.total_gil_earned, 1_198);

    let recorded = h.sink.sales();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].0.city, "Limsa Lominsa");
    assert_eq!(recorded[0].1.total_gil_earned, 1_198);
}
