//! Test harness: an orchestrator wired to a `SimHost`, a manual clock,
//! seeded delays, and a sink that records everything it is handed.

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use std::rc::Rc;
use std::sync::{Arc, Mutex};

use pinch::config::AppConfig;
use pinch::engine::{Orchestrator, SweepReport};
use pinch::humanize::{DelayGenerator, HumanizationPolicy};
use pinch::ports::ReportSink;
use pinch::scheduler::ManualClock;
use pinch::sim::{SimHost, SimListing, SimSeller};
use pinch::types::{LifetimeStats, SaleRecord};

/// Host frame interval used by every test.
pub const FRAME_MS: u64 = 16;

/// Upper bound on frames before a test gives up on a sweep.
const MAX_FRAMES: usize = 200_000;

#[derive(Debug, Default)]
pub struct Recorded {
    pub reports: Vec<SweepReport>,
    pub notices: Vec<String>,
    pub alerts: Vec<(String, String)>,
    pub sales: Vec<(SaleRecord, LifetimeStats)>,
}

/// Sink recording every call for later assertions.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink(Arc<Mutex<Recorded>>);

impl RecordingSink {
    pub fn reports(&self) -> Vec<SweepReport> {
        self.0.lock().unwrap().reports.clone()
    }

    pub fn notices(&self) -> Vec<String> {
        self.0.lock().unwrap().notices.clone()
    }

    pub fn alerts(&self) -> Vec<(String, String)> {
        self.0.lock().unwrap().alerts.clone()
    }

    pub fn sales(&self) -> Vec<(SaleRecord, LifetimeStats)> {
        self.0.lock().unwrap().sales.clone()
    }
}

impl ReportSink for RecordingSink {
    fn flush(&self, report: SweepReport) {
        self.0.lock().unwrap().reports.push(report);
    }

    fn notice(&self, message: &str) {
        self.0.lock().unwrap().notices.push(message.to_string());
    }

    fn alert(&self, sender: &str, message: &str) {
        self.0.lock().unwrap().alerts.push((sender.to_string(), message.to_string()));
    }

    fn sale(&self, sale: &SaleRecord, lifetime: &LifetimeStats) {
        self.0.lock().unwrap().sales.push((sale.clone(), lifetime.clone()));
    }
}

pub struct Harness {
    pub orchestrator: Orchestrator,
    pub host: SimHost,
    pub clock: ManualClock,
    pub sink: RecordingSink,
}

impl Harness {
    pub fn new(config: AppConfig, host: SimHost) -> Self {
        Self::with_seed(config, host, 7)
    }

    pub fn with_seed(config: AppConfig, host: SimHost, seed: u64) -> Self {
        Self::with_rng(config, host, Box::new(StdRng::seed_from_u64(seed)))
    }

    /// Orchestrator whose humanization draws from `rng`.
    pub fn with_rng(config: AppConfig, host: SimHost, rng: Box<dyn RngCore>) -> Self {
        let clock = ManualClock::new();
        let sink = RecordingSink::default();
        let humanizer = HumanizationPolicy::new(DelayGenerator::with_rng(rng));
        let orchestrator = Orchestrator::new(
            config,
            host.ui(),
            host.catalog(),
            Box::new(sink.clone()),
            humanizer,
            Rc::new(clock.clone()),
        );
        Self { orchestrator, host, clock, sink }
    }

    /// One host frame: tick, deliver events, advance time.
    pub fn frame(&mut self) {
        self.orchestrator.tick();
        self.host.pump(&mut self.orchestrator);
        self.clock.advance_ms(FRAME_MS);
    }

    /// Run frames until the orchestrator goes idle. Returns the frame count.
    pub fn run_to_idle(&mut self) -> usize {
        let mut frames = 0;
        while self.orchestrator.is_busy() {
            assert!(frames < MAX_FRAMES, "sweep did not finish, stuck at {:?}", self.orchestrator.current_step());
            self.frame();
            frames += 1;
        }
        frames
    }

    /// Run frames until `step` is at the cursor.
    pub fn run_until_step(&mut self, step: &str) {
        let mut frames = 0;
        while self.orchestrator.current_step() != Some(step) {
            assert!(self.orchestrator.is_busy(), "sweep ended before reaching {step}");
            assert!(frames < MAX_FRAMES, "never reached {step}");
            self.frame();
            frames += 1;
        }
    }
}

/// Two sellers: three listings with a repeated item and an HQ listing
/// behind bait, then one listing already at its best price.
pub fn make_two_seller_host() -> SimHost {
    let host = SimHost::new(vec![
        SimSeller::new(
            "Retainer A",
            vec![
                SimListing::new("Cobalt Ingot", 5057, 99, 1_250),
                SimListing::new("\u{E03C}Darksteel Ore", 5118, 20, 980),
                SimListing::new("Cobalt Ingot", 5057, 99, 1_300),
            ],
        ),
        SimSeller::new("Retainer B", vec![SimListing::new("Maple Log", 5380, 99, 299)]),
    ]);
    host.set_market(5057, vec![(1_199, 99, false), (1_240, 50, false), (1_500, 99, false)]);
    host.set_market(5118, vec![(1, 20, true), (940, 20, true), (955, 10, false)]);
    host.set_market(5380, vec![(300, 99, false)]);
    host
}

/// One seller whose sell list is already open.
pub fn make_sell_list_host(listings: Vec<SimListing>) -> SimHost {
    let host = SimHost::new(vec![SimSeller::new("Retainer A", listings)]);
    host.open_sell_list(0);
    host
}
