//! Human-like pacing on top of the raw delay generator.
//!
//! Everything here produces either a number of milliseconds or a yes/no
//! decision about inserting extra steps. Nothing in this module changes what
//! the automation ultimately does to a listing.

use rand::Rng;
use tracing::debug;

use super::delay::DelayGenerator;

// ---------------------------------------------------------------------------
// Focus state
// ---------------------------------------------------------------------------

/// Simulated attention level, scaling cognitive delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusState {
    Focused,
    Casual,
    Distracted,
}

impl FocusState {
    pub const ALL: &'static [FocusState] =
        &[FocusState::Focused, FocusState::Casual, FocusState::Distracted];

    pub fn multiplier(&self) -> f64 {
        match self {
            FocusState::Focused => 0.7,
            FocusState::Casual => 1.0,
            FocusState::Distracted => 2.5,
        }
    }
}

/// Chance (percent) per cognitive delay that the focus state changes.
const FOCUS_SHIFT_PCT: u32 = 5;
/// One micro-break per this many items on average.
const MICRO_BREAK_ODDS: u32 = 40;
const MISCLICK_PCT: u32 = 2;

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

pub struct HumanizationPolicy {
    delays: DelayGenerator,
    focus: FocusState,
}

impl Default for HumanizationPolicy {
    fn default() -> Self {
        Self::new(DelayGenerator::new())
    }
}

impl HumanizationPolicy {
    pub fn new(delays: DelayGenerator) -> Self {
        Self { delays, focus: FocusState::Casual }
    }

    pub fn generator(&self) -> &DelayGenerator {
        &self.delays
    }

    pub fn generator_mut(&mut self) -> &mut DelayGenerator {
        &mut self.delays
    }

    pub fn focus(&self) -> FocusState {
        self.focus
    }

    /// Back to a neutral state; called at the start of each sweep.
    pub fn reset(&mut self) {
        self.focus = FocusState::Casual;
    }

    /// Time to notice that a window has appeared.
    pub fn reaction_delay(&mut self) -> u64 {
        let z = self.delays.standard_normal();
        (250.0 + 40.0 * z).clamp(180.0, 500.0) as u64
    }

    /// Time to move the pointer to the next target.
    pub fn pointer_travel_delay(&mut self) -> u64 {
        self.delays.rng().gen_range(300..600)
    }

    /// Time to type `new` over `old`, by changed digit positions.
    pub fn typing_delay(old: u32, new: u32) -> u64 {
        let a = old.to_string().into_bytes();
        let b = new.to_string().into_bytes();
        let diffs = (0..a.len().max(b.len()))
            .filter(|&i| a.get(i) != b.get(i))
            .count() as u64;
        diffs * 150 + 100
    }

    /// Hesitation that grows with the magnitude of the price.
    pub fn value_delay(&mut self, price: u32) -> u64 {
        if price == 0 {
            return 0;
        }
        let jitter: i64 = self.delays.rng().gen_range(-100..100);
        let base = ((price as f64).log10() * 200.0) as i64;
        (base + jitter).max(0) as u64
    }

    pub fn should_take_micro_break(&mut self) -> bool {
        self.delays.rng().gen_range(0..MICRO_BREAK_ODDS) == 0
    }

    pub fn micro_break_delay(&mut self) -> u64 {
        self.delays.rng().gen_range(4000..8000)
    }

    pub fn should_misclick(&mut self) -> bool {
        self.delays.rng().gen_range(0..100) < MISCLICK_PCT
    }

    /// How long to look at a suspected bait listing.
    pub fn bait_inspection_delay(&mut self) -> u64 {
        self.delays.rng().gen_range(2000..3500)
    }

    /// Scale `base` by the current focus state, occasionally shifting it.
    pub fn cognitive_delay(&mut self, base: u64) -> u64 {
        if self.delays.rng().gen_range(0..100) < FOCUS_SHIFT_PCT {
            let idx = self.delays.rng().gen_range(0..FocusState::ALL.len());
            let next = FocusState::ALL[idx];
            if next != self.focus {
                debug!(from = ?self.focus, to = ?next, "Focus state shifted");
            }
            self.focus = next;
        }
        (base as f64 * self.focus.multiplier()) as u64
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
