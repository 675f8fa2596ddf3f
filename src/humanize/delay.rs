//! Randomized wait durations.
//!
//! Draws delays from one of four distributions and keeps a rolling history
//! of what it produced, from which a "humanization score" is derived: a
//! timing stream with a healthy coefficient of variation looks less like a
//! bot than a metronome does.

use rand::rngs::OsRng;
use rand::{Rng, RngCore};
use serde::Deserialize;
use std::collections::VecDeque;
use std::f64::consts::PI;

/// Number of recent delays kept for scoring.
pub const MAX_HISTORY: usize = 100;

/// Samples required before the score means anything.
const MIN_SCORING_SAMPLES: usize = 10;

/// Statistical shape of generated delays.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DelayStrategy {
    #[default]
    Uniform,
    Gaussian,
    LogNormal,
    Bimodal,
}

impl DelayStrategy {
    pub const ALL: &'static [DelayStrategy] = &[
        DelayStrategy::Uniform,
        DelayStrategy::Gaussian,
        DelayStrategy::LogNormal,
        DelayStrategy::Bimodal,
    ];
}

pub struct DelayGenerator {
    rng: Box<dyn RngCore>,
    history: VecDeque<f64>,
    last: u64,
}

impl Default for DelayGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl DelayGenerator {
    /// Generator backed by the operating system's entropy source.
    pub fn new() -> Self {
        Self::with_rng(Box::new(OsRng))
    }

    /// Generator backed by a caller-supplied source (seeded in tests).
    pub fn with_rng(rng: Box<dyn RngCore>) -> Self {
        Self { rng, history: VecDeque::with_capacity(MAX_HISTORY), last: 0 }
    }

    /// Draw a delay in `[min, max]` milliseconds and record it.
    pub fn next_delay(&mut self, min: u64, max: u64, strategy: DelayStrategy) -> u64 {
        if min >= max {
            self.record(min);
            return min;
        }

        let value = match strategy {
            DelayStrategy::Uniform => self.rng.gen_range(min..=max),
            DelayStrategy::Gaussian => self.gaussian(min, max),
            DelayStrategy::LogNormal => self.log_normal(min, max),
            DelayStrategy::Bimodal => self.bimodal(min, max),
        };

        self.record(value);
        value
    }

    /// Most recently generated delay.
    pub fn last(&self) -> u64 {
        self.last
    }

    pub fn history(&self) -> impl Iterator<Item = f64> + '_ {
        self.history.iter().copied()
    }

    /// Score in `[0, 100]` from the coefficient of variation of recent
    /// delays. Saturates at CV ≥ 0.25, halved below CV 0.10, and reports 50
    /// until enough samples exist.
    pub fn humanization_score(&self) -> u8 {
        if self.history.len() < MIN_SCORING_SAMPLES {
            return 50;
        }

        let n = self.history.len() as f64;
        let mean = self.history.iter().sum::<f64>() / n;
        if mean == 0.0 {
            return 0;
        }

        let variance = self.history.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        let cv = variance.sqrt() / mean;

        let mut score = cv.min(0.5) / 0.25 * 100.0;
        if cv < 0.10 {
            score *= 0.5;
        }
        score.clamp(0.0, 100.0) as u8
    }

    /// Forget recorded history.
    pub fn clear_history(&mut self) {
        self.history.clear();
        self.last = 0;
    }

    pub(crate) fn rng(&mut self) -> &mut dyn RngCore {
        self.rng.as_mut()
    }

    /// Standard normal sample via the Box-Muller transform.
    pub(crate) fn standard_normal(&mut self) -> f64 {
        // 1 - [0, 1) keeps both uniforms in (0, 1] so ln() stays finite.
        let u1 = 1.0 - self.rng.gen::<f64>();
        let u2 = 1.0 - self.rng.gen::<f64>();
        (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).sin()
    }

    fn record(&mut self, ms: u64) {
        self.last = ms;
        self.history.push_back(ms as f64);
        if self.history.len() > MAX_HISTORY {
            self.history.pop_front();
        }
    }

    fn gaussian(&mut self, min: u64, max: u64) -> u64 {
        let mean = (min + max) as f64 / 2.0;
        let std_dev = (max - min) as f64 / 6.0;
        clamp_to(mean + std_dev * self.standard_normal(), min, max)
    }

    fn log_normal(&mut self, min: u64, max: u64) -> u64 {
        let sigma = 0.5;
        let normalized = (sigma * self.standard_normal()).exp() / 4.0;
        let range = (max - min) as f64;
        clamp_to(min as f64 + range * normalized, min, max)
    }

    fn bimodal(&mut self, min: u64, max: u64) -> u64 {
        let range = (max - min) as f64;
        let (mean, std_dev) = if self.rng.gen::<f64>() < 0.70 {
            (min as f64 + range * 0.25, range / 8.0)
        } else {
            (min as f64 + range * 0.75, range / 6.0)
        };
        clamp_to(mean + std_dev * self.standard_normal(), min, max)
    }
}

fn clamp_to(value: f64, min: u64, max: u64) -> u64 {
    if value < min as f64 {
        min
    } else if value > max as f64 {
        max
    } else {
        value as u64
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn make_generator(seed: u64) -> DelayGenerator {
        DelayGenerator::with_rng(Box::new(StdRng::seed_from_u64(seed)))
    }

    #[test]
    fn test_all_strategies_stay_in_bounds() {
        let mut gen = make_generator(7);
        for &strategy in DelayStrategy::ALL {
            for _ in 0..10_000 {
                let d = gen.next_delay(250, 750, strategy);
                assert!((250..=750).contains(&d), "{strategy:?} produced {d}");
            }
        }
    }

    #[test]
    fn test_narrow_range_in_bounds() {
        let mut gen = make_generator(11);
        for &strategy in DelayStrategy::ALL {
            for _ in 0..10_000 {
                let d = gen.next_delay(10, 11, strategy);
                assert!(d == 10 || d == 11);
            }
        }
    }

    #[test]
    fn test_os_entropy_uniform_in_bounds() {
        let mut gen = DelayGenerator::new();
        for _ in 0..1_000 {
            let d = gen.next_delay(0, 3, DelayStrategy::Uniform);
            assert!(d <= 3);
        }
    }

    #[test]
    fn test_degenerate_range_returns_min() {
        let mut gen = make_generator(1);
        assert_eq!(gen.next_delay(500, 500, DelayStrategy::Gaussian), 500);
        assert_eq!(gen.next_delay(900, 100, DelayStrategy::Uniform), 900);
        assert_eq!(gen.last(), 900);
    }

    #[test]
    fn test_gaussian_centres_on_midpoint() {
        let mut gen = make_generator(3);
        let n = 10_000;
        let sum: u64 = (0..n).map(|_| gen.next_delay(1000, 2000, DelayStrategy::Gaussian)).sum();
        let mean = sum as f64 / n as f64;
        assert!((mean - 1500.0).abs() < 25.0, "mean was {mean}");
    }

    #[test]
    fn test_bimodal_skews_low() {
        let mut gen = make_generator(5);
        let n = 10_000;
        let low = (0..n)
            .filter(|_| gen.next_delay(0, 1000, DelayStrategy::Bimodal) < 500)
            .count();
        // 70% weight sits around the 25% mark
        assert!(low as f64 / n as f64 > 0.6);
    }

    #[test]
    fn test_history_bounded() {
        let mut gen = make_generator(9);
        for _ in 0..250 {
            gen.next_delay(100, 200, DelayStrategy::Uniform);
        }
        assert_eq!(gen.history().count(), MAX_HISTORY);
    }

    #[test]
    fn test_score_neutral_until_ten_samples() {
        let mut gen = make_generator(2);
        for _ in 0..9 {
            gen.next_delay(100, 5000, DelayStrategy::Uniform);
        }
        assert_eq!(gen.humanization_score(), 50);
    }

    #[test]
    fn test_constant_delays_score_zero() {
        let mut gen = make_generator(2);
        for _ in 0..20 {
            gen.next_delay(400, 400, DelayStrategy::Uniform);
        }
        assert_eq!(gen.humanization_score(), 0);
    }

    #[test]
    fn test_varied_delays_saturate_score() {
        let mut gen = make_generator(2);
        // Alternating 100/900: mean 500, std dev 400, CV 0.8
        for i in 0..20 {
            let v = if i % 2 == 0 { 100 } else { 900 };
            gen.next_delay(v, v, DelayStrategy::Uniform);
        }
        assert_eq!(gen.humanization_score(), 100);
    }

    #[test]
    fn test_low_variation_halved() {
        let mut gen = make_generator(2);
        // Alternating 950/1050: CV 0.05 → 0.05/0.25*100 = 20, halved to 10
        for i in 0..20 {
            let v = if i % 2 == 0 { 950 } else { 1050 };
            gen.next_delay(v, v, DelayStrategy::Uniform);
        }
        let score = gen.humanization_score();
        assert!((9..=10).contains(&score), "score was {score}");
    }

    #[test]
    fn test_clear_history_resets_score() {
        let mut gen = make_generator(4);
        for _ in 0..20 {
            gen.next_delay(400, 400, DelayStrategy::Uniform);
        }
        gen.clear_history();
        assert_eq!(gen.humanization_score(), 50);
        assert_eq!(gen.last(), 0);
    }
}
