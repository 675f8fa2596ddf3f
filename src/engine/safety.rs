//! Manual-takeover detection.

/// Watches pointer samples while a sweep runs. A jump larger than the
/// threshold between two consecutive samples means someone grabbed the
/// mouse.
#[derive(Debug, Clone)]
pub struct PointerMonitor {
    threshold: f32,
    last: Option<(f32, f32)>,
}

impl PointerMonitor {
    pub fn new(threshold: f32) -> Self {
        Self { threshold, last: None }
    }

    pub fn set_threshold(&mut self, threshold: f32) {
        self.threshold = threshold;
    }

    /// Record a sample. Returns true when it moved past the threshold.
    pub fn sample(&mut self, x: f32, y: f32) -> bool {
        let moved = match self.last {
            Some((lx, ly)) => ((x - lx).powi(2) + (y - ly).powi(2)).sqrt() > self.threshold,
            None => false,
        };
        self.last = Some((x, y));
        moved
    }

    /// Forget the last sample (sweep ended or aborted).
    pub fn reset(&mut self) {
        self.last = None;
    }
}
