//! Sequential task scheduler.
//!
//! Drives a queue of named steps and delay markers one tick at a time. A
//! step answers `Continue`, `Retry` or `Abort`; waiting on the host is
//! expressed as `Retry` plus polling, bounded by a per-step time budget.
//! The scheduler never looks at why a step failed.
//!
//! Steps receive the caller's context (`&mut C`) and a [`StepControl`] for
//! splicing more work into the queue while they run.

use std::cell::Cell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;
use std::time::{Duration, Instant};

use tracing::{debug, error, warn};

use crate::config::SchedulerConfig;

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Monotonic time source, measured from an arbitrary origin.
pub trait Clock {
    fn now(&self) -> Duration;
}

/// Wall clock backed by `Instant`.
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Hand-driven clock. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock(Rc<Cell<Duration>>);

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance_ms(&self, ms: u64) {
        self.0.set(self.0.get() + Duration::from_millis(ms));
    }

    pub fn set(&self, at: Duration) {
        self.0.set(at);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        self.0.get()
    }
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepResult {
    /// Done; move on.
    Continue,
    /// Not yet; run again next tick.
    Retry,
    /// Stop the whole chain.
    Abort,
}

pub type StepFn<C> = Box<dyn FnMut(&mut C, &mut StepControl<C>) -> StepResult>;

pub enum Task<C> {
    Step { name: String, action: StepFn<C> },
    Delay(u64),
}

impl<C> Task<C> {
    pub fn step<F>(name: impl Into<String>, action: F) -> Self
    where
        F: FnMut(&mut C, &mut StepControl<C>) -> StepResult + 'static,
    {
        Task::Step { name: name.into(), action: Box::new(action) }
    }

    pub fn delay(ms: u64) -> Self {
        Task::Delay(ms)
    }

    pub fn name(&self) -> &str {
        match self {
            Task::Step { name, .. } => name,
            Task::Delay(_) => "<delay>",
        }
    }
}

impl<C> fmt::Debug for Task<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Task::Step { name, .. } => write!(f, "Step({name})"),
            Task::Delay(ms) => write!(f, "Delay({ms}ms)"),
        }
    }
}

enum Splice<C> {
    Insert(Task<C>),
    InsertAll(Vec<Task<C>>),
    Append(Task<C>),
}

/// Queue edits requested by a running step, applied when it returns.
pub struct StepControl<C> {
    edits: Vec<Splice<C>>,
}

impl<C> StepControl<C> {
    fn new() -> Self {
        Self { edits: Vec::new() }
    }

    /// Run `action` right after the current step. Later inserts run first.
    pub fn insert<F>(&mut self, name: impl Into<String>, action: F)
    where
        F: FnMut(&mut C, &mut StepControl<C>) -> StepResult + 'static,
    {
        self.edits.push(Splice::Insert(Task::step(name, action)));
    }

    /// Run `tasks` right after the current step, in the given order.
    pub fn insert_all(&mut self, tasks: Vec<Task<C>>) {
        self.edits.push(Splice::InsertAll(tasks));
    }

    pub fn enqueue<F>(&mut self, name: impl Into<String>, action: F)
    where
        F: FnMut(&mut C, &mut StepControl<C>) -> StepResult + 'static,
    {
        self.edits.push(Splice::Append(Task::step(name, action)));
    }

    pub fn delay_next(&mut self, ms: u64) {
        self.edits.push(Splice::Append(Task::delay(ms)));
    }

    pub fn insert_delay_next(&mut self, ms: u64) {
        self.edits.push(Splice::Insert(Task::delay(ms)));
    }
}

// ---------------------------------------------------------------------------
// Stop reasons
// ---------------------------------------------------------------------------

/// Why the scheduler last went idle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    Completed,
    Aborted { step: String },
    TimedOut { step: String, elapsed: Duration },
    Cancelled,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Completed => write!(f, "completed"),
            StopReason::Aborted { step } => write!(f, "aborted at {step}"),
            StopReason::TimedOut { step, elapsed } => {
                write!(f, "timed out at {step} after {}ms", elapsed.as_millis())
            }
            StopReason::Cancelled => write!(f, "cancelled"),
        }
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Single-threaded step queue. The front of the queue is the cursor.
pub struct TaskScheduler<C> {
    queue: VecDeque<Task<C>>,
    clock: Rc<dyn Clock>,
    time_budget: Duration,
    abort_on_timeout: bool,
    /// When the step at the cursor first ran.
    step_started: Option<Duration>,
    /// When the delay at the cursor expires.
    delay_until: Option<Duration>,
    cleanup: Option<Box<dyn FnMut(&mut C)>>,
    last_stop: Option<StopReason>,
}

impl<C> TaskScheduler<C> {
    pub fn new(clock: Rc<dyn Clock>, config: &SchedulerConfig) -> Self {
        Self {
            queue: VecDeque::new(),
            clock,
            time_budget: Duration::from_millis(config.time_budget_ms),
            abort_on_timeout: config.abort_on_timeout,
            step_started: None,
            delay_until: None,
            cleanup: None,
            last_stop: None,
        }
    }

    pub fn set_config(&mut self, config: &SchedulerConfig) {
        self.time_budget = Duration::from_millis(config.time_budget_ms);
        self.abort_on_timeout = config.abort_on_timeout;
    }

    /// Hook run whenever the queue is torn down by an abort or timeout.
    pub fn set_cleanup<F>(&mut self, hook: F)
    where
        F: FnMut(&mut C) + 'static,
    {
        self.cleanup = Some(Box::new(hook));
    }

    pub fn clock(&self) -> Rc<dyn Clock> {
        Rc::clone(&self.clock)
    }

    pub fn is_busy(&self) -> bool {
        !self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn last_stop(&self) -> Option<&StopReason> {
        self.last_stop.as_ref()
    }

    /// Name of the task at the cursor.
    pub fn current(&self) -> Option<&str> {
        self.queue.front().map(Task::name)
    }

    // -- Queue edits --------------------------------------------------------

    pub fn enqueue<F>(&mut self, name: impl Into<String>, action: F)
    where
        F: FnMut(&mut C, &mut StepControl<C>) -> StepResult + 'static,
    {
        self.push(Task::step(name, action));
    }

    /// Place a step directly after the cursor (at the front when idle).
    pub fn insert<F>(&mut self, name: impl Into<String>, action: F)
    where
        F: FnMut(&mut C, &mut StepControl<C>) -> StepResult + 'static,
    {
        self.insert_task(Task::step(name, action));
    }

    pub fn insert_all(&mut self, tasks: Vec<Task<C>>) {
        let at = self.insertion_point();
        for (offset, task) in tasks.into_iter().enumerate() {
            self.queue.insert(at + offset, task);
        }
    }

    pub fn delay_next(&mut self, ms: u64) {
        self.push(Task::delay(ms));
    }

    pub fn insert_delay_next(&mut self, ms: u64) {
        self.insert_task(Task::delay(ms));
    }

    pub fn push(&mut self, task: Task<C>) {
        self.queue.push_back(task);
    }

    fn insert_task(&mut self, task: Task<C>) {
        let at = self.insertion_point();
        self.queue.insert(at, task);
    }

    fn insertion_point(&self) -> usize {
        self.queue.len().min(1)
    }

    // -- Driving ------------------------------------------------------------

    /// Advance the queue by at most one step.
    pub fn tick(&mut self, ctx: &mut C) {
        if !self.drain_elapsed_delays() {
            return;
        }

        let now = self.clock.now();
        let mut control = StepControl::new();
        let (name, result) = match self.queue.front_mut() {
            Some(Task::Step { name, action }) => {
                let started = *self.step_started.get_or_insert(now);
                let result = action(ctx, &mut control);
                (name.clone(), (result, now.saturating_sub(started)))
            }
            _ => return,
        };

        match result {
            (StepResult::Continue, _) => {
                self.apply(control);
                self.queue.pop_front();
                self.step_started = None;
                debug!(step = %name, remaining = self.queue.len(), "Step completed");
                if self.queue.is_empty() {
                    self.last_stop = Some(StopReason::Completed);
                }
            }
            (StepResult::Retry, elapsed) if elapsed > self.time_budget => {
                if self.abort_on_timeout {
                    error!(
                        step = %name,
                        elapsed_ms = elapsed.as_millis() as u64,
                        budget_ms = self.time_budget.as_millis() as u64,
                        "Step exceeded time budget, aborting chain"
                    );
                    self.teardown(ctx, StopReason::TimedOut { step: name, elapsed });
                } else {
                    warn!(
                        step = %name,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "Step exceeded time budget, skipping"
                    );
                    self.queue.pop_front();
                    self.step_started = None;
                    if self.queue.is_empty() {
                        self.last_stop = Some(StopReason::Completed);
                    }
                }
            }
            (StepResult::Retry, _) => {
                self.apply(control);
            }
            (StepResult::Abort, _) => {
                error!(step = %name, "Step aborted chain");
                self.teardown(ctx, StopReason::Aborted { step: name });
            }
        }
    }

    /// Clear everything and run the cleanup hook. No-op when idle.
    pub fn abort(&mut self, ctx: &mut C) {
        if self.queue.is_empty() {
            return;
        }
        warn!(pending = self.queue.len(), current = ?self.current(), "Scheduler cancelled");
        self.teardown(ctx, StopReason::Cancelled);
    }

    fn teardown(&mut self, ctx: &mut C, reason: StopReason) {
        self.queue.clear();
        self.step_started = None;
        self.delay_until = None;
        self.last_stop = Some(reason);
        if let Some(hook) = self.cleanup.as_mut() {
            hook(ctx);
        }
    }

    /// Pop delays that have run out. Returns false while one is pending.
    fn drain_elapsed_delays(&mut self) -> bool {
        while let Some(Task::Delay(ms)) = self.queue.front() {
            let now = self.clock.now();
            let until = *self.delay_until.get_or_insert(now + Duration::from_millis(*ms));
            if now < until {
                return false;
            }
            self.queue.pop_front();
            self.delay_until = None;
            if self.queue.is_empty() {
                self.last_stop = Some(StopReason::Completed);
            }
        }
        true
    }

    fn apply(&mut self, control: StepControl<C>) {
        // The running step sits at index 0.
        for edit in control.edits {
            match edit {
                Splice::Insert(task) => self.queue.insert(1, task),
                Splice::InsertAll(tasks) => {
                    for (offset, task) in tasks.into_iter().enumerate() {
                        self.queue.insert(1 + offset, task);
                    }
                }
                Splice::Append(task) => self.queue.push_back(task),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
