use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::StoreError;

pub const DEFAULT_SAVE_DELAY: Duration = Duration::from_millis(500);

pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock()
    }
}

/// Whatever performs the actual write.
pub trait SaveSink {
    fn persist(&mut self) -> Result<(), StoreError>;
}

impl<F> SaveSink for F
where
    F: FnMut() -> Result<(), StoreError>,
{
    fn persist(&mut self) -> Result<(), StoreError> {
        self()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveReason {
    Debounced,
    WindowClosed,
    Termination,
    Explicit,
}

/// Debounced save timer with lifecycle rules.
///
/// The scheduler never owns the state being saved; callers hand it a
/// [`SaveSink`] whenever a save may run.
pub struct SaveScheduler {
    delay: Duration,
    deadline: Option<Instant>,
    terminating: bool,
    saves: usize,
    last_reason: Option<SaveReason>,
    clock: Arc<dyn Clock>,
}

impl SaveScheduler {
    pub fn new(delay: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            delay,
            deadline: None,
            terminating: false,
            saves: 0,
            last_reason: None,
            clock,
        }
    }

    /// Restarts the quiet period. Ignored once termination has begun.
    pub fn schedule_save(&mut self) {
        if self.terminating {
            return;
        }
        self.deadline = Some(self.clock.now() + self.delay);
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn is_terminating(&self) -> bool {
        self.terminating
    }

    /// Time left before the pending save fires.
    pub fn time_until_due(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(self.clock.now()))
    }

    /// Runs the pending save if its deadline has passed.
    pub fn poll(&mut self, sink: &mut dyn SaveSink) -> bool {
        match self.deadline {
            Some(deadline) if deadline <= self.clock.now() => {
                self.run(SaveReason::Debounced, sink);
                true
            }
            _ => false,
        }
    }

    /// Saves right away and cancels any pending timer.
    pub fn flush_now(&mut self, sink: &mut dyn SaveSink) {
        self.run(SaveReason::Explicit, sink);
    }

    /// A window is closing. Flushes unless the application is tearing down.
    pub fn on_window_closing(&mut self, sink: &mut dyn SaveSink) -> bool {
        if self.terminating {
            debug!("window closed during termination; save suppressed");
            return false;
        }
        self.run(SaveReason::WindowClosed, sink);
        true
    }

    /// Final flush, taken before any window closes. Later saves are suppressed.
    pub fn on_terminate(&mut self, sink: &mut dyn SaveSink) {
        if self.terminating {
            return;
        }
        self.run(SaveReason::Termination, sink);
        self.terminating = true;
    }

    pub fn saves(&self) -> usize {
        self.saves
    }

    pub fn last_reason(&self) -> Option<SaveReason> {
        self.last_reason
    }

    fn run(&mut self, reason: SaveReason, sink: &mut dyn SaveSink) {
        self.deadline = None;
        if let Err(err) = sink.persist() {
            warn!(%err, ?reason, "failed to persist session; keeping in-memory state");
        }
        self.saves += 1;
        self.last_reason = Some(reason);
        debug!(?reason, saves = self.saves, "session persisted");
    }
}
