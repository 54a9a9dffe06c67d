//! One-shot timers driven by the session tick.
//!
//! Timers hold a deadline instead of a thread: the watcher polls them on
//! every tick with the current [`Clock`](crate::clock::Clock) reading, which
//! keeps cancellation trivial and makes them deterministic under test.

use std::time::{Duration, Instant};

/// Single-deadline timer. Fires at most once per arming.
#[derive(Debug, Clone)]
pub struct OneShotTimer {
    /// When the timer expires (None if not armed).
    deadline: Option<Instant>,
    duration: Duration,
}

impl OneShotTimer {
    pub fn new(duration: Duration) -> Self {
        Self {
            deadline: None,
            duration,
        }
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Arms (or re-arms) the timer from `now`.
    pub fn arm(&mut self, now: Instant) {
        self.deadline = Some(now + self.duration);
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Remaining time, or None if not armed.
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(now))
    }

    /// Returns true exactly once when `now` reaches the deadline, disarming the timer.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

/// Bounds how long the session may stay in the loading state.
///
/// Armed when a load starts, cancelled on any exit from loading. A source
/// fallback keeps the running deadline. Firing never triggers a fallback.
#[derive(Debug, Clone)]
pub struct LoadWatchdog {
    timer: OneShotTimer,
}

impl LoadWatchdog {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timer: OneShotTimer::new(timeout),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timer.duration()
    }

    /// Starts the watchdog unless it is already running; a single timer
    /// covers one continuous loading period.
    pub fn start(&mut self, now: Instant) {
        if !self.timer.is_armed() {
            self.timer.arm(now);
        }
    }

    /// Arms a fresh deadline from `now`, dropping any running one.
    pub fn restart(&mut self, now: Instant) {
        self.timer.cancel();
        self.timer.arm(now);
    }

    pub fn cancel(&mut self) {
        self.timer.cancel();
    }

    pub fn is_running(&self) -> bool {
        self.timer.is_armed()
    }

    pub fn poll(&mut self, now: Instant) -> bool {
        self.timer.poll(now)
    }
}
