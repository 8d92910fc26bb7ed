// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Clock abstraction for testable time handling

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;

/// A one-shot timer future returned by [`Clock::sleep`]
pub type Sleep = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// A clock that provides the current time and one-shot timers
pub trait Clock: Clone + Send + Sync + 'static {
    fn now(&self) -> Instant;

    /// Returns a future that completes once `duration` has elapsed on this clock
    fn sleep(&self, duration: Duration) -> Sleep;
}

/// Real system clock
#[derive(Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) -> Sleep {
        Box::pin(tokio::time::sleep(duration))
    }
}

struct PendingTimer {
    deadline: Instant,
    fire: oneshot::Sender<()>,
}

struct FakeClockState {
    current: Instant,
    timers: Vec<PendingTimer>,
}

/// Fake clock for testing with controllable time
///
/// Timers created with [`Clock::sleep`] only fire when [`FakeClock::advance`]
/// moves the clock past their deadline.
#[derive(Clone)]
pub struct FakeClock {
    state: Arc<Mutex<FakeClockState>>,
}

impl FakeClock {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeClockState {
                current: Instant::now(),
                timers: Vec::new(),
            })),
        }
    }

    /// Advance the clock by the given duration, firing every timer that is due
    pub fn advance(&self, duration: Duration) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.current += duration;
        let now = state.current;

        let (due, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut state.timers)
            .into_iter()
            .partition(|t| t.deadline <= now);
        state.timers = pending;
        drop(state);

        for timer in due {
            // Receiver gone means the timer was superseded
            let _ = timer.fire.send(());
        }
    }

    /// Number of timers still waiting to fire (dropped timers are not counted)
    pub fn pending_timers(&self) -> usize {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.timers.retain(|t| !t.fire.is_closed());
        state.timers.len()
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).current
    }

    fn sleep(&self, duration: Duration) -> Sleep {
        let (fire, fired) = oneshot::channel();
        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            let deadline = state.current + duration;
            state.timers.push(PendingTimer { deadline, fire });
        }

        Box::pin(async move {
            if fired.await.is_err() {
                // Clock dropped before the deadline was reached; never fire
                std::future::pending::<()>().await;
            }
        })
    }
}

#[cfg(test)]
#[path = "clock_tests.rs"]
mod tests;
