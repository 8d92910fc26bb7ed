// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lock observers: where held levels and progress events are reported

mod metrics;
mod noop;

pub use self::metrics::MetricsObserver;
pub use noop::NoOpObserver;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeObserver, ObserverCall};

use std::sync::Arc;
use warden_core::{HeldLevel, LockEvent};

/// Receives the held level and the progress events of one lock
///
/// Observers are handed to a coordinator at construction; nothing is
/// registered process-wide.
pub trait LockObserver: Send + Sync + 'static {
    /// Report whether `key` is currently held
    fn emit_level(&self, key: &str, level: HeldLevel);

    /// Record a progress event
    fn record(&self, event: &LockEvent);
}

impl<O: LockObserver + ?Sized> LockObserver for Arc<O> {
    fn emit_level(&self, key: &str, level: HeldLevel) {
        (**self).emit_level(key, level)
    }

    fn record(&self, event: &LockEvent) {
        (**self).record(event)
    }
}
