// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Observer publishing through the `metrics` facade
//!
//! Without an installed recorder every call is a no-op.

use super::LockObserver;
use warden_core::{HeldLevel, LockEvent};

/// Gauge: 1 while the lock is held, 0 otherwise
pub const HELD_GAUGE: &str = "lock_held";
/// Counter of progress events by kind
pub const EVENTS_COUNTER: &str = "lock_events_total";

#[derive(Clone, Copy, Debug, Default)]
pub struct MetricsObserver;

impl MetricsObserver {
    pub fn new() -> Self {
        Self
    }

    /// Register metric descriptions with the installed recorder
    pub fn describe() {
        metrics::describe_gauge!(HELD_GAUGE, "Whether the lock is held by this process");
        metrics::describe_counter!(EVENTS_COUNTER, "Lock lifecycle events");
    }
}

impl LockObserver for MetricsObserver {
    fn emit_level(&self, key: &str, level: HeldLevel) {
        metrics::gauge!(HELD_GAUGE, "key" => key.to_string()).set(f64::from(level.as_u8()));
    }

    fn record(&self, event: &LockEvent) {
        metrics::counter!(
            EVENTS_COUNTER,
            "key" => event.key.clone(),
            "event" => event.kind.as_str()
        )
        .increment(1);
    }
}

#[cfg(test)]
#[path = "metrics_tests.rs"]
mod tests;
