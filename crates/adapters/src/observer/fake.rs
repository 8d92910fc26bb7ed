// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake observer for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use super::LockObserver;
use std::sync::{Arc, Mutex};
use warden_core::{HeldLevel, LockEvent, LockEventKind};

/// Recorded observer call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObserverCall {
    Level { key: String, level: HeldLevel },
    Event(LockEvent),
}

/// Observer that records every call in order
#[derive(Clone, Default)]
pub struct FakeObserver {
    calls: Arc<Mutex<Vec<ObserverCall>>>,
}

impl FakeObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all recorded calls
    pub fn calls(&self) -> Vec<ObserverCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Emitted levels, in order
    pub fn levels(&self) -> Vec<HeldLevel> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ObserverCall::Level { level, .. } => Some(level),
                ObserverCall::Event(_) => None,
            })
            .collect()
    }

    /// Recorded events, in order
    pub fn events(&self) -> Vec<LockEvent> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ObserverCall::Event(event) => Some(event),
                ObserverCall::Level { .. } => None,
            })
            .collect()
    }

    /// Kinds of the recorded events, in order
    pub fn event_kinds(&self) -> Vec<LockEventKind> {
        self.events().into_iter().map(|e| e.kind).collect()
    }

    fn push(&self, call: ObserverCall) {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(call);
    }
}

impl LockObserver for FakeObserver {
    fn emit_level(&self, key: &str, level: HeldLevel) {
        self.push(ObserverCall::Level {
            key: key.to_string(),
            level,
        });
    }

    fn record(&self, event: &LockEvent) {
        self.push(ObserverCall::Event(event.clone()));
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
