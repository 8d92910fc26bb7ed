// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! No-op observer

use super::LockObserver;
use warden_core::{HeldLevel, LockEvent};

/// Observer that discards everything
#[derive(Clone, Copy, Debug, Default)]
pub struct NoOpObserver;

impl NoOpObserver {
    pub fn new() -> Self {
        Self
    }
}

impl LockObserver for NoOpObserver {
    fn emit_level(&self, _key: &str, _level: HeldLevel) {}

    fn record(&self, _event: &LockEvent) {}
}
