// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! warden-core: Core library for the warden lock coordinator
//!
//! This crate provides:
//! - The pure lock lifecycle state machine
//! - Lock identity, configuration and progress events
//! - A clock abstraction with injectable one-shot timers

pub mod clock;
pub mod lock;

// Re-exports
pub use clock::{Clock, FakeClock, Sleep, SystemClock};
pub use lock::{
    Generation, HeldLevel, LockConfig, LockEffect, LockEvent, LockEventKind, LockIdentity,
    LockInput, LockMachine, Outcome, Phase, TimerId, DEFAULT_RETRY_INTERVAL,
};
