// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session-scoped lock lifecycle
//!
//! This module provides:
//! - **LockIdentity** - The key being claimed and the opaque value written with it
//! - **LockMachine** - Pure state machine deciding what to do on each event
//! - **LockEvent** - Structured progress events for observers

pub mod event;
pub mod identity;
pub mod machine;

pub use event::{HeldLevel, LockEvent, LockEventKind};
pub use identity::{LockConfig, LockIdentity, DEFAULT_RETRY_INTERVAL};
pub use machine::{Generation, LockEffect, LockInput, LockMachine, Outcome, Phase, TimerId};
