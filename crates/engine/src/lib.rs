// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Warden lock coordination engine

mod coordinator;
mod error;
mod ready;

pub use coordinator::LockCoordinator;
pub use error::LockError;
pub use ready::{ready_channel, Ready, ReadySignal};
