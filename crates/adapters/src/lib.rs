// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
// Enable coverage(off) attribute for excluding test infrastructure
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Adapters for the coordination backend and lock observers

pub mod observer;
pub mod session;
pub mod traced;

pub use observer::{LockObserver, MetricsObserver, NoOpObserver};
pub use session::{ConsulConfig, ConsulSession, LockSession, SessionError};
pub use traced::TracedSession;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
pub use observer::{FakeObserver, ObserverCall};
#[cfg(any(test, feature = "test-support"))]
pub use session::{AcquireOutcome, FakeBackend, FakeSession, SessionCall};
