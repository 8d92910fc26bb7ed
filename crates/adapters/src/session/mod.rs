// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Coordination backend sessions

mod consul;

pub use consul::{ConsulConfig, ConsulSession};

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{AcquireOutcome, FakeBackend, FakeSession, SessionCall};

use async_trait::async_trait;
use thiserror::Error;

/// Errors from session operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("session invalidated: {0}")]
    Invalidated(String),
    #[error("session destroyed")]
    Destroyed,
    #[error("lock lost: {0}")]
    LockLost(String),
    #[error("failed to acquire lock: {0}")]
    AcquireFailed(String),
    #[error("failed to create session: {0}")]
    CreateFailed(String),
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

/// A session with a strongly-consistent coordination backend
///
/// A session scopes lock ownership: a lock acquired through it stays held
/// until the session is reported invalid or destroyed.
#[async_trait]
pub trait LockSession: Send + Sync + Sized + 'static {
    /// Claim `key`, writing `value` alongside the claim
    ///
    /// Resolves once the lock is held or the attempt has failed.
    async fn acquire_lock(&self, key: &str, value: &[u8]) -> Result<(), SessionError>;

    /// Resolves once the session can no longer be trusted to represent ownership
    async fn invalidated(&self) -> SessionError;

    /// Create a fresh, independent session replacing this one
    async fn recreate(&self) -> Result<Self, SessionError>;

    /// Best-effort release; does not wait for the backend
    fn destroy(&self);
}
