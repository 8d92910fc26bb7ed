// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the lock coordinator

use thiserror::Error;

/// Errors that end a coordinator run
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LockError {
    /// The lock was held and then lost
    #[error("lost lock '{key}'")]
    LockLost { key: String },
}
