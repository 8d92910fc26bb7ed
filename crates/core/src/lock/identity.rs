// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lock identity and configuration

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::time::Duration;

/// Delay between a failed attempt and the next one
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(5);

/// The resource being claimed and the payload written alongside the claim
///
/// `value` is opaque to the coordinator (typically the holder's identity).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LockIdentity {
    key: String,
    value: Vec<u8>,
}

impl LockIdentity {
    pub fn new(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }

    /// Value rendered for logs
    pub fn value_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.value)
    }
}

impl std::fmt::Display for LockIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key)
    }
}

/// Lock configuration, fixed for the lifetime of a coordinator
#[derive(Clone, Debug)]
pub struct LockConfig {
    pub identity: LockIdentity,
    /// Fixed delay before retrying after a failure (no backoff)
    pub retry_interval: Duration,
}

impl LockConfig {
    pub fn new(identity: LockIdentity) -> Self {
        Self {
            identity,
            retry_interval: DEFAULT_RETRY_INTERVAL,
        }
    }

    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }
}
