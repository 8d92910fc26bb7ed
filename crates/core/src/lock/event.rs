// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Progress events and the held level reported to observers

use super::LockIdentity;
use serde::{Deserialize, Serialize};

/// Binary "is the lock held" level
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HeldLevel {
    NotHeld,
    Held,
}

impl HeldLevel {
    pub fn as_u8(self) -> u8 {
        match self {
            HeldLevel::NotHeld => 0,
            HeldLevel::Held => 1,
        }
    }
}

/// Named step in a lock's lifecycle
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LockEventKind {
    Starting,
    AcquiringLock,
    AcquireLockFailed,
    AcquireLockSucceeded,
    Started,
    SessionError,
    LostLock,
    RetryingAcquiringLock,
    RecreateFailed,
    ShuttingDown,
    Done,
}

impl LockEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LockEventKind::Starting => "starting",
            LockEventKind::AcquiringLock => "acquiring-lock",
            LockEventKind::AcquireLockFailed => "acquire-lock-failed",
            LockEventKind::AcquireLockSucceeded => "acquire-lock-succeeded",
            LockEventKind::Started => "started",
            LockEventKind::SessionError => "session-error",
            LockEventKind::LostLock => "lost-lock",
            LockEventKind::RetryingAcquiringLock => "retrying-acquiring-lock",
            LockEventKind::RecreateFailed => "recreate-failed",
            LockEventKind::ShuttingDown => "shutting-down",
            LockEventKind::Done => "done",
        }
    }

    /// Whether the event reports a failure
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            LockEventKind::AcquireLockFailed
                | LockEventKind::SessionError
                | LockEventKind::LostLock
                | LockEventKind::RecreateFailed
        )
    }
}

impl std::fmt::Display for LockEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured progress event
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LockEvent {
    pub key: String,
    pub value: String,
    pub kind: LockEventKind,
    pub error: Option<String>,
}

impl LockEvent {
    pub fn new(identity: &LockIdentity, kind: LockEventKind) -> Self {
        Self {
            key: identity.key().to_string(),
            value: identity.value_lossy().into_owned(),
            kind,
            error: None,
        }
    }

    pub fn with_error(mut self, error: Option<String>) -> Self {
        self.error = error;
        self
    }
}
