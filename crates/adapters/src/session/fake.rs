// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake coordination backend for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{LockSession, SessionError};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::sync::{oneshot, watch, Notify};

/// How the next acquisition attempt should behave
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// Succeed immediately, taking the key from any current holder
    Grant,
    /// Fail immediately with the given reason
    Fail(String),
    /// Stay pending until [`FakeBackend::resolve_held`] is called
    Hold,
}

/// Recorded backend call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCall {
    Create {
        session: u64,
    },
    Acquire {
        session: u64,
        key: String,
        value: Vec<u8>,
    },
    Recreate {
        session: u64,
    },
    Destroy {
        session: u64,
    },
}

struct SessionRecord {
    invalid: watch::Sender<Option<SessionError>>,
    destroyed: bool,
}

struct Waiter {
    session: u64,
    key: String,
    value: Vec<u8>,
    respond: oneshot::Sender<Result<(), SessionError>>,
    /// Waiting because another session holds the key; granted on release
    contended: bool,
}

#[derive(Default)]
struct BackendState {
    next_session: u64,
    sessions: HashMap<u64, SessionRecord>,
    holders: HashMap<String, u64>,
    values: HashMap<String, Vec<u8>>,
    acquire_script: VecDeque<AcquireOutcome>,
    recreate_failures: VecDeque<String>,
    recreates_held: bool,
    waiters: Vec<Waiter>,
    calls: Vec<SessionCall>,
}

impl BackendState {
    /// Drop everything `session` holds or waits for, handing released keys
    /// to the next contended waiter
    fn release(&mut self, session: u64) {
        let (mine, others): (Vec<_>, Vec<_>) = std::mem::take(&mut self.waiters)
            .into_iter()
            .partition(|w| w.session == session);
        self.waiters = others;
        for waiter in mine {
            let _ = waiter.respond.send(Err(SessionError::Invalidated(
                "session released".to_string(),
            )));
        }

        let released: Vec<String> = self
            .holders
            .iter()
            .filter(|(_, holder)| **holder == session)
            .map(|(key, _)| key.clone())
            .collect();

        for key in released {
            self.holders.remove(&key);
            self.values.remove(&key);

            let next = self
                .waiters
                .iter()
                .position(|w| w.contended && w.key == key && !w.respond.is_closed());
            if let Some(pos) = next {
                let waiter = self.waiters.remove(pos);
                self.holders.insert(key.clone(), waiter.session);
                self.values.insert(key, waiter.value);
                let _ = waiter.respond.send(Ok(()));
            }
        }
    }
}

/// In-memory lock table shared by every session it creates
#[derive(Clone, Default)]
pub struct FakeBackend {
    state: Arc<Mutex<BackendState>>,
    changed: Arc<Notify>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut BackendState) -> T) -> T {
        let result = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            f(&mut state)
        };
        self.changed.notify_waiters();
        result
    }

    /// Create a new session
    pub fn session(&self) -> FakeSession {
        let (invalid, watcher) = watch::channel(None);
        let id = self.with_state(|state| {
            state.next_session += 1;
            let id = state.next_session;
            state.sessions.insert(
                id,
                SessionRecord {
                    invalid,
                    destroyed: false,
                },
            );
            state.calls.push(SessionCall::Create { session: id });
            id
        });

        FakeSession {
            id,
            backend: self.clone(),
            invalid: watcher,
        }
    }

    /// Queue outcomes for upcoming acquisition attempts
    ///
    /// Without a scripted outcome an attempt succeeds if the key is free and
    /// waits for its release otherwise.
    pub fn script_acquire(&self, outcomes: impl IntoIterator<Item = AcquireOutcome>) {
        self.with_state(|state| state.acquire_script.extend(outcomes));
    }

    /// Make the next recreate call fail
    pub fn fail_next_recreate(&self, reason: &str) {
        self.with_state(|state| state.recreate_failures.push_back(reason.to_string()));
    }

    /// Park recreate calls until [`FakeBackend::release_recreates`]
    pub fn hold_recreates(&self) {
        self.with_state(|state| state.recreates_held = true);
    }

    pub fn release_recreates(&self) {
        self.with_state(|state| state.recreates_held = false);
    }

    fn recreates_held(&self) -> bool {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.recreates_held
    }

    /// Report `session` as invalid, releasing everything it holds
    pub fn invalidate(&self, session: u64, reason: &str) {
        self.with_state(|state| {
            if let Some(record) = state.sessions.get(&session) {
                record
                    .invalid
                    .send_replace(Some(SessionError::Invalidated(reason.to_string())));
            }
            state.release(session);
        });
    }

    /// Resolve the oldest attempt parked by [`AcquireOutcome::Hold`]
    ///
    /// Returns false if no such attempt is pending.
    pub fn resolve_held(&self, result: Result<(), String>) -> bool {
        self.with_state(|state| {
            let Some(pos) = state.waiters.iter().position(|w| !w.contended) else {
                return false;
            };
            let waiter = state.waiters.remove(pos);
            if result.is_ok() {
                state.holders.insert(waiter.key.clone(), waiter.session);
                state.values.insert(waiter.key, waiter.value);
            }
            let _ = waiter.respond.send(result.map_err(SessionError::AcquireFailed));
            true
        })
    }

    /// Number of attempts parked by [`AcquireOutcome::Hold`]
    pub fn held_attempts(&self) -> usize {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.waiters.iter().filter(|w| !w.contended).count()
    }

    /// Session currently holding `key`
    pub fn holder(&self, key: &str) -> Option<u64> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.holders.get(key).copied()
    }

    /// Value written with the current claim on `key`
    pub fn value(&self, key: &str) -> Option<Vec<u8>> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.values.get(key).cloned()
    }

    /// Most recently created session
    pub fn latest_session(&self) -> Option<u64> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        (state.next_session > 0).then_some(state.next_session)
    }

    pub fn is_destroyed(&self, session: u64) -> bool {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.sessions.get(&session).is_some_and(|r| r.destroyed)
    }

    /// Get all recorded calls
    pub fn calls(&self) -> Vec<SessionCall> {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .calls
            .clone()
    }

    /// Number of acquisition attempts made so far
    pub fn acquire_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, SessionCall::Acquire { .. }))
            .count()
    }

    /// Wait until `condition` holds, re-checking after every backend change
    pub async fn wait_until(&self, condition: impl Fn(&FakeBackend) -> bool) {
        loop {
            let changed = self.changed.notified();
            if condition(self) {
                return;
            }
            changed.await;
        }
    }
}

enum Attempt {
    Done(Result<(), SessionError>),
    Parked(oneshot::Receiver<Result<(), SessionError>>),
}

/// Session handed out by a [`FakeBackend`]
pub struct FakeSession {
    id: u64,
    backend: FakeBackend,
    invalid: watch::Receiver<Option<SessionError>>,
}

impl FakeSession {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn backend(&self) -> &FakeBackend {
        &self.backend
    }
}

impl std::fmt::Debug for FakeSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeSession").field("id", &self.id).finish()
    }
}

#[async_trait]
impl LockSession for FakeSession {
    async fn acquire_lock(&self, key: &str, value: &[u8]) -> Result<(), SessionError> {
        let id = self.id;
        let attempt = self.backend.with_state(|state| {
            state.calls.push(SessionCall::Acquire {
                session: id,
                key: key.to_string(),
                value: value.to_vec(),
            });

            match state.sessions.get(&id) {
                Some(record) if record.destroyed => {
                    return Attempt::Done(Err(SessionError::Destroyed));
                }
                Some(record) => {
                    if let Some(error) = record.invalid.borrow().clone() {
                        return Attempt::Done(Err(error));
                    }
                }
                None => return Attempt::Done(Err(SessionError::Destroyed)),
            }

            let outcome = state.acquire_script.pop_front();
            let current = state.holders.get(key).copied();
            let contended = match outcome {
                Some(AcquireOutcome::Grant) => None,
                Some(AcquireOutcome::Fail(reason)) => {
                    return Attempt::Done(Err(SessionError::AcquireFailed(reason)));
                }
                Some(AcquireOutcome::Hold) => Some(false),
                None if current.is_none() || current == Some(id) => None,
                None => Some(true),
            };

            match contended {
                None => {
                    state.holders.insert(key.to_string(), id);
                    state.values.insert(key.to_string(), value.to_vec());
                    Attempt::Done(Ok(()))
                }
                Some(contended) => {
                    let (respond, response) = oneshot::channel();
                    state.waiters.push(Waiter {
                        session: id,
                        key: key.to_string(),
                        value: value.to_vec(),
                        respond,
                        contended,
                    });
                    Attempt::Parked(response)
                }
            }
        });

        match attempt {
            Attempt::Done(result) => result,
            Attempt::Parked(response) => response.await.unwrap_or(Err(SessionError::Destroyed)),
        }
    }

    async fn invalidated(&self) -> SessionError {
        let mut invalid = self.invalid.clone();
        let error = match invalid.wait_for(|e| e.is_some()).await {
            Ok(error) => (*error).clone().unwrap_or(SessionError::Destroyed),
            Err(_) => SessionError::Destroyed,
        };
        error
    }

    async fn recreate(&self) -> Result<FakeSession, SessionError> {
        let id = self.id;
        self.backend.with_state(|state| {
            state.calls.push(SessionCall::Recreate { session: id });
        });
        self.backend.wait_until(|b| !b.recreates_held()).await;

        let failure = self
            .backend
            .with_state(|state| state.recreate_failures.pop_front());

        match failure {
            Some(reason) => Err(SessionError::Unavailable(reason)),
            None => Ok(self.backend.session()),
        }
    }

    fn destroy(&self) {
        let id = self.id;
        self.backend.with_state(|state| {
            state.calls.push(SessionCall::Destroy { session: id });
            if let Some(record) = state.sessions.get_mut(&id) {
                record.destroyed = true;
                if record.invalid.borrow().is_none() {
                    record.invalid.send_replace(Some(SessionError::Destroyed));
                }
            }
            state.release(id);
        });
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
