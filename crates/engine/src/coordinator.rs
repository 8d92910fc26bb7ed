// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lock coordinator
//!
//! Runs a [`LockMachine`] against a live session. One control loop waits on
//! the shutdown future, the completion channel and the armed retry timer;
//! every event becomes a [`LockInput`] and the resulting effects are executed
//! in order. Acquisitions, recreations and invalidity watchers run as tasks
//! that report tagged completions back into the loop.

use crate::{LockError, ReadySignal};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{Instrument, Level};
use warden_adapters::{LockObserver, LockSession, SessionError};
use warden_core::{
    Clock, Generation, LockConfig, LockEffect, LockEvent, LockEventKind, LockInput, LockMachine,
    Outcome, Sleep, TimerId,
};

/// Result of a background task
enum Completion<S> {
    Acquired {
        generation: Generation,
        result: Result<(), SessionError>,
    },
    Invalidated {
        generation: Generation,
        error: SessionError,
    },
    Recreated(Result<S, SessionError>),
}

/// Holds one named lock through a backend session
pub struct LockCoordinator<S, O, C> {
    session: S,
    config: LockConfig,
    observer: O,
    clock: C,
}

impl<S, O, C> LockCoordinator<S, O, C>
where
    S: LockSession,
    O: LockObserver,
    C: Clock,
{
    pub fn new(session: S, config: LockConfig, observer: O, clock: C) -> Self {
        Self {
            session,
            config,
            observer,
            clock,
        }
    }

    /// Acquire the lock and keep it until `shutdown` completes or it is lost
    ///
    /// `ready` fires once, right after the lock is first acquired. Returns
    /// `Ok` on shutdown, whether or not the lock was ever held.
    pub async fn run(
        self,
        shutdown: impl Future<Output = ()>,
        ready: ReadySignal,
    ) -> Result<(), LockError> {
        let identity = self.config.identity.clone();
        let span = tracing::info_span!(
            "lock",
            key = identity.key(),
            value = %identity.value_lossy()
        );
        self.run_loop(shutdown, ready).instrument(span).await
    }

    async fn run_loop(
        self,
        shutdown: impl Future<Output = ()>,
        ready: ReadySignal,
    ) -> Result<(), LockError> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let key = self.config.identity.key().to_string();

        let mut run = Run {
            machine: LockMachine::new(self.config.identity.clone()),
            session: Arc::new(self.session),
            staged: None,
            watcher: None,
            timer: None,
            ready: Some(ready),
            observer: self.observer,
            clock: self.clock,
            config: self.config,
            tx,
        };
        run.watch_invalidity();

        let mut shutdown = std::pin::pin!(shutdown);
        let mut outcome = run.apply(LockInput::Start);

        let outcome = loop {
            if let Some(outcome) = outcome {
                break outcome;
            }

            let input = tokio::select! {
                biased;
                _ = &mut shutdown => LockInput::Shutdown,
                Some(completion) = rx.recv() => run.accept(completion),
                timer = fire(&mut run.timer) => LockInput::RetryTimerFired { timer },
            };
            outcome = run.apply(input);
        };

        run.stop();

        // Sessions recreated too late to be used must not linger
        rx.close();
        while let Ok(completion) = rx.try_recv() {
            if let Completion::Recreated(Ok(orphan)) = completion {
                orphan.destroy();
            }
        }

        match outcome {
            Outcome::Released => Ok(()),
            Outcome::LockLost => Err(LockError::LockLost { key }),
        }
    }
}

/// Wait for the armed timer, disarming it once it fires
async fn fire(timer: &mut Option<(TimerId, Sleep)>) -> TimerId {
    match timer {
        Some((id, sleep)) => {
            sleep.await;
            let fired = *id;
            *timer = None;
            fired
        }
        None => std::future::pending().await,
    }
}

/// Log level for a lifecycle event
///
/// Losing the lock ends the run. Other failures are retried.
fn severity(kind: LockEventKind) -> Level {
    match kind {
        LockEventKind::LostLock => Level::ERROR,
        kind if kind.is_failure() => Level::WARN,
        _ => Level::INFO,
    }
}

/// State of one coordinator run
struct Run<S, O, C> {
    machine: LockMachine,
    session: Arc<S>,
    /// Recreated session waiting to be installed
    staged: Option<S>,
    watcher: Option<JoinHandle<()>>,
    timer: Option<(TimerId, Sleep)>,
    ready: Option<ReadySignal>,
    observer: O,
    clock: C,
    config: LockConfig,
    tx: mpsc::UnboundedSender<Completion<S>>,
}

impl<S, O, C> Run<S, O, C>
where
    S: LockSession,
    O: LockObserver,
    C: Clock,
{
    /// Feed one input through the machine and execute its effects
    fn apply(&mut self, input: LockInput) -> Option<Outcome> {
        tracing::trace!(?input, phase = ?self.machine.phase(), "input");
        let (next, effects) = self.machine.transition(input);
        self.machine = next;

        let mut outcome = None;
        for effect in effects {
            if let Some(finished) = self.execute(effect) {
                outcome = Some(finished);
            }
        }

        // A recreated session the machine did not install is released at once
        if let Some(rejected) = self.staged.take() {
            tracing::debug!("discarding unused session");
            rejected.destroy();
        }
        outcome
    }

    fn accept(&mut self, completion: Completion<S>) -> LockInput {
        match completion {
            Completion::Acquired { generation, result } => LockInput::AcquireCompleted {
                generation,
                result: result.map_err(|e| e.to_string()),
            },
            Completion::Invalidated { generation, error } => LockInput::SessionInvalidated {
                generation,
                error: Some(error.to_string()),
            },
            Completion::Recreated(result) => {
                let result = result.map(|session| {
                    if let Some(previous) = self.staged.replace(session) {
                        previous.destroy();
                    }
                });
                LockInput::RecreateCompleted {
                    result: result.map_err(|e| e.to_string()),
                }
            }
        }
    }

    fn execute(&mut self, effect: LockEffect) -> Option<Outcome> {
        match effect {
            LockEffect::Emit(event) => self.report(&event),

            LockEffect::SetLevel(level) => {
                self.observer.emit_level(self.config.identity.key(), level);
            }

            LockEffect::Acquire { generation } => {
                let session = Arc::clone(&self.session);
                let tx = self.tx.clone();
                let key = self.config.identity.key().to_string();
                let value = self.config.identity.value().to_vec();
                tokio::spawn(
                    async move {
                        let result = session.acquire_lock(&key, &value).await;
                        // Receiver gone means the run is over
                        let _ = tx.send(Completion::Acquired { generation, result });
                    }
                    .in_current_span(),
                );
            }

            LockEffect::ArmTimer { timer } => {
                let sleep = self.clock.sleep(self.config.retry_interval);
                self.timer = Some((timer, sleep));
            }

            LockEffect::CancelTimer => {
                self.timer = None;
            }

            LockEffect::Recreate => {
                let session = Arc::clone(&self.session);
                let tx = self.tx.clone();
                tokio::spawn(
                    async move {
                        let result = session.recreate().await;
                        if let Err(mpsc::error::SendError(Completion::Recreated(Ok(orphan)))) =
                            tx.send(Completion::Recreated(result))
                        {
                            orphan.destroy();
                        }
                    }
                    .in_current_span(),
                );
            }

            LockEffect::ReplaceSession { generation } => match self.staged.take() {
                Some(session) => {
                    tracing::debug!(%generation, "session replaced");
                    if let Some(watcher) = self.watcher.take() {
                        watcher.abort();
                    }
                    // An attempt still pending on the old session must never win
                    self.session.destroy();
                    self.session = Arc::new(session);
                    self.watch_invalidity();
                }
                None => tracing::error!(%generation, "no recreated session to install"),
            },

            LockEffect::SignalReady => {
                if let Some(ready) = self.ready.take() {
                    ready.signal();
                }
            }

            LockEffect::DestroySession => self.session.destroy(),

            LockEffect::Finish(outcome) => return Some(outcome),
        }
        None
    }

    fn report(&self, event: &LockEvent) {
        let error = event.error.as_deref();
        match severity(event.kind) {
            Level::ERROR => tracing::error!(error, "{}", event.kind),
            Level::WARN => tracing::warn!(error, "{}", event.kind),
            _ => tracing::info!("{}", event.kind),
        }
        self.observer.record(event);
    }

    /// Forward the current session's invalidity into the loop
    fn watch_invalidity(&mut self) {
        let generation = self.machine.generation();
        let session = Arc::clone(&self.session);
        let tx = self.tx.clone();
        self.watcher = Some(tokio::spawn(
            async move {
                let error = session.invalidated().await;
                let _ = tx.send(Completion::Invalidated { generation, error });
            }
            .in_current_span(),
        ));
    }

    fn stop(&mut self) {
        if let Some(watcher) = self.watcher.take() {
            watcher.abort();
        }
        self.timer = None;
    }
}

#[cfg(test)]
#[path = "coordinator_tests.rs"]
mod tests;
