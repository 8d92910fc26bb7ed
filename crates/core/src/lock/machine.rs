// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lock lifecycle state machine
//!
//! Tracks a single named lock from the first acquisition attempt until it is
//! released on shutdown or lost after being held. The machine is pure: it
//! consumes [`LockInput`]s and returns the [`LockEffect`]s a runner must
//! execute. Every asynchronous result carries the [`Generation`] of the
//! session it was issued against, and every retry timer carries a [`TimerId`],
//! so late results from superseded sessions and superseded timers are
//! discarded here rather than by the runner.

use super::{HeldLevel, LockEvent, LockEventKind, LockIdentity};

/// Tag identifying one backend session in the sequence of recreated sessions
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Generation(pub u64);

impl Generation {
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl std::fmt::Display for Generation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Tag identifying one armed retry timer
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TimerId(pub u64);

/// Lifecycle phase
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Created, no acquisition launched yet
    NotYetAcquired,
    /// One acquisition in flight against the current session
    Acquiring,
    /// Lock held and readiness announced
    Held,
    /// Waiting to retry; `timer` is `None` while a session recreation is in flight
    AwaitingRetry { timer: Option<TimerId> },
}

/// How a run ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Shutdown was requested
    Released,
    /// The lock was lost after being held
    LockLost,
}

/// Events that can trigger lock transitions
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LockInput {
    /// Launch the first acquisition
    Start,
    /// The caller asked to stop
    Shutdown,
    /// The backend reported the session as no longer valid
    SessionInvalidated {
        generation: Generation,
        error: Option<String>,
    },
    /// An acquisition attempt finished
    AcquireCompleted {
        generation: Generation,
        result: Result<(), String>,
    },
    /// A retry timer fired
    RetryTimerFired { timer: TimerId },
    /// A session recreation finished
    RecreateCompleted { result: Result<(), String> },
}

/// Side effects the runner must perform, in order
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LockEffect {
    /// Report a progress event
    Emit(LockEvent),
    /// Report the held level
    SetLevel(HeldLevel),
    /// Start an acquisition against the session of `generation`
    Acquire { generation: Generation },
    /// Arm the retry timer, superseding any armed one
    ArmTimer { timer: TimerId },
    /// Drop any armed retry timer
    CancelTimer,
    /// Start recreating the session
    Recreate,
    /// Install the recreated session as `generation`
    ReplaceSession { generation: Generation },
    /// Fire the caller's ready signal
    SignalReady,
    /// Release the current session
    DestroySession,
    /// Stop the run
    Finish(Outcome),
}

/// State machine for one lock over one run
#[derive(Clone, Debug)]
pub struct LockMachine {
    identity: LockIdentity,
    phase: Phase,
    generation: Generation,
    next_timer: u64,
    launched: bool,
    outcome: Option<Outcome>,
}

impl LockMachine {
    pub fn new(identity: LockIdentity) -> Self {
        Self {
            identity,
            phase: Phase::NotYetAcquired,
            generation: Generation::default(),
            next_timer: 0,
            launched: false,
            outcome: None,
        }
    }

    pub fn identity(&self) -> &LockIdentity {
        &self.identity
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    /// Generation of the current session
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Whether readiness has been announced
    pub fn is_ready(&self) -> bool {
        self.phase == Phase::Held
    }

    pub fn outcome(&self) -> Option<Outcome> {
        self.outcome
    }

    pub fn is_finished(&self) -> bool {
        self.outcome.is_some()
    }

    /// Pure state transition function
    pub fn transition(&self, input: LockInput) -> (LockMachine, Vec<LockEffect>) {
        let mut next = self.clone();
        let mut effects = Vec::new();

        if self.is_finished() {
            return (next, effects);
        }

        match input {
            LockInput::Start => {
                if self.phase == Phase::NotYetAcquired {
                    effects.push(self.emit(LockEventKind::Starting, None));
                    next.launch(self.generation, &mut effects);
                }
            }

            LockInput::Shutdown => {
                effects.push(self.emit(LockEventKind::ShuttingDown, None));
                // Never report "not held" before anything was attempted
                if self.launched {
                    effects.push(LockEffect::SetLevel(HeldLevel::NotHeld));
                }
                next.finish(Outcome::Released, &mut effects);
            }

            LockInput::SessionInvalidated { generation, error } => {
                if generation != self.generation {
                    return (next, effects);
                }
                match self.phase {
                    Phase::Held => {
                        effects.push(self.emit(LockEventKind::LostLock, error));
                        effects.push(LockEffect::SetLevel(HeldLevel::NotHeld));
                        next.finish(Outcome::LockLost, &mut effects);
                    }
                    Phase::NotYetAcquired | Phase::Acquiring => {
                        effects.push(self.emit(LockEventKind::SessionError, error));
                        effects.push(next.arm_retry());
                    }
                    Phase::AwaitingRetry { .. } => {
                        // A retry is already pending for this session
                        effects.push(self.emit(LockEventKind::SessionError, error));
                    }
                }
            }

            LockInput::AcquireCompleted { generation, result } => {
                if generation != self.generation {
                    return (next, effects);
                }
                // An attempt may still be outstanding after a pre-ready
                // invalidity armed the timer; its result is honoured
                let waiting = matches!(
                    self.phase,
                    Phase::Acquiring | Phase::AwaitingRetry { timer: Some(_) }
                );
                match (waiting, result) {
                    (true, Ok(())) => {
                        effects.push(self.emit(LockEventKind::AcquireLockSucceeded, None));
                        effects.push(LockEffect::SetLevel(HeldLevel::Held));
                        effects.push(LockEffect::SignalReady);
                        effects.push(LockEffect::CancelTimer);
                        effects.push(self.emit(LockEventKind::Started, None));
                        next.phase = Phase::Held;
                    }
                    (true, Err(error)) => {
                        effects.push(self.emit(LockEventKind::AcquireLockFailed, Some(error)));
                        effects.push(LockEffect::SetLevel(HeldLevel::NotHeld));
                        effects.push(next.arm_retry());
                    }
                    // A recreate is in flight; the session is being replaced
                    (false, Err(error)) => {
                        effects.push(self.emit(LockEventKind::AcquireLockFailed, Some(error)));
                    }
                    (false, Ok(())) => {}
                }
            }

            LockInput::RetryTimerFired { timer } => {
                if self.phase == (Phase::AwaitingRetry { timer: Some(timer) }) {
                    effects.push(self.emit(LockEventKind::RetryingAcquiringLock, None));
                    effects.push(LockEffect::Recreate);
                    next.phase = Phase::AwaitingRetry { timer: None };
                }
            }

            LockInput::RecreateCompleted { result } => {
                if self.phase != (Phase::AwaitingRetry { timer: None }) {
                    return (next, effects);
                }
                match result {
                    Ok(()) => {
                        let generation = self.generation.next();
                        next.generation = generation;
                        effects.push(LockEffect::ReplaceSession { generation });
                        next.launch(generation, &mut effects);
                    }
                    Err(error) => {
                        effects.push(self.emit(LockEventKind::RecreateFailed, Some(error)));
                        effects.push(next.arm_retry());
                    }
                }
            }
        }

        (next, effects)
    }

    fn emit(&self, kind: LockEventKind, error: Option<String>) -> LockEffect {
        LockEffect::Emit(LockEvent::new(&self.identity, kind).with_error(error))
    }

    fn launch(&mut self, generation: Generation, effects: &mut Vec<LockEffect>) {
        self.phase = Phase::Acquiring;
        self.launched = true;
        effects.push(self.emit(LockEventKind::AcquiringLock, None));
        effects.push(LockEffect::Acquire { generation });
    }

    fn arm_retry(&mut self) -> LockEffect {
        let timer = TimerId(self.next_timer);
        self.next_timer += 1;
        self.phase = Phase::AwaitingRetry { timer: Some(timer) };
        LockEffect::ArmTimer { timer }
    }

    fn finish(&mut self, outcome: Outcome, effects: &mut Vec<LockEffect>) {
        effects.push(LockEffect::DestroySession);
        effects.push(self.emit(LockEventKind::Done, None));
        effects.push(LockEffect::Finish(outcome));
        self.outcome = Some(outcome);
    }
}

#[cfg(test)]
#[path = "machine_tests.rs"]
mod tests;
