// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::{ready_channel, Ready};
use std::time::Duration;
use tokio::sync::oneshot;
use warden_adapters::{AcquireOutcome, FakeBackend, FakeObserver, SessionCall};
use warden_core::{FakeClock, HeldLevel, LockEventKind, LockIdentity};

const KEY: &str = "svc/lock";
const RETRY: Duration = Duration::from_secs(5);

struct Harness {
    backend: FakeBackend,
    observer: FakeObserver,
    clock: FakeClock,
    ready: Ready,
    stop: Option<oneshot::Sender<()>>,
    handle: JoinHandle<Result<(), LockError>>,
}

impl Harness {
    /// Start a coordinator on a fresh session of `backend`
    fn start(backend: &FakeBackend) -> Self {
        let observer = FakeObserver::new();
        let clock = FakeClock::new();
        let config = LockConfig::new(LockIdentity::new(KEY, "node-1")).with_retry_interval(RETRY);
        let coordinator =
            LockCoordinator::new(backend.session(), config, observer.clone(), clock.clone());

        let (signal, ready) = ready_channel();
        let (stop, stopped) = oneshot::channel::<()>();
        let handle = tokio::spawn(coordinator.run(
            async move {
                let _ = stopped.await;
            },
            signal,
        ));

        Self {
            backend: backend.clone(),
            observer,
            clock,
            ready,
            stop: Some(stop),
            handle,
        }
    }

    async fn shutdown(mut self) -> (Result<(), LockError>, Self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        let result = self.finish().await;
        (result, self)
    }

    /// Wait for the run to end on its own
    async fn finish(&mut self) -> Result<(), LockError> {
        tokio::time::timeout(Duration::from_secs(5), &mut self.handle)
            .await
            .expect("coordinator did not finish")
            .unwrap()
    }

    /// Wait for the retry timer to be armed
    async fn timer_armed(&self) {
        let clock = self.clock.clone();
        eventually("retry timer", move || clock.pending_timers() == 1).await;
    }

    fn levels(&self) -> Vec<HeldLevel> {
        self.observer.levels()
    }

    fn kinds(&self) -> Vec<LockEventKind> {
        self.observer.event_kinds()
    }
}

async fn eventually(what: &str, condition: impl Fn() -> bool) {
    let waited = tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "timed out waiting for {}", what);
}

fn count(levels: &[HeldLevel], level: HeldLevel) -> usize {
    levels.iter().filter(|l| **l == level).count()
}

#[tokio::test]
async fn acquires_signals_ready_and_releases_on_shutdown() {
    let backend = FakeBackend::new();
    let harness = Harness::start(&backend);

    assert!(harness.ready.wait().await);
    assert_eq!(backend.holder(KEY), Some(1));
    assert_eq!(backend.value(KEY), Some(b"node-1".to_vec()));
    assert_eq!(harness.levels(), vec![HeldLevel::Held]);

    let (result, harness) = harness.shutdown().await;

    assert_eq!(result, Ok(()));
    assert_eq!(harness.levels(), vec![HeldLevel::Held, HeldLevel::NotHeld]);
    assert_eq!(
        harness.kinds(),
        vec![
            LockEventKind::Starting,
            LockEventKind::AcquiringLock,
            LockEventKind::AcquireLockSucceeded,
            LockEventKind::Started,
            LockEventKind::ShuttingDown,
            LockEventKind::Done,
        ]
    );
    assert!(backend.is_destroyed(1));
    assert_eq!(backend.holder(KEY), None);
}

#[tokio::test]
async fn events_carry_key_and_value() {
    let backend = FakeBackend::new();
    let harness = Harness::start(&backend);
    assert!(harness.ready.wait().await);

    let events = harness.observer.events();
    assert!(events.iter().all(|e| e.key == KEY && e.value == "node-1"));
    assert!(events.iter().all(|e| e.error.is_none()));
}

#[tokio::test]
async fn shutdown_while_first_attempt_outstanding() {
    let backend = FakeBackend::new();
    backend.script_acquire([AcquireOutcome::Hold]);
    let harness = Harness::start(&backend);
    backend.wait_until(|b| b.held_attempts() == 1).await;

    let (result, harness) = harness.shutdown().await;

    assert_eq!(result, Ok(()));
    assert!(!harness.ready.is_ready());
    assert!(!harness.ready.wait().await);
    assert_eq!(harness.levels(), vec![HeldLevel::NotHeld]);
    assert!(backend.is_destroyed(1));
}

#[tokio::test]
async fn already_completed_shutdown_returns_ok() {
    let backend = FakeBackend::new();
    backend.script_acquire([AcquireOutcome::Hold]);
    let observer = FakeObserver::new();
    let config = LockConfig::new(LockIdentity::new(KEY, "node-1"));
    let coordinator =
        LockCoordinator::new(backend.session(), config, observer.clone(), FakeClock::new());
    let (signal, ready) = ready_channel();

    let result = coordinator.run(async {}, signal).await;

    assert_eq!(result, Ok(()));
    assert!(!ready.wait().await);
    assert_eq!(observer.levels(), vec![HeldLevel::NotHeld]);
}

#[tokio::test]
async fn invalidity_after_success_loses_the_lock() {
    let backend = FakeBackend::new();
    let mut harness = Harness::start(&backend);
    assert!(harness.ready.wait().await);

    backend.invalidate(1, "ttl expired");

    assert_eq!(
        harness.finish().await,
        Err(LockError::LockLost {
            key: KEY.to_string()
        })
    );
    assert_eq!(harness.levels(), vec![HeldLevel::Held, HeldLevel::NotHeld]);

    let lost = harness
        .observer
        .events()
        .into_iter()
        .find(|e| e.kind == LockEventKind::LostLock)
        .expect("lost-lock event");
    assert!(lost.error.unwrap_or_default().contains("ttl expired"));
    assert_eq!(harness.kinds().last(), Some(&LockEventKind::Done));
}

#[tokio::test]
async fn failure_retries_after_the_interval_on_a_new_session() {
    let backend = FakeBackend::new();
    backend.script_acquire([AcquireOutcome::Fail("no leader".to_string())]);
    let mut harness = Harness::start(&backend);

    // Attempt 1 fails: not held, timer armed, not ready
    harness.timer_armed().await;
    assert_eq!(harness.levels(), vec![HeldLevel::NotHeld]);
    assert!(!harness.ready.is_ready());

    // Nothing happens before the interval elapses
    harness.clock.advance(RETRY - Duration::from_secs(1));
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(backend.acquire_calls(), 1);
    assert_eq!(harness.clock.pending_timers(), 1);

    // Timer fires: recreate, attempt 2 on the new session succeeds
    harness.clock.advance(Duration::from_secs(1));
    assert!(harness.ready.wait().await);
    assert_eq!(backend.holder(KEY), Some(2));
    assert_eq!(harness.levels(), vec![HeldLevel::NotHeld, HeldLevel::Held]);
    assert!(backend.calls().contains(&SessionCall::Recreate { session: 1 }));
    assert!(backend.is_destroyed(1));

    // Invalidity of the new session loses the lock
    backend.invalidate(2, "session expired");
    assert_eq!(
        harness.finish().await,
        Err(LockError::LockLost {
            key: KEY.to_string()
        })
    );
    assert_eq!(
        harness.levels(),
        vec![HeldLevel::NotHeld, HeldLevel::Held, HeldLevel::NotHeld]
    );
}

#[tokio::test]
async fn repeated_failures_then_success_report_held_once() {
    let backend = FakeBackend::new();
    backend.script_acquire([
        AcquireOutcome::Fail("first".to_string()),
        AcquireOutcome::Fail("second".to_string()),
        AcquireOutcome::Fail("third".to_string()),
    ]);
    let harness = Harness::start(&backend);

    for _ in 0..3 {
        harness.timer_armed().await;
        assert!(!harness.ready.is_ready());
        harness.clock.advance(RETRY);
    }
    assert!(harness.ready.wait().await);

    let levels = harness.levels();
    assert_eq!(count(&levels, HeldLevel::Held), 1);
    assert_eq!(count(&levels, HeldLevel::NotHeld), 3);
    assert_eq!(levels.last(), Some(&HeldLevel::Held));
    assert_eq!(backend.holder(KEY), Some(4));

    let failures = harness
        .kinds()
        .into_iter()
        .filter(|k| *k == LockEventKind::AcquireLockFailed)
        .count();
    assert_eq!(failures, 3);

    let (result, _) = harness.shutdown().await;
    assert_eq!(result, Ok(()));
}

#[tokio::test]
async fn failed_recreate_arms_another_retry() {
    let backend = FakeBackend::new();
    backend.script_acquire([AcquireOutcome::Fail("no leader".to_string())]);
    backend.fail_next_recreate("connection refused");
    let harness = Harness::start(&backend);

    harness.timer_armed().await;
    harness.clock.advance(RETRY);

    let observer = harness.observer.clone();
    let clock = harness.clock.clone();
    eventually("recreate failure", move || {
        observer.event_kinds().contains(&LockEventKind::RecreateFailed)
            && clock.pending_timers() == 1
    })
    .await;
    assert!(!harness.ready.is_ready());

    harness.clock.advance(RETRY);
    assert!(harness.ready.wait().await);
    assert_eq!(backend.holder(KEY), Some(2));
}

#[tokio::test]
async fn invalidity_while_acquiring_schedules_a_retry() {
    let backend = FakeBackend::new();
    backend.script_acquire([AcquireOutcome::Hold]);
    let harness = Harness::start(&backend);
    backend.wait_until(|b| b.held_attempts() == 1).await;

    backend.invalidate(1, "no cluster leader");
    // The parked attempt fails too and may re-arm the timer; wait for both
    let observer = harness.observer.clone();
    eventually("session error and failed attempt", move || {
        let kinds = observer.event_kinds();
        kinds.contains(&LockEventKind::SessionError)
            && kinds.contains(&LockEventKind::AcquireLockFailed)
    })
    .await;
    harness.timer_armed().await;
    assert!(!harness.ready.is_ready());

    harness.clock.advance(RETRY);
    assert!(harness.ready.wait().await);
    assert_eq!(count(&harness.levels(), HeldLevel::Held), 1);
    assert_eq!(backend.holder(KEY), Some(2));
}

#[tokio::test]
async fn replaced_session_invalidity_is_ignored() {
    let backend = FakeBackend::new();
    backend.script_acquire([AcquireOutcome::Fail("no leader".to_string())]);
    let harness = Harness::start(&backend);
    harness.timer_armed().await;
    harness.clock.advance(RETRY);
    assert!(harness.ready.wait().await);

    // Session 1 was destroyed on replacement; its invalidity must not count
    backend.invalidate(1, "stale");
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(!harness.handle.is_finished());
    assert_eq!(harness.levels().last(), Some(&HeldLevel::Held));
    assert!(!harness.kinds().contains(&LockEventKind::LostLock));

    let (result, _) = harness.shutdown().await;
    assert_eq!(result, Ok(()));
}

#[tokio::test]
async fn recreate_arriving_after_exit_is_destroyed() {
    let backend = FakeBackend::new();
    backend.script_acquire([AcquireOutcome::Fail("no leader".to_string())]);
    backend.hold_recreates();
    let harness = Harness::start(&backend);

    harness.timer_armed().await;
    harness.clock.advance(RETRY);
    backend
        .wait_until(|b| b.calls().contains(&SessionCall::Recreate { session: 1 }))
        .await;

    let (result, harness) = harness.shutdown().await;
    assert_eq!(result, Ok(()));
    assert!(!harness.ready.is_ready());

    backend.release_recreates();
    backend
        .wait_until(|b| b.latest_session() == Some(2) && b.is_destroyed(2))
        .await;
    assert_eq!(backend.holder(KEY), None);
}

#[tokio::test]
async fn shutdown_while_awaiting_retry_cancels_the_timer() {
    let backend = FakeBackend::new();
    backend.script_acquire([AcquireOutcome::Fail("no leader".to_string())]);
    let harness = Harness::start(&backend);
    harness.timer_armed().await;

    let (result, harness) = harness.shutdown().await;

    assert_eq!(result, Ok(()));
    assert_eq!(harness.clock.pending_timers(), 0);
    assert_eq!(harness.levels(), vec![HeldLevel::NotHeld, HeldLevel::NotHeld]);
    assert!(!backend
        .calls()
        .iter()
        .any(|c| matches!(c, SessionCall::Recreate { .. })));
}

#[test]
fn only_lock_loss_is_logged_as_an_error() {
    assert_eq!(severity(LockEventKind::LostLock), Level::ERROR);
    for kind in [
        LockEventKind::AcquireLockFailed,
        LockEventKind::SessionError,
        LockEventKind::RecreateFailed,
    ] {
        assert_eq!(severity(kind), Level::WARN, "{}", kind);
    }
    for kind in [LockEventKind::Started, LockEventKind::AcquireLockSucceeded] {
        assert_eq!(severity(kind), Level::INFO, "{}", kind);
    }
}
