// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[tokio::test]
async fn signal_is_observed() {
    let (signal, ready) = ready_channel();
    assert!(!ready.is_ready());

    signal.signal();

    assert!(ready.is_ready());
    assert!(ready.wait().await);
}

#[tokio::test]
async fn dropped_signal_reports_not_ready() {
    let (signal, ready) = ready_channel();

    drop(signal);

    assert!(!ready.wait().await);
    assert!(!ready.is_ready());
}

#[tokio::test]
async fn waiters_wake_on_signal() {
    let (signal, ready) = ready_channel();
    let waiter = {
        let ready = ready.clone();
        tokio::spawn(async move { ready.wait().await })
    };
    tokio::task::yield_now().await;

    signal.signal();

    assert!(waiter.await.unwrap());
}
