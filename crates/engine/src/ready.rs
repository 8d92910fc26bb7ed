// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Write-once readiness signal

use tokio::sync::watch;

/// Create a linked signal/observer pair
pub fn ready_channel() -> (ReadySignal, Ready) {
    let (tx, rx) = watch::channel(false);
    (ReadySignal { tx }, Ready { rx })
}

/// Sending half, consumed when fired
#[derive(Debug)]
pub struct ReadySignal {
    tx: watch::Sender<bool>,
}

impl ReadySignal {
    pub fn signal(self) {
        self.tx.send_replace(true);
    }
}

/// Observing half
#[derive(Clone, Debug)]
pub struct Ready {
    rx: watch::Receiver<bool>,
}

impl Ready {
    pub fn is_ready(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait for the signal
    ///
    /// Returns false if the signal was dropped without firing.
    pub async fn wait(&self) -> bool {
        let mut rx = self.rx.clone();
        let ready = rx.wait_for(|ready| *ready).await.is_ok();
        ready
    }
}

#[cfg(test)]
#[path = "ready_tests.rs"]
mod tests;
