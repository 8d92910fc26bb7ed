// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Traced session wrapper for consistent observability

use crate::session::{LockSession, SessionError};
use async_trait::async_trait;
use tracing::Instrument;

/// Wrapper that adds tracing to any LockSession
#[derive(Debug)]
pub struct TracedSession<S> {
    inner: S,
}

impl<S> TracedSession<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S: LockSession> LockSession for TracedSession<S> {
    async fn acquire_lock(&self, key: &str, value: &[u8]) -> Result<(), SessionError> {
        let span = tracing::info_span!("session.acquire", key, value_len = value.len());

        async {
            tracing::info!("acquiring");

            // Precondition: the key must name something
            if key.is_empty() {
                tracing::error!("lock key is empty");
                return Err(SessionError::AcquireFailed("lock key is empty".to_string()));
            }

            let start = std::time::Instant::now();
            let result = self.inner.acquire_lock(key, value).await;
            let elapsed = start.elapsed();

            match &result {
                Ok(()) => tracing::info!(elapsed_ms = elapsed.as_millis() as u64, "acquired"),
                Err(e) => tracing::error!(
                    elapsed_ms = elapsed.as_millis() as u64,
                    error = %e,
                    "acquire failed"
                ),
            }

            result
        }
        .instrument(span)
        .await
    }

    async fn invalidated(&self) -> SessionError {
        let start = std::time::Instant::now();
        let error = self.inner.invalidated().await;
        tracing::warn!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            error = %error,
            "session invalidated"
        );
        error
    }

    async fn recreate(&self) -> Result<Self, SessionError> {
        let span = tracing::info_span!("session.recreate");

        async {
            let start = std::time::Instant::now();
            let result = self.inner.recreate().await;
            let elapsed = start.elapsed();

            match &result {
                Ok(_) => tracing::info!(elapsed_ms = elapsed.as_millis() as u64, "session created"),
                Err(e) => tracing::error!(
                    elapsed_ms = elapsed.as_millis() as u64,
                    error = %e,
                    "recreate failed"
                ),
            }

            result.map(TracedSession::new)
        }
        .instrument(span)
        .await
    }

    fn destroy(&self) {
        let span = tracing::info_span!("session.destroy");
        let _guard = span.enter();

        // destroy() is best-effort; failures are reported by the backend
        self.inner.destroy();
        tracing::info!("destroy requested");
    }
}

#[cfg(test)]
#[path = "traced_tests.rs"]
mod tests;
