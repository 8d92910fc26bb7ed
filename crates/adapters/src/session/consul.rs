// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Consul session adapter
//!
//! Sessions are created with a TTL and renewed in the background at half the
//! TTL. Locks are claimed with `PUT /v1/kv/<key>?acquire=<session>`; while
//! another session holds the key the adapter waits on blocking queries. Once
//! held, a monitor watches the key and invalidates the session if the claim
//! disappears. All HTTP calls are blocking and run on the blocking pool.

use super::{LockSession, SessionError};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

const MIN_TTL: Duration = Duration::from_secs(10);
const MAX_TTL: Duration = Duration::from_secs(86_400);
/// Extra time allowed on top of a blocking query's wait
const REQUEST_SLACK: Duration = Duration::from_secs(5);
/// Pause before re-claiming a key that was free but refused (lock-delay)
const CLAIM_PAUSE: Duration = Duration::from_millis(500);
/// Pause after a failed monitor query
const MONITOR_PAUSE: Duration = Duration::from_secs(1);

/// Consul connection and session settings
#[derive(Clone, Debug)]
pub struct ConsulConfig {
    /// Agent HTTP address, e.g. `http://127.0.0.1:8500`
    pub address: String,
    pub session_name: String,
    pub ttl: Duration,
    pub lock_delay: Duration,
    /// Maximum wait of a blocking query
    pub wait: Duration,
}

impl ConsulConfig {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            session_name: "warden".to_string(),
            ttl: Duration::from_secs(15),
            lock_delay: Duration::from_secs(15),
            wait: Duration::from_secs(30),
        }
    }

    pub fn with_session_name(mut self, name: impl Into<String>) -> Self {
        self.session_name = name.into();
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_lock_delay(mut self, delay: Duration) -> Self {
        self.lock_delay = delay;
        self
    }

    pub fn with_wait(mut self, wait: Duration) -> Self {
        self.wait = wait;
        self
    }

    pub fn validate(&self) -> Result<(), SessionError> {
        if self.ttl < MIN_TTL || self.ttl > MAX_TTL {
            return Err(SessionError::CreateFailed(format!(
                "session ttl must be between {}s and {}s, got {}",
                MIN_TTL.as_secs(),
                MAX_TTL.as_secs(),
                format_duration(self.ttl)
            )));
        }
        if self.address.is_empty() {
            return Err(SessionError::CreateFailed(
                "consul address is empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Holder of a KV key as seen by a (blocking) read
#[derive(Debug, Clone, PartialEq, Eq)]
struct KeyState {
    index: u64,
    holder: Option<String>,
}

#[derive(Deserialize)]
struct CreatedSession {
    #[serde(rename = "ID")]
    id: String,
}

#[derive(Deserialize)]
struct KvEntry {
    #[serde(rename = "Session", default)]
    session: Option<String>,
    #[serde(rename = "ModifyIndex", default)]
    modify_index: u64,
}

/// Render a duration the way Consul parses it
fn format_duration(duration: Duration) -> String {
    if duration.subsec_millis() == 0 {
        format!("{}s", duration.as_secs())
    } else {
        format!("{}ms", duration.as_millis())
    }
}

fn kv_path(key: &str) -> String {
    format!("kv/{}", key.trim_start_matches('/'))
}

fn parse_session_id(body: &str) -> Result<String, SessionError> {
    serde_json::from_str::<CreatedSession>(body)
        .map(|created| created.id)
        .map_err(|e| SessionError::CreateFailed(format!("invalid session response: {}", e)))
}

fn parse_acquire(body: &str) -> Result<bool, SessionError> {
    match body.trim() {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(SessionError::Unavailable(format!(
            "unexpected acquire response: {}",
            other
        ))),
    }
}

fn parse_key_state(body: &str, header_index: Option<u64>) -> Result<KeyState, SessionError> {
    let entries: Vec<KvEntry> = serde_json::from_str(body)
        .map_err(|e| SessionError::Unavailable(format!("invalid kv response: {}", e)))?;
    let entry = entries.into_iter().next();
    Ok(KeyState {
        index: header_index
            .or(entry.as_ref().map(|e| e.modify_index))
            .unwrap_or(0),
        holder: entry
            .and_then(|e| e.session)
            .filter(|session| !session.is_empty()),
    })
}

fn unavailable(error: ureq::Error) -> SessionError {
    SessionError::Unavailable(error.to_string())
}

fn status_error(status: u16, body: &str) -> SessionError {
    SessionError::Unavailable(format!("consul returned {}: {}", status, body.trim()))
}

#[derive(Clone)]
struct ConsulClient {
    agent: ureq::Agent,
    address: String,
}

impl ConsulClient {
    fn new(config: &ConsulConfig) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(config.wait + REQUEST_SLACK))
            .build()
            .into();
        Self {
            agent,
            address: config.address.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.address, path)
    }

    fn create_session(&self, config: &ConsulConfig) -> Result<String, SessionError> {
        let body = serde_json::json!({
            "Name": config.session_name,
            "TTL": format_duration(config.ttl),
            "LockDelay": format_duration(config.lock_delay),
            "Behavior": "release",
        })
        .to_string();

        let mut response = self
            .agent
            .put(&self.url("session/create"))
            .header("Content-Type", "application/json")
            .send(body.as_bytes())
            .map_err(|e| SessionError::CreateFailed(e.to_string()))?;
        let status = response.status().as_u16();
        let text = response
            .body_mut()
            .read_to_string()
            .map_err(|e| SessionError::CreateFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(SessionError::CreateFailed(format!(
                "consul returned {}: {}",
                status,
                text.trim()
            )));
        }
        parse_session_id(&text)
    }

    fn renew_session(&self, id: &str) -> Result<(), SessionError> {
        let mut response = self
            .agent
            .put(&self.url(&format!("session/renew/{}", id)))
            .send_empty()
            .map_err(unavailable)?;

        match response.status().as_u16() {
            200..=299 => Ok(()),
            404 => Err(SessionError::Invalidated(format!(
                "session {} no longer exists",
                id
            ))),
            status => {
                let text = response.body_mut().read_to_string().unwrap_or_default();
                Err(status_error(status, &text))
            }
        }
    }

    fn destroy_session(&self, id: &str) -> Result<(), SessionError> {
        let response = self
            .agent
            .put(&self.url(&format!("session/destroy/{}", id)))
            .send_empty()
            .map_err(unavailable)?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(status_error(response.status().as_u16(), ""))
        }
    }

    fn acquire(&self, key: &str, id: &str, value: &[u8]) -> Result<bool, SessionError> {
        let mut response = self
            .agent
            .put(&self.url(&kv_path(key)))
            .query("acquire", id)
            .send(value)
            .map_err(unavailable)?;
        let status = response.status().as_u16();
        let text = response.body_mut().read_to_string().map_err(unavailable)?;

        if !(200..300).contains(&status) {
            return Err(SessionError::AcquireFailed(format!(
                "consul returned {}: {}",
                status,
                text.trim()
            )));
        }
        parse_acquire(&text)
    }

    /// Read `key`, blocking until it changes past `index` when one is given
    fn read_key(
        &self,
        key: &str,
        index: Option<u64>,
        wait: Duration,
    ) -> Result<KeyState, SessionError> {
        let mut request = self.agent.get(&self.url(&kv_path(key)));
        if let Some(index) = index {
            request = request
                .query("index", index.to_string())
                .query("wait", format_duration(wait));
        }

        let mut response = request.call().map_err(unavailable)?;
        let header_index = response
            .headers()
            .get("X-Consul-Index")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());

        match response.status().as_u16() {
            404 => Ok(KeyState {
                index: header_index.unwrap_or(0),
                holder: None,
            }),
            200..=299 => {
                let text = response.body_mut().read_to_string().map_err(unavailable)?;
                parse_key_state(&text, header_index)
            }
            status => {
                let text = response.body_mut().read_to_string().unwrap_or_default();
                Err(status_error(status, &text))
            }
        }
    }
}

async fn blocking<T, F>(f: F) -> Result<T, SessionError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, SessionError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| SessionError::Unavailable(e.to_string()))?
}

type Invalidation = watch::Sender<Option<SessionError>>;

/// Record the first reason a session became invalid; later reasons are dropped
fn mark_invalid(invalid: &Invalidation, error: SessionError) {
    invalid.send_if_modified(|current| {
        if current.is_some() {
            return false;
        }
        *current = Some(error);
        true
    });
}

fn is_invalid(invalid: &Invalidation) -> bool {
    invalid.borrow().is_some()
}

async fn renew_loop(client: ConsulClient, id: String, every: Duration, invalid: Arc<Invalidation>) {
    loop {
        tokio::time::sleep(every).await;
        if is_invalid(&invalid) {
            return;
        }

        let result = blocking({
            let client = client.clone();
            let id = id.clone();
            move || client.renew_session(&id)
        })
        .await;

        if let Err(error) = result {
            tracing::warn!(session = %id, error = %error, "session renewal failed");
            mark_invalid(&invalid, error);
            return;
        }
        tracing::trace!(session = %id, "session renewed");
    }
}

async fn monitor_loop(
    client: ConsulClient,
    id: String,
    key: String,
    wait: Duration,
    invalid: Arc<Invalidation>,
) {
    let mut index = None;
    while !is_invalid(&invalid) {
        let result = blocking({
            let client = client.clone();
            let key = key.clone();
            move || client.read_key(&key, index, wait)
        })
        .await;

        match result {
            Ok(state) if state.holder.as_deref() == Some(id.as_str()) => {
                // Consul may reset its index; start over rather than block forever
                index = match index {
                    Some(previous) if state.index < previous => None,
                    _ => Some(state.index),
                };
            }
            Ok(state) => {
                mark_invalid(
                    &invalid,
                    SessionError::LockLost(format!(
                        "{} is held by {}",
                        key,
                        state.holder.as_deref().unwrap_or("nobody")
                    )),
                );
                return;
            }
            Err(error) => {
                tracing::debug!(session = %id, key, error = %error, "lock monitor query failed");
                tokio::time::sleep(MONITOR_PAUSE).await;
            }
        }
    }
}

/// A Consul session
pub struct ConsulSession {
    id: String,
    client: ConsulClient,
    config: ConsulConfig,
    invalid: Arc<Invalidation>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ConsulSession {
    /// Create a session and start renewing it
    pub async fn create(config: ConsulConfig) -> Result<Self, SessionError> {
        config.validate()?;
        let client = ConsulClient::new(&config);

        let id = blocking({
            let client = client.clone();
            let config = config.clone();
            move || client.create_session(&config)
        })
        .await?;
        tracing::debug!(session = %id, "session created");

        let (invalid, _) = watch::channel(None);
        let invalid = Arc::new(invalid);
        let renewer = tokio::spawn(renew_loop(
            client.clone(),
            id.clone(),
            config.ttl / 2,
            Arc::clone(&invalid),
        ));

        Ok(Self {
            id,
            client,
            config,
            invalid,
            tasks: Mutex::new(vec![renewer]),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    fn stop_tasks(&self) {
        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        for task in tasks.drain(..) {
            task.abort();
        }
    }

    async fn claim(&self, key: &str, value: &[u8]) -> Result<(), SessionError> {
        loop {
            let acquired = blocking({
                let client = self.client.clone();
                let id = self.id.clone();
                let key = key.to_string();
                let value = value.to_vec();
                move || client.acquire(&key, &id, &value)
            })
            .await?;

            if acquired {
                let monitor = tokio::spawn(monitor_loop(
                    self.client.clone(),
                    self.id.clone(),
                    key.to_string(),
                    self.config.wait,
                    Arc::clone(&self.invalid),
                ));
                self.tasks
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .push(monitor);
                return Ok(());
            }

            // Wait for the current holder to let go
            let mut index = None;
            loop {
                let state = blocking({
                    let client = self.client.clone();
                    let key = key.to_string();
                    let wait = self.config.wait;
                    move || client.read_key(&key, index, wait)
                })
                .await?;
                if state.holder.is_none() {
                    break;
                }
                index = Some(state.index);
            }
            tokio::time::sleep(CLAIM_PAUSE).await;
        }
    }
}

impl std::fmt::Debug for ConsulSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsulSession")
            .field("id", &self.id)
            .field("address", &self.client.address)
            .finish()
    }
}

impl Drop for ConsulSession {
    fn drop(&mut self) {
        // The session expires on its own once renewal stops
        self.stop_tasks();
    }
}

#[async_trait]
impl LockSession for ConsulSession {
    async fn acquire_lock(&self, key: &str, value: &[u8]) -> Result<(), SessionError> {
        tokio::select! {
            result = self.claim(key, value) => result,
            error = self.invalidated() => Err(error),
        }
    }

    async fn invalidated(&self) -> SessionError {
        let mut watcher = self.invalid.subscribe();
        let error = match watcher.wait_for(|e| e.is_some()).await {
            Ok(error) => (*error).clone().unwrap_or(SessionError::Destroyed),
            Err(_) => SessionError::Destroyed,
        };
        error
    }

    async fn recreate(&self) -> Result<Self, SessionError> {
        ConsulSession::create(self.config.clone()).await
    }

    fn destroy(&self) {
        mark_invalid(&self.invalid, SessionError::Destroyed);
        self.stop_tasks();

        let client = self.client.clone();
        let id = self.id.clone();
        let release = move || {
            if let Err(error) = client.destroy_session(&id) {
                tracing::warn!(session = %id, error = %error, "failed to destroy session");
            }
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(release);
            }
            Err(_) => release(),
        }
    }
}

#[cfg(test)]
#[path = "consul_tests.rs"]
mod tests;
