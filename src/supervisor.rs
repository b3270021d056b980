//! Connection supervision: connect probe, heartbeat, bounded reconnect.
//!
//! A supervisor runs as one background task per client:
//!
//! ```text
//!   connect ──ok──▶ Connected ──▶ heartbeat (ping every interval)
//!      │                              │ ping failed / issue reported
//!      │ failed                       ▼
//!      └──────────────▶ Issue ──▶ reconnect: N attempts, fixed delay before each
//!                                     │ ok ──▶ Connected ──▶ heartbeat
//!                                     │ exhausted
//!                                     ▼
//!                             GaveUp (Unavailable) ── retrigger ──▶ connect
//! ```
//!
//! Every transition is broadcast as a [`ConnectionEvent`]. `Issue` and
//! `PingFailed` are what the degradation controller treats as errors and
//! `Connected` as recovery. The task stops when its [`SupervisorHandle`] is
//! cancelled or dropped.

use crate::backend::CacheBackend;
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch, Notify};
use tokio_util::sync::CancellationToken;

const EVENT_CAPACITY: usize = 64;

/// Signal emitted by a supervised connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Connect probe succeeded.
    Connected,
    /// Connection problem: failed probe, failed ping or caller report.
    Issue(String),
    /// Heartbeat write succeeded.
    Ping,
    /// Heartbeat write failed. Always followed by `Issue`.
    PingFailed(String),
    /// Reconnect attempts exhausted; waiting for a retrigger.
    GaveUp,
}

/// Current supervisor state, observable through [`SupervisorHandle::status`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SupervisorStatus {
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
    Unavailable,
    Stopped,
}

impl SupervisorStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, SupervisorStatus::Connected)
    }
}

/// Timing and key settings taken from [`ClientConfig`].
#[derive(Clone, Debug)]
struct Settings {
    ping_key: String,
    ping_ttl: Duration,
    ping_interval: Duration,
    reconnect_attempts: u32,
    reconnect_delay: Duration,
}

impl From<&ClientConfig> for Settings {
    fn from(config: &ClientConfig) -> Self {
        Settings {
            ping_key: config.ping_key(),
            ping_ttl: config.ping_ttl,
            ping_interval: config.ping_interval,
            reconnect_attempts: config.reconnect_attempts,
            reconnect_delay: config.reconnect_delay,
        }
    }
}

enum HeartbeatExit {
    Failed,
    Cancelled,
}

enum ReconnectExit {
    Connected,
    Exhausted,
    Cancelled,
}

/// Background task owning reconnect and heartbeat for one backend.
pub struct ConnectionSupervisor<B: CacheBackend> {
    backend: B,
    settings: Settings,
    events: broadcast::Sender<ConnectionEvent>,
    status: watch::Sender<SupervisorStatus>,
    wake: Arc<Notify>,
    cancel: CancellationToken,
}

impl<B: CacheBackend> ConnectionSupervisor<B> {
    /// Spawn a supervisor for `backend` on the current Tokio runtime.
    ///
    /// # Errors
    /// Returns `Error::ConfigError` when called outside a Tokio runtime.
    pub fn spawn(backend: B, config: &ClientConfig) -> Result<SupervisorHandle> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            Error::ConfigError(format!("connection supervisor needs a Tokio runtime: {}", e))
        })?;

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (status, status_rx) = watch::channel(SupervisorStatus::Connecting);
        let wake = Arc::new(Notify::new());
        let cancel = CancellationToken::new();

        let supervisor = ConnectionSupervisor {
            backend,
            settings: Settings::from(config),
            events: events.clone(),
            status,
            wake: wake.clone(),
            cancel: cancel.clone(),
        };

        runtime.spawn(supervisor.run());

        Ok(SupervisorHandle {
            events,
            status: status_rx,
            wake,
            cancel,
        })
    }

    async fn run(self) {
        debug!("Connection supervisor started ({})", self.settings.ping_key);

        let mut healthy = self.connect().await;

        loop {
            if healthy {
                match self.heartbeat().await {
                    HeartbeatExit::Cancelled => break,
                    HeartbeatExit::Failed => {}
                }
            }

            match self.reconnect().await {
                ReconnectExit::Connected => healthy = true,
                ReconnectExit::Cancelled => break,
                ReconnectExit::Exhausted => {
                    warn!(
                        "Giving up on backend after {} reconnect attempts",
                        self.settings.reconnect_attempts
                    );
                    self.status.send_replace(SupervisorStatus::Unavailable);
                    self.emit(ConnectionEvent::GaveUp);

                    tokio::select! {
                        _ = self.cancel.cancelled() => break,
                        _ = self.wake.notified() => {
                            info!("Backend supervision retriggered");
                            healthy = self.connect().await;
                        }
                    }
                }
            }
        }

        self.status.send_replace(SupervisorStatus::Stopped);
        debug!("Connection supervisor stopped ({})", self.settings.ping_key);
    }

    /// One connect probe. Emits `Connected` or `Issue`.
    async fn connect(&self) -> bool {
        let outcome = match self.backend.health_check().await {
            Ok(true) => Ok(()),
            Ok(false) => Err("health check reported backend unavailable".to_string()),
            Err(e) => Err(e.to_string()),
        };

        match outcome {
            Ok(()) => {
                info!("✓ Backend connected");
                self.status.send_replace(SupervisorStatus::Connected);
                self.emit(ConnectionEvent::Connected);
                true
            }
            Err(reason) => {
                warn!("Backend connection issue: {}", reason);
                self.emit(ConnectionEvent::Issue(reason));
                false
            }
        }
    }

    /// Ping immediately, then once per interval, until a ping fails, an
    /// issue is reported, or the task is cancelled.
    async fn heartbeat(&self) -> HeartbeatExit {
        loop {
            let ping = self
                .backend
                .set(
                    &self.settings.ping_key,
                    b"\"pong\"".to_vec(),
                    Some(self.settings.ping_ttl),
                )
                .await;

            if let Err(e) = ping {
                let reason = e.to_string();
                warn!("Heartbeat failed: {}", reason);
                self.emit(ConnectionEvent::PingFailed(reason.clone()));
                self.emit(ConnectionEvent::Issue(reason));
                return HeartbeatExit::Failed;
            }
            self.emit(ConnectionEvent::Ping);

            tokio::select! {
                _ = self.cancel.cancelled() => return HeartbeatExit::Cancelled,
                _ = self.wake.notified() => {
                    self.emit(ConnectionEvent::Issue("issue reported by caller".to_string()));
                    return HeartbeatExit::Failed;
                }
                _ = tokio::time::sleep(self.settings.ping_interval) => {}
            }
        }
    }

    /// Bounded retry with a fixed delay before every attempt.
    async fn reconnect(&self) -> ReconnectExit {
        for attempt in 1..=self.settings.reconnect_attempts {
            self.status
                .send_replace(SupervisorStatus::Reconnecting { attempt });
            debug!(
                "Reconnect attempt {}/{} in {:?}",
                attempt, self.settings.reconnect_attempts, self.settings.reconnect_delay
            );

            let delay = tokio::time::sleep(self.settings.reconnect_delay);
            tokio::pin!(delay);
            loop {
                tokio::select! {
                    _ = self.cancel.cancelled() => return ReconnectExit::Cancelled,
                    // Already reconnecting; a late report must not outlive this cycle.
                    _ = self.wake.notified() => continue,
                    _ = &mut delay => break,
                }
            }

            if self.connect().await {
                return ReconnectExit::Connected;
            }
        }
        ReconnectExit::Exhausted
    }

    fn emit(&self, event: ConnectionEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

/// Owner-side handle of a running supervisor.
///
/// Dropping the handle cancels the task.
pub struct SupervisorHandle {
    events: broadcast::Sender<ConnectionEvent>,
    status: watch::Receiver<SupervisorStatus>,
    wake: Arc<Notify>,
    cancel: CancellationToken,
}

impl SupervisorHandle {
    /// Receive connection events from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.events.subscribe()
    }

    pub fn status(&self) -> SupervisorStatus {
        *self.status.borrow()
    }

    /// Watch status changes.
    pub fn watch_status(&self) -> watch::Receiver<SupervisorStatus> {
        self.status.clone()
    }

    /// Restart the connect cycle.
    ///
    /// While heartbeating this is treated as a reported issue; while
    /// unavailable it triggers a fresh connect attempt. Ignored while a
    /// connect or reconnect is already in progress.
    pub fn retrigger(&self) {
        let status = *self.status.borrow();
        if status.is_healthy() || status == SupervisorStatus::Unavailable {
            self.wake.notify_one();
        } else {
            trace!("Retrigger ignored while {:?}", status);
        }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for SupervisorHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
