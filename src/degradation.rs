//! Primary/failover state machine behind the cache facade.
//!
//! ```text
//!            on_error (failover configured)
//!   Primary ───────────────────────────────▶ Degraded
//!      ▲                                        │
//!      └────────────── on_connect ──────────────┘
//! ```
//!
//! The whole facade state lives in one [`ArcSwap`] snapshot. Readers load
//! the active client without locking; transitions replace the snapshot with
//! compare-and-swap so each one fires its event exactly once.

use crate::client::{same_client, SharedClient};
use crate::observability::CacheMetrics;
use crate::supervisor::{ConnectionEvent, SupervisorStatus};
use arc_swap::ArcSwap;
use std::sync::{Arc, Weak};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::{CancellationToken, DropGuard};

const EVENT_CAPACITY: usize = 32;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Primary,
    Degraded,
}

/// Facade-level notifications.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CacheEvent {
    /// The primary client failed. Carries the reported reason.
    ClientError(String),
    /// The primary client is back and active again.
    ClientReconnect,
}

/// One immutable snapshot of the facade's client wiring.
#[derive(Clone)]
pub struct FacadeState {
    /// Client serving requests right now.
    pub active: SharedClient,
    /// Client configured as primary; equals `active` unless degraded.
    pub primary: SharedClient,
    pub failover: Option<SharedClient>,
    pub mode: Mode,
}

/// Owns the facade state and its transitions.
pub struct DegradationController {
    state: ArcSwap<FacadeState>,
    events: broadcast::Sender<CacheEvent>,
    metrics: Arc<dyn CacheMetrics>,
}

impl DegradationController {
    pub fn new(primary: SharedClient, metrics: Arc<dyn CacheMetrics>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        DegradationController {
            state: ArcSwap::from_pointee(FacadeState {
                active: primary.clone(),
                primary,
                failover: None,
                mode: Mode::Primary,
            }),
            events,
            metrics,
        }
    }

    pub fn snapshot(&self) -> Arc<FacadeState> {
        self.state.load_full()
    }

    pub fn active(&self) -> SharedClient {
        self.state.load().active.clone()
    }

    pub fn mode(&self) -> Mode {
        self.state.load().mode
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    /// Install a new primary. Always leaves the controller in `Primary`.
    pub fn set_primary(&self, client: SharedClient) {
        self.state.rcu(|current| FacadeState {
            active: client.clone(),
            primary: client.clone(),
            failover: current.failover.clone(),
            mode: Mode::Primary,
        });
    }

    /// Install the failover client. While degraded it takes over at once.
    pub fn set_failover(&self, client: SharedClient) {
        self.state.rcu(|current| {
            let mut next = FacadeState::clone(current);
            if next.mode == Mode::Degraded {
                next.active = client.clone();
            }
            next.failover = Some(client.clone());
            next
        });
    }

    /// The primary `source` reported a failure.
    ///
    /// Switches to the failover client and returns `true` when this call
    /// performed the transition. Errors from a client that is no longer the
    /// primary, and errors while already degraded, are ignored. Without a
    /// failover client the error is announced but the primary stays active.
    pub fn on_error(&self, source: &SharedClient, reason: &str) -> bool {
        loop {
            let current = self.state.load_full();
            if current.mode == Mode::Degraded || !same_client(&current.primary, source) {
                return false;
            }

            let Some(failover) = current.failover.clone() else {
                warn!(
                    "Cache client '{}' failed with no failover configured: {}",
                    source.name(),
                    reason
                );
                self.emit(CacheEvent::ClientError(reason.to_string()));
                return false;
            };

            let next = Arc::new(FacadeState {
                active: failover.clone(),
                primary: current.primary.clone(),
                failover: Some(failover.clone()),
                mode: Mode::Degraded,
            });

            let previous = self.state.compare_and_swap(&current, next);
            if Arc::ptr_eq(&*previous, &current) {
                warn!(
                    "Cache client '{}' failed, switching to '{}': {}",
                    source.name(),
                    failover.name(),
                    reason
                );
                self.metrics.record_failover(reason);
                self.emit(CacheEvent::ClientError(reason.to_string()));
                return true;
            }
        }
    }

    /// The primary `source` connected again.
    ///
    /// Restores it and returns `true` when this call left `Degraded`.
    pub fn on_connect(&self, source: &SharedClient) -> bool {
        loop {
            let current = self.state.load_full();
            if current.mode == Mode::Primary || !same_client(&current.primary, source) {
                return false;
            }

            let next = Arc::new(FacadeState {
                active: current.primary.clone(),
                primary: current.primary.clone(),
                failover: current.failover.clone(),
                mode: Mode::Primary,
            });

            let previous = self.state.compare_and_swap(&current, next);
            if Arc::ptr_eq(&*previous, &current) {
                info!("✓ Cache client '{}' reconnected, restored", source.name());
                self.metrics.record_recovery();
                self.emit(CacheEvent::ClientReconnect);
                return true;
            }
        }
    }

    fn emit(&self, event: CacheEvent) {
        let _ = self.events.send(event);
    }
}

/// Forward a supervised client's connection events into the controller.
///
/// Returns `None` for clients without connection events. The listener stops
/// when the returned guard is dropped or the client goes away.
pub(crate) fn attach_listener(
    controller: &Arc<DegradationController>,
    client: &SharedClient,
) -> Option<DropGuard> {
    let mut events = client.connection_events()?;

    // Already failing when attached: the events announcing it are gone.
    if let Some(SupervisorStatus::Reconnecting { .. } | SupervisorStatus::Unavailable) =
        client.connection_status()
    {
        controller.on_error(client, "backend unavailable when attached");
    }

    let cancel = CancellationToken::new();
    let token = cancel.clone();
    let controller: Weak<DegradationController> = Arc::downgrade(controller);
    let source: Weak<dyn crate::client::CacheClient> = Arc::downgrade(client);

    tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                _ = token.cancelled() => break,
                event = events.recv() => event,
            };

            let (Some(controller), Some(client)) = (controller.upgrade(), source.upgrade()) else {
                break;
            };

            match event {
                Ok(ConnectionEvent::Issue(reason) | ConnectionEvent::PingFailed(reason)) => {
                    controller.on_error(&client, &reason);
                }
                Ok(ConnectionEvent::Connected) => {
                    controller.on_connect(&client);
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Connection listener skipped {} events", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
        trace!("Connection listener stopped");
    });

    Some(cancel.drop_guard())
}
