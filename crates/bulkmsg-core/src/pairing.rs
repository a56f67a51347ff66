//! Device pairing state machine.
//!
//! `Created -> AwaitingPairing -> Connected`, with `Disconnected` reachable
//! through status reconciliation. The gateway is authoritative; this machine
//! only caches what it last observed.
//!
//! While awaiting a scan, a single poll task owned by the machine queries the
//! device status on a fixed period. The task never overlaps queries (missed
//! ticks are skipped) and is torn down on `cancel()`, on connection, and when
//! the machine is dropped.

use std::{sync::Arc, time::Duration};

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::{
    devices::DeviceDirectory,
    domain::{ConnectionState, DeviceConnection, DeviceId, DeviceStatus, PairingArtifact},
    errors::Error,
    ports::GatewayPort,
    Result,
};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Result of a pairing request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PairingOutcome {
    /// Show the artifact; polling has started.
    AwaitingScan(PairingArtifact),
    /// The gateway issued no artifact: the device is already active.
    AlreadyConnected,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PairingEvent {
    ArtifactIssued(PairingArtifact),
    Connected(DeviceId),
}

struct Poller {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Everything the poll task needs, cloned out of the machine.
#[derive(Clone)]
struct PollContext {
    gateway: Arc<dyn GatewayPort>,
    directory: Option<Arc<DeviceDirectory>>,
    state: Arc<watch::Sender<DeviceConnection>>,
    events: broadcast::Sender<PairingEvent>,
    period: Duration,
}

pub struct PairingMachine {
    gateway: Arc<dyn GatewayPort>,
    directory: Option<Arc<DeviceDirectory>>,
    state: Arc<watch::Sender<DeviceConnection>>,
    events: broadcast::Sender<PairingEvent>,
    poll_interval: Duration,
    poller: Option<Poller>,
}

impl PairingMachine {
    pub fn new(gateway: Arc<dyn GatewayPort>, connection: DeviceConnection) -> Self {
        let (state, _) = watch::channel(connection);
        let (events, _) = broadcast::channel(16);
        Self {
            gateway,
            directory: None,
            state: Arc::new(state),
            events,
            poll_interval: DEFAULT_POLL_INTERVAL,
            poller: None,
        }
    }

    /// Device listing refreshed after a successful connection.
    pub fn with_directory(mut self, directory: Arc<DeviceDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    pub fn with_poll_interval(mut self, period: Duration) -> Self {
        self.poll_interval = period.max(Duration::from_millis(1));
        self
    }

    pub fn device_id(&self) -> DeviceId {
        self.state.borrow().device_id.clone()
    }

    pub fn state(&self) -> ConnectionState {
        self.state.borrow().state
    }

    pub fn connection(&self) -> DeviceConnection {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<DeviceConnection> {
        self.state.subscribe()
    }

    pub fn events(&self) -> broadcast::Receiver<PairingEvent> {
        self.events.subscribe()
    }

    pub fn is_polling(&self) -> bool {
        self.poller
            .as_ref()
            .map(|p| !p.cancel.is_cancelled() && !p.handle.is_finished())
            .unwrap_or(false)
    }

    /// Ask the gateway for a pairing artifact.
    ///
    /// On a transport error the cached state is left untouched (an existing
    /// poll keeps running).
    pub async fn request_pairing(&mut self) -> Result<PairingOutcome> {
        let device_id = self.device_id();
        let resp = self.gateway.request_pairing(&device_id).await?;

        // A fresh request supersedes any previous artifact and its poller.
        self.stop_poller();

        let artifact = resp
            .pairing_artifact
            .as_deref()
            .and_then(PairingArtifact::from_payload);

        match artifact {
            Some(artifact) => {
                self.state.send_modify(|c| {
                    c.state = ConnectionState::AwaitingPairing;
                    c.pairing_artifact = Some(artifact.clone());
                });
                let _ = self
                    .events
                    .send(PairingEvent::ArtifactIssued(artifact.clone()));
                tracing::info!(device = %device_id, "pairing artifact issued, polling for connection");
                self.start_poller();
                Ok(PairingOutcome::AwaitingScan(artifact))
            }
            None => {
                self.state.send_modify(|c| {
                    c.state = ConnectionState::Connected;
                    c.pairing_artifact = None;
                });
                let _ = self.events.send(PairingEvent::Connected(device_id.clone()));
                tracing::info!(device = %device_id, "no pairing artifact, device already connected");
                if let Some(dir) = &self.directory {
                    if let Err(e) = dir.refresh().await {
                        tracing::warn!("device listing refresh failed: {e}");
                    }
                }
                Ok(PairingOutcome::AlreadyConnected)
            }
        }
    }

    /// Abandon pairing: stop polling and fall back to `Created`.
    pub fn cancel(&mut self) {
        let was_polling = self.poller.is_some();
        self.stop_poller();
        self.state.send_if_modified(|c| {
            let changed = c.state != ConnectionState::Created || c.pairing_artifact.is_some();
            c.state = ConnectionState::Created;
            c.pairing_artifact = None;
            changed
        });
        if was_polling {
            tracing::info!(device = %self.device_id(), "pairing cancelled");
        }
    }

    /// One-shot reconciliation of the cached state with the gateway.
    ///
    /// Not allowed while a pairing poll is in progress.
    pub async fn sync_status(&mut self) -> Result<ConnectionState> {
        let current = self.state();
        if current == ConnectionState::AwaitingPairing {
            return Err(Error::state("sync status", current));
        }

        let status = self.gateway.device_status(&self.device_id()).await?;
        let next = match status {
            DeviceStatus::Connected => ConnectionState::Connected,
            DeviceStatus::Disconnected => ConnectionState::Disconnected,
            DeviceStatus::Created => ConnectionState::Created,
            DeviceStatus::Unknown => current,
        };

        self.state.send_if_modified(|c| {
            if c.state == next {
                return false;
            }
            c.state = next;
            true
        });
        tracing::debug!(device = %self.device_id(), state = %next, "device status reconciled");
        Ok(next)
    }

    fn start_poller(&mut self) {
        let cancel = CancellationToken::new();
        let ctx = PollContext {
            gateway: self.gateway.clone(),
            directory: self.directory.clone(),
            state: self.state.clone(),
            events: self.events.clone(),
            period: self.poll_interval,
        };
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            poll_until_connected(ctx, token).await;
        });
        self.poller = Some(Poller { cancel, handle });
    }

    fn stop_poller(&mut self) {
        if let Some(p) = self.poller.take() {
            p.cancel.cancel();
            p.handle.abort();
        }
    }
}

impl Drop for PairingMachine {
    fn drop(&mut self) {
        self.stop_poller();
    }
}

async fn poll_until_connected(ctx: PollContext, cancel: CancellationToken) {
    let device_id = ctx.state.borrow().device_id.clone();
    let mut tick = interval_at(Instant::now() + ctx.period, ctx.period);
    // Single flight: queries run inline, so a slow one swallows the ticks it
    // overlapped.
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tick.tick() => {}
        }

        let started = Instant::now();
        let status = tokio::select! {
            _ = cancel.cancelled() => break,
            r = ctx.gateway.device_status(&device_id) => r,
        };
        if started.elapsed() >= ctx.period {
            // Overran the period: wait a full period instead of firing the
            // overdue tick right away.
            tick.reset();
        }

        match status {
            Ok(DeviceStatus::Connected) => {
                if cancel.is_cancelled() {
                    break;
                }
                cancel.cancel();

                let connected = ctx.state.send_if_modified(|c| {
                    if c.state != ConnectionState::AwaitingPairing {
                        return false;
                    }
                    c.state = ConnectionState::Connected;
                    c.pairing_artifact = None;
                    true
                });
                if !connected {
                    break;
                }

                let _ = ctx.events.send(PairingEvent::Connected(device_id.clone()));
                tracing::info!(device = %device_id, "device connected");

                if let Some(dir) = &ctx.directory {
                    if let Err(e) = dir.refresh().await {
                        tracing::warn!("device listing refresh failed: {e}");
                    }
                }
                break;
            }
            Ok(other) => {
                tracing::debug!(device = %device_id, status = ?other, "still awaiting pairing");
            }
            Err(e) => {
                // Transient miss; the next tick retries.
                tracing::warn!(device = %device_id, "pairing status poll failed: {e}");
            }
        }
    }
}
