use std::{collections::HashMap, fmt, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tokio::time::sleep;

use crate::{
    dispatch::job::DispatchJob,
    domain::RecipientId,
    errors::Error,
    ports::{GatewayPort, MediaMessage, NotificationRecord, NotificationStore},
    recipients::RecipientEntry,
    Result,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum DispatchState {
    Idle,
    Running,
    Paused,
    Stopping,
    Completed,
}

impl fmt::Display for DispatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Stopping => "stopping",
            Self::Completed => "completed",
        };
        f.write_str(s)
    }
}

/// Read-only view for the UI layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct DispatchProgress {
    /// Recipients processed so far (index of the next one).
    pub cursor: usize,
    pub total: usize,
    pub state: DispatchState,
}

impl DispatchProgress {
    fn idle() -> Self {
        Self {
            cursor: 0,
            total: 0,
            state: DispatchState::Idle,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum DispatchOutcome {
    Sent,
    Failed(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DispatchSummary {
    pub sent_count: usize,
    pub failed_count: usize,
    pub total: usize,
    pub stopped: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Acknowledgment returned by `start`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DispatchStarted {
    pub total: usize,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug)]
struct JobRecord {
    started_at: DateTime<Utc>,
    outcomes: HashMap<RecipientId, DispatchOutcome>,
    summary: Option<DispatchSummary>,
}

struct ControllerInner {
    gateway: Arc<dyn GatewayPort>,
    store: Arc<dyn NotificationStore>,
    progress: watch::Sender<DispatchProgress>,
    job: Mutex<Option<JobRecord>>,
}

/// Sends one message to many recipients, one at a time.
///
/// At most one job is active per controller. The job runs as a single
/// cooperative task: sends are strictly ordered by recipient index and never
/// overlap. `pause` / `stop` are observed at the next suspension point.
#[derive(Clone)]
pub struct DispatchController {
    inner: Arc<ControllerInner>,
}

impl DispatchController {
    pub fn new(gateway: Arc<dyn GatewayPort>, store: Arc<dyn NotificationStore>) -> Self {
        let (progress, _) = watch::channel(DispatchProgress::idle());
        Self {
            inner: Arc::new(ControllerInner {
                gateway,
                store,
                progress,
                job: Mutex::new(None),
            }),
        }
    }

    pub fn progress(&self) -> DispatchProgress {
        *self.inner.progress.borrow()
    }

    pub fn state(&self) -> DispatchState {
        self.progress().state
    }

    pub fn subscribe(&self) -> watch::Receiver<DispatchProgress> {
        self.inner.progress.subscribe()
    }

    /// Validate `job` and start sending in the background.
    pub async fn start(&self, job: DispatchJob) -> Result<DispatchStarted> {
        job.validate()?;

        let total = job.total();
        // No await between publishing `Running` and spawning the task.
        let mut record = self.inner.job.lock().await;
        self.transition("start", |s| s == DispatchState::Idle, |p| {
            *p = DispatchProgress {
                cursor: 0,
                total,
                state: DispatchState::Running,
            };
        })?;

        let started_at = Utc::now();
        *record = Some(JobRecord {
            started_at,
            outcomes: HashMap::with_capacity(total),
            summary: None,
        });
        drop(record);

        tracing::info!(
            device = %job.device_id,
            total,
            interval_seconds = job.interval_seconds,
            media = job.attachment.is_some(),
            "dispatch started"
        );

        let inner = self.inner.clone();
        tokio::spawn(async move {
            run_job(inner, job).await;
        });

        Ok(DispatchStarted { total, started_at })
    }

    pub fn pause(&self) -> Result<()> {
        self.transition("pause", |s| s == DispatchState::Running, |p| {
            p.state = DispatchState::Paused;
        })?;
        tracing::info!("dispatch paused");
        Ok(())
    }

    pub fn resume(&self) -> Result<()> {
        self.transition("resume", |s| s == DispatchState::Paused, |p| {
            p.state = DispatchState::Running;
        })?;
        tracing::info!("dispatch resumed");
        Ok(())
    }

    /// Request a stop. The in-flight send (if any) completes; nothing after it
    /// is attempted.
    pub fn stop(&self) -> Result<()> {
        self.transition(
            "stop",
            |s| matches!(s, DispatchState::Running | DispatchState::Paused),
            |p| p.state = DispatchState::Stopping,
        )?;
        tracing::info!("dispatch stop requested");
        Ok(())
    }

    /// Discard a completed job and return to `Idle`.
    pub async fn reset(&self) -> Result<()> {
        let mut record = self.inner.job.lock().await;
        self.transition("reset", |s| s == DispatchState::Completed, |p| {
            *p = DispatchProgress::idle();
        })?;
        record.take();
        Ok(())
    }

    pub async fn outcomes(&self) -> HashMap<RecipientId, DispatchOutcome> {
        self.inner
            .job
            .lock()
            .await
            .as_ref()
            .map(|j| j.outcomes.clone())
            .unwrap_or_default()
    }

    pub async fn summary(&self) -> Option<DispatchSummary> {
        self.inner
            .job
            .lock()
            .await
            .as_ref()
            .and_then(|j| j.summary.clone())
    }

    /// Wait for the active job to complete and return its summary.
    pub async fn wait(&self) -> Result<DispatchSummary> {
        let mut rx = self.subscribe();
        let state = rx.borrow().state;
        if state == DispatchState::Idle {
            return Err(Error::state("wait", state));
        }

        rx.wait_for(|p| p.state == DispatchState::Completed)
            .await
            .map_err(|_| Error::state("wait", "dropped"))?;

        self.summary()
            .await
            .ok_or_else(|| Error::state("wait", DispatchState::Idle))
    }

    /// Check-and-set on the published state; misuse leaves everything as is.
    fn transition(
        &self,
        operation: &'static str,
        allowed: impl FnOnce(DispatchState) -> bool,
        apply: impl FnOnce(&mut DispatchProgress),
    ) -> Result<()> {
        let mut rejected = None;
        self.inner.progress.send_if_modified(|p| {
            if allowed(p.state) {
                apply(p);
                true
            } else {
                rejected = Some(p.state);
                false
            }
        });

        match rejected {
            Some(state) => Err(Error::state(operation, state)),
            None => Ok(()),
        }
    }
}

async fn run_job(inner: Arc<ControllerInner>, job: DispatchJob) {
    let mut rx = inner.progress.subscribe();
    let total = job.total();
    let interval = Duration::from_secs(u64::from(job.interval_seconds));
    let media_base64 = job.attachment.as_ref().map(|a| a.to_base64());
    let mut stopped = false;

    for (idx, recipient) in job.recipients.iter().enumerate() {
        if !wait_while_paused(&mut rx).await {
            stopped = true;
            break;
        }

        let outcome = match deliver(&inner, &job, recipient, media_base64.as_deref()).await {
            Ok(()) => DispatchOutcome::Sent,
            Err(e) => {
                tracing::warn!(recipient = %recipient.number, "dispatch failed: {e}");
                DispatchOutcome::Failed(e.to_string())
            }
        };

        if let Some(record) = inner.job.lock().await.as_mut() {
            record.outcomes.insert(recipient.id, outcome);
        }
        inner.progress.send_modify(|p| p.cursor = idx + 1);

        if idx + 1 < total {
            tokio::select! {
                _ = sleep(interval) => {}
                _ = wait_for_stop(&mut rx) => {
                    stopped = true;
                    break;
                }
            }
        }
    }

    // A stop accepted while the last send was in flight still counts.
    let stopped = stopped || rx.borrow().state == DispatchState::Stopping;

    let summary = {
        let mut guard = inner.job.lock().await;
        let Some(record) = guard.as_mut() else {
            return;
        };
        let sent_count = record
            .outcomes
            .values()
            .filter(|o| **o == DispatchOutcome::Sent)
            .count();
        let summary = DispatchSummary {
            sent_count,
            failed_count: record.outcomes.len() - sent_count,
            total,
            stopped,
            started_at: record.started_at,
            finished_at: Utc::now(),
        };
        record.summary = Some(summary.clone());
        summary
    };

    inner
        .progress
        .send_modify(|p| p.state = DispatchState::Completed);
    tracing::info!(
        sent = summary.sent_count,
        failed = summary.failed_count,
        total = summary.total,
        stopped = summary.stopped,
        "dispatch completed"
    );
}

/// Exactly one send attempt for one recipient.
async fn deliver(
    inner: &ControllerInner,
    job: &DispatchJob,
    recipient: &RecipientEntry,
    media_base64: Option<&str>,
) -> Result<()> {
    let to = recipient.number.international();

    match (&job.attachment, media_base64) {
        (Some(attachment), Some(data_base64)) => {
            let msg = MediaMessage {
                to,
                mime_type: attachment.mime_type.clone(),
                data_base64: data_base64.to_string(),
                caption: job.message.clone(),
                file_name: attachment.file_name.clone(),
            };
            inner.gateway.send_media(&job.device_id, &msg).await
        }
        _ => {
            let record = NotificationRecord {
                name: job.title.clone(),
                message: job.message.clone(),
                recipient: to,
                channel_id: job.device_id.0.clone(),
            };
            inner.store.record(&record).await
        }
    }
}

/// Suspend while paused. Returns `false` once a stop was requested.
async fn wait_while_paused(rx: &mut watch::Receiver<DispatchProgress>) -> bool {
    loop {
        let state = rx.borrow_and_update().state;
        match state {
            DispatchState::Stopping => return false,
            DispatchState::Paused => {
                if rx.changed().await.is_err() {
                    return false;
                }
            }
            _ => return true,
        }
    }
}

async fn wait_for_stop(rx: &mut watch::Receiver<DispatchProgress>) {
    let _ = rx.wait_for(|p| p.state == DispatchState::Stopping).await;
}
