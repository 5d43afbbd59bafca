use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::foundation::error::{PreviewError, PreviewResult};
use crate::jobs::store::KvStore;
use crate::scene::model::{FeatureId, OptionId, ScanId};

const KEY_PREFIX: &str = "render_job:";

/// Identifier of one final-render job.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct JobId(uuid::Uuid);

impl JobId {
    /// Fresh random id.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Parse the textual form produced by `Display`.
    pub fn parse(s: &str) -> PreviewResult<Self> {
        uuid::Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| PreviewError::validation(format!("invalid job id '{s}': {e}")))
    }

    fn store_key(&self) -> String {
        format!("{KEY_PREFIX}{}", self.0)
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Lifecycle of a render job. `Completed` and `Failed` are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    /// `true` for states a job never leaves.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Allowed edges: queued -> processing | failed, processing -> completed | failed.
    pub fn can_become(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (Self::Queued, Self::Processing)
                | (Self::Queued, Self::Failed)
                | (Self::Processing, Self::Completed)
                | (Self::Processing, Self::Failed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// Snapshot of what the user asked for when finalizing.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobInput {
    pub scan_id: Option<ScanId>,
    pub selections: BTreeMap<FeatureId, OptionId>,
    #[serde(default)]
    pub extras: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub user_prompt: String,
    #[serde(default)]
    pub variant: u32,
    /// Instruction text handed to the worker.
    pub instruction: String,
}

/// One stored render job record.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RenderJob {
    pub id: JobId,
    pub status: JobStatus,
    pub input: JobInput,
    /// Reference to the delivered image once completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    /// Worker failure text once failed, surfaced verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Client-side view of the job queue.
pub trait JobBackend {
    /// Create a queued job.
    fn enqueue(&self, input: JobInput) -> impl Future<Output = PreviewResult<JobId>>;

    /// Current record; `None` if unknown or expired.
    fn status(&self, id: JobId) -> impl Future<Output = PreviewResult<Option<RenderJob>>>;
}

/// Render jobs persisted in a [`KvStore`] with a bounded lifetime.
#[derive(Debug)]
pub struct JobService<S> {
    store: S,
    ttl: Duration,
}

impl<S: KvStore> JobService<S> {
    pub fn new(store: S, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Worker acquired the job.
    pub async fn mark_processing(&self, id: JobId) -> PreviewResult<RenderJob> {
        self.transition(id, JobStatus::Processing, |_| {}).await
    }

    /// Worker delivered `result`.
    pub async fn complete(&self, id: JobId, result: impl Into<String>) -> PreviewResult<RenderJob> {
        let result = result.into();
        self.transition(id, JobStatus::Completed, |job| {
            job.result = Some(result);
        })
        .await
    }

    /// Worker gave up with `error`.
    pub async fn fail(&self, id: JobId, error: impl Into<String>) -> PreviewResult<RenderJob> {
        let error = error.into();
        self.transition(id, JobStatus::Failed, |job| {
            job.error = Some(error);
        })
        .await
    }

    async fn load(&self, id: JobId) -> PreviewResult<Option<RenderJob>> {
        let Some(text) = self.store.get(&id.store_key()).await? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_str(&text)?))
    }

    async fn save(&self, job: &RenderJob) -> PreviewResult<()> {
        let text = serde_json::to_string(job)?;
        self.store
            .set_with_ttl(&job.id.store_key(), text, self.ttl)
            .await
    }

    async fn transition(
        &self,
        id: JobId,
        next: JobStatus,
        apply: impl FnOnce(&mut RenderJob),
    ) -> PreviewResult<RenderJob> {
        let mut job = self
            .load(id)
            .await?
            .ok_or_else(|| PreviewError::not_found(format!("render job {id}")))?;
        if !job.status.can_become(next) {
            return Err(PreviewError::validation(format!(
                "render job {id} cannot go from {} to {}",
                job.status.as_str(),
                next.as_str()
            )));
        }
        job.status = next;
        apply(&mut job);
        self.save(&job).await?;
        tracing::info!(job = %id, status = next.as_str(), "render job transition");
        Ok(job)
    }
}

impl<S: KvStore> JobBackend for JobService<S> {
    async fn enqueue(&self, input: JobInput) -> PreviewResult<JobId> {
        let job = RenderJob {
            id: JobId::new(),
            status: JobStatus::Queued,
            input,
            result: None,
            error: None,
        };
        self.save(&job).await?;
        tracing::info!(job = %job.id, "render job queued");
        Ok(job.id)
    }

    async fn status(&self, id: JobId) -> PreviewResult<Option<RenderJob>> {
        self.load(id).await
    }
}

/// How a poll loop ended.
#[derive(Clone, Debug, PartialEq)]
pub enum PollOutcome {
    /// The job reached `Completed` or `Failed`.
    Terminal(RenderJob),
    /// The record is unknown or expired.
    NotFound,
    /// The token was cancelled.
    Cancelled,
    /// The record could not be read (corrupt or rejected); polling stopped.
    Unreadable(String),
}

/// Poll `id` every `interval` until it is terminal, gone, or `token` is cancelled.
///
/// The first poll happens immediately. `on_update` sees every record read, terminal included.
/// Transient backend errors are logged and polling continues.
pub async fn poll_until_terminal<J: JobBackend>(
    backend: &J,
    id: JobId,
    interval: Duration,
    token: &CancellationToken,
    mut on_update: impl FnMut(&RenderJob),
) -> PollOutcome {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => return PollOutcome::Cancelled,
            _ = ticker.tick() => {}
        }
        let polled = tokio::select! {
            biased;
            _ = token.cancelled() => return PollOutcome::Cancelled,
            r = backend.status(id) => r,
        };
        match polled {
            Ok(Some(job)) => {
                on_update(&job);
                if job.status.is_terminal() {
                    return PollOutcome::Terminal(job);
                }
            }
            Ok(None) => {
                tracing::info!(job = %id, "render job not found");
                return PollOutcome::NotFound;
            }
            Err(e) if e.is_transient() => {
                tracing::warn!(job = %id, error = %e, "render job poll failed; retrying");
            }
            Err(e) => return PollOutcome::Unreadable(e.to_string()),
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/jobs/render_job.rs"]
mod tests;
