//! Core job types and retry math.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use drip_core::JobId;

/// Default retry budget per job.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 8;

/// Backoff ceiling in seconds.
pub const MAX_BACKOFF_SECS: u64 = 60;

/// Delay before a job that has now failed `attempt` times becomes claimable
/// again: `min(60, 2^(attempt-1))` seconds — 1, 2, 4, 8, 16, 32, 60, 60, ...
pub fn backoff_delay(attempt: u32) -> Duration {
    // 2^6 = 64 already exceeds the cap; clamp the exponent before shifting.
    let exponent = attempt.saturating_sub(1).min(6);
    Duration::from_secs((1u64 << exponent).min(MAX_BACKOFF_SECS))
}

/// Job type tag, routing a job to its handler.
///
/// Serialized as the plain tag string (`"tick"`, `"generate_copy"`, ...);
/// unrecognized tags round-trip through [`JobType::Custom`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JobType {
    /// Campaign sweep; re-enqueues itself.
    Tick,
    /// Compose the next email for a lead, creating an outbox record.
    GenerateCopy,
    /// Deliver an outbox record and advance the lead.
    SendEmail,
    /// Check a conversation thread for replies.
    PollReplies,
    /// Extension point for embedders.
    Custom(String),
}

impl JobType {
    pub fn as_str(&self) -> &str {
        match self {
            JobType::Tick => "tick",
            JobType::GenerateCopy => "generate_copy",
            JobType::SendEmail => "send_email",
            JobType::PollReplies => "poll_replies",
            JobType::Custom(tag) => tag,
        }
    }
}

impl From<String> for JobType {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "tick" => JobType::Tick,
            "generate_copy" => JobType::GenerateCopy,
            "send_email" => JobType::SendEmail,
            "poll_replies" => JobType::PollReplies,
            _ => JobType::Custom(tag),
        }
    }
}

impl From<JobType> for String {
    fn from(job_type: JobType) -> Self {
        job_type.as_str().to_owned()
    }
}

impl core::fmt::Display for JobType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Job execution status.
///
/// The only reachable transitions are
/// `queued → running → {done | queued | failed}`; `done` and `failed` are
/// terminal. A `running` job whose lease has expired is claimable again
/// without a status change — that is the crash-recovery path, not a
/// transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Done,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed)
    }
}

/// A unit of deferred work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub job_type: JobType,
    pub status: JobStatus,
    /// Earliest execution time.
    pub run_at: DateTime<Utc>,
    /// Failed runs so far. Increases only when a run fails.
    pub attempts: u32,
    pub max_attempts: u32,
    /// Opaque, job_type-specific data. Validated by the handler, not here.
    pub payload: serde_json::Value,
    pub lease_owner: Option<String>,
    pub lease_expires_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Whether this job may be claimed at `now`.
    ///
    /// A `running` job with an expired lease is claimable: its worker
    /// crashed (or overran the lease) and someone else may take over.
    pub fn is_claimable(&self, now: DateTime<Utc>) -> bool {
        matches!(self.status, JobStatus::Queued | JobStatus::Running)
            && self.run_at <= now
            && self.lease_expires_at.is_none_or(|expires| expires <= now)
    }
}

/// Request to enqueue a job.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub job_type: JobType,
    pub payload: serde_json::Value,
    /// Defaults to now (immediately eligible).
    pub run_at: Option<DateTime<Utc>>,
    /// Defaults to [`DEFAULT_MAX_ATTEMPTS`].
    pub max_attempts: Option<u32>,
}

impl NewJob {
    pub fn new(job_type: JobType, payload: serde_json::Value) -> Self {
        Self {
            job_type,
            payload,
            run_at: None,
            max_attempts: None,
        }
    }

    /// Schedule for a specific time instead of now.
    pub fn run_at(mut self, at: DateTime<Utc>) -> Self {
        self.run_at = Some(at);
        self
    }

    /// Schedule with a delay from now.
    pub fn delayed(mut self, delay: Duration) -> Self {
        self.run_at = Some(Utc::now() + chrono::Duration::from_std(delay).unwrap_or_default());
        self
    }

    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }
}

/// What `mark_failed` decided for a failed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Budget remains; requeued for `run_at`.
    Retried { attempts: u32, run_at: DateTime<Utc> },
    /// Budget exhausted; the job is terminally failed.
    Exhausted { attempts: u32 },
}
