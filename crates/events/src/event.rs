//! Operational event record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use drip_core::JobId;

/// Severity of an operational event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventLevel {
    Info,
    Warn,
    Error,
}

/// One entry in the operational log.
///
/// Events are immutable facts; treat them as append-only. `name` is a stable
/// dotted identifier (e.g. "job.retry_scheduled", "email.sent").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpsEvent {
    pub name: String,
    pub level: EventLevel,
    pub job_id: Option<JobId>,
    pub message: Option<String>,
    pub data: Option<serde_json::Value>,
    pub occurred_at: DateTime<Utc>,
}

impl OpsEvent {
    pub fn new(name: impl Into<String>, level: EventLevel) -> Self {
        Self {
            name: name.into(),
            level,
            job_id: None,
            message: None,
            data: None,
            occurred_at: Utc::now(),
        }
    }

    pub fn info(name: impl Into<String>) -> Self {
        Self::new(name, EventLevel::Info)
    }

    pub fn warn(name: impl Into<String>) -> Self {
        Self::new(name, EventLevel::Warn)
    }

    pub fn error(name: impl Into<String>) -> Self {
        Self::new(name, EventLevel::Error)
    }

    pub fn for_job(mut self, job_id: JobId) -> Self {
        self.job_id = Some(job_id);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}
