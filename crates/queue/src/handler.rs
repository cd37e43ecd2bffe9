//! Handler capability and registry.

use std::collections::HashMap;

use crate::types::JobType;

/// Why a handler run did not succeed.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// The payload could not be decoded for this job_type. Retrying cannot
    /// succeed; the worker routes this through its poison policy instead of
    /// the backoff path.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// Any other failure (store error, provider timeout, missing
    /// precondition that may appear later). Retried with backoff.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl HandlerError {
    pub fn invalid_payload(err: impl core::fmt::Display) -> Self {
        Self::InvalidPayload(err.to_string())
    }
}

/// One idempotent unit of campaign work.
///
/// `execute` must be safe to re-invoke with the same payload after a partial
/// or full prior success: the queue guarantees at-least-once execution, and
/// after a lease overrun two workers may even run the same job concurrently.
/// No double email, no double outbox row, no double state advance.
pub trait JobHandler: Send + Sync {
    /// The job_type this handler owns.
    fn job_type(&self) -> JobType;

    /// Run the job. Domain no-ops (missing campaign/lead/outbox, wrong lead
    /// state) are a successful `Ok(())`, not an error — that is the
    /// idempotency escape hatch for races and redeliveries.
    fn execute(&self, payload: &serde_json::Value) -> Result<(), HandlerError>;
}

/// Explicit job_type → handler mapping, assembled at startup.
///
/// There is no global registration; embedders construct the registry, add
/// every handler they want dispatched, and hand it to the worker.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<JobType, Box<dyn JobHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under its own job_type, replacing any previous
    /// registration for that type.
    pub fn register(&mut self, handler: Box<dyn JobHandler>) -> &mut Self {
        self.handlers.insert(handler.job_type(), handler);
        self
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, handler: Box<dyn JobHandler>) -> Self {
        self.register(handler);
        self
    }

    pub fn get(&self, job_type: &JobType) -> Option<&dyn JobHandler> {
        self.handlers.get(job_type).map(|h| h.as_ref())
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl core::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("job_types", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}
