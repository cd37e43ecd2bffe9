//! The worker loop: claim, dispatch, resolve.

use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{debug, error, info};

use drip_core::JobId;
use drip_events::{EventSink, OpsEvent};

use crate::handler::{HandlerError, HandlerRegistry};
use crate::store::{JobStore, JobStoreError};
use crate::types::{FailureOutcome, Job, JobType, backoff_delay};

/// What to do with a job whose failure cannot be fixed by retrying
/// (malformed payload, unknown job_type).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PoisonPolicy {
    /// Fail terminally on first occurrence. Retrying a deterministic failure
    /// only replays the identical error until the budget runs out.
    #[default]
    FailImmediately,
    /// Route through the normal backoff path, consuming the retry budget —
    /// the reference behavior, for uniform failure accounting.
    ConsumeRetryBudget,
}

/// Worker loop configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Lease-owner identity recorded on claimed jobs. Must be unique per
    /// worker process.
    pub worker_name: String,
    /// Idle sleep between empty polls — the loop's only suspension point.
    pub poll_interval: Duration,
    /// Lease taken per claim. This bounds how soon a crashed worker's job
    /// becomes reclaimable, not how long a handler may run; handlers are
    /// expected to finish within it (there is no cooperative renewal), and
    /// idempotency covers the overrun case.
    pub lease: Duration,
    /// Interval between `worker.heartbeat` events, emitted independent of
    /// job activity.
    pub heartbeat_interval: Duration,
    pub poison_policy: PoisonPolicy,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_name: format!("worker-{}", std::process::id()),
            poll_interval: Duration::from_millis(500),
            lease: Duration::from_secs(60),
            heartbeat_interval: Duration::from_secs(15),
            poison_policy: PoisonPolicy::default(),
        }
    }
}

impl WorkerConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.worker_name = name.into();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    pub fn with_poison_policy(mut self, policy: PoisonPolicy) -> Self {
        self.poison_policy = policy;
        self
    }
}

/// How one dispatched job was resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Done,
    RetryScheduled { attempts: u32, run_at: DateTime<Utc> },
    Failed { attempts: u32 },
}

/// Outcome of one claim-and-dispatch.
#[derive(Debug, Clone)]
pub struct Processed {
    pub job_id: JobId,
    pub job_type: JobType,
    pub resolution: Resolution,
}

/// Handle to a spawned worker loop.
#[derive(Debug)]
pub struct WorkerHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
}

impl WorkerHandle {
    /// Request cooperative shutdown and wait for the loop to exit. The
    /// signal is observed at the next iteration boundary; an in-flight
    /// handler always runs to completion first.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

/// Single-threaded polling worker.
///
/// One worker claims, dispatches, and resolves one job at a time; running
/// several worker processes against one shared store is how this scales out,
/// with the store as the only synchronization point.
pub struct Worker {
    store: Arc<dyn JobStore>,
    registry: HandlerRegistry,
    sink: Arc<dyn EventSink>,
    config: WorkerConfig,
}

impl Worker {
    pub fn new(
        store: Arc<dyn JobStore>,
        registry: HandlerRegistry,
        sink: Arc<dyn EventSink>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            store,
            registry,
            sink,
            config,
        }
    }

    /// Run the loop on a dedicated thread. Shutdown is an explicit channel
    /// owned by the returned handle, checked once per iteration.
    pub fn spawn(self) -> WorkerHandle {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let name = self.config.worker_name.clone();
        let join = thread::Builder::new()
            .name(name)
            .spawn(move || self.run(shutdown_rx))
            .expect("failed to spawn worker thread");

        WorkerHandle {
            shutdown: shutdown_tx,
            join: Some(join),
        }
    }

    /// The loop body. Public mainly for embedders that manage their own
    /// threads; most callers want [`spawn`](Self::spawn).
    pub fn run(&self, shutdown: mpsc::Receiver<()>) {
        info!(worker = %self.config.worker_name, "worker started");
        self.sink.record(
            OpsEvent::info("worker.started")
                .with_data(json!({ "worker": self.config.worker_name })),
        );
        let mut last_heartbeat = Instant::now();

        loop {
            if shutdown.try_recv().is_ok() {
                self.sink.record(
                    OpsEvent::info("worker.stopped")
                        .with_data(json!({ "worker": self.config.worker_name })),
                );
                info!(worker = %self.config.worker_name, "worker stopped");
                break;
            }

            if last_heartbeat.elapsed() >= self.config.heartbeat_interval {
                self.sink.record(
                    OpsEvent::info("worker.heartbeat")
                        .with_data(json!({ "worker": self.config.worker_name })),
                );
                last_heartbeat = Instant::now();
            }

            match self.process_one() {
                Ok(Some(processed)) => {
                    debug!(
                        worker = %self.config.worker_name,
                        job_id = %processed.job_id,
                        job_type = %processed.job_type,
                        resolution = ?processed.resolution,
                        "job processed"
                    );
                }
                Ok(None) => thread::sleep(self.config.poll_interval),
                Err(e) => {
                    error!(worker = %self.config.worker_name, error = %e, "store error in worker loop");
                    thread::sleep(self.config.poll_interval);
                }
            }
        }
    }

    /// Claim and dispatch at most one job. `Ok(None)` means nothing was due.
    pub fn process_one(&self) -> Result<Option<Processed>, JobStoreError> {
        let Some(job) = self
            .store
            .claim_next(&self.config.worker_name, self.config.lease)?
        else {
            return Ok(None);
        };

        self.sink.record(
            OpsEvent::info("job.claimed")
                .for_job(job.id)
                .with_message(format!("claimed {}", job.job_type))
                .with_data(json!({ "owner": self.config.worker_name })),
        );

        let resolution = self.dispatch(&job)?;
        Ok(Some(Processed {
            job_id: job.id,
            job_type: job.job_type,
            resolution,
        }))
    }

    fn dispatch(&self, job: &Job) -> Result<Resolution, JobStoreError> {
        let Some(handler) = self.registry.get(&job.job_type) else {
            let err = format!("no handler for job_type={}", job.job_type);
            return self.resolve_poisoned(job, &err);
        };

        match handler.execute(&job.payload) {
            Ok(()) => self.resolve_done(job),
            Err(HandlerError::InvalidPayload(msg)) => {
                let err = format!("invalid payload: {msg}");
                self.resolve_poisoned(job, &err)
            }
            Err(HandlerError::Other(e)) => self.resolve_failed(job, &format!("{e:#}")),
        }
    }

    fn resolve_done(&self, job: &Job) -> Result<Resolution, JobStoreError> {
        match self.store.mark_done(job.id) {
            Ok(()) => {
                self.sink.record(OpsEvent::info("job.done").for_job(job.id));
                Ok(Resolution::Done)
            }
            // Someone else resolved it after our lease lapsed; their
            // resolution stands, ours was a duplicate run.
            Err(JobStoreError::InvalidTransition { from, .. }) => {
                debug!(job_id = %job.id, status = ?from, "job already resolved elsewhere");
                Ok(Resolution::Done)
            }
            Err(e) => Err(e),
        }
    }

    /// Normal failure path: backoff retry until the budget runs out.
    fn resolve_failed(&self, job: &Job, err: &str) -> Result<Resolution, JobStoreError> {
        let retry_at = Utc::now()
            + chrono::Duration::from_std(backoff_delay(job.attempts + 1)).unwrap_or_default();

        match self.store.mark_failed(job.id, err, retry_at) {
            Ok(FailureOutcome::Retried { attempts, run_at }) => {
                self.sink.record(
                    OpsEvent::warn("job.retry_scheduled")
                        .for_job(job.id)
                        .with_message(err)
                        .with_data(json!({ "attempts": attempts, "run_at": run_at })),
                );
                Ok(Resolution::RetryScheduled { attempts, run_at })
            }
            Ok(FailureOutcome::Exhausted { attempts }) => {
                self.sink.record(
                    OpsEvent::error("job.failed")
                        .for_job(job.id)
                        .with_message(err)
                        .with_data(json!({ "attempts": attempts })),
                );
                Ok(Resolution::Failed { attempts })
            }
            Err(JobStoreError::InvalidTransition { from, .. }) => {
                debug!(job_id = %job.id, status = ?from, "job already resolved elsewhere");
                Ok(Resolution::Done)
            }
            Err(e) => Err(e),
        }
    }

    /// Poison path: the failure is deterministic, apply the configured
    /// policy instead of blindly burning the retry budget.
    fn resolve_poisoned(&self, job: &Job, err: &str) -> Result<Resolution, JobStoreError> {
        match self.config.poison_policy {
            PoisonPolicy::ConsumeRetryBudget => self.resolve_failed(job, err),
            PoisonPolicy::FailImmediately => {
                match self.store.mark_failed_permanently(job.id, err) {
                    Ok(()) => {
                        self.sink.record(
                            OpsEvent::error("job.failed")
                                .for_job(job.id)
                                .with_message(err)
                                .with_data(json!({ "permanent": true })),
                        );
                        Ok(Resolution::Failed {
                            attempts: job.attempts + 1,
                        })
                    }
                    Err(JobStoreError::InvalidTransition { from, .. }) => {
                        debug!(job_id = %job.id, status = ?from, "job already resolved elsewhere");
                        Ok(Resolution::Done)
                    }
                    Err(e) => Err(e),
                }
            }
        }
    }
}
