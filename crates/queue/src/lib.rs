//! `drip-queue` — durable job queue with lease-based claiming.
//!
//! ## Design
//!
//! - Jobs are typed, scheduled (`run_at`) and carry their own retry budget
//! - Claiming takes a time-bounded **lease**: a crashed worker's job becomes
//!   reclaimable once its lease expires, with no coordinator involved
//! - The claim is a single atomic conditional update — two concurrent
//!   claimers can never both win the same job
//! - Failed runs retry with exponential backoff, capped at 60s
//! - Execution is at-least-once; handlers are required to be idempotent
//!
//! ## Components
//!
//! - `Job` / `NewJob`: the unit of deferred work and its enqueue request
//! - `JobStore`: persistence and the atomic claim/resolve operations
//! - `JobHandler` / `HandlerRegistry`: explicit job_type → handler mapping
//! - `Worker`: single-threaded poll loop; claims, dispatches, resolves

pub mod handler;
pub mod store;
pub mod types;
pub mod worker;

pub use handler::{HandlerError, HandlerRegistry, JobHandler};
pub use store::{InMemoryJobStore, JobStore, JobStoreError, QueueStats};
pub use types::{
    DEFAULT_MAX_ATTEMPTS, FailureOutcome, Job, JobStatus, JobType, NewJob, backoff_delay,
};
pub use worker::{PoisonPolicy, Processed, Resolution, Worker, WorkerConfig, WorkerHandle};
