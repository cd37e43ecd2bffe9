//! Job storage and the atomic lease claim.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};

use drip_core::JobId;

use crate::types::{
    DEFAULT_MAX_ATTEMPTS, FailureOutcome, Job, JobStatus, JobType, NewJob,
};

/// Job store error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum JobStoreError {
    #[error("job not found: {0}")]
    NotFound(JobId),
    /// A resolution was attempted on a job that is not `running` — typically
    /// because another worker already resolved it after a lease overrun.
    #[error("job {job} is {from:?}, not running")]
    InvalidTransition { job: JobId, from: JobStatus },
    #[error("storage error: {0}")]
    Storage(String),
}

/// Queue occupancy counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct QueueStats {
    pub queued: usize,
    pub running: usize,
    pub done: usize,
    pub failed: usize,
}

/// Job persistence consumed by the worker loop and the handlers.
///
/// The store is the **sole synchronization point** between workers: no
/// in-process locks are shared across worker processes, so every contract
/// below must hold for concurrent callers.
///
/// Jobs are never deleted by this subsystem; retention is the embedder's
/// concern.
pub trait JobStore: Send + Sync {
    /// Persist a new job. `run_at` defaults to now, `max_attempts` to 8.
    /// The payload is stored opaquely; handlers validate it.
    fn enqueue(&self, new_job: NewJob) -> Result<JobId, JobStoreError>;

    fn get(&self, id: JobId) -> Result<Option<Job>, JobStoreError>;

    /// Claim the next due job for `owner`, taking a lease of `lease`.
    ///
    /// Selects the claimable job (see [`Job::is_claimable`]) with the
    /// smallest `(run_at, insertion order)` — earliest-scheduled first,
    /// FIFO on ties — and marks it `running` with
    /// `lease_expires_at = now + lease`.
    ///
    /// CONTRACT: selection and claim must be one atomic conditional update.
    /// Two concurrent callers must never both receive the same job. This is
    /// the central correctness property of the queue; implementations that
    /// read a candidate and write its lease in separate steps are broken.
    fn claim_next(&self, owner: &str, lease: Duration) -> Result<Option<Job>, JobStoreError>;

    /// Resolve a running job as succeeded: `running → done`, lease cleared.
    fn mark_done(&self, id: JobId) -> Result<(), JobStoreError>;

    /// Resolve a running job as failed: `attempts += 1`, lease cleared.
    /// With budget left the job is requeued for `retry_at`; otherwise it is
    /// terminally `failed`.
    fn mark_failed(
        &self,
        id: JobId,
        error: &str,
        retry_at: DateTime<Utc>,
    ) -> Result<FailureOutcome, JobStoreError>;

    /// Resolve a running job as terminally failed regardless of remaining
    /// budget (malformed payload, unknown job_type). `attempts` still
    /// increments: the run did happen and did fail.
    fn mark_failed_permanently(&self, id: JobId, error: &str) -> Result<(), JobStoreError>;

    /// Jobs currently in `status`, oldest first.
    fn list_by_status(&self, status: JobStatus) -> Result<Vec<Job>, JobStoreError>;

    /// Jobs of `job_type`, oldest first.
    fn list_by_type(&self, job_type: &JobType) -> Result<Vec<Job>, JobStoreError>;

    fn stats(&self) -> Result<QueueStats, JobStoreError>;
}

impl<S> JobStore for Arc<S>
where
    S: JobStore + ?Sized,
{
    fn enqueue(&self, new_job: NewJob) -> Result<JobId, JobStoreError> {
        (**self).enqueue(new_job)
    }

    fn get(&self, id: JobId) -> Result<Option<Job>, JobStoreError> {
        (**self).get(id)
    }

    fn claim_next(&self, owner: &str, lease: Duration) -> Result<Option<Job>, JobStoreError> {
        (**self).claim_next(owner, lease)
    }

    fn mark_done(&self, id: JobId) -> Result<(), JobStoreError> {
        (**self).mark_done(id)
    }

    fn mark_failed(
        &self,
        id: JobId,
        error: &str,
        retry_at: DateTime<Utc>,
    ) -> Result<FailureOutcome, JobStoreError> {
        (**self).mark_failed(id, error, retry_at)
    }

    fn mark_failed_permanently(&self, id: JobId, error: &str) -> Result<(), JobStoreError> {
        (**self).mark_failed_permanently(id, error)
    }

    fn list_by_status(&self, status: JobStatus) -> Result<Vec<Job>, JobStoreError> {
        (**self).list_by_status(status)
    }

    fn list_by_type(&self, job_type: &JobType) -> Result<Vec<Job>, JobStoreError> {
        (**self).list_by_type(job_type)
    }

    fn stats(&self) -> Result<QueueStats, JobStoreError> {
        (**self).stats()
    }
}

#[derive(Debug, Default)]
struct Jobs {
    /// Keyed by a monotonic insertion sequence; UUIDv7 ids are time-ordered
    /// but not guaranteed monotonic within a millisecond, and the FIFO
    /// tie-break must be exact.
    by_seq: BTreeMap<u64, Job>,
    index: HashMap<JobId, u64>,
    next_seq: u64,
}

/// In-memory job store for tests/dev.
///
/// One mutex guards everything, so each trait method — `claim_next`
/// included — is a single atomic step, which is exactly the claim contract.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: Mutex<Jobs>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Jobs>, JobStoreError> {
        self.jobs
            .lock()
            .map_err(|_| JobStoreError::Storage("job store lock poisoned".into()))
    }
}

fn running_job<'a>(jobs: &'a mut Jobs, id: JobId) -> Result<&'a mut Job, JobStoreError> {
    let seq = *jobs.index.get(&id).ok_or(JobStoreError::NotFound(id))?;
    let job = jobs.by_seq.get_mut(&seq).ok_or(JobStoreError::NotFound(id))?;
    if job.status != JobStatus::Running {
        return Err(JobStoreError::InvalidTransition {
            job: id,
            from: job.status,
        });
    }
    Ok(job)
}

impl JobStore for InMemoryJobStore {
    fn enqueue(&self, new_job: NewJob) -> Result<JobId, JobStoreError> {
        let now = Utc::now();
        let job = Job {
            id: JobId::new(),
            job_type: new_job.job_type,
            status: JobStatus::Queued,
            run_at: new_job.run_at.unwrap_or(now),
            attempts: 0,
            max_attempts: new_job.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS),
            payload: new_job.payload,
            lease_owner: None,
            lease_expires_at: None,
            last_error: None,
            created_at: now,
            updated_at: now,
        };

        let mut jobs = self.lock()?;
        let seq = jobs.next_seq;
        jobs.next_seq += 1;
        let id = job.id;
        jobs.index.insert(id, seq);
        jobs.by_seq.insert(seq, job);
        Ok(id)
    }

    fn get(&self, id: JobId) -> Result<Option<Job>, JobStoreError> {
        let jobs = self.lock()?;
        Ok(jobs
            .index
            .get(&id)
            .and_then(|seq| jobs.by_seq.get(seq))
            .cloned())
    }

    fn claim_next(&self, owner: &str, lease: Duration) -> Result<Option<Job>, JobStoreError> {
        let mut jobs = self.lock()?;
        let now = Utc::now();

        // Selection and claim happen under the same lock: no other claimer
        // can interleave between finding the candidate and leasing it.
        let candidate = jobs
            .by_seq
            .iter()
            .filter(|(_, job)| job.is_claimable(now))
            .min_by_key(|(seq, job)| (job.run_at, **seq))
            .map(|(seq, _)| *seq);

        let Some(seq) = candidate else {
            return Ok(None);
        };

        let job = jobs
            .by_seq
            .get_mut(&seq)
            .expect("candidate selected under the same lock");
        job.status = JobStatus::Running;
        job.lease_owner = Some(owner.to_owned());
        job.lease_expires_at =
            Some(now + chrono::Duration::from_std(lease).unwrap_or_default());
        job.updated_at = now;

        Ok(Some(job.clone()))
    }

    fn mark_done(&self, id: JobId) -> Result<(), JobStoreError> {
        let mut jobs = self.lock()?;
        let job = running_job(&mut jobs, id)?;
        job.status = JobStatus::Done;
        job.lease_owner = None;
        job.lease_expires_at = None;
        job.updated_at = Utc::now();
        Ok(())
    }

    fn mark_failed(
        &self,
        id: JobId,
        error: &str,
        retry_at: DateTime<Utc>,
    ) -> Result<FailureOutcome, JobStoreError> {
        let mut jobs = self.lock()?;
        let job = running_job(&mut jobs, id)?;
        let now = Utc::now();

        job.attempts += 1;
        job.last_error = Some(error.to_owned());
        job.lease_owner = None;
        job.lease_expires_at = None;
        job.updated_at = now;

        if job.attempts >= job.max_attempts {
            job.status = JobStatus::Failed;
            Ok(FailureOutcome::Exhausted {
                attempts: job.attempts,
            })
        } else {
            job.status = JobStatus::Queued;
            job.run_at = retry_at;
            Ok(FailureOutcome::Retried {
                attempts: job.attempts,
                run_at: retry_at,
            })
        }
    }

    fn mark_failed_permanently(&self, id: JobId, error: &str) -> Result<(), JobStoreError> {
        let mut jobs = self.lock()?;
        let job = running_job(&mut jobs, id)?;
        job.attempts += 1;
        job.last_error = Some(error.to_owned());
        job.lease_owner = None;
        job.lease_expires_at = None;
        job.status = JobStatus::Failed;
        job.updated_at = Utc::now();
        Ok(())
    }

    fn list_by_status(&self, status: JobStatus) -> Result<Vec<Job>, JobStoreError> {
        let jobs = self.lock()?;
        Ok(jobs
            .by_seq
            .values()
            .filter(|job| job.status == status)
            .cloned()
            .collect())
    }

    fn list_by_type(&self, job_type: &JobType) -> Result<Vec<Job>, JobStoreError> {
        let jobs = self.lock()?;
        Ok(jobs
            .by_seq
            .values()
            .filter(|job| &job.job_type == job_type)
            .cloned()
            .collect())
    }

    fn stats(&self) -> Result<QueueStats, JobStoreError> {
        let jobs = self.lock()?;
        let mut stats = QueueStats::default();
        for job in jobs.by_seq.values() {
            match job.status {
                JobStatus::Queued => stats.queued += 1,
                JobStatus::Running => stats.running += 1,
                JobStatus::Done => stats.done += 1,
                JobStatus::Failed => stats.failed += 1,
            }
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::backoff_delay;
    use serde_json::json;

    const LEASE: Duration = Duration::from_secs(60);

    fn tick_job() -> NewJob {
        NewJob::new(JobType::Tick, json!({}))
    }

    #[test]
    fn enqueue_applies_defaults() {
        let store = InMemoryJobStore::new();
        let before = Utc::now();
        let id = store.enqueue(tick_job()).unwrap();

        let job = store.get(id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.attempts, 0);
        assert_eq!(job.max_attempts, DEFAULT_MAX_ATTEMPTS);
        assert!(job.run_at >= before && job.run_at <= Utc::now());
        assert!(job.lease_owner.is_none());
    }

    #[test]
    fn claim_takes_a_lease() {
        let store = InMemoryJobStore::new();
        let id = store.enqueue(tick_job()).unwrap();

        let job = store.claim_next("w1", LEASE).unwrap().unwrap();
        assert_eq!(job.id, id);
        assert_eq!(job.status, JobStatus::Running);
        assert_eq!(job.lease_owner.as_deref(), Some("w1"));
        assert!(job.lease_expires_at.unwrap() > Utc::now());
    }

    #[test]
    fn claim_never_returns_future_jobs() {
        let store = InMemoryJobStore::new();
        store
            .enqueue(tick_job().run_at(Utc::now() + chrono::Duration::hours(1)))
            .unwrap();

        assert!(store.claim_next("w1", LEASE).unwrap().is_none());
    }

    #[test]
    fn claim_prefers_earliest_run_at_then_fifo() {
        let store = InMemoryJobStore::new();
        let now = Utc::now();
        let late = store
            .enqueue(tick_job().run_at(now - chrono::Duration::seconds(5)))
            .unwrap();
        let early = store
            .enqueue(tick_job().run_at(now - chrono::Duration::seconds(30)))
            .unwrap();
        // Same run_at as `early`: insertion order breaks the tie.
        let tied = store
            .enqueue(tick_job().run_at(now - chrono::Duration::seconds(30)))
            .unwrap();

        assert_eq!(store.claim_next("w", LEASE).unwrap().unwrap().id, early);
        assert_eq!(store.claim_next("w", LEASE).unwrap().unwrap().id, tied);
        assert_eq!(store.claim_next("w", LEASE).unwrap().unwrap().id, late);
    }

    #[test]
    fn live_lease_blocks_a_second_claim() {
        let store = InMemoryJobStore::new();
        store.enqueue(tick_job()).unwrap();

        assert!(store.claim_next("w1", LEASE).unwrap().is_some());
        assert!(store.claim_next("w2", LEASE).unwrap().is_none());
    }

    #[test]
    fn expired_lease_is_reclaimable_without_touching_attempts() {
        let store = InMemoryJobStore::new();
        let id = store.enqueue(tick_job()).unwrap();

        // Zero-length lease: expired the moment it is taken.
        let first = store.claim_next("w1", Duration::ZERO).unwrap().unwrap();
        assert_eq!(first.status, JobStatus::Running);

        let reclaimed = store.claim_next("w2", LEASE).unwrap().unwrap();
        assert_eq!(reclaimed.id, id);
        assert_eq!(reclaimed.lease_owner.as_deref(), Some("w2"));
        assert_eq!(reclaimed.attempts, 0);
    }

    #[test]
    fn concurrent_claimers_never_share_a_job() {
        use std::collections::HashSet;
        use std::thread;

        let store = InMemoryJobStore::arc();
        for _ in 0..50 {
            store.enqueue(tick_job()).unwrap();
        }

        let claimed: Vec<JobId> = thread::scope(|scope| {
            let workers: Vec<_> = (0..8)
                .map(|w| {
                    let store = Arc::clone(&store);
                    scope.spawn(move || {
                        let owner = format!("w{w}");
                        let mut mine = Vec::new();
                        while let Some(job) = store.claim_next(&owner, LEASE).unwrap() {
                            mine.push(job.id);
                        }
                        mine
                    })
                })
                .collect();
            workers
                .into_iter()
                .flat_map(|handle| handle.join().unwrap())
                .collect()
        });

        assert_eq!(claimed.len(), 50);
        let unique: HashSet<_> = claimed.iter().collect();
        assert_eq!(unique.len(), 50, "a job was claimed twice");
    }

    #[test]
    fn done_clears_the_lease_and_is_terminal() {
        let store = InMemoryJobStore::new();
        let id = store.enqueue(tick_job()).unwrap();
        store.claim_next("w1", LEASE).unwrap().unwrap();

        store.mark_done(id).unwrap();
        let job = store.get(id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Done);
        assert!(job.lease_owner.is_none());
        assert!(job.lease_expires_at.is_none());

        // Terminal: no further claims, no further transitions.
        assert!(store.claim_next("w1", LEASE).unwrap().is_none());
        assert!(matches!(
            store.mark_done(id),
            Err(JobStoreError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn failure_requeues_with_backoff_until_budget_runs_out() {
        let store = InMemoryJobStore::new();
        let id = store.enqueue(tick_job().max_attempts(3)).unwrap();

        for expected_attempts in 1..=3u32 {
            let job = store.claim_next("w1", LEASE).unwrap().unwrap();
            assert_eq!(job.id, id);

            // Requeue in the past so the next iteration can claim immediately.
            let retry_at = Utc::now() - chrono::Duration::seconds(1);
            let outcome = store.mark_failed(id, "boom", retry_at).unwrap();

            let job = store.get(id).unwrap().unwrap();
            assert_eq!(job.attempts, expected_attempts);
            assert!(job.lease_expires_at.is_none());
            assert_eq!(job.last_error.as_deref(), Some("boom"));

            if expected_attempts < 3 {
                assert_eq!(
                    outcome,
                    FailureOutcome::Retried {
                        attempts: expected_attempts,
                        run_at: retry_at
                    }
                );
                assert_eq!(job.status, JobStatus::Queued);
                assert_eq!(job.run_at, retry_at);
            } else {
                assert_eq!(
                    outcome,
                    FailureOutcome::Exhausted {
                        attempts: expected_attempts
                    }
                );
                assert_eq!(job.status, JobStatus::Failed);
            }
        }

        // A fourth claim attempt never returns the failed job.
        assert!(store.claim_next("w1", LEASE).unwrap().is_none());
    }

    #[test]
    fn first_retry_lands_about_one_second_out() {
        let store = InMemoryJobStore::new();
        let id = store.enqueue(tick_job()).unwrap();
        let job = store.claim_next("w1", LEASE).unwrap().unwrap();

        let retry_at =
            Utc::now() + chrono::Duration::from_std(backoff_delay(job.attempts + 1)).unwrap();
        store.mark_failed(id, "no sequence steps", retry_at).unwrap();

        let job = store.get(id).unwrap().unwrap();
        assert_eq!(job.attempts, 1);
        assert_eq!(job.status, JobStatus::Queued);
        let delay = (job.run_at - Utc::now()).num_milliseconds();
        assert!((500..=1_500).contains(&delay), "delay was {delay}ms");
    }

    #[test]
    fn permanent_failure_skips_the_remaining_budget() {
        let store = InMemoryJobStore::new();
        let id = store.enqueue(tick_job()).unwrap();
        store.claim_next("w1", LEASE).unwrap();

        store
            .mark_failed_permanently(id, "no handler for job_type=reindex")
            .unwrap();

        let job = store.get(id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.attempts, 1);
        assert!(store.claim_next("w1", LEASE).unwrap().is_none());
    }

    #[test]
    fn resolving_an_unclaimed_job_is_rejected() {
        let store = InMemoryJobStore::new();
        let id = store.enqueue(tick_job()).unwrap();

        assert!(matches!(
            store.mark_done(id),
            Err(JobStoreError::InvalidTransition {
                from: JobStatus::Queued,
                ..
            })
        ));
        assert!(matches!(
            store.mark_failed(id, "e", Utc::now()),
            Err(JobStoreError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn stats_track_every_status() {
        let store = InMemoryJobStore::new();
        for _ in 0..3 {
            store.enqueue(tick_job()).unwrap();
        }
        let claimed = store.claim_next("w1", LEASE).unwrap().unwrap();
        store.mark_done(claimed.id).unwrap();
        store.claim_next("w1", LEASE).unwrap().unwrap();

        assert_eq!(
            store.stats().unwrap(),
            QueueStats {
                queued: 1,
                running: 1,
                done: 1,
                failed: 0
            }
        );
    }
}
