//! Once-per-day run gate.
//!
//! The lock is the set of `scoring_jobs` rows for the run date: a `running`
//! row means another run owns the day. Rows left `running` by a crashed
//! process are reclaimed once they are older than the staleness window.

use crate::models::{JobId, JobRecord};
use crate::store::JobStore;
use chrono::{DateTime, Duration, NaiveDate, Utc};

/// Default age after which a `running` record is presumed abandoned.
pub const DEFAULT_STALE_AFTER_HOURS: i64 = 4;

/// What to do when the day already has a completed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RerunPolicy {
    /// Log the earlier run and start another one.
    Allow,
    /// Refuse to start a second run for the same day.
    Deny,
}

/// Why a run was not allowed to start.
#[derive(Debug, Clone, PartialEq)]
pub enum DenyReason {
    /// Another run is still active for the date.
    AlreadyRunning {
        job_id: JobId,
        started_at: DateTime<Utc>,
    },
    /// The day already completed and re-runs are denied.
    AlreadyCompleted { job_id: JobId },
    /// The check itself failed; the lock is never granted on an unreliable
    /// check.
    CheckFailed(String),
}

/// Outcome of a lock acquisition attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum LockDecision {
    Granted,
    Denied(DenyReason),
}

impl LockDecision {
    pub fn is_granted(&self) -> bool {
        matches!(self, LockDecision::Granted)
    }
}

/// Decides whether a scoring run may start for a date.
#[derive(Debug, Clone)]
pub struct JobLock {
    stale_after: Duration,
    rerun_policy: RerunPolicy,
}

impl Default for JobLock {
    fn default() -> Self {
        Self::new(Duration::hours(DEFAULT_STALE_AFTER_HOURS), RerunPolicy::Allow)
    }
}

impl JobLock {
    pub fn new(stale_after: Duration, rerun_policy: RerunPolicy) -> Self {
        Self {
            stale_after,
            rerun_policy,
        }
    }

    pub fn rerun_policy(&self) -> RerunPolicy {
        self.rerun_policy
    }

    /// Try to take the lock for `job_date` as of `now`.
    ///
    /// Stale `running` records are marked `failed` first, whatever the
    /// outcome. Store faults deny the lock.
    pub async fn acquire<S: JobStore + ?Sized>(
        &self,
        store: &S,
        job_date: NaiveDate,
        now: DateTime<Utc>,
    ) -> LockDecision {
        match self.check(store, job_date, now).await {
            Ok(decision) => decision,
            Err(e) => {
                tracing::error!("Error checking job lock for {}: {}", job_date, e);
                LockDecision::Denied(DenyReason::CheckFailed(e.to_string()))
            }
        }
    }

    async fn check<S: JobStore + ?Sized>(
        &self,
        store: &S,
        job_date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<LockDecision, crate::errors::JobError> {
        let cutoff = now - self.stale_after;
        let reclaimed = store.reclaim_stale_jobs(job_date, cutoff).await?;
        if reclaimed > 0 {
            tracing::warn!(
                "Marked {} stale running jobs for {} as failed",
                reclaimed,
                job_date
            );
        }

        if let Some(JobRecord { id, start_time, .. }) = store.find_running_job(job_date).await? {
            tracing::warn!(
                "Scoring job {} already running for {} (started at {})",
                id,
                job_date,
                start_time
            );
            return Ok(LockDecision::Denied(DenyReason::AlreadyRunning {
                job_id: id,
                started_at: start_time,
            }));
        }

        if let Some(completed) = store.find_completed_job(job_date).await? {
            match self.rerun_policy {
                RerunPolicy::Allow => {
                    tracing::info!(
                        "Found completed job {} for {}. Allowing re-run.",
                        completed.id,
                        job_date
                    );
                }
                RerunPolicy::Deny => {
                    tracing::warn!(
                        "Found completed job {} for {}. Re-runs are disabled.",
                        completed.id,
                        job_date
                    );
                    return Ok(LockDecision::Denied(DenyReason::AlreadyCompleted {
                        job_id: completed.id,
                    }));
                }
            }
        }

        Ok(LockDecision::Granted)
    }
}
