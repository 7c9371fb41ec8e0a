/// Nightly scoring run
///
/// Drives one run through its states:
/// Idle → Connecting → LockCheck → RecordCreated → Scoring → Cleanup → Finalized
///
/// Every step takes the run's [`RunContext`] explicitly and returns a
/// `Result`; [`Orchestrator`] matches on it to choose the next transition.
/// Scores are reported in the log only and never written back to the lead.
use crate::config::{Config, DEFAULT_RETENTION_DAYS};
use crate::db::{connect_with_retry, RetryPolicy};
use crate::errors::{JobError, ResultExt};
use crate::job_lock::{DenyReason, JobLock, LockDecision};
use crate::models::{JobId, JobStatus};
use crate::scoring;
use crate::scoring_config::{self, ScoringConfig};
use crate::store::JobStore;
use chrono::{DateTime, Days, NaiveDate, Utc};
use futures_util::StreamExt;
use serde::Serialize;
use std::future::Future;
use std::time::Instant;

/// Progress is logged every this many scored leads.
pub const PROGRESS_LOG_INTERVAL: i64 = 100;

/// Audit score passed to the scoring function until an audit source exists.
pub const AUDIT_SCORE_UNAVAILABLE: f64 = 0.0;

/// States a run moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Connecting,
    LockCheck,
    RecordCreated,
    Scoring,
    Cleanup,
    Finalized(JobStatus),
}

/// Mutable bookkeeping for a single run.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub job_date: NaiveDate,
    pub job_id: Option<JobId>,
    pub state: RunState,
    pub leads_processed: i64,
    pub leads_skipped: i64,
    pub started_at: DateTime<Utc>,
    started: Instant,
}

impl RunContext {
    pub fn new(job_date: NaiveDate) -> Self {
        Self {
            job_date,
            job_id: None,
            state: RunState::Idle,
            leads_processed: 0,
            leads_skipped: 0,
            started_at: Utc::now(),
            started: Instant::now(),
        }
    }

    fn transition(&mut self, next: RunState) {
        tracing::debug!(
            "Scoring job for {}: {:?} -> {:?}",
            self.job_date,
            self.state,
            next
        );
        self.state = next;
    }

    fn report(&self, status: JobStatus) -> RunReport {
        RunReport {
            job_id: self.job_id,
            job_date: self.job_date,
            status,
            leads_processed: self.leads_processed,
            leads_skipped: self.leads_skipped,
            duration_secs: self.started.elapsed().as_secs_f64(),
        }
    }
}

/// Summary of a run that got as far as creating its job record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub job_id: Option<JobId>,
    pub job_date: NaiveDate,
    pub status: JobStatus,
    pub leads_processed: i64,
    pub leads_skipped: i64,
    pub duration_secs: f64,
}

/// Why a run ended before any scoring happened.
#[derive(Debug, Clone, PartialEq)]
pub enum StartFailure {
    /// The store stayed unreachable for the whole retry budget.
    ConnectFailed(String),
    /// The lock manager refused the run.
    LockDenied(DenyReason),
    /// The job record could not be inserted.
    RecordNotCreated(String),
}

/// Final result of a run.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed(RunReport),
    Failed { report: RunReport, error: String },
    NotStarted(StartFailure),
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Completed(_))
    }

    /// Process exit code for the run.
    ///
    /// # Returns
    ///
    /// * `0` - The run completed.
    /// * `1` - The run failed or never started.
    pub fn exit_code(&self) -> i32 {
        if self.is_success() {
            0
        } else {
            1
        }
    }

    pub fn report(&self) -> Option<&RunReport> {
        match self {
            RunOutcome::Completed(report) | RunOutcome::Failed { report, .. } => Some(report),
            RunOutcome::NotStarted(_) => None,
        }
    }
}

/// Runs the scoring job end to end.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    lock: JobLock,
    connect_retry: RetryPolicy,
    retention_days: u64,
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new(
            JobLock::default(),
            RetryPolicy::default(),
            DEFAULT_RETENTION_DAYS as u64,
        )
    }
}

impl Orchestrator {
    pub fn new(lock: JobLock, connect_retry: RetryPolicy, retention_days: u64) -> Self {
        Self {
            lock,
            connect_retry,
            retention_days,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.job_lock(),
            config.connect_retry.clone(),
            config.retention_days.max(0) as u64,
        )
    }

    /// Connect with retry, run against the store, then close it whatever
    /// happened.
    ///
    /// # Arguments
    ///
    /// * `job_date` - Calendar day the run scores and locks.
    /// * `connect` - Opens the store; retried under the orchestrator's `RetryPolicy`.
    ///
    /// # Returns
    ///
    /// * `RunOutcome` - `NotStarted` when the connection, lock or job record
    ///   could not be obtained, otherwise `Completed` or `Failed` with a report.
    pub async fn run<S, F, Fut>(&self, job_date: NaiveDate, connect: F) -> RunOutcome
    where
        S: JobStore,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<S, JobError>>,
    {
        let mut ctx = RunContext::new(job_date);
        tracing::info!("Starting scoring job for {}", job_date);

        ctx.transition(RunState::Connecting);
        let store = match connect_with_retry(&self.connect_retry, connect).await {
            Ok(store) => store,
            Err(e) => {
                tracing::error!("Scoring job for {} could not start: {}", job_date, e);
                return RunOutcome::NotStarted(StartFailure::ConnectFailed(e.to_string()));
            }
        };

        let outcome = self.run_connected(&store, ctx).await;

        store.close().await;
        tracing::info!("Database connection closed");

        outcome
    }

    /// Lock, create the record, score, clean up and finalize on an open store.
    ///
    /// # Arguments
    ///
    /// * `store` - Open store. It is not closed here.
    /// * `ctx` - Fresh context for the run.
    ///
    /// # Returns
    ///
    /// * `RunOutcome` - Same as [`Orchestrator::run`], minus `ConnectFailed`.
    pub async fn run_connected<S: JobStore + ?Sized>(
        &self,
        store: &S,
        mut ctx: RunContext,
    ) -> RunOutcome {
        ctx.transition(RunState::LockCheck);
        if let LockDecision::Denied(reason) = self.lock.acquire(store, ctx.job_date, Utc::now()).await
        {
            tracing::warn!(
                "Scoring job for {} not started: lock denied ({:?})",
                ctx.job_date,
                reason
            );
            return RunOutcome::NotStarted(StartFailure::LockDenied(reason));
        }

        let job_id = match create_job_record(store, &mut ctx).await {
            Ok(id) => id,
            Err(e) => {
                tracing::error!("Error creating job record for {}: {}", ctx.job_date, e);
                return RunOutcome::NotStarted(StartFailure::RecordNotCreated(e.to_string()));
            }
        };

        let config = scoring_config::load(store).await;

        if let Err(e) = score_leads(store, &config, &mut ctx).await {
            let error = format!("Scoring job failed: {}", e);
            tracing::error!("{} (job {}, {})", error, job_id, ctx.job_date);
            finalize(store, &mut ctx, JobStatus::Failed).await;
            return RunOutcome::Failed {
                report: ctx.report(JobStatus::Failed),
                error,
            };
        }

        ctx.transition(RunState::Cleanup);
        match cleanup_expired_jobs(store, ctx.job_date, self.retention_days).await {
            Ok(deleted) => tracing::info!("Cleaned up {} old job records", deleted),
            Err(e) => tracing::error!("Error cleaning up old jobs: {}", e),
        }

        finalize(store, &mut ctx, JobStatus::Completed).await;

        let report = ctx.report(JobStatus::Completed);
        tracing::info!(
            "Scoring job completed successfully in {:.2}s",
            report.duration_secs
        );
        tracing::info!("Processed {} leads", report.leads_processed);
        RunOutcome::Completed(report)
    }
}

/// Insert the `running` record for the run and remember its id.
///
/// The record's start time is taken here, after connecting and locking, and
/// also stored in `ctx.started_at`.
///
/// # Arguments
///
/// * `store` - Open store.
/// * `ctx` - Run context; receives the job id and start time.
///
/// # Returns
///
/// * `Ok(JobId)` - Id of the inserted record.
/// * `Err(JobError)` - The insert failed and was rolled back.
pub async fn create_job_record<S: JobStore + ?Sized>(
    store: &S,
    ctx: &mut RunContext,
) -> Result<JobId, JobError> {
    ctx.started_at = Utc::now();
    let job_id = store.create_job(ctx.job_date, ctx.started_at).await?;
    ctx.job_id = Some(job_id);
    ctx.transition(RunState::RecordCreated);
    tracing::info!("Created scoring job record with ID: {}", job_id);
    Ok(job_id)
}

/// Score every lead, newest first. Unusable leads are logged and skipped;
/// a store-level fault stops the batch and is returned with the partial
/// count left in `ctx`.
///
/// # Arguments
///
/// * `store` - Source of the lead stream.
/// * `config` - Scoring parameters for this run.
/// * `ctx` - Run context; `leads_processed` and `leads_skipped` are updated in place.
///
/// # Returns
///
/// * `Ok(())` - The stream was exhausted.
/// * `Err(JobError)` - A store-level fault ended the batch early.
pub async fn score_leads<S: JobStore + ?Sized>(
    store: &S,
    config: &ScoringConfig,
    ctx: &mut RunContext,
) -> Result<(), JobError> {
    ctx.transition(RunState::Scoring);
    let job_label = ctx
        .job_id
        .map(|id| id.to_string())
        .unwrap_or_else(|| "-".to_string());

    let mut leads = store.leads();
    while let Some(item) = leads.next().await {
        match item {
            Ok(lead) => {
                let score = scoring::score(&lead, AUDIT_SCORE_UNAVAILABLE, config);
                tracing::info!("Lead {}: scored {} points", lead.label(), score);

                ctx.leads_processed += 1;
                if ctx.leads_processed % PROGRESS_LOG_INTERVAL == 0 {
                    tracing::info!("Processed {} leads...", ctx.leads_processed);
                }
            }
            Err(e) if e.is_lead_fault() => {
                ctx.leads_skipped += 1;
                tracing::error!("Error scoring lead in job {}: {}", job_label, e);
            }
            Err(e) => {
                return Err::<(), _>(e).with_context(|| {
                    format!(
                        "scoring stopped after {} leads in job {}",
                        ctx.leads_processed, job_label
                    )
                });
            }
        }
    }

    tracing::info!(
        "Successfully processed scores for {} leads ({} skipped)",
        ctx.leads_processed,
        ctx.leads_skipped
    );
    Ok(())
}

/// Delete job records older than `retention_days` before `job_date`.
///
/// # Returns
///
/// * `Result<u64, JobError>` - Number of records deleted. A record exactly
///   `retention_days` old is kept.
pub async fn cleanup_expired_jobs<S: JobStore + ?Sized>(
    store: &S,
    job_date: NaiveDate,
    retention_days: u64,
) -> Result<u64, JobError> {
    let cutoff = job_date
        .checked_sub_days(Days::new(retention_days))
        .unwrap_or(NaiveDate::MIN);
    store.delete_jobs_before(cutoff).await
}

/// Write the final status. A failure here is logged and does not change the
/// run's outcome.
pub async fn finalize<S: JobStore + ?Sized>(store: &S, ctx: &mut RunContext, status: JobStatus) {
    ctx.transition(RunState::Finalized(status));
    let Some(job_id) = ctx.job_id else {
        return;
    };

    match store
        .finalize_job(job_id, status, ctx.leads_processed, Utc::now())
        .await
    {
        Ok(()) => tracing::info!("Job {} marked as {}", job_id, status),
        Err(e) => tracing::error!(
            "Error updating job status for job {} ({}): {}",
            job_id,
            ctx.job_date,
            e
        ),
    }
}
