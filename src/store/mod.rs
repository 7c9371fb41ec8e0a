//! Narrow interface to the relational store holding job records, scoring
//! parameters and leads.

pub mod postgres;

use crate::errors::JobError;
use crate::models::{ConfigRow, JobId, JobRecord, JobStatus, Lead};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use futures_util::stream::BoxStream;

pub use postgres::PgJobStore;

/// Stream of leads, most recently created first.
///
/// An item carrying [`JobError::LeadFault`] concerns one lead only and the
/// stream may continue after it. Any other error is a store-level fault.
pub type LeadStream<'a> = BoxStream<'a, Result<Lead, JobError>>;

/// Queries and commands the scoring job needs. Every write commits on its own.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Mark `running` records for `job_date` started before `cutoff` as
    /// `failed`.
    ///
    /// # Arguments
    ///
    /// * `job_date` - Day whose records are checked; other days are untouched.
    /// * `cutoff` - Records started strictly before this instant are stale.
    ///
    /// # Returns
    ///
    /// * `Result<u64, JobError>` - Number of records changed.
    async fn reclaim_stale_jobs(
        &self,
        job_date: NaiveDate,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, JobError>;

    /// Most recently started `running` record for `job_date`.
    async fn find_running_job(&self, job_date: NaiveDate) -> Result<Option<JobRecord>, JobError>;

    /// Most recently finished `completed` record for `job_date`.
    async fn find_completed_job(&self, job_date: NaiveDate)
        -> Result<Option<JobRecord>, JobError>;

    /// Insert a `running` record with zero leads processed.
    ///
    /// # Arguments
    ///
    /// * `job_date` - Day the run is for.
    /// * `start_time` - When the run started.
    ///
    /// # Returns
    ///
    /// * `Ok(JobId)` - Id of the new record.
    /// * `Err(JobError)` - Nothing was persisted.
    async fn create_job(
        &self,
        job_date: NaiveDate,
        start_time: DateTime<Utc>,
    ) -> Result<JobId, JobError>;

    /// Record the final status, processed count and end time of a run.
    ///
    /// # Returns
    ///
    /// * `Err(JobError)` - The write failed or `job_id` does not exist.
    async fn finalize_job(
        &self,
        job_id: JobId,
        status: JobStatus,
        leads_processed: i64,
        end_time: DateTime<Utc>,
    ) -> Result<(), JobError>;

    /// `config` rows whose key starts with `prefix`.
    ///
    /// # Arguments
    ///
    /// * `prefix` - Matched literally; `_` and `%` are not wildcards.
    async fn config_rows(&self, prefix: &str) -> Result<Vec<ConfigRow>, JobError>;

    /// All leads, newest first.
    fn leads(&self) -> LeadStream<'_>;

    /// Delete job records whose `job_date` is before `cutoff`, for every day.
    ///
    /// # Returns
    ///
    /// * `Result<u64, JobError>` - Number of records deleted.
    async fn delete_jobs_before(&self, cutoff: NaiveDate) -> Result<u64, JobError>;

    /// Release the underlying connection.
    async fn close(&self);
}

#[async_trait]
impl<T: JobStore + ?Sized> JobStore for std::sync::Arc<T> {
    async fn reclaim_stale_jobs(
        &self,
        job_date: NaiveDate,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, JobError> {
        (**self).reclaim_stale_jobs(job_date, cutoff).await
    }

    async fn find_running_job(&self, job_date: NaiveDate) -> Result<Option<JobRecord>, JobError> {
        (**self).find_running_job(job_date).await
    }

    async fn find_completed_job(
        &self,
        job_date: NaiveDate,
    ) -> Result<Option<JobRecord>, JobError> {
        (**self).find_completed_job(job_date).await
    }

    async fn create_job(
        &self,
        job_date: NaiveDate,
        start_time: DateTime<Utc>,
    ) -> Result<JobId, JobError> {
        (**self).create_job(job_date, start_time).await
    }

    async fn finalize_job(
        &self,
        job_id: JobId,
        status: JobStatus,
        leads_processed: i64,
        end_time: DateTime<Utc>,
    ) -> Result<(), JobError> {
        (**self)
            .finalize_job(job_id, status, leads_processed, end_time)
            .await
    }

    async fn config_rows(&self, prefix: &str) -> Result<Vec<ConfigRow>, JobError> {
        (**self).config_rows(prefix).await
    }

    fn leads(&self) -> LeadStream<'_> {
        (**self).leads()
    }

    async fn delete_jobs_before(&self, cutoff: NaiveDate) -> Result<u64, JobError> {
        (**self).delete_jobs_before(cutoff).await
    }

    async fn close(&self) {
        (**self).close().await
    }
}
