//! PostgreSQL-backed [`JobStore`].
//!
//! Expects the tables described in `schema.sql`: `scoring_jobs`, `config`
//! and `raw_leads`.

use super::{JobStore, LeadStream};
use crate::errors::{JobError, ResultExt};
use crate::models::{ConfigRow, JobId, JobRecord, JobStatus, Lead};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use futures_util::StreamExt;
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool, Row};
use std::time::Duration;

const JOB_COLUMNS: &str =
    "id::bigint AS id, job_date, status, leads_processed::bigint AS leads_processed, start_time, end_time";

const LEADS_QUERY: &str = r#"
    SELECT id::bigint AS id, email, company, website, correlation_id::text AS correlation_id
    FROM raw_leads
    ORDER BY created_at DESC
"#;

#[derive(Debug, FromRow)]
struct JobRow {
    id: i64,
    job_date: NaiveDate,
    status: String,
    leads_processed: Option<i64>,
    start_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
}

impl TryFrom<JobRow> for JobRecord {
    type Error = JobError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let status = row.status.parse::<JobStatus>().map_err(|e| {
            JobError::StoreError(format!("scoring job {} has {}", row.id, e))
        })?;
        Ok(JobRecord {
            id: row.id,
            job_date: row.job_date,
            status,
            leads_processed: row.leads_processed.unwrap_or(0),
            start_time: row.start_time,
            end_time: row.end_time,
        })
    }
}

/// Job store over a single pooled PostgreSQL connection.
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    /// Open one connection to `database_url` and verify it answers.
    pub async fn connect(database_url: &str) -> Result<Self, JobError> {
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(30))
            .connect(database_url)
            .await?;

        sqlx::query("SELECT 1").execute(&pool).await?;

        Ok(Self { pool })
    }

    async fn find_job_with_status(
        &self,
        job_date: NaiveDate,
        status: JobStatus,
        order_by: &str,
    ) -> Result<Option<JobRecord>, JobError> {
        let sql = format!(
            "SELECT {} FROM scoring_jobs WHERE job_date = $1 AND status = $2 ORDER BY {} DESC LIMIT 1",
            JOB_COLUMNS, order_by
        );
        let row: Option<JobRow> = sqlx::query_as(&sql)
            .bind(job_date)
            .bind(status.as_str())
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("looking up {} job for {}", status, job_date))?;

        row.map(JobRecord::try_from).transpose()
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn reclaim_stale_jobs(
        &self,
        job_date: NaiveDate,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, JobError> {
        let result = sqlx::query(
            r#"
            UPDATE scoring_jobs
            SET status = 'failed'
            WHERE job_date = $1
              AND status = 'running'
              AND start_time < $2
            "#,
        )
        .bind(job_date)
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .context("reclaiming stale scoring jobs")?;

        Ok(result.rows_affected())
    }

    async fn find_running_job(&self, job_date: NaiveDate) -> Result<Option<JobRecord>, JobError> {
        self.find_job_with_status(job_date, JobStatus::Running, "start_time")
            .await
    }

    async fn find_completed_job(
        &self,
        job_date: NaiveDate,
    ) -> Result<Option<JobRecord>, JobError> {
        self.find_job_with_status(job_date, JobStatus::Completed, "end_time")
            .await
    }

    async fn create_job(
        &self,
        job_date: NaiveDate,
        start_time: DateTime<Utc>,
    ) -> Result<JobId, JobError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("starting job record transaction")?;

        // Dropping `tx` without commit rolls the insert back
        let job_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO scoring_jobs (job_date, status, leads_processed, start_time)
            VALUES ($1, 'running', 0, $2)
            RETURNING id::bigint
            "#,
        )
        .bind(job_date)
        .bind(start_time)
        .fetch_one(&mut *tx)
        .await
        .context("inserting scoring job record")?;

        tx.commit().await.context("committing scoring job record")?;

        Ok(job_id)
    }

    async fn finalize_job(
        &self,
        job_id: JobId,
        status: JobStatus,
        leads_processed: i64,
        end_time: DateTime<Utc>,
    ) -> Result<(), JobError> {
        let result = sqlx::query(
            r#"
            UPDATE scoring_jobs
            SET status = $1, leads_processed = $2, end_time = $3
            WHERE id = $4
            "#,
        )
        .bind(status.as_str())
        .bind(leads_processed)
        .bind(end_time)
        .bind(job_id)
        .execute(&self.pool)
        .await
        .with_context(|| format!("finalizing scoring job {}", job_id))?;

        if result.rows_affected() == 0 {
            return Err(JobError::StoreError(format!(
                "scoring job {} no longer exists",
                job_id
            )));
        }
        Ok(())
    }

    async fn config_rows(&self, prefix: &str) -> Result<Vec<ConfigRow>, JobError> {
        let rows: Vec<ConfigRow> = sqlx::query_as(
            "SELECT key, value::text AS value FROM config WHERE left(key, length($1)) = $1",
        )
        .bind(prefix)
        .fetch_all(&self.pool)
        .await
        .context("reading scoring config")?;

        Ok(rows)
    }

    fn leads(&self) -> LeadStream<'_> {
        sqlx::query(LEADS_QUERY)
            .fetch(&self.pool)
            .map(|row| match row {
                Ok(row) => Lead::from_row(&row).map_err(|e| JobError::LeadFault {
                    lead_id: row.try_get::<i64, _>("id").ok(),
                    reason: e.to_string(),
                }),
                Err(e) => Err::<Lead, _>(e).context("reading leads"),
            })
            .boxed()
    }

    async fn delete_jobs_before(&self, cutoff: NaiveDate) -> Result<u64, JobError> {
        let result = sqlx::query("DELETE FROM scoring_jobs WHERE job_date < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .context("deleting expired scoring jobs")?;

        Ok(result.rows_affected())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
