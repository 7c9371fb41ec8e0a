use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

// ============ Database Models ============

/// Identifier assigned by the store to a scoring job record.
pub type JobId = i64;

/// Lifecycle status of a scoring job record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    /// Text representation persisted in the `status` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status '{}'", other)),
        }
    }
}

/// One day's scoring run, as persisted in `scoring_jobs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    /// Identifier assigned by the store.
    pub id: JobId,
    /// Calendar date the run covers.
    pub job_date: NaiveDate,
    /// Current lifecycle status.
    pub status: JobStatus,
    /// Number of leads scored, written when the run is finalized.
    pub leads_processed: i64,
    /// When the run started.
    pub start_time: DateTime<Utc>,
    /// When the run was finalized. Absent while running.
    pub end_time: Option<DateTime<Utc>>,
}

/// A lead as read from `raw_leads`. Owned by the ingestion pipeline and never
/// written by this job.
#[derive(Debug, Clone, Default, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Lead {
    pub id: i64,
    pub email: Option<String>,
    pub company: Option<String>,
    pub website: Option<String>,
    pub correlation_id: Option<String>,
}

impl Lead {
    /// Label used in log lines: the email when known, otherwise the id.
    pub fn label(&self) -> String {
        match self.email.as_deref() {
            Some(email) if !email.is_empty() => email.to_string(),
            _ => format!("#{}", self.id),
        }
    }
}

/// A raw key/value row from the `config` table.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct ConfigRow {
    pub key: String,
    pub value: Option<String>,
}

impl ConfigRow {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: Some(value.into()),
        }
    }
}
