//! In-memory `JobStore` with fault injection for exercising the job lifecycle
//! without a database.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use futures_util::stream::{self, StreamExt};
use lead_scoring_job::errors::JobError;
use lead_scoring_job::models::{ConfigRow, JobId, JobRecord, JobStatus, Lead};
use lead_scoring_job::store::{JobStore, LeadStream};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

/// How a lead at a given position misbehaves when streamed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LeadFailure {
    /// The row cannot be decoded; only that lead is affected.
    BadRow,
    /// The connection drops; the stream ends with a store error.
    StoreDown,
}

#[derive(Default)]
struct State {
    jobs: Vec<JobRecord>,
    next_id: JobId,
    config: Vec<ConfigRow>,
    leads: Vec<Lead>,
    lead_failures: Vec<(usize, LeadFailure)>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    pub fail_reads: AtomicBool,
    pub fail_reclaim: AtomicBool,
    pub fail_create: AtomicBool,
    pub fail_finalize: AtomicBool,
    pub fail_cleanup: AtomicBool,
    pub fail_config: AtomicBool,
    pub closed: AtomicU32,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_leads(leads: Vec<Lead>) -> Self {
        let store = Self::new();
        store.state.lock().unwrap().leads = leads;
        store
    }

    pub fn insert_job(
        &self,
        job_date: NaiveDate,
        status: JobStatus,
        start_time: DateTime<Utc>,
    ) -> JobId {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = state.next_id;
        state.jobs.push(JobRecord {
            id,
            job_date,
            status,
            leads_processed: 0,
            start_time,
            end_time: (status != JobStatus::Running).then_some(start_time),
        });
        id
    }

    pub fn set_config(&self, rows: Vec<ConfigRow>) {
        self.state.lock().unwrap().config = rows;
    }

    /// Make the lead at zero-based `index` fail when streamed.
    pub fn fail_lead_at(&self, index: usize, failure: LeadFailure) {
        self.state.lock().unwrap().lead_failures.push((index, failure));
    }

    pub fn job(&self, id: JobId) -> Option<JobRecord> {
        self.state
            .lock()
            .unwrap()
            .jobs
            .iter()
            .find(|job| job.id == id)
            .cloned()
    }

    pub fn jobs(&self) -> Vec<JobRecord> {
        self.state.lock().unwrap().jobs.clone()
    }

    fn check(&self, flag: &AtomicBool, what: &str) -> Result<(), JobError> {
        if flag.load(Ordering::SeqCst) {
            return Err(JobError::StoreError(format!("{} failed", what)));
        }
        Ok(())
    }
}

pub fn lead(id: i64, email: &str, company: &str, website: &str) -> Lead {
    let opt = |s: &str| (!s.is_empty()).then(|| s.to_string());
    Lead {
        id,
        email: opt(email),
        company: opt(company),
        website: opt(website),
        correlation_id: Some(format!("corr-{}", id)),
    }
}

pub fn five_leads() -> Vec<Lead> {
    (1..=5)
        .map(|i| {
            lead(
                i,
                &format!("lead{}@example.com", i),
                "Acme",
                "https://acme.com",
            )
        })
        .collect()
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn reclaim_stale_jobs(
        &self,
        job_date: NaiveDate,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, JobError> {
        self.check(&self.fail_reclaim, "reclaim")?;
        let mut state = self.state.lock().unwrap();
        let mut changed = 0;
        for job in state.jobs.iter_mut() {
            if job.job_date == job_date
                && job.status == JobStatus::Running
                && job.start_time < cutoff
            {
                job.status = JobStatus::Failed;
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn find_running_job(&self, job_date: NaiveDate) -> Result<Option<JobRecord>, JobError> {
        self.check(&self.fail_reads, "read")?;
        let state = self.state.lock().unwrap();
        Ok(state
            .jobs
            .iter()
            .filter(|job| job.job_date == job_date && job.status == JobStatus::Running)
            .max_by_key(|job| job.start_time)
            .cloned())
    }

    async fn find_completed_job(
        &self,
        job_date: NaiveDate,
    ) -> Result<Option<JobRecord>, JobError> {
        self.check(&self.fail_reads, "read")?;
        let state = self.state.lock().unwrap();
        Ok(state
            .jobs
            .iter()
            .filter(|job| job.job_date == job_date && job.status == JobStatus::Completed)
            .max_by_key(|job| job.end_time)
            .cloned())
    }

    async fn create_job(
        &self,
        job_date: NaiveDate,
        start_time: DateTime<Utc>,
    ) -> Result<JobId, JobError> {
        self.check(&self.fail_create, "insert")?;
        Ok(self.insert_job(job_date, JobStatus::Running, start_time))
    }

    async fn finalize_job(
        &self,
        job_id: JobId,
        status: JobStatus,
        leads_processed: i64,
        end_time: DateTime<Utc>,
    ) -> Result<(), JobError> {
        self.check(&self.fail_finalize, "finalize")?;
        let mut state = self.state.lock().unwrap();
        let job = state
            .jobs
            .iter_mut()
            .find(|job| job.id == job_id)
            .ok_or_else(|| JobError::StoreError(format!("job {} missing", job_id)))?;
        job.status = status;
        job.leads_processed = leads_processed;
        job.end_time = Some(end_time);
        Ok(())
    }

    async fn config_rows(&self, prefix: &str) -> Result<Vec<ConfigRow>, JobError> {
        self.check(&self.fail_config, "config read")?;
        let state = self.state.lock().unwrap();
        Ok(state
            .config
            .iter()
            .filter(|row| row.key.starts_with(prefix))
            .cloned()
            .collect())
    }

    fn leads(&self) -> LeadStream<'_> {
        let state = self.state.lock().unwrap();
        let mut items = Vec::new();
        for (index, lead) in state.leads.iter().enumerate() {
            let failure = state
                .lead_failures
                .iter()
                .find(|(at, _)| *at == index)
                .map(|(_, failure)| *failure);
            match failure {
                None => items.push(Ok(lead.clone())),
                Some(LeadFailure::BadRow) => items.push(Err(JobError::LeadFault {
                    lead_id: Some(lead.id),
                    reason: "column \"company\" has an unexpected type".to_string(),
                })),
                Some(LeadFailure::StoreDown) => {
                    items.push(Err(JobError::StoreError("connection reset".to_string())));
                    break;
                }
            }
        }
        stream::iter(items).boxed()
    }

    async fn delete_jobs_before(&self, cutoff: NaiveDate) -> Result<u64, JobError> {
        self.check(&self.fail_cleanup, "delete")?;
        let mut state = self.state.lock().unwrap();
        let before = state.jobs.len();
        state.jobs.retain(|job| job.job_date >= cutoff);
        Ok((before - state.jobs.len()) as u64)
    }

    async fn close(&self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}
