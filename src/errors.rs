use std::fmt;

/// Job-specific error types.
#[derive(Debug)]
pub enum JobError {
    /// Database-related errors.
    DatabaseError(sqlx::Error),
    /// Store fault not originating from sqlx (e.g. an alternate backend).
    StoreError(String),
    /// The store could not be reached within the retry budget.
    ConnectionFailed {
        /// Number of attempts made.
        attempts: u32,
        /// Error reported by the last attempt.
        last_error: String,
    },
    /// A single lead row could not be turned into a scorable lead.
    LeadFault {
        /// Lead id, when it could be read from the row.
        lead_id: Option<i64>,
        /// What went wrong.
        reason: String,
    },
    /// Error with context chain for better debugging.
    WithContext {
        /// The underlying source of the error.
        source: Box<JobError>,
        /// Additional context message.
        context: String,
    },
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobError::DatabaseError(e) => write!(f, "Database error: {}", e),
            JobError::StoreError(msg) => write!(f, "Store error: {}", msg),
            JobError::ConnectionFailed {
                attempts,
                last_error,
            } => write!(
                f,
                "Could not connect after {} attempts: {}",
                attempts, last_error
            ),
            JobError::LeadFault { lead_id, reason } => match lead_id {
                Some(id) => write!(f, "Lead {} is unusable: {}", id, reason),
                None => write!(f, "Lead row is unusable: {}", reason),
            },
            JobError::WithContext { source, context } => {
                write!(f, "{}: {}", context, source)
            }
        }
    }
}

impl std::error::Error for JobError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            JobError::DatabaseError(e) => Some(e),
            JobError::WithContext { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl JobError {
    /// True when the error concerns a single lead rather than the store.
    pub fn is_lead_fault(&self) -> bool {
        match self {
            JobError::LeadFault { .. } => true,
            JobError::WithContext { source, .. } => source.is_lead_fault(),
            _ => false,
        }
    }
}

impl From<sqlx::Error> for JobError {
    /// Converts a `sqlx::Error` into a `JobError`.
    fn from(err: sqlx::Error) -> Self {
        JobError::DatabaseError(err)
    }
}

/// Extension trait for adding context to errors.
/// Similar to `anyhow::Context` but for our `JobError` type.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, context: impl Into<String>) -> Result<T, JobError>;

    /// Add context lazily (only evaluated on error).
    fn with_context<F>(self, f: F) -> Result<T, JobError>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T, JobError> {
    fn context(self, context: impl Into<String>) -> Result<T, JobError> {
        self.map_err(|e| JobError::WithContext {
            source: Box::new(e),
            context: context.into(),
        })
    }

    fn with_context<F>(self, f: F) -> Result<T, JobError>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| JobError::WithContext {
            source: Box::new(e),
            context: f(),
        })
    }
}

/// Extension for sqlx::Error to add context
impl<T> ResultExt<T> for Result<T, sqlx::Error> {
    fn context(self, context: impl Into<String>) -> Result<T, JobError> {
        self.map_err(|e| JobError::WithContext {
            source: Box::new(JobError::DatabaseError(e)),
            context: context.into(),
        })
    }

    fn with_context<F>(self, f: F) -> Result<T, JobError>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| JobError::WithContext {
            source: Box::new(JobError::DatabaseError(e)),
            context: f(),
        })
    }
}
