use thiserror::Error;

/// Failures raised by the document store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store connection lock poisoned")]
    Poisoned,

    /// A stored row could not be mapped back into a model value.
    #[error("Malformed {column} value: {value}")]
    Malformed { column: &'static str, value: String },
}

/// Failures raised while fetching a page from the NFS-e source.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Source request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Source API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("Failed to decode source response: {0}")]
    Decode(String),

    #[error("Credential {credential_id} has no token")]
    MissingToken { credential_id: i64 },
}

/// Errors surfaced by the scheduler's public operations.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Invalid scheduler interval '{value}': {reason}")]
    InvalidInterval { value: String, reason: String },

    #[error("Invalid fetch_days_back {days}: must be at most {max}")]
    InvalidLookback { days: u32, max: u32 },

    #[error("Tenant not found or inactive: {id}")]
    TenantNotFound { id: i64 },

    #[error(transparent)]
    Store(#[from] StoreError),
}
