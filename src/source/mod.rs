pub mod http;

use chrono::{DateTime, Utc};

use crate::error::SourceError;
use crate::models::{Credential, NewDocument};

/// Maximum documents the NFS-e API returns per page. A shorter page is the last one.
pub const PAGE_SIZE: usize = 100;

/// One page of results from the source.
#[derive(Debug, Clone, Default)]
pub struct FetchPage {
    /// API-level outcome; `false` means the request was understood but refused.
    pub success: bool,
    pub message: Option<String>,
    pub documents: Vec<NewDocument>,
}

#[async_trait::async_trait]
pub trait SourceClient: Send + Sync {
    async fn fetch_page(
        &self,
        credential: &Credential,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        page: u32,
    ) -> Result<FetchPage, SourceError>;
}
