pub mod sqlite;

use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::models::{Credential, CredentialType, Document, DocumentType, NewDocument, Tenant};

pub type Result<T> = std::result::Result<T, StoreError>;

/// Column used to pick the "most recent" document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentOrder {
    IssueDate,
    CreatedAt,
}

/// Persistence capability the scheduler relies on.
///
/// Implementations must tolerate concurrent use from the background worker
/// and manual fetches, and `insert_documents` must be idempotent on the
/// document's `(tenant, type, number)`.
#[async_trait::async_trait]
pub trait Store: Send + Sync {
    /// Tenants with `active = true AND auto_fetch = true`.
    async fn list_eligible_tenants(&self) -> Result<Vec<Tenant>>;

    async fn active_tenant(&self, tenant_id: i64) -> Result<Option<Tenant>>;

    /// Active credentials of one type, in stable store order.
    async fn list_active_credentials(
        &self,
        tenant_id: i64,
        kind: CredentialType,
    ) -> Result<Vec<Credential>>;

    async fn most_recent_document(
        &self,
        tenant_id: i64,
        doc_type: DocumentType,
        order: DocumentOrder,
    ) -> Result<Option<Document>>;

    /// Documents with `issue_date` in the inclusive range `[from, to]`.
    async fn count_documents(
        &self,
        tenant_id: i64,
        doc_type: DocumentType,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<u64>;

    async fn insert_documents(&self, tenant_id: i64, documents: &[NewDocument]) -> Result<()>;
}
