//! In-memory fakes for the store and source, with call recording and failure injection.

use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{DateTime, Duration, Utc};

use crate::error::{SourceError, StoreError};
use crate::models::{Credential, CredentialType, Document, DocumentType, NewDocument, Tenant};
use crate::source::{FetchPage, SourceClient};
use crate::store::{DocumentOrder, Result, Store};

pub fn tenant(id: i64) -> Tenant {
    Tenant {
        id,
        name: format!("Tenant {id}"),
        registration_number: format!("{id:014}"),
        active: true,
        auto_fetch: true,
    }
}

pub fn token_credential(id: i64, tenant_id: i64) -> Credential {
    Credential {
        id,
        tenant_id,
        kind: CredentialType::PrefeituraToken,
        name: format!("token {id}"),
        token: Some(format!("tok-{id}")),
        active: true,
    }
}

pub fn nfse_doc(
    tenant_id: i64,
    number: &str,
    issue_date: DateTime<Utc>,
    created_at: DateTime<Utc>,
) -> Document {
    Document {
        id: 0,
        tenant_id,
        doc_type: DocumentType::Nfse,
        number: number.to_string(),
        issue_date,
        created_at,
        metadata: serde_json::Value::Null,
    }
}

fn injected() -> StoreError {
    StoreError::Malformed {
        column: "injected",
        value: "failure".into(),
    }
}

#[derive(Default)]
pub struct FakeStore {
    tenants: Vec<Tenant>,
    credentials: Vec<Credential>,
    documents: Mutex<Vec<Document>>,
    fail_reads: bool,
    fail_issue_lookup: bool,
    fail_credentials: bool,
    fail_tenant_list: bool,
    fail_insert_on: HashSet<usize>,
    tenant_list_calls: AtomicUsize,
    count_calls: AtomicUsize,
    insert_calls: AtomicUsize,
}

impl FakeStore {
    pub fn with_tenant(mut self, tenant: Tenant) -> Self {
        self.tenants.push(tenant);
        self
    }

    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.credentials.push(credential);
        self
    }

    pub fn with_document(self, doc: Document) -> Self {
        self.documents.lock().unwrap().push(doc);
        self
    }

    /// Document lookups and counts return errors.
    pub fn failing_reads(mut self) -> Self {
        self.fail_reads = true;
        self
    }

    /// Only the latest-by-issue-date lookup fails.
    pub fn failing_issue_lookup(mut self) -> Self {
        self.fail_issue_lookup = true;
        self
    }

    pub fn failing_credentials(mut self) -> Self {
        self.fail_credentials = true;
        self
    }

    pub fn failing_tenant_list(mut self) -> Self {
        self.fail_tenant_list = true;
        self
    }

    /// The `n`-th call to `insert_documents` (1-based) fails.
    pub fn failing_insert_on(mut self, n: usize) -> Self {
        self.fail_insert_on.insert(n);
        self
    }

    pub fn tenant_list_calls(&self) -> usize {
        self.tenant_list_calls.load(Ordering::SeqCst)
    }

    pub fn count_calls(&self) -> usize {
        self.count_calls.load(Ordering::SeqCst)
    }

    pub fn insert_calls(&self) -> usize {
        self.insert_calls.load(Ordering::SeqCst)
    }

    pub fn stored_numbers(&self, tenant_id: i64) -> Vec<String> {
        self.documents
            .lock()
            .unwrap()
            .iter()
            .filter(|d| d.tenant_id == tenant_id)
            .map(|d| d.number.clone())
            .collect()
    }
}

#[async_trait::async_trait]
impl Store for FakeStore {
    async fn list_eligible_tenants(&self) -> Result<Vec<Tenant>> {
        self.tenant_list_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_tenant_list {
            return Err(injected());
        }
        Ok(self
            .tenants
            .iter()
            .filter(|t| t.active && t.auto_fetch)
            .cloned()
            .collect())
    }

    async fn active_tenant(&self, tenant_id: i64) -> Result<Option<Tenant>> {
        Ok(self
            .tenants
            .iter()
            .find(|t| t.id == tenant_id && t.active)
            .cloned())
    }

    async fn list_active_credentials(
        &self,
        tenant_id: i64,
        kind: CredentialType,
    ) -> Result<Vec<Credential>> {
        if self.fail_credentials {
            return Err(injected());
        }
        Ok(self
            .credentials
            .iter()
            .filter(|c| c.tenant_id == tenant_id && c.kind == kind && c.active)
            .cloned()
            .collect())
    }

    async fn most_recent_document(
        &self,
        tenant_id: i64,
        doc_type: DocumentType,
        order: DocumentOrder,
    ) -> Result<Option<Document>> {
        if self.fail_reads || (self.fail_issue_lookup && order == DocumentOrder::IssueDate) {
            return Err(injected());
        }
        let docs = self.documents.lock().unwrap();
        let candidates = docs
            .iter()
            .filter(|d| d.tenant_id == tenant_id && d.doc_type == doc_type);
        let latest = match order {
            DocumentOrder::IssueDate => candidates.max_by_key(|d| d.issue_date),
            DocumentOrder::CreatedAt => candidates.max_by_key(|d| d.created_at),
        };
        Ok(latest.cloned())
    }

    async fn count_documents(
        &self,
        tenant_id: i64,
        doc_type: DocumentType,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<u64> {
        self.count_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads {
            return Err(injected());
        }
        let docs = self.documents.lock().unwrap();
        Ok(docs
            .iter()
            .filter(|d| {
                d.tenant_id == tenant_id
                    && d.doc_type == doc_type
                    && d.issue_date >= from
                    && d.issue_date <= to
            })
            .count() as u64)
    }

    async fn insert_documents(&self, tenant_id: i64, documents: &[NewDocument]) -> Result<()> {
        let call = self.insert_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_insert_on.contains(&call) {
            return Err(injected());
        }
        let mut docs = self.documents.lock().unwrap();
        let now = Utc::now();
        for new in documents {
            let exists = docs.iter().any(|d| {
                d.tenant_id == tenant_id && d.doc_type == new.doc_type && d.number == new.number
            });
            if !exists {
                let id = docs.len() as i64 + 1;
                docs.push(Document {
                    id,
                    tenant_id,
                    doc_type: new.doc_type,
                    number: new.number.clone(),
                    issue_date: new.issue_date,
                    created_at: now,
                    metadata: new.metadata.clone(),
                });
            }
        }
        Ok(())
    }
}

/// What the fake source answers for one page.
#[derive(Debug, Clone, Copy)]
pub enum PageScript {
    Docs(usize),
    Unsuccessful,
    Error,
}

#[derive(Debug, Clone)]
pub struct SourceCall {
    pub credential_id: i64,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub page: u32,
}

/// Serves `pages[page - 1]`; pages beyond the script are empty.
#[derive(Default)]
pub struct FakeSource {
    pages: Vec<PageScript>,
    calls: Mutex<Vec<SourceCall>>,
}

impl FakeSource {
    pub fn with_pages(pages: Vec<PageScript>) -> Self {
        Self {
            pages,
            calls: Mutex::default(),
        }
    }

    pub fn calls(&self) -> Vec<SourceCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl SourceClient for FakeSource {
    async fn fetch_page(
        &self,
        credential: &Credential,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        page: u32,
    ) -> std::result::Result<FetchPage, SourceError> {
        self.calls.lock().unwrap().push(SourceCall {
            credential_id: credential.id,
            start,
            end,
            page,
        });
        let script = self
            .pages
            .get(page as usize - 1)
            .copied()
            .unwrap_or(PageScript::Docs(0));
        match script {
            PageScript::Docs(n) => Ok(FetchPage {
                success: true,
                message: None,
                documents: (0..n)
                    .map(|i| NewDocument {
                        doc_type: DocumentType::Nfse,
                        number: format!("{page}-{i}"),
                        issue_date: end - Duration::days(1),
                        metadata: serde_json::Value::Null,
                    })
                    .collect(),
            }),
            PageScript::Unsuccessful => Ok(FetchPage {
                success: false,
                message: Some("invalid token".into()),
                documents: vec![],
            }),
            PageScript::Error => Err(SourceError::Api {
                status: 502,
                body: "bad gateway".into(),
            }),
        }
    }
}
