use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;

use super::{DocumentOrder, Result, Store};
use crate::error::StoreError;
use crate::models::{Credential, CredentialType, Document, DocumentType, NewDocument, Tenant};

/// SQLite-backed store. One connection shared behind a `Mutex`.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::from_connection(Connection::open(path)?)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }
}

/// Create tables and indexes. Safe to call on every startup.
fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA foreign_keys = ON;
        CREATE TABLE IF NOT EXISTS tenants (
            id                  INTEGER PRIMARY KEY,
            name                TEXT NOT NULL,
            registration_number TEXT NOT NULL UNIQUE,
            active              INTEGER NOT NULL DEFAULT 1,
            auto_fetch          INTEGER NOT NULL DEFAULT 0
        );
        CREATE TABLE IF NOT EXISTS credentials (
            id        INTEGER PRIMARY KEY,
            tenant_id INTEGER NOT NULL REFERENCES tenants(id),
            type      TEXT NOT NULL,
            name      TEXT NOT NULL,
            token     TEXT,
            active    INTEGER NOT NULL DEFAULT 1
        );
        CREATE TABLE IF NOT EXISTS documents (
            id         INTEGER PRIMARY KEY,
            tenant_id  INTEGER NOT NULL REFERENCES tenants(id),
            doc_type   TEXT NOT NULL,
            number     TEXT NOT NULL,
            issue_date TEXT NOT NULL,
            created_at TEXT NOT NULL,
            metadata   TEXT NOT NULL DEFAULT '{}',
            UNIQUE (tenant_id, doc_type, number)
        );
        CREATE INDEX IF NOT EXISTS idx_documents_issue
            ON documents(tenant_id, doc_type, issue_date DESC);
        CREATE INDEX IF NOT EXISTS idx_documents_created
            ON documents(tenant_id, doc_type, created_at DESC);",
    )?;
    Ok(())
}

/// RFC 3339, UTC, second precision: lexical order is chronological order.
fn ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn parse_ts(column: &'static str, value: String) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| StoreError::Malformed { column, value })
}

fn row_to_tenant(row: &rusqlite::Row<'_>) -> rusqlite::Result<Tenant> {
    Ok(Tenant {
        id: row.get(0)?,
        name: row.get(1)?,
        registration_number: row.get(2)?,
        active: row.get(3)?,
        auto_fetch: row.get(4)?,
    })
}

type DocumentRow = (i64, i64, String, String, String, String, String);

fn document_from_row(raw: DocumentRow) -> Result<Document> {
    let (id, tenant_id, doc_type, number, issue_date, created_at, metadata) = raw;
    let doc_type = doc_type.parse::<DocumentType>().map_err(|_| StoreError::Malformed {
        column: "doc_type",
        value: doc_type.clone(),
    })?;
    Ok(Document {
        id,
        tenant_id,
        doc_type,
        number,
        issue_date: parse_ts("issue_date", issue_date)?,
        created_at: parse_ts("created_at", created_at)?,
        metadata: serde_json::from_str(&metadata).map_err(|_| StoreError::Malformed {
            column: "metadata",
            value: metadata.clone(),
        })?,
    })
}

#[async_trait::async_trait]
impl Store for SqliteStore {
    async fn list_eligible_tenants(&self) -> Result<Vec<Tenant>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(
            "SELECT id, name, registration_number, active, auto_fetch
             FROM tenants WHERE active = 1 AND auto_fetch = 1 ORDER BY id",
        )?;
        let tenants = stmt
            .query_map([], row_to_tenant)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tenants)
    }

    async fn active_tenant(&self, tenant_id: i64) -> Result<Option<Tenant>> {
        let conn = self.lock()?;
        let tenant = conn
            .query_row(
                "SELECT id, name, registration_number, active, auto_fetch
                 FROM tenants WHERE id = ?1 AND active = 1",
                [tenant_id],
                row_to_tenant,
            )
            .optional()?;
        Ok(tenant)
    }

    async fn list_active_credentials(
        &self,
        tenant_id: i64,
        kind: CredentialType,
    ) -> Result<Vec<Credential>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(
            "SELECT id, tenant_id, name, token, active FROM credentials
             WHERE tenant_id = ?1 AND type = ?2 AND active = 1 ORDER BY id",
        )?;
        let credentials = stmt
            .query_map(params![tenant_id, kind.as_str()], |row| {
                Ok(Credential {
                    id: row.get(0)?,
                    tenant_id: row.get(1)?,
                    kind,
                    name: row.get(2)?,
                    token: row.get(3)?,
                    active: row.get(4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(credentials)
    }

    async fn most_recent_document(
        &self,
        tenant_id: i64,
        doc_type: DocumentType,
        order: DocumentOrder,
    ) -> Result<Option<Document>> {
        let sql = match order {
            DocumentOrder::IssueDate => {
                "SELECT id, tenant_id, doc_type, number, issue_date, created_at, metadata
                 FROM documents WHERE tenant_id = ?1 AND doc_type = ?2
                 ORDER BY issue_date DESC, id DESC LIMIT 1"
            }
            DocumentOrder::CreatedAt => {
                "SELECT id, tenant_id, doc_type, number, issue_date, created_at, metadata
                 FROM documents WHERE tenant_id = ?1 AND doc_type = ?2
                 ORDER BY created_at DESC, id DESC LIMIT 1"
            }
        };
        let raw: Option<DocumentRow> = {
            let conn = self.lock()?;
            conn.query_row(sql, params![tenant_id, doc_type.as_str()], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                ))
            })
            .optional()?
        };
        raw.map(document_from_row).transpose()
    }

    async fn count_documents(
        &self,
        tenant_id: i64,
        doc_type: DocumentType,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<u64> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM documents
             WHERE tenant_id = ?1 AND doc_type = ?2
               AND issue_date >= ?3 AND issue_date <= ?4",
            params![tenant_id, doc_type.as_str(), ts(from), ts(to)],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    async fn insert_documents(&self, tenant_id: i64, documents: &[NewDocument]) -> Result<()> {
        let mut conn = self.lock()?;
        let now = ts(Utc::now());
        let tx = conn.transaction()?;
        let mut inserted = 0usize;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR IGNORE INTO documents
                 (tenant_id, doc_type, number, issue_date, created_at, metadata)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for doc in documents {
                inserted += stmt.execute(params![
                    tenant_id,
                    doc.doc_type.as_str(),
                    doc.number,
                    ts(doc.issue_date),
                    now,
                    doc.metadata.to_string(),
                ])?;
            }
        }
        tx.commit()?;
        debug!(
            tenant_id,
            received = documents.len(),
            inserted,
            "documents persisted"
        );
        Ok(())
    }
}
