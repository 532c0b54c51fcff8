use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An onboarded company whose NFS-e documents are ingested.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: i64,
    pub name: String,
    /// CNPJ registration number.
    pub registration_number: String,
    pub active: bool,
    pub auto_fetch: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialType {
    PrefeituraToken,
    PrefeituraUserPass,
    PrefeituraMixed,
}

impl CredentialType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialType::PrefeituraToken => "prefeitura_token",
            CredentialType::PrefeituraUserPass => "prefeitura_user_pass",
            CredentialType::PrefeituraMixed => "prefeitura_mixed",
        }
    }
}

impl std::fmt::Display for CredentialType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Access to one tenant's municipal NFS-e API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    pub id: i64,
    pub tenant_id: i64,
    pub kind: CredentialType,
    pub name: String,
    #[serde(default, skip_serializing)]
    pub token: Option<String>,
    pub active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Nfse,
    Nfe,
    Cte,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Nfse => "nfse",
            DocumentType::Nfe => "nfe",
            DocumentType::Cte => "cte",
        }
    }
}

impl std::str::FromStr for DocumentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "nfse" => Ok(DocumentType::Nfse),
            "nfe" => Ok(DocumentType::Nfe),
            "cte" => Ok(DocumentType::Cte),
            other => Err(format!("unknown document type: {other}")),
        }
    }
}

/// A document as returned by the source, before it is stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDocument {
    pub doc_type: DocumentType,
    /// Source-assigned number; unique per tenant and type.
    pub number: String,
    pub issue_date: DateTime<Utc>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// A stored document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: i64,
    pub tenant_id: i64,
    pub doc_type: DocumentType,
    pub number: String,
    pub issue_date: DateTime<Utc>,
    /// When the row was ingested.
    pub created_at: DateTime<Utc>,
    pub metadata: serde_json::Value,
}

/// Inclusive `[start, end]` range queried from the source in one pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl FetchWindow {
    /// Window length in whole days, truncated.
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_hours() / 24
    }
}
