use chrono::{DateTime, NaiveDate, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use super::{FetchPage, SourceClient};
use crate::config::SourceConfig;
use crate::error::SourceError;
use crate::models::{Credential, DocumentType, NewDocument};

/// Client for a municipal NFS-e REST API authenticated by bearer token.
pub struct HttpSourceClient {
    client: Client,
    base_url: String,
    environment: String,
}

#[derive(Deserialize)]
struct PageResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    documents: Vec<Value>,
}

impl HttpSourceClient {
    pub fn new(config: &SourceConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            environment: config.environment.clone(),
        }
    }
}

#[async_trait::async_trait]
impl SourceClient for HttpSourceClient {
    async fn fetch_page(
        &self,
        credential: &Credential,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        page: u32,
    ) -> Result<FetchPage, SourceError> {
        let token = credential
            .token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or(SourceError::MissingToken {
                credential_id: credential.id,
            })?;

        let url = format!("{}/nfse", self.base_url);
        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .query(&[
                ("data_inicial", start.format("%Y-%m-%d").to_string()),
                ("data_final", end.format("%Y-%m-%d").to_string()),
                ("pagina", page.to_string()),
                ("ambiente", self.environment.clone()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let body: PageResponse = response
            .json()
            .await
            .map_err(|e| SourceError::Decode(e.to_string()))?;

        let documents = body
            .documents
            .into_iter()
            .filter_map(|raw| match convert_document(raw) {
                Ok(doc) => Some(doc),
                Err(e) => {
                    tracing::warn!(credential_id = credential.id, page, "Skipping document: {e}");
                    None
                }
            })
            .collect();

        Ok(FetchPage {
            success: body.success,
            message: body.message,
            documents,
        })
    }
}

/// Pull `number` and `issue_date` out of a raw document; everything else is metadata.
fn convert_document(mut raw: Value) -> Result<NewDocument, SourceError> {
    let obj = raw
        .as_object_mut()
        .ok_or_else(|| SourceError::Decode("document is not an object".into()))?;

    let number = match obj.remove("number") {
        Some(Value::String(s)) if !s.is_empty() => s,
        Some(Value::Number(n)) => n.to_string(),
        _ => return Err(SourceError::Decode("document without number".into())),
    };
    let issue_date = match obj.remove("issue_date") {
        Some(Value::String(s)) => parse_issue_date(&s)
            .ok_or_else(|| SourceError::Decode(format!("bad issue_date '{s}' on {number}")))?,
        _ => return Err(SourceError::Decode(format!("document {number} without issue_date"))),
    };

    Ok(NewDocument {
        doc_type: DocumentType::Nfse,
        number,
        issue_date,
        metadata: raw,
    })
}

fn parse_issue_date(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}
