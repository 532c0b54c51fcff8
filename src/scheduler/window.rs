use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use crate::models::DocumentType;
use crate::store::{DocumentOrder, Store};

/// Start of the next fetch window for `tenant_id` ending at `end`.
///
/// Resumes one day before the newest stored NFS-e, but never reaches further
/// back than `fetch_days_back` days and never past `end`. A store error is
/// treated the same as "no documents yet".
pub async fn compute_start_date(
    store: &dyn Store,
    tenant_id: i64,
    end: DateTime<Utc>,
    fetch_days_back: u32,
) -> DateTime<Utc> {
    let fallback = end
        .checked_sub_signed(Duration::days(i64::from(fetch_days_back)))
        .unwrap_or(DateTime::<Utc>::MIN_UTC);

    let latest = match store
        .most_recent_document(tenant_id, DocumentType::Nfse, DocumentOrder::IssueDate)
        .await
    {
        Ok(Some(doc)) => doc,
        Ok(None) => {
            info!(
                tenant_id,
                start = %fallback.format("%Y-%m-%d"),
                "No existing documents, using default date range"
            );
            return fallback;
        }
        Err(e) => {
            tracing::error!(tenant_id, "Failed to load latest document, using default range: {e}");
            return fallback;
        }
    };

    // One day of overlap picks up documents issued late on the same day.
    let start = latest
        .issue_date
        .checked_sub_signed(Duration::days(1))
        .unwrap_or(fallback)
        .clamp(fallback, end);

    debug!(
        tenant_id,
        latest_doc_date = %latest.issue_date.format("%Y-%m-%d"),
        latest_doc_number = %latest.number,
        optimized_start = %start.format("%Y-%m-%d"),
        default_start = %fallback.format("%Y-%m-%d"),
        days_saved = (start - fallback).num_days(),
        "Calculated optimized start date"
    );
    start
}
