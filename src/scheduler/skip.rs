use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use crate::models::{DocumentType, FetchWindow};
use crate::store::{DocumentOrder, Store};

/// Windows shorter than this are always fetched.
const MIN_SKIP_WINDOW_DAYS: i64 = 7;
/// Span before `end` that must already hold documents.
const RECENT_DAYS: i64 = 3;
/// Only windows longer than this consult the last fetch time.
const LARGE_WINDOW_DAYS: i64 = 30;
/// How fresh the last ingestion must be to skip.
const RECENT_FETCH_MINUTES: i64 = 60;

/// Decide whether the source call for `window` can be skipped.
///
/// Any store error answers "fetch".
pub async fn should_skip(
    store: &dyn Store,
    tenant_id: i64,
    window: FetchWindow,
    now: DateTime<Utc>,
) -> bool {
    let days = window.days();
    if days < MIN_SKIP_WINDOW_DAYS {
        return false;
    }

    let recent_threshold = window.end - Duration::days(RECENT_DAYS);
    let recent = match store
        .count_documents(tenant_id, DocumentType::Nfse, recent_threshold, window.end)
        .await
    {
        Ok(n) => n,
        Err(e) => {
            debug!(tenant_id, "Recent document count failed, not skipping: {e}");
            return false;
        }
    };

    if recent == 0 || days <= LARGE_WINDOW_DAYS {
        return false;
    }

    info!(
        tenant_id,
        recent_doc_count = recent,
        days_diff = days,
        recent_threshold = %recent_threshold.format("%Y-%m-%d"),
        "Recent documents found, considering skip"
    );

    let last_fetch = match store
        .most_recent_document(tenant_id, DocumentType::Nfse, DocumentOrder::CreatedAt)
        .await
    {
        Ok(Some(doc)) => doc.created_at,
        Ok(None) => return false,
        Err(e) => {
            debug!(tenant_id, "Last fetch lookup failed, not skipping: {e}");
            return false;
        }
    };

    let since = now - last_fetch;
    if since < Duration::minutes(RECENT_FETCH_MINUTES) {
        info!(
            tenant_id,
            last_fetch = %last_fetch.format("%Y-%m-%d %H:%M:%S"),
            minutes_since = since.num_minutes(),
            "Recent fetch detected, skipping"
        );
        return true;
    }
    false
}
