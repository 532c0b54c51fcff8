use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use super::skip::should_skip;
use super::window::compute_start_date;
use crate::config::SchedulerConfig;
use crate::models::{CredentialType, FetchWindow, Tenant};
use crate::source::{PAGE_SIZE, SourceClient};
use crate::store::Store;

/// Why a tenant finished without storing anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoDataReason {
    /// The computed window is empty.
    WindowCovered,
    RecentSync,
    EmptySource,
    /// Documents were returned but every page failed to persist.
    NothingPersisted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    NoCredentials,
    CredentialLookup,
    FirstPageFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum FetchStatus {
    Stored,
    NoNewData(NoDataReason),
    Failed(FailureReason),
}

/// Outcome of one tenant fetch.
#[derive(Debug, Clone, Serialize)]
pub struct TenantReport {
    pub tenant_id: i64,
    #[serde(flatten)]
    pub status: FetchStatus,
    pub documents_stored: usize,
    pub pages_fetched: u32,
    pub persist_failures: u32,
}

impl TenantReport {
    fn new(tenant_id: i64, status: FetchStatus) -> Self {
        Self {
            tenant_id,
            status,
            documents_stored: 0,
            pages_fetched: 0,
            persist_failures: 0,
        }
    }

    fn failed(tenant_id: i64, reason: FailureReason) -> Self {
        Self::new(tenant_id, FetchStatus::Failed(reason))
    }

    fn no_new_data(tenant_id: i64, reason: NoDataReason) -> Self {
        Self::new(tenant_id, FetchStatus::NoNewData(reason))
    }

    pub fn is_success(&self) -> bool {
        !matches!(self.status, FetchStatus::Failed(_))
    }
}

/// Runs the window, skip and pagination steps for one tenant.
pub struct TenantFetcher {
    store: Arc<dyn Store>,
    source: Arc<dyn SourceClient>,
    config: SchedulerConfig,
}

impl TenantFetcher {
    pub fn new(
        store: Arc<dyn Store>,
        source: Arc<dyn SourceClient>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            store,
            source,
            config,
        }
    }

    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    pub async fn fetch_tenant(&self, tenant: &Tenant) -> TenantReport {
        self.fetch_tenant_at(tenant, Utc::now()).await
    }

    pub(crate) async fn fetch_tenant_at(
        &self,
        tenant: &Tenant,
        now: DateTime<Utc>,
    ) -> TenantReport {
        info!(
            tenant_id = tenant.id,
            tenant_name = %tenant.name,
            registration_number = %tenant.registration_number,
            "Fetching NFS-e documents for tenant"
        );

        let credentials = match self
            .store
            .list_active_credentials(tenant.id, CredentialType::PrefeituraToken)
            .await
        {
            Ok(c) => c,
            Err(e) => {
                error!(tenant_id = tenant.id, "Failed to load tenant credentials: {e}");
                return TenantReport::failed(tenant.id, FailureReason::CredentialLookup);
            }
        };
        let Some(credential) = credentials.first() else {
            warn!(tenant_id = tenant.id, "No NFS-e token credentials for tenant");
            return TenantReport::failed(tenant.id, FailureReason::NoCredentials);
        };
        info!(
            tenant_id = tenant.id,
            credential_id = credential.id,
            credential_type = %credential.kind,
            credentials_count = credentials.len(),
            "Selected credential"
        );

        let end = now;
        let start =
            compute_start_date(self.store.as_ref(), tenant.id, end, self.config.fetch_days_back)
                .await;
        if start >= end {
            info!(tenant_id = tenant.id, "No new documents expected, window already covered");
            return TenantReport::no_new_data(tenant.id, NoDataReason::WindowCovered);
        }
        let window = FetchWindow { start, end };

        info!(
            tenant_id = tenant.id,
            start = %start.format("%Y-%m-%d"),
            end = %end.format("%Y-%m-%d"),
            config_days_back = self.config.fetch_days_back,
            calculated_days = window.days(),
            "Fetching documents for date range"
        );

        if should_skip(self.store.as_ref(), tenant.id, window, now).await {
            info!(tenant_id = tenant.id, "Skipping fetch, recent sync completed");
            return TenantReport::no_new_data(tenant.id, NoDataReason::RecentSync);
        }

        let mut report = TenantReport::no_new_data(tenant.id, NoDataReason::EmptySource);
        let mut received_any = false;

        for page in 1..=self.config.max_pages_per_run {
            let result = match self
                .source
                .fetch_page(credential, window.start, window.end, page)
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    error!(
                        tenant_id = tenant.id,
                        page,
                        credential_id = credential.id,
                        "Failed to fetch NFS-e documents: {e}"
                    );
                    if page == 1 {
                        report.status = FetchStatus::Failed(FailureReason::FirstPageFailed);
                    }
                    break;
                }
            };

            if !result.success {
                warn!(
                    tenant_id = tenant.id,
                    page,
                    message = result.message.as_deref().unwrap_or(""),
                    "NFS-e fetch was not successful"
                );
                if page == 1 {
                    report.status = FetchStatus::Failed(FailureReason::FirstPageFailed);
                }
                break;
            }
            report.pages_fetched = page;

            let count = result.documents.len();
            if count == 0 {
                info!(tenant_id = tenant.id, page, "No more documents found");
                break;
            }
            received_any = true;

            match self.store.insert_documents(tenant.id, &result.documents).await {
                Ok(()) => {
                    report.documents_stored += count;
                    info!(
                        tenant_id = tenant.id,
                        page,
                        documents = count,
                        total_so_far = report.documents_stored,
                        "Stored NFS-e documents"
                    );
                }
                Err(e) => {
                    report.persist_failures += 1;
                    error!(
                        tenant_id = tenant.id,
                        page,
                        documents = count,
                        "Failed to store NFS-e documents: {e}"
                    );
                }
            }

            if count < PAGE_SIZE {
                break;
            }
            if page < self.config.max_pages_per_run && self.config.api_delay_seconds > 0 {
                tokio::time::sleep(self.config.api_delay()).await;
            }
        }

        if report.documents_stored > 0 {
            report.status = FetchStatus::Stored;
        } else if received_any {
            report.status = FetchStatus::NoNewData(NoDataReason::NothingPersisted);
        }

        info!(
            tenant_id = tenant.id,
            tenant_name = %tenant.name,
            total_documents = report.documents_stored,
            pages = report.pages_fetched,
            status = ?report.status,
            "Completed NFS-e fetch for tenant"
        );
        report
    }
}
