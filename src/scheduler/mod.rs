//! Periodic NFS-e ingestion across all auto-fetch tenants.
//!
//! One background task owns the ticker. Each tick sweeps every eligible
//! tenant sequentially through [`TenantFetcher`]; a failing tenant is logged
//! and counted, never propagated. [`Scheduler::stop`] is observed between
//! sweeps, so a sweep already in progress always runs to completion.

pub mod fetcher;
pub mod skip;
pub mod window;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

pub use fetcher::{FetchStatus, TenantFetcher, TenantReport};

use crate::config::SchedulerConfig;
use crate::error::SchedulerError;
use crate::source::SourceClient;
use crate::store::Store;

/// Result of one sweep over all eligible tenants.
#[derive(Debug, Clone, Serialize)]
pub struct CycleSummary {
    pub started_at: DateTime<Utc>,
    pub tenants_total: usize,
    pub tenants_succeeded: usize,
    pub tenants_failed: usize,
    pub documents_stored: usize,
    pub elapsed_ms: u128,
}

/// Read-only snapshot for observability.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub running: bool,
    pub enabled: bool,
    pub interval: String,
    pub fetch_days_back: u32,
    pub max_pages_per_run: u32,
    pub api_delay_seconds: u64,
}

struct Worker {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

pub struct Scheduler {
    config: SchedulerConfig,
    fetcher: Arc<TenantFetcher>,
    worker: Mutex<Option<Worker>>,
}

impl Scheduler {
    pub fn new(
        config: SchedulerConfig,
        store: Arc<dyn Store>,
        source: Arc<dyn SourceClient>,
    ) -> Self {
        let fetcher = Arc::new(TenantFetcher::new(store, source, config.clone()));
        Self {
            config,
            fetcher,
            worker: Mutex::new(None),
        }
    }

    fn worker(&self) -> MutexGuard<'_, Option<Worker>> {
        self.worker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Spawn the background worker. Must be called inside a Tokio runtime.
    ///
    /// No-op when disabled or already running. An unparsable interval is
    /// returned as an error and nothing is started.
    pub fn start(&self) -> Result<(), SchedulerError> {
        if !self.config.enabled {
            info!("NFS-e scheduler is disabled");
            return Ok(());
        }

        let mut worker = self.worker();
        if worker.is_some() {
            warn!("NFS-e scheduler already running");
            return Ok(());
        }

        let interval = match self.config.parse_interval() {
            Ok(d) => d,
            Err(e) => {
                error!(interval = %self.config.interval, "Invalid scheduler interval: {e}");
                return Err(e);
            }
        };
        if let Err(e) = self.config.check_fetch_days_back() {
            error!(
                fetch_days_back = self.config.fetch_days_back,
                "Invalid scheduler lookback: {e}"
            );
            return Err(e);
        }

        info!(
            interval = ?interval,
            fetch_days_back = self.config.fetch_days_back,
            max_pages = self.config.max_pages_per_run,
            "Starting NFS-e scheduler"
        );

        let (shutdown, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run_loop(self.fetcher.clone(), interval, shutdown_rx));
        *worker = Some(Worker { shutdown, handle });
        Ok(())
    }

    /// Signal the worker to exit and wait for it. An in-flight sweep finishes first.
    pub async fn stop(&self) {
        let worker = self.worker().take();
        let Some(worker) = worker else {
            return;
        };
        info!("Stopping NFS-e scheduler");
        let _ = worker.shutdown.send(true);
        if let Err(e) = worker.handle.await {
            error!("NFS-e scheduler worker ended abnormally: {e}");
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker().is_some()
    }

    pub fn status(&self) -> SchedulerStatus {
        SchedulerStatus {
            running: self.is_running(),
            enabled: self.config.enabled,
            interval: self.config.interval.clone(),
            fetch_days_back: self.config.fetch_days_back,
            max_pages_per_run: self.config.max_pages_per_run,
            api_delay_seconds: self.config.api_delay_seconds,
        }
    }

    /// Fetch one tenant immediately on the caller's task, bypassing the ticker.
    pub async fn fetch_tenant_now(&self, tenant_id: i64) -> Result<TenantReport, SchedulerError> {
        let tenant = self
            .fetcher
            .store()
            .active_tenant(tenant_id)
            .await?
            .ok_or(SchedulerError::TenantNotFound { id: tenant_id })?;
        Ok(self.fetcher.fetch_tenant(&tenant).await)
    }

    /// Run one full sweep on the caller's task.
    pub async fn run_cycle(&self) -> CycleSummary {
        run_cycle(&self.fetcher).await
    }
}

async fn run_loop(
    fetcher: Arc<TenantFetcher>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    // The first tick completes immediately, so a sweep runs right after start.
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!("NFS-e scheduler stopped");
                    break;
                }
            }
            _ = ticker.tick() => {
                run_cycle(&fetcher).await;
            }
        }
    }
}

async fn run_cycle(fetcher: &TenantFetcher) -> CycleSummary {
    let started_at = Utc::now();
    let timer = Instant::now();
    let mut summary = CycleSummary {
        started_at,
        tenants_total: 0,
        tenants_succeeded: 0,
        tenants_failed: 0,
        documents_stored: 0,
        elapsed_ms: 0,
    };

    info!("Starting scheduled NFS-e fetch for all tenants");
    let tenants = match fetcher.store().list_eligible_tenants().await {
        Ok(t) => t,
        Err(e) => {
            error!("Failed to list tenants for scheduled fetch: {e}");
            summary.elapsed_ms = timer.elapsed().as_millis();
            return summary;
        }
    };
    info!(tenants = tenants.len(), "Found tenants for scheduled fetch");

    summary.tenants_total = tenants.len();
    for tenant in &tenants {
        let report = fetcher.fetch_tenant(tenant).await;
        summary.documents_stored += report.documents_stored;
        if report.is_success() {
            summary.tenants_succeeded += 1;
        } else {
            summary.tenants_failed += 1;
        }
    }
    summary.elapsed_ms = timer.elapsed().as_millis();

    info!(
        tenants_total = summary.tenants_total,
        tenants_success = summary.tenants_succeeded,
        tenants_failed = summary.tenants_failed,
        documents = summary.documents_stored,
        elapsed_ms = summary.elapsed_ms as u64,
        "Completed scheduled NFS-e fetch"
    );
    summary
}
