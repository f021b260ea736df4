use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use crate::db::models::Report;
use crate::error::{AppError, AppResult};
use crate::store::LocalStore;
use crate::sync::connectivity::Connectivity;
use crate::sync::remote::{DynRemoteStore, RemoteError, RemoteReport};

/// Result of one delivery attempt for one report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Remote accepted the document and the local record is now `synced`.
    Delivered,
    AlreadySynced,
    /// Not in the local store.
    Missing,
    Offline,
    /// No remote configured.
    NoRemote,
    /// Remote or network failure; the record stays `pending_sync`.
    Failed(String),
}

impl DeliveryOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Delivered => "delivered",
            Self::AlreadySynced => "already_synced",
            Self::Missing => "missing",
            Self::Offline => "offline",
            Self::NoRemote => "no_remote",
            Self::Failed(_) => "failed",
        }
    }

    /// Surface a failed attempt as an error for callers that asked explicitly.
    pub fn into_result(self) -> AppResult<DeliveryOutcome> {
        match self {
            Self::Failed(reason) => Err(AppError::RemoteDeliveryFailed(reason)),
            Self::Missing => Err(AppError::NotFound),
            other => Ok(other),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileSummary {
    pub attempted: usize,
    pub delivered: usize,
    pub failed: usize,
    pub pending_after: usize,
    pub synced_after: usize,
    /// Another pass was already running; this request was folded into it.
    pub coalesced: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncCounts {
    pub total: usize,
    pub pending: usize,
    pub synced: usize,
}

impl SyncCounts {
    fn of(reports: &[Report]) -> Self {
        let pending = reports.iter().filter(|r| r.is_pending_sync()).count();
        Self {
            total: reports.len(),
            pending,
            synced: reports.len() - pending,
        }
    }
}

/// Clears the in-flight flag when a pass ends, including on early return or cancellation.
struct PassGuard<'a>(&'a AtomicBool);

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Moves `pending_sync` reports to the remote store.
pub struct SyncReconciler {
    store: LocalStore,
    remote: Option<DynRemoteStore>,
    connectivity: Connectivity,
    collection: String,
    timeout: Duration,
    in_flight: AtomicBool,
    rerun_requested: AtomicBool,
    view: RwLock<Vec<Report>>,
}

impl SyncReconciler {
    pub fn new(
        store: LocalStore,
        remote: Option<DynRemoteStore>,
        connectivity: Connectivity,
        collection: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            remote,
            connectivity,
            collection: collection.into(),
            timeout,
            in_flight: AtomicBool::new(false),
            rerun_requested: AtomicBool::new(false),
            view: RwLock::new(Vec::new()),
        }
    }

    pub fn connectivity(&self) -> &Connectivity {
        &self.connectivity
    }

    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }

    pub fn is_reconciling(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Try to deliver one report. Never fails; the outcome says what happened.
    pub async fn attempt_deliver(&self, report: &Report) -> DeliveryOutcome {
        // Decide on the stored state, not on the caller's possibly stale copy.
        let current = match self.store.get::<Report>(&report.id).await {
            Ok(Some(current)) => current,
            Ok(None) => {
                tracing::warn!("Report {} not in local store, skipping delivery", report.id);
                return DeliveryOutcome::Missing;
            }
            Err(e) => {
                tracing::warn!("Could not read report {} before delivery: {}", report.id, e);
                return DeliveryOutcome::Failed(e.to_string());
            }
        };

        if !current.is_pending_sync() {
            return DeliveryOutcome::AlreadySynced;
        }
        if !self.connectivity.is_online() {
            return DeliveryOutcome::Offline;
        }
        let Some(ref remote) = self.remote else {
            return DeliveryOutcome::NoRemote;
        };

        let report_id = current.id;
        let document_id = report_id.to_string();
        let document = RemoteReport::from(&current);
        let upsert = remote.upsert(&self.collection, &document_id, &document);
        let result = match tokio::time::timeout(self.timeout, upsert).await {
            Ok(result) => result,
            Err(_) => Err(RemoteError::Timeout(self.timeout)),
        };

        let outcome = match result {
            Ok(()) => match self.store.put(&current.mark_synced()).await {
                Ok(()) => {
                    tracing::info!("Report {} synced", report_id);
                    DeliveryOutcome::Delivered
                }
                Err(e) => {
                    // The upsert is idempotent, so the next pass simply repeats it.
                    tracing::warn!(
                        "Report {} delivered but local sync flag not saved: {}",
                        report_id,
                        e
                    );
                    DeliveryOutcome::Failed(format!("local update failed: {}", e))
                }
            },
            Err(e) => {
                tracing::warn!("Delivery of report {} failed: {}", report_id, e);
                DeliveryOutcome::Failed(e.to_string())
            }
        };

        let detail = match outcome {
            DeliveryOutcome::Failed(ref reason) => Some(reason.as_str()),
            _ => None,
        };
        if let Err(e) = self
            .store
            .log_sync_event(report_id, outcome.as_str(), detail)
            .await
        {
            tracing::debug!("Could not record sync event for {}: {}", report_id, e);
        }

        outcome
    }

    /// Deliver every pending report, then refresh the in-memory view.
    ///
    /// Only one pass runs at a time. A call that arrives while a pass is in
    /// flight returns immediately with `coalesced = true`, and the running
    /// pass goes around once more so the request is not lost.
    pub async fn reconcile_all(&self) -> AppResult<ReconcileSummary> {
        self.rerun_requested.store(true, Ordering::SeqCst);

        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!("Reconciliation already running, request coalesced");
            let counts = self.counts().await;
            return Ok(ReconcileSummary {
                pending_after: counts.pending,
                synced_after: counts.synced,
                coalesced: true,
                ..ReconcileSummary::default()
            });
        }

        let mut summary = ReconcileSummary::default();
        loop {
            {
                let _guard = PassGuard(&self.in_flight);
                while self.rerun_requested.swap(false, Ordering::SeqCst) {
                    let pass = self.run_pass().await?;
                    summary.attempted += pass.attempted;
                    summary.delivered += pass.delivered;
                    summary.failed += pass.failed;
                    summary.pending_after = pass.pending_after;
                    summary.synced_after = pass.synced_after;
                }
            }

            // A request that landed between the last check and the release
            // would otherwise be dropped.
            if !self.rerun_requested.load(Ordering::SeqCst)
                || self
                    .in_flight
                    .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                    .is_err()
            {
                break;
            }
        }

        Ok(summary)
    }

    async fn run_pass(&self) -> AppResult<ReconcileSummary> {
        let reports: Vec<Report> = self.store.get_all().await?;
        let pending: Vec<Report> = reports.into_iter().filter(Report::is_pending_sync).collect();

        let mut pass = ReconcileSummary::default();

        if pending.is_empty() {
            tracing::debug!("Nothing pending");
        } else if !self.connectivity.is_online() {
            tracing::info!("Offline, {} reports stay pending", pending.len());
        } else {
            tracing::info!("Reconciling {} pending reports", pending.len());
            for report in &pending {
                match self.attempt_deliver(report).await {
                    DeliveryOutcome::Delivered => {
                        pass.attempted += 1;
                        pass.delivered += 1;
                    }
                    DeliveryOutcome::Failed(_) => {
                        pass.attempted += 1;
                        pass.failed += 1;
                    }
                    _ => {}
                }
            }
        }

        // Re-read after every attempt of this pass has settled.
        let counts = self.refresh_view().await?;
        pass.pending_after = counts.pending;
        pass.synced_after = counts.synced;

        tracing::info!(
            "Reconciliation pass done: {} delivered, {} failed, {} still pending",
            pass.delivered,
            pass.failed,
            pass.pending_after
        );
        Ok(pass)
    }

    /// Reload all reports from the store into the in-memory view, newest first.
    pub async fn refresh_view(&self) -> AppResult<SyncCounts> {
        let mut reports: Vec<Report> = self.store.get_all().await?;
        reports.sort_by(|a, b| b.id.cmp(&a.id));
        let counts = SyncCounts::of(&reports);
        *self.view.write().await = reports;
        Ok(counts)
    }

    /// Snapshot of the view as of the last refresh.
    pub async fn view(&self) -> Vec<Report> {
        self.view.read().await.clone()
    }

    pub async fn counts(&self) -> SyncCounts {
        SyncCounts::of(&self.view.read().await)
    }

    /// Run a pass on every offline -> online transition, and once now if already online.
    pub fn spawn_on_reconnect(self: Arc<Self>) -> JoinHandle<()> {
        let mut rx = self.connectivity.subscribe();
        tokio::spawn(async move {
            let online = *rx.borrow_and_update();
            if online {
                self.reconcile_logged().await;
            }

            // The channel only wakes on real changes, so seeing `true` here means
            // an online edge happened, even if it flapped during the last pass.
            while rx.changed().await.is_ok() {
                let now_online = *rx.borrow_and_update();
                if now_online {
                    self.reconcile_logged().await;
                }
            }
        })
    }

    async fn reconcile_logged(&self) {
        if let Err(e) = self.reconcile_all().await {
            tracing::error!("Reconciliation failed: {}", e);
        }
    }
}
