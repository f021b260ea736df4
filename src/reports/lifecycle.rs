use chrono::{Local, Utc};
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::config::ReportsConfig;
use crate::db::models::{Coordinates, Identity, Report, SyncState, WorkflowStatus};
use crate::error::{AppError, AppResult};
use crate::reports::domain::ReportForm;
use crate::reports::ids::ReportIdAllocator;
use crate::store::LocalStore;
use crate::sync::{DeliveryOutcome, SyncReconciler};

/// A report that has been saved locally, plus its first delivery attempt.
pub struct Submitted {
    pub report: Report,
    /// Await to observe the delivery outcome, or drop to let it run detached.
    pub delivery: JoinHandle<DeliveryOutcome>,
}

pub struct ReportLifecycle {
    store: LocalStore,
    reconciler: Arc<SyncReconciler>,
    ids: ReportIdAllocator,
    limits: ReportsConfig,
}

impl ReportLifecycle {
    pub fn new(
        store: LocalStore,
        reconciler: Arc<SyncReconciler>,
        ids: ReportIdAllocator,
        limits: ReportsConfig,
    ) -> Self {
        Self {
            store,
            reconciler,
            ids,
            limits,
        }
    }

    /// Build a report for the active identity, persist it, then try to deliver it.
    ///
    /// Success means "saved locally". Remote delivery runs on its own task and
    /// its outcome never turns into an error here.
    pub async fn submit(
        &self,
        form: &ReportForm,
        identity: Option<&Identity>,
        location: Option<Coordinates>,
    ) -> AppResult<Submitted> {
        let identity = identity.ok_or(AppError::NotAuthenticated)?;
        let valid = form.validate(&self.limits)?;

        if let Some(ref coords) = location {
            if !coords.is_valid() {
                return Err(AppError::InvalidInput("Coordinates out of range".into()));
            }
        }

        let created_at = Utc::now();
        let report = Report {
            id: self.ids.next(),
            incident_type: valid.incident_type,
            severity: valid.severity,
            notes: valid.notes,
            image: valid.image,
            status: WorkflowStatus::Pending,
            sync_state: SyncState::PendingSync,
            reporter_username: identity.username.clone(),
            coordinates: location,
            created_at,
            created_at_display: created_at
                .with_timezone(&Local)
                .format("%b %-d, %Y %-I:%M %p")
                .to_string(),
        };

        self.store.put(&report).await?;
        tracing::info!(
            "Report {} saved ({}, severity {})",
            report.id,
            report.incident_type,
            report.severity.label()
        );

        if let Err(e) = self.reconciler.refresh_view().await {
            tracing::warn!("Could not refresh report view: {}", e);
        }

        let reconciler = self.reconciler.clone();
        let queued = report.clone();
        let delivery = tokio::spawn(async move { reconciler.attempt_deliver(&queued).await });

        Ok(Submitted { report, delivery })
    }

    /// Every report filed by `identity`, newest first.
    pub async fn list_for(&self, identity: &Identity) -> AppResult<Vec<Report>> {
        let mut reports: Vec<Report> = self
            .store
            .get_all::<Report>()
            .await?
            .into_iter()
            .filter(|r| r.reporter_username == identity.username)
            .collect();
        reports.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(reports)
    }
}
