use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use aegis::config::Config;
use aegis::db::models::{Identity, Report, SyncState, WorkflowStatus};
use aegis::error::AppError;
use aegis::reports::ReportForm;
use aegis::state::AppState;
use aegis::sync::{DeliveryOutcome, DynRemoteStore, RemoteError, RemoteReport, RemoteStore};
use async_trait::async_trait;
use tempfile::TempDir;

/// In-memory remote that counts calls and can refuse chosen ids.
#[derive(Default)]
struct MemoryRemote {
    documents: Mutex<HashMap<String, RemoteReport>>,
    calls: AtomicUsize,
    refuse: Mutex<HashSet<String>>,
}

impl MemoryRemote {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn document_count(&self) -> usize {
        self.documents.lock().unwrap().len()
    }
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    async fn upsert(
        &self,
        collection: &str,
        id: &str,
        document: &RemoteReport,
    ) -> Result<(), RemoteError> {
        assert_eq!(collection, "reports");
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.refuse.lock().unwrap().contains(id) {
            return Err(RemoteError::Network("connection reset".into()));
        }
        self.documents
            .lock()
            .unwrap()
            .insert(id.to_string(), document.clone());
        Ok(())
    }
}

fn test_config(dir: &Path, start_online: bool) -> Config {
    let mut config = Config::for_data_dir(dir);
    config.auth.bcrypt_cost = 4;
    config.sync.start_online = start_online;
    config.remote.timeout_secs = 2;
    config
}

async fn build(dir: &Path, online: bool, remote: &Arc<MemoryRemote>) -> AppState {
    let remote: DynRemoteStore = remote.clone();
    AppState::build(test_config(dir, online), Some(remote))
        .await
        .expect("Failed to build app state")
}

async fn register(state: &AppState) -> Identity {
    state
        .identities
        .register("ranger", "ranger@example.org", "12345678")
        .await
        .expect("Failed to register identity")
}

async fn submit_offline(state: &AppState, identity: &Identity, n: usize) -> Vec<Report> {
    let mut reports = Vec::new();
    for i in 0..n {
        let form = ReportForm::new("Flood", (i % 5 + 1) as i64);
        let submitted = state
            .reports
            .submit(&form, Some(identity), None)
            .await
            .expect("Submit should succeed offline");
        assert_eq!(submitted.delivery.await.unwrap(), DeliveryOutcome::Offline);
        reports.push(submitted.report);
    }
    reports
}

#[tokio::test]
async fn test_offline_reports_survive_restart() {
    let temp_dir = TempDir::new().unwrap();
    let remote = Arc::new(MemoryRemote::default());

    let submitted = {
        let state = build(temp_dir.path(), false, &remote).await;
        let identity = register(&state).await;
        submit_offline(&state, &identity, 3).await
    };

    // Fresh state over the same database file
    let state = build(temp_dir.path(), false, &remote).await;
    let identity = state.identities.active().await.unwrap().unwrap();
    assert_eq!(identity.username, "ranger");

    let reports = state.reports.list_for(&identity).await.unwrap();
    assert_eq!(reports.len(), 3);
    assert!(reports.iter().all(|r| r.sync_state == SyncState::PendingSync));
    assert_eq!(remote.calls(), 0);

    // New ids keep climbing past what is already stored
    let max_before = submitted.iter().map(|r| r.id).max().unwrap();
    let next = state
        .reports
        .submit(&ReportForm::new("Other", 1), Some(&identity), None)
        .await
        .unwrap();
    assert!(next.report.id > max_before);
}

#[tokio::test]
async fn test_listing_is_reverse_submission_order() {
    let temp_dir = TempDir::new().unwrap();
    let remote = Arc::new(MemoryRemote::default());
    let state = build(temp_dir.path(), false, &remote).await;
    let identity = register(&state).await;

    let submitted = submit_offline(&state, &identity, 10).await;
    let mut expected: Vec<i64> = submitted.iter().map(|r| r.id).collect();
    expected.reverse();

    let listed: Vec<i64> = state
        .reports
        .list_for(&identity)
        .await
        .unwrap()
        .iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(listed, expected);
}

#[tokio::test]
async fn test_offline_fire_report_is_pending_and_critical() {
    let temp_dir = TempDir::new().unwrap();
    let remote = Arc::new(MemoryRemote::default());
    let state = build(temp_dir.path(), false, &remote).await;
    let identity = register(&state).await;

    let form = ReportForm::new("Fire", 5).with_notes("visible smoke");
    let submitted = state
        .reports
        .submit(&form, Some(&identity), None)
        .await
        .unwrap();
    submitted.delivery.await.unwrap();

    let stored: Report = state
        .store
        .get(&submitted.report.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.sync_state, SyncState::PendingSync);
    assert_eq!(stored.status, WorkflowStatus::Pending);
    assert_eq!(stored.severity.label(), "5 - Critical");
    assert_eq!(stored.notes.as_deref(), Some("visible smoke"));
}

#[tokio::test]
async fn test_submit_online_delivers_immediately() {
    let temp_dir = TempDir::new().unwrap();
    let remote = Arc::new(MemoryRemote::default());
    let state = build(temp_dir.path(), true, &remote).await;
    let identity = register(&state).await;

    let submitted = state
        .reports
        .submit(&ReportForm::new("Landslide", 3), Some(&identity), None)
        .await
        .unwrap();
    assert_eq!(submitted.report.sync_state, SyncState::PendingSync);
    assert_eq!(submitted.delivery.await.unwrap(), DeliveryOutcome::Delivered);

    let stored: Report = state
        .store
        .get(&submitted.report.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.sync_state, SyncState::Synced);
    assert_eq!(remote.document_count(), 1);
}

#[tokio::test]
async fn test_repeated_delivery_is_idempotent() {
    let temp_dir = TempDir::new().unwrap();
    let remote = Arc::new(MemoryRemote::default());
    let state = build(temp_dir.path(), false, &remote).await;
    let identity = register(&state).await;
    let report = submit_offline(&state, &identity, 1).await.remove(0);

    state.connectivity.set_online(true);
    let first = state.reconciler.attempt_deliver(&report).await;
    let second = state.reconciler.attempt_deliver(&report).await;

    assert_eq!(first, DeliveryOutcome::Delivered);
    assert_eq!(second, DeliveryOutcome::AlreadySynced);
    assert_eq!(remote.document_count(), 1);
    assert_eq!(remote.calls(), 1);
}

#[tokio::test]
async fn test_reconcile_converges_then_goes_quiet() {
    let temp_dir = TempDir::new().unwrap();
    let remote = Arc::new(MemoryRemote::default());
    let state = build(temp_dir.path(), false, &remote).await;
    let identity = register(&state).await;
    submit_offline(&state, &identity, 5).await;

    state.connectivity.set_online(true);
    let summary = state.reconciler.reconcile_all().await.unwrap();
    assert_eq!(summary.delivered, 5);
    assert_eq!(summary.pending_after, 0);
    assert_eq!(summary.synced_after, 5);

    let reports = state.reports.list_for(&identity).await.unwrap();
    assert!(reports.iter().all(|r| r.sync_state == SyncState::Synced));
    assert_eq!(remote.calls(), 5);

    let again = state.reconciler.reconcile_all().await.unwrap();
    assert_eq!(again.attempted, 0);
    assert_eq!(remote.calls(), 5);
}

#[tokio::test]
async fn test_one_failing_report_does_not_block_others() {
    let temp_dir = TempDir::new().unwrap();
    let remote = Arc::new(MemoryRemote::default());
    let state = build(temp_dir.path(), false, &remote).await;
    let identity = register(&state).await;
    let reports = submit_offline(&state, &identity, 3).await;

    remote
        .refuse
        .lock()
        .unwrap()
        .insert(reports[1].id.to_string());

    state.connectivity.set_online(true);
    let summary = state.reconciler.reconcile_all().await.unwrap();
    assert_eq!(summary.delivered, 2);
    assert_eq!(summary.failed, 1);

    let view = state.reconciler.view().await;
    let pending: Vec<i64> = view
        .iter()
        .filter(|r| r.is_pending_sync())
        .map(|r| r.id)
        .collect();
    assert_eq!(pending, vec![reports[1].id]);

    // The refused report goes through on a later pass
    remote.refuse.lock().unwrap().clear();
    let retry = state.reconciler.reconcile_all().await.unwrap();
    assert_eq!(retry.delivered, 1);
    assert_eq!(retry.pending_after, 0);
}

#[tokio::test]
async fn test_reconnect_signal_triggers_reconciliation() {
    let temp_dir = TempDir::new().unwrap();
    let remote = Arc::new(MemoryRemote::default());
    let state = build(temp_dir.path(), false, &remote).await;
    let identity = register(&state).await;
    submit_offline(&state, &identity, 2).await;

    let task = state.reconciler.clone().spawn_on_reconnect();
    assert!(state.connectivity.set_online(true));

    let mut converged = false;
    for _ in 0..100 {
        if state.reconciler.refresh_view().await.unwrap().pending == 0 {
            converged = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(converged, "Reports should sync after reconnect");
    assert_eq!(remote.document_count(), 2);
    task.abort();
}

#[tokio::test]
async fn test_submit_without_identity_writes_nothing() {
    let temp_dir = TempDir::new().unwrap();
    let remote = Arc::new(MemoryRemote::default());
    let state = build(temp_dir.path(), true, &remote).await;

    let result = state
        .reports
        .submit(&ReportForm::new("Fire", 5), None, None)
        .await;
    assert!(matches!(result, Err(AppError::NotAuthenticated)));
    assert!(state.store.get_all::<Report>().await.unwrap().is_empty());
    assert_eq!(remote.calls(), 0);
}

#[tokio::test]
async fn test_unusable_storage_fails_startup() {
    let temp_dir = TempDir::new().unwrap();
    // A regular file where the data directory should be
    let blocker = temp_dir.path().join("blocked");
    std::fs::write(&blocker, b"not a directory").unwrap();

    let result = AppState::build(test_config(&blocker, false), None).await;
    assert!(matches!(result, Err(AppError::StorageUnavailable(_))));
}
