use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::config::Config;
use crate::error::AppResult;
use crate::identity::IdentityService;
use crate::reports::{ReportIdAllocator, ReportLifecycle};
use crate::store::LocalStore;
use crate::sync::{Connectivity, DynRemoteStore, SyncReconciler};

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub store: LocalStore,
    pub identities: Arc<IdentityService>,
    pub reports: Arc<ReportLifecycle>,
    pub reconciler: Arc<SyncReconciler>,
    pub connectivity: Connectivity,
}

impl AppState {
    /// Open the store and wire up the services. `remote` is `None` when sync is disabled.
    pub async fn build(config: Config, remote: Option<DynRemoteStore>) -> AppResult<Self> {
        let db_path = config.db_path();
        let store = LocalStore::open(&db_path)?;
        tracing::info!("Local store at {}", db_path.display());

        let connectivity = Connectivity::new(config.sync.start_online);
        let reconciler = Arc::new(SyncReconciler::new(
            store.clone(),
            remote,
            connectivity.clone(),
            config.remote.collection.clone(),
            config.remote.timeout(),
        ));
        let counts = reconciler.refresh_view().await?;
        tracing::info!(
            "{} reports on device, {} pending sync",
            counts.total,
            counts.pending
        );

        let ids = ReportIdAllocator::new(store.max_report_id().await?);
        let reports = Arc::new(ReportLifecycle::new(
            store.clone(),
            reconciler.clone(),
            ids,
            config.reports.clone(),
        ));
        let identities = Arc::new(IdentityService::new(store.clone(), config.auth.bcrypt_cost));

        Ok(Self {
            config,
            store,
            identities,
            reports,
            reconciler,
            connectivity,
        })
    }
}
