pub mod connectivity;
pub mod reconciler;
pub mod remote;

pub use connectivity::{spawn_probe, Connectivity};
pub use reconciler::{DeliveryOutcome, ReconcileSummary, SyncCounts, SyncReconciler};
pub use remote::{DynRemoteStore, HttpRemoteStore, RemoteError, RemoteReport, RemoteStore};
