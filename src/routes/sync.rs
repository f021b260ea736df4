use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::db::models::Report;
use crate::error::{AppError, AppResult};
use crate::reports::{IncidentType, TypePresentation};
use crate::state::AppState;
use crate::store::SyncEvent;
use crate::sync::ReconcileSummary;

const RECENT_EVENTS: usize = 20;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/sync", post(sync_now))
        .route("/api/reports/{id}/deliver", post(deliver_one))
        .route("/api/connectivity", put(set_connectivity))
        .route("/api/status", get(status))
        .route("/api/incident-types", get(incident_types))
}

/// "Sync Now"
async fn sync_now(State(state): State<AppState>) -> AppResult<Json<ReconcileSummary>> {
    Ok(Json(state.reconciler.reconcile_all().await?))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DeliverResponse {
    outcome: &'static str,
    report: Option<Report>,
}

async fn deliver_one(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<DeliverResponse>> {
    let report: Report = state.store.get(&id).await?.ok_or(AppError::NotFound)?;
    let outcome = state
        .reconciler
        .attempt_deliver(&report)
        .await
        .into_result()?;
    state.reconciler.refresh_view().await?;

    Ok(Json(DeliverResponse {
        outcome: outcome.as_str(),
        report: state.store.get(&id).await?,
    }))
}

#[derive(Deserialize)]
struct ConnectivityRequest {
    online: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ConnectivityResponse {
    online: bool,
    reconciling: bool,
}

async fn set_connectivity(
    State(state): State<AppState>,
    payload: Result<Json<ConnectivityRequest>, JsonRejection>,
) -> AppResult<Json<ConnectivityResponse>> {
    let Json(req) = payload?;
    // The reconnect task picks up the online edge and runs the pass.
    state.connectivity.set_online(req.online);
    Ok(Json(ConnectivityResponse {
        online: state.connectivity.is_online(),
        reconciling: state.reconciler.is_reconciling(),
    }))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusResponse {
    online: bool,
    remote_configured: bool,
    total: usize,
    pending: usize,
    synced: usize,
    recent_events: Vec<SyncEvent>,
}

async fn status(State(state): State<AppState>) -> AppResult<Json<StatusResponse>> {
    let counts = state.reconciler.refresh_view().await?;
    let recent_events = state.store.recent_sync_events(RECENT_EVENTS).await?;

    Ok(Json(StatusResponse {
        online: state.connectivity.is_online(),
        remote_configured: state.reconciler.has_remote(),
        total: counts.total,
        pending: counts.pending,
        synced: counts.synced,
        recent_events,
    }))
}

#[derive(Serialize)]
struct IncidentTypeEntry {
    #[serde(rename = "type")]
    incident_type: IncidentType,
    #[serde(flatten)]
    presentation: TypePresentation,
}

async fn incident_types() -> Json<Vec<IncidentTypeEntry>> {
    Json(
        IncidentType::ALL
            .iter()
            .map(|t| IncidentTypeEntry {
                incident_type: *t,
                presentation: *t.presentation(),
            })
            .collect(),
    )
}
