use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;

use crate::db::models::{Coordinates, Report};
use crate::error::AppResult;
use crate::extractors::{ActiveIdentity, MaybeIdentity};
use crate::reports::ReportForm;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/reports", get(list_reports).post(submit_report))
}

#[derive(Deserialize)]
struct SubmitRequest {
    #[serde(flatten)]
    form: ReportForm,
    coordinates: Option<Coordinates>,
}

async fn submit_report(
    State(state): State<AppState>,
    MaybeIdentity(identity): MaybeIdentity,
    payload: Result<Json<SubmitRequest>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let Json(req) = payload?;
    // Delivery continues on its own task; the response only confirms the local save.
    let submitted = state
        .reports
        .submit(&req.form, identity.as_ref(), req.coordinates)
        .await?;
    Ok((StatusCode::CREATED, Json(submitted.report)))
}

async fn list_reports(
    State(state): State<AppState>,
    ActiveIdentity(identity): ActiveIdentity,
) -> AppResult<Json<Vec<Report>>> {
    Ok(Json(state.reports.list_for(&identity).await?))
}
