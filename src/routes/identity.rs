use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use crate::db::models::Identity;
use crate::error::AppResult;
use crate::extractors::ActiveIdentity;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/identity", get(current))
        .route("/api/identity/register", post(register))
        .route("/api/identity/login", post(login))
        .route("/api/identity/logout", post(logout))
}

#[derive(Deserialize)]
struct RegisterRequest {
    username: String,
    email: String,
    pin: String,
}

#[derive(Deserialize)]
struct LoginRequest {
    username: String,
    pin: String,
}

async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let Json(req) = payload?;
    let identity = state
        .identities
        .register(&req.username, &req.email, &req.pin)
        .await?;
    Ok((StatusCode::CREATED, Json(identity.public())))
}

async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> AppResult<Json<Identity>> {
    let Json(req) = payload?;
    let identity = state.identities.login(&req.username, &req.pin).await?;
    Ok(Json(identity.public()))
}

async fn logout(State(state): State<AppState>) -> AppResult<StatusCode> {
    state.identities.logout().await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn current(ActiveIdentity(identity): ActiveIdentity) -> Json<Identity> {
    Json(identity.public())
}
