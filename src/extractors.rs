use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::db::models::Identity;
use crate::error::AppError;
use crate::state::AppState;

/// The device's active identity. Rejects with 401 when nobody is signed in.
#[derive(Debug, Clone)]
pub struct ActiveIdentity(pub Identity);

impl FromRequestParts<AppState> for ActiveIdentity {
    type Rejection = AppError;

    async fn from_request_parts(
        _parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        state
            .identities
            .active()
            .await?
            .map(ActiveIdentity)
            .ok_or(AppError::NotAuthenticated)
    }
}

/// Optional identity extractor: `None` instead of 401.
pub struct MaybeIdentity(pub Option<Identity>);

impl FromRequestParts<AppState> for MaybeIdentity {
    type Rejection = AppError;

    async fn from_request_parts(
        _parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        Ok(MaybeIdentity(state.identities.active().await?))
    }
}
