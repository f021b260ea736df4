pub mod identity;
pub mod reports;
pub mod sync;

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Full JSON API, ready to serve.
pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(identity::router())
        .merge(reports::router())
        .merge(sync::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
