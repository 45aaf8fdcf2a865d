pub mod deliveries;

use axum::{routing::get, Router};
use crate::state::AppState;

pub const API_BASE_PATH: &str = "/api/v1";

pub fn create_router() -> Router<AppState> {
    Router::new().merge(deliveries::routes())
}

/// Full application: API routes under the base path plus health probes.
pub fn app(state: AppState) -> Router {
    let api = create_router()
        .route("/", get(|| async { "ODMS API" }))
        .route("/health", get(health_check));

    Router::new()
        .nest(API_BASE_PATH, api)
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}
