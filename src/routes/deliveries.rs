use axum::{Router, routing::{get, put}};
use crate::state::AppState;
use crate::handlers::delivery::{get_delivery, update_deliveries};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/delivery/update", put(update_deliveries))
        .route("/delivery/{billing_doc_no}", get(get_delivery))
}
