use axum::{extract::{Path, State}, Json};
use crate::state::AppState;
use crate::error::AppError;
use crate::dtos::delivery::{
    BulkDeliveryUpdateRequest, BulkDeliveryUpdateResponse, DeliveryDetailResponse,
};
use crate::services::ReconciliationCoordinator;
use crate::store::{DeliveryStore, PgDeliveryStore};

pub async fn update_deliveries(
    State(AppState { db_pool }): State<AppState>,
    Json(req): Json<BulkDeliveryUpdateRequest>,
) -> Result<Json<BulkDeliveryUpdateResponse>, AppError> {
    let coordinator = ReconciliationCoordinator::new(PgDeliveryStore::new(db_pool));
    let summaries = coordinator.reconcile(&req).await?;

    Ok(Json(BulkDeliveryUpdateResponse {
        success: true,
        message: format!("Successfully updated {} deliveries", summaries.len()),
        data: summaries,
    }))
}

pub async fn get_delivery(
    State(AppState { db_pool }): State<AppState>,
    Path(billing_doc_no): Path<String>,
) -> Result<Json<DeliveryDetailResponse>, AppError> {
    let store = PgDeliveryStore::new(db_pool);
    let delivery = store
        .get_delivery(&billing_doc_no)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Delivery {billing_doc_no} not found")))?;
    let line_items = store.list_line_items(&billing_doc_no).await?;

    Ok(Json(DeliveryDetailResponse { delivery, line_items }))
}
