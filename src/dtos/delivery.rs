use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::delivery::{Delivery, LineItem};

#[derive(Debug, Clone, Deserialize)]
pub struct BulkDeliveryUpdateRequest {
    #[serde(default)]
    pub delivery_latitude: Option<Decimal>,
    #[serde(default)]
    pub delivery_longitude: Option<Decimal>,
    pub deliveries: Vec<DeliveryUpdateRequest>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeliveryUpdateRequest {
    pub billing_doc_no: String,
    pub delivery_products: Vec<ProductUpdateRequest>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProductUpdateRequest {
    pub material_code: String,
    #[serde(default)]
    pub batch: Option<String>,
    #[serde(default)]
    pub delivery_quantity: Option<Decimal>,
    #[serde(default)]
    pub return_quantity: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeliverySummary {
    pub billing_doc_no: String,
    pub total_delivered_amount: Decimal,
    pub total_returned_amount: Decimal,
    pub has_returns: bool,
    pub line_items_updated: usize,
}

#[derive(Serialize)]
pub struct BulkDeliveryUpdateResponse {
    pub success: bool,
    pub message: String,
    pub data: Vec<DeliverySummary>,
}

#[derive(Serialize)]
pub struct DeliveryDetailResponse {
    #[serde(flatten)]
    pub delivery: Delivery,
    pub line_items: Vec<LineItem>,
}
