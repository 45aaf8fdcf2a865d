use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::FromRow;

#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct Delivery {
    pub billing_doc_no: String,
    pub delivered: bool,
    pub delivered_at: Option<DateTime<Utc>>,
    pub last_status: Option<String>,
    pub total_delivered_amount: Option<Decimal>,
    pub total_returned_amount: Option<Decimal>,
    pub has_returns: bool,
    pub latitude: Option<Decimal>,
    pub longitude: Option<Decimal>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Delivery {
    /// A delivery as the invoicing feed creates it: nothing reconciled yet.
    pub fn pending(billing_doc_no: impl Into<String>) -> Self {
        Self {
            billing_doc_no: billing_doc_no.into(),
            delivered: false,
            delivered_at: None,
            last_status: None,
            total_delivered_amount: None,
            total_returned_amount: None,
            has_returns: false,
            latitude: None,
            longitude: None,
            updated_at: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct LineItem {
    pub billing_doc_no: String,
    pub material_code: String,
    pub batch: Option<String>,
    pub sales_quantity: Option<Decimal>,
    pub sales_net_value: Option<Decimal>,
    pub vat: Option<Decimal>,
    pub delivered_quantity: Option<Decimal>,
    pub returned_quantity: Option<Decimal>,
    pub delivered_net_value: Option<Decimal>,
    pub returned_net_value: Option<Decimal>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl LineItem {
    pub fn key(&self) -> LineItemKey {
        LineItemKey {
            billing_doc_no: self.billing_doc_no.clone(),
            material_code: self.material_code.clone(),
            batch: self.batch.clone(),
        }
    }
}

/// Identifies a line item. A `None` batch only matches a line item stored without batch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LineItemKey {
    pub billing_doc_no: String,
    pub material_code: String,
    pub batch: Option<String>,
}

impl LineItemKey {
    pub fn batch_label(&self) -> &str {
        self.batch.as_deref().unwrap_or("<none>")
    }
}

/// Delivery-side fields of one line item, staged during reconciliation.
#[derive(Debug, Clone, PartialEq)]
pub struct LineItemUpdate {
    pub key: LineItemKey,
    pub delivered_quantity: Decimal,
    pub returned_quantity: Decimal,
    pub delivered_net_value: Decimal,
    pub returned_net_value: Decimal,
    pub updated_at: DateTime<Utc>,
}

/// Selective write of a delivery row. Coordinates left as `None` keep their stored value.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryUpdate {
    pub billing_doc_no: String,
    pub delivered_at: DateTime<Utc>,
    pub last_status: String,
    pub total_delivered_amount: Decimal,
    pub total_returned_amount: Decimal,
    pub has_returns: bool,
    pub latitude: Option<Decimal>,
    pub longitude: Option<Decimal>,
}
