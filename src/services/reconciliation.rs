//! Bulk delivery reconciliation.
//!
//! One call reconciles many deliveries inside a single transaction: every delivery row is
//! locked (ascending document number), every line item is re-split with
//! [`split_net_value`], and delivery totals are rewritten. Any failure rolls the whole
//! batch back.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{info, instrument, warn};

use crate::dtos::delivery::{
    BulkDeliveryUpdateRequest, DeliverySummary, DeliveryUpdateRequest, ProductUpdateRequest,
};
use crate::error::AppError;
use crate::models::delivery::{DeliveryUpdate, LineItemKey, LineItemUpdate};
use crate::services::net_value::split_net_value;
use crate::store::{DeliveryStore, DeliveryTransaction};

pub const DELIVERY_DONE_STATUS: &str = "delivery done";

const MAX_BILLING_DOC_NO_LEN: usize = 10;
const MAX_MATERIAL_CODE_LEN: usize = 40;
const MAX_BATCH_LEN: usize = 10;
const MAX_COORDINATE_SCALE: u32 = 16;
const MAX_COORDINATE_INTEGER_DIGITS: u32 = 11;
const MAX_QUANTITY_DIGITS: u32 = 18;

pub struct ReconciliationCoordinator<S> {
    store: S,
}

impl<S: DeliveryStore> ReconciliationCoordinator<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub async fn reconcile(
        &self,
        request: &BulkDeliveryUpdateRequest,
    ) -> Result<Vec<DeliverySummary>, AppError> {
        self.reconcile_at(request, Utc::now()).await
    }

    /// Same as [`reconcile`](Self::reconcile) with an explicit delivery timestamp.
    #[instrument(skip(self, request), fields(deliveries = request.deliveries.len()))]
    pub async fn reconcile_at(
        &self,
        request: &BulkDeliveryUpdateRequest,
        now: DateTime<Utc>,
    ) -> Result<Vec<DeliverySummary>, AppError> {
        if let Err(e) = validate_request(request) {
            warn!(error = %e, "Rejected bulk delivery update");
            return Err(e);
        }
        if request.deliveries.is_empty() {
            return Ok(Vec::new());
        }

        let mut tx = self.store.begin().await?;

        match apply(&mut tx, request, now).await {
            Ok(summaries) => {
                tx.commit().await?;
                info!(deliveries = summaries.len(), "Bulk delivery update committed");
                Ok(summaries)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "Rollback failed, transaction discarded on drop");
                }
                warn!(error = %e, "Bulk delivery update rolled back");
                Err(e)
            }
        }
    }
}

/// Checks everything that can be checked without touching storage.
pub fn validate_request(request: &BulkDeliveryUpdateRequest) -> Result<(), AppError> {
    let mut seen = HashSet::with_capacity(request.deliveries.len());
    for delivery in &request.deliveries {
        if !seen.insert(delivery.billing_doc_no.as_str()) {
            return Err(AppError::DuplicateRequest(delivery.billing_doc_no.clone()));
        }
    }

    for (name, value) in [
        ("delivery_latitude", request.delivery_latitude),
        ("delivery_longitude", request.delivery_longitude),
    ] {
        if let Some(v) = value {
            if v.scale() > MAX_COORDINATE_SCALE {
                return Err(AppError::invalid_input(format!(
                    "{name} must have at most {MAX_COORDINATE_SCALE} decimal places"
                )));
            }
            if v.abs().trunc() >= digit_limit(MAX_COORDINATE_INTEGER_DIGITS) {
                return Err(AppError::invalid_input(format!(
                    "{name} must have at most {MAX_COORDINATE_INTEGER_DIGITS} digits before the decimal point"
                )));
            }
        }
    }

    for delivery in &request.deliveries {
        validate_delivery(delivery)?;
    }
    Ok(())
}

fn validate_delivery(delivery: &DeliveryUpdateRequest) -> Result<(), AppError> {
    let doc = delivery.billing_doc_no.as_str();
    if doc.is_empty() || doc.chars().count() > MAX_BILLING_DOC_NO_LEN {
        return Err(AppError::invalid_input(format!(
            "billing_doc_no '{doc}' must be 1 to {MAX_BILLING_DOC_NO_LEN} characters"
        )));
    }

    let mut keys = HashSet::with_capacity(delivery.delivery_products.len());
    for product in &delivery.delivery_products {
        let material = product.material_code.as_str();
        if material.is_empty() || material.chars().count() > MAX_MATERIAL_CODE_LEN {
            return Err(AppError::invalid_input(format!(
                "Delivery {doc}: material_code '{material}' must be 1 to {MAX_MATERIAL_CODE_LEN} characters"
            )));
        }
        if let Some(batch) = &product.batch {
            if batch.chars().count() > MAX_BATCH_LEN {
                return Err(AppError::invalid_input(format!(
                    "Delivery {doc}, product {material}: batch '{batch}' exceeds {MAX_BATCH_LEN} characters"
                )));
            }
        }
        if !keys.insert((material, product.batch.as_deref())) {
            return Err(AppError::DuplicateRequest(format!(
                "{doc} (product {material} with batch {})",
                product.batch.as_deref().unwrap_or("<none>")
            )));
        }

        check_quantity(doc, material, "Delivery", product.delivery_quantity)?;
        check_quantity(doc, material, "Return", product.return_quantity)?;
    }
    Ok(())
}

fn check_quantity(
    doc: &str,
    material: &str,
    label: &str,
    quantity: Option<Decimal>,
) -> Result<(), AppError> {
    match quantity {
        Some(q) if q >= digit_limit(MAX_QUANTITY_DIGITS) => Err(AppError::invalid_input(format!(
            "Delivery {doc}, product {material}: {label} quantity must have at most {MAX_QUANTITY_DIGITS} digits"
        ))),
        Some(q) if q >= Decimal::ZERO && q.fract().is_zero() => Ok(()),
        Some(q) if q >= Decimal::ZERO => Err(AppError::invalid_input(format!(
            "Delivery {doc}, product {material}: {label} quantity must be a whole number, got {q}"
        ))),
        _ => Err(AppError::invalid_input(format!(
            "Delivery {doc}, product {material}: {label} quantity cannot be negative or null"
        ))),
    }
}

/// Smallest value with `digits + 1` integer digits.
fn digit_limit(digits: u32) -> Decimal {
    Decimal::from(10u64.pow(digits))
}

fn submitted_quantity(
    delivered: Decimal,
    returned: Decimal,
    context: impl FnOnce() -> String,
) -> Result<Decimal, AppError> {
    delivered.checked_add(returned).ok_or_else(|| {
        AppError::invalid_input(format!("{}: delivery + return quantity overflows", context()))
    })
}

async fn apply<T: DeliveryTransaction>(
    tx: &mut T,
    request: &BulkDeliveryUpdateRequest,
    now: DateTime<Utc>,
) -> Result<Vec<DeliverySummary>, AppError> {
    // Fixed lock order so overlapping batches cannot deadlock each other.
    let mut lock_order: Vec<&str> = request
        .deliveries
        .iter()
        .map(|d| d.billing_doc_no.as_str())
        .collect();
    lock_order.sort_unstable();
    for doc in lock_order {
        if tx.lock_delivery(doc).await?.is_none() {
            return Err(AppError::not_found(format!("Delivery {doc} not found")));
        }
    }

    let mut summaries = Vec::with_capacity(request.deliveries.len());
    for delivery in &request.deliveries {
        let doc = delivery.billing_doc_no.as_str();
        let mut total_delivered = Decimal::new(0, 2);
        let mut total_returned = Decimal::new(0, 2);
        let mut has_returns = false;

        let mut updates = Vec::with_capacity(delivery.delivery_products.len());
        for product in &delivery.delivery_products {
            let update = reconcile_line_item(tx, doc, product, now).await?;
            total_delivered += update.delivered_net_value;
            total_returned += update.returned_net_value;
            if update.returned_quantity > Decimal::ZERO {
                has_returns = true;
            }
            updates.push(update);
        }

        tx.update_line_items(&updates).await?;
        tx.update_delivery(&DeliveryUpdate {
            billing_doc_no: doc.to_string(),
            delivered_at: now,
            last_status: DELIVERY_DONE_STATUS.to_string(),
            total_delivered_amount: total_delivered,
            total_returned_amount: total_returned,
            has_returns,
            latitude: request.delivery_latitude,
            longitude: request.delivery_longitude,
        })
        .await?;

        info!(
            billing_doc_no = doc,
            line_items = updates.len(),
            %total_delivered,
            %total_returned,
            has_returns,
            "Delivery reconciled"
        );

        summaries.push(DeliverySummary {
            billing_doc_no: doc.to_string(),
            total_delivered_amount: total_delivered,
            total_returned_amount: total_returned,
            has_returns,
            line_items_updated: updates.len(),
        });
    }

    Ok(summaries)
}

async fn reconcile_line_item<T: DeliveryTransaction>(
    tx: &mut T,
    doc: &str,
    product: &ProductUpdateRequest,
    now: DateTime<Utc>,
) -> Result<LineItemUpdate, AppError> {
    let key = LineItemKey {
        billing_doc_no: doc.to_string(),
        material_code: product.material_code.clone(),
        batch: product.batch.clone(),
    };
    let context = || {
        format!(
            "Delivery {doc}, product {} with batch {}",
            key.material_code,
            key.batch_label()
        )
    };

    // Presence is checked by validate_request before any transaction opens.
    let (Some(delivered_quantity), Some(returned_quantity)) =
        (product.delivery_quantity, product.return_quantity)
    else {
        return Err(AppError::invalid_input(format!(
            "{}: quantities cannot be null",
            context()
        )));
    };

    let item = tx.find_line_item(&key).await?.ok_or_else(|| {
        AppError::not_found(format!(
            "Product {} with batch {} not found for delivery {doc}",
            key.material_code,
            key.batch_label()
        ))
    })?;

    let sales_quantity = match (item.sales_quantity, item.sales_net_value) {
        (Some(q), Some(v)) if !q.is_zero() && !v.is_zero() => q,
        _ => {
            return Err(AppError::invalid_input(format!(
                "{}: sales quantity and sales net value must be provided",
                context()
            )))
        }
    };

    let submitted = submitted_quantity(delivered_quantity, returned_quantity, context)?;
    if submitted != sales_quantity {
        return Err(AppError::QuantityMismatch {
            billing_doc_no: doc.to_string(),
            material_code: key.material_code.clone(),
            batch: key.batch_label().to_string(),
            submitted,
            expected: sales_quantity,
        });
    }

    let split = split_net_value(
        item.vat,
        item.sales_quantity,
        item.sales_net_value,
        delivered_quantity,
        returned_quantity,
    )
    .map_err(|e| match e {
        AppError::InvalidInput(msg) => AppError::invalid_input(format!("{}: {msg}", context())),
        other => other,
    })?;

    Ok(LineItemUpdate {
        key,
        delivered_quantity,
        returned_quantity,
        delivered_net_value: split.delivered_net_value,
        returned_net_value: split.returned_net_value,
        updated_at: now,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn product(material: &str, delivered: Option<Decimal>, returned: Option<Decimal>) -> ProductUpdateRequest {
        ProductUpdateRequest {
            material_code: material.to_string(),
            batch: Some("B1".to_string()),
            delivery_quantity: delivered,
            return_quantity: returned,
        }
    }

    fn request(deliveries: Vec<(&str, Vec<ProductUpdateRequest>)>) -> BulkDeliveryUpdateRequest {
        BulkDeliveryUpdateRequest {
            delivery_latitude: None,
            delivery_longitude: None,
            deliveries: deliveries
                .into_iter()
                .map(|(doc, products)| DeliveryUpdateRequest {
                    billing_doc_no: doc.to_string(),
                    delivery_products: products,
                })
                .collect(),
        }
    }

    #[test]
    fn duplicate_delivery_ids_are_rejected() {
        let req = request(vec![
            ("100", vec![product("M1", Some(dec!(1)), Some(dec!(0)))]),
            ("100", vec![product("M2", Some(dec!(1)), Some(dec!(0)))]),
        ]);
        assert!(matches!(validate_request(&req), Err(AppError::DuplicateRequest(doc)) if doc == "100"));
    }

    #[test]
    fn duplicate_line_items_in_one_delivery_are_rejected() {
        let req = request(vec![(
            "100",
            vec![
                product("M1", Some(dec!(1)), Some(dec!(0))),
                product("M1", Some(dec!(0)), Some(dec!(1))),
            ],
        )]);
        assert!(matches!(validate_request(&req), Err(AppError::DuplicateRequest(_))));
    }

    #[test]
    fn null_or_negative_quantities_are_invalid() {
        for (d, r) in [
            (None, Some(dec!(1))),
            (Some(dec!(1)), None),
            (Some(dec!(-1)), Some(dec!(2))),
            (Some(dec!(2)), Some(dec!(-1))),
            (Some(dec!(0.5)), Some(dec!(0.5))),
        ] {
            let req = request(vec![("100", vec![product("M1", d, r)])]);
            assert!(
                matches!(validate_request(&req), Err(AppError::InvalidInput(_))),
                "{d:?} {r:?}"
            );
        }
    }

    #[test]
    fn zero_quantities_are_valid() {
        let req = request(vec![("100", vec![product("M1", Some(dec!(0)), Some(dec!(0)))])]);
        assert!(validate_request(&req).is_ok());
    }

    #[test]
    fn oversized_identifiers_are_invalid() {
        let req = request(vec![("12345678901", vec![])]);
        assert!(matches!(validate_request(&req), Err(AppError::InvalidInput(_))));

        let mut p = product("M1", Some(dec!(1)), Some(dec!(0)));
        p.batch = Some("BATCH-TOO-LONG".to_string());
        let req = request(vec![("100", vec![p])]);
        assert!(matches!(validate_request(&req), Err(AppError::InvalidInput(_))));
    }

    #[test]
    fn coordinates_with_too_many_decimals_are_invalid() {
        let mut req = request(vec![]);
        req.delivery_latitude = Some(Decimal::new(1, 17));
        assert!(matches!(validate_request(&req), Err(AppError::InvalidInput(_))));
        req.delivery_latitude = Some(dec!(23.8103));
        assert!(validate_request(&req).is_ok());
    }

    #[test]
    fn coordinates_beyond_the_column_width_are_invalid() {
        let mut req = request(vec![]);
        req.delivery_latitude = Some(dec!(123456789012345.5));
        assert!(matches!(validate_request(&req), Err(AppError::InvalidInput(_))));

        req.delivery_latitude = None;
        req.delivery_longitude = Some(dec!(-100000000000));
        assert!(matches!(validate_request(&req), Err(AppError::InvalidInput(_))));

        req.delivery_longitude = Some(dec!(-99999999999.1234567890123456));
        assert!(validate_request(&req).is_ok());
    }

    #[test]
    fn quantities_beyond_eighteen_digits_are_invalid() {
        for (d, r) in [
            (Some(Decimal::MAX), Some(dec!(1))),
            (Some(dec!(1)), Some(dec!(1000000000000000000))),
        ] {
            let req = request(vec![("100", vec![product("M1", d, r)])]);
            assert!(
                matches!(validate_request(&req), Err(AppError::InvalidInput(msg)) if msg.contains("18 digits")),
                "{d:?} {r:?}"
            );
        }

        let req = request(vec![("100", vec![product("M1", Some(dec!(999999999999999999)), Some(dec!(0)))])]);
        assert!(validate_request(&req).is_ok());
    }

    #[test]
    fn overflowing_quantity_sum_is_invalid_input() {
        let err = submitted_quantity(Decimal::MAX, dec!(1), || "Delivery 100, product M1".to_string())
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(msg) if msg.contains("overflows")));
        assert_eq!(submitted_quantity(dec!(7), dec!(3), String::new).unwrap(), dec!(10));
    }
}
