//! PostgreSQL-backed delivery store.
//!
//! Row locks are taken with `SELECT ... FOR UPDATE`, so concurrent reconciliations of the
//! same delivery serialize on the database and each sees the other's committed state.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::instrument;

use super::{DeliveryStore, DeliveryTransaction};
use crate::error::AppError;
use crate::models::delivery::{Delivery, DeliveryUpdate, LineItem, LineItemKey, LineItemUpdate};

const DELIVERY_COLUMNS: &str = r#"billing_doc_no, delivered, delivered_at, last_status,
    total_delivered_amount, total_returned_amount, has_returns, latitude, longitude, updated_at"#;

const LINE_ITEM_COLUMNS: &str = r#"billing_doc_no, material_code, batch, sales_quantity,
    sales_net_value, vat, delivered_quantity, returned_quantity, delivered_net_value,
    returned_net_value, updated_at"#;

#[derive(Debug, Clone)]
pub struct PgDeliveryStore {
    pool: PgPool,
}

impl PgDeliveryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

pub struct PgDeliveryTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl DeliveryStore for PgDeliveryStore {
    type Tx = PgDeliveryTransaction;

    async fn begin(&self) -> Result<Self::Tx, AppError> {
        let tx = self.pool.begin().await?;
        Ok(PgDeliveryTransaction { tx })
    }

    async fn get_delivery(&self, billing_doc_no: &str) -> Result<Option<Delivery>, AppError> {
        let query = format!("SELECT {DELIVERY_COLUMNS} FROM delivery_info WHERE billing_doc_no = $1");
        let delivery = sqlx::query_as::<_, Delivery>(&query)
            .bind(billing_doc_no)
            .fetch_optional(&self.pool)
            .await?;
        Ok(delivery)
    }

    async fn list_line_items(&self, billing_doc_no: &str) -> Result<Vec<LineItem>, AppError> {
        let query = format!(
            "SELECT {LINE_ITEM_COLUMNS} FROM delivery_line_items
             WHERE billing_doc_no = $1
             ORDER BY material_code, batch NULLS FIRST"
        );
        let items = sqlx::query_as::<_, LineItem>(&query)
            .bind(billing_doc_no)
            .fetch_all(&self.pool)
            .await?;
        Ok(items)
    }
}

#[async_trait]
impl DeliveryTransaction for PgDeliveryTransaction {
    #[instrument(skip(self))]
    async fn lock_delivery(&mut self, billing_doc_no: &str) -> Result<Option<Delivery>, AppError> {
        let query = format!(
            "SELECT {DELIVERY_COLUMNS} FROM delivery_info WHERE billing_doc_no = $1 FOR UPDATE"
        );
        let delivery = sqlx::query_as::<_, Delivery>(&query)
            .bind(billing_doc_no)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(delivery)
    }

    async fn find_line_item(&mut self, key: &LineItemKey) -> Result<Option<LineItem>, AppError> {
        let query = format!(
            "SELECT {LINE_ITEM_COLUMNS} FROM delivery_line_items
             WHERE billing_doc_no = $1 AND material_code = $2 AND batch IS NOT DISTINCT FROM $3"
        );
        let item = sqlx::query_as::<_, LineItem>(&query)
            .bind(&key.billing_doc_no)
            .bind(&key.material_code)
            .bind(&key.batch)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(item)
    }

    #[instrument(skip(self, updates), fields(rows = updates.len()))]
    async fn update_line_items(&mut self, updates: &[LineItemUpdate]) -> Result<(), AppError> {
        if updates.is_empty() {
            return Ok(());
        }

        let mut doc_nos: Vec<String> = Vec::with_capacity(updates.len());
        let mut materials: Vec<String> = Vec::with_capacity(updates.len());
        let mut batches: Vec<Option<String>> = Vec::with_capacity(updates.len());
        let mut delivered_qty: Vec<Decimal> = Vec::with_capacity(updates.len());
        let mut returned_qty: Vec<Decimal> = Vec::with_capacity(updates.len());
        let mut delivered_val: Vec<Decimal> = Vec::with_capacity(updates.len());
        let mut returned_val: Vec<Decimal> = Vec::with_capacity(updates.len());
        let mut updated_at: Vec<DateTime<Utc>> = Vec::with_capacity(updates.len());

        for u in updates {
            doc_nos.push(u.key.billing_doc_no.clone());
            materials.push(u.key.material_code.clone());
            batches.push(u.key.batch.clone());
            delivered_qty.push(u.delivered_quantity);
            returned_qty.push(u.returned_quantity);
            delivered_val.push(u.delivered_net_value);
            returned_val.push(u.returned_net_value);
            updated_at.push(u.updated_at);
        }

        sqlx::query(
            r#"UPDATE delivery_line_items AS li
               SET delivered_quantity = u.delivered_quantity,
                   returned_quantity = u.returned_quantity,
                   delivered_net_value = u.delivered_net_value,
                   returned_net_value = u.returned_net_value,
                   updated_at = u.updated_at
               FROM UNNEST($1::TEXT[], $2::TEXT[], $3::TEXT[], $4::NUMERIC[], $5::NUMERIC[],
                           $6::NUMERIC[], $7::NUMERIC[], $8::TIMESTAMPTZ[])
                    AS u(billing_doc_no, material_code, batch, delivered_quantity,
                         returned_quantity, delivered_net_value, returned_net_value, updated_at)
               WHERE li.billing_doc_no = u.billing_doc_no
                 AND li.material_code = u.material_code
                 AND li.batch IS NOT DISTINCT FROM u.batch"#,
        )
        .bind(&doc_nos)
        .bind(&materials)
        .bind(&batches)
        .bind(&delivered_qty)
        .bind(&returned_qty)
        .bind(&delivered_val)
        .bind(&returned_val)
        .bind(&updated_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    #[instrument(skip(self, update), fields(billing_doc_no = %update.billing_doc_no))]
    async fn update_delivery(&mut self, update: &DeliveryUpdate) -> Result<(), AppError> {
        sqlx::query(
            r#"UPDATE delivery_info
               SET delivered = TRUE,
                   delivered_at = $2,
                   last_status = $3,
                   total_delivered_amount = $4,
                   total_returned_amount = $5,
                   has_returns = $6,
                   latitude = COALESCE($7, latitude),
                   longitude = COALESCE($8, longitude),
                   updated_at = $2
               WHERE billing_doc_no = $1"#,
        )
        .bind(&update.billing_doc_no)
        .bind(update.delivered_at)
        .bind(&update.last_status)
        .bind(update.total_delivered_amount)
        .bind(update.total_returned_amount)
        .bind(update.has_returns)
        .bind(update.latitude)
        .bind(update.longitude)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn commit(self) -> Result<(), AppError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> Result<(), AppError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
