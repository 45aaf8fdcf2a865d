//! Transactional storage boundary for deliveries and their line items.
//!
//! The coordinator only talks to these traits. `PgDeliveryStore` backs them with
//! PostgreSQL; `InMemoryDeliveryStore` is meant for tests and local development.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;

use crate::error::AppError;
use crate::models::delivery::{Delivery, DeliveryUpdate, LineItem, LineItemKey, LineItemUpdate};

pub use memory::InMemoryDeliveryStore;
pub use postgres::PgDeliveryStore;

/// Opens transactions against the delivery tables.
#[async_trait]
pub trait DeliveryStore: Send + Sync {
    type Tx: DeliveryTransaction;

    async fn begin(&self) -> Result<Self::Tx, AppError>;

    /// Plain read outside any transaction.
    async fn get_delivery(&self, billing_doc_no: &str) -> Result<Option<Delivery>, AppError>;

    /// Line items of one delivery, ordered by material code then batch.
    async fn list_line_items(&self, billing_doc_no: &str) -> Result<Vec<LineItem>, AppError>;
}

/// One all-or-nothing unit of work.
///
/// Nothing written through a transaction is visible to others before `commit`. Dropping a
/// transaction without committing discards its writes and releases its locks.
#[async_trait]
pub trait DeliveryTransaction: Send {
    /// Reads a delivery and holds an exclusive lock on it until commit or rollback.
    async fn lock_delivery(&mut self, billing_doc_no: &str) -> Result<Option<Delivery>, AppError>;

    async fn find_line_item(&mut self, key: &LineItemKey) -> Result<Option<LineItem>, AppError>;

    /// Writes the delivery-side fields of many line items in one statement.
    async fn update_line_items(&mut self, updates: &[LineItemUpdate]) -> Result<(), AppError>;

    async fn update_delivery(&mut self, update: &DeliveryUpdate) -> Result<(), AppError>;

    async fn commit(self) -> Result<(), AppError>;

    async fn rollback(self) -> Result<(), AppError>;
}
