//! In-memory delivery store for tests and local development.
//!
//! A transaction takes one mutex over the whole store for its lifetime, so every
//! transaction is serialized, including ones over disjoint deliveries that the Postgres
//! store would run in parallel. Writes go to a private copy that replaces the committed
//! tables on `commit`; dropping the transaction discards them.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{DeliveryStore, DeliveryTransaction};
use crate::error::AppError;
use crate::models::delivery::{Delivery, DeliveryUpdate, LineItem, LineItemKey, LineItemUpdate};

#[derive(Debug, Clone, Default)]
struct Tables {
    deliveries: BTreeMap<String, Delivery>,
    line_items: BTreeMap<LineItemKey, LineItem>,
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryDeliveryStore {
    tables: Arc<Mutex<Tables>>,
    lock_log: Arc<Mutex<Vec<String>>>,
    transactions_started: Arc<AtomicUsize>,
    fail_delivery_writes: Arc<AtomicBool>,
}

impl InMemoryDeliveryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_delivery(&self, delivery: Delivery) {
        let mut tables = self.tables.lock().await;
        tables.deliveries.insert(delivery.billing_doc_no.clone(), delivery);
    }

    pub async fn insert_line_item(&self, item: LineItem) {
        let mut tables = self.tables.lock().await;
        tables.line_items.insert(item.key(), item);
    }

    /// Every delivery id passed to `lock_delivery`, in call order, across all transactions.
    pub async fn lock_log(&self) -> Vec<String> {
        self.lock_log.lock().await.clone()
    }

    pub fn transactions_started(&self) -> usize {
        self.transactions_started.load(Ordering::SeqCst)
    }

    /// Makes every subsequent delivery write fail like a lost connection would.
    pub fn fail_delivery_writes(&self, fail: bool) {
        self.fail_delivery_writes.store(fail, Ordering::SeqCst);
    }
}

pub struct InMemoryDeliveryTransaction {
    committed: OwnedMutexGuard<Tables>,
    working: Tables,
    lock_log: Arc<Mutex<Vec<String>>>,
    fail_delivery_writes: Arc<AtomicBool>,
}

#[async_trait]
impl DeliveryStore for InMemoryDeliveryStore {
    type Tx = InMemoryDeliveryTransaction;

    async fn begin(&self) -> Result<Self::Tx, AppError> {
        let committed = self.tables.clone().lock_owned().await;
        self.transactions_started.fetch_add(1, Ordering::SeqCst);
        let working = (*committed).clone();
        Ok(InMemoryDeliveryTransaction {
            committed,
            working,
            lock_log: self.lock_log.clone(),
            fail_delivery_writes: self.fail_delivery_writes.clone(),
        })
    }

    async fn get_delivery(&self, billing_doc_no: &str) -> Result<Option<Delivery>, AppError> {
        let tables = self.tables.lock().await;
        Ok(tables.deliveries.get(billing_doc_no).cloned())
    }

    async fn list_line_items(&self, billing_doc_no: &str) -> Result<Vec<LineItem>, AppError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .line_items
            .values()
            .filter(|item| item.billing_doc_no == billing_doc_no)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl DeliveryTransaction for InMemoryDeliveryTransaction {
    async fn lock_delivery(&mut self, billing_doc_no: &str) -> Result<Option<Delivery>, AppError> {
        self.lock_log.lock().await.push(billing_doc_no.to_string());
        Ok(self.working.deliveries.get(billing_doc_no).cloned())
    }

    async fn find_line_item(&mut self, key: &LineItemKey) -> Result<Option<LineItem>, AppError> {
        Ok(self.working.line_items.get(key).cloned())
    }

    async fn update_line_items(&mut self, updates: &[LineItemUpdate]) -> Result<(), AppError> {
        for u in updates {
            if let Some(item) = self.working.line_items.get_mut(&u.key) {
                item.delivered_quantity = Some(u.delivered_quantity);
                item.returned_quantity = Some(u.returned_quantity);
                item.delivered_net_value = Some(u.delivered_net_value);
                item.returned_net_value = Some(u.returned_net_value);
                item.updated_at = Some(u.updated_at);
            }
        }
        Ok(())
    }

    async fn update_delivery(&mut self, update: &DeliveryUpdate) -> Result<(), AppError> {
        if self.fail_delivery_writes.load(Ordering::SeqCst) {
            return Err(AppError::StorageFailure(sqlx::Error::Protocol(
                "simulated write failure".to_string(),
            )));
        }
        if let Some(d) = self.working.deliveries.get_mut(&update.billing_doc_no) {
            d.delivered = true;
            d.delivered_at = Some(update.delivered_at);
            d.last_status = Some(update.last_status.clone());
            d.total_delivered_amount = Some(update.total_delivered_amount);
            d.total_returned_amount = Some(update.total_returned_amount);
            d.has_returns = update.has_returns;
            if let Some(lat) = update.latitude {
                d.latitude = Some(lat);
            }
            if let Some(lon) = update.longitude {
                d.longitude = Some(lon);
            }
            d.updated_at = Some(update.delivered_at);
        }
        Ok(())
    }

    async fn commit(mut self) -> Result<(), AppError> {
        *self.committed = std::mem::take(&mut self.working);
        Ok(())
    }

    async fn rollback(self) -> Result<(), AppError> {
        Ok(())
    }
}
