//! A storage backend that forwards to a real [`SqliteDatabase`], but can be told to fail order updates.
use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use log::*;

use crate::{
    db_types::{
        NewOrder,
        NewReturnRequest,
        Order,
        OrderId,
        OrderItem,
        ProcessedEvent,
        ReturnId,
        ReturnItem,
        ReturnRequest,
        ShippingLabel,
        StockPool,
        VariantId,
        VariantStock,
    },
    traits::{
        EventLedger,
        InventoryManagement,
        NewProcessedEvent,
        OrderManagement,
        OrderTransition,
        ReconciliationDatabase,
        ReturnManagement,
        ReturnTransition,
        SettingsManagement,
        StoreError,
    },
    SqliteDatabase,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreFault {
    /// Order transitions return a [`StoreError::DatabaseError`].
    Error,
    /// Order transitions panic.
    Panic,
}

#[derive(Debug, Clone)]
pub struct FaultyStore {
    inner: SqliteDatabase,
    fault: Arc<Mutex<Option<StoreFault>>>,
}

impl FaultyStore {
    pub fn new(inner: SqliteDatabase) -> Self {
        Self { inner, fault: Arc::new(Mutex::new(None)) }
    }

    pub fn inner(&self) -> &SqliteDatabase {
        &self.inner
    }

    /// Sets (or with `None`, clears) the fault for subsequent order transitions. Clones share the setting.
    pub fn set_fault(&self, fault: Option<StoreFault>) {
        *self.fault.lock().unwrap() = fault;
    }

    fn fault(&self) -> Option<StoreFault> {
        *self.fault.lock().unwrap()
    }
}

impl ReconciliationDatabase for FaultyStore {
    fn url(&self) -> &str {
        self.inner.url()
    }

    async fn insert_order(&self, order: NewOrder) -> Result<(Order, bool), StoreError> {
        self.inner.insert_order(order).await
    }

    async fn insert_return_request(&self, request: NewReturnRequest) -> Result<(ReturnRequest, bool), StoreError> {
        self.inner.insert_return_request(request).await
    }

    async fn apply_order_transition(
        &self,
        order_id: &OrderId,
        transition: OrderTransition,
    ) -> Result<Option<Order>, StoreError> {
        match self.fault() {
            Some(StoreFault::Error) => {
                debug!("🗃️ Injecting a store failure for order {order_id}");
                Err(StoreError::DatabaseError("disk I/O error".to_string()))
            },
            Some(StoreFault::Panic) => panic!("order store for {order_id} is corrupt"),
            None => self.inner.apply_order_transition(order_id, transition).await,
        }
    }

    async fn bind_payment_ref(&self, order_id: &OrderId, payment_ref: &str) -> Result<bool, StoreError> {
        self.inner.bind_payment_ref(order_id, payment_ref).await
    }

    async fn apply_return_transition(
        &self,
        return_id: &ReturnId,
        transition: ReturnTransition,
    ) -> Result<Option<ReturnRequest>, StoreError> {
        self.inner.apply_return_transition(return_id, transition).await
    }

    async fn claim_label_generation(&self, return_id: &ReturnId, lease: Duration) -> Result<bool, StoreError> {
        self.inner.claim_label_generation(return_id, lease).await
    }

    async fn store_label(
        &self,
        return_id: &ReturnId,
        label: &ShippingLabel,
    ) -> Result<Option<ReturnRequest>, StoreError> {
        self.inner.store_label(return_id, label).await
    }

    async fn record_label_failure(&self, return_id: &ReturnId, error: &str) -> Result<(), StoreError> {
        self.inner.record_label_failure(return_id, error).await
    }

    async fn close(&mut self) -> Result<(), StoreError> {
        self.inner.close().await
    }
}

impl OrderManagement for FaultyStore {
    async fn fetch_order_by_order_id(&self, order_id: &OrderId) -> Result<Option<Order>, StoreError> {
        self.inner.fetch_order_by_order_id(order_id).await
    }

    async fn fetch_order_by_payment_ref(&self, payment_ref: &str) -> Result<Option<Order>, StoreError> {
        self.inner.fetch_order_by_payment_ref(payment_ref).await
    }

    async fn fetch_order_by_checkout_session(&self, session_id: &str) -> Result<Option<Order>, StoreError> {
        self.inner.fetch_order_by_checkout_session(session_id).await
    }

    async fn fetch_latest_unpaid_order_for_email(
        &self,
        email: &str,
        payment_ref: Option<&str>,
    ) -> Result<Option<Order>, StoreError> {
        self.inner.fetch_latest_unpaid_order_for_email(email, payment_ref).await
    }

    async fn fetch_order_items(&self, order_id: &OrderId) -> Result<Vec<OrderItem>, StoreError> {
        self.inner.fetch_order_items(order_id).await
    }
}

impl ReturnManagement for FaultyStore {
    async fn fetch_return_by_return_id(&self, return_id: &ReturnId) -> Result<Option<ReturnRequest>, StoreError> {
        self.inner.fetch_return_by_return_id(return_id).await
    }

    async fn fetch_return_by_label_payment_ref(&self, payment_ref: &str) -> Result<Option<ReturnRequest>, StoreError> {
        self.inner.fetch_return_by_label_payment_ref(payment_ref).await
    }

    async fn fetch_return_by_refund_ref(&self, refund_ref: &str) -> Result<Option<ReturnRequest>, StoreError> {
        self.inner.fetch_return_by_refund_ref(refund_ref).await
    }

    async fn fetch_latest_label_pending_return_for_email(
        &self,
        email: &str,
        payment_ref: Option<&str>,
    ) -> Result<Option<ReturnRequest>, StoreError> {
        self.inner.fetch_latest_label_pending_return_for_email(email, payment_ref).await
    }

    async fn fetch_return_items(&self, return_id: &ReturnId) -> Result<Vec<ReturnItem>, StoreError> {
        self.inner.fetch_return_items(return_id).await
    }
}

impl InventoryManagement for FaultyStore {
    async fn fetch_variant_stock(&self, variant_id: &VariantId) -> Result<Option<VariantStock>, StoreError> {
        self.inner.fetch_variant_stock(variant_id).await
    }

    async fn upsert_variant_stock(
        &self,
        variant_id: &VariantId,
        stock_quantity: i64,
        presale_stock_quantity: i64,
    ) -> Result<VariantStock, StoreError> {
        self.inner.upsert_variant_stock(variant_id, stock_quantity, presale_stock_quantity).await
    }

    async fn decrement_stock(
        &self,
        variant_id: &VariantId,
        quantity: i64,
        pool: StockPool,
    ) -> Result<Option<i64>, StoreError> {
        self.inner.decrement_stock(variant_id, quantity, pool).await
    }

    async fn increment_stock(&self, variant_id: &VariantId, quantity: i64) -> Result<Option<i64>, StoreError> {
        self.inner.increment_stock(variant_id, quantity).await
    }
}

impl EventLedger for FaultyStore {
    async fn fetch_processed_event(&self, event_id: &str) -> Result<Option<ProcessedEvent>, StoreError> {
        self.inner.fetch_processed_event(event_id).await
    }

    async fn record_processed_event(&self, event: NewProcessedEvent) -> Result<bool, StoreError> {
        self.inner.record_processed_event(event).await
    }
}

impl SettingsManagement for FaultyStore {
    async fn fetch_setting(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.inner.fetch_setting(key).await
    }

    async fn upsert_setting(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.inner.upsert_setting(key, value).await
    }
}
