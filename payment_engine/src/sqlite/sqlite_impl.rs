//! `SqliteDatabase` is the concrete storage backend of the reconciliation engine.
//!
//! Unsurprisingly, it uses SQLite and implements all the traits defined in the [`crate::traits`] module.
use std::{fmt::Debug, time::Duration};

use chrono::Utc;
use log::*;
use sqlx::SqlitePool;

use super::db::{db_url, inventory, ledger, new_pool, orders, returns, settings};
use crate::{
    db_types::{
        NewOrder,
        NewReturnRequest,
        Order,
        OrderId,
        OrderItem,
        OrderStatusType,
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
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl ReconciliationDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn insert_order(&self, order: NewOrder) -> Result<(Order, bool), StoreError> {
        let mut tx = self.pool.begin().await?;
        let result = orders::idempotent_insert(order, &mut tx).await?;
        tx.commit().await?;
        Ok(result)
    }

    async fn insert_return_request(&self, request: NewReturnRequest) -> Result<(ReturnRequest, bool), StoreError> {
        let mut tx = self.pool.begin().await?;
        let result = returns::idempotent_insert(request, &mut tx).await?;
        tx.commit().await?;
        Ok(result)
    }

    async fn apply_order_transition(
        &self,
        order_id: &OrderId,
        transition: OrderTransition,
    ) -> Result<Option<Order>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let target = transition.target();
        let result = orders::apply_transition(order_id, transition, Utc::now(), &mut conn).await?;
        match &result {
            Some(_) => debug!("🗃️ Order {order_id} payment status is now {target}"),
            None => trace!("🗃️ Order {order_id} was not eligible for a transition to {target}"),
        }
        Ok(result)
    }

    async fn bind_payment_ref(&self, order_id: &OrderId, payment_ref: &str) -> Result<bool, StoreError> {
        let mut conn = self.pool.acquire().await?;
        orders::bind_payment_ref(order_id, payment_ref, Utc::now(), &mut conn).await
    }

    async fn apply_return_transition(
        &self,
        return_id: &ReturnId,
        transition: ReturnTransition,
    ) -> Result<Option<ReturnRequest>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let target = transition.target();
        let result = returns::apply_transition(return_id, transition, Utc::now(), &mut conn).await?;
        match &result {
            Some(_) => debug!("🗃️ Return {return_id} is now {target}"),
            None => trace!("🗃️ Return {return_id} was not eligible for a transition to {target}"),
        }
        Ok(result)
    }

    async fn claim_label_generation(&self, return_id: &ReturnId, lease: Duration) -> Result<bool, StoreError> {
        let mut conn = self.pool.acquire().await?;
        returns::claim_label_generation(return_id, lease, Utc::now(), &mut conn).await
    }

    async fn store_label(
        &self,
        return_id: &ReturnId,
        label: &ShippingLabel,
    ) -> Result<Option<ReturnRequest>, StoreError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let updated = returns::store_label(return_id, label, now, &mut tx).await?;
        if let Some(request) = &updated {
            orders::update_order_status(&request.order_id, OrderStatusType::ReturnRequested, now, &mut tx).await?;
            debug!("🗃️ Label {} stored for return {return_id}. Order {} is now return_requested",
                label.tracking_number, request.order_id);
        }
        tx.commit().await?;
        Ok(updated)
    }

    async fn record_label_failure(&self, return_id: &ReturnId, error: &str) -> Result<(), StoreError> {
        let mut conn = self.pool.acquire().await?;
        returns::record_label_failure(return_id, error, Utc::now(), &mut conn).await
    }

    async fn close(&mut self) -> Result<(), StoreError> {
        self.pool.close().await;
        Ok(())
    }
}

impl OrderManagement for SqliteDatabase {
    async fn fetch_order_by_order_id(&self, order_id: &OrderId) -> Result<Option<Order>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch_order_by_order_id(order_id, &mut conn).await
    }

    async fn fetch_order_by_payment_ref(&self, payment_ref: &str) -> Result<Option<Order>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch_order_by_payment_ref(payment_ref, &mut conn).await
    }

    async fn fetch_order_by_checkout_session(&self, session_id: &str) -> Result<Option<Order>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch_order_by_checkout_session(session_id, &mut conn).await
    }

    async fn fetch_latest_unpaid_order_for_email(
        &self,
        email: &str,
        payment_ref: Option<&str>,
    ) -> Result<Option<Order>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch_latest_unpaid_order_for_email(email, payment_ref, &mut conn).await
    }

    async fn fetch_order_items(&self, order_id: &OrderId) -> Result<Vec<OrderItem>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch_order_items(order_id, &mut conn).await
    }
}

impl ReturnManagement for SqliteDatabase {
    async fn fetch_return_by_return_id(&self, return_id: &ReturnId) -> Result<Option<ReturnRequest>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        returns::fetch_return_by_return_id(return_id, &mut conn).await
    }

    async fn fetch_return_by_label_payment_ref(&self, payment_ref: &str) -> Result<Option<ReturnRequest>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        returns::fetch_return_by_label_payment_ref(payment_ref, &mut conn).await
    }

    async fn fetch_return_by_refund_ref(&self, refund_ref: &str) -> Result<Option<ReturnRequest>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        returns::fetch_return_by_refund_ref(refund_ref, &mut conn).await
    }

    async fn fetch_latest_label_pending_return_for_email(
        &self,
        email: &str,
        payment_ref: Option<&str>,
    ) -> Result<Option<ReturnRequest>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        returns::fetch_latest_label_pending_return_for_email(email, payment_ref, &mut conn).await
    }

    async fn fetch_return_items(&self, return_id: &ReturnId) -> Result<Vec<ReturnItem>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        returns::fetch_return_items(return_id, &mut conn).await
    }
}

impl InventoryManagement for SqliteDatabase {
    async fn fetch_variant_stock(&self, variant_id: &VariantId) -> Result<Option<VariantStock>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        inventory::fetch_variant_stock(variant_id, &mut conn).await
    }

    async fn upsert_variant_stock(
        &self,
        variant_id: &VariantId,
        stock_quantity: i64,
        presale_stock_quantity: i64,
    ) -> Result<VariantStock, StoreError> {
        let mut conn = self.pool.acquire().await?;
        inventory::upsert_variant_stock(variant_id, stock_quantity, presale_stock_quantity, Utc::now(), &mut conn)
            .await
    }

    async fn decrement_stock(
        &self,
        variant_id: &VariantId,
        quantity: i64,
        pool: StockPool,
    ) -> Result<Option<i64>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        inventory::decrement_stock(variant_id, quantity, pool, Utc::now(), &mut conn).await
    }

    async fn increment_stock(&self, variant_id: &VariantId, quantity: i64) -> Result<Option<i64>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        inventory::increment_stock(variant_id, quantity, Utc::now(), &mut conn).await
    }
}

impl EventLedger for SqliteDatabase {
    async fn fetch_processed_event(&self, event_id: &str) -> Result<Option<ProcessedEvent>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        ledger::fetch_processed_event(event_id, &mut conn).await
    }

    async fn record_processed_event(&self, event: NewProcessedEvent) -> Result<bool, StoreError> {
        let mut conn = self.pool.acquire().await?;
        ledger::record_processed_event(event, &mut conn).await
    }
}

impl SettingsManagement for SqliteDatabase {
    async fn fetch_setting(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        settings::fetch_setting(key, &mut conn).await
    }

    async fn upsert_setting(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut conn = self.pool.acquire().await?;
        settings::upsert_setting(key, value, Utc::now(), &mut conn).await
    }
}

impl SqliteDatabase {
    /// Creates a new database API object using the URL in `SPG_DATABASE_URL`.
    pub async fn new(max_connections: u32) -> Result<Self, StoreError> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        trace!("🗃️ Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    /// Brings the schema up to date by running the embedded migrations.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./src/sqlite/migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::DatabaseError(format!("Error running migrations: {e}")))?;
        info!("🗃️ Database migrations complete");
        Ok(())
    }

    /// Returns a reference to the database connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
