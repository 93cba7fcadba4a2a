use std::time::Duration;

use thiserror::Error;

use crate::{
    db_types::{NewOrder, NewReturnRequest, Order, OrderId, ReturnId, ReturnRequest, ShippingLabel},
    traits::{
        EventLedger,
        InventoryManagement,
        OrderManagement,
        OrderTransition,
        ReturnManagement,
        ReturnTransition,
        SettingsManagement,
    },
};

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("We have an internal database engine (configuration/uptime etc.) error: {0}")]
    DatabaseError(String),
    #[error("The requested order {0} does not exist")]
    OrderNotFound(OrderId),
    #[error("The requested return {0} does not exist")]
    ReturnNotFound(ReturnId),
    #[error("Cannot insert return {0}, since order {1} does not exist")]
    OrphanedReturn(ReturnId, OrderId),
    #[error("Invalid quantity {0}. Quantities must be positive")]
    InvalidQuantity(i64),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::DatabaseError(e.to_string())
    }
}

/// This trait defines the highest level of behaviour for storage backends supporting the reconciliation engine.
///
/// All the state-changing methods are guarded: they only take effect if the aggregate is in a state from which the
/// change is legal, and they report whether they did so. This is what makes reconciliation idempotent in the face of
/// redelivered and concurrently delivered events.
#[allow(async_fn_in_trait)]
pub trait ReconciliationDatabase:
    Clone + OrderManagement + ReturnManagement + InventoryManagement + EventLedger + SettingsManagement
{
    /// The URL of the database
    fn url(&self) -> &str;

    /// Stores a new order and its line items in a single transaction. The call is idempotent: the second element of
    /// the result is `false` if the order already existed, in which case nothing was changed.
    async fn insert_order(&self, order: NewOrder) -> Result<(Order, bool), StoreError>;

    /// Stores a new return request and its items in a single transaction. Idempotent, like [`Self::insert_order`].
    async fn insert_return_request(&self, request: NewReturnRequest) -> Result<(ReturnRequest, bool), StoreError>;

    /// Applies the transition if, and only if, the order's current payment status allows it.
    /// Returns the updated order, or `None` if the guard did not match (or the order does not exist).
    async fn apply_order_transition(
        &self,
        order_id: &OrderId,
        transition: OrderTransition,
    ) -> Result<Option<Order>, StoreError>;

    /// Binds `payment_ref` to the order, but only if it does not have a payment reference yet.
    /// Returns `true` if the reference was bound.
    async fn bind_payment_ref(&self, order_id: &OrderId, payment_ref: &str) -> Result<bool, StoreError>;

    /// Applies the transition if, and only if, the return's current status allows it.
    /// Returns the updated return request, or `None` if the guard did not match.
    async fn apply_return_transition(
        &self,
        return_id: &ReturnId,
        transition: ReturnTransition,
    ) -> Result<Option<ReturnRequest>, StoreError>;

    /// Claims the right to call the label service for this return. The claim only succeeds when the return is in
    /// `return_label_payment_completed`, has no label yet, and no other claim younger than `lease` is outstanding.
    async fn claim_label_generation(&self, return_id: &ReturnId, lease: Duration) -> Result<bool, StoreError>;

    /// Stores a freshly generated label, moving the return to `return_label_generated` and its parent order to
    /// `return_requested`, atomically. Returns `None` if the return was not awaiting a label.
    async fn store_label(
        &self,
        return_id: &ReturnId,
        label: &ShippingLabel,
    ) -> Result<Option<ReturnRequest>, StoreError>;

    /// Records a failed label attempt on the return and releases the label claim.
    async fn record_label_failure(&self, return_id: &ReturnId, error: &str) -> Result<(), StoreError>;

    /// Closes the database connection.
    async fn close(&mut self) -> Result<(), StoreError>;
}
