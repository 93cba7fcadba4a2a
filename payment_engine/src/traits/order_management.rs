use crate::{
    db_types::{Order, OrderId, OrderItem},
    traits::StoreError,
};

/// Lookups on orders, in the order the correlation resolver uses them.
#[allow(async_fn_in_trait)]
pub trait OrderManagement {
    async fn fetch_order_by_order_id(&self, order_id: &OrderId) -> Result<Option<Order>, StoreError>;

    async fn fetch_order_by_payment_ref(&self, payment_ref: &str) -> Result<Option<Order>, StoreError>;

    async fn fetch_order_by_checkout_session(&self, session_id: &str) -> Result<Option<Order>, StoreError>;

    /// The most recently created order for `email` that is still awaiting payment, and that is not bound to a payment
    /// reference other than `payment_ref`.
    async fn fetch_latest_unpaid_order_for_email(
        &self,
        email: &str,
        payment_ref: Option<&str>,
    ) -> Result<Option<Order>, StoreError>;

    async fn fetch_order_items(&self, order_id: &OrderId) -> Result<Vec<OrderItem>, StoreError>;
}
