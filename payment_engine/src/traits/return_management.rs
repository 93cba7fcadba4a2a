use crate::{
    db_types::{ReturnId, ReturnItem, ReturnRequest},
    traits::StoreError,
};

/// Lookups on return requests.
#[allow(async_fn_in_trait)]
pub trait ReturnManagement {
    async fn fetch_return_by_return_id(&self, return_id: &ReturnId) -> Result<Option<ReturnRequest>, StoreError>;

    async fn fetch_return_by_label_payment_ref(&self, payment_ref: &str) -> Result<Option<ReturnRequest>, StoreError>;

    async fn fetch_return_by_refund_ref(&self, refund_ref: &str) -> Result<Option<ReturnRequest>, StoreError>;

    /// The most recently created return for `email` that is waiting for its label to be paid, and that is not bound to
    /// a label payment reference other than `payment_ref`.
    async fn fetch_latest_label_pending_return_for_email(
        &self,
        email: &str,
        payment_ref: Option<&str>,
    ) -> Result<Option<ReturnRequest>, StoreError>;

    async fn fetch_return_items(&self, return_id: &ReturnId) -> Result<Vec<ReturnItem>, StoreError>;
}
