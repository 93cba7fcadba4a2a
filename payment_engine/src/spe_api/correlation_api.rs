use std::fmt::Debug;

use log::*;
use serde::Serialize;

use crate::{
    db_types::{Order, ReturnRequest},
    spe_api::event_objects::{PaymentDetails, RefundDetails},
    traits::{ReconciliationDatabase, StoreError},
};

/// How an event was matched to its aggregate. Lower tiers are weaker evidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrelationTier {
    /// The aggregate's identifier was embedded in the event metadata
    Metadata,
    /// A provider reference stored on the aggregate matched
    ReferenceKey,
    /// The customer's email address matched a pending aggregate
    ContactFallback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Correlated<T> {
    pub aggregate: T,
    pub tier: CorrelationTier,
}

impl<T> Correlated<T> {
    pub fn new(aggregate: T, tier: CorrelationTier) -> Self {
        Self { aggregate, tier }
    }
}

/// A refund either belongs to a return request or to a whole order. Returns take precedence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefundTarget {
    Return(Correlated<ReturnRequest>),
    Order(Correlated<Order>),
}

/// `CorrelationApi` maps a payment event onto exactly one aggregate using a tiered lookup. The first tier that
/// produces a match wins.
pub struct CorrelationApi<B> {
    db: B,
    contact_fallback: bool,
}

impl<B> Debug for CorrelationApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CorrelationApi (contact fallback: {})", self.contact_fallback)
    }
}

impl<B> CorrelationApi<B> {
    pub fn new(db: B, contact_fallback: bool) -> Self {
        Self { db, contact_fallback }
    }
}

impl<B> CorrelationApi<B>
where B: ReconciliationDatabase
{
    /// Finds the order a payment event refers to.
    ///
    /// 1. `order_id` in the event metadata;
    /// 2. the payment reference, then the checkout session id, stored on the order;
    /// 3. if enabled, the most recent unpaid order for the customer's email that is not bound to another payment.
    ///
    /// When the match came from tier 2 or 3 and the order has no payment reference yet, the event's reference is
    /// bound to the order so that later events for the same payment match on tier 2.
    pub async fn resolve_order(&self, payment: &PaymentDetails) -> Result<Option<Correlated<Order>>, StoreError> {
        let mut found = None;
        if let Some(order_id) = &payment.metadata.order_id {
            found = self
                .db
                .fetch_order_by_order_id(order_id)
                .await?
                .map(|o| Correlated::new(o, CorrelationTier::Metadata));
            if found.is_none() {
                debug!("🔗️ Order {order_id} named in event metadata does not exist. Trying other correlation keys.");
            }
        }
        if found.is_none() {
            if let Some(payment_ref) = &payment.payment_ref {
                found = self
                    .db
                    .fetch_order_by_payment_ref(payment_ref)
                    .await?
                    .map(|o| Correlated::new(o, CorrelationTier::ReferenceKey));
            }
        }
        if found.is_none() {
            if let Some(session_id) = &payment.checkout_session_id {
                found = self
                    .db
                    .fetch_order_by_checkout_session(session_id)
                    .await?
                    .map(|o| Correlated::new(o, CorrelationTier::ReferenceKey));
            }
        }
        if found.is_none() && self.contact_fallback {
            if let Some(email) = &payment.customer_email {
                found = self
                    .db
                    .fetch_latest_unpaid_order_for_email(email, payment.payment_ref.as_deref())
                    .await?
                    .map(|o| Correlated::new(o, CorrelationTier::ContactFallback));
                if let Some(c) = &found {
                    info!("🔗️ Order {} matched on customer email only", c.aggregate.order_id);
                }
            }
        }
        let Some(mut correlated) = found else {
            return Ok(None);
        };
        if correlated.tier != CorrelationTier::Metadata && correlated.aggregate.payment_ref.is_none() {
            if let Some(payment_ref) = &payment.payment_ref {
                let order_id = &correlated.aggregate.order_id;
                if self.db.bind_payment_ref(order_id, payment_ref).await? {
                    debug!("🔗️ Payment reference {payment_ref} bound to order {order_id}");
                    correlated.aggregate.payment_ref = Some(payment_ref.clone());
                }
            }
        }
        trace!("🔗️ Event correlated with order {} ({:?})", correlated.aggregate.order_id, correlated.tier);
        Ok(Some(correlated))
    }

    /// Finds the return request whose shipping label a payment pays for.
    ///
    /// 1. `return_id` in the event metadata;
    /// 2. the label payment reference stored on the return;
    /// 3. if enabled, the most recent return for the customer's email that is waiting for its label payment.
    pub async fn resolve_label_return(
        &self,
        payment: &PaymentDetails,
    ) -> Result<Option<Correlated<ReturnRequest>>, StoreError> {
        if let Some(return_id) = &payment.metadata.return_id {
            if let Some(r) = self.db.fetch_return_by_return_id(return_id).await? {
                return Ok(Some(Correlated::new(r, CorrelationTier::Metadata)));
            }
            debug!("🔗️ Return {return_id} named in event metadata does not exist. Trying other correlation keys.");
        }
        if let Some(payment_ref) = &payment.payment_ref {
            if let Some(r) = self.db.fetch_return_by_label_payment_ref(payment_ref).await? {
                return Ok(Some(Correlated::new(r, CorrelationTier::ReferenceKey)));
            }
        }
        if self.contact_fallback {
            if let Some(email) = &payment.customer_email {
                let found = self
                    .db
                    .fetch_latest_label_pending_return_for_email(email, payment.payment_ref.as_deref())
                    .await?;
                if let Some(r) = found {
                    info!("🔗️ Return {} matched on customer email only", r.return_id);
                    return Ok(Some(Correlated::new(r, CorrelationTier::ContactFallback)));
                }
            }
        }
        Ok(None)
    }

    /// Finds what a refund refers to. Refund metadata is inspected first (that is where return refunds are tagged),
    /// then the charge metadata, then the refund reference of a return, and finally the order's payment reference.
    /// There is no contact fallback for refunds.
    pub async fn resolve_refund(&self, refund: &RefundDetails) -> Result<Option<RefundTarget>, StoreError> {
        for metadata in [&refund.refund_metadata, &refund.metadata] {
            if let Some(return_id) = &metadata.return_id {
                if let Some(r) = self.db.fetch_return_by_return_id(return_id).await? {
                    return Ok(Some(RefundTarget::Return(Correlated::new(r, CorrelationTier::Metadata))));
                }
                debug!("🔗️ Return {return_id} named in refund metadata does not exist.");
            }
        }
        if let Some(refund_ref) = &refund.refund_ref {
            if let Some(r) = self.db.fetch_return_by_refund_ref(refund_ref).await? {
                return Ok(Some(RefundTarget::Return(Correlated::new(r, CorrelationTier::ReferenceKey))));
            }
        }
        for metadata in [&refund.refund_metadata, &refund.metadata] {
            if let Some(order_id) = &metadata.order_id {
                if let Some(o) = self.db.fetch_order_by_order_id(order_id).await? {
                    return Ok(Some(RefundTarget::Order(Correlated::new(o, CorrelationTier::Metadata))));
                }
                debug!("🔗️ Order {order_id} named in refund metadata does not exist.");
            }
        }
        if let Some(payment_ref) = &refund.payment_ref {
            if let Some(o) = self.db.fetch_order_by_payment_ref(payment_ref).await? {
                return Ok(Some(RefundTarget::Order(Correlated::new(o, CorrelationTier::ReferenceKey))));
            }
        }
        Ok(None)
    }
}
