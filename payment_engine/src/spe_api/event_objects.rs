use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db_types::{Cents, OrderId, ReturnId};

/// A verified payment provider notification, already mapped onto the closed set of events the engine understands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentEvent {
    /// The provider's event id. Redeliveries of the same notification carry the same id.
    pub id: String,
    /// The provider's own type tag, e.g. `payment_intent.succeeded`. Kept for diagnostics.
    pub provider_type: String,
    pub created_at: DateTime<Utc>,
    pub kind: PaymentEventKind,
}

impl PaymentEvent {
    pub fn new<S1: Into<String>, S2: Into<String>>(id: S1, provider_type: S2, kind: PaymentEventKind) -> Self {
        Self { id: id.into(), provider_type: provider_type.into(), created_at: Utc::now(), kind }
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn event_type(&self) -> &'static str {
        self.kind.name()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum PaymentEventKind {
    PaymentSucceeded(PaymentDetails),
    PaymentFailed(PaymentDetails),
    CheckoutExpired(PaymentDetails),
    ChargeRefunded(RefundDetails),
    LabelPaymentSucceeded(PaymentDetails),
}

impl PaymentEventKind {
    pub fn name(&self) -> &'static str {
        match self {
            PaymentEventKind::PaymentSucceeded(_) => "payment_succeeded",
            PaymentEventKind::PaymentFailed(_) => "payment_failed",
            PaymentEventKind::CheckoutExpired(_) => "checkout_expired",
            PaymentEventKind::ChargeRefunded(_) => "charge_refunded",
            PaymentEventKind::LabelPaymentSucceeded(_) => "label_payment_succeeded",
        }
    }
}

/// Identifiers that the storefront embeds in the provider's metadata when it creates a payment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrelationMetadata {
    pub order_id: Option<OrderId>,
    pub return_id: Option<ReturnId>,
}

impl CorrelationMetadata {
    pub fn for_order<S: Into<OrderId>>(order_id: S) -> Self {
        Self { order_id: Some(order_id.into()), return_id: None }
    }

    pub fn for_return<S: Into<ReturnId>>(return_id: S) -> Self {
        Self { order_id: None, return_id: Some(return_id.into()) }
    }

    pub fn is_empty(&self) -> bool {
        self.order_id.is_none() && self.return_id.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentDetails {
    /// The provider's payment reference (payment intent id)
    pub payment_ref: Option<String>,
    pub checkout_session_id: Option<String>,
    pub customer_email: Option<String>,
    pub amount: Option<Cents>,
    pub currency: Option<String>,
    pub payment_method: Option<String>,
    pub failure_reason: Option<String>,
    pub metadata: CorrelationMetadata,
}

impl PaymentDetails {
    pub fn with_payment_ref<S: Into<String>>(mut self, payment_ref: S) -> Self {
        self.payment_ref = Some(payment_ref.into());
        self
    }

    pub fn with_checkout_session<S: Into<String>>(mut self, session_id: S) -> Self {
        self.checkout_session_id = Some(session_id.into());
        self
    }

    pub fn with_customer_email<S: Into<String>>(mut self, email: S) -> Self {
        self.customer_email = Some(email.into());
        self
    }

    pub fn with_metadata(mut self, metadata: CorrelationMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_failure_reason<S: Into<String>>(mut self, reason: S) -> Self {
        self.failure_reason = Some(reason.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundDetails {
    pub charge_ref: Option<String>,
    /// The payment (payment intent) the refunded charge belongs to
    pub payment_ref: Option<String>,
    pub refund_ref: Option<String>,
    pub amount_refunded: Option<Cents>,
    pub customer_email: Option<String>,
    /// Metadata attached to the original charge
    pub metadata: CorrelationMetadata,
    /// Metadata attached to the refund itself. Return refunds are tagged here.
    pub refund_metadata: CorrelationMetadata,
}
