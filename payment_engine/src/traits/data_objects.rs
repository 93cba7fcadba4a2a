use chrono::{DateTime, Utc};

use crate::db_types::{OrderStatusType, PaymentStatus, ReturnStatus};

/// A guarded change to an order's payment state. The backend only applies it if the order's current payment status is
/// one of [`PaymentStatus::predecessors`] of the target status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderTransition {
    MarkPaid { payment_ref: Option<String>, payment_method: Option<String>, paid_at: DateTime<Utc> },
    MarkFailed { reason: Option<String> },
    MarkExpired,
    MarkRefunded { refunded_at: DateTime<Utc> },
}

impl OrderTransition {
    pub fn target(&self) -> PaymentStatus {
        match self {
            OrderTransition::MarkPaid { .. } => PaymentStatus::Paid,
            OrderTransition::MarkFailed { .. } => PaymentStatus::Failed,
            OrderTransition::MarkExpired => PaymentStatus::Expired,
            OrderTransition::MarkRefunded { .. } => PaymentStatus::Refunded,
        }
    }

    /// The fulfilment status that accompanies the payment status change, if any.
    pub fn fulfilment_status(&self) -> Option<OrderStatusType> {
        match self {
            OrderTransition::MarkPaid { .. } => Some(OrderStatusType::Processing),
            OrderTransition::MarkRefunded { .. } => Some(OrderStatusType::Refunded),
            _ => None,
        }
    }
}

/// A guarded change to a return request, triggered by a payment event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReturnTransition {
    LabelPaid { label_payment_ref: String },
    Refunded { refund_ref: Option<String>, refunded_at: DateTime<Utc> },
}

impl ReturnTransition {
    pub fn target(&self) -> ReturnStatus {
        match self {
            ReturnTransition::LabelPaid { .. } => ReturnStatus::ReturnLabelPaymentCompleted,
            ReturnTransition::Refunded { .. } => ReturnStatus::Refunded,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProcessedEvent {
    pub event_id: String,
    pub event_type: String,
    pub aggregate: Option<String>,
    pub outcome: String,
    pub processed_at: DateTime<Utc>,
}
