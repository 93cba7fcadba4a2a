use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
pub use storefront_common::Cents;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("Invalid value for {kind}: {value}")]
pub struct ConversionError {
    kind: &'static str,
    value: String,
}

/// Implements `as_str`, `Display` and `FromStr` for a fieldless enum, using the same snake_case names that are stored in
/// the database and used on the wire.
macro_rules! string_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ConversionError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant),)+
                    _ => Err(ConversionError { kind: stringify!($name), value: s.to_string() }),
                }
            }
        }
    };
}

macro_rules! string_id {
    ($name:ident, $prefix:literal) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
        #[sqlx(transparent)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new<S: Into<String>>(id: S) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}{}", $prefix, self.0)
            }
        }
    };
}

//--------------------------------------      Identifiers      ---------------------------------------------------------
string_id!(OrderId, "#");
string_id!(ReturnId, "R#");
string_id!(VariantId, "");

//--------------------------------------     PaymentStatus     ---------------------------------------------------------
/// The payment lifecycle of an order.
///
/// Statuses only ever move forward along `unpaid → pending → paid → refunded`. `failed` and `expired` are absorbing and
/// can only be reached while the order has not been paid yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Unpaid,
    Pending,
    Paid,
    Failed,
    Refunded,
    Expired,
}

string_enum!(PaymentStatus {
    Unpaid => "unpaid",
    Pending => "pending",
    Paid => "paid",
    Failed => "failed",
    Refunded => "refunded",
    Expired => "expired",
});

impl PaymentStatus {
    /// The statuses from which `target` may legally be reached.
    pub fn predecessors(target: PaymentStatus) -> &'static [PaymentStatus] {
        use PaymentStatus::*;
        match target {
            Unpaid => &[],
            Pending => &[Unpaid],
            Paid | Failed | Expired => &[Unpaid, Pending],
            Refunded => &[Unpaid, Pending, Paid],
        }
    }

    pub fn can_transition_to(&self, target: PaymentStatus) -> bool {
        PaymentStatus::predecessors(target).contains(self)
    }

    pub fn is_settled(&self) -> bool {
        !matches!(self, PaymentStatus::Unpaid | PaymentStatus::Pending)
    }
}

//--------------------------------------   OrderStatusType     ---------------------------------------------------------
/// The fulfilment status of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatusType {
    Pending,
    Paid,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
    ReturnRequested,
    Returned,
    Refunded,
}

string_enum!(OrderStatusType {
    Pending => "pending",
    Paid => "paid",
    Processing => "processing",
    Shipped => "shipped",
    Delivered => "delivered",
    Cancelled => "cancelled",
    ReturnRequested => "return_requested",
    Returned => "returned",
    Refunded => "refunded",
});

//--------------------------------------        Order          ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub order_id: OrderId,
    pub customer_email: String,
    /// The payment provider's reference for the payment (payment intent) that pays for this order.
    pub payment_ref: Option<String>,
    pub checkout_session_id: Option<String>,
    pub payment_status: PaymentStatus,
    pub status: OrderStatusType,
    pub total_price: Cents,
    pub currency: String,
    pub payment_method: Option<String>,
    pub failure_reason: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: i64,
    pub order_id: OrderId,
    pub variant_id: VariantId,
    pub quantity: i64,
    pub unit_price: Cents,
    /// Pre-sale items are drawn from the pre-sale stock pool
    pub presale: bool,
}

impl OrderItem {
    pub fn stock_pool(&self) -> StockPool {
        if self.presale {
            StockPool::Presale
        } else {
            StockPool::Regular
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrderItem {
    pub variant_id: VariantId,
    pub quantity: i64,
    pub unit_price: Cents,
    pub presale: bool,
}

impl NewOrderItem {
    pub fn new<V: Into<VariantId>>(variant_id: V, quantity: i64, unit_price: Cents) -> Self {
        Self { variant_id: variant_id.into(), quantity, unit_price, presale: false }
    }

    pub fn presale(mut self) -> Self {
        self.presale = true;
        self
    }
}

#[derive(Debug, Clone)]
pub struct NewOrder {
    pub order_id: OrderId,
    pub customer_email: String,
    pub checkout_session_id: Option<String>,
    pub payment_ref: Option<String>,
    pub currency: String,
    pub created_at: DateTime<Utc>,
    pub items: Vec<NewOrderItem>,
}

impl NewOrder {
    pub fn new(order_id: OrderId, customer_email: String) -> Self {
        Self {
            order_id,
            customer_email,
            checkout_session_id: None,
            payment_ref: None,
            currency: storefront_common::DEFAULT_CURRENCY_CODE.to_string(),
            created_at: Utc::now(),
            items: Vec::new(),
        }
    }

    pub fn with_checkout_session<S: Into<String>>(mut self, session_id: S) -> Self {
        self.checkout_session_id = Some(session_id.into());
        self
    }

    pub fn with_payment_ref<S: Into<String>>(mut self, payment_ref: S) -> Self {
        self.payment_ref = Some(payment_ref.into());
        self
    }

    pub fn with_item(mut self, item: NewOrderItem) -> Self {
        self.items.push(item);
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn total_price(&self) -> Cents {
        self.items.iter().map(|i| i.unit_price * i.quantity).sum()
    }
}

//--------------------------------------     ReturnStatus      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ReturnStatus {
    ReturnRequested,
    ReturnApproved,
    ReturnLabelPaymentPending,
    ReturnLabelPaymentCompleted,
    ReturnLabelGenerated,
    ReturnInTransit,
    ReturnReceived,
    RefundProcessing,
    Refunded,
    ReturnRejected,
}

string_enum!(ReturnStatus {
    ReturnRequested => "return_requested",
    ReturnApproved => "return_approved",
    ReturnLabelPaymentPending => "return_label_payment_pending",
    ReturnLabelPaymentCompleted => "return_label_payment_completed",
    ReturnLabelGenerated => "return_label_generated",
    ReturnInTransit => "return_in_transit",
    ReturnReceived => "return_received",
    RefundProcessing => "refund_processing",
    Refunded => "refunded",
    ReturnRejected => "return_rejected",
});

impl ReturnStatus {
    pub const ALL: [ReturnStatus; 10] = [
        ReturnStatus::ReturnRequested,
        ReturnStatus::ReturnApproved,
        ReturnStatus::ReturnLabelPaymentPending,
        ReturnStatus::ReturnLabelPaymentCompleted,
        ReturnStatus::ReturnLabelGenerated,
        ReturnStatus::ReturnInTransit,
        ReturnStatus::ReturnReceived,
        ReturnStatus::RefundProcessing,
        ReturnStatus::Refunded,
        ReturnStatus::ReturnRejected,
    ];

    pub fn is_terminal(&self) -> bool {
        matches!(self, ReturnStatus::Refunded | ReturnStatus::ReturnRejected)
    }

    /// The statuses from which a return may move to `target` in response to a payment event.
    pub fn predecessors(target: ReturnStatus) -> Vec<ReturnStatus> {
        use ReturnStatus::*;
        match target {
            ReturnLabelPaymentCompleted => vec![ReturnApproved, ReturnLabelPaymentPending],
            Refunded => ReturnStatus::ALL.into_iter().filter(|s| !s.is_terminal()).collect(),
            _ => Vec::new(),
        }
    }
}

//--------------------------------------     ReturnRequest     ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct ReturnRequest {
    pub id: i64,
    pub return_id: ReturnId,
    pub order_id: OrderId,
    pub customer_email: String,
    pub status: ReturnStatus,
    pub label_payment_ref: Option<String>,
    pub tracking_number: Option<String>,
    pub tracking_url: Option<String>,
    pub label_url: Option<String>,
    pub parcel_id: Option<String>,
    pub label_generated_at: Option<DateTime<Utc>>,
    /// Set while a label generation attempt holds the lease on this return
    pub label_attempted_at: Option<DateTime<Utc>>,
    pub last_label_error: Option<String>,
    pub refund_ref: Option<String>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ReturnRequest {
    pub fn has_label(&self) -> bool {
        self.label_url.is_some() || self.status == ReturnStatus::ReturnLabelGenerated
    }
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct ReturnItem {
    pub id: i64,
    pub return_id: ReturnId,
    pub variant_id: VariantId,
    pub quantity: i64,
}

#[derive(Debug, Clone)]
pub struct NewReturnRequest {
    pub return_id: ReturnId,
    pub order_id: OrderId,
    pub customer_email: String,
    pub status: ReturnStatus,
    pub created_at: DateTime<Utc>,
    pub items: Vec<(VariantId, i64)>,
}

impl NewReturnRequest {
    pub fn new(return_id: ReturnId, order_id: OrderId, customer_email: String) -> Self {
        Self {
            return_id,
            order_id,
            customer_email,
            status: ReturnStatus::ReturnRequested,
            created_at: Utc::now(),
            items: Vec::new(),
        }
    }

    pub fn with_status(mut self, status: ReturnStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_item<V: Into<VariantId>>(mut self, variant_id: V, quantity: i64) -> Self {
        self.items.push((variant_id.into(), quantity));
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }
}

//--------------------------------------       Inventory       ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockPool {
    Regular,
    Presale,
}

string_enum!(StockPool {
    Regular => "regular",
    Presale => "presale",
});

impl StockPool {
    /// The `variant_stock` column backing this pool
    pub fn column(&self) -> &'static str {
        match self {
            StockPool::Regular => "stock_quantity",
            StockPool::Presale => "presale_stock_quantity",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct VariantStock {
    pub variant_id: VariantId,
    pub stock_quantity: i64,
    pub presale_stock_quantity: i64,
    pub updated_at: DateTime<Utc>,
}

impl VariantStock {
    pub fn level(&self, pool: StockPool) -> i64 {
        match pool {
            StockPool::Regular => self.stock_quantity,
            StockPool::Presale => self.presale_stock_quantity,
        }
    }
}

//--------------------------------------     ShippingLabel     ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingLabel {
    pub label_url: String,
    pub tracking_number: String,
    pub tracking_url: Option<String>,
    pub parcel_id: String,
}

//--------------------------------------    ProcessedEvent     ---------------------------------------------------------
/// A ledger entry for a provider event that has been reconciled. Used to recognise redeliveries.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct ProcessedEvent {
    pub event_id: String,
    pub event_type: String,
    pub aggregate: Option<String>,
    pub outcome: String,
    pub processed_at: DateTime<Utc>,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn payment_status_is_monotonic() {
        use PaymentStatus::*;
        assert!(Unpaid.can_transition_to(Paid));
        assert!(Pending.can_transition_to(Paid));
        assert!(Paid.can_transition_to(Refunded));
        assert!(!Paid.can_transition_to(Paid));
        assert!(!Refunded.can_transition_to(Paid));
        assert!(!Paid.can_transition_to(Failed));
        assert!(!Paid.can_transition_to(Expired));
        assert!(!Failed.can_transition_to(Paid));
        assert!(!Expired.can_transition_to(Refunded));
        assert!(!Unpaid.can_transition_to(Unpaid));
    }

    #[test]
    fn refunds_are_accepted_from_any_open_return() {
        let from = ReturnStatus::predecessors(ReturnStatus::Refunded);
        assert_eq!(from.len(), 8);
        assert!(!from.contains(&ReturnStatus::Refunded));
        assert!(!from.contains(&ReturnStatus::ReturnRejected));
        let from = ReturnStatus::predecessors(ReturnStatus::ReturnLabelPaymentCompleted);
        assert_eq!(from, vec![ReturnStatus::ReturnApproved, ReturnStatus::ReturnLabelPaymentPending]);
    }

    #[test]
    fn statuses_parse_and_display() {
        assert_eq!("return_label_payment_completed".parse::<ReturnStatus>().unwrap().to_string(),
            "return_label_payment_completed");
        assert_eq!(OrderStatusType::ReturnRequested.to_string(), "return_requested");
        assert!("Paid".parse::<PaymentStatus>().is_err());
        assert_eq!(OrderId::from("1001").to_string(), "#1001");
    }

    #[test]
    fn new_order_totals() {
        let order = NewOrder::new("1001".into(), "alice@example.com".into())
            .with_item(NewOrderItem::new("v-1", 2, Cents::from(1250)))
            .with_item(NewOrderItem::new("v-2", 1, Cents::from(4000)).presale());
        assert_eq!(order.total_price(), Cents::from(6500));
        assert!(order.items[1].presale);
    }
}
