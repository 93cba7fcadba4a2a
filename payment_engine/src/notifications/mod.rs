//! # Outbound notifications
//!
//! The engine talks to two collaborators once an aggregate has been durably updated: a transactional email service
//! ([`EmailSender`]) and a courier label service ([`LabelGenerator`]). Both are traits so that the engine stays
//! independent of any particular provider; the server wires in the REST clients.
//!
//! Every call goes through the [`NotificationDispatcher`], which runs it inside an isolated boundary (a timeout and a
//! panic guard) and logs failures with the event and aggregate they belong to. Failures are returned to the caller as
//! values, never propagated as panics or errors that could abort reconciliation.
mod dispatcher;

use std::{fmt::Display, time::Duration};

pub use dispatcher::{panic_message, DispatchContext, NotificationDispatcher};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::db_types::{Order, ReturnItem, ReturnRequest, ShippingLabel};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailKind {
    OrderConfirmation,
    LabelPaymentConfirmation,
    ReturnLabelReady,
    RefundProcessed,
}

impl EmailKind {
    /// The template identifier used by the email service
    pub fn template(&self) -> &'static str {
        match self {
            EmailKind::OrderConfirmation => "order_confirmation",
            EmailKind::LabelPaymentConfirmation => "label_payment_confirmation",
            EmailKind::ReturnLabelReady => "return_label_ready",
            EmailKind::RefundProcessed => "refund_processed",
        }
    }
}

impl Display for EmailKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.template())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EmailReceipt {
    pub message_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotificationError {
    #[error("The email service rejected the message: {0}")]
    EmailRejected(String),
    #[error("Could not deliver the message to the email service: {0}")]
    EmailUnavailable(String),
    #[error("The label service could not create a label: {0}")]
    LabelFailed(String),
    #[error("The call did not complete within {0:?}")]
    Timeout(Duration),
    #[error("The call panicked: {0}")]
    Panicked(String),
}

/// Sends transactional emails.
#[allow(async_fn_in_trait)]
pub trait EmailSender {
    async fn send_email(
        &self,
        kind: EmailKind,
        recipient: &str,
        context: Value,
    ) -> Result<EmailReceipt, NotificationError>;
}

/// Creates prepaid return labels with the courier.
#[allow(async_fn_in_trait)]
pub trait LabelGenerator {
    async fn create_label(
        &self,
        request: &ReturnRequest,
        order: &Order,
        items: &[ReturnItem],
    ) -> Result<ShippingLabel, NotificationError>;
}
