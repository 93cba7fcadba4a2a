use std::{any::Any, future::Future, panic::AssertUnwindSafe, time::Duration};

use futures_util::FutureExt;
use log::*;
use serde_json::Value;

use crate::{
    db_types::{Order, ReturnItem, ReturnRequest, ShippingLabel},
    notifications::{EmailKind, EmailReceipt, EmailSender, LabelGenerator, NotificationError},
};

/// Identifies the event and aggregate that a notification belongs to, so that failures can be traced back.
#[derive(Debug, Clone)]
pub struct DispatchContext {
    pub event_id: String,
    pub aggregate: String,
}

impl DispatchContext {
    pub fn new<S1: Into<String>, S2: Into<String>>(event_id: S1, aggregate: S2) -> Self {
        Self { event_id: event_id.into(), aggregate: aggregate.into() }
    }
}

pub struct NotificationDispatcher<E, L> {
    email: E,
    labels: L,
    timeout: Duration,
}

impl<E, L> NotificationDispatcher<E, L> {
    pub fn new(email: E, labels: L, timeout: Duration) -> Self {
        Self { email, labels, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl<E, L> NotificationDispatcher<E, L>
where
    E: EmailSender,
    L: LabelGenerator,
{
    pub async fn send_email(
        &self,
        ctx: &DispatchContext,
        kind: EmailKind,
        recipient: &str,
        context: Value,
    ) -> Result<EmailReceipt, NotificationError> {
        trace!("📬️ Sending {kind} email to {recipient} for {} (event {})", ctx.aggregate, ctx.event_id);
        let result = isolate(self.timeout, self.email.send_email(kind, recipient, context)).await;
        match &result {
            Ok(receipt) => info!(
                "📬️ {kind} email for {} sent to {recipient}. Message id: {}",
                ctx.aggregate,
                receipt.message_id.as_deref().unwrap_or("n/a")
            ),
            Err(e) => warn!(
                "📬️ Could not send {kind} email for {} to {recipient} (event {}). The email will not be retried. {e}",
                ctx.aggregate, ctx.event_id
            ),
        }
        result
    }

    pub async fn create_label(
        &self,
        ctx: &DispatchContext,
        request: &ReturnRequest,
        order: &Order,
        items: &[ReturnItem],
    ) -> Result<ShippingLabel, NotificationError> {
        trace!("🏷️ Requesting label for {} (event {})", ctx.aggregate, ctx.event_id);
        let result = isolate(self.timeout, self.labels.create_label(request, order, items)).await;
        if let Err(e) = &result {
            warn!("🏷️ Label service call for {} failed (event {}). {e}", ctx.aggregate, ctx.event_id);
        }
        result
    }
}

/// Runs a collaborator call with a timeout and catches any panic it raises, turning both into a
/// [`NotificationError`].
pub(crate) async fn isolate<T, F>(timeout: Duration, fut: F) -> Result<T, NotificationError>
where F: Future<Output = Result<T, NotificationError>> {
    match tokio::time::timeout(timeout, AssertUnwindSafe(fut).catch_unwind()).await {
        Err(_) => Err(NotificationError::Timeout(timeout)),
        Ok(Err(panic)) => Err(NotificationError::Panicked(panic_message(panic.as_ref()))),
        Ok(Ok(result)) => result,
    }
}

/// Extracts the message from a caught panic payload.
pub fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
