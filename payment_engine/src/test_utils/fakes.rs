//! In-memory stand-ins for the email and label services, for use in tests.
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
    Mutex,
};

use chrono::Utc;
use serde_json::Value;

use crate::{
    db_types::{Order, ReturnItem, ReturnRequest, ShippingLabel},
    notifications::{EmailKind, EmailReceipt, EmailSender, LabelGenerator, NotificationError},
};

#[derive(Debug, Clone)]
pub struct SentEmail {
    pub kind: EmailKind,
    pub recipient: String,
    pub context: Value,
}

/// Records every email instead of sending it. Can be switched into a failing mode.
#[derive(Debug, Clone, Default)]
pub struct RecordingEmailSender {
    sent: Arc<Mutex<Vec<SentEmail>>>,
    failing: Arc<Mutex<bool>>,
}

impl RecordingEmailSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap() = failing;
    }

    pub fn sent(&self) -> Vec<SentEmail> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_of_kind(&self, kind: EmailKind) -> Vec<SentEmail> {
        self.sent().into_iter().filter(|e| e.kind == kind).collect()
    }
}

impl EmailSender for RecordingEmailSender {
    async fn send_email(
        &self,
        kind: EmailKind,
        recipient: &str,
        context: Value,
    ) -> Result<EmailReceipt, NotificationError> {
        if *self.failing.lock().unwrap() {
            return Err(NotificationError::EmailUnavailable("email service is down".into()));
        }
        let mut sent = self.sent.lock().unwrap();
        sent.push(SentEmail { kind, recipient: recipient.to_string(), context });
        Ok(EmailReceipt { message_id: Some(format!("msg-{}", sent.len())) })
    }
}

/// Produces predictable labels, or fails every call while in failing mode. Counts calls either way.
#[derive(Debug, Clone, Default)]
pub struct ScriptedLabelGenerator {
    calls: Arc<AtomicUsize>,
    failing: Arc<Mutex<bool>>,
}

impl ScriptedLabelGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let labels = Self::default();
        labels.set_failing(true);
        labels
    }

    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap() = failing;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl LabelGenerator for ScriptedLabelGenerator {
    async fn create_label(
        &self,
        request: &ReturnRequest,
        _order: &Order,
        _items: &[ReturnItem],
    ) -> Result<ShippingLabel, NotificationError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if *self.failing.lock().unwrap() {
            return Err(NotificationError::LabelFailed("courier rejected the parcel".into()));
        }
        let parcel = format!("{}-{}", Utc::now().timestamp(), n);
        Ok(ShippingLabel {
            label_url: format!("https://labels.example.com/{}.pdf", request.return_id.as_str()),
            tracking_number: format!("TRK{}", request.return_id.as_str().to_uppercase()),
            tracking_url: Some(format!("https://track.example.com/TRK{}", request.return_id.as_str().to_uppercase())),
            parcel_id: parcel,
        })
    }
}
