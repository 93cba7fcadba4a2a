//! Verification and decoding of payment provider webhooks.
//!
//! The provider signs every webhook body with a shared secret and sends the result in the `Stripe-Signature` header:
//!
//! ```text
//! Stripe-Signature: t=1718112000,v1=5257a869e7ecebeda32affa62cdca3fa51cad7e77a0e56ff536d0ce8e108d8bd
//! ```
//!
//! The signature is a hex-encoded HMAC-SHA256 over `"{t}.{body}"`. There may be more than one `v1` entry while the
//! provider rolls secrets; any one of them matching is enough.
//!
//! Once the signature checks out, the body is decoded and mapped onto a [`PaymentEvent`]. Only failures of the
//! signature check are treated as rejections. Everything else that goes wrong afterwards is an authentic event that
//! we could not make sense of, and is acknowledged.
use std::{collections::HashMap, time::Duration};

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use log::*;
use payment_engine::{
    db_types::Cents,
    CorrelationMetadata,
    PaymentDetails,
    PaymentEvent,
    PaymentEventKind,
    RefundDetails,
};
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;
use storefront_common::Secret;
use thiserror::Error;

pub const SIGNATURE_HEADER: &str = "Stripe-Signature";
pub const DEFAULT_TOLERANCE: Duration = Duration::from_secs(300);

const RETURN_LABEL_PAYMENT: &str = "return_label";

#[derive(Debug, Clone, Error)]
pub enum VerificationError {
    #[error("Invalid webhook signature. {0}")]
    InvalidSignature(String),
    #[error("The webhook body could not be decoded. {0}")]
    Malformed(String),
    #[error("Event {event_id} has type {event_type}, which is not handled")]
    UnknownEventType { event_id: String, event_type: String },
    #[error("Event {event_id} ({event_type}) is ignored. {reason}")]
    Ignored { event_id: String, event_type: String, reason: String },
}

impl VerificationError {
    /// True if the request must be rejected rather than acknowledged.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::InvalidSignature(_))
    }
}

#[derive(Clone, Debug)]
pub struct EventVerifier {
    secret: Secret<String>,
    tolerance: Duration,
}

impl EventVerifier {
    pub fn new(secret: Secret<String>, tolerance: Duration) -> Self {
        Self { secret, tolerance }
    }

    /// Authenticates the webhook and decodes it into a [`PaymentEvent`].
    pub fn verify(&self, signature: Option<&str>, body: &[u8]) -> Result<PaymentEvent, VerificationError> {
        self.verify_signature(signature, body, Utc::now().timestamp())?;
        parse_event(body)
    }

    /// Checks the signature header against the body, as of the unix timestamp `now`.
    pub fn verify_signature(&self, header: Option<&str>, body: &[u8], now: i64) -> Result<(), VerificationError> {
        let header = header.ok_or_else(|| VerificationError::InvalidSignature("No signature header".into()))?;
        if self.secret.is_empty() {
            warn!("🔐️ No webhook secret has been configured. Rejecting webhook.");
            return Err(VerificationError::InvalidSignature("No webhook secret is configured".into()));
        }
        let mut timestamp = None;
        let mut signatures = Vec::with_capacity(1);
        for part in header.split(',').map(str::trim) {
            if let Some(t) = part.strip_prefix("t=") {
                timestamp = Some(t);
            } else if let Some(v) = part.strip_prefix("v1=") {
                signatures.push(v);
            }
        }
        let timestamp = match timestamp {
            Some(t) if !signatures.is_empty() => t,
            _ => return Err(VerificationError::InvalidSignature("Garbled signature header".into())),
        };
        let ts = timestamp
            .parse::<i64>()
            .map_err(|_| VerificationError::InvalidSignature(format!("Invalid timestamp {timestamp}")))?;
        let mut mac = Hmac::<Sha256>::new_from_slice(self.secret.reveal().as_bytes())
            .map_err(|e| VerificationError::InvalidSignature(e.to_string()))?;
        mac.update(timestamp.as_bytes());
        mac.update(b".");
        mac.update(body);
        let matched = signatures
            .iter()
            .filter_map(|s| hex::decode(s).ok())
            .any(|sig| mac.clone().verify_slice(&sig).is_ok());
        if !matched {
            warn!("🔐️ Webhook signature mismatch. Rejecting webhook.");
            return Err(VerificationError::InvalidSignature("Signature mismatch".into()));
        }
        let age = now.saturating_sub(ts).unsigned_abs();
        if age > self.tolerance.as_secs() {
            warn!("🔐️ Webhook timestamp is {age}s away from our clock. Rejecting webhook.");
            return Err(VerificationError::InvalidSignature("Timestamp outside the tolerance window".into()));
        }
        trace!("🔐️ Webhook signature check ✅️");
        Ok(())
    }
}

//--------------------------------------    Provider payloads    -------------------------------------------------------
#[derive(Debug, Deserialize)]
struct ProviderEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    created: i64,
    data: ProviderEventData,
}

#[derive(Debug, Deserialize)]
struct ProviderEventData {
    object: Value,
}

#[derive(Debug, Default, Deserialize)]
struct PaymentIntentObject {
    id: String,
    amount: Option<i64>,
    currency: Option<String>,
    receipt_email: Option<String>,
    #[serde(default)]
    payment_method_types: Vec<String>,
    last_payment_error: Option<LastPaymentError>,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
struct LastPaymentError {
    message: Option<String>,
    code: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct CheckoutSessionObject {
    id: String,
    payment_intent: Option<String>,
    payment_status: Option<String>,
    customer_email: Option<String>,
    customer_details: Option<ContactDetails>,
    amount_total: Option<i64>,
    currency: Option<String>,
    #[serde(default)]
    payment_method_types: Vec<String>,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
struct ContactDetails {
    email: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChargeObject {
    id: String,
    payment_intent: Option<String>,
    amount_refunded: Option<i64>,
    receipt_email: Option<String>,
    billing_details: Option<ContactDetails>,
    refunds: Option<RefundList>,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
struct RefundList {
    #[serde(default)]
    data: Vec<RefundObject>,
}

#[derive(Debug, Default, Deserialize)]
struct RefundObject {
    id: String,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

fn correlation_metadata(metadata: &HashMap<String, String>) -> CorrelationMetadata {
    let non_empty = |key: &str| metadata.get(key).map(|s| s.trim()).filter(|s| !s.is_empty());
    CorrelationMetadata {
        order_id: non_empty("order_id").map(Into::into),
        return_id: non_empty("return_id").map(Into::into),
    }
}

fn is_label_payment(metadata: &HashMap<String, String>) -> bool {
    metadata.get("type").map(|t| t == RETURN_LABEL_PAYMENT).unwrap_or(false)
}

fn decode<T: for<'de> Deserialize<'de>>(event: &ProviderEvent) -> Result<T, VerificationError> {
    serde_json::from_value(event.data.object.clone())
        .map_err(|e| VerificationError::Malformed(format!("Event {} ({}): {e}", event.id, event.event_type)))
}

/// Decodes an (already authenticated) webhook body into a [`PaymentEvent`].
pub fn parse_event(body: &[u8]) -> Result<PaymentEvent, VerificationError> {
    let event = serde_json::from_slice::<ProviderEvent>(body).map_err(|e| VerificationError::Malformed(e.to_string()))?;
    let ignored = |reason: &str| VerificationError::Ignored {
        event_id: event.id.clone(),
        event_type: event.event_type.clone(),
        reason: reason.to_string(),
    };
    let kind = match event.event_type.as_str() {
        "payment_intent.succeeded" => {
            let intent = decode::<PaymentIntentObject>(&event)?;
            let label_payment = is_label_payment(&intent.metadata);
            let details = intent_details(intent);
            if label_payment {
                PaymentEventKind::LabelPaymentSucceeded(details)
            } else {
                PaymentEventKind::PaymentSucceeded(details)
            }
        },
        "payment_intent.payment_failed" => {
            let intent = decode::<PaymentIntentObject>(&event)?;
            if is_label_payment(&intent.metadata) {
                return Err(ignored("Failed return label payments leave the return untouched"));
            }
            PaymentEventKind::PaymentFailed(intent_details(intent))
        },
        "checkout.session.completed" => {
            let session = decode::<CheckoutSessionObject>(&event)?;
            if session.payment_status.as_deref() != Some("paid") {
                return Err(ignored("The checkout session completed without being paid"));
            }
            let label_payment = is_label_payment(&session.metadata);
            let details = session_details(session);
            if label_payment {
                PaymentEventKind::LabelPaymentSucceeded(details)
            } else {
                PaymentEventKind::PaymentSucceeded(details)
            }
        },
        "checkout.session.expired" => {
            let session = decode::<CheckoutSessionObject>(&event)?;
            if is_label_payment(&session.metadata) {
                return Err(ignored("Expired return label sessions leave the return untouched"));
            }
            PaymentEventKind::CheckoutExpired(session_details(session))
        },
        "charge.refunded" => PaymentEventKind::ChargeRefunded(charge_details(decode::<ChargeObject>(&event)?)),
        _ => {
            return Err(VerificationError::UnknownEventType { event_id: event.id, event_type: event.event_type });
        },
    };
    let created_at = DateTime::<Utc>::from_timestamp(event.created, 0).unwrap_or_else(|| {
        warn!("🔐️ Event {} has an invalid creation time ({}). Using the current time.", event.id, event.created);
        Utc::now()
    });
    debug!("🔐️ Decoded event {} ({}) as {}", event.id, event.event_type, kind.name());
    Ok(PaymentEvent::new(event.id, event.event_type, kind).with_created_at(created_at))
}

fn intent_details(intent: PaymentIntentObject) -> PaymentDetails {
    let failure_reason = intent.last_payment_error.and_then(|e| e.message.or(e.code));
    PaymentDetails {
        metadata: correlation_metadata(&intent.metadata),
        payment_ref: Some(intent.id),
        checkout_session_id: None,
        customer_email: intent.receipt_email,
        amount: intent.amount.map(Cents::from),
        currency: intent.currency,
        payment_method: intent.payment_method_types.into_iter().next(),
        failure_reason,
    }
}

fn session_details(session: CheckoutSessionObject) -> PaymentDetails {
    let customer_email = session.customer_details.and_then(|c| c.email).or(session.customer_email);
    PaymentDetails {
        metadata: correlation_metadata(&session.metadata),
        payment_ref: session.payment_intent,
        checkout_session_id: Some(session.id),
        customer_email,
        amount: session.amount_total.map(Cents::from),
        currency: session.currency,
        payment_method: session.payment_method_types.into_iter().next(),
        failure_reason: None,
    }
}

fn charge_details(charge: ChargeObject) -> RefundDetails {
    let refund = charge.refunds.and_then(|r| r.data.into_iter().next()).unwrap_or_default();
    let refund_ref = Some(refund.id).filter(|id| !id.is_empty());
    RefundDetails {
        metadata: correlation_metadata(&charge.metadata),
        refund_metadata: correlation_metadata(&refund.metadata),
        charge_ref: Some(charge.id),
        payment_ref: charge.payment_intent,
        refund_ref,
        amount_refunded: charge.amount_refunded.map(Cents::from),
        customer_email: charge.billing_details.and_then(|b| b.email).or(charge.receipt_email),
    }
}
