//! # Webhook acknowledgments
//!
//! The payment provider retries, and eventually disables, webhook endpoints that answer with anything but a 2xx.
//! So the only webhook we ever refuse is one whose signature does not check out. Every authentic event is
//! acknowledged with a `200 OK`, and the body carries the reconciliation diagnostics:
//!
//! ```json
//! { "received": true, "event_id": "evt_1", "event_type": "payment_succeeded", "outcome": "applied",
//!   "aggregate": "order #1001", "correlation": "metadata" }
//! ```
//!
//! Store failures, label and email failures, undecodable payloads and even panics inside the engine end up in the
//! diagnostics (and the logs), never in the status code.
use std::panic::AssertUnwindSafe;

use actix_web::HttpResponse;
use futures::FutureExt;
use log::*;
use payment_engine::{
    panic_message,
    EmailSender,
    LabelGenerator,
    Outcome,
    PaymentEvent,
    ReconciliationApi,
    ReconciliationDatabase,
    ReconciliationReport,
};
use serde::Serialize;

use crate::integrations::stripe::{EventVerifier, VerificationError};

const UNKNOWN: &str = "unknown";

#[derive(Debug, Clone, Serialize)]
pub struct Acknowledgment {
    pub received: bool,
    #[serde(flatten)]
    pub report: ReconciliationReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct Rejection {
    pub received: bool,
    pub error: String,
}

/// Runs the full webhook pipeline (verification, reconciliation) and turns the result into the HTTP answer for the
/// provider.
pub async fn acknowledge<B, E, L>(
    verifier: &EventVerifier,
    api: &ReconciliationApi<B, E, L>,
    signature: Option<&str>,
    body: &[u8],
) -> HttpResponse
where
    B: ReconciliationDatabase,
    E: EmailSender,
    L: LabelGenerator,
{
    let report = match verifier.verify(signature, body) {
        Ok(event) => reconcile_guarded(api, &event).await,
        Err(e) if e.is_rejection() => return reject(&e),
        Err(e) => unverified_report(e),
    };
    accept(report)
}

/// Reconciles the event, converting a panic anywhere inside the engine into a failed report.
pub async fn reconcile_guarded<B, E, L>(api: &ReconciliationApi<B, E, L>, event: &PaymentEvent) -> ReconciliationReport
where
    B: ReconciliationDatabase,
    E: EmailSender,
    L: LabelGenerator,
{
    match AssertUnwindSafe(api.reconcile(event)).catch_unwind().await {
        Ok(report) => report,
        Err(panic) => {
            let msg = panic_message(panic.as_ref());
            error!(
                "🔄️ CRITICAL. Reconciliation of {} event {} panicked and requires manual review. {msg}",
                event.event_type(),
                event.id
            );
            ReconciliationReport::new(event.id.clone(), event.event_type(), Outcome::Failed)
                .with_error(format!("Reconciliation panicked: {msg}"))
        },
    }
}

/// The report for an authentic webhook that could not be turned into a payment event.
pub fn unverified_report(error: VerificationError) -> ReconciliationReport {
    match error {
        VerificationError::Malformed(msg) => {
            warn!("🔐️ Acknowledging a webhook whose body could not be decoded. {msg}");
            ReconciliationReport::ignored(UNKNOWN, UNKNOWN, format!("Undecodable payload: {msg}"))
        },
        VerificationError::UnknownEventType { event_id, event_type } => {
            warn!("🔐️ Acknowledging event {event_id} with unhandled type {event_type}.");
            let reason = format!("Unhandled event type {event_type}");
            ReconciliationReport::ignored(event_id, event_type, reason)
        },
        VerificationError::Ignored { event_id, event_type, reason } => {
            info!("🔐️ Acknowledging event {event_id} ({event_type}) without reconciling it. {reason}");
            ReconciliationReport::ignored(event_id, event_type, reason)
        },
        e @ VerificationError::InvalidSignature(_) => {
            // Callers filter rejections out before getting here, but never let one pass as accepted
            error!("🔐️ Signature failure reached the acknowledgment stage. {e}");
            ReconciliationReport::new(UNKNOWN, UNKNOWN, Outcome::Failed).with_error(e.to_string())
        },
    }
}

pub fn accept(report: ReconciliationReport) -> HttpResponse {
    HttpResponse::Ok().json(Acknowledgment { received: true, report })
}

pub fn reject(error: &VerificationError) -> HttpResponse {
    HttpResponse::BadRequest().json(Rejection { received: false, error: error.to_string() })
}
