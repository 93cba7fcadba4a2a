use cucumber::{then, when};
use payment_engine::{
    db_types::{Cents, OrderId, ReturnId, VariantId},
    CorrelationMetadata,
    EmailKind,
    EventLedger,
    InventoryManagement,
    LabelOutcome,
    Outcome,
    OrderManagement,
    PaymentDetails,
    PaymentEvent,
    PaymentEventKind,
    RefundDetails,
    ReturnManagement,
};

use crate::cucumber::StorefrontWorld;

const PROVIDER: &str = "stripe";

//-------------------------------------------   Events   ---------------------------------------------------------------

#[when(expr = "event {word} reports payment {word} succeeded for checkout session {word}")]
async fn payment_succeeded_for_session(world: &mut StorefrontWorld, event_id: String, pay_ref: String, session: String) {
    let details = PaymentDetails::default().with_payment_ref(pay_ref).with_checkout_session(session);
    let kind = PaymentEventKind::PaymentSucceeded(card_payment(details));
    world.deliver(PaymentEvent::new(event_id, PROVIDER, kind)).await;
}

#[when(expr = "event {word} reports payment {word} succeeded for order {word}")]
async fn payment_succeeded_for_order(world: &mut StorefrontWorld, event_id: String, pay_ref: String, order_id: String) {
    let details =
        PaymentDetails::default().with_payment_ref(pay_ref).with_metadata(CorrelationMetadata::for_order(order_id));
    let kind = PaymentEventKind::PaymentSucceeded(card_payment(details));
    world.deliver(PaymentEvent::new(event_id, PROVIDER, kind)).await;
}

#[when(expr = "event {word} reports payment {word} succeeded for customer {string}")]
async fn payment_succeeded_for_customer(world: &mut StorefrontWorld, event_id: String, pay_ref: String, email: String) {
    let details = PaymentDetails::default().with_payment_ref(pay_ref).with_customer_email(email);
    let kind = PaymentEventKind::PaymentSucceeded(card_payment(details));
    world.deliver(PaymentEvent::new(event_id, PROVIDER, kind)).await;
}

#[when(expr = "event {word} reports payment {word} failed for checkout session {word} with reason {string}")]
async fn payment_failed(world: &mut StorefrontWorld, event_id: String, pay_ref: String, session: String, reason: String) {
    let details =
        PaymentDetails::default().with_payment_ref(pay_ref).with_checkout_session(session).with_failure_reason(reason);
    let kind = PaymentEventKind::PaymentFailed(details);
    world.deliver(PaymentEvent::new(event_id, PROVIDER, kind)).await;
}

#[when(expr = "event {word} reports checkout session {word} expired")]
async fn checkout_expired(world: &mut StorefrontWorld, event_id: String, session: String) {
    let details = PaymentDetails::default().with_checkout_session(session);
    let kind = PaymentEventKind::CheckoutExpired(details);
    world.deliver(PaymentEvent::new(event_id, PROVIDER, kind)).await;
}

#[when(expr = "event {word} reports label payment {word} succeeded for return {word}")]
async fn label_payment(world: &mut StorefrontWorld, event_id: String, pay_ref: String, return_id: String) {
    let details =
        PaymentDetails::default().with_payment_ref(pay_ref).with_metadata(CorrelationMetadata::for_return(return_id));
    let kind = PaymentEventKind::LabelPaymentSucceeded(details);
    world.deliver(PaymentEvent::new(event_id, PROVIDER, kind)).await;
}

#[when(expr = "event {word} reports label payment {word} succeeded for customer {string}")]
async fn label_payment_for_customer(world: &mut StorefrontWorld, event_id: String, pay_ref: String, email: String) {
    let details = PaymentDetails::default().with_payment_ref(pay_ref).with_customer_email(email);
    let kind = PaymentEventKind::LabelPaymentSucceeded(details);
    world.deliver(PaymentEvent::new(event_id, PROVIDER, kind)).await;
}

#[when(expr = "event {word} reports refund {word} of {int} cents for return {word}")]
async fn refund_for_return(world: &mut StorefrontWorld, event_id: String, refund: String, amount: i64, return_id: String) {
    let details = RefundDetails {
        refund_ref: Some(refund),
        amount_refunded: Some(Cents::from(amount)),
        refund_metadata: CorrelationMetadata::for_return(return_id),
        ..Default::default()
    };
    let kind = PaymentEventKind::ChargeRefunded(details);
    world.deliver(PaymentEvent::new(event_id, PROVIDER, kind)).await;
}

#[when(expr = "event {word} reports refund {word} of {int} cents for payment {word}")]
async fn refund_for_payment(world: &mut StorefrontWorld, event_id: String, refund: String, amount: i64, pay_ref: String) {
    let details = RefundDetails {
        refund_ref: Some(refund),
        payment_ref: Some(pay_ref),
        amount_refunded: Some(Cents::from(amount)),
        ..Default::default()
    };
    let kind = PaymentEventKind::ChargeRefunded(details);
    world.deliver(PaymentEvent::new(event_id, PROVIDER, kind)).await;
}

#[when(expr = "event {word} is delivered again")]
async fn redeliver(world: &mut StorefrontWorld, event_id: String) {
    let event = world.events.get(&event_id).cloned().expect("Event was never delivered");
    world.deliver(event).await;
}

#[when(expr = "event {word} reports payment {word} succeeded for checkout session {word} {int} times concurrently")]
async fn concurrent_delivery(world: &mut StorefrontWorld, event_id: String, pay_ref: String, session: String, n: usize) {
    let details = PaymentDetails::default().with_payment_ref(pay_ref).with_checkout_session(session);
    let event = PaymentEvent::new(event_id, PROVIDER, PaymentEventKind::PaymentSucceeded(card_payment(details)));
    let api = world.api();
    let deliveries = (0..n).map(|_| api.reconcile(&event));
    let reports = futures_util::future::join_all(deliveries).await;
    let applied = reports.iter().filter(|r| r.outcome == Outcome::Applied).count();
    assert_eq!(applied, 1, "Exactly one delivery should apply the event: {reports:?}");
    world.events.insert(event.id.clone(), event);
    world.last_report = reports.into_iter().last();
}

#[when(expr = "an administrator re-drives the label for return {word}")]
async fn redrive_label(world: &mut StorefrontWorld, return_id: String) {
    let result = world.api().generate_return_label(&ReturnId::from(return_id)).await;
    world.last_label_attempt = Some(result);
}

//-------------------------------------------   Reports   --------------------------------------------------------------

#[then(expr = "the outcome is {word}")]
async fn check_outcome(world: &mut StorefrontWorld, outcome: String) {
    assert_eq!(world.report().outcome.as_str(), outcome, "Unexpected outcome. Report: {:?}", world.report());
}

#[then(expr = "the event was correlated by tier {string}")]
async fn check_correlation_tier(world: &mut StorefrontWorld, tier: String) {
    let actual = world.report().correlation.map(|t| serde_json::to_value(t).unwrap());
    assert_eq!(actual, Some(serde_json::Value::String(tier)), "Report: {:?}", world.report());
}

#[then(expr = "the report has a warning containing {string}")]
async fn check_warning(world: &mut StorefrontWorld, text: String) {
    let report = world.report();
    assert!(report.warnings.iter().any(|w| w.contains(&text)), "No warning contains '{text}': {:?}", report.warnings);
}

#[then(expr = "the report has an error containing {string}")]
async fn check_error(world: &mut StorefrontWorld, text: String) {
    let error = world.report().error.as_deref().unwrap_or_default();
    assert!(error.contains(&text), "Report error '{error}' does not contain '{text}'");
}

#[then("the report has no warnings")]
async fn check_no_warnings(world: &mut StorefrontWorld) {
    assert!(world.report().warnings.is_empty(), "Unexpected warnings: {:?}", world.report().warnings);
}

#[then(expr = "the label re-drive result is {word}")]
async fn check_label_attempt(world: &mut StorefrontWorld, result: String) {
    let attempt = world.last_label_attempt.as_ref().expect("No label re-drive was requested");
    match (attempt, result.as_str()) {
        (Ok(a), "generated") => assert!(matches!(a.outcome, LabelOutcome::Generated { .. }), "{a:?}"),
        (Ok(a), "already_generated") => assert!(matches!(a.outcome, LabelOutcome::AlreadyGenerated), "{a:?}"),
        (Ok(a), "failed") => assert!(a.is_failure(), "{a:?}"),
        (Err(e), "rejected") => assert!(e.to_string().contains("cannot be generated"), "{e}"),
        (other, _) => panic!("Unexpected label re-drive result {other:?}, expected {result}"),
    }
}

//-------------------------------------------   Aggregates   -----------------------------------------------------------

#[then(expr = "order {word} has payment status {word}")]
async fn check_payment_status(world: &mut StorefrontWorld, order_id: String, status: String) {
    let order = world.db().fetch_order_by_order_id(&OrderId::from(order_id)).await.unwrap().expect("Order not found");
    assert_eq!(order.payment_status.to_string(), status);
}

#[then(expr = "order {word} has status {word}")]
async fn check_order_status(world: &mut StorefrontWorld, order_id: String, status: String) {
    let order = world.db().fetch_order_by_order_id(&OrderId::from(order_id)).await.unwrap().expect("Order not found");
    assert_eq!(order.status.to_string(), status);
}

#[then(expr = "order {word} has payment reference {word}")]
async fn check_payment_ref(world: &mut StorefrontWorld, order_id: String, payment_ref: String) {
    let order = world.db().fetch_order_by_order_id(&OrderId::from(order_id)).await.unwrap().expect("Order not found");
    assert_eq!(order.payment_ref, Some(payment_ref));
}

#[then(expr = "order {word} has failure reason {string}")]
async fn check_failure_reason(world: &mut StorefrontWorld, order_id: String, reason: String) {
    let order = world.db().fetch_order_by_order_id(&OrderId::from(order_id)).await.unwrap().expect("Order not found");
    assert_eq!(order.failure_reason, Some(reason));
}

#[then(expr = "return {word} has status {word}")]
async fn check_return_status(world: &mut StorefrontWorld, return_id: String, status: String) {
    let id = ReturnId::from(return_id);
    let request = world.db().fetch_return_by_return_id(&id).await.unwrap().expect("Return not found");
    assert_eq!(request.status.to_string(), status);
}

#[then(expr = "return {word} has a shipping label")]
async fn check_has_label(world: &mut StorefrontWorld, return_id: String) {
    let id = ReturnId::from(return_id);
    let request = world.db().fetch_return_by_return_id(&id).await.unwrap().expect("Return not found");
    assert!(request.has_label(), "Return {id} has no label");
    assert!(request.tracking_number.is_some());
    assert!(request.label_generated_at.is_some());
}

#[then(expr = "return {word} has no shipping label")]
async fn check_has_no_label(world: &mut StorefrontWorld, return_id: String) {
    let id = ReturnId::from(return_id);
    let request = world.db().fetch_return_by_return_id(&id).await.unwrap().expect("Return not found");
    assert!(!request.has_label(), "Return {id} has a label");
}

#[then(expr = "return {word} records a label error")]
async fn check_label_error(world: &mut StorefrontWorld, return_id: String) {
    let id = ReturnId::from(return_id);
    let request = world.db().fetch_return_by_return_id(&id).await.unwrap().expect("Return not found");
    assert!(request.last_label_error.is_some(), "No label error recorded on return {id}");
    assert!(request.label_attempted_at.is_none(), "The label claim on return {id} was not released");
}

#[then(expr = "variant {word} has {int} in stock and {int} on presale")]
async fn check_stock(world: &mut StorefrontWorld, variant: String, regular: i64, presale: i64) {
    let stock = world.db().fetch_variant_stock(&VariantId::from(variant)).await.unwrap().expect("Variant not found");
    assert_eq!(stock.stock_quantity, regular, "Regular stock");
    assert_eq!(stock.presale_stock_quantity, presale, "Presale stock");
}

#[then(expr = "event {word} is in the ledger")]
async fn check_in_ledger(world: &mut StorefrontWorld, event_id: String) {
    let entry = world.db().fetch_processed_event(&event_id).await.unwrap();
    assert!(entry.is_some(), "Event {event_id} was not recorded");
}

#[then(expr = "event {word} is not in the ledger")]
async fn check_not_in_ledger(world: &mut StorefrontWorld, event_id: String) {
    let entry = world.db().fetch_processed_event(&event_id).await.unwrap();
    assert!(entry.is_none(), "Event {event_id} was recorded");
}

//-------------------------------------------   Collaborators   --------------------------------------------------------

#[then(expr = "{int} {word} email(s) was/were sent to {string}")]
async fn check_emails(world: &mut StorefrontWorld, count: usize, template: String, recipient: String) {
    let kind = email_kind(&template);
    let sent = world.system().emails.sent_of_kind(kind);
    let to_recipient = sent.iter().filter(|e| e.recipient == recipient).count();
    assert_eq!(to_recipient, count, "Emails sent: {sent:?}");
}

#[then(expr = "the {word} email mentions {string}")]
async fn check_email_context(world: &mut StorefrontWorld, template: String, text: String) {
    let sent = world.system().emails.sent_of_kind(email_kind(&template));
    let email = sent.last().expect("No such email was sent");
    assert!(email.context.to_string().contains(&text), "Email context: {}", email.context);
}

#[then(expr = "the label service was called {int} time(s)")]
async fn check_label_calls(world: &mut StorefrontWorld, calls: usize) {
    assert_eq!(world.system().labels.calls(), calls);
}

fn email_kind(template: &str) -> EmailKind {
    match template {
        "order_confirmation" => EmailKind::OrderConfirmation,
        "label_payment_confirmation" => EmailKind::LabelPaymentConfirmation,
        "return_label_ready" => EmailKind::ReturnLabelReady,
        "refund_processed" => EmailKind::RefundProcessed,
        _ => panic!("Unknown email template {template}"),
    }
}

fn card_payment(details: PaymentDetails) -> PaymentDetails {
    PaymentDetails { payment_method: Some("card".into()), currency: Some("eur".into()), ..details }
}
