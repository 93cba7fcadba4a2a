use actix_web::http::StatusCode;
use payment_engine::{
    db_types::{OrderId, PaymentStatus, ReturnId, ReturnStatus, VariantId},
    test_utils::faults::StoreFault,
    EmailKind,
    EmailReceipt,
    EventLedger,
    InventoryManagement,
    NotificationError,
    OrderManagement,
    ReturnManagement,
    SqliteDatabase,
};
use serde_json::{json, Value};

use super::{
    helpers::{add_return, event_body, post_webhook, prepare_database, sign, sign_with, test_api},
    mocks::{MockEmailService, MockLabelService},
};

fn order_payment(event_id: &str) -> String {
    event_body(
        event_id,
        "payment_intent.succeeded",
        json!({
            "id": "pi_1001",
            "amount": 11000,
            "currency": "eur",
            "payment_method_types": ["card"],
            "metadata": {"order_id": "1001"}
        }),
    )
}

fn label_payment(event_id: &str) -> String {
    event_body(
        event_id,
        "checkout.session.completed",
        json!({
            "id": "cs_label_1",
            "payment_intent": "pi_label_1",
            "payment_status": "paid",
            "customer_details": {"email": "alice@example.com"},
            "metadata": {"return_id": "ret-1", "type": "return_label"}
        }),
    )
}

async fn stock(db: &SqliteDatabase, variant: &str) -> (i64, i64) {
    let stock = db.fetch_variant_stock(&VariantId::from(variant)).await.unwrap().unwrap();
    (stock.stock_quantity, stock.presale_stock_quantity)
}

async fn payment_status(db: &SqliteDatabase) -> PaymentStatus {
    db.fetch_order_by_order_id(&OrderId::from("1001")).await.unwrap().unwrap().payment_status
}

#[actix_web::test]
async fn invalid_signature_is_rejected() {
    let db = prepare_database().await;
    let api = test_api(db.clone(), MockEmailService::new(), MockLabelService::new());
    let body = order_payment("evt_forged");

    let (status, res) = post_webhook(&api, &body, Some(&sign_with("whsec_someone_else", &body))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(res["received"], json!(false));
    assert_eq!(res["error"], json!("Invalid webhook signature. Signature mismatch"));

    let (status, _) = post_webhook(&api, &body, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert_eq!(payment_status(&db).await, PaymentStatus::Unpaid);
    assert_eq!(stock(&db, "tee-m").await, (10, 0));
}

#[actix_web::test]
async fn payment_is_applied_once() {
    let db = prepare_database().await;
    let mut email = MockEmailService::new();
    email
        .expect_send_email()
        .withf(|kind, recipient, context| {
            *kind == EmailKind::OrderConfirmation &&
                recipient == "alice@example.com" &&
                context["store_name"].is_string()
        })
        .times(1)
        .returning(|_, _, _| Ok(EmailReceipt { message_id: Some("msg_1".into()) }));
    let api = test_api(db.clone(), email, MockLabelService::new());
    let body = order_payment("evt_paid");

    let (status, res) = post_webhook(&api, &body, Some(&sign(&body))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(res["received"], json!(true));
    assert_eq!(res["event_id"], json!("evt_paid"));
    assert_eq!(res["event_type"], json!("payment_succeeded"));
    assert_eq!(res["outcome"], json!("applied"));
    assert_eq!(res["aggregate"], json!("order #1001"));
    assert_eq!(res["correlation"], json!("metadata"));
    assert!(res.get("warnings").is_none(), "Unexpected warnings: {res}");
    assert_eq!(payment_status(&db).await, PaymentStatus::Paid);
    assert_eq!(stock(&db, "tee-m").await, (8, 0));
    assert_eq!(stock(&db, "hoodie-l").await, (0, 3));

    // The provider redelivers the same event
    let (status, res) = post_webhook(&api, &body, Some(&sign(&body))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(res["outcome"], json!("duplicate"));
    assert_eq!(res["aggregate"], json!("order #1001"));
    assert_eq!(stock(&db, "tee-m").await, (8, 0));
    assert_eq!(stock(&db, "hoodie-l").await, (0, 3));
}

#[actix_web::test]
async fn email_failure_is_acknowledged() {
    let db = prepare_database().await;
    let mut email = MockEmailService::new();
    email
        .expect_send_email()
        .times(1)
        .returning(|_, _, _| Err(NotificationError::EmailUnavailable("connection refused".into())));
    let api = test_api(db.clone(), email, MockLabelService::new());
    let body = order_payment("evt_paid_no_email");

    let (status, res) = post_webhook(&api, &body, Some(&sign(&body))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(res["outcome"], json!("applied"));
    let warnings = res["warnings"].as_array().expect("Expected warnings");
    assert!(warnings.iter().any(|w| w.as_str().unwrap_or_default().contains("connection refused")));
    assert_eq!(payment_status(&db).await, PaymentStatus::Paid);
}

#[actix_web::test]
async fn unmatched_event_is_acknowledged() {
    let db = prepare_database().await;
    let api = test_api(db.clone(), MockEmailService::new(), MockLabelService::new());
    let body = event_body(
        "evt_stranger",
        "payment_intent.succeeded",
        json!({"id": "pi_9999", "receipt_email": "mallory@example.com", "metadata": {"order_id": "9999"}}),
    );

    let (status, res) = post_webhook(&api, &body, Some(&sign(&body))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(res["received"], json!(true));
    assert_eq!(res["outcome"], json!("unmatched"));
    let warnings = res["warnings"].as_array().cloned().unwrap_or_default();
    assert!(warnings.iter().filter_map(Value::as_str).any(|w| w.contains("evt_stranger")), "{res}");
    assert_eq!(payment_status(&db).await, PaymentStatus::Unpaid);
    assert_eq!(stock(&db, "tee-m").await, (10, 0));
}

#[actix_web::test]
async fn undecodable_events_are_acknowledged() {
    let db = prepare_database().await;
    let api = test_api(db.clone(), MockEmailService::new(), MockLabelService::new());

    let body = event_body("evt_customer", "customer.created", json!({"id": "cus_1"}));
    let (status, res) = post_webhook(&api, &body, Some(&sign(&body))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(res["outcome"], json!("ignored"));
    assert_eq!(res["event_id"], json!("evt_customer"));

    let body = r#"{"id": "evt_broken", "type": "payment_intent.succeeded""#;
    let (status, res) = post_webhook(&api, body, Some(&sign(body))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(res["received"], json!(true));
    assert_eq!(res["outcome"], json!("ignored"));

    let body = event_body("evt_unpaid", "checkout.session.completed", json!({"id": "cs_1001", "payment_status": "unpaid"}));
    let (status, res) = post_webhook(&api, &body, Some(&sign(&body))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(res["outcome"], json!("ignored"));
    assert_eq!(payment_status(&db).await, PaymentStatus::Unpaid);
}

#[actix_web::test]
async fn label_failure_is_acknowledged() {
    let db = prepare_database().await;
    add_return(&db, ReturnStatus::ReturnLabelPaymentPending).await;
    let mut email = MockEmailService::new();
    email
        .expect_send_email()
        .withf(|kind, _, _| *kind == EmailKind::LabelPaymentConfirmation)
        .returning(|_, _, _| Ok(EmailReceipt::default()));
    let mut labels = MockLabelService::new();
    labels
        .expect_create_label()
        .times(1)
        .returning(|_, _, _| Err(NotificationError::LabelFailed("courier is down".into())));
    let api = test_api(db.clone(), email, labels);
    let body = label_payment("evt_label_paid");

    let (status, res) = post_webhook(&api, &body, Some(&sign(&body))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(res["received"], json!(true));
    assert_eq!(res["aggregate"], json!("return R#ret-1"));
    let warnings = res["warnings"].as_array().cloned().unwrap_or_default();
    assert!(
        warnings.iter().filter_map(Value::as_str).any(|w| w.contains("ret-1") && w.contains("courier is down")),
        "Expected a label warning referencing the return: {res}"
    );
    let request = db.fetch_return_by_return_id(&ReturnId::from("ret-1")).await.unwrap().unwrap();
    assert_eq!(request.status, ReturnStatus::ReturnLabelPaymentCompleted);
    assert!(request.label_url.is_none());
    assert!(request.last_label_error.as_deref().is_some_and(|e| e.contains("courier is down")));
    assert!(request.label_attempted_at.is_none());
}

#[actix_web::test]
async fn store_failure_is_acknowledged() {
    let db = prepare_database().await;
    let mut email = MockEmailService::new();
    email.expect_send_email().times(1).returning(|_, _, _| Ok(EmailReceipt::default()));
    let api = test_api(db.clone(), email, MockLabelService::new());
    let body = order_payment("evt_disk_full");

    api.db().set_fault(Some(StoreFault::Error));
    let (status, res) = post_webhook(&api, &body, Some(&sign(&body))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(res["received"], json!(true));
    assert_eq!(res["outcome"], json!("failed"));
    assert_eq!(res["aggregate"], json!("order #1001"));
    assert!(res["error"].as_str().is_some_and(|e| e.contains("disk I/O error")), "{res}");
    assert_eq!(payment_status(&db).await, PaymentStatus::Unpaid);
    assert_eq!(stock(&db, "tee-m").await, (10, 0));
    assert!(db.fetch_processed_event("evt_disk_full").await.unwrap().is_none());

    // Once the store is back, the provider's retry goes through
    api.db().set_fault(None);
    let (status, res) = post_webhook(&api, &body, Some(&sign(&body))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(res["outcome"], json!("applied"));
    assert_eq!(payment_status(&db).await, PaymentStatus::Paid);
    assert_eq!(stock(&db, "tee-m").await, (8, 0));
    assert!(db.fetch_processed_event("evt_disk_full").await.unwrap().is_some());
}

#[actix_web::test]
async fn panic_during_reconciliation_is_acknowledged() {
    let db = prepare_database().await;
    let api = test_api(db.clone(), MockEmailService::new(), MockLabelService::new());
    let body = order_payment("evt_corrupt");

    api.db().set_fault(Some(StoreFault::Panic));
    let (status, res) = post_webhook(&api, &body, Some(&sign(&body))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(res["received"], json!(true));
    assert_eq!(res["event_id"], json!("evt_corrupt"));
    assert_eq!(res["outcome"], json!("failed"));
    assert!(res["error"].as_str().is_some_and(|e| e.contains("order store for #1001 is corrupt")), "{res}");
    assert_eq!(payment_status(&db).await, PaymentStatus::Unpaid);
    assert!(db.fetch_processed_event("evt_corrupt").await.unwrap().is_none());
}
