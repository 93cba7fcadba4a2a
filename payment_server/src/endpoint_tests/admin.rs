use actix_web::http::{Method, StatusCode};
use payment_engine::{
    db_types::{ReturnId, ReturnStatus},
    EmailKind,
    EmailReceipt,
    ReturnManagement,
};
use serde_json::{json, Value};

use super::{
    helpers::{add_return, admin_request, prepare_database, test_api, test_label, ADMIN_KEY},
    mocks::{MockEmailService, MockLabelService},
};

const LABEL_PATH: &str = "/admin/returns/ret-1/label";

#[actix_web::test]
async fn admin_routes_need_the_api_key() {
    let db = prepare_database().await;
    let api = test_api(db, MockEmailService::new(), MockLabelService::new());

    let (status, body) = admin_request(&api, Method::POST, LABEL_PATH, None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, r#"{"error":"Authentication Error. No API key was provided."}"#);

    let (status, _) = admin_request(&api, Method::POST, LABEL_PATH, Some("guess"), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let update = Some(json!({"value": "Hacked"}));
    let (status, _) = admin_request(&api, Method::PUT, "/admin/settings/store_name", Some("guess"), update).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(api.settings().store_name().await, "Storefront");
}

#[actix_web::test]
async fn update_settings() {
    let db = prepare_database().await;
    let api = test_api(db, MockEmailService::new(), MockLabelService::new());
    // Warm the cache, so that the update has to invalidate it
    assert_eq!(api.settings().store_name().await, "Storefront");

    let update = Some(json!({"value": "Acme Apparel"}));
    let (status, body) = admin_request(&api, Method::PUT, "/admin/settings/store_name", Some(ADMIN_KEY), update).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(api.settings().store_name().await, "Acme Apparel");

    let update = Some(json!({"value": "a few"}));
    let path = "/admin/settings/low_stock_threshold";
    let (status, _) = admin_request(&api, Method::PUT, path, Some(ADMIN_KEY), update).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(api.settings().low_stock_threshold().await, 5);
}

#[actix_web::test]
async fn label_redrive_for_unknown_or_unready_returns() {
    let db = prepare_database().await;
    let api = test_api(db.clone(), MockEmailService::new(), MockLabelService::new());

    let (status, _) = admin_request(&api, Method::POST, LABEL_PATH, Some(ADMIN_KEY), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    add_return(&db, ReturnStatus::ReturnLabelPaymentPending).await;
    let (status, body) = admin_request(&api, Method::POST, LABEL_PATH, Some(ADMIN_KEY), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body.contains("cannot be generated"), "{body}");
}

#[actix_web::test]
async fn label_redrive_for_a_stuck_return() {
    let db = prepare_database().await;
    add_return(&db, ReturnStatus::ReturnLabelPaymentCompleted).await;
    let mut email = MockEmailService::new();
    email
        .expect_send_email()
        .withf(|kind, recipient, context| {
            *kind == EmailKind::ReturnLabelReady &&
                recipient == "alice@example.com" &&
                context["tracking_number"] == json!("3SRET1")
        })
        .times(1)
        .returning(|_, _, _| Ok(EmailReceipt::default()));
    let mut labels = MockLabelService::new();
    labels.expect_create_label().times(1).returning(|_, _, _| Ok(test_label()));
    let api = test_api(db.clone(), email, labels);

    let (status, body) = admin_request(&api, Method::POST, LABEL_PATH, Some(ADMIN_KEY), None).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let attempt: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(attempt["result"], json!("generated"));
    assert_eq!(attempt["label"]["tracking_number"], json!("3SRET1"));
    let request = db.fetch_return_by_return_id(&ReturnId::from("ret-1")).await.unwrap().unwrap();
    assert_eq!(request.status, ReturnStatus::ReturnLabelGenerated);
    assert_eq!(request.parcel_id.as_deref(), Some("981"));

    // A second re-drive must not buy a second label
    let (status, body) = admin_request(&api, Method::POST, LABEL_PATH, Some(ADMIN_KEY), None).await;
    assert_eq!(status, StatusCode::OK);
    let attempt: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(attempt["result"], json!("already_generated"));
}
