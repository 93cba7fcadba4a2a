use actix_web::{
    body::to_bytes,
    http::{header::AUTHORIZATION, Method, StatusCode},
    test,
    test::TestRequest,
    web,
    App,
};
use chrono::Utc;
use hmac::{Hmac, Mac};
use payment_engine::{
    db_types::{Cents, NewOrder, NewOrderItem, NewReturnRequest, ReturnStatus, ShippingLabel},
    test_utils::{
        faults::FaultyStore,
        prepare_env::{prepare_test_env, random_db_path},
    },
    InventoryManagement,
    ReconciliationApi,
    ReconciliationDatabase,
    ReconciliationOptions,
    SqliteDatabase,
};
use serde_json::{json, Value};
use sha2::Sha256;
use storefront_common::Secret;

use super::mocks::{MockEmailService, MockLabelService};
use crate::{
    integrations::stripe::{EventVerifier, DEFAULT_TOLERANCE, SIGNATURE_HEADER},
    middleware::AdminKeyMiddlewareFactory,
    routes::{GenerateReturnLabelRoute, PaymentWebhookRoute, UpdateSettingRoute},
};

// DO NOT re-use these secrets anywhere.
pub const WEBHOOK_SECRET: &str = "whsec_endpoint_tests_only";
pub const ADMIN_KEY: &str = "endpoint-tests-admin-key";

/// The engine over the test database. Faults can be injected through `api.db().set_fault(..)`.
pub type TestApi = ReconciliationApi<FaultyStore, MockEmailService, MockLabelService>;

/// A fresh database with order 1001 (unpaid, 2x tee-m and a pre-sale hoodie-l) and some stock.
pub async fn prepare_database() -> SqliteDatabase {
    let url = random_db_path();
    prepare_test_env(&url).await;
    let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error connecting to test database");
    db.upsert_variant_stock(&"tee-m".into(), 10, 0).await.expect("Error setting stock");
    db.upsert_variant_stock(&"hoodie-l".into(), 0, 4).await.expect("Error setting stock");
    let order = NewOrder::new("1001".into(), "alice@example.com".into())
        .with_checkout_session("cs_1001")
        .with_item(NewOrderItem::new("tee-m", 2, Cents::from(2500)))
        .with_item(NewOrderItem::new("hoodie-l", 1, Cents::from(6000)).presale());
    db.insert_order(order).await.expect("Error inserting order");
    db
}

/// Adds return ret-1 for order 1001, returning one tee-m.
pub async fn add_return(db: &SqliteDatabase, status: ReturnStatus) {
    let request = NewReturnRequest::new("ret-1".into(), "1001".into(), "alice@example.com".into())
        .with_status(status)
        .with_item("tee-m", 1);
    db.insert_return_request(request).await.expect("Error inserting return request");
}

pub fn test_api(db: SqliteDatabase, email: MockEmailService, labels: MockLabelService) -> web::Data<TestApi> {
    let store = FaultyStore::new(db);
    web::Data::new(ReconciliationApi::new(store, email, labels, ReconciliationOptions::default()))
}

pub fn test_label() -> ShippingLabel {
    ShippingLabel {
        label_url: "https://labels.example.com/ret-1.pdf".into(),
        tracking_number: "3SRET1".into(),
        tracking_url: Some("https://track.example.com/3SRET1".into()),
        parcel_id: "981".into(),
    }
}

pub fn event_body(id: &str, event_type: &str, object: Value) -> String {
    json!({"id": id, "type": event_type, "created": Utc::now().timestamp(), "data": {"object": object}}).to_string()
}

/// A signature header for `body`, signed with `secret` just now.
pub fn sign_with(secret: &str, body: &str) -> String {
    let ts = Utc::now().timestamp();
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("Invalid key");
    mac.update(format!("{ts}.{body}").as_bytes());
    format!("t={ts},v1={}", hex::encode(mac.finalize().into_bytes()))
}

pub fn sign(body: &str) -> String {
    sign_with(WEBHOOK_SECRET, body)
}

pub async fn post_webhook(api: &web::Data<TestApi>, body: &str, signature: Option<&str>) -> (StatusCode, Value) {
    let verifier = EventVerifier::new(Secret::new(WEBHOOK_SECRET.to_string()), DEFAULT_TOLERANCE);
    let app = App::new().app_data(api.clone()).app_data(web::Data::new(verifier)).service(
        web::scope("/webhook").service(PaymentWebhookRoute::<FaultyStore, MockEmailService, MockLabelService>::new()),
    );
    let service = test::init_service(app).await;
    let mut req = TestRequest::post().uri("/webhook/payments").set_payload(body.to_string());
    if let Some(signature) = signature {
        req = req.insert_header((SIGNATURE_HEADER, signature));
    }
    let res = test::call_service(&service, req.to_request()).await;
    let status = res.status();
    let body: Value = test::read_body_json(res).await;
    (status, body)
}

pub async fn admin_request(
    api: &web::Data<TestApi>,
    method: Method,
    path: &str,
    key: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, String) {
    let admin_scope = web::scope("/admin")
        .wrap(AdminKeyMiddlewareFactory::new(Secret::new(ADMIN_KEY.to_string())))
        .service(GenerateReturnLabelRoute::<FaultyStore, MockEmailService, MockLabelService>::new())
        .service(UpdateSettingRoute::<FaultyStore, MockEmailService, MockLabelService>::new());
    let app = App::new().app_data(api.clone()).service(admin_scope);
    let service = test::init_service(app).await;
    let mut req = TestRequest::default().method(method).uri(path);
    if let Some(key) = key {
        req = req.insert_header((AUTHORIZATION, format!("Bearer {key}")));
    }
    if let Some(body) = body {
        req = req.set_json(body);
    }
    match test::try_call_service(&service, req.to_request()).await {
        Ok(res) => {
            let status = res.status();
            let body = test::read_body(res).await;
            (status, String::from_utf8_lossy(&body).into_owned())
        },
        Err(e) => {
            let res = e.error_response();
            let status = res.status();
            let body = to_bytes(res.into_body()).await.unwrap_or_default();
            (status, String::from_utf8_lossy(&body).into_owned())
        },
    }
}
