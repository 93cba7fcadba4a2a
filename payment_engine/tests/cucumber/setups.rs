use cucumber::given;
use payment_engine::{
    db_types::{Cents, NewOrder, NewOrderItem, NewReturnRequest, OrderId, ReturnId, ReturnStatus, VariantId},
    test_utils::faults::StoreFault,
    InventoryManagement,
    OrderManagement,
    ReconciliationDatabase,
    ReconciliationOptions,
};

use crate::cucumber::{storefront_world::StorefrontSystem, StorefrontWorld};

#[given("a fresh install")]
async fn fresh_database(world: &mut StorefrontWorld) {
    let system = StorefrontSystem::new(ReconciliationOptions::default()).await;
    world.system = Some(system);
}

#[given("a fresh install without contact fallback")]
async fn fresh_database_strict(world: &mut StorefrontWorld) {
    let options = ReconciliationOptions { contact_fallback: false, ..Default::default() };
    let system = StorefrontSystem::new(options).await;
    world.system = Some(system);
}

#[given("the label service is failing")]
async fn label_service_failing(world: &mut StorefrontWorld) {
    world.system().labels.set_failing(true);
}

#[given("the label service has recovered")]
async fn label_service_recovered(world: &mut StorefrontWorld) {
    world.system().labels.set_failing(false);
}

#[given("the store rejects order updates")]
async fn store_rejects_updates(world: &mut StorefrontWorld) {
    world.db().set_fault(Some(StoreFault::Error));
}

#[given("the store has recovered")]
async fn store_recovered(world: &mut StorefrontWorld) {
    world.db().set_fault(None);
}

#[given("the email service is failing")]
async fn email_service_failing(world: &mut StorefrontWorld) {
    world.system().emails.set_failing(true);
}

#[given(expr = "variant {word} has {int} in stock and {int} on presale")]
async fn stock_levels(world: &mut StorefrontWorld, variant: String, regular: i64, presale: i64) {
    let variant = VariantId::from(variant);
    world.db().upsert_variant_stock(&variant, regular, presale).await.expect("Error setting stock level");
}

/// Items are written as `2 tee-m@2500; 1 hoodie-l@6000 presale`
#[given(expr = "an unpaid order {word} for {string} with checkout session {word} containing {string}")]
async fn unpaid_order(world: &mut StorefrontWorld, order_id: String, email: String, session: String, items: String) {
    let mut order = NewOrder::new(OrderId::from(order_id), email).with_checkout_session(session);
    for item in parse_order_items(&items) {
        order = order.with_item(item);
    }
    let (_, inserted) = world.db().insert_order(order).await.expect("Error inserting order");
    assert!(inserted, "Order already existed");
}

#[given(expr = "a return {word} for order {word} in status {word} containing {string}")]
async fn return_request(world: &mut StorefrontWorld, return_id: String, order_id: String, status: String, items: String) {
    let order_id = OrderId::from(order_id);
    let order = world.db().fetch_order_by_order_id(&order_id).await.expect("Error fetching order");
    let order = order.expect("The order for the return does not exist");
    let status = status.parse::<ReturnStatus>().expect("Invalid return status");
    let mut request =
        NewReturnRequest::new(ReturnId::from(return_id), order_id, order.customer_email).with_status(status);
    for item in items.split(';').map(str::trim).filter(|s| !s.is_empty()) {
        let (qty, variant) = item.split_once(' ').expect("Return items look like `1 tee-m`");
        request = request.with_item(variant.trim(), qty.parse::<i64>().expect("Invalid quantity"));
    }
    let (_, inserted) = world.db().insert_return_request(request).await.expect("Error inserting return request");
    assert!(inserted, "Return request already existed");
}

fn parse_order_items(items: &str) -> Vec<NewOrderItem> {
    items
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|item| {
            let mut parts = item.split_whitespace();
            let qty = parts.next().and_then(|q| q.parse::<i64>().ok()).expect("Missing quantity");
            let (variant, price) = parts.next().and_then(|p| p.split_once('@')).expect("Items look like `2 tee-m@2500`");
            let price = price.parse::<i64>().map(Cents::from).expect("Invalid price");
            let item = NewOrderItem::new(variant, qty, price);
            match parts.next() {
                Some("presale") => item.presale(),
                _ => item,
            }
        })
        .collect()
}
