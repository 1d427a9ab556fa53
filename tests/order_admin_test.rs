mod common;

use common::{pickup_checkout, TestApp};
use stocksmart_api::{
    entities::order::OrderStatus,
    errors::ServiceError,
    services::{NewCredentials, PaymentOutcome},
};

async fn paid_order(app: &TestApp) -> String {
    let product = app.seed_product("Generador", 250_000, 0, 4).await;
    let order = app
        .state
        .services
        .checkout
        .buy_now(product.id, 1, pickup_checkout("compra@example.cl"))
        .await
        .unwrap();
    app.state
        .services
        .payments
        .start_payment(&order.order_number)
        .await
        .unwrap();
    app.gateway.set_outcome(PaymentOutcome::Confirmed).await;
    app.state
        .services
        .reconciliation
        .confirm(&app.gateway.token)
        .await
        .unwrap();
    order.order_number
}

#[tokio::test]
async fn fulfillment_advances_through_shipped_to_delivered() {
    let app = TestApp::new().await;
    let number = paid_order(&app).await;
    let orders = &app.state.services.orders;

    let shipped = orders
        .advance_status(&number, OrderStatus::Shipped, Some("OCA 123".to_string()))
        .await
        .unwrap();
    assert_eq!(shipped.status, OrderStatus::Shipped);

    let delivered = orders
        .advance_status(&number, OrderStatus::Delivered, None)
        .await
        .unwrap();
    assert_eq!(delivered.status, OrderStatus::Delivered);

    let detail = orders.get_by_number(&number).await.unwrap();
    // Placement, payment, shipped, delivered: one row per transition.
    assert_eq!(detail.tracking.len(), 4);
    assert_eq!(detail.tracking[0].status, OrderStatus::Delivered);
}

#[tokio::test]
async fn paid_orders_cannot_skip_or_cancel() {
    let app = TestApp::new().await;
    let number = paid_order(&app).await;
    let orders = &app.state.services.orders;

    let err = orders
        .advance_status(&number, OrderStatus::Delivered, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidStatusTransition(_)));

    let err = orders.cancel(&number, None).await.unwrap_err();
    assert!(matches!(err, ServiceError::InvalidStatusTransition(_)));
}

#[tokio::test]
async fn manually_confirmed_transfer_commits_stock() {
    use sea_orm::EntityTrait;
    use stocksmart_api::entities::{order::PaymentMethod, Product};

    let app = TestApp::new().await;
    let product = app.seed_product("Andamio", 120_000, 0, 6).await;
    let mut input = pickup_checkout("transfer@example.cl");
    input.payment_method = PaymentMethod::Transfer;

    let order = app
        .state
        .services
        .checkout
        .buy_now(product.id, 2, input)
        .await
        .unwrap();

    app.state
        .services
        .orders
        .advance_status(&order.order_number, OrderStatus::Paid, Some("transferencia recibida".to_string()))
        .await
        .unwrap();

    let product = Product::find_by_id(product.id)
        .one(app.state.db.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(product.stock, 4);
}

#[tokio::test]
async fn pending_orders_can_be_cancelled() {
    let app = TestApp::new().await;
    let product = app.seed_product("Pala", 7_990, 0, 9).await;
    let order = app
        .state
        .services
        .checkout
        .buy_now(product.id, 1, pickup_checkout("compra@example.cl"))
        .await
        .unwrap();

    let cancelled = app
        .state
        .services
        .orders
        .cancel(&order.order_number, Some("customer request".to_string()))
        .await
        .unwrap();
    assert_eq!(cancelled.status, OrderStatus::Cancelled);
}

#[tokio::test]
async fn activating_credentials_keeps_a_single_active_set() {
    let app = TestApp::new().await;
    let credentials = &app.state.services.credentials;

    let first = credentials
        .create(NewCredentials {
            label: "sandbox".to_string(),
            api_key: "key-1".to_string(),
            secret_key: "secret-1".to_string(),
            sandbox: true,
            activate: true,
        })
        .await
        .unwrap();
    let second = credentials
        .create(NewCredentials {
            label: "production".to_string(),
            api_key: "key-2".to_string(),
            secret_key: "secret-2".to_string(),
            sandbox: false,
            activate: false,
        })
        .await
        .unwrap();
    assert!(first.is_active);
    assert!(!second.is_active);

    credentials.activate(second.id).await.unwrap();

    let all = credentials.list().await.unwrap();
    let active: Vec<_> = all.iter().filter(|c| c.is_active).collect();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, second.id);
}

#[tokio::test]
async fn stale_guest_carts_are_swept() {
    use chrono::{Duration, Utc};
    use sea_orm::{ActiveModelTrait, Set};
    use stocksmart_api::entities::cart;
    use uuid::Uuid;

    let app = TestApp::new().await;

    let stale = cart::ActiveModel {
        id: Set(Uuid::new_v4()),
        customer_id: Set(None),
        visitor_id: Set(Some("v-old".to_string())),
        is_guest: Set(true),
        is_active: Set(true),
        created_at: Set(Utc::now() - Duration::days(45)),
        updated_at: Set(Utc::now() - Duration::days(45)),
    };
    stale.insert(app.state.db.as_ref()).await.unwrap();

    let fresh = app
        .state
        .services
        .carts
        .active_cart_for(stocksmart_api::services::CartOwner::Visitor("v-new".to_string()))
        .await
        .unwrap();

    let swept = app
        .state
        .services
        .carts
        .sweep_stale_guest_carts(30)
        .await
        .unwrap();
    assert_eq!(swept, 1);

    let still_active = app
        .state
        .services
        .carts
        .active_cart_for(stocksmart_api::services::CartOwner::Visitor("v-new".to_string()))
        .await
        .unwrap();
    assert_eq!(still_active.id, fresh.id);
}
