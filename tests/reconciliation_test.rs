mod common;

use common::{pickup_checkout, TestApp};
use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use stocksmart_api::{
    entities::{order::OrderStatus, product, Product},
    errors::ServiceError,
    services::{CartOwner, PaymentOutcome},
};

async fn placed_paid_flow_order(app: &TestApp, stock: i32, quantity: i32) -> (String, uuid::Uuid) {
    let product = app.seed_product("Taladro", 10_000, 0, stock).await;
    let carts = &app.state.services.carts;
    let cart = carts
        .active_cart_for(CartOwner::Visitor("v-pay".to_string()))
        .await
        .unwrap();
    carts.add_item(cart.id, product.id, quantity).await.unwrap();

    let order = app
        .state
        .services
        .checkout
        .place_order(cart.id, pickup_checkout("pago@example.cl"))
        .await
        .unwrap();
    app.state
        .services
        .payments
        .start_payment(&order.order_number)
        .await
        .unwrap();
    (order.order_number, product.id)
}

#[tokio::test]
async fn confirmed_payment_marks_paid_and_commits_stock() {
    let app = TestApp::new().await;
    let (order_number, product_id) = placed_paid_flow_order(&app, 5, 2).await;
    app.gateway.set_outcome(PaymentOutcome::Confirmed).await;

    let outcome = app
        .state
        .services
        .reconciliation
        .confirm(&app.gateway.token)
        .await
        .unwrap();
    assert!(outcome.applied);
    assert_eq!(outcome.order.status, OrderStatus::Paid);

    let product = Product::find_by_id(product_id)
        .one(app.state.db.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(product.stock, 3);

    let detail = app
        .state
        .services
        .orders
        .get_by_number(&order_number)
        .await
        .unwrap();
    let paid_rows = detail
        .tracking
        .iter()
        .filter(|t| t.status == OrderStatus::Paid)
        .count();
    assert_eq!(paid_rows, 1);
}

#[tokio::test]
async fn duplicate_confirmation_is_a_no_op() {
    let app = TestApp::new().await;
    let (_, product_id) = placed_paid_flow_order(&app, 5, 2).await;
    app.gateway.set_outcome(PaymentOutcome::Confirmed).await;

    let first = app
        .state
        .services
        .reconciliation
        .confirm(&app.gateway.token)
        .await
        .unwrap();
    let second = app
        .state
        .services
        .reconciliation
        .confirm(&app.gateway.token)
        .await
        .unwrap();

    assert!(first.applied);
    assert!(!second.applied);
    assert_eq!(second.order.status, OrderStatus::Paid);

    // Stock was only decremented once.
    let product = Product::find_by_id(product_id)
        .one(app.state.db.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(product.stock, 3);
}

#[tokio::test]
async fn rejected_payment_fails_order_and_leaves_stock() {
    let app = TestApp::new().await;
    let (order_number, product_id) = placed_paid_flow_order(&app, 5, 2).await;
    app.gateway.set_outcome(PaymentOutcome::Rejected).await;

    let outcome = app
        .state
        .services
        .reconciliation
        .confirm(&app.gateway.token)
        .await
        .unwrap();
    assert!(outcome.applied);
    assert_eq!(outcome.order.status, OrderStatus::Failed);

    let product = Product::find_by_id(product_id)
        .one(app.state.db.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(product.stock, 5);

    // Failed is terminal; a later confirmation changes nothing.
    app.gateway.set_outcome(PaymentOutcome::Confirmed).await;
    let late = app
        .state
        .services
        .reconciliation
        .confirm(&app.gateway.token)
        .await
        .unwrap();
    assert!(!late.applied);
    assert_eq!(late.order.status, OrderStatus::Failed);
    let _ = order_number;
}

#[tokio::test]
async fn pending_outcome_leaves_order_untouched() {
    let app = TestApp::new().await;
    let (order_number, _) = placed_paid_flow_order(&app, 5, 1).await;
    app.gateway.set_outcome(PaymentOutcome::Pending).await;

    let outcome = app
        .state
        .services
        .reconciliation
        .confirm(&app.gateway.token)
        .await
        .unwrap();
    assert!(!outcome.applied);
    assert_eq!(outcome.order.status, OrderStatus::Pending);

    let detail = app
        .state
        .services
        .orders
        .get_by_number(&order_number)
        .await
        .unwrap();
    assert_eq!(detail.tracking.len(), 1);
}

#[tokio::test]
async fn stock_shortage_at_confirmation_is_flagged_not_underflowed() {
    let app = TestApp::new().await;
    let (order_number, product_id) = placed_paid_flow_order(&app, 2, 2).await;

    // Stock drains between placement and payment.
    let mut drained: product::ActiveModel = Product::find_by_id(product_id)
        .one(app.state.db.as_ref())
        .await
        .unwrap()
        .unwrap()
        .into();
    drained.stock = Set(1);
    drained.update(app.state.db.as_ref()).await.unwrap();

    app.gateway.set_outcome(PaymentOutcome::Confirmed).await;
    let outcome = app
        .state
        .services
        .reconciliation
        .confirm(&app.gateway.token)
        .await
        .unwrap();

    // The payment stands; the shortage is flagged for manual handling.
    assert!(outcome.applied);
    assert_eq!(outcome.order.status, OrderStatus::Paid);

    let product = Product::find_by_id(product_id)
        .one(app.state.db.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(product.stock, 1);

    let detail = app
        .state
        .services
        .orders
        .get_by_number(&order_number)
        .await
        .unwrap();
    let paid_row = detail
        .tracking
        .iter()
        .find(|t| t.status == OrderStatus::Paid)
        .expect("paid tracking row");
    let note = paid_row.note.as_deref().unwrap_or_default();
    assert!(note.contains("manual reconciliation"), "note was: {note}");
}

#[tokio::test]
async fn order_totals_survive_later_price_changes() {
    let app = TestApp::new().await;
    let (order_number, product_id) = placed_paid_flow_order(&app, 5, 1).await;

    let mut repriced: product::ActiveModel = Product::find_by_id(product_id)
        .one(app.state.db.as_ref())
        .await
        .unwrap()
        .unwrap()
        .into();
    repriced.published_price = Set(99_990);
    repriced.update(app.state.db.as_ref()).await.unwrap();

    let detail = app
        .state
        .services
        .orders
        .get_by_number(&order_number)
        .await
        .unwrap();
    assert_eq!(detail.items[0].unit_price, 10_000);
    assert_eq!(detail.order.subtotal, 10_000);
}

#[tokio::test]
async fn unknown_token_is_rejected() {
    let app = TestApp::new().await;
    app.gateway.set_outcome(PaymentOutcome::Confirmed).await;
    let err = app
        .state
        .services
        .reconciliation
        .confirm("tok-never-issued")
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
}
