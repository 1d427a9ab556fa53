use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, EntityTrait,
    QueryFilter, Set, TransactionTrait,
};
use serde::Deserialize;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::{
    config::AppConfig,
    entities::{
        cart, cart_item, order, order_item, order_tracking, product,
        order::{OrderStatus, PaymentMethod, ShippingMethod},
        Cart, CartItem, Order, OrderModel, Product,
    },
    errors::ServiceError,
    events::{Event, EventSender},
};

/// Customer and delivery input collected at checkout.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CheckoutInput {
    #[validate(length(min = 1, max = 200, message = "customer name is required"))]
    pub customer_name: String,
    #[validate(email(message = "a valid email is required"))]
    pub customer_email: String,
    #[validate(length(min = 6, max = 15, message = "a contact phone is required"))]
    pub customer_phone: String,
    pub shipping_method: ShippingMethod,
    pub payment_method: PaymentMethod,
    pub region: Option<String>,
    pub city: Option<String>,
    pub commune: Option<String>,
    pub shipping_address: Option<String>,
    pub notes: Option<String>,
}

impl CheckoutInput {
    /// Carrier delivery requires the full address; pickup requires none.
    fn validate_shipping_fields(&self) -> Result<(), ServiceError> {
        if self.shipping_method != ShippingMethod::Carrier {
            return Ok(());
        }
        let mut missing = Vec::new();
        for (value, name) in [
            (&self.region, "region"),
            (&self.city, "city"),
            (&self.commune, "commune"),
            (&self.shipping_address, "shipping_address"),
        ] {
            if value.as_deref().map_or(true, |v| v.trim().is_empty()) {
                missing.push(name);
            }
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ServiceError::ValidationError(format!(
                "carrier delivery requires: {}",
                missing.join(", ")
            )))
        }
    }
}

/// Converts carts (or a single buy-now selection) into pending orders.
/// Stock is not touched here; inventory is only committed on confirmed
/// payment.
#[derive(Clone)]
pub struct CheckoutService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    config: Arc<AppConfig>,
}

impl CheckoutService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            db,
            event_sender,
            config,
        }
    }

    /// Places an order from an active cart. The cart is consumed
    /// (deactivated) in the same transaction that creates the order.
    #[instrument(skip(self, input))]
    pub async fn place_order(
        &self,
        cart_id: Uuid,
        input: CheckoutInput,
    ) -> Result<OrderModel, ServiceError> {
        input
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;
        input.validate_shipping_fields()?;

        let txn = self.db.begin().await?;

        let cart = Cart::find_by_id(cart_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Cart {cart_id} not found")))?;
        if !cart.is_active {
            return Err(ServiceError::InvalidOperation(
                "cart has already been checked out".to_string(),
            ));
        }

        let rows = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart_id))
            .find_also_related(Product)
            .all(&txn)
            .await?;
        if rows.is_empty() {
            return Err(ServiceError::InvalidOperation(
                "nothing to order: cart is empty".to_string(),
            ));
        }

        let mut lines = Vec::with_capacity(rows.len());
        for (item, product) in rows {
            let product = product.ok_or_else(|| {
                ServiceError::NotFound(format!("Product {} not found", item.product_id))
            })?;
            lines.push((product, item.quantity));
        }

        let order = self
            .create_order(&txn, &input, &lines, Some(cart_id))
            .await?;

        // Consume the cart so a double submission cannot produce a second
        // order from the same items.
        let mut consumed: cart::ActiveModel = cart.into();
        consumed.is_active = Set(false);
        consumed.updated_at = Set(Utc::now());
        consumed.update(&txn).await?;

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartDeactivated(cart_id))
            .await;
        self.emit_placed(&order).await;
        Ok(order)
    }

    /// Places a single-product order without a cart.
    #[instrument(skip(self, input))]
    pub async fn buy_now(
        &self,
        product_id: Uuid,
        quantity: i32,
        input: CheckoutInput,
    ) -> Result<OrderModel, ServiceError> {
        input
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;
        input.validate_shipping_fields()?;
        if quantity < 1 {
            return Err(ServiceError::ValidationError(
                "quantity must be at least 1".to_string(),
            ));
        }

        let txn = self.db.begin().await?;

        let product = Product::find_by_id(product_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {product_id} not found")))?;

        let order = self
            .create_order(&txn, &input, &[(product, quantity)], None)
            .await?;

        txn.commit().await?;
        self.emit_placed(&order).await;
        Ok(order)
    }

    async fn emit_placed(&self, order: &OrderModel) {
        self.event_sender
            .send_or_log(Event::OrderPlaced {
                order_id: order.id,
                order_number: order.order_number.clone(),
            })
            .await;
        info!(
            "placed order {} for {} (total {})",
            order.order_number, order.customer_email, order.total_amount
        );
    }

    /// Builds and persists the order, its frozen line items and the initial
    /// tracking row inside the caller's transaction.
    async fn create_order(
        &self,
        txn: &DatabaseTransaction,
        input: &CheckoutInput,
        lines: &[(product::Model, i32)],
        cart_id: Option<Uuid>,
    ) -> Result<OrderModel, ServiceError> {
        // The whole order is rejected when any single line cannot be
        // fulfilled; partial orders are never created.
        for (product, quantity) in lines {
            if !product.is_active {
                return Err(ServiceError::InvalidOperation(format!(
                    "product '{}' is no longer available",
                    product.name
                )));
            }
            if *quantity > product.stock {
                return Err(ServiceError::InsufficientStock(format!(
                    "'{}' has only {} units in stock",
                    product.name, product.stock
                )));
            }
        }

        let subtotal: i64 = lines
            .iter()
            .map(|(p, q)| p.final_price() * i64::from(*q))
            .sum();
        let discount_total: i64 = lines
            .iter()
            .map(|(p, q)| p.discount_amount() * i64::from(*q))
            .sum();
        let tax_total = subtotal * product::IVA_RATE_PERCENT / 100;
        let shipping_total = match input.shipping_method {
            ShippingMethod::Pickup => 0,
            ShippingMethod::Carrier => self.config.carrier_shipping_cost,
        };
        let total_amount = subtotal + tax_total + shipping_total;

        let order_id = Uuid::new_v4();
        let order_number = next_order_number(txn).await?;

        let order = order::ActiveModel {
            id: Set(order_id),
            order_number: Set(order_number),
            status: Set(OrderStatus::Pending),
            shipping_method: Set(input.shipping_method),
            payment_method: Set(input.payment_method),
            customer_name: Set(input.customer_name.clone()),
            customer_email: Set(input.customer_email.clone()),
            customer_phone: Set(input.customer_phone.clone()),
            region: Set(input.region.clone()),
            city: Set(input.city.clone()),
            commune: Set(input.commune.clone()),
            shipping_address: Set(input.shipping_address.clone()),
            subtotal: Set(subtotal),
            discount_total: Set(discount_total),
            tax_total: Set(tax_total),
            shipping_total: Set(shipping_total),
            total_amount: Set(total_amount),
            gateway_token: Set(None),
            payment_url: Set(None),
            cart_id: Set(cart_id),
            notes: Set(input.notes.clone()),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
        };
        let order = order.insert(txn).await?;

        for (product, quantity) in lines {
            let unit_price = product.final_price();
            let item = order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(product.id),
                product_name: Set(product.name.clone()),
                quantity: Set(*quantity),
                unit_price: Set(unit_price),
                line_total: Set(unit_price * i64::from(*quantity)),
                created_at: Set(Utc::now()),
            };
            item.insert(txn).await?;
        }

        let tracking = order_tracking::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order_id),
            status: Set(OrderStatus::Pending),
            note: Set(Some("order placed".to_string())),
            created_at: Set(Utc::now()),
        };
        tracking.insert(txn).await?;

        Ok(order)
    }
}

/// Assigns the next order number: `DDMMYY` date prefix plus a zero-padded
/// daily counter. Runs inside the placement transaction; the unique index
/// on order_number backstops concurrent submissions.
pub(crate) async fn next_order_number(
    txn: &DatabaseTransaction,
) -> Result<String, ServiceError> {
    let prefix = Utc::now().format("%d%m%y").to_string();

    // The counter is compared numerically, not by string sort: past 999
    // the suffix grows a digit and "1000" sorts below "999".
    let todays = Order::find()
        .filter(order::Column::OrderNumber.starts_with(prefix.clone()))
        .all(txn)
        .await?;

    let mut next = 1;
    for o in &todays {
        let counter = o.order_number[prefix.len()..].parse::<u32>().map_err(|_| {
            ServiceError::InvalidOperation(format!("malformed order number {}", o.order_number))
        })?;
        next = next.max(counter + 1);
    }

    Ok(format!("{prefix}{next:03}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(shipping: ShippingMethod) -> CheckoutInput {
        CheckoutInput {
            customer_name: "Ana Rojas".to_string(),
            customer_email: "ana@example.cl".to_string(),
            customer_phone: "+56911112222".to_string(),
            shipping_method: shipping,
            payment_method: PaymentMethod::Flow,
            region: None,
            city: None,
            commune: None,
            shipping_address: None,
            notes: None,
        }
    }

    #[test]
    fn pickup_needs_no_address() {
        assert!(input(ShippingMethod::Pickup).validate_shipping_fields().is_ok());
    }

    #[test]
    fn carrier_names_every_missing_field() {
        let err = input(ShippingMethod::Carrier)
            .validate_shipping_fields()
            .unwrap_err();
        let msg = err.to_string();
        for field in ["region", "city", "commune", "shipping_address"] {
            assert!(msg.contains(field), "missing {field} in: {msg}");
        }
    }

    #[test]
    fn carrier_with_full_address_passes() {
        let mut i = input(ShippingMethod::Carrier);
        i.region = Some("RM".to_string());
        i.city = Some("Santiago".to_string());
        i.commune = Some("Providencia".to_string());
        i.shipping_address = Some("Av. Siempre Viva 742".to_string());
        assert!(i.validate_shipping_fields().is_ok());
    }

    #[test]
    fn blank_address_fields_count_as_missing() {
        let mut i = input(ShippingMethod::Carrier);
        i.region = Some("  ".to_string());
        i.city = Some("Santiago".to_string());
        i.commune = Some("Providencia".to_string());
        i.shipping_address = Some("Av. Siempre Viva 742".to_string());
        let msg = i.validate_shipping_fields().unwrap_err().to_string();
        assert!(msg.contains("region"));
        assert!(!msg.contains("city"));
    }

    #[test]
    fn invalid_email_is_rejected() {
        let mut i = input(ShippingMethod::Pickup);
        i.customer_email = "not-an-email".to_string();
        assert!(i.validate().is_err());
    }
}
