use std::sync::Arc;

use chrono::{Duration, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    sea_query::Expr, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    entities::{cart, cart_item, product, Cart, CartItem, CartModel, Product},
    errors::ServiceError,
    events::{Event, EventSender},
};

/// Identifies the owner of a cart: an authenticated customer or an
/// anonymous visitor token delivered via a long-lived cookie.
#[derive(Debug, Clone, Deserialize)]
pub enum CartOwner {
    Customer(Uuid),
    Visitor(String),
}

/// Shopping cart service. Enforces the single-active-cart-per-owner
/// invariant and computes display totals from current catalog prices.
#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl CartService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Returns the owner's active cart, creating one when none exists.
    /// Creation deactivates any stale active carts for the same owner in
    /// the same transaction.
    #[instrument(skip(self))]
    pub async fn active_cart_for(&self, owner: CartOwner) -> Result<CartModel, ServiceError> {
        let txn = self.db.begin().await?;

        let mut query = Cart::find().filter(cart::Column::IsActive.eq(true));
        query = match &owner {
            CartOwner::Customer(id) => query.filter(cart::Column::CustomerId.eq(*id)),
            CartOwner::Visitor(token) => query.filter(cart::Column::VisitorId.eq(token.clone())),
        };

        if let Some(existing) = query
            .order_by_desc(cart::Column::CreatedAt)
            .one(&txn)
            .await?
        {
            txn.commit().await?;
            return Ok(existing);
        }

        // Supersede any concurrently created active carts for this owner.
        let mut deactivate = Cart::update_many()
            .col_expr(cart::Column::IsActive, Expr::value(false))
            .col_expr(cart::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(cart::Column::IsActive.eq(true));
        deactivate = match &owner {
            CartOwner::Customer(id) => deactivate.filter(cart::Column::CustomerId.eq(*id)),
            CartOwner::Visitor(token) => {
                deactivate.filter(cart::Column::VisitorId.eq(token.clone()))
            }
        };
        deactivate.exec(&txn).await?;

        let cart_id = Uuid::new_v4();
        let (customer_id, visitor_id, is_guest) = match owner {
            CartOwner::Customer(id) => (Some(id), None, false),
            CartOwner::Visitor(token) => (None, Some(token), true),
        };

        let cart = cart::ActiveModel {
            id: Set(cart_id),
            customer_id: Set(customer_id),
            visitor_id: Set(visitor_id),
            is_guest: Set(is_guest),
            is_active: Set(true),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
        };
        let cart = cart.insert(&txn).await?;
        txn.commit().await?;

        self.event_sender.send_or_log(Event::CartCreated(cart_id)).await;
        info!("created cart {}", cart_id);
        Ok(cart)
    }

    /// Adds a product line, incrementing quantity when the product is
    /// already in the cart. Rejects inactive carts and products and
    /// quantities exceeding available stock.
    #[instrument(skip(self))]
    pub async fn add_item(
        &self,
        cart_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<CartWithItems, ServiceError> {
        if quantity < 1 {
            return Err(ServiceError::ValidationError(
                "quantity must be at least 1".to_string(),
            ));
        }

        let txn = self.db.begin().await?;

        let cart = Cart::find_by_id(cart_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Cart {cart_id} not found")))?;
        if !cart.is_active {
            return Err(ServiceError::InvalidOperation(
                "cart is no longer active".to_string(),
            ));
        }

        let product = Product::find_by_id(product_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {product_id} not found")))?;
        if !product.is_active {
            return Err(ServiceError::InvalidOperation(format!(
                "product '{}' is not available",
                product.name
            )));
        }

        let existing = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart_id))
            .filter(cart_item::Column::ProductId.eq(product_id))
            .one(&txn)
            .await?;

        let new_quantity = existing.as_ref().map_or(quantity, |i| i.quantity + quantity);
        if new_quantity > product.stock {
            return Err(ServiceError::InsufficientStock(format!(
                "only {} units of '{}' available",
                product.stock, product.name
            )));
        }

        match existing {
            Some(item) => {
                let mut item: cart_item::ActiveModel = item.into();
                item.quantity = Set(new_quantity);
                item.updated_at = Set(Utc::now());
                item.update(&txn).await?;
            }
            None => {
                let item = cart_item::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    cart_id: Set(cart_id),
                    product_id: Set(product_id),
                    quantity: Set(quantity),
                    created_at: Set(Utc::now()),
                    updated_at: Set(Utc::now()),
                };
                item.insert(&txn).await?;
            }
        }

        let mut touch: cart::ActiveModel = cart.into();
        touch.updated_at = Set(Utc::now());
        touch.update(&txn).await?;

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartItemAdded {
                cart_id,
                product_id,
            })
            .await;
        info!("cart {}: added product {} x{}", cart_id, product_id, quantity);

        self.get_cart(cart_id).await
    }

    /// Sets a line's quantity; zero or less removes the line.
    #[instrument(skip(self))]
    pub async fn update_item_quantity(
        &self,
        cart_id: Uuid,
        item_id: Uuid,
        quantity: i32,
    ) -> Result<CartWithItems, ServiceError> {
        let txn = self.db.begin().await?;

        let item = CartItem::find_by_id(item_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Cart item {item_id} not found")))?;
        if item.cart_id != cart_id {
            return Err(ServiceError::InvalidOperation(
                "item does not belong to this cart".to_string(),
            ));
        }

        if quantity <= 0 {
            CartItem::delete_by_id(item_id).exec(&txn).await?;
        } else {
            let product = Product::find_by_id(item.product_id)
                .one(&txn)
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("Product {} not found", item.product_id))
                })?;
            if quantity > product.stock {
                return Err(ServiceError::InsufficientStock(format!(
                    "only {} units of '{}' available",
                    product.stock, product.name
                )));
            }
            let mut item: cart_item::ActiveModel = item.into();
            item.quantity = Set(quantity);
            item.updated_at = Set(Utc::now());
            item.update(&txn).await?;
        }

        Cart::update_many()
            .col_expr(cart::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(cart::Column::Id.eq(cart_id))
            .exec(&txn)
            .await?;

        txn.commit().await?;
        self.get_cart(cart_id).await
    }

    /// Loads the cart with priced lines and derived totals.
    #[instrument(skip(self))]
    pub async fn get_cart(&self, cart_id: Uuid) -> Result<CartWithItems, ServiceError> {
        let cart = Cart::find_by_id(cart_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Cart {cart_id} not found")))?;

        let rows = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart_id))
            .find_also_related(Product)
            .all(&*self.db)
            .await?;

        let mut items = Vec::with_capacity(rows.len());
        for (item, product) in rows {
            let product = product.ok_or_else(|| {
                ServiceError::NotFound(format!("Product {} not found", item.product_id))
            })?;
            items.push(PricedCartLine::new(item, &product));
        }

        Ok(CartWithItems::new(cart, items))
    }

    /// Empties the cart, keeping it active.
    #[instrument(skip(self))]
    pub async fn clear_cart(&self, cart_id: Uuid) -> Result<(), ServiceError> {
        let txn = self.db.begin().await?;
        CartItem::delete_many()
            .filter(cart_item::Column::CartId.eq(cart_id))
            .exec(&txn)
            .await?;
        Cart::update_many()
            .col_expr(cart::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(cart::Column::Id.eq(cart_id))
            .exec(&txn)
            .await?;
        txn.commit().await?;

        self.event_sender.send_or_log(Event::CartCleared(cart_id)).await;
        info!("cleared cart {}", cart_id);
        Ok(())
    }

    /// Takes a cart out of circulation; its items are kept for history.
    #[instrument(skip(self))]
    pub async fn deactivate_cart(&self, cart_id: Uuid) -> Result<(), ServiceError> {
        let result = Cart::update_many()
            .col_expr(cart::Column::IsActive, Expr::value(false))
            .col_expr(cart::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(cart::Column::Id.eq(cart_id))
            .filter(cart::Column::IsActive.eq(true))
            .exec(&*self.db)
            .await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!(
                "No active cart {cart_id}"
            )));
        }
        self.event_sender
            .send_or_log(Event::CartDeactivated(cart_id))
            .await;
        Ok(())
    }

    /// Deactivates guest carts idle for longer than `max_idle_days`.
    /// Returns how many carts were swept.
    #[instrument(skip(self))]
    pub async fn sweep_stale_guest_carts(&self, max_idle_days: i64) -> Result<u64, ServiceError> {
        let cutoff = Utc::now() - Duration::days(max_idle_days);
        let result = Cart::update_many()
            .col_expr(cart::Column::IsActive, Expr::value(false))
            .col_expr(cart::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(cart::Column::IsGuest.eq(true))
            .filter(cart::Column::IsActive.eq(true))
            .filter(cart::Column::UpdatedAt.lt(cutoff))
            .exec(&*self.db)
            .await?;

        info!("swept {} stale guest carts", result.rows_affected);
        Ok(result.rows_affected)
    }
}

/// A cart line priced from the current catalog.
#[derive(Debug, Clone, Serialize)]
pub struct PricedCartLine {
    pub item_id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub product_slug: String,
    pub quantity: i32,
    pub published_price: i64,
    /// Discounted unit price, floored before multiplication.
    pub unit_price: i64,
    pub line_total: i64,
}

impl PricedCartLine {
    fn new(item: cart_item::Model, product: &product::Model) -> Self {
        let unit_price = product.final_price();
        Self {
            item_id: item.id,
            product_id: product.id,
            product_name: product.name.clone(),
            product_slug: product.slug.clone(),
            quantity: item.quantity,
            published_price: product.published_price,
            unit_price,
            line_total: unit_price * i64::from(item.quantity),
        }
    }
}

/// Cart plus its priced lines and derived totals. Totals are computed on
/// demand and never stored on the cart row. Shipping is unknown until
/// checkout, so `total` here is subtotal plus IVA only.
#[derive(Debug, Clone, Serialize)]
pub struct CartWithItems {
    pub cart: CartModel,
    pub items: Vec<PricedCartLine>,
    pub subtotal: i64,
    pub discount_total: i64,
    pub tax_total: i64,
    pub total: i64,
    pub item_count: i32,
}

impl CartWithItems {
    fn new(cart: CartModel, items: Vec<PricedCartLine>) -> Self {
        let subtotal: i64 = items.iter().map(|l| l.line_total).sum();
        let discount_total: i64 = items
            .iter()
            .map(|l| (l.published_price - l.unit_price) * i64::from(l.quantity))
            .sum();
        let tax_total = subtotal * product::IVA_RATE_PERCENT / 100;
        let item_count: i32 = items.iter().map(|l| l.quantity).sum();
        Self {
            cart,
            items,
            subtotal,
            discount_total,
            tax_total,
            total: subtotal + tax_total,
            item_count,
        }
    }
}
