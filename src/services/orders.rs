use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, sea_query::Expr, Set, TransactionTrait,
};
use serde::Serialize;
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::{
    entities::{
        order, order_item, order_tracking, product,
        order::OrderStatus,
        Order, OrderItem, OrderModel, OrderTracking, Product,
    },
    errors::ServiceError,
    events::{Event, EventSender},
};

/// Order lookups and fulfillment transitions. Payment-driven transitions
/// live in the reconciliation service; this one covers the human side:
/// tracking lookups, cancellation and shipping progress.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

/// Order with its frozen lines and tracking history (newest first).
#[derive(Debug, Clone, Serialize)]
pub struct OrderDetail {
    pub order: OrderModel,
    pub items: Vec<order_item::Model>,
    pub tracking: Vec<order_tracking::Model>,
}

impl OrderService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    #[instrument(skip(self))]
    pub async fn get_by_number(&self, order_number: &str) -> Result<OrderDetail, ServiceError> {
        let order = Order::find()
            .filter(order::Column::OrderNumber.eq(order_number))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {order_number} not found")))?;
        self.load_detail(order).await
    }

    /// Lookup by the payment token Flow handed back, used on browser return.
    #[instrument(skip(self, token))]
    pub async fn get_by_token(&self, token: &str) -> Result<OrderDetail, ServiceError> {
        let order = Order::find()
            .filter(order::Column::GatewayToken.eq(token))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("No order for this payment token".to_string()))?;
        self.load_detail(order).await
    }

    async fn load_detail(&self, order: OrderModel) -> Result<OrderDetail, ServiceError> {
        let items = OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order.id))
            .all(&*self.db)
            .await?;
        let tracking = OrderTracking::find()
            .filter(order_tracking::Column::OrderId.eq(order.id))
            .order_by_desc(order_tracking::Column::CreatedAt)
            .all(&*self.db)
            .await?;
        Ok(OrderDetail {
            order,
            items,
            tracking,
        })
    }

    /// Admin listing, newest first.
    pub async fn list(
        &self,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<OrderModel>, u64), ServiceError> {
        let paginator = Order::find()
            .order_by_desc(order::Column::CreatedAt)
            .paginate(&*self.db, per_page);
        let total = paginator.num_items().await?;
        let data = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((data, total))
    }

    /// Advances an order along the fulfillment path, enforcing the status
    /// state machine and appending the tracking row in one transaction.
    #[instrument(skip(self))]
    pub async fn advance_status(
        &self,
        order_number: &str,
        new_status: OrderStatus,
        note: Option<String>,
    ) -> Result<OrderModel, ServiceError> {
        let txn = self.db.begin().await?;

        let order = Order::find()
            .filter(order::Column::OrderNumber.eq(order_number))
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {order_number} not found")))?;

        let old_status = order.status;
        if !old_status.can_transition_to(new_status) {
            return Err(ServiceError::InvalidStatusTransition(format!(
                "cannot move order {} from {} to {}",
                order.order_number,
                old_status.as_str(),
                new_status.as_str()
            )));
        }

        // Conditional update so a concurrent transition cannot double-apply.
        let claimed = Order::update_many()
            .col_expr(order::Column::Status, Expr::value(new_status))
            .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(order::Column::Id.eq(order.id))
            .filter(order::Column::Status.eq(old_status))
            .exec(&txn)
            .await?;
        if claimed.rows_affected == 0 {
            return Err(ServiceError::Conflict(format!(
                "order {} was updated concurrently",
                order.order_number
            )));
        }

        // Manually confirmed payments (bank transfer) commit stock here,
        // exactly as gateway reconciliation does on its winning path.
        let mut note = note;
        if new_status == OrderStatus::Paid {
            if let Some(shortage) = commit_stock(&txn, &order).await? {
                note = Some(match note {
                    Some(n) => format!("{n}; {shortage}"),
                    None => shortage,
                });
            }
        }

        let tracking = order_tracking::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order.id),
            status: Set(new_status),
            note: Set(note),
            created_at: Set(Utc::now()),
        };
        tracking.insert(&txn).await?;

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::OrderStatusChanged {
                order_id: order.id,
                old_status,
                new_status,
            })
            .await;
        info!(
            "order {} moved {} -> {}",
            order.order_number,
            old_status.as_str(),
            new_status.as_str()
        );

        Order::find_by_id(order.id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("order vanished".to_string()))
    }

    /// Cancels a pending order. Paid orders cannot be cancelled here; a
    /// failed payment already ends the order, and fulfilment problems go
    /// through the tracking history instead.
    #[instrument(skip(self))]
    pub async fn cancel(
        &self,
        order_number: &str,
        note: Option<String>,
    ) -> Result<OrderModel, ServiceError> {
        self.advance_status(order_number, OrderStatus::Cancelled, note)
            .await
    }
}

/// Decrements stock for every order line with a conditional update so a
/// concurrent sale cannot drive stock negative. A line that cannot be
/// covered is flagged for manual handling instead of underflowing; the
/// payment itself stands. Returns the shortage note, if any.
pub(crate) async fn commit_stock(
    txn: &DatabaseTransaction,
    order: &OrderModel,
) -> Result<Option<String>, ServiceError> {
    let items = OrderItem::find()
        .filter(order_item::Column::OrderId.eq(order.id))
        .all(txn)
        .await?;

    let mut shortages = Vec::new();
    for item in &items {
        let decremented = Product::update_many()
            .col_expr(
                product::Column::Stock,
                Expr::col(product::Column::Stock).sub(item.quantity),
            )
            .col_expr(product::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(product::Column::Id.eq(item.product_id))
            .filter(product::Column::Stock.gte(item.quantity))
            .exec(txn)
            .await?;

        if decremented.rows_affected == 0 {
            error!(
                "order {}: insufficient stock to commit '{}' x{}, flagging for manual reconciliation",
                order.order_number, item.product_name, item.quantity
            );
            shortages.push(format!("'{}' x{}", item.product_name, item.quantity));
        }
    }

    if shortages.is_empty() {
        Ok(None)
    } else {
        Ok(Some(format!(
            "stock shortage at confirmation, manual reconciliation required: {}",
            shortages.join("; ")
        )))
    }
}
