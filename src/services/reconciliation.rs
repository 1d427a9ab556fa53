use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
    sea_query::Expr, Set, TransactionTrait,
};
use tracing::{info, instrument, warn};

use crate::{
    entities::{
        cart, order, order_tracking,
        order::OrderStatus,
        Cart, Order, OrderModel,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::flow::{PaymentGateway, PaymentOutcome},
    services::orders::commit_stock,
};

/// Applies gateway-reported outcomes to orders. Confirmation may arrive
/// via the browser return and the server webhook in either order, more
/// than once, or concurrently; the `Pending -> terminal` transition is a
/// single conditional update so exactly one caller wins and performs the
/// side effects.
#[derive(Clone)]
pub struct ReconciliationService {
    db: Arc<DatabaseConnection>,
    gateway: Arc<dyn PaymentGateway>,
    event_sender: Arc<EventSender>,
}

/// What a reconciliation call observed and did.
#[derive(Debug, Clone)]
pub struct ReconciliationOutcome {
    pub order: OrderModel,
    /// True when this call performed the status transition (and its side
    /// effects); false for duplicate or late callbacks.
    pub applied: bool,
}

impl ReconciliationService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        gateway: Arc<dyn PaymentGateway>,
        event_sender: Arc<EventSender>,
    ) -> Self {
        Self {
            db,
            gateway,
            event_sender,
        }
    }

    /// Reconciles the order identified by a gateway token. The outcome is
    /// always re-derived from the gateway's signed status endpoint; the
    /// callback body that delivered the token is never trusted.
    #[instrument(skip(self))]
    pub async fn confirm(&self, token: &str) -> Result<ReconciliationOutcome, ServiceError> {
        let outcome = self.gateway.payment_status(token).await?;

        let order = Order::find()
            .filter(order::Column::GatewayToken.eq(token))
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                warn!("callback for unknown token");
                ServiceError::NotFound("no order for payment token".to_string())
            })?;

        let target = match outcome {
            PaymentOutcome::Confirmed => OrderStatus::Paid,
            PaymentOutcome::Rejected => OrderStatus::Failed,
            PaymentOutcome::Pending => {
                // Still in flight: leave the order untouched; the gateway
                // will call again.
                return Ok(ReconciliationOutcome {
                    order,
                    applied: false,
                });
            }
        };

        if order.status != OrderStatus::Pending {
            // Late or duplicate delivery after the order settled. Must be
            // acknowledged as success so the gateway stops retrying.
            info!(
                "order {} already {}, callback is a no-op",
                order.order_number,
                order.status.as_str()
            );
            return Ok(ReconciliationOutcome {
                order,
                applied: false,
            });
        }

        let txn = self.db.begin().await?;

        // Only one concurrent caller wins this update; the loser sees zero
        // affected rows and treats the work as already done.
        let claimed = Order::update_many()
            .col_expr(order::Column::Status, Expr::value(target))
            .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(order::Column::Id.eq(order.id))
            .filter(order::Column::Status.eq(OrderStatus::Pending))
            .exec(&txn)
            .await?;

        if claimed.rows_affected == 0 {
            txn.commit().await?;
            let order = Order::find_by_id(order.id)
                .one(&*self.db)
                .await?
                .ok_or_else(|| ServiceError::NotFound("order vanished".to_string()))?;
            return Ok(ReconciliationOutcome {
                order,
                applied: false,
            });
        }

        let mut note = None;
        if target == OrderStatus::Paid {
            note = commit_stock(&txn, &order).await?;
            if let Some(cart_id) = order.cart_id {
                Cart::update_many()
                    .col_expr(cart::Column::IsActive, Expr::value(false))
                    .col_expr(cart::Column::UpdatedAt, Expr::value(Utc::now()))
                    .filter(cart::Column::Id.eq(cart_id))
                    .exec(&txn)
                    .await?;
            }
        }

        let tracking = order_tracking::ActiveModel {
            id: Set(uuid::Uuid::new_v4()),
            order_id: Set(order.id),
            status: Set(target),
            note: Set(note),
            created_at: Set(Utc::now()),
        };
        tracking.insert(&txn).await?;

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::OrderStatusChanged {
                order_id: order.id,
                old_status: OrderStatus::Pending,
                new_status: target,
            })
            .await;
        self.event_sender
            .send_or_log(match target {
                OrderStatus::Paid => Event::PaymentConfirmed { order_id: order.id },
                _ => Event::PaymentFailed { order_id: order.id },
            })
            .await;
        info!(
            "order {} reconciled to {}",
            order.order_number,
            target.as_str()
        );

        let order = Order::find_by_id(order.id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("order vanished".to_string()))?;
        Ok(ReconciliationOutcome {
            order,
            applied: true,
        })
    }

}
