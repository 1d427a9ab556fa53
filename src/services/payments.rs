use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
};
use tracing::{info, instrument};

use crate::{
    entities::{
        order,
        order::{OrderStatus, PaymentMethod},
        Order, OrderModel,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::flow::{CreatePaymentRequest, PaymentGateway},
};

/// Starts gateway payments for pending orders. A transport failure leaves
/// the order untouched so the customer can retry without re-entering
/// checkout data.
#[derive(Clone)]
pub struct PaymentService {
    db: Arc<DatabaseConnection>,
    gateway: Arc<dyn PaymentGateway>,
    event_sender: Arc<EventSender>,
}

impl PaymentService {
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

    /// Creates the remote payment for an order and returns the URL the
    /// customer must be redirected to. The returned token is persisted on
    /// the order for later reconciliation.
    #[instrument(skip(self))]
    pub async fn start_payment(&self, order_number: &str) -> Result<StartedPayment, ServiceError> {
        let order = Order::find()
            .filter(order::Column::OrderNumber.eq(order_number))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {order_number} not found")))?;

        if order.status != OrderStatus::Pending {
            return Err(ServiceError::InvalidOperation(format!(
                "order {} is not awaiting payment",
                order.order_number
            )));
        }
        if order.payment_method != PaymentMethod::Flow {
            return Err(ServiceError::InvalidOperation(format!(
                "order {} is not a gateway payment",
                order.order_number
            )));
        }

        let created = self
            .gateway
            .create_payment(CreatePaymentRequest {
                commerce_order: order.order_number.clone(),
                subject: format!("Pago Orden {}", order.order_number),
                amount: order.total_amount,
                payer_email: order.customer_email.clone(),
            })
            .await?;

        let order_id = order.id;
        let mut update: order::ActiveModel = order.into();
        update.gateway_token = Set(Some(created.token.clone()));
        update.payment_url = Set(Some(created.redirect_url.clone()));
        update.updated_at = Set(Utc::now());
        let order = update.update(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::PaymentStarted {
                order_id,
                token: created.token.clone(),
            })
            .await;
        info!(
            "payment started for order {} (token {})",
            order.order_number, created.token
        );

        Ok(StartedPayment {
            order,
            redirect_url: created.redirect_url,
        })
    }
}

/// Result of opening a gateway payment.
#[derive(Debug)]
pub struct StartedPayment {
    pub order: OrderModel,
    pub redirect_url: String,
}
