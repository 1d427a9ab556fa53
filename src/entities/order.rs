use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A placed order. Monetary fields are frozen at placement time and never
/// recomputed from the catalog afterwards.
///
/// Invariant: `total_amount = subtotal + tax_total + shipping_total`, where
/// `subtotal` is the discounted line sum and `discount_total` records how
/// much was taken off the published prices.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub order_number: String,
    pub status: OrderStatus,
    pub shipping_method: ShippingMethod,
    pub payment_method: PaymentMethod,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: String,
    #[sea_orm(nullable)]
    pub region: Option<String>,
    #[sea_orm(nullable)]
    pub city: Option<String>,
    #[sea_orm(nullable)]
    pub commune: Option<String>,
    #[sea_orm(nullable)]
    pub shipping_address: Option<String>,
    pub subtotal: i64,
    pub discount_total: i64,
    pub tax_total: i64,
    pub shipping_total: i64,
    pub total_amount: i64,
    /// Opaque correlation token returned by the payment gateway.
    #[sea_orm(nullable)]
    pub gateway_token: Option<String>,
    #[sea_orm(nullable)]
    pub payment_url: Option<String>,
    /// Cart this order was placed from, when any.
    #[sea_orm(nullable)]
    pub cart_id: Option<Uuid>,
    #[sea_orm(nullable)]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::order_item::Entity")]
    OrderItems,
    #[sea_orm(has_many = "super::order_tracking::Entity")]
    TrackingHistory,
}

impl Related<super::order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderItems.def()
    }
}

impl Related<super::order_tracking::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::TrackingHistory.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Order lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "paid")]
    Paid,
    #[sea_orm(string_value = "shipped")]
    Shipped,
    #[sea_orm(string_value = "delivered")]
    Delivered,
    #[sea_orm(string_value = "failed")]
    Failed,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

impl OrderStatus {
    /// No transition is permitted out of a terminal state.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Failed | Self::Cancelled)
    }

    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Paid)
                | (Self::Pending, Self::Failed)
                | (Self::Pending, Self::Cancelled)
                | (Self::Paid, Self::Shipped)
                | (Self::Shipped, Self::Delivered)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
pub enum ShippingMethod {
    /// Customer picks the order up at the store; no shipping cost.
    #[sea_orm(string_value = "pickup")]
    Pickup,
    /// Carrier delivery; requires full address fields.
    #[sea_orm(string_value = "carrier")]
    Carrier,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    #[sea_orm(string_value = "flow")]
    Flow,
    #[sea_orm(string_value = "transfer")]
    Transfer,
}

#[cfg(test)]
mod tests {
    use super::OrderStatus::*;
    use super::*;
    use sea_orm::Iterable;

    #[test]
    fn pending_reaches_each_outcome_once() {
        assert!(Pending.can_transition_to(Paid));
        assert!(Pending.can_transition_to(Failed));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(!Pending.can_transition_to(Shipped));
        assert!(!Pending.can_transition_to(Delivered));
    }

    #[test]
    fn fulfillment_path_is_linear() {
        assert!(Paid.can_transition_to(Shipped));
        assert!(Shipped.can_transition_to(Delivered));
        assert!(!Paid.can_transition_to(Delivered));
        assert!(!Paid.can_transition_to(Cancelled));
    }

    #[test]
    fn terminal_states_have_no_exits() {
        for terminal in [Delivered, Failed, Cancelled] {
            assert!(terminal.is_terminal());
            for next in OrderStatus::iter() {
                assert!(
                    !terminal.can_transition_to(next),
                    "{terminal:?} must not reach {next:?}"
                );
            }
        }
    }

    #[test]
    fn self_transition_is_not_allowed() {
        for status in OrderStatus::iter() {
            assert!(!status.can_transition_to(status));
        }
    }
}
