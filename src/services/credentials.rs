use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    sea_query::Expr, Set, TransactionTrait,
};
use serde::Deserialize;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::{
    entities::{flow_credentials, FlowCredentials},
    errors::ServiceError,
};

/// Admin management of payment gateway credentials. At most one row is
/// active at any time; the gateway falls back to environment config when
/// no row exists at all.
#[derive(Clone)]
pub struct CredentialService {
    db: Arc<DatabaseConnection>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewCredentials {
    #[validate(length(min = 1, max = 100))]
    pub label: String,
    #[validate(length(min = 1))]
    pub api_key: String,
    #[validate(length(min = 1))]
    pub secret_key: String,
    pub sandbox: bool,
    #[serde(default)]
    pub activate: bool,
}

impl CredentialService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn list(&self) -> Result<Vec<flow_credentials::Model>, ServiceError> {
        Ok(FlowCredentials::find()
            .order_by_desc(flow_credentials::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    #[instrument(skip(self, input), fields(label = %input.label))]
    pub async fn create(
        &self,
        input: NewCredentials,
    ) -> Result<flow_credentials::Model, ServiceError> {
        input
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        let txn = self.db.begin().await?;

        if input.activate {
            Self::deactivate_all(&txn).await?;
        }

        let model = flow_credentials::ActiveModel {
            id: Set(Uuid::new_v4()),
            label: Set(input.label),
            api_key: Set(input.api_key),
            secret_key: Set(input.secret_key),
            is_sandbox: Set(input.sandbox),
            is_active: Set(input.activate),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
        };
        let created = model.insert(&txn).await?;

        txn.commit().await?;
        info!("created gateway credentials {}", created.label);
        Ok(created)
    }

    /// Makes the given credentials the single active set.
    #[instrument(skip(self))]
    pub async fn activate(&self, id: Uuid) -> Result<flow_credentials::Model, ServiceError> {
        let txn = self.db.begin().await?;

        let target = FlowCredentials::find_by_id(id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Credentials {id} not found")))?;

        Self::deactivate_all(&txn).await?;

        let mut active: flow_credentials::ActiveModel = target.into();
        active.is_active = Set(true);
        active.updated_at = Set(Utc::now());
        let updated = active.update(&txn).await?;

        txn.commit().await?;
        info!("activated gateway credentials {}", updated.label);
        Ok(updated)
    }

    async fn deactivate_all(txn: &sea_orm::DatabaseTransaction) -> Result<(), ServiceError> {
        FlowCredentials::update_many()
            .col_expr(flow_credentials::Column::IsActive, Expr::value(false))
            .col_expr(flow_credentials::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(flow_credentials::Column::IsActive.eq(true))
            .exec(txn)
            .await?;
        Ok(())
    }
}
