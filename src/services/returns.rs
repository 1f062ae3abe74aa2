use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use validator::Validate;

use crate::{
    db::DbPool,
    entities::{
        reception,
        returns::{self, ReturnStatus, ReturnType},
    },
    errors::ServiceError,
};

/// Supplier reported for returns whose reception row is missing.
pub const UNKNOWN_SUPPLIER: &str = "Unknown Supplier";

/// A return together with the supplier that shipped the batch.
#[derive(Debug, Clone)]
pub struct ReturnWithSupplier {
    pub record: returns::Model,
    pub supplier: String,
}

/// A return entered by hand, not tied to any quality check.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateReturnCommand {
    #[validate(range(min = 1, message = "reception_id must be positive"))]
    pub reception_id: i32,
    #[validate(
        length(min = 1, max = 255, message = "product_name must be 1-255 characters"),
        custom = "crate::services::quality_checks::not_blank"
    )]
    pub product_name: String,
    #[validate(range(min = 1, message = "quantity must be greater than zero"))]
    pub quantity: i32,
    #[validate(length(max = 1000, message = "reason must be at most 1000 characters"))]
    pub reason: String,
    pub return_type: ReturnType,
}

/// Read side of the returns queue plus its status transitions.
#[derive(Clone)]
pub struct ReturnService {
    db_pool: Arc<DbPool>,
}

impl ReturnService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    /// Lists returns newest first.
    #[instrument(skip(self))]
    pub async fn list_returns(&self) -> Result<Vec<ReturnWithSupplier>, ServiceError> {
        let rows = returns::Entity::find()
            .find_also_related(reception::Entity)
            .order_by_desc(returns::Column::CreatedAt)
            .order_by_desc(returns::Column::Id)
            .all(self.db_pool.as_ref())
            .await
            .map_err(ServiceError::DatabaseError)?;

        Ok(rows
            .into_iter()
            .map(|(record, reception)| ReturnWithSupplier {
                record,
                supplier: reception
                    .map(|r| r.supplier)
                    .unwrap_or_else(|| UNKNOWN_SUPPLIER.to_string()),
            })
            .collect())
    }

    /// Records a manual return in PENDING.
    ///
    /// QUALITY_FAIL returns only come out of the quality check workflow.
    #[instrument(skip(self, command), fields(product_name = %command.product_name))]
    pub async fn create_manual(
        &self,
        command: CreateReturnCommand,
    ) -> Result<returns::Model, ServiceError> {
        command.validate().map_err(|e| {
            warn!(error = %e, "manual return rejected");
            ServiceError::ValidationError(e.to_string())
        })?;
        if command.return_type == ReturnType::QualityFail {
            return Err(ServiceError::InvalidOperation(
                "QUALITY_FAIL returns are issued by the quality check workflow".to_string(),
            ));
        }

        let now = Utc::now();
        let created = returns::ActiveModel {
            quality_check_id: Set(None),
            reception_id: Set(command.reception_id),
            product_name: Set(command.product_name),
            quantity: Set(command.quantity),
            reason: Set(command.reason),
            return_type: Set(command.return_type),
            status: Set(ReturnStatus::Pending),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(self.db_pool.as_ref())
        .await
        .map_err(ServiceError::DatabaseError)?;

        info!(return_id = created.id, return_type = %created.return_type, "manual return recorded");
        Ok(created)
    }

    #[instrument(skip(self))]
    pub async fn get_return(&self, return_id: i32) -> Result<returns::Model, ServiceError> {
        returns::Entity::find_by_id(return_id)
            .one(self.db_pool.as_ref())
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| ServiceError::NotFound(format!("Return {return_id} not found")))
    }

    /// Moves a return to `next`, enforcing [`ReturnStatus::can_transition_to`].
    #[instrument(skip(self))]
    pub async fn update_status(
        &self,
        return_id: i32,
        next: ReturnStatus,
    ) -> Result<returns::Model, ServiceError> {
        let current = self.get_return(return_id).await?;

        if !current.status.can_transition_to(next) {
            warn!(return_id, from = %current.status, to = %next, "return transition refused");
            return Err(ServiceError::InvalidStatus(format!(
                "Return {return_id} cannot move from {} to {next}",
                current.status
            )));
        }

        let result = returns::Entity::update_many()
            .set(returns::ActiveModel {
                status: Set(next),
                updated_at: Set(Utc::now()),
                ..Default::default()
            })
            .filter(returns::Column::Id.eq(return_id))
            .filter(returns::Column::Status.eq(current.status))
            .exec(self.db_pool.as_ref())
            .await
            .map_err(ServiceError::DatabaseError)?;

        if result.rows_affected == 0 {
            return Err(ServiceError::Conflict(format!(
                "Return {return_id} changed status concurrently"
            )));
        }

        info!(return_id, from = %current.status, to = %next, "return status updated");
        self.get_return(return_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn manual(return_type: ReturnType, quantity: i32) -> CreateReturnCommand {
        CreateReturnCommand {
            reception_id: 3,
            product_name: "Pallet".into(),
            quantity,
            reason: "over-shipped".into(),
            return_type,
        }
    }

    #[tokio::test]
    async fn manual_return_starts_pending_without_a_check() {
        let service = ReturnService::new(Arc::new(crate::db::memory_pool().await));

        let created = service
            .create_manual(manual(ReturnType::Excess, 2))
            .await
            .unwrap();
        assert_eq!(created.status, ReturnStatus::Pending);
        assert_eq!(created.return_type, ReturnType::Excess);
        assert_eq!(created.quality_check_id, None);

        // several manual returns may coexist; only check-linked returns are unique
        service
            .create_manual(manual(ReturnType::Damaged, 1))
            .await
            .unwrap();
        assert_eq!(service.list_returns().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn quality_fail_and_invalid_input_are_refused() {
        let service = ReturnService::new(Arc::new(crate::db::memory_pool().await));

        assert_matches!(
            service.create_manual(manual(ReturnType::QualityFail, 2)).await,
            Err(ServiceError::InvalidOperation(_))
        );
        assert_matches!(
            service.create_manual(manual(ReturnType::Other, 0)).await,
            Err(ServiceError::ValidationError(_))
        );
        assert!(service.list_returns().await.unwrap().is_empty());
    }
}
