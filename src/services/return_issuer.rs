use chrono::Utc;
use sea_orm::{
    sea_query::OnConflict, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, Set,
};
use tracing::{info, instrument, warn};

use crate::{
    entities::{
        quality_check::{self, QualityVerdict},
        returns::{self, ReturnStatus, ReturnType},
    },
    errors::ServiceError,
    services::quality_checks::WorkflowStage,
};

/// Turns a failed quality check into a pending supplier return.
#[derive(Debug, Clone, Default)]
pub struct ReturnIssuer;

impl ReturnIssuer {
    pub fn new() -> Self {
        Self
    }

    /// Inserts the return for `check`, keyed by the check's own id.
    ///
    /// A return already on file for the check means another invocation issued it;
    /// that is reported as [`ServiceError::Conflict`].
    #[instrument(skip(self, conn, check), fields(quality_check_id = check.id))]
    pub async fn issue_from_failed_check<C>(
        &self,
        conn: &C,
        check: &quality_check::Model,
    ) -> Result<returns::Model, ServiceError>
    where
        C: ConnectionTrait,
    {
        if check.status != QualityVerdict::Fail {
            return Err(ServiceError::InvalidOperation(format!(
                "quality check {} has verdict {}, only FAIL checks produce returns",
                check.id, check.status
            )));
        }

        let now = Utc::now();
        let pending = returns::ActiveModel {
            quality_check_id: Set(Some(check.id)),
            reception_id: Set(check.reception_id),
            product_name: Set(check.product_name.clone()),
            quantity: Set(check.quantity),
            reason: Set(check.notes.clone()),
            return_type: Set(ReturnType::QualityFail),
            status: Set(ReturnStatus::Pending),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };

        let inserted = returns::Entity::insert(pending)
            .on_conflict(
                OnConflict::column(returns::Column::QualityCheckId)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(conn)
            .await
            .map_err(ServiceError::persistence(WorkflowStage::IssueReturn))?;

        if inserted == 0 {
            warn!("return already issued for quality check");
            return Err(ServiceError::Conflict(format!(
                "A return was already issued for quality check {}",
                check.id
            )));
        }

        let issued = returns::Entity::find()
            .filter(returns::Column::QualityCheckId.eq(check.id))
            .one(conn)
            .await
            .map_err(ServiceError::persistence(WorkflowStage::IssueReturn))?
            .ok_or_else(|| ServiceError::Persistence {
                stage: WorkflowStage::IssueReturn,
                source: DbErr::RecordNotFound(format!("return for quality check {}", check.id)),
            })?;

        info!(return_id = issued.id, "return issued for failed quality check");
        Ok(issued)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::quality_check::ReconciliationStatus;
    use assert_matches::assert_matches;
    use sea_orm::ActiveModelTrait;

    fn check(verdict: QualityVerdict) -> quality_check::ActiveModel {
        quality_check::ActiveModel {
            reception_id: Set(1),
            product_name: Set("Gadget".into()),
            quantity: Set(5),
            status: Set(verdict),
            notes: Set("cracked casing".into()),
            reconciliation_status: Set(ReconciliationStatus::Pending),
            reconciliation_error: Set(None),
            checked_at: Set(Utc::now()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn passing_check_is_refused_before_touching_the_store() {
        let conn = crate::db::memory_pool().await;
        let passed = check(QualityVerdict::Pass).insert(&conn).await.unwrap();

        assert_matches!(
            ReturnIssuer::new().issue_from_failed_check(&conn, &passed).await,
            Err(ServiceError::InvalidOperation(_))
        );
        assert!(returns::Entity::find().all(&conn).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn second_issue_for_same_check_is_a_conflict() {
        let conn = crate::db::memory_pool().await;
        let failed = check(QualityVerdict::Fail).insert(&conn).await.unwrap();
        let issuer = ReturnIssuer::new();

        let issued = issuer.issue_from_failed_check(&conn, &failed).await.unwrap();
        assert_eq!(issued.quality_check_id, Some(failed.id));
        assert_eq!(issued.reason, "cracked casing");
        assert_eq!(issued.status, ReturnStatus::Pending);

        assert_matches!(
            issuer.issue_from_failed_check(&conn, &failed).await,
            Err(ServiceError::Conflict(_))
        );
        assert_eq!(returns::Entity::find().all(&conn).await.unwrap().len(), 1);
    }
}
