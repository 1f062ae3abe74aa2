use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseTransaction, DbErr, EntityTrait,
    QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::{future::Future, sync::Arc, time::Duration};
use tracing::{debug, error, info, instrument, warn};
use validator::{Validate, ValidationError};

use crate::{
    config::AppConfig,
    db::DbPool,
    entities::{
        quality_check::{self, QualityVerdict, ReconciliationStatus},
        returns::ReturnStatus,
    },
    errors::ServiceError,
    services::{
        inventory_ledger::InventoryLedger, product_resolver::ProductResolver,
        return_issuer::ReturnIssuer,
    },
};

/// Store operation a workflow error is attributed to.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum WorkflowStage {
    LoadCheck,
    PersistCheck,
    ResolveProduct,
    UpsertInventory,
    IssueReturn,
    MarkReconciled,
}

/// Lifecycle of one quality check submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowState {
    ReceivedInput,
    CheckPersisted,
    ResolvingProduct,
    IssuingReturn,
    Completed,
    PartiallyFailed,
}

fn enter(state: WorkflowState, quality_check_id: Option<i32>) {
    debug!(state = %state, quality_check_id, "quality check workflow transition");
}

/// Knobs the workflow takes from configuration.
#[derive(Debug, Clone, Copy)]
pub struct WorkflowSettings {
    pub default_location_id: i32,
    pub default_category_id: i32,
    pub step_timeout: Duration,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            default_location_id: 1,
            default_category_id: 1,
            step_timeout: Duration::from_secs(5),
        }
    }
}

impl From<&AppConfig> for WorkflowSettings {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            default_location_id: cfg.default_location_id,
            default_category_id: cfg.default_category_id,
            step_timeout: cfg.workflow_step_timeout(),
        }
    }
}

/// A quality check as submitted by the receiving dock.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RecordQualityCheckCommand {
    #[validate(range(min = 1, message = "reception_id must be positive"))]
    pub reception_id: i32,
    #[validate(
        length(min = 1, max = 255, message = "product_name must be 1-255 characters"),
        custom = "not_blank"
    )]
    pub product_name: String,
    #[validate(range(min = 1, message = "quantity must be greater than zero"))]
    pub quantity: i32,
    pub verdict: QualityVerdict,
    #[validate(length(max = 1000, message = "notes must be at most 1000 characters"))]
    pub notes: String,
}

pub(crate) fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("product_name must not be blank".into());
        return Err(err);
    }
    Ok(())
}

/// What the verdict branch changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReconciliationOutcome {
    Stocked {
        product_id: i32,
        product_created: bool,
        inventory_id: i32,
        inventory_created: bool,
        quantity_on_hand: i32,
    },
    ReturnIssued {
        return_id: i32,
        status: ReturnStatus,
    },
}

/// Result of a fully applied quality check.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowReport {
    pub quality_check: quality_check::Model,
    pub outcome: ReconciliationOutcome,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QualityCheckFilter {
    pub reception_id: Option<i32>,
    pub reconciliation_status: Option<ReconciliationStatus>,
}

/// Bounds a single store operation by `limit`, attributing expiry to `stage`.
pub async fn bounded<F, T>(
    stage: WorkflowStage,
    limit: Duration,
    operation: F,
) -> Result<T, ServiceError>
where
    F: Future<Output = Result<T, ServiceError>>,
{
    match tokio::time::timeout(limit, operation).await {
        Ok(result) => result,
        Err(_) => {
            warn!(%stage, ?limit, "workflow step timed out");
            Err(ServiceError::Timeout {
                stage,
                after: limit,
            })
        }
    }
}

/// Records quality checks and applies their consequence: stock for PASS, a return for FAIL.
///
/// The check row is committed first. The verdict branch and the flip of
/// `reconciliation_status` to COMPLETED share one transaction, so a check is either
/// fully reconciled or left FAILED/PENDING with nothing downstream written.
#[derive(Clone)]
pub struct QualityCheckWorkflow {
    db: Arc<DbPool>,
    resolver: ProductResolver,
    ledger: InventoryLedger,
    issuer: ReturnIssuer,
    step_timeout: Duration,
}

impl QualityCheckWorkflow {
    pub fn new(db: Arc<DbPool>, settings: WorkflowSettings) -> Self {
        Self {
            db,
            resolver: ProductResolver::new(settings.default_category_id),
            ledger: InventoryLedger::new(settings.default_location_id),
            issuer: ReturnIssuer::new(),
            step_timeout: settings.step_timeout,
        }
    }

    /// Validates and stores a check, then applies its verdict.
    #[instrument(skip(self, command), fields(product_name = %command.product_name, verdict = %command.verdict))]
    pub async fn submit(
        &self,
        command: RecordQualityCheckCommand,
    ) -> Result<WorkflowReport, ServiceError> {
        enter(WorkflowState::ReceivedInput, None);
        command.validate().map_err(|e| {
            warn!(error = %e, "quality check rejected");
            ServiceError::ValidationError(e.to_string())
        })?;

        let check = self.persist_check(command).await?;
        enter(WorkflowState::CheckPersisted, Some(check.id));

        self.apply_verdict(check).await
    }

    /// Re-runs only the verdict branch for a stored check that has not been reconciled.
    #[instrument(skip(self))]
    pub async fn reconcile(&self, quality_check_id: i32) -> Result<WorkflowReport, ServiceError> {
        let check = self
            .get_check(quality_check_id)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Quality check {quality_check_id} not found"))
            })?;

        if check.is_reconciled() {
            return Err(ServiceError::Conflict(format!(
                "Quality check {quality_check_id} is already reconciled"
            )));
        }

        info!(
            quality_check_id,
            previous_error = ?check.reconciliation_error,
            "reconciling quality check"
        );
        self.apply_verdict(check).await
    }

    #[instrument(skip(self))]
    pub async fn get_check(
        &self,
        quality_check_id: i32,
    ) -> Result<Option<quality_check::Model>, ServiceError> {
        bounded(WorkflowStage::LoadCheck, self.step_timeout, async {
            quality_check::Entity::find_by_id(quality_check_id)
                .one(self.db.as_ref())
                .await
                .map_err(ServiceError::DatabaseError)
        })
        .await
    }

    /// Checks in the order they were recorded.
    #[instrument(skip(self))]
    pub async fn list_checks(
        &self,
        filter: QualityCheckFilter,
    ) -> Result<Vec<quality_check::Model>, ServiceError> {
        let mut query = quality_check::Entity::find();
        if let Some(reception_id) = filter.reception_id {
            query = query.filter(quality_check::Column::ReceptionId.eq(reception_id));
        }
        if let Some(status) = filter.reconciliation_status {
            query = query.filter(quality_check::Column::ReconciliationStatus.eq(status));
        }

        let query = query
            .order_by_asc(quality_check::Column::CheckedAt)
            .order_by_asc(quality_check::Column::Id);

        bounded(WorkflowStage::LoadCheck, self.step_timeout, async {
            query
                .all(self.db.as_ref())
                .await
                .map_err(ServiceError::DatabaseError)
        })
        .await
    }

    async fn persist_check(
        &self,
        command: RecordQualityCheckCommand,
    ) -> Result<quality_check::Model, ServiceError> {
        let record = quality_check::ActiveModel {
            reception_id: Set(command.reception_id),
            product_name: Set(command.product_name),
            quantity: Set(command.quantity),
            status: Set(command.verdict),
            notes: Set(command.notes),
            reconciliation_status: Set(ReconciliationStatus::Pending),
            reconciliation_error: Set(None),
            checked_at: Set(Utc::now()),
            ..Default::default()
        };

        let db = self.db.clone();
        let check = bounded(WorkflowStage::PersistCheck, self.step_timeout, async move {
            record
                .insert(db.as_ref())
                .await
                .map_err(ServiceError::persistence(WorkflowStage::PersistCheck))
        })
        .await
        .map_err(|e| {
            error!(error = %e, "failed to persist quality check");
            e
        })?;

        info!(quality_check_id = check.id, "quality check recorded");
        Ok(check)
    }

    async fn apply_verdict(
        &self,
        check: quality_check::Model,
    ) -> Result<WorkflowReport, ServiceError> {
        let quality_check_id = check.id;
        let verdict = check.status;

        match self.run_branch(check).await {
            Ok(report) => {
                enter(WorkflowState::Completed, Some(quality_check_id));
                info!(quality_check_id, outcome = ?report.outcome, "quality check reconciled");
                Ok(report)
            }
            Err(err @ ServiceError::Conflict(_)) => {
                warn!(quality_check_id, error = %err, "quality check reconciled elsewhere");
                Err(err)
            }
            Err(err) => {
                let stage = err.stage().unwrap_or(match verdict {
                    QualityVerdict::Pass => WorkflowStage::ResolveProduct,
                    QualityVerdict::Fail => WorkflowStage::IssueReturn,
                });
                enter(WorkflowState::PartiallyFailed, Some(quality_check_id));
                error!(
                    quality_check_id,
                    %stage,
                    error = %err,
                    "quality check recorded but its consequence was not applied"
                );

                let reason = err.to_string();
                self.record_failure(quality_check_id, &reason).await;

                Err(ServiceError::PartialWorkflowFailure {
                    quality_check_id,
                    stage,
                    reason,
                })
            }
        }
    }

    /// Runs the verdict branch and the COMPLETED flip in one transaction.
    ///
    /// Opening the transaction, every step inside it, and the commit are each bounded
    /// by the step timeout. Any error rolls the transaction back.
    async fn run_branch(
        &self,
        check: quality_check::Model,
    ) -> Result<WorkflowReport, ServiceError> {
        let limit = self.step_timeout;
        let opening_stage = match check.status {
            QualityVerdict::Pass => WorkflowStage::ResolveProduct,
            QualityVerdict::Fail => WorkflowStage::IssueReturn,
        };

        let txn = bounded(opening_stage, limit, async {
            self.db
                .begin()
                .await
                .map_err(ServiceError::persistence(opening_stage))
        })
        .await?;

        match self.apply_in(&txn, &check).await {
            Ok(report) => {
                bounded(WorkflowStage::MarkReconciled, limit, async move {
                    txn.commit()
                        .await
                        .map_err(ServiceError::persistence(WorkflowStage::MarkReconciled))
                })
                .await?;
                Ok(report)
            }
            Err(err) => {
                let rollback = bounded(opening_stage, limit, async move {
                    txn.rollback()
                        .await
                        .map_err(ServiceError::persistence(opening_stage))
                })
                .await;
                if let Err(rollback_err) = rollback {
                    warn!(
                        quality_check_id = check.id,
                        error = %rollback_err,
                        "transaction rollback failed"
                    );
                }
                Err(err)
            }
        }
    }

    async fn apply_in(
        &self,
        txn: &DatabaseTransaction,
        check: &quality_check::Model,
    ) -> Result<WorkflowReport, ServiceError> {
        let limit = self.step_timeout;

        let outcome = match check.status {
            QualityVerdict::Fail => {
                enter(WorkflowState::IssuingReturn, Some(check.id));
                let issued = bounded(
                    WorkflowStage::IssueReturn,
                    limit,
                    self.issuer.issue_from_failed_check(txn, check),
                )
                .await?;
                ReconciliationOutcome::ReturnIssued {
                    return_id: issued.id,
                    status: issued.status,
                }
            }
            QualityVerdict::Pass => {
                enter(WorkflowState::ResolvingProduct, Some(check.id));
                let product = bounded(
                    WorkflowStage::ResolveProduct,
                    limit,
                    self.resolver.resolve_or_create(txn, &check.product_name),
                )
                .await?;
                let stock = bounded(
                    WorkflowStage::UpsertInventory,
                    limit,
                    self.ledger
                        .upsert(txn, product.id, &check.product_name, check.quantity),
                )
                .await?;
                ReconciliationOutcome::Stocked {
                    product_id: product.id,
                    product_created: product.created,
                    inventory_id: stock.inventory_id,
                    inventory_created: stock.created,
                    quantity_on_hand: stock.quantity_on_hand,
                }
            }
        };

        let quality_check = bounded(
            WorkflowStage::MarkReconciled,
            limit,
            mark_reconciled(txn, check.id),
        )
        .await?;

        Ok(WorkflowReport {
            quality_check,
            outcome,
        })
    }

    /// Stores the failure on the check row. Runs after the branch rolled back.
    async fn record_failure(&self, quality_check_id: i32, reason: &str) {
        let update = quality_check::Entity::update_many()
            .set(quality_check::ActiveModel {
                reconciliation_status: Set(ReconciliationStatus::Failed),
                reconciliation_error: Set(Some(reason.to_owned())),
                ..Default::default()
            })
            .filter(quality_check::Column::Id.eq(quality_check_id))
            .filter(quality_check::Column::ReconciliationStatus.ne(ReconciliationStatus::Completed));

        let db = self.db.clone();
        let result = bounded(WorkflowStage::MarkReconciled, self.step_timeout, async move {
            update
                .exec(db.as_ref())
                .await
                .map_err(ServiceError::persistence(WorkflowStage::MarkReconciled))
        })
        .await;

        if let Err(err) = result {
            error!(
                quality_check_id,
                error = %err,
                "could not record reconciliation failure on quality check"
            );
        }
    }
}

/// Flips the check to COMPLETED unless another invocation already did.
async fn mark_reconciled<C>(
    conn: &C,
    quality_check_id: i32,
) -> Result<quality_check::Model, ServiceError>
where
    C: ConnectionTrait,
{
    let result = quality_check::Entity::update_many()
        .set(quality_check::ActiveModel {
            reconciliation_status: Set(ReconciliationStatus::Completed),
            reconciliation_error: Set(None),
            ..Default::default()
        })
        .filter(quality_check::Column::Id.eq(quality_check_id))
        .filter(quality_check::Column::ReconciliationStatus.ne(ReconciliationStatus::Completed))
        .exec(conn)
        .await
        .map_err(ServiceError::persistence(WorkflowStage::MarkReconciled))?;

    if result.rows_affected == 0 {
        return Err(ServiceError::Conflict(format!(
            "Quality check {quality_check_id} is already reconciled"
        )));
    }

    quality_check::Entity::find_by_id(quality_check_id)
        .one(conn)
        .await
        .map_err(ServiceError::persistence(WorkflowStage::MarkReconciled))?
        .ok_or_else(|| ServiceError::Persistence {
            stage: WorkflowStage::MarkReconciled,
            source: DbErr::RecordNotFound(format!("quality_checks {quality_check_id}")),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn command(quantity: i32, product_name: &str) -> RecordQualityCheckCommand {
        RecordQualityCheckCommand {
            reception_id: 1,
            product_name: product_name.into(),
            quantity,
            verdict: QualityVerdict::Pass,
            notes: String::new(),
        }
    }

    #[test]
    fn command_validation() {
        assert!(command(10, "Widget").validate().is_ok());

        let err = command(0, "Widget").validate().unwrap_err();
        assert!(err.field_errors().contains_key("quantity"));

        let err = command(-4, "Widget").validate().unwrap_err();
        assert!(err.field_errors().contains_key("quantity"));

        let err = command(3, "   ").validate().unwrap_err();
        assert!(err.field_errors().contains_key("product_name"));

        let err = command(3, "").validate().unwrap_err();
        assert!(err.field_errors().contains_key("product_name"));
    }

    #[tokio::test]
    async fn bounded_passes_through_results() {
        let value = bounded(WorkflowStage::PersistCheck, Duration::from_secs(1), async {
            Ok::<_, ServiceError>(7)
        })
        .await
        .unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn bounded_reports_stage_on_expiry() {
        let result = bounded(
            WorkflowStage::UpsertInventory,
            Duration::from_millis(10),
            std::future::pending::<Result<(), ServiceError>>(),
        )
        .await;

        assert_matches!(
            result,
            Err(ServiceError::Timeout {
                stage: WorkflowStage::UpsertInventory,
                ..
            })
        );
    }

    #[test]
    fn stage_and_state_render_for_logs() {
        assert_eq!(WorkflowStage::IssueReturn.to_string(), "issue_return");
        assert_eq!(WorkflowState::PartiallyFailed.to_string(), "PARTIALLY_FAILED");
    }

    #[test]
    fn settings_follow_config() {
        let mut cfg = AppConfig::new("sqlite::memory:".into(), "127.0.0.1".into(), 0, "test".into());
        cfg.default_location_id = 4;
        cfg.workflow_step_timeout_ms = 250;

        let settings = WorkflowSettings::from(&cfg);
        assert_eq!(settings.default_location_id, 4);
        assert_eq!(settings.default_category_id, 1);
        assert_eq!(settings.step_timeout, Duration::from_millis(250));
    }
}
