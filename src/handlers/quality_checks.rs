use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::instrument;

use crate::{
    entities::quality_check::{self, QualityVerdict, ReconciliationStatus},
    errors::ServiceError,
    handlers::{json_body, query_params},
    services::quality_checks::{
        QualityCheckFilter, ReconciliationOutcome, RecordQualityCheckCommand, WorkflowReport,
        WorkflowState,
    },
    ApiResponse, ApiResult, AppState,
};

#[derive(Debug, Deserialize)]
pub struct CreateQualityCheckRequest {
    pub reception_id: i32,
    pub product_name: String,
    pub quantity: i32,
    /// `PASS` or `FAIL`
    pub status: String,
    #[serde(default)]
    pub notes: Option<String>,
}

impl TryFrom<CreateQualityCheckRequest> for RecordQualityCheckCommand {
    type Error = ServiceError;

    fn try_from(request: CreateQualityCheckRequest) -> Result<Self, Self::Error> {
        let verdict = QualityVerdict::from_str(request.status.trim()).map_err(|_| {
            ServiceError::ValidationError(format!(
                "status must be PASS or FAIL, got '{}'",
                request.status
            ))
        })?;

        Ok(Self {
            reception_id: request.reception_id,
            product_name: request.product_name.trim().to_string(),
            quantity: request.quantity,
            verdict,
            notes: request.notes.unwrap_or_default(),
        })
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct QualityCheckListQuery {
    pub reception_id: Option<i32>,
    pub reconciliation_status: Option<String>,
}

impl TryFrom<QualityCheckListQuery> for QualityCheckFilter {
    type Error = ServiceError;

    fn try_from(query: QualityCheckListQuery) -> Result<Self, Self::Error> {
        let reconciliation_status = query
            .reconciliation_status
            .as_deref()
            .map(|raw| {
                ReconciliationStatus::from_str(raw).map_err(|_| {
                    ServiceError::ValidationError(format!(
                        "reconciliation_status must be PENDING, COMPLETED or FAILED, got '{raw}'"
                    ))
                })
            })
            .transpose()?;

        Ok(Self {
            reception_id: query.reception_id,
            reconciliation_status,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct QualityCheckSummary {
    pub id: i32,
    pub reception_id: i32,
    pub product_name: String,
    pub quantity: i32,
    pub status: QualityVerdict,
    pub notes: String,
    pub reconciliation_status: ReconciliationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reconciliation_error: Option<String>,
    pub checked_at: DateTime<Utc>,
}

impl From<quality_check::Model> for QualityCheckSummary {
    fn from(model: quality_check::Model) -> Self {
        Self {
            id: model.id,
            reception_id: model.reception_id,
            product_name: model.product_name,
            quantity: model.quantity,
            status: model.status,
            notes: model.notes,
            reconciliation_status: model.reconciliation_status,
            reconciliation_error: model.reconciliation_error,
            checked_at: model.checked_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct QualityCheckCreated {
    pub message: String,
    pub state: WorkflowState,
    pub quality_check: QualityCheckSummary,
    pub outcome: ReconciliationOutcome,
}

impl From<WorkflowReport> for QualityCheckCreated {
    fn from(report: WorkflowReport) -> Self {
        let message = match &report.outcome {
            ReconciliationOutcome::Stocked {
                quantity_on_hand, ..
            } => format!("Quality check passed; {quantity_on_hand} units now on hand"),
            ReconciliationOutcome::ReturnIssued { return_id, .. } => {
                format!("Quality check failed; return {return_id} issued")
            }
        };

        Self {
            message,
            state: WorkflowState::Completed,
            quality_check: report.quality_check.into(),
            outcome: report.outcome,
        }
    }
}

/// Record a quality check and apply its verdict
#[instrument(skip(state, payload))]
pub async fn create_quality_check(
    State(state): State<AppState>,
    payload: Result<Json<CreateQualityCheckRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<QualityCheckCreated>>), ServiceError> {
    let command = RecordQualityCheckCommand::try_from(json_body(payload)?)?;
    let report = state.services.quality_checks.submit(command).await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(QualityCheckCreated::from(report))),
    ))
}

/// List quality checks in recording order
#[instrument(skip(state))]
pub async fn list_quality_checks(
    State(state): State<AppState>,
    query: Result<Query<QualityCheckListQuery>, QueryRejection>,
) -> ApiResult<Vec<QualityCheckSummary>> {
    let filter = QualityCheckFilter::try_from(query_params(query)?)?;
    let checks = state.services.quality_checks.list_checks(filter).await?;

    Ok(Json(ApiResponse::success(
        checks.into_iter().map(QualityCheckSummary::from).collect(),
    )))
}

#[instrument(skip(state))]
pub async fn get_quality_check(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> ApiResult<QualityCheckSummary> {
    let check = state
        .services
        .quality_checks
        .get_check(id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Quality check {id} not found")))?;

    Ok(Json(ApiResponse::success(check.into())))
}

/// Retry the stock or return step for a check whose earlier attempt failed
#[instrument(skip(state))]
pub async fn reconcile_quality_check(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> ApiResult<QualityCheckCreated> {
    let report = state.services.quality_checks.reconcile(id).await?;
    Ok(Json(ApiResponse::success(report.into())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn request(status: &str) -> CreateQualityCheckRequest {
        CreateQualityCheckRequest {
            reception_id: 3,
            product_name: "  Widget ".into(),
            quantity: 10,
            status: status.into(),
            notes: None,
        }
    }

    #[test]
    fn request_maps_to_command() {
        let command = RecordQualityCheckCommand::try_from(request("FAIL")).unwrap();
        assert_eq!(command.verdict, QualityVerdict::Fail);
        assert_eq!(command.product_name, "Widget");
        assert_eq!(command.notes, "");
    }

    #[test]
    fn unknown_verdict_is_a_validation_error() {
        assert_matches!(
            RecordQualityCheckCommand::try_from(request("MAYBE")),
            Err(ServiceError::ValidationError(msg)) if msg.contains("MAYBE")
        );
    }

    #[test]
    fn list_query_rejects_unknown_reconciliation_status() {
        let query = QualityCheckListQuery {
            reception_id: None,
            reconciliation_status: Some("DONE".into()),
        };
        assert_matches!(
            QualityCheckFilter::try_from(query),
            Err(ServiceError::ValidationError(_))
        );
    }
}
