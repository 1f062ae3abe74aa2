use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::error::DbErr;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::services::quality_checks::WorkflowStage;

fn current_request_id() -> Option<String> {
    crate::telemetry::current_request_id().map(|rid| rid.as_str().to_string())
}

/// Body returned for every failed request.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// HTTP status category (e.g. "Bad Request")
    pub error: String,
    /// Human-readable error description
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// Workflow stage that failed, when the error came from the quality check workflow
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<WorkflowStage>,
    /// Set when a quality check was stored but its consequence did not apply
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality_check_id: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] DbErr),

    #[error("Persistence error during {stage}: {source}")]
    Persistence {
        stage: WorkflowStage,
        #[source]
        source: DbErr,
    },

    #[error("Timed out after {after:?} during {stage}")]
    Timeout { stage: WorkflowStage, after: Duration },

    #[error("Quality check {quality_check_id} was recorded but {stage} failed: {reason}")]
    PartialWorkflowFailure {
        quality_check_id: i32,
        stage: WorkflowStage,
        reason: String,
    },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid status: {0}")]
    InvalidStatus(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl ServiceError {
    /// Adapter for `map_err` that tags a store failure with the stage it happened in.
    pub fn persistence(stage: WorkflowStage) -> impl FnOnce(DbErr) -> Self {
        move |source| ServiceError::Persistence { stage, source }
    }

    /// The workflow stage this error is attributed to, if any.
    pub fn stage(&self) -> Option<WorkflowStage> {
        match self {
            Self::Persistence { stage, .. }
            | Self::Timeout { stage, .. }
            | Self::PartialWorkflowFailure { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::ValidationError(_)
            | Self::BadRequest(_)
            | Self::InvalidStatus(_)
            | Self::InvalidOperation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::DatabaseError(_)
            | Self::Persistence { .. }
            | Self::Timeout { .. }
            | Self::PartialWorkflowFailure { .. }
            | Self::InternalError(_)
            | Self::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to put on the wire. Store errors keep SQL detail in the logs only.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            Self::Persistence { stage, .. } => format!("Persistence error during {stage}"),
            Self::PartialWorkflowFailure {
                quality_check_id,
                stage,
                ..
            } => format!(
                "Quality check {quality_check_id} was recorded but {stage} failed; \
                 its downstream effect was not applied"
            ),
            Self::Other(_) => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }

    fn details(&self) -> Option<String> {
        match self {
            Self::PartialWorkflowFailure {
                quality_check_id, ..
            } => Some(format!(
                "retry with POST /api/v1/quality-checks/{quality_check_id}/reconcile"
            )),
            _ => None,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            tracing::error!(error = %self, stage = ?self.stage(), "request failed");
        } else {
            tracing::warn!(error = %self, "request rejected");
        }

        let quality_check_id = match &self {
            Self::PartialWorkflowFailure {
                quality_check_id, ..
            } => Some(*quality_check_id),
            _ => None,
        };

        let err = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message: self.response_message(),
            details: self.details(),
            stage: self.stage(),
            quality_check_id,
            request_id: current_request_id(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(err)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::{scope_request_id, RequestId};
    use axum::body::to_bytes;

    #[tokio::test]
    async fn error_response_includes_request_id() {
        let response = scope_request_id(RequestId::new("req-123"), async {
            ServiceError::NotFound("missing".into()).into_response()
        })
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let payload: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(payload.request_id.as_deref(), Some("req-123"));
        assert!(payload.stage.is_none());
    }

    #[tokio::test]
    async fn partial_failure_response_names_check_and_retry_route() {
        let response = ServiceError::PartialWorkflowFailure {
            quality_check_id: 42,
            stage: WorkflowStage::IssueReturn,
            reason: "UNIQUE constraint failed: returns.quality_check_id".into(),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let payload: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(payload.quality_check_id, Some(42));
        assert_eq!(payload.stage, Some(WorkflowStage::IssueReturn));
        assert!(payload.message.contains("issue_return"));
        assert!(!payload.message.contains("UNIQUE"));
        assert_eq!(
            payload.details.as_deref(),
            Some("retry with POST /api/v1/quality-checks/42/reconcile")
        );
    }

    #[test]
    fn status_code_mapping() {
        assert_eq!(
            ServiceError::ValidationError("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::InvalidStatus("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::NotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServiceError::Conflict("x".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ServiceError::Timeout {
                stage: WorkflowStage::UpsertInventory,
                after: Duration::from_millis(5)
            }
            .status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn persistence_message_names_stage_but_hides_sql() {
        let err = ServiceError::persistence(WorkflowStage::ResolveProduct)(DbErr::Custom(
            "no such table: warehouse_product".into(),
        ));
        assert_eq!(err.stage(), Some(WorkflowStage::ResolveProduct));
        assert_eq!(
            err.response_message(),
            "Persistence error during resolve_product"
        );
        assert!(err.to_string().contains("no such table"));
    }

    #[test]
    fn database_error_message_is_generic() {
        let err = ServiceError::from(DbErr::Custom("connection refused".into()));
        assert_eq!(err.response_message(), "Database error");
        assert_eq!(err.stage(), None);
    }
}
