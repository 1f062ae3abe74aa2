use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::instrument;

use crate::{
    entities::returns::{self, ReturnStatus, ReturnType},
    errors::ServiceError,
    handlers::json_body,
    services::returns::{CreateReturnCommand, ReturnWithSupplier},
    ApiResponse, ApiResult, AppState,
};

#[derive(Debug, Serialize)]
pub struct ReturnSummary {
    pub id: i32,
    pub quality_check_id: Option<i32>,
    pub reception_id: i32,
    pub product_name: String,
    pub quantity: i32,
    pub reason: String,
    pub return_type: ReturnType,
    pub status: ReturnStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supplier: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<returns::Model> for ReturnSummary {
    fn from(model: returns::Model) -> Self {
        Self {
            id: model.id,
            quality_check_id: model.quality_check_id,
            reception_id: model.reception_id,
            product_name: model.product_name,
            quantity: model.quantity,
            reason: model.reason,
            return_type: model.return_type,
            status: model.status,
            supplier: None,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

impl From<ReturnWithSupplier> for ReturnSummary {
    fn from(row: ReturnWithSupplier) -> Self {
        Self {
            supplier: Some(row.supplier),
            ..ReturnSummary::from(row.record)
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateReturnRequest {
    pub reception_id: i32,
    pub product_name: String,
    pub quantity: i32,
    #[serde(default)]
    pub reason: Option<String>,
    /// `DAMAGED`, `WRONG_ITEM`, `EXCESS` or `OTHER`
    pub return_type: String,
}

impl TryFrom<CreateReturnRequest> for CreateReturnCommand {
    type Error = ServiceError;

    fn try_from(request: CreateReturnRequest) -> Result<Self, Self::Error> {
        let return_type = ReturnType::from_str(request.return_type.trim()).map_err(|_| {
            ServiceError::ValidationError(format!(
                "return_type must be one of DAMAGED, WRONG_ITEM, EXCESS, OTHER; got '{}'",
                request.return_type
            ))
        })?;

        Ok(Self {
            reception_id: request.reception_id,
            product_name: request.product_name.trim().to_string(),
            quantity: request.quantity,
            reason: request.reason.unwrap_or_default(),
            return_type,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateReturnStatusRequest {
    pub status: String,
}

/// List returns, newest first
#[instrument(skip(state))]
pub async fn list_returns(State(state): State<AppState>) -> ApiResult<Vec<ReturnSummary>> {
    let rows = state.services.returns.list_returns().await?;
    Ok(Json(ApiResponse::success(
        rows.into_iter().map(ReturnSummary::from).collect(),
    )))
}

/// Record a return by hand
#[instrument(skip(state, payload))]
pub async fn create_return(
    State(state): State<AppState>,
    payload: Result<Json<CreateReturnRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<ReturnSummary>>), ServiceError> {
    let command = CreateReturnCommand::try_from(json_body(payload)?)?;
    let created = state.services.returns.create_manual(command).await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(created.into())),
    ))
}

/// Move a return through its approval lifecycle
#[instrument(skip(state, payload))]
pub async fn update_return_status(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    payload: Result<Json<UpdateReturnStatusRequest>, JsonRejection>,
) -> ApiResult<ReturnSummary> {
    let request = json_body(payload)?;
    let next = ReturnStatus::from_str(request.status.trim()).map_err(|_| {
        ServiceError::ValidationError(format!(
            "status must be one of PENDING, APPROVED, REJECTED, COMPLETED; got '{}'",
            request.status
        ))
    })?;

    let updated = state.services.returns.update_status(id, next).await?;
    Ok(Json(ApiResponse::success(updated.into())))
}
