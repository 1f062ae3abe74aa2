use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::{
    errors::ServiceError,
    handlers::json_body,
    services::inventory::{ReceiveStockCommand, StockReceipt, StockWithLocation},
    ApiResponse, ApiResult, AppState,
};

#[derive(Debug, Serialize)]
pub struct InventorySummary {
    pub id: i32,
    pub product_id: i32,
    pub product_name: String,
    pub quantity: i32,
    pub min_stock: i32,
    pub location_id: i32,
    pub location: String,
    pub low_stock: bool,
    pub updated_at: DateTime<Utc>,
}

impl From<StockWithLocation> for InventorySummary {
    fn from(row: StockWithLocation) -> Self {
        let model = row.record;
        Self {
            low_stock: model.is_low_stock(),
            id: model.id,
            product_id: model.product_id,
            product_name: model.product_name,
            quantity: model.quantity,
            min_stock: model.min_stock,
            location_id: model.location_id,
            location: row.location,
            updated_at: model.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ReceiveStockRequest {
    pub product_name: String,
    pub quantity: i32,
    #[serde(default)]
    pub min_stock: Option<i32>,
}

impl From<ReceiveStockRequest> for ReceiveStockCommand {
    fn from(request: ReceiveStockRequest) -> Self {
        Self {
            product_name: request.product_name.trim().to_string(),
            quantity: request.quantity,
            min_stock: request.min_stock,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StockReceived {
    pub product_created: bool,
    pub inventory: InventorySummary,
}

/// Stock on hand, by product name
#[instrument(skip(state))]
pub async fn list_inventory(State(state): State<AppState>) -> ApiResult<Vec<InventorySummary>> {
    let rows = state.services.inventory.list_in_stock().await?;
    Ok(Json(ApiResponse::success(
        rows.into_iter().map(InventorySummary::from).collect(),
    )))
}

/// Add stock by hand; 201 when the product had no inventory row yet
#[instrument(skip(state, payload))]
pub async fn receive_stock(
    State(state): State<AppState>,
    payload: Result<Json<ReceiveStockRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<StockReceived>>), ServiceError> {
    let command = ReceiveStockCommand::from(json_body(payload)?);
    let StockReceipt {
        product_created,
        inventory_created,
        stock,
    } = state.services.inventory.receive(command).await?;

    let status = if inventory_created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((
        status,
        Json(ApiResponse::success(StockReceived {
            product_created,
            inventory: stock.into(),
        })),
    ))
}
