use crate::{
    db::DbPool,
    errors::ServiceError,
    services::{
        inventory::InventoryService,
        quality_checks::{QualityCheckWorkflow, WorkflowSettings},
        returns::ReturnService,
    },
};
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query,
    },
    Json,
};
use std::sync::Arc;

pub mod inventory;
pub mod quality_checks;
pub mod returns;

/// Services shared by every handler.
#[derive(Clone)]
pub struct AppServices {
    pub quality_checks: Arc<QualityCheckWorkflow>,
    pub returns: Arc<ReturnService>,
    pub inventory: Arc<InventoryService>,
}

impl AppServices {
    pub fn new(db_pool: Arc<DbPool>, settings: WorkflowSettings) -> Self {
        Self {
            quality_checks: Arc::new(QualityCheckWorkflow::new(db_pool.clone(), settings)),
            returns: Arc::new(ReturnService::new(db_pool.clone())),
            inventory: Arc::new(InventoryService::new(db_pool, settings)),
        }
    }
}

/// Unwraps a JSON body, turning malformed payloads into `400 Bad Request`.
pub(crate) fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ServiceError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| ServiceError::BadRequest(rejection.body_text()))
}

/// Unwraps query parameters, turning unparseable values into `400 Bad Request`.
pub(crate) fn query_params<T>(query: Result<Query<T>, QueryRejection>) -> Result<T, ServiceError> {
    query
        .map(|Query(params)| params)
        .map_err(|rejection| ServiceError::BadRequest(rejection.body_text()))
}
