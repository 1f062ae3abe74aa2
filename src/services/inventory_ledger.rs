use chrono::{DateTime, Utc};
use sea_orm::{
    sea_query::{Expr, OnConflict},
    ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, Set,
};
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::{entities::inventory, errors::ServiceError, services::quality_checks::WorkflowStage};

/// Stock position after an upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StockLevel {
    pub inventory_id: i32,
    pub quantity_on_hand: i32,
    pub created: bool,
}

/// Increments stock for a resolved product, creating its inventory row on first receipt.
#[derive(Debug, Clone)]
pub struct InventoryLedger {
    default_location_id: i32,
}

impl InventoryLedger {
    pub fn new(default_location_id: i32) -> Self {
        Self {
            default_location_id,
        }
    }

    /// Adds `quantity_delta` units for `product_id`.
    ///
    /// The first receipt inserts the row with `ON CONFLICT (product_id) DO NOTHING`.
    /// When a row already exists, whether from an earlier receipt or a concurrent one,
    /// the insert is a no-op and the delta goes through a single
    /// `quantity = quantity + delta` statement.
    pub async fn upsert<C>(
        &self,
        conn: &C,
        product_id: i32,
        product_name: &str,
        quantity_delta: i32,
    ) -> Result<StockLevel, ServiceError>
    where
        C: ConnectionTrait,
    {
        self.receive(conn, product_id, product_name, quantity_delta, 0)
            .await
    }

    /// Same as [`InventoryLedger::upsert`], with `min_stock` applied only when the row is
    /// created. An existing row keeps its threshold.
    #[instrument(skip(self, conn))]
    pub async fn receive<C>(
        &self,
        conn: &C,
        product_id: i32,
        product_name: &str,
        quantity_delta: i32,
        min_stock: i32,
    ) -> Result<StockLevel, ServiceError>
    where
        C: ConnectionTrait,
    {
        if quantity_delta <= 0 {
            return Err(ServiceError::ValidationError(format!(
                "inventory delta must be positive, got {quantity_delta}"
            )));
        }

        let now = Utc::now();
        let fresh = inventory::ActiveModel {
            product_id: Set(product_id),
            product_name: Set(product_name.to_owned()),
            quantity: Set(quantity_delta),
            min_stock: Set(min_stock),
            location_id: Set(self.default_location_id),
            updated_at: Set(now),
            ..Default::default()
        };

        let inserted = inventory::Entity::insert(fresh)
            .on_conflict(
                OnConflict::column(inventory::Column::ProductId)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(conn)
            .await
            .map_err(ServiceError::persistence(WorkflowStage::UpsertInventory))?;

        let created = inserted > 0;
        if !created && !increment(conn, product_id, quantity_delta, now).await? {
            return Err(ServiceError::Persistence {
                stage: WorkflowStage::UpsertInventory,
                source: DbErr::RecordNotUpdated,
            });
        }

        let record = fetch(conn, product_id).await?;
        if created {
            info!(
                inventory_id = record.id,
                quantity = record.quantity,
                "inventory record created"
            );
        } else {
            debug!(
                inventory_id = record.id,
                quantity = record.quantity,
                "stock incremented"
            );
        }

        Ok(StockLevel {
            inventory_id: record.id,
            quantity_on_hand: record.quantity,
            created,
        })
    }
}

/// Returns whether a row for `product_id` was updated.
async fn increment<C>(
    conn: &C,
    product_id: i32,
    delta: i32,
    now: DateTime<Utc>,
) -> Result<bool, ServiceError>
where
    C: ConnectionTrait,
{
    let result = inventory::Entity::update_many()
        .col_expr(
            inventory::Column::Quantity,
            Expr::col(inventory::Column::Quantity).add(delta),
        )
        .col_expr(inventory::Column::UpdatedAt, Expr::value(now))
        .filter(inventory::Column::ProductId.eq(product_id))
        .exec(conn)
        .await
        .map_err(ServiceError::persistence(WorkflowStage::UpsertInventory))?;

    Ok(result.rows_affected > 0)
}

async fn fetch<C>(conn: &C, product_id: i32) -> Result<inventory::Model, ServiceError>
where
    C: ConnectionTrait,
{
    inventory::Entity::find()
        .filter(inventory::Column::ProductId.eq(product_id))
        .one(conn)
        .await
        .map_err(ServiceError::persistence(WorkflowStage::UpsertInventory))?
        .ok_or_else(|| ServiceError::Persistence {
            stage: WorkflowStage::UpsertInventory,
            source: DbErr::RecordNotFound(format!("inventory for product {product_id}")),
        })
}
