use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder, TransactionTrait};
use serde::Deserialize;
use std::{sync::Arc, time::Duration};
use tracing::{info, instrument, warn};
use validator::Validate;

use crate::{
    db::DbPool,
    entities::{inventory, location},
    errors::ServiceError,
    services::{
        inventory_ledger::InventoryLedger,
        product_resolver::ProductResolver,
        quality_checks::{bounded, WorkflowSettings, WorkflowStage},
    },
};

/// Location reported for stock rows whose location is missing.
pub const UNKNOWN_LOCATION: &str = "Unknown Location";

/// An inventory row together with the name of the location holding it.
#[derive(Debug, Clone)]
pub struct StockWithLocation {
    pub record: inventory::Model,
    pub location: String,
}

impl From<(inventory::Model, Option<location::Model>)> for StockWithLocation {
    fn from((record, location): (inventory::Model, Option<location::Model>)) -> Self {
        Self {
            record,
            location: location
                .map(|l| l.name)
                .unwrap_or_else(|| UNKNOWN_LOCATION.to_string()),
        }
    }
}

/// Stock counted in by hand, outside the quality check flow.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ReceiveStockCommand {
    #[validate(
        length(min = 1, max = 255, message = "product_name must be 1-255 characters"),
        custom = "crate::services::quality_checks::not_blank"
    )]
    pub product_name: String,
    #[validate(range(min = 1, message = "quantity must be greater than zero"))]
    pub quantity: i32,
    #[validate(range(min = 0, message = "min_stock must not be negative"))]
    pub min_stock: Option<i32>,
}

/// Outcome of a manual stock receipt.
#[derive(Debug, Clone)]
pub struct StockReceipt {
    pub product_created: bool,
    pub inventory_created: bool,
    pub stock: StockWithLocation,
}

#[derive(Clone)]
pub struct InventoryService {
    db_pool: Arc<DbPool>,
    resolver: ProductResolver,
    ledger: InventoryLedger,
    step_timeout: Duration,
}

impl InventoryService {
    pub fn new(db_pool: Arc<DbPool>, settings: WorkflowSettings) -> Self {
        Self {
            db_pool,
            resolver: ProductResolver::new(settings.default_category_id),
            ledger: InventoryLedger::new(settings.default_location_id),
            step_timeout: settings.step_timeout,
        }
    }

    /// Inventory rows with stock on hand, ordered by product name.
    #[instrument(skip(self))]
    pub async fn list_in_stock(&self) -> Result<Vec<StockWithLocation>, ServiceError> {
        let rows = inventory::Entity::find()
            .find_also_related(location::Entity)
            .filter(inventory::Column::Quantity.gt(0))
            .order_by_asc(inventory::Column::ProductName)
            .all(self.db_pool.as_ref())
            .await
            .map_err(ServiceError::DatabaseError)?;

        Ok(rows.into_iter().map(StockWithLocation::from).collect())
    }

    /// Adds stock for a product by name, creating the product and its inventory row as
    /// needed. Goes through the same resolver and ledger as a passed quality check.
    #[instrument(skip(self, command), fields(product_name = %command.product_name))]
    pub async fn receive(&self, command: ReceiveStockCommand) -> Result<StockReceipt, ServiceError> {
        command.validate().map_err(|e| {
            warn!(error = %e, "stock receipt rejected");
            ServiceError::ValidationError(e.to_string())
        })?;

        let limit = self.step_timeout;
        let product_name = command.product_name.as_str();

        let txn = bounded(WorkflowStage::ResolveProduct, limit, async {
            self.db_pool
                .begin()
                .await
                .map_err(ServiceError::persistence(WorkflowStage::ResolveProduct))
        })
        .await?;

        let product = bounded(
            WorkflowStage::ResolveProduct,
            limit,
            self.resolver.resolve_or_create(&txn, product_name),
        )
        .await?;
        let level = bounded(
            WorkflowStage::UpsertInventory,
            limit,
            self.ledger.receive(
                &txn,
                product.id,
                product_name,
                command.quantity,
                command.min_stock.unwrap_or(0),
            ),
        )
        .await?;

        bounded(WorkflowStage::UpsertInventory, limit, async move {
            txn.commit()
                .await
                .map_err(ServiceError::persistence(WorkflowStage::UpsertInventory))
        })
        .await?;

        info!(
            product_id = product.id,
            inventory_id = level.inventory_id,
            quantity = level.quantity_on_hand,
            "stock received"
        );

        let stock = inventory::Entity::find_by_id(level.inventory_id)
            .find_also_related(location::Entity)
            .one(self.db_pool.as_ref())
            .await
            .map_err(ServiceError::DatabaseError)?
            .map(StockWithLocation::from)
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Inventory {} not found", level.inventory_id))
            })?;

        Ok(StockReceipt {
            product_created: product.created,
            inventory_created: level.created,
            stock,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn receipt(product_name: &str, quantity: i32, min_stock: Option<i32>) -> ReceiveStockCommand {
        ReceiveStockCommand {
            product_name: product_name.into(),
            quantity,
            min_stock,
        }
    }

    #[test]
    fn receipt_validation() {
        assert!(receipt("Crate", 1, None).validate().is_ok());
        assert!(receipt("Crate", 1, Some(0)).validate().is_ok());
        assert!(receipt("Crate", 0, None).validate().is_err());
        assert!(receipt("Crate", 2, Some(-1)).validate().is_err());
        assert!(receipt("  ", 2, None).validate().is_err());
    }

    #[tokio::test]
    async fn receipts_accumulate_on_one_row_at_the_default_location() {
        let service = InventoryService::new(
            Arc::new(crate::db::memory_pool().await),
            WorkflowSettings::default(),
        );

        let first = service.receive(receipt("Crate", 4, Some(2))).await.unwrap();
        assert!(first.product_created);
        assert!(first.inventory_created);
        assert_eq!(first.stock.record.quantity, 4);
        assert_eq!(first.stock.record.min_stock, 2);
        assert_eq!(first.stock.location, "Main Warehouse");

        let second = service.receive(receipt("Crate", 6, Some(9))).await.unwrap();
        assert!(!second.product_created);
        assert!(!second.inventory_created);
        assert_eq!(second.stock.record.id, first.stock.record.id);
        assert_eq!(second.stock.record.quantity, 10);
        assert_eq!(second.stock.record.min_stock, 2);

        assert_matches!(
            service.receive(receipt("Crate", 0, None)).await,
            Err(ServiceError::ValidationError(_))
        );
        assert_eq!(service.list_in_stock().await.unwrap().len(), 1);
    }
}
