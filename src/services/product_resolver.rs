use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::OnConflict, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, Set,
};
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::{
    entities::warehouse_product,
    errors::ServiceError,
    services::quality_checks::WorkflowStage,
};

/// Description stamped on products created on first sight.
pub const AUTO_CREATED_DESCRIPTION: &str = "Auto-created from quality check";

const AUTO_SKU_PREFIX: &str = "AUTO-";

/// A product id together with whether this call created the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResolvedProduct {
    pub id: i32,
    pub created: bool,
}

/// Maps product names to stable product ids, creating placeholder products on demand.
#[derive(Debug, Clone)]
pub struct ProductResolver {
    default_category_id: i32,
}

impl ProductResolver {
    pub fn new(default_category_id: i32) -> Self {
        Self {
            default_category_id,
        }
    }

    /// Returns the id for `name`, inserting a placeholder product if none exists.
    ///
    /// The insert runs first, as `ON CONFLICT (name) DO NOTHING`, followed by a read of
    /// the surviving row. A known name and a name created by a concurrent caller take the
    /// same path. Opening with a write also makes SQLite take the write lock up front,
    /// where its busy timeout applies.
    #[instrument(skip(self, conn))]
    pub async fn resolve_or_create<C>(
        &self,
        conn: &C,
        name: &str,
    ) -> Result<ResolvedProduct, ServiceError>
    where
        C: ConnectionTrait,
    {
        let candidate = warehouse_product::ActiveModel {
            name: Set(name.to_owned()),
            sku: Set(placeholder_sku(name)),
            category_id: Set(self.default_category_id),
            description: Set(Some(AUTO_CREATED_DESCRIPTION.to_owned())),
            price: Set(Decimal::ZERO),
            created_at: Set(Utc::now()),
            ..Default::default()
        };

        let inserted = warehouse_product::Entity::insert(candidate)
            .on_conflict(
                OnConflict::column(warehouse_product::Column::Name)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(conn)
            .await
            .map_err(ServiceError::persistence(WorkflowStage::ResolveProduct))?;

        let product = find_by_name(conn, name).await?.ok_or_else(|| {
            ServiceError::Persistence {
                stage: WorkflowStage::ResolveProduct,
                source: DbErr::RecordNotFound(format!("warehouse_product '{name}'")),
            }
        })?;

        let created = inserted > 0;
        if created {
            info!(product_id = product.id, "placeholder product created");
        } else {
            debug!(product_id = product.id, "product already known");
        }

        Ok(ResolvedProduct {
            id: product.id,
            created,
        })
    }
}

async fn find_by_name<C>(
    conn: &C,
    name: &str,
) -> Result<Option<warehouse_product::Model>, ServiceError>
where
    C: ConnectionTrait,
{
    warehouse_product::Entity::find()
        .filter(warehouse_product::Column::Name.eq(name))
        .one(conn)
        .await
        .map_err(ServiceError::persistence(WorkflowStage::ResolveProduct))
}

pub fn placeholder_sku(name: &str) -> String {
    format!("{AUTO_SKU_PREFIX}{name}")
}
