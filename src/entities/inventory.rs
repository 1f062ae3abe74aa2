use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Stock on hand for one product. At most one row per product.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "inventory")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub product_id: i32,
    pub product_name: String,
    pub quantity: i32,
    pub min_stock: i32,
    pub location_id: i32,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::warehouse_product::Entity",
        from = "Column::ProductId",
        to = "super::warehouse_product::Column::Id"
    )]
    WarehouseProduct,
    #[sea_orm(
        belongs_to = "super::location::Entity",
        from = "Column::LocationId",
        to = "super::location::Column::Id"
    )]
    Location,
}

impl Related<super::warehouse_product::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::WarehouseProduct.def()
    }
}

impl Related<super::location::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Location.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn is_low_stock(&self) -> bool {
        self.quantity <= self.min_stock
    }
}
