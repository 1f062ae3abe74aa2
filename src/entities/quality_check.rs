use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Outcome of inspecting a received batch.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum QualityVerdict {
    #[sea_orm(string_value = "PASS")]
    Pass,
    #[sea_orm(string_value = "FAIL")]
    Fail,
}

/// Whether the downstream effect of a check (stock or return) has been applied.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ReconciliationStatus {
    #[sea_orm(string_value = "PENDING")]
    Pending,
    #[sea_orm(string_value = "COMPLETED")]
    Completed,
    #[sea_orm(string_value = "FAILED")]
    Failed,
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "quality_checks")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub reception_id: i32,
    pub product_name: String,
    pub quantity: i32,
    /// Stored in the `status` column.
    pub status: QualityVerdict,
    #[sea_orm(column_type = "Text")]
    pub notes: String,
    pub reconciliation_status: ReconciliationStatus,
    #[sea_orm(column_type = "Text", nullable)]
    pub reconciliation_error: Option<String>,
    pub checked_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_one = "super::returns::Entity")]
    Return,
}

impl Related<super::returns::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Return.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn is_reconciled(&self) -> bool {
        self.reconciliation_status == ReconciliationStatus::Completed
    }
}
