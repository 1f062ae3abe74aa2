use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

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
pub enum ReturnStatus {
    #[sea_orm(string_value = "PENDING")]
    Pending,
    #[sea_orm(string_value = "APPROVED")]
    Approved,
    #[sea_orm(string_value = "REJECTED")]
    Rejected,
    #[sea_orm(string_value = "COMPLETED")]
    Completed,
}

impl ReturnStatus {
    /// PENDING may be approved or rejected; an approved return may be completed.
    pub fn can_transition_to(self, next: ReturnStatus) -> bool {
        matches!(
            (self, next),
            (ReturnStatus::Pending, ReturnStatus::Approved)
                | (ReturnStatus::Pending, ReturnStatus::Rejected)
                | (ReturnStatus::Approved, ReturnStatus::Completed)
        )
    }
}

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
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ReturnType {
    /// Issued by the quality check workflow only.
    #[sea_orm(string_value = "QUALITY_FAIL")]
    QualityFail,
    #[sea_orm(string_value = "DAMAGED")]
    Damaged,
    #[sea_orm(string_value = "WRONG_ITEM")]
    WrongItem,
    #[sea_orm(string_value = "EXCESS")]
    Excess,
    #[sea_orm(string_value = "OTHER")]
    Other,
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "returns")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    /// Set for returns issued from a failed quality check, empty for manual entries.
    #[sea_orm(unique, nullable)]
    pub quality_check_id: Option<i32>,
    pub reception_id: i32,
    pub product_name: String,
    pub quantity: i32,
    #[sea_orm(column_type = "Text")]
    pub reason: String,
    pub return_type: ReturnType,
    pub status: ReturnStatus,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::quality_check::Entity",
        from = "Column::QualityCheckId",
        to = "super::quality_check::Column::Id"
    )]
    QualityCheck,
    #[sea_orm(
        belongs_to = "super::reception::Entity",
        from = "Column::ReceptionId",
        to = "super::reception::Column::Id"
    )]
    Reception,
}

impl Related<super::quality_check::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::QualityCheck.def()
    }
}

impl Related<super::reception::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Reception.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ReturnStatus::Pending, ReturnStatus::Approved, true)]
    #[case(ReturnStatus::Pending, ReturnStatus::Rejected, true)]
    #[case(ReturnStatus::Approved, ReturnStatus::Completed, true)]
    #[case(ReturnStatus::Pending, ReturnStatus::Completed, false)]
    #[case(ReturnStatus::Approved, ReturnStatus::Rejected, false)]
    #[case(ReturnStatus::Rejected, ReturnStatus::Approved, false)]
    #[case(ReturnStatus::Completed, ReturnStatus::Pending, false)]
    #[case(ReturnStatus::Pending, ReturnStatus::Pending, false)]
    fn return_status_transitions(
        #[case] from: ReturnStatus,
        #[case] to: ReturnStatus,
        #[case] allowed: bool,
    ) {
        assert_eq!(from.can_transition_to(to), allowed);
    }
}
