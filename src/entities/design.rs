use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A saved furniture configuration owned by one user.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "designs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub cart_status: CartStatus,
    #[sea_orm(nullable)]
    pub external_cart_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::purchase_audit_log::Entity")]
    PurchaseAuditLogs,
}

impl Related<super::purchase_audit_log::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PurchaseAuditLogs.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Where a design stands relative to the external cart.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter, DeriveActiveEnum,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
pub enum CartStatus {
    #[sea_orm(string_value = "saved")]
    Saved,
    #[sea_orm(string_value = "in_cart")]
    InCart,
    #[sea_orm(string_value = "purchased")]
    Purchased,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

impl CartStatus {
    /// True once the design has been handed to the external cart.
    pub fn is_committed(&self) -> bool {
        matches!(self, CartStatus::InCart | CartStatus::Purchased)
    }
}
