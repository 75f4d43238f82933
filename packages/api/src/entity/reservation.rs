use super::sea_orm_active_enums::PlatformKind;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "reservation")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false, column_type = "Text")]
    pub id: String,
    #[sea_orm(column_type = "Text")]
    pub user_id: String,
    /// At most one reservation per job
    #[sea_orm(column_type = "Text", unique)]
    pub job_id: String,
    #[sea_orm(column_type = "Text")]
    pub restaurant_id: String,
    pub platform: PlatformKind,
    pub confirmation: Json,
    /// Seating instant (UTC)
    pub reservation_at: DateTime,
    pub party_size: i32,
    pub created_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
