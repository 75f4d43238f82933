//! `SeaORM` Entity for DropConfig
//!
//! `(days_in_advance, drop_time)` is unique; restaurants sharing a release
//! pattern share one row through `drop_config_restaurant`.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "drop_config")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false, column_type = "Text")]
    pub id: String,
    pub days_in_advance: i32,
    /// Wall-clock release time in the restaurant's time zone
    #[sea_orm(column_type = "Text")]
    pub drop_time: String,
    /// IANA zone name
    #[sea_orm(column_type = "Text")]
    pub timezone: String,
    #[sea_orm(default_value = 0)]
    pub confidence: i64,
    pub created_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
