use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "drop_config_restaurant")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false, column_type = "Text")]
    pub drop_config_id: String,
    #[sea_orm(primary_key, auto_increment = false, column_type = "Text")]
    pub restaurant_id: String,
    /// Successful bookings for this restaurant using this config
    #[sea_orm(default_value = 0)]
    pub confidence: i64,
    pub created_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
