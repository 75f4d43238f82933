//! `SeaORM` Entity for Job
//!
//! One reservation attempt against one drop. The callback secret is only
//! ever stored as an Argon2id PHC string.

use super::sea_orm_active_enums::{JobStatus, PlatformKind};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "job")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false, column_type = "Text")]
    pub id: String,
    #[sea_orm(column_type = "Text")]
    pub user_id: String,
    #[sea_orm(column_type = "Text")]
    pub restaurant_id: String,
    pub platform: PlatformKind,
    /// Calendar date in the restaurant's time zone
    pub reservation_date: Date,
    pub party_size: i32,
    /// Ordered `HH:MM` list, most preferred first
    pub preferred_times: Json,
    /// Drop instant (UTC)
    pub scheduled_at: DateTime,
    #[sea_orm(column_type = "Text", nullable)]
    pub drop_config_id: Option<String>,
    #[serde(skip_serializing)]
    #[sea_orm(column_type = "Text")]
    pub callback_secret_hash: String,
    pub callbacked: bool,
    pub status: JobStatus,
    pub started_at: Option<DateTime>,
    pub completed_at: Option<DateTime>,
    #[sea_orm(column_type = "Text", nullable)]
    pub reserved_time: Option<String>,
    pub confirmation: Option<Json>,
    #[sea_orm(column_type = "Text", nullable)]
    pub error_message: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub logs: Option<String>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
