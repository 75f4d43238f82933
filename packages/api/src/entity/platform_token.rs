//! `SeaORM` Entity for PlatformToken
//!
//! A user's credential bundle for one platform, sealed by the envelope.
//! `(user_id, platform)` is unique.

use super::sea_orm_active_enums::PlatformKind;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "platform_token")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false, column_type = "Text")]
    pub id: String,
    #[sea_orm(column_type = "Text")]
    pub user_id: String,
    pub platform: PlatformKind,
    /// Base64 envelope ciphertext
    #[serde(skip_serializing)]
    #[sea_orm(column_type = "Text")]
    pub encrypted_token: String,
    pub expires_at: Option<DateTime>,
    pub refresh_expires_at: Option<DateTime>,
    pub has_refresh: bool,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
