//! `SeaORM` Entity for TokenRecord
//!
//! Access token metadata keyed by JTI. Lives in the token store's own SQLite
//! file, not in the main database.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "token_record")]
pub struct Model {
    /// JWT ID (jti claim)
    #[sea_orm(primary_key, auto_increment = false, column_type = "Text")]
    pub jti: String,
    #[sea_orm(column_type = "Text")]
    pub user_id: String,
    pub created_at: DateTime,
    /// Row is dead once this passes
    pub expires_at: DateTime,
    pub revoked: bool,
    pub revoked_at: Option<DateTime>,
    /// Who or what revoked the token
    #[sea_orm(column_type = "Text", nullable)]
    pub revoked_by: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
