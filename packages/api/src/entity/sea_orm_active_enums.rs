use cierge_types::Platform;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    #[sea_orm(string_value = "scheduled")]
    Scheduled,
    #[sea_orm(string_value = "running")]
    Running,
    #[sea_orm(string_value = "success")]
    Success,
    #[sea_orm(string_value = "failed")]
    Failed,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

impl JobStatus {
    /// States an outcome report may move a job out of.
    pub fn reportable() -> [JobStatus; 2] {
        [Self::Scheduled, Self::Running]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "lowercase")]
pub enum PlatformKind {
    #[sea_orm(string_value = "resy")]
    Resy,
    #[sea_orm(string_value = "opentable")]
    OpenTable,
}

impl From<Platform> for PlatformKind {
    fn from(platform: Platform) -> Self {
        match platform {
            Platform::Resy => Self::Resy,
            Platform::OpenTable => Self::OpenTable,
        }
    }
}

impl From<PlatformKind> for Platform {
    fn from(kind: PlatformKind) -> Self {
        match kind {
            PlatformKind::Resy => Platform::Resy,
            PlatformKind::OpenTable => Platform::OpenTable,
        }
    }
}
