//! `SeaORM` entities for the booking pipeline.
//!
//! The same entities back Postgres in production and SQLite for development
//! and tests; see [`crate::schema`].

pub mod prelude;

pub mod drop_config;
pub mod drop_config_restaurant;
pub mod job;
pub mod platform_token;
pub mod reservation;
pub mod restaurant;
pub mod sea_orm_active_enums;
pub mod token_record;
