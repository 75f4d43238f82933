pub mod auth;
pub mod credentials;
pub mod drop_config;
pub mod health;
pub mod internal;
pub mod job;
pub mod reservation;
pub mod restaurant;
