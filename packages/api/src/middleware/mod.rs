pub mod callback;
pub mod jwt;
pub mod rate_limit;
