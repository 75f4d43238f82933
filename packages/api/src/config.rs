//! Server configuration
//!
//! Loaded from an optional JSON file, then overridden field by field from
//! the environment: `scheduler.cold_start_buffer` is overridden by
//! `CIERGE_SCHEDULER_COLD_START_BUFFER`. Durations are written as
//! `<n>ms`, `<n>s`, `<n>m` or `<n>h`.

use rand::Rng;
use rand::distr::Alphanumeric;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_PATH_VAR: &str = "CIERGE_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "./cierge.config.json";
const ENV_PREFIX: &str = "CIERGE_";
const MIN_JWT_SECRET_LEN: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing configuration value: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, String),

    #[error("Could not read config file {0}: {1}")]
    File(PathBuf, String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

#[derive(Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    pub server: ServerSection,
    pub database: DatabaseSection,
    pub kms: KmsSection,
    pub scheduler: SchedulerSection,
    pub worker: WorkerSection,
    pub auth: AuthSection,
    pub rate_limit: RateLimitSection,
    pub token_store: TokenStoreSection,
    pub credentials: CredentialsSection,
    pub environment: Environment,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub port: u16,
    /// Public base URL written into drop events for the worker callback
    pub endpoint: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            port: 8080,
            endpoint: "http://localhost:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSection {
    pub url: String,
    #[serde(with = "duration_str")]
    pub timeout: Duration,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            url: String::new(),
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KmsSection {
    pub key_id: String,
    /// `aws` or `local`
    pub provider: String,
    /// `kid:base64,...` key ring for the local provider
    #[serde(skip_serializing)]
    pub local_keys: String,
}

impl Default for KmsSection {
    fn default() -> Self {
        Self {
            key_id: String::new(),
            provider: "local".to_string(),
            local_keys: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSection {
    /// `aws` or `local`
    pub provider: String,
    #[serde(alias = "lambda_arn")]
    pub worker_target: String,
    pub role: String,
    pub group: String,
    #[serde(with = "duration_str")]
    pub cold_start_buffer: Duration,
    #[serde(with = "duration_str")]
    pub submit_timeout: Duration,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            provider: "local".to_string(),
            worker_target: String::new(),
            role: String::new(),
            group: "cierge".to_string(),
            cold_start_buffer: Duration::from_secs(60),
            submit_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerSection {
    /// Whether workers report their outcome back over HTTP
    pub callback: bool,
}

impl Default for WorkerSection {
    fn default() -> Self {
        Self { callback: true }
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSection {
    #[serde(skip_serializing)]
    pub jwt_secret: String,
    #[serde(with = "duration_str")]
    pub access_token_expiry: Duration,
    #[serde(with = "duration_str")]
    pub refresh_token_expiry: Duration,
}

impl Default for AuthSection {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            access_token_expiry: Duration::from_secs(15 * 60),
            refresh_token_expiry: Duration::from_secs(168 * 3600),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSection {
    pub requests: u32,
    #[serde(with = "duration_str")]
    pub window: Duration,
}

impl Default for RateLimitSection {
    fn default() -> Self {
        Self {
            requests: 3,
            window: Duration::from_secs(5 * 60),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenStoreSection {
    pub path: PathBuf,
    #[serde(with = "duration_str")]
    pub gc_interval: Duration,
}

impl Default for TokenStoreSection {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/token_store"),
            gc_interval: Duration::from_secs(5 * 60),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialsSection {
    /// How often stored platform credentials are checked for expiry
    #[serde(with = "duration_str")]
    pub rotation_interval: Duration,
    /// Credentials expiring within this window are rotated
    #[serde(with = "duration_str")]
    pub rotation_horizon: Duration,
}

impl Default for CredentialsSection {
    fn default() -> Self {
        Self {
            rotation_interval: Duration::from_secs(15 * 60),
            rotation_horizon: Duration::from_secs(24 * 3600),
        }
    }
}

impl std::fmt::Debug for KmsSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KmsSection")
            .field("key_id", &self.key_id)
            .field("provider", &self.provider)
            .field("local_keys", &"<redacted>")
            .finish()
    }
}

impl std::fmt::Debug for AuthSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSection")
            .field("jwt_secret", &"<redacted>")
            .field("access_token_expiry", &self.access_token_expiry)
            .field("refresh_token_expiry", &self.refresh_token_expiry)
            .finish()
    }
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("server", &self.server)
            .field("database", &"<redacted>")
            .field("kms", &self.kms)
            .field("scheduler", &self.scheduler)
            .field("worker", &self.worker)
            .field("auth", &self.auth)
            .field("rate_limit", &self.rate_limit)
            .field("token_store", &self.token_store)
            .field("credentials", &self.credentials)
            .field("environment", &self.environment)
            .finish()
    }
}

/// `CIERGE_` + upper-cased dotted name with `.` replaced by `_`.
pub fn env_key(name: &str) -> String {
    format!("{}{}", ENV_PREFIX, name.replace('.', "_").to_uppercase())
}

fn parse_value<T: std::str::FromStr>(name: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::Invalid(name, e.to_string()))
}

fn parse_bool(name: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::Invalid(name, format!("not a boolean: {}", other))),
    }
}

fn parse_env_duration(name: &'static str, raw: &str) -> Result<Duration, ConfigError> {
    parse_duration(raw).map_err(|e| ConfigError::Invalid(name, e))
}

fn parse_environment(name: &'static str, raw: &str) -> Result<Environment, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "development" | "dev" => Ok(Environment::Development),
        "production" | "prod" => Ok(Environment::Production),
        other => Err(ConfigError::Invalid(name, format!("unknown environment: {}", other))),
    }
}

/// Parse `<n>ms|s|m|h`.
pub fn parse_duration(raw: &str) -> Result<Duration, String> {
    let raw = raw.trim();
    let split = raw
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| format!("missing unit in duration '{}'", raw))?;
    let (amount, unit) = raw.split_at(split);
    let amount: u64 = amount
        .parse()
        .map_err(|_| format!("invalid duration '{}'", raw))?;
    match unit {
        "ms" => Ok(Duration::from_millis(amount)),
        "s" => Ok(Duration::from_secs(amount)),
        "m" => Ok(Duration::from_secs(amount * 60)),
        "h" => Ok(Duration::from_secs(amount * 3600)),
        other => Err(format!("unknown duration unit '{}'", other)),
    }
}

/// Render a duration in the largest unit that divides it.
pub fn format_duration(duration: &Duration) -> String {
    let millis = duration.as_millis();
    if millis % 1000 != 0 {
        return format!("{}ms", millis);
    }
    let secs = duration.as_secs();
    if secs != 0 && secs % 3600 == 0 {
        format!("{}h", secs / 3600)
    } else if secs != 0 && secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{}s", secs)
    }
}

pub mod duration_str {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_duration(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}

macro_rules! override_from {
    ($lookup:expr, $name:literal => $target:expr, $parse:expr) => {
        if let Some(raw) = $lookup(env_key($name).as_str()) {
            $target = $parse($name, &raw)?;
        }
    };
}

impl ServerConfig {
    /// File named by `CIERGE_CONFIG` (or the default path), then the
    /// process environment.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_PATH_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(Path::new(&path), |key| std::env::var(key).ok())
    }

    /// A missing file means defaults.
    pub fn load_from(
        path: &Path,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(path)
                .map_err(|e| ConfigError::File(path.to_path_buf(), e.to_string()))?;
            serde_json::from_str(&raw)
                .map_err(|e| ConfigError::File(path.to_path_buf(), e.to_string()))?
        } else {
            ServerConfig::default()
        };
        config.apply_overrides(lookup)?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        let text = |_: &'static str, raw: &str| -> Result<String, ConfigError> { Ok(raw.to_string()) };

        override_from!(lookup, "server.port" => self.server.port, parse_value);
        override_from!(lookup, "server.endpoint" => self.server.endpoint, text);
        override_from!(lookup, "database.url" => self.database.url, text);
        override_from!(lookup, "database.timeout" => self.database.timeout, parse_env_duration);
        override_from!(lookup, "kms.key_id" => self.kms.key_id, text);
        override_from!(lookup, "kms.provider" => self.kms.provider, text);
        override_from!(lookup, "kms.local_keys" => self.kms.local_keys, text);
        override_from!(lookup, "scheduler.provider" => self.scheduler.provider, text);
        override_from!(lookup, "lambda_arn" => self.scheduler.worker_target, text);
        override_from!(lookup, "scheduler.worker_target" => self.scheduler.worker_target, text);
        override_from!(lookup, "scheduler.role" => self.scheduler.role, text);
        override_from!(lookup, "scheduler.group" => self.scheduler.group, text);
        override_from!(lookup, "scheduler.cold_start_buffer" => self.scheduler.cold_start_buffer, parse_env_duration);
        override_from!(lookup, "scheduler.submit_timeout" => self.scheduler.submit_timeout, parse_env_duration);
        override_from!(lookup, "worker.callback" => self.worker.callback, parse_bool);
        override_from!(lookup, "auth.jwt_secret" => self.auth.jwt_secret, text);
        override_from!(lookup, "auth.access_token_expiry" => self.auth.access_token_expiry, parse_env_duration);
        override_from!(lookup, "auth.refresh_token_expiry" => self.auth.refresh_token_expiry, parse_env_duration);
        override_from!(lookup, "rate_limit.requests" => self.rate_limit.requests, parse_value);
        override_from!(lookup, "rate_limit.window" => self.rate_limit.window, parse_env_duration);
        override_from!(lookup, "token_store.path" => self.token_store.path, parse_value);
        override_from!(lookup, "token_store.gc_interval" => self.token_store.gc_interval, parse_env_duration);
        override_from!(lookup, "credentials.rotation_interval" => self.credentials.rotation_interval, parse_env_duration);
        override_from!(lookup, "credentials.rotation_horizon" => self.credentials.rotation_horizon, parse_env_duration);
        override_from!(lookup, "environment" => self.environment, parse_environment);
        Ok(())
    }

    pub fn validate(&mut self) -> Result<(), ConfigError> {
        if self.database.url.trim().is_empty() {
            return Err(ConfigError::Missing("database.url"));
        }
        if self.kms.key_id.trim().is_empty() {
            return Err(ConfigError::Missing("kms.key_id"));
        }
        match self.kms.provider.to_ascii_lowercase().as_str() {
            "aws" => {}
            "local" if self.kms.local_keys.trim().is_empty() => {
                return Err(ConfigError::Missing("kms.local_keys"));
            }
            "local" => {}
            other => {
                return Err(ConfigError::Invalid("kms.provider", format!("unknown provider '{}'", other)));
            }
        }
        match self.scheduler.provider.to_ascii_lowercase().as_str() {
            "aws" => {
                if self.scheduler.worker_target.trim().is_empty() {
                    return Err(ConfigError::Missing("scheduler.worker_target"));
                }
                if self.scheduler.role.trim().is_empty() {
                    return Err(ConfigError::Missing("scheduler.role"));
                }
            }
            "local" => {}
            other => {
                return Err(ConfigError::Invalid(
                    "scheduler.provider",
                    format!("unknown provider '{}'", other),
                ));
            }
        }
        if self.rate_limit.requests == 0 {
            return Err(ConfigError::Invalid("rate_limit.requests", "must be positive".into()));
        }
        if self.scheduler.submit_timeout.is_zero() {
            return Err(ConfigError::Invalid("scheduler.submit_timeout", "must be positive".into()));
        }

        match self.environment {
            Environment::Production if self.auth.jwt_secret.is_empty() => {
                return Err(ConfigError::Missing("auth.jwt_secret"));
            }
            Environment::Production if self.auth.jwt_secret.len() < MIN_JWT_SECRET_LEN => {
                return Err(ConfigError::Invalid(
                    "auth.jwt_secret",
                    format!("must be at least {} characters", MIN_JWT_SECRET_LEN),
                ));
            }
            Environment::Development if self.auth.jwt_secret.is_empty() => {
                tracing::warn!("auth.jwt_secret not set, using an ephemeral development secret");
                self.auth.jwt_secret = rand::rng()
                    .sample_iter(&Alphanumeric)
                    .take(MIN_JWT_SECRET_LEN)
                    .map(char::from)
                    .collect();
            }
            _ => {}
        }
        Ok(())
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }
}
