//! JTI token store
//!
//! Embedded key-value store of access-token metadata keyed by JTI. Each
//! entry carries its own TTL (`expires_at`); expired entries are invisible
//! to reads and physically removed by the GC loop.
//!
//! The store is an SQLite file (`tokens.sqlite`) inside the configured
//! directory, separate from the main database.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use sea_orm::{
    ColumnTrait, ConnectOptions, Database, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
    Set, sea_query::OnConflict,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::entity::token_record;
use crate::schema;

pub const TOKEN_STORE_FILE: &str = "tokens.sqlite";

#[derive(Debug, thiserror::Error)]
pub enum TokenStoreError {
    #[error("token store database error: {0}")]
    Db(#[from] DbErr),

    #[error("token store directory error: {0}")]
    Io(#[from] std::io::Error),

    #[error("token not found: {0}")]
    NotFound(String),

    #[error("ttl must be positive")]
    InvalidTtl,
}

/// Value stored under a JTI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenData {
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
    pub revoked_at: Option<DateTime<Utc>>,
    pub revoked_by: Option<String>,
}

impl TokenData {
    /// Remaining lifetime; zero once expired.
    pub fn ttl(&self) -> Duration {
        (self.expires_at - Utc::now()).to_std().unwrap_or_default()
    }

    pub fn is_live(&self) -> bool {
        !self.revoked && self.expires_at > Utc::now()
    }

    pub fn revoke(&mut self, by: impl Into<String>) {
        self.revoked = true;
        self.revoked_at = Some(Utc::now());
        self.revoked_by = Some(by.into());
    }
}

fn utc(naive: NaiveDateTime) -> DateTime<Utc> {
    naive.and_utc()
}

impl From<token_record::Model> for TokenData {
    fn from(row: token_record::Model) -> Self {
        Self {
            user_id: row.user_id,
            created_at: utc(row.created_at),
            expires_at: utc(row.expires_at),
            revoked: row.revoked,
            revoked_at: row.revoked_at.map(utc),
            revoked_by: row.revoked_by,
        }
    }
}

#[derive(Clone)]
pub struct TokenStore {
    db: DatabaseConnection,
}

impl TokenStore {
    /// Open (or create) the store inside `dir`.
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, TokenStoreError> {
        let dir = dir.as_ref();
        tokio::fs::create_dir_all(dir).await?;
        let url = format!("sqlite://{}?mode=rwc", dir.join(TOKEN_STORE_FILE).display());
        let mut opt = ConnectOptions::new(url);
        opt.max_connections(4).min_connections(1).sqlx_logging(false);
        let db = Database::connect(opt).await?;
        Self::with_connection(db).await
    }

    /// Volatile store for tests and one-off tools.
    pub async fn in_memory() -> Result<Self, TokenStoreError> {
        let mut opt = ConnectOptions::new("sqlite::memory:");
        opt.max_connections(1).min_connections(1).sqlx_logging(false);
        let db = Database::connect(opt).await?;
        Self::with_connection(db).await
    }

    async fn with_connection(db: DatabaseConnection) -> Result<Self, TokenStoreError> {
        schema::create_token_store(&db).await?;
        Ok(Self { db })
    }

    /// Live or revoked entry for `jti`; `None` once its TTL has passed.
    pub async fn get(&self, jti: &str) -> Result<Option<TokenData>, TokenStoreError> {
        let now = Utc::now().naive_utc();
        let row = token_record::Entity::find_by_id(jti.to_string())
            .filter(token_record::Column::ExpiresAt.gt(now))
            .one(&self.db)
            .await?;
        Ok(row.map(TokenData::from))
    }

    /// Record a freshly issued token that lives for `ttl`.
    pub async fn store(
        &self,
        jti: &str,
        user_id: &str,
        ttl: Duration,
    ) -> Result<TokenData, TokenStoreError> {
        if ttl.is_zero() {
            return Err(TokenStoreError::InvalidTtl);
        }
        let ttl = chrono::Duration::from_std(ttl).map_err(|_| TokenStoreError::InvalidTtl)?;
        let now = Utc::now();
        let data = TokenData {
            user_id: user_id.to_string(),
            created_at: now,
            expires_at: now + ttl,
            revoked: false,
            revoked_at: None,
            revoked_by: None,
        };
        self.write(jti, &data).await?;
        Ok(data)
    }

    /// Replace the value under `jti`. The TTL is recomputed from
    /// `data.expires_at`; an already expired value removes the entry.
    pub async fn update(&self, jti: &str, data: &TokenData) -> Result<(), TokenStoreError> {
        if self.get(jti).await?.is_none() {
            return Err(TokenStoreError::NotFound(jti.to_string()));
        }
        if data.ttl().is_zero() {
            token_record::Entity::delete_by_id(jti.to_string())
                .exec(&self.db)
                .await?;
            return Ok(());
        }
        self.write(jti, data).await
    }

    /// Mark `jti` revoked. Returns `false` when the entry does not exist.
    pub async fn revoke(&self, jti: &str, by: &str) -> Result<bool, TokenStoreError> {
        let Some(mut data) = self.get(jti).await? else {
            return Ok(false);
        };
        if data.revoked {
            return Ok(true);
        }
        data.revoke(by);
        self.update(jti, &data).await?;
        tracing::info!(jti = %jti, revoked_by = %by, "Token revoked");
        Ok(true)
    }

    async fn write(&self, jti: &str, data: &TokenData) -> Result<(), TokenStoreError> {
        let row = token_record::ActiveModel {
            jti: Set(jti.to_string()),
            user_id: Set(data.user_id.clone()),
            created_at: Set(data.created_at.naive_utc()),
            expires_at: Set(data.expires_at.naive_utc()),
            revoked: Set(data.revoked),
            revoked_at: Set(data.revoked_at.map(|t| t.naive_utc())),
            revoked_by: Set(data.revoked_by.clone()),
        };
        token_record::Entity::insert(row)
            .on_conflict(
                OnConflict::column(token_record::Column::Jti)
                    .update_columns([
                        token_record::Column::UserId,
                        token_record::Column::ExpiresAt,
                        token_record::Column::Revoked,
                        token_record::Column::RevokedAt,
                        token_record::Column::RevokedBy,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;
        Ok(())
    }

    /// Physically remove expired entries.
    pub async fn gc(&self) -> Result<u64, TokenStoreError> {
        let now = Utc::now().naive_utc();
        let result = token_record::Entity::delete_many()
            .filter(token_record::Column::ExpiresAt.lte(now))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected)
    }

    /// Run [`TokenStore::gc`] every `interval` until `shutdown` fires.
    pub fn spawn_gc(&self, interval: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        match store.gc().await {
                            Ok(0) => {}
                            Ok(removed) => tracing::debug!(removed, "Token store GC"),
                            Err(e) => tracing::warn!(error = %e, "Token store GC failed"),
                        }
                    }
                }
            }
        })
    }

    #[cfg(test)]
    pub(crate) async fn raw_count(&self) -> u64 {
        use sea_orm::PaginatorTrait;
        token_record::Entity::find().count(&self.db).await.unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn store_then_get() {
        let store = TokenStore::in_memory().await.unwrap();
        store.store("jti-1", "user-1", Duration::from_secs(60)).await.unwrap();

        let data = store.get("jti-1").await.unwrap().unwrap();
        assert_eq!(data.user_id, "user-1");
        assert!(data.is_live());
        assert!(data.ttl() <= Duration::from_secs(60));
        assert!(store.get("jti-2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn revocation_is_visible_to_readers() {
        let store = TokenStore::in_memory().await.unwrap();
        store.store("jti-1", "user-1", Duration::from_secs(60)).await.unwrap();

        assert!(store.revoke("jti-1", "logout").await.unwrap());
        let data = store.get("jti-1").await.unwrap().unwrap();
        assert!(data.revoked);
        assert!(!data.is_live());
        assert_eq!(data.revoked_by.as_deref(), Some("logout"));
        assert!(!store.revoke("missing", "logout").await.unwrap());
    }

    #[tokio::test]
    async fn expired_entries_are_invisible_then_collected() {
        let store = TokenStore::in_memory().await.unwrap();
        store.store("short", "user-1", Duration::from_millis(20)).await.unwrap();
        store.store("long", "user-1", Duration::from_secs(60)).await.unwrap();

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(store.get("short").await.unwrap().is_none());
        assert_eq!(store.raw_count().await, 2);

        assert_eq!(store.gc().await.unwrap(), 1);
        assert_eq!(store.raw_count().await, 1);
    }

    #[tokio::test]
    async fn update_recomputes_ttl() {
        let store = TokenStore::in_memory().await.unwrap();
        let mut data = store.store("jti-1", "user-1", Duration::from_secs(60)).await.unwrap();

        data.expires_at = Utc::now() + chrono::Duration::seconds(600);
        store.update("jti-1", &data).await.unwrap();
        assert!(store.get("jti-1").await.unwrap().unwrap().ttl() > Duration::from_secs(500));

        data.expires_at = Utc::now() - chrono::Duration::seconds(1);
        store.update("jti-1", &data).await.unwrap();
        assert!(store.get("jti-1").await.unwrap().is_none());
        assert_eq!(store.raw_count().await, 0);
    }

    #[tokio::test]
    async fn update_of_unknown_jti_is_not_found() {
        let store = TokenStore::in_memory().await.unwrap();
        let data = TokenData {
            user_id: "u".into(),
            created_at: Utc::now(),
            expires_at: Utc::now() + chrono::Duration::seconds(5),
            revoked: false,
            revoked_at: None,
            revoked_by: None,
        };
        assert!(matches!(
            store.update("nope", &data).await,
            Err(TokenStoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn open_creates_the_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("token_store");
        let store = TokenStore::open(&path).await.unwrap();
        store.store("jti-1", "user-1", Duration::from_secs(60)).await.unwrap();
        assert!(path.join(TOKEN_STORE_FILE).exists());

        let reopened = TokenStore::open(&path).await.unwrap();
        assert!(reopened.get("jti-1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn concurrent_writers_do_not_lose_entries() {
        let store = TokenStore::in_memory().await.unwrap();
        let mut handles = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .store(&format!("jti-{i}"), "user", Duration::from_secs(60))
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(store.raw_count().await, 16);
    }
}
