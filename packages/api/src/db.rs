use std::time::Duration;

use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbBackend, DbErr};

use crate::schema;

/// Open the main database. SQLite databases get their tables created on the
/// spot; Postgres is expected to be migrated already.
pub async fn connect(url: &str, timeout: Duration) -> Result<DatabaseConnection, DbErr> {
    let mut opt = ConnectOptions::new(url.to_owned());
    if url.contains(":memory:") {
        // Every SQLite memory connection is its own database.
        opt.max_connections(1).min_connections(1);
    } else {
        opt.max_connections(10).min_connections(1);
    }
    opt.connect_timeout(Duration::from_secs(8))
        .acquire_timeout(timeout)
        .sqlx_logging(false);

    let db = Database::connect(opt).await?;
    if db.get_database_backend() == DbBackend::Sqlite {
        schema::create_all(&db).await?;
    }
    tracing::info!(backend = ?db.get_database_backend(), "Database connected");
    Ok(db)
}
