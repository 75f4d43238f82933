//! Table creation for development and test databases.
//!
//! Production Postgres schemas are managed by migrations outside this crate.
//! SQLite databases are built straight from the entities.

use sea_orm::sea_query::{Index, IndexCreateStatement};
use sea_orm::{ConnectionTrait, DbErr, EntityTrait, Schema};

use crate::entity::{
    drop_config, drop_config_restaurant, job, platform_token, reservation, restaurant, token_record,
};

async fn create_table<C, E>(db: &C, entity: E) -> Result<(), DbErr>
where
    C: ConnectionTrait,
    E: EntityTrait,
{
    let backend = db.get_database_backend();
    let mut statement = Schema::new(backend).create_table_from_entity(entity);
    statement.if_not_exists();
    db.execute(backend.build(&statement)).await?;
    Ok(())
}

async fn create_index<C: ConnectionTrait>(db: &C, index: IndexCreateStatement) -> Result<(), DbErr> {
    let backend = db.get_database_backend();
    db.execute(backend.build(&index)).await?;
    Ok(())
}

/// Create every table of the main database plus its composite unique indexes.
pub async fn create_all<C: ConnectionTrait>(db: &C) -> Result<(), DbErr> {
    create_table(db, restaurant::Entity).await?;
    create_table(db, drop_config::Entity).await?;
    create_table(db, drop_config_restaurant::Entity).await?;
    create_table(db, platform_token::Entity).await?;
    create_table(db, job::Entity).await?;
    create_table(db, reservation::Entity).await?;

    create_index(
        db,
        Index::create()
            .name("restaurant_platform_venue_key")
            .table(restaurant::Entity)
            .col(restaurant::Column::Platform)
            .col(restaurant::Column::PlatformId)
            .unique()
            .if_not_exists()
            .to_owned(),
    )
    .await?;
    create_index(
        db,
        Index::create()
            .name("drop_config_days_time_key")
            .table(drop_config::Entity)
            .col(drop_config::Column::DaysInAdvance)
            .col(drop_config::Column::DropTime)
            .unique()
            .if_not_exists()
            .to_owned(),
    )
    .await?;
    create_index(
        db,
        Index::create()
            .name("platform_token_user_platform_key")
            .table(platform_token::Entity)
            .col(platform_token::Column::UserId)
            .col(platform_token::Column::Platform)
            .unique()
            .if_not_exists()
            .to_owned(),
    )
    .await?;
    create_index(
        db,
        Index::create()
            .name("job_user_status_idx")
            .table(job::Entity)
            .col(job::Column::UserId)
            .col(job::Column::Status)
            .if_not_exists()
            .to_owned(),
    )
    .await?;

    Ok(())
}

/// Create the token store's table.
pub async fn create_token_store<C: ConnectionTrait>(db: &C) -> Result<(), DbErr> {
    create_table(db, token_record::Entity).await?;
    create_index(
        db,
        Index::create()
            .name("token_record_expires_idx")
            .table(token_record::Entity)
            .col(token_record::Column::ExpiresAt)
            .if_not_exists()
            .to_owned(),
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::memory_db;
    use crate::entity::sea_orm_active_enums::PlatformKind;
    use chrono::Utc;
    use sea_orm::{ActiveModelTrait, Set};

    fn config(id: &str) -> drop_config::ActiveModel {
        drop_config::ActiveModel {
            id: Set(id.to_string()),
            days_in_advance: Set(14),
            drop_time: Set("09:00".into()),
            timezone: Set("America/New_York".into()),
            confidence: Set(0),
            created_at: Set(Utc::now().naive_utc()),
        }
    }

    #[tokio::test]
    async fn create_all_is_idempotent() {
        let db = memory_db().await;
        create_all(&db).await.unwrap();
    }

    fn booking(id: &str, job_id: &str) -> reservation::ActiveModel {
        reservation::ActiveModel {
            id: Set(id.to_string()),
            user_id: Set("user-1".into()),
            job_id: Set(job_id.to_string()),
            restaurant_id: Set("r-1".into()),
            platform: Set(PlatformKind::Resy),
            confirmation: Set(serde_json::json!({})),
            reservation_at: Set(Utc::now().naive_utc()),
            party_size: Set(2),
            created_at: Set(Utc::now().naive_utc()),
        }
    }

    #[tokio::test]
    async fn one_reservation_per_job() {
        let db = memory_db().await;
        booking("a", "job-1").insert(&db).await.unwrap();
        assert!(booking("b", "job-1").insert(&db).await.is_err());
        booking("c", "job-2").insert(&db).await.unwrap();
    }

    #[tokio::test]
    async fn drop_config_pair_is_unique() {
        let db = memory_db().await;
        config("a").insert(&db).await.unwrap();
        assert!(config("b").insert(&db).await.is_err());
    }
}
