//! Drop configs: beliefs about when a restaurant releases inventory.
//!
//! `(days_in_advance, drop_time)` is unique. Asserting an existing pattern
//! for another restaurant attaches that restaurant to the existing row.

use chrono::{NaiveTime, Timelike};
use cierge_types::{Platform, parse_wall_time};
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::{ServiceError, ServiceResult, new_id, now};
use crate::entity::{drop_config, drop_config_restaurant, restaurant};
use crate::time::parse_timezone;

#[derive(Debug, Clone, Deserialize)]
pub struct CreateDropConfig {
    pub restaurant_id: String,
    pub days_in_advance: i32,
    /// `HH:MM` (or `HH:MM:SS`) in the restaurant's zone
    pub drop_time: String,
    pub timezone: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DropConfigView {
    pub id: String,
    pub days_in_advance: i32,
    pub drop_time: String,
    pub timezone: String,
    pub confidence: i64,
    /// Confidence for the restaurant the config was listed or created for
    pub restaurant_confidence: i64,
}

impl DropConfigView {
    fn new(config: drop_config::Model, restaurant_confidence: i64) -> Self {
        Self {
            id: config.id,
            days_in_advance: config.days_in_advance,
            drop_time: config.drop_time,
            timezone: config.timezone,
            confidence: config.confidence,
            restaurant_confidence,
        }
    }
}

/// Minute precision renders as `HH:MM`; anything finer keeps the seconds.
pub fn normalize_drop_time(time: NaiveTime) -> String {
    if time.second() == 0 {
        time.format("%H:%M").to_string()
    } else {
        time.format("%H:%M:%S").to_string()
    }
}

#[derive(Clone)]
pub struct DropConfigService {
    db: DatabaseConnection,
}

impl DropConfigService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn create(&self, input: CreateDropConfig) -> ServiceResult<DropConfigView> {
        let restaurant = restaurant::Entity::find_by_id(input.restaurant_id.clone())
            .one(&self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::not_found(format!("restaurant {} not found", input.restaurant_id))
            })?;

        let lead_days = Platform::from(restaurant.platform).max_lead_days() as i32;
        if input.days_in_advance < 1 || input.days_in_advance > lead_days {
            return Err(ServiceError::validation(format!(
                "days_in_advance must be between 1 and {}",
                lead_days
            )));
        }
        let drop_time = parse_wall_time(&input.drop_time)
            .map_err(|e| ServiceError::validation(e.to_string()))?;
        let drop_time = normalize_drop_time(drop_time);
        parse_timezone(&input.timezone)?;

        let config = self
            .find_or_insert(input.days_in_advance, &drop_time, &input.timezone)
            .await?;
        let restaurant_confidence = self.attach(&config.id, &restaurant.id).await?;
        Ok(DropConfigView::new(config, restaurant_confidence))
    }

    async fn find_by_pattern(
        &self,
        days_in_advance: i32,
        drop_time: &str,
    ) -> ServiceResult<Option<drop_config::Model>> {
        Ok(drop_config::Entity::find()
            .filter(drop_config::Column::DaysInAdvance.eq(days_in_advance))
            .filter(drop_config::Column::DropTime.eq(drop_time))
            .one(&self.db)
            .await?)
    }

    async fn find_or_insert(
        &self,
        days_in_advance: i32,
        drop_time: &str,
        timezone: &str,
    ) -> ServiceResult<drop_config::Model> {
        if let Some(existing) = self.find_by_pattern(days_in_advance, drop_time).await? {
            return Ok(existing);
        }

        let inserted = drop_config::ActiveModel {
            id: Set(new_id()),
            days_in_advance: Set(days_in_advance),
            drop_time: Set(drop_time.to_string()),
            timezone: Set(timezone.to_string()),
            confidence: Set(0),
            created_at: Set(now()),
        }
        .insert(&self.db)
        .await;

        match inserted {
            Ok(model) => {
                tracing::info!(drop_config_id = %model.id, days_in_advance, drop_time, "Drop config created");
                Ok(model)
            }
            // Lost a race against a concurrent insert of the same pattern.
            Err(e) => self
                .find_by_pattern(days_in_advance, drop_time)
                .await?
                .ok_or_else(|| e.into()),
        }
    }

    /// Link `restaurant_id` to the config; returns the link's confidence.
    async fn attach(&self, drop_config_id: &str, restaurant_id: &str) -> ServiceResult<i64> {
        let link = drop_config_restaurant::ActiveModel {
            drop_config_id: Set(drop_config_id.to_string()),
            restaurant_id: Set(restaurant_id.to_string()),
            confidence: Set(0),
            created_at: Set(now()),
        };
        drop_config_restaurant::Entity::insert(link)
            .on_conflict(
                OnConflict::columns([
                    drop_config_restaurant::Column::DropConfigId,
                    drop_config_restaurant::Column::RestaurantId,
                ])
                .do_nothing()
                .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;

        let link = drop_config_restaurant::Entity::find_by_id((
            drop_config_id.to_string(),
            restaurant_id.to_string(),
        ))
        .one(&self.db)
        .await?
        .ok_or_else(|| ServiceError::internal("drop config link vanished"))?;
        Ok(link.confidence)
    }

    pub async fn get(&self, id: &str) -> ServiceResult<drop_config::Model> {
        drop_config::Entity::find_by_id(id.to_string())
            .one(&self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("drop config {} not found", id)))
    }

    /// Whether `restaurant_id` is attached to `drop_config_id`.
    pub async fn is_attached(&self, drop_config_id: &str, restaurant_id: &str) -> ServiceResult<bool> {
        Ok(drop_config_restaurant::Entity::find_by_id((
            drop_config_id.to_string(),
            restaurant_id.to_string(),
        ))
        .one(&self.db)
        .await?
        .is_some())
    }

    /// Configs attached to a restaurant, most trusted first.
    pub async fn list_for_restaurant(&self, restaurant_id: &str) -> ServiceResult<Vec<DropConfigView>> {
        let links = drop_config_restaurant::Entity::find()
            .filter(drop_config_restaurant::Column::RestaurantId.eq(restaurant_id))
            .order_by_desc(drop_config_restaurant::Column::Confidence)
            .order_by_asc(drop_config_restaurant::Column::CreatedAt)
            .all(&self.db)
            .await?;

        let ids: Vec<String> = links.iter().map(|l| l.drop_config_id.clone()).collect();
        let mut configs: HashMap<String, drop_config::Model> = drop_config::Entity::find()
            .filter(drop_config::Column::Id.is_in(ids))
            .all(&self.db)
            .await?
            .into_iter()
            .map(|c| (c.id.clone(), c))
            .collect();

        Ok(links
            .into_iter()
            .filter_map(|link| {
                configs
                    .remove(&link.drop_config_id)
                    .map(|config| DropConfigView::new(config, link.confidence))
            })
            .collect())
    }
}

/// Count a successful booking for the config and for its link to the
/// restaurant. Increments happen in SQL and stop at `i64::MAX`.
pub async fn record_success<C: ConnectionTrait>(
    db: &C,
    drop_config_id: &str,
    restaurant_id: &str,
) -> ServiceResult<()> {
    drop_config::Entity::update_many()
        .col_expr(
            drop_config::Column::Confidence,
            Expr::col(drop_config::Column::Confidence).add(1),
        )
        .filter(drop_config::Column::Id.eq(drop_config_id))
        .filter(drop_config::Column::Confidence.lt(i64::MAX))
        .exec(db)
        .await?;

    drop_config_restaurant::Entity::update_many()
        .col_expr(
            drop_config_restaurant::Column::Confidence,
            Expr::col(drop_config_restaurant::Column::Confidence).add(1),
        )
        .filter(drop_config_restaurant::Column::DropConfigId.eq(drop_config_id))
        .filter(drop_config_restaurant::Column::RestaurantId.eq(restaurant_id))
        .filter(drop_config_restaurant::Column::Confidence.lt(i64::MAX))
        .exec(db)
        .await?;
    Ok(())
}
