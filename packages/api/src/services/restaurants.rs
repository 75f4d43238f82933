use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
};
use serde::Deserialize;

use super::{ServiceError, ServiceResult, new_id, now};
use crate::entity::{restaurant, sea_orm_active_enums::PlatformKind};
use crate::time::parse_timezone;

#[derive(Debug, Clone, Deserialize)]
pub struct UpsertRestaurant {
    pub platform: PlatformKind,
    pub platform_id: String,
    pub name: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    pub timezone: String,
    #[serde(default)]
    pub rating: Option<f64>,
}

#[derive(Clone)]
pub struct RestaurantService {
    db: DatabaseConnection,
}

impl RestaurantService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Create the venue on first reference; later references refresh its
    /// descriptive fields.
    pub async fn upsert(&self, input: UpsertRestaurant) -> ServiceResult<restaurant::Model> {
        if input.platform_id.trim().is_empty() {
            return Err(ServiceError::validation("platform_id must not be empty"));
        }
        if input.name.trim().is_empty() {
            return Err(ServiceError::validation("name must not be empty"));
        }
        parse_timezone(&input.timezone)?;

        let existing = restaurant::Entity::find()
            .filter(restaurant::Column::Platform.eq(input.platform))
            .filter(restaurant::Column::PlatformId.eq(input.platform_id.trim()))
            .one(&self.db)
            .await?;

        let now = now();
        let model = match existing {
            Some(row) => {
                let mut active: restaurant::ActiveModel = row.into();
                active.name = Set(input.name);
                if input.address.is_some() {
                    active.address = Set(input.address);
                }
                if input.city.is_some() {
                    active.city = Set(input.city);
                }
                if input.state.is_some() {
                    active.state = Set(input.state);
                }
                if input.rating.is_some() {
                    active.rating = Set(input.rating);
                }
                active.timezone = Set(input.timezone);
                active.updated_at = Set(now);
                active.update(&self.db).await?
            }
            None => {
                let model = restaurant::ActiveModel {
                    id: Set(new_id()),
                    platform: Set(input.platform),
                    platform_id: Set(input.platform_id.trim().to_string()),
                    name: Set(input.name),
                    address: Set(input.address),
                    city: Set(input.city),
                    state: Set(input.state),
                    timezone: Set(input.timezone),
                    rating: Set(input.rating),
                    created_at: Set(now),
                    updated_at: Set(now),
                }
                .insert(&self.db)
                .await?;
                tracing::info!(restaurant_id = %model.id, platform = ?model.platform, "Restaurant created");
                model
            }
        };
        Ok(model)
    }

    pub async fn get(&self, id: &str) -> ServiceResult<restaurant::Model> {
        restaurant::Entity::find_by_id(id.to_string())
            .one(&self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("restaurant {} not found", id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::memory_db;

    fn input(name: &str) -> UpsertRestaurant {
        UpsertRestaurant {
            platform: PlatformKind::Resy,
            platform_id: "1505".into(),
            name: name.into(),
            address: None,
            city: Some("New York".into()),
            state: None,
            timezone: "America/New_York".into(),
            rating: Some(4.7),
        }
    }

    #[tokio::test]
    async fn second_reference_refreshes_the_same_row() {
        let service = RestaurantService::new(memory_db().await);
        let first = service.upsert(input("Don Angie")).await.unwrap();
        let mut again = input("Don Angie (West Village)");
        again.city = None;
        let second = service.upsert(again).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.name, "Don Angie (West Village)");
        assert_eq!(second.city.as_deref(), Some("New York"));
    }

    #[tokio::test]
    async fn rejects_unknown_time_zone() {
        let service = RestaurantService::new(memory_db().await);
        let mut bad = input("x");
        bad.timezone = "Eastern".into();
        assert!(matches!(service.upsert(bad).await, Err(ServiceError::Validation(_))));
    }

    #[tokio::test]
    async fn missing_restaurant_is_not_found() {
        let service = RestaurantService::new(memory_db().await);
        assert!(matches!(service.get("nope").await, Err(ServiceError::NotFound(_))));
    }
}
