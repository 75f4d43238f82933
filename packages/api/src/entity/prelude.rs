pub use super::drop_config::Entity as DropConfig;
pub use super::drop_config_restaurant::Entity as DropConfigRestaurant;
pub use super::job::Entity as Job;
pub use super::platform_token::Entity as PlatformToken;
pub use super::reservation::Entity as Reservation;
pub use super::restaurant::Entity as Restaurant;
pub use super::token_record::Entity as TokenRecord;
