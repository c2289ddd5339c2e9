pub mod comment;
pub mod currency;
pub mod favorite;
pub mod recipe;
pub mod token;
pub mod user;

pub use comment::*;
pub use currency::*;
pub use favorite::*;
pub use recipe::*;
pub use token::*;
pub use user::*;

use mongodb::bson::DateTime as BsonDateTime;

/// Formats a BSON timestamp for API responses.
pub fn rfc3339(dt: &BsonDateTime) -> String {
    chrono::DateTime::from_timestamp_millis(dt.timestamp_millis())
        .map(|d| d.to_rfc3339())
        .unwrap_or_default()
}
