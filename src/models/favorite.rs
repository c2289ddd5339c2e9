use mongodb::bson::{oid::ObjectId, DateTime as BsonDateTime};
use serde::{Deserialize, Serialize};

pub const FAVORITES: &str = "favorites";

/// Join document between a user and a recipe they saved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FavoriteRecipe {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub user_id: ObjectId,
    pub recipe_id: ObjectId,
    pub created_at: BsonDateTime,
}
