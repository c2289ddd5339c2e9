use mongodb::bson::{oid::ObjectId, DateTime as BsonDateTime};
use serde::{Deserialize, Serialize};

pub const TOKENS: &str = "tokens";

/// The single live refresh token of a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenRecord {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub user_id: ObjectId,
    pub refresh_token: String,
    pub expires_at: BsonDateTime,
    pub updated_at: BsonDateTime,
}
