use mongodb::bson::{oid::ObjectId, DateTime as BsonDateTime};
use serde::{Deserialize, Serialize};

use super::rfc3339;

pub const USERS: &str = "users";

/// Account document (collection `users`).
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct User {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub email: String,
    pub name: String,
    /// bcrypt hash
    pub password: String,
    #[serde(default)]
    pub is_activated: bool,
    #[serde(default = "default_roles")]
    pub roles: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_currency: Option<String>,
    pub created_at: BsonDateTime,
    pub updated_at: BsonDateTime,
}

fn default_roles() -> Vec<String> {
    vec!["user".to_string()]
}

impl User {
    pub fn id_hex(&self) -> String {
        self.id.map(|id| id.to_hex()).unwrap_or_default()
    }
}

/// What the owner sees about their own account.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct UserDto {
    pub id: String,
    pub email: String,
    pub name: String,
    pub roles: Vec<String>,
    pub is_activated: bool,
    pub preferred_currency: Option<String>,
    pub created_at: String,
}

impl From<&User> for UserDto {
    fn from(user: &User) -> Self {
        UserDto {
            id: user.id_hex(),
            email: user.email.clone(),
            name: user.name.clone(),
            roles: user.roles.clone(),
            is_activated: user.is_activated,
            preferred_currency: user.preferred_currency.clone(),
            created_at: rfc3339(&user.created_at),
        }
    }
}

/// What anybody can see about an author.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct PublicUserDto {
    pub id: String,
    pub name: String,
    pub created_at: String,
}

impl From<&User> for PublicUserDto {
    fn from(user: &User) -> Self {
        PublicUserDto {
            id: user.id_hex(),
            name: user.name.clone(),
            created_at: rfc3339(&user.created_at),
        }
    }
}
