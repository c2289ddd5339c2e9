use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use mongodb::bson::{doc, oid::ObjectId, DateTime as BsonDateTime};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    config::JwtConfig,
    database::MongoDB,
    models::{TokenRecord, TOKENS},
    utils::{cache::Cache, AppError},
};

const BLACKLIST_PREFIX: &str = "blacklist:";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

// JWT Claims
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String, // user id (hex)
    pub email: String,
    pub roles: Vec<String>,
    pub kind: TokenKind,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
    pub iss: String,
    pub aud: String,
}

impl Claims {
    pub fn user_id(&self) -> Result<ObjectId, AppError> {
        ObjectId::parse_str(&self.sub).map_err(|_| AppError::Unauthorized("Invalid token".to_string()))
    }

    /// Seconds until expiry, never negative.
    pub fn remaining_secs(&self) -> u64 {
        (self.exp - Utc::now().timestamp()).max(0) as u64
    }
}

/// Who a token pair is issued for.
#[derive(Debug, Clone)]
pub struct TokenSubject {
    pub user_id: ObjectId,
    pub email: String,
    pub roles: Vec<String>,
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// seconds
    pub access_expires_in: i64,
    /// seconds
    pub refresh_expires_in: i64,
}

// ==================== REFRESH TOKEN STORE ====================

/// Persistence for the single live refresh token of each user.
#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    async fn save(&self, user_id: &ObjectId, token: &str, expires_at: DateTime<Utc>) -> Result<(), AppError>;
    async fn find(&self, user_id: &ObjectId) -> Result<Option<String>, AppError>;
    async fn delete(&self, user_id: &ObjectId) -> Result<bool, AppError>;
}

pub struct MongoTokenStore {
    db: MongoDB,
}

impl MongoTokenStore {
    pub fn new(db: MongoDB) -> Self {
        Self { db }
    }
}

#[async_trait]
impl RefreshTokenStore for MongoTokenStore {
    async fn save(&self, user_id: &ObjectId, token: &str, expires_at: DateTime<Utc>) -> Result<(), AppError> {
        let collection = self.db.collection::<TokenRecord>(TOKENS);

        let update = doc! {
            "$set": {
                "user_id": user_id,
                "refresh_token": token,
                "expires_at": BsonDateTime::from_millis(expires_at.timestamp_millis()),
                "updated_at": BsonDateTime::now(),
            }
        };

        let options = mongodb::options::UpdateOptions::builder()
            .upsert(true)
            .build();

        collection
            .update_one(doc! { "user_id": user_id }, update)
            .with_options(options)
            .await?;

        Ok(())
    }

    async fn find(&self, user_id: &ObjectId) -> Result<Option<String>, AppError> {
        let record = self
            .db
            .collection::<TokenRecord>(TOKENS)
            .find_one(doc! { "user_id": user_id })
            .await?;

        Ok(record.map(|r| r.refresh_token))
    }

    async fn delete(&self, user_id: &ObjectId) -> Result<bool, AppError> {
        let result = self
            .db
            .collection::<TokenRecord>(TOKENS)
            .delete_one(doc! { "user_id": user_id })
            .await?;

        Ok(result.deleted_count > 0)
    }
}

// ==================== TOKEN SERVICE ====================

struct JwtKeys {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    validation: Validation,
    issuer: String,
    audience: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

/// Issues, validates, rotates and revokes access/refresh token pairs.
pub struct TokenService {
    keys: JwtKeys,
    store: Arc<dyn RefreshTokenStore>,
    cache: Arc<dyn Cache>,
}

impl TokenService {
    pub fn new(config: &JwtConfig, store: Arc<dyn RefreshTokenStore>, cache: Arc<dyn Cache>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[config.audience.as_str()]);
        validation.set_issuer(&[config.issuer.as_str()]);

        Self {
            keys: JwtKeys {
                access_encoding: EncodingKey::from_secret(config.access_secret.as_bytes()),
                access_decoding: DecodingKey::from_secret(config.access_secret.as_bytes()),
                refresh_encoding: EncodingKey::from_secret(config.refresh_secret.as_bytes()),
                refresh_decoding: DecodingKey::from_secret(config.refresh_secret.as_bytes()),
                validation,
                issuer: config.issuer.clone(),
                audience: config.audience.clone(),
                access_ttl: Duration::minutes(config.access_ttl_minutes),
                refresh_ttl: Duration::days(config.refresh_ttl_days),
            },
            store,
            cache,
        }
    }

    fn sign(&self, subject: &TokenSubject, kind: TokenKind) -> Result<String, AppError> {
        let now = Utc::now();
        let (ttl, key) = match kind {
            TokenKind::Access => (self.keys.access_ttl, &self.keys.access_encoding),
            TokenKind::Refresh => (self.keys.refresh_ttl, &self.keys.refresh_encoding),
        };

        let claims = Claims {
            sub: subject.user_id.to_hex(),
            email: subject.email.clone(),
            roles: subject.roles.clone(),
            kind,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            jti: Uuid::new_v4().to_string(),
            iss: self.keys.issuer.clone(),
            aud: self.keys.audience.clone(),
        };

        Ok(encode(&Header::new(Algorithm::HS256), &claims, key)?)
    }

    /// Signs a fresh pair without persisting anything.
    pub fn generate_tokens(&self, subject: &TokenSubject) -> Result<TokenPair, AppError> {
        Ok(TokenPair {
            access_token: self.sign(subject, TokenKind::Access)?,
            refresh_token: self.sign(subject, TokenKind::Refresh)?,
            access_expires_in: self.keys.access_ttl.num_seconds(),
            refresh_expires_in: self.keys.refresh_ttl.num_seconds(),
        })
    }

    /// Issues a pair and makes its refresh token the user's only live one.
    pub async fn start_session(&self, subject: &TokenSubject) -> Result<TokenPair, AppError> {
        let pair = self.generate_tokens(subject)?;
        self.save_refresh(&subject.user_id, &pair.refresh_token).await?;
        Ok(pair)
    }

    pub async fn save_refresh(&self, user_id: &ObjectId, token: &str) -> Result<(), AppError> {
        self.store.save(user_id, token, Utc::now() + self.keys.refresh_ttl).await
    }

    /// Signature, expiry, issuer, audience and kind. No blacklist lookup.
    fn decode(&self, token: &str, kind: TokenKind) -> Result<Claims, AppError> {
        let key = match kind {
            TokenKind::Access => &self.keys.access_decoding,
            TokenKind::Refresh => &self.keys.refresh_decoding,
        };
        let claims = decode::<Claims>(token, key, &self.keys.validation)?.claims;
        if claims.kind != kind {
            return Err(AppError::Unauthorized("Invalid token".to_string()));
        }
        Ok(claims)
    }

    async fn validate(&self, token: &str, kind: TokenKind) -> Result<Claims, AppError> {
        let claims = self.decode(token, kind)?;
        if self.is_blacklisted(&claims.jti).await? {
            return Err(AppError::Unauthorized("Token has been revoked".to_string()));
        }
        Ok(claims)
    }

    pub async fn validate_access(&self, token: &str) -> Result<Claims, AppError> {
        self.validate(token, TokenKind::Access).await
    }

    pub async fn is_blacklisted(&self, jti: &str) -> Result<bool, AppError> {
        self.cache.exists(&format!("{}{}", BLACKLIST_PREFIX, jti)).await
    }

    async fn blacklist(&self, claims: &Claims) -> Result<(), AppError> {
        let ttl = claims.remaining_secs();
        if ttl == 0 {
            return Ok(());
        }
        self.cache
            .set_ex(&format!("{}{}", BLACKLIST_PREFIX, claims.jti), "1", ttl)
            .await
    }

    /// Exchanges a refresh token for a new pair.
    ///
    /// The presented token must be the one stored for its user. Presenting a
    /// rotated-out or revoked token ends the stored session as well.
    /// `lookup` reloads the subject so role or email changes are picked up.
    pub async fn rotate<F, Fut>(&self, refresh_token: &str, lookup: F) -> Result<(TokenSubject, TokenPair), AppError>
    where
        F: FnOnce(ObjectId) -> Fut,
        Fut: Future<Output = Result<Option<TokenSubject>, AppError>>,
    {
        let claims = self.decode(refresh_token, TokenKind::Refresh)?;
        let user_id = claims.user_id()?;

        let stored = self.store.find(&user_id).await?;
        let reused = self.is_blacklisted(&claims.jti).await?
            || stored.as_deref() != Some(refresh_token);
        if reused {
            log::warn!("⚠️ Refresh token reuse detected for user {}", user_id);
            self.store.delete(&user_id).await?;
            self.blacklist(&claims).await?;
            return Err(AppError::Unauthorized("Refresh token has been revoked".to_string()));
        }

        let subject = lookup(user_id)
            .await?
            .ok_or_else(|| AppError::Unauthorized("User not found".to_string()))?;

        let pair = self.start_session(&subject).await?;
        self.blacklist(&claims).await?;

        Ok((subject, pair))
    }

    /// Logout. Either token may be missing or already expired; at least one
    /// must still be valid.
    pub async fn revoke(&self, refresh_token: Option<&str>, access_token: Option<&str>) -> Result<(), AppError> {
        let refresh = refresh_token.and_then(|t| self.decode(t, TokenKind::Refresh).ok());
        let access = access_token.and_then(|t| self.decode(t, TokenKind::Access).ok());

        if refresh.is_none() && access.is_none() {
            return Err(AppError::Unauthorized("Not authenticated".to_string()));
        }

        if let Some(claims) = &refresh {
            self.store.delete(&claims.user_id()?).await?;
            self.blacklist(claims).await?;
        }
        if let Some(claims) = &access {
            self.blacklist(claims).await?;
        }

        Ok(())
    }

    /// Drops the stored refresh token so no further rotation is possible.
    pub async fn revoke_user(&self, user_id: &ObjectId) -> Result<(), AppError> {
        self.store.delete(user_id).await?;
        Ok(())
    }

    /// Blacklists an access token that is known to be valid.
    pub async fn revoke_access(&self, jti: &str, exp: i64) -> Result<(), AppError> {
        let ttl = (exp - Utc::now().timestamp()).max(0) as u64;
        if ttl == 0 {
            return Ok(());
        }
        self.cache.set_ex(&format!("{}{}", BLACKLIST_PREFIX, jti), "1", ttl).await
    }
}
