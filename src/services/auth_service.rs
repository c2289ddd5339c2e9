use chrono::Utc;
use mongodb::bson::{doc, oid::ObjectId, DateTime as BsonDateTime};
use serde::{Deserialize, Serialize};

use crate::{
    config::AppConfig,
    database::{is_duplicate_key, MongoDB},
    models::{PublicUserDto, User, UserDto, USERS},
    services::{
        activation_service::{self, PendingRegistration},
        comment_service, currency_service, favorite_service,
        favorite_service::FAVORITES_CACHE_PREFIX,
        mail_service::{activation_email, activation_url, Mailer},
        recipe_service::{self, RECIPES_CACHE_PREFIX},
        token_service::{TokenPair, TokenService, TokenSubject},
    },
    utils::{
        cache::Cache,
        pagination::invalidate,
        password::{hash_password, verify_password},
        validation::{normalize_email, Violations},
        AppError,
    },
};

// Request/Response structures
#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: String,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// The refresh token may come in the body when the client cannot use cookies.
#[derive(Debug, Default, Deserialize, utoipa::ToSchema)]
pub struct RefreshTokenRequest {
    pub refresh_token: Option<String>,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct UpdateMeRequest {
    pub name: Option<String>,
    pub preferred_currency: Option<String>,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct AuthResponse {
    pub user: UserDto,
    pub tokens: TokenPair,
}

const INVALID_CREDENTIALS: &str = "Invalid email or password";

fn subject_of(user: &User) -> Result<TokenSubject, AppError> {
    let user_id = user
        .id
        .ok_or_else(|| AppError::Internal("User document without _id".to_string()))?;
    Ok(TokenSubject {
        user_id,
        email: user.email.clone(),
        roles: user.roles.clone(),
    })
}

pub async fn find_user(db: &MongoDB, user_id: &ObjectId) -> Result<Option<User>, AppError> {
    Ok(db
        .collection::<User>(USERS)
        .find_one(doc! { "_id": user_id })
        .await?)
}

async fn require_user(db: &MongoDB, user_id: &ObjectId) -> Result<User, AppError> {
    find_user(db, user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))
}

async fn find_by_email(db: &MongoDB, email: &str) -> Result<Option<User>, AppError> {
    Ok(db
        .collection::<User>(USERS)
        .find_one(doc! { "email": email })
        .await?)
}

fn validate_registration(request: &RegisterRequest, email: &str) -> Result<(), AppError> {
    let mut v = Violations::new();
    v.email(email);
    v.password("Password", &request.password);
    v.name(&request.name);
    v.into_result()
}

// ==================== REGISTRATION ====================

/// Stores a pending registration and mails the activation link.
/// No user document exists until the link is followed.
pub async fn register(
    db: &MongoDB,
    cache: &dyn Cache,
    mailer: &dyn Mailer,
    config: &AppConfig,
    request: &RegisterRequest,
) -> Result<(), AppError> {
    let email = normalize_email(&request.email);
    validate_registration(request, &email)?;

    if find_by_email(db, &email).await?.is_some() {
        return Err(AppError::Conflict(format!(
            "User with email {} already exists",
            email
        )));
    }

    let pending = PendingRegistration {
        email: email.clone(),
        name: request.name.trim().to_string(),
        password_hash: hash_password(&request.password, config.bcrypt_cost).await?,
        created_at: Utc::now(),
    };

    let ttl = (config.activation_ttl_minutes.max(1) * 60) as u64;
    let link = activation_service::stash(cache, &pending, ttl).await?;

    let url = activation_url(&config.api_url, &link);
    mailer
        .send(&email, "Activate your account", &activation_email(&url))
        .await?;

    log::info!("📨 Activation pending for {}", email);
    Ok(())
}

/// Turns a pending registration into an activated user.
pub async fn activate(db: &MongoDB, cache: &dyn Cache, link: &str) -> Result<UserDto, AppError> {
    let pending = activation_service::take(cache, link)
        .await?
        .ok_or_else(|| AppError::bad_request("Activation link is invalid or expired"))?;

    let now = BsonDateTime::now();
    let user = User {
        id: Some(ObjectId::new()),
        email: pending.email,
        name: pending.name,
        password: pending.password_hash,
        is_activated: true,
        roles: vec!["user".to_string()],
        preferred_currency: None,
        created_at: now,
        updated_at: now,
    };

    match db.collection::<User>(USERS).insert_one(&user).await {
        Ok(_) => {}
        Err(e) if is_duplicate_key(&e) => {
            return Err(AppError::Conflict(format!(
                "User with email {} already exists",
                user.email
            )));
        }
        Err(e) => return Err(e.into()),
    }

    log::info!("✅ User activated: {}", user.email);
    Ok(UserDto::from(&user))
}

// ==================== SESSION ====================

pub async fn login(db: &MongoDB, tokens: &TokenService, request: &LoginRequest) -> Result<AuthResponse, AppError> {
    let email = normalize_email(&request.email);

    let user = find_by_email(db, &email)
        .await?
        .ok_or_else(|| AppError::bad_request(INVALID_CREDENTIALS))?;

    if !verify_password(&request.password, &user.password).await? {
        return Err(AppError::bad_request(INVALID_CREDENTIALS));
    }

    if !user.is_activated {
        return Err(AppError::Forbidden("Account is not activated".to_string()));
    }

    let tokens = tokens.start_session(&subject_of(&user)?).await?;
    log::info!("🔑 User logged in: {}", user.email);

    Ok(AuthResponse {
        user: UserDto::from(&user),
        tokens,
    })
}

pub async fn refresh(db: &MongoDB, tokens: &TokenService, refresh_token: &str) -> Result<AuthResponse, AppError> {
    let mut current: Option<User> = None;
    let (_, pair) = tokens
        .rotate(refresh_token, |user_id| {
            let current = &mut current;
            async move {
                let user = find_user(db, &user_id).await?;
                let subject = user.as_ref().map(subject_of).transpose()?;
                *current = user;
                Ok(subject)
            }
        })
        .await?;

    let user = current.ok_or_else(|| AppError::Unauthorized("User not found".to_string()))?;
    Ok(AuthResponse {
        user: UserDto::from(&user),
        tokens: pair,
    })
}

pub async fn logout(tokens: &TokenService, refresh_token: Option<&str>, access_token: Option<&str>) -> Result<(), AppError> {
    tokens.revoke(refresh_token, access_token).await?;
    log::info!("👋 Session revoked");
    Ok(())
}

// ==================== PROFILE ====================

pub async fn get_me(db: &MongoDB, user_id: &ObjectId) -> Result<UserDto, AppError> {
    Ok(UserDto::from(&require_user(db, user_id).await?))
}

pub async fn get_user(db: &MongoDB, user_id: &ObjectId) -> Result<PublicUserDto, AppError> {
    Ok(PublicUserDto::from(&require_user(db, user_id).await?))
}

pub async fn update_me(db: &MongoDB, user_id: &ObjectId, request: &UpdateMeRequest) -> Result<UserDto, AppError> {
    let mut set = doc! {};

    if let Some(name) = &request.name {
        let mut v = Violations::new();
        v.name(name);
        v.into_result()?;
        set.insert("name", name.trim());
    }

    if let Some(code) = &request.preferred_currency {
        let currency = currency_service::find(db, code).await?;
        set.insert("preferred_currency", currency.code);
    }

    if set.is_empty() {
        return Err(AppError::bad_request("Nothing to update"));
    }
    set.insert("updated_at", BsonDateTime::now());

    let result = db
        .collection::<User>(USERS)
        .update_one(doc! { "_id": user_id }, doc! { "$set": set })
        .await?;
    if result.matched_count == 0 {
        return Err(AppError::NotFound("User not found".to_string()));
    }

    get_me(db, user_id).await
}

/// Requires the current password. Ends the stored session so other devices
/// must log in again.
pub async fn change_password(
    db: &MongoDB,
    tokens: &TokenService,
    config: &AppConfig,
    user_id: &ObjectId,
    request: &ChangePasswordRequest,
) -> Result<(), AppError> {
    let user = require_user(db, user_id).await?;

    if !verify_password(&request.old_password, &user.password).await? {
        return Err(AppError::bad_request("Old password is incorrect"));
    }

    let mut v = Violations::new();
    v.password("New password", &request.new_password);
    v.check(
        request.new_password != request.old_password,
        "New password must differ from the old one",
    );
    v.into_result()?;

    let hash = hash_password(&request.new_password, config.bcrypt_cost).await?;
    db.collection::<User>(USERS)
        .update_one(
            doc! { "_id": user_id },
            doc! { "$set": { "password": hash, "updated_at": BsonDateTime::now() } },
        )
        .await?;

    tokens.revoke_user(user_id).await?;
    log::info!("🔐 Password changed for {}", user.email);
    Ok(())
}

/// Deletes the account and everything hanging off it.
pub async fn delete_account(
    db: &MongoDB,
    cache: &dyn Cache,
    tokens: &TokenService,
    user_id: &ObjectId,
) -> Result<(), AppError> {
    log::info!("🗑️ Deleting account for user_id: {}", user_id);

    let deleted = db
        .collection::<User>(USERS)
        .delete_one(doc! { "_id": user_id })
        .await?;
    if deleted.deleted_count == 0 {
        return Err(AppError::NotFound("User not found".to_string()));
    }

    let recipe_ids = recipe_service::ids_owned_by(db, user_id).await?;
    recipe_service::delete_cascade(db, &recipe_ids).await?;

    let comments = comment_service::delete_for_author(db, user_id).await?;
    let favorites = favorite_service::delete_for_user(db, user_id).await?;
    tokens.revoke_user(user_id).await?;

    invalidate(cache, RECIPES_CACHE_PREFIX).await;
    invalidate(cache, FAVORITES_CACHE_PREFIX).await;

    log::info!(
        "🎉 Account deleted for {}: {} recipes, {} comments, {} favorites",
        user_id,
        recipe_ids.len(),
        comments,
        favorites
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::test_support::{drop_db, fresh_db};
    use crate::models::{Comment, CreateCommentRequest, FavoriteRecipe, Recipe, COMMENTS, FAVORITES, RECIPES};
    use crate::services::recipe_service::tests::seed_recipe;
    use crate::services::token_service::{tests::{jwt_config, service_with}, RefreshTokenStore};
    use crate::utils::cache::MemoryCache;

    fn user(email: &str) -> User {
        User {
            id: Some(ObjectId::new()),
            email: email.into(),
            name: "Cook".into(),
            password: "x".into(),
            is_activated: true,
            roles: vec!["user".into()],
            preferred_currency: None,
            created_at: BsonDateTime::now(),
            updated_at: BsonDateTime::now(),
        }
    }

    #[test]
    fn test_registration_validation() {
        let request = RegisterRequest {
            email: "not-an-email".into(),
            password: "short".into(),
            name: "A".into(),
        };
        match validate_registration(&request, &normalize_email(&request.email)) {
            Err(AppError::BadRequest(msgs)) => assert_eq!(msgs.len(), 3),
            other => panic!("unexpected: {:?}", other),
        }

        let ok = RegisterRequest {
            email: "Cook@Example.com".into(),
            password: "long enough".into(),
            name: "Cook".into(),
        };
        assert!(validate_registration(&ok, &normalize_email(&ok.email)).is_ok());
    }

    #[test]
    fn test_subject_requires_id() {
        let mut user = User {
            id: None,
            email: "cook@example.com".into(),
            name: "Cook".into(),
            password: "x".into(),
            is_activated: true,
            roles: vec!["user".into()],
            preferred_currency: None,
            created_at: BsonDateTime::now(),
            updated_at: BsonDateTime::now(),
        };
        assert!(matches!(subject_of(&user), Err(AppError::Internal(_))));

        let id = ObjectId::new();
        user.id = Some(id);
        assert_eq!(subject_of(&user).unwrap().user_id, id);
    }

    #[tokio::test]
    #[ignore = "needs MongoDB"]
    async fn test_delete_account_cascades() {
        let db = fresh_db().await;
        let cache = MemoryCache::new();
        let (tokens, store, _) = service_with(&jwt_config());

        let author = user("author@example.com");
        let reader = user("reader@example.com");
        let users = db.collection::<User>(USERS);
        users.insert_one(&author).await.unwrap();
        users.insert_one(&reader).await.unwrap();
        let (author_id, reader_id) = (author.id.unwrap(), reader.id.unwrap());

        let own = seed_recipe(&db, &author_id, true).await;
        let theirs = seed_recipe(&db, &reader_id, true).await;

        let say = |text: &str, parent: Option<String>| CreateCommentRequest { text: text.into(), parent_id: parent };
        comment_service::add(&db, &reader_id, &own, say("Great", None)).await.unwrap();
        let mine = comment_service::add(&db, &author_id, &theirs, say("Nice", None)).await.unwrap();
        comment_service::add(&db, &reader_id, &theirs, say("Thanks", Some(mine.id))).await.unwrap();
        comment_service::add(&db, &reader_id, &theirs, say("Standalone", None)).await.unwrap();
        favorite_service::add(&db, &cache, &reader_id, &own).await.unwrap();
        favorite_service::add(&db, &cache, &author_id, &theirs).await.unwrap();
        tokens.start_session(&subject_of(&author).unwrap()).await.unwrap();

        delete_account(&db, &cache, &tokens, &author_id).await.unwrap();

        assert!(find_user(&db, &author_id).await.unwrap().is_none());
        assert!(store.find(&author_id).await.unwrap().is_none());

        let recipes = db.collection::<Recipe>(RECIPES);
        let comments = db.collection::<Comment>(COMMENTS);
        let favorites = db.collection::<FavoriteRecipe>(FAVORITES);
        assert_eq!(recipes.count_documents(doc! { "owner_id": author_id }).await.unwrap(), 0);
        assert_eq!(recipes.count_documents(doc! {}).await.unwrap(), 1);
        assert_eq!(comments.count_documents(doc! { "recipe_id": own }).await.unwrap(), 0);
        assert_eq!(favorites.count_documents(doc! { "recipe_id": own }).await.unwrap(), 0);
        assert_eq!(favorites.count_documents(doc! { "user_id": author_id }).await.unwrap(), 0);
        // the reply under the deleted comment goes too, the reader's own thread stays
        assert_eq!(comments.count_documents(doc! { "recipe_id": theirs }).await.unwrap(), 1);

        assert!(matches!(
            delete_account(&db, &cache, &tokens, &author_id).await,
            Err(AppError::NotFound(_))
        ));

        drop_db(db).await;
    }
}
