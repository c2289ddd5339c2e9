use actix_web::{
    cookie::{time::Duration as CookieDuration, Cookie, SameSite},
    http::header,
    web, HttpRequest, HttpResponse,
};

use crate::{
    config::AppConfig,
    database::MongoDB,
    middleware::{auth::bearer_token, AuthUser, OptionalAuthUser},
    services::{
        auth_service::{
            self, AuthResponse, ChangePasswordRequest, LoginRequest, RefreshTokenRequest,
            RegisterRequest, UpdateMeRequest,
        },
        mail_service::Mailer,
        recipe_service,
        token_service::TokenService,
    },
    utils::{cache::Cache, pagination::PageQuery, validation::parse_object_id, AppError},
};

pub const REFRESH_COOKIE: &str = "refreshToken";
const REFRESH_COOKIE_PATH: &str = "/api/users";

fn refresh_cookie(config: &AppConfig, token: &str, max_age_secs: i64) -> Cookie<'static> {
    Cookie::build(REFRESH_COOKIE, token.to_string())
        .path(REFRESH_COOKIE_PATH)
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(config.cookie_secure)
        .max_age(CookieDuration::seconds(max_age_secs))
        .finish()
}

fn cleared_cookie(config: &AppConfig) -> Cookie<'static> {
    let mut cookie = refresh_cookie(config, "", 0);
    cookie.make_removal();
    cookie
}

fn session_response(config: &AppConfig, auth: AuthResponse) -> HttpResponse {
    let cookie = refresh_cookie(config, &auth.tokens.refresh_token, auth.tokens.refresh_expires_in);
    HttpResponse::Ok().cookie(cookie).json(serde_json::json!({
        "success": true,
        "user": auth.user,
        "tokens": auth.tokens,
    }))
}

// ==================== REGISTRATION ====================

#[utoipa::path(
    post,
    path = "/api/users/registration",
    tag = "Users",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Activation link sent"),
        (status = 400, description = "Invalid input"),
        (status = 409, description = "Email already registered")
    )
)]
pub async fn register(
    db: web::Data<MongoDB>,
    cache: web::Data<dyn Cache>,
    mailer: web::Data<dyn Mailer>,
    config: web::Data<AppConfig>,
    request: web::Json<RegisterRequest>,
) -> Result<HttpResponse, AppError> {
    log::info!("📝 POST /users/registration - email: {}", request.email);

    auth_service::register(&db, cache.get_ref(), mailer.get_ref(), &config, &request).await?;

    Ok(HttpResponse::Created().json(serde_json::json!({
        "success": true,
        "message": "Activation link sent. Check your email to finish registration."
    })))
}

/// GET /api/users/activate/{link}
pub async fn activate(
    db: web::Data<MongoDB>,
    cache: web::Data<dyn Cache>,
    config: web::Data<AppConfig>,
    link: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    log::info!("✉️ GET /users/activate");

    auth_service::activate(&db, cache.get_ref(), &link).await?;

    Ok(HttpResponse::Found()
        .insert_header((header::LOCATION, config.client_url.clone()))
        .finish())
}

// ==================== SESSION ====================

#[utoipa::path(
    post,
    path = "/api/users/login",
    tag = "Users",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful; refresh token also set as cookie", body = AuthResponse),
        (status = 400, description = "Invalid email or password")
    )
)]
pub async fn login(
    db: web::Data<MongoDB>,
    tokens: web::Data<TokenService>,
    config: web::Data<AppConfig>,
    request: web::Json<LoginRequest>,
) -> Result<HttpResponse, AppError> {
    log::info!("🔐 POST /users/login - email: {}", request.email);

    let auth = auth_service::login(&db, &tokens, &request).await?;
    Ok(session_response(&config, auth))
}

#[utoipa::path(
    post,
    path = "/api/users/refresh",
    tag = "Users",
    request_body = RefreshTokenRequest,
    responses(
        (status = 200, description = "New token pair", body = AuthResponse),
        (status = 401, description = "Refresh token missing, invalid or revoked")
    )
)]
pub async fn refresh(
    req: HttpRequest,
    db: web::Data<MongoDB>,
    tokens: web::Data<TokenService>,
    config: web::Data<AppConfig>,
    body: Option<web::Json<RefreshTokenRequest>>,
) -> Result<HttpResponse, AppError> {
    log::info!("🔄 POST /users/refresh");

    let token = req
        .cookie(REFRESH_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
        .or_else(|| body.and_then(|b| b.into_inner().refresh_token))
        .ok_or_else(|| AppError::Unauthorized("Refresh token is missing".to_string()))?;

    let auth = auth_service::refresh(&db, &tokens, &token).await?;
    Ok(session_response(&config, auth))
}

/// POST /api/users/logout
pub async fn logout(
    req: HttpRequest,
    tokens: web::Data<TokenService>,
    config: web::Data<AppConfig>,
) -> Result<HttpResponse, AppError> {
    log::info!("👋 POST /users/logout");

    let refresh = req.cookie(REFRESH_COOKIE).map(|c| c.value().to_string());
    let access = bearer_token(req.headers());

    auth_service::logout(&tokens, refresh.as_deref().filter(|t| !t.is_empty()), access).await?;

    Ok(HttpResponse::Ok()
        .cookie(cleared_cookie(&config))
        .json(serde_json::json!({ "success": true })))
}

// ==================== PROFILE ====================

#[utoipa::path(
    get,
    path = "/api/users/me",
    tag = "Users",
    responses(
        (status = 200, description = "Current user", body = crate::models::UserDto),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn get_me(db: web::Data<MongoDB>, user: AuthUser) -> Result<HttpResponse, AppError> {
    let me = auth_service::get_me(&db, &user.user_id).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true, "user": me })))
}

/// PATCH /api/users/me
pub async fn update_me(
    db: web::Data<MongoDB>,
    user: AuthUser,
    request: web::Json<UpdateMeRequest>,
) -> Result<HttpResponse, AppError> {
    log::info!("✏️ PATCH /users/me - {}", user.user_id);

    let me = auth_service::update_me(&db, &user.user_id, &request).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true, "user": me })))
}

/// PUT /api/users/me/password
pub async fn change_password(
    db: web::Data<MongoDB>,
    tokens: web::Data<TokenService>,
    config: web::Data<AppConfig>,
    user: AuthUser,
    request: web::Json<ChangePasswordRequest>,
) -> Result<HttpResponse, AppError> {
    log::info!("🔐 PUT /users/me/password - {}", user.user_id);

    auth_service::change_password(&db, &tokens, &config, &user.user_id, &request).await?;
    tokens.revoke_access(&user.jti, user.exp).await?;

    Ok(HttpResponse::Ok()
        .cookie(cleared_cookie(&config))
        .json(serde_json::json!({
            "success": true,
            "message": "Password changed. Please log in again."
        })))
}

/// DELETE /api/users/me
pub async fn delete_me(
    db: web::Data<MongoDB>,
    cache: web::Data<dyn Cache>,
    tokens: web::Data<TokenService>,
    config: web::Data<AppConfig>,
    user: AuthUser,
) -> Result<HttpResponse, AppError> {
    log::info!("🗑️ DELETE /users/me - {}", user.user_id);

    auth_service::delete_account(&db, cache.get_ref(), &tokens, &user.user_id).await?;
    tokens.revoke_access(&user.jti, user.exp).await?;

    Ok(HttpResponse::Ok()
        .cookie(cleared_cookie(&config))
        .json(serde_json::json!({
            "success": true,
            "message": "Account deleted"
        })))
}

/// GET /api/users/{id}
pub async fn get_user(db: web::Data<MongoDB>, id: web::Path<String>) -> Result<HttpResponse, AppError> {
    let user_id = parse_object_id(&id, "user")?;
    let user = auth_service::get_user(&db, &user_id).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true, "user": user })))
}

/// GET /api/users/{id}/recipes
pub async fn get_user_recipes(
    db: web::Data<MongoDB>,
    cache: web::Data<dyn Cache>,
    config: web::Data<AppConfig>,
    viewer: OptionalAuthUser,
    id: web::Path<String>,
    page: web::Query<PageQuery>,
) -> Result<HttpResponse, AppError> {
    let owner = parse_object_id(&id, "user")?;
    let recipes = recipe_service::list_by_user(
        &db,
        cache.get_ref(),
        config.page_cache_ttl_seconds,
        &owner,
        viewer.user_id(),
        &page,
    )
    .await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true, "recipes": recipes })))
}
