use actix_web::{web, HttpResponse};

use crate::{
    config::AppConfig,
    database::MongoDB,
    middleware::{AuthUser, OptionalAuthUser},
    models::{CreateRecipeRequest, RecipeDto, UpdateRecipeRequest},
    services::{
        favorite_service,
        recipe_service::{self, RecipeListQuery},
    },
    utils::{cache::Cache, pagination::PageQuery, validation::parse_object_id, AppError},
};

#[utoipa::path(
    get,
    path = "/api/recipes",
    tag = "Recipes",
    params(
        ("page" = Option<u64>, Query, description = "1-based page"),
        ("limit" = Option<u64>, Query, description = "Page size (max 100)"),
        ("category" = Option<String>, Query, description = "Exact category, case-insensitive"),
        ("cuisine" = Option<String>, Query, description = "Exact cuisine, case-insensitive"),
        ("search" = Option<String>, Query, description = "Substring of the title")
    ),
    responses(
        (status = 200, description = "Page of public recipes")
    )
)]
pub async fn list_recipes(
    db: web::Data<MongoDB>,
    cache: web::Data<dyn Cache>,
    config: web::Data<AppConfig>,
    query: web::Query<RecipeListQuery>,
) -> Result<HttpResponse, AppError> {
    let recipes = recipe_service::list(&db, cache.get_ref(), config.page_cache_ttl_seconds, &query).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true, "recipes": recipes })))
}

#[utoipa::path(
    post,
    path = "/api/recipes",
    tag = "Recipes",
    request_body = CreateRecipeRequest,
    responses(
        (status = 201, description = "Recipe created", body = RecipeDto),
        (status = 400, description = "Validation failed"),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn create_recipe(
    db: web::Data<MongoDB>,
    cache: web::Data<dyn Cache>,
    user: AuthUser,
    request: web::Json<CreateRecipeRequest>,
) -> Result<HttpResponse, AppError> {
    log::info!("🍳 POST /recipes - owner: {}", user.user_id);

    let recipe = recipe_service::create(&db, cache.get_ref(), &user.user_id, request.into_inner()).await?;
    Ok(HttpResponse::Created().json(serde_json::json!({ "success": true, "recipe": recipe })))
}

#[utoipa::path(
    get,
    path = "/api/recipes/{id}",
    tag = "Recipes",
    params(("id" = String, Path, description = "Recipe id")),
    responses(
        (status = 200, description = "Recipe", body = RecipeDto),
        (status = 404, description = "Not found or private")
    )
)]
pub async fn get_recipe(
    db: web::Data<MongoDB>,
    viewer: OptionalAuthUser,
    id: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let id = parse_object_id(&id, "recipe")?;
    let recipe = recipe_service::get(&db, &id, viewer.user_id()).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true, "recipe": recipe })))
}

/// PUT /api/recipes/{id}
pub async fn update_recipe(
    db: web::Data<MongoDB>,
    cache: web::Data<dyn Cache>,
    user: AuthUser,
    id: web::Path<String>,
    request: web::Json<UpdateRecipeRequest>,
) -> Result<HttpResponse, AppError> {
    log::info!("✏️ PUT /recipes/{} - {}", id, user.user_id);

    let id = parse_object_id(&id, "recipe")?;
    let recipe = recipe_service::update(&db, cache.get_ref(), &user.user_id, &id, request.into_inner()).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true, "recipe": recipe })))
}

/// DELETE /api/recipes/{id}
pub async fn delete_recipe(
    db: web::Data<MongoDB>,
    cache: web::Data<dyn Cache>,
    user: AuthUser,
    id: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    log::info!("🗑️ DELETE /recipes/{} - {}", id, user.user_id);

    let id = parse_object_id(&id, "recipe")?;
    recipe_service::delete(&db, cache.get_ref(), &user.user_id, &id).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "message": "Recipe deleted"
    })))
}

// ==================== FAVORITES ====================

/// GET /api/recipes/favorites
pub async fn list_favorites(
    db: web::Data<MongoDB>,
    cache: web::Data<dyn Cache>,
    config: web::Data<AppConfig>,
    user: AuthUser,
    page: web::Query<PageQuery>,
) -> Result<HttpResponse, AppError> {
    let recipes = favorite_service::list(
        &db,
        cache.get_ref(),
        config.page_cache_ttl_seconds,
        &user.user_id,
        &page,
    )
    .await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true, "recipes": recipes })))
}

/// POST /api/recipes/{id}/favorite
pub async fn add_favorite(
    db: web::Data<MongoDB>,
    cache: web::Data<dyn Cache>,
    user: AuthUser,
    id: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let recipe_id = parse_object_id(&id, "recipe")?;
    favorite_service::add(&db, cache.get_ref(), &user.user_id, &recipe_id).await?;
    Ok(HttpResponse::Created().json(serde_json::json!({ "success": true, "favorite": true })))
}

/// DELETE /api/recipes/{id}/favorite
pub async fn remove_favorite(
    db: web::Data<MongoDB>,
    cache: web::Data<dyn Cache>,
    user: AuthUser,
    id: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let recipe_id = parse_object_id(&id, "recipe")?;
    favorite_service::remove(&db, cache.get_ref(), &user.user_id, &recipe_id).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true, "favorite": false })))
}

/// GET /api/recipes/{id}/favorite
pub async fn favorite_status(
    db: web::Data<MongoDB>,
    user: AuthUser,
    id: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let recipe_id = parse_object_id(&id, "recipe")?;
    let favorite = favorite_service::status(&db, &user.user_id, &recipe_id).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true, "favorite": favorite })))
}
