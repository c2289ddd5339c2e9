use actix_web::{web, HttpResponse};

use crate::{
    database::MongoDB,
    services::recipe_api_service::{RandomQuery, RecipeApiClient, RecipeQuery, SearchQuery},
    utils::{cache::Cache, AppError},
};

/// GET /api/spoonacular/recipes/search?query&offset&number
pub async fn search(
    client: web::Data<RecipeApiClient>,
    cache: web::Data<dyn Cache>,
    query: web::Query<SearchQuery>,
) -> Result<HttpResponse, AppError> {
    log::info!("🔎 Recipe API search: {}", query.query);

    let result = client.search(cache.get_ref(), &query).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true, "data": result })))
}

/// GET /api/spoonacular/recipes/random?number
pub async fn random(
    client: web::Data<RecipeApiClient>,
    query: web::Query<RandomQuery>,
) -> Result<HttpResponse, AppError> {
    let result = client.random(query.number).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true, "data": result })))
}

/// GET /api/spoonacular/recipes/{id}?currency
pub async fn get_recipe(
    client: web::Data<RecipeApiClient>,
    db: web::Data<MongoDB>,
    cache: web::Data<dyn Cache>,
    id: web::Path<u64>,
    query: web::Query<RecipeQuery>,
) -> Result<HttpResponse, AppError> {
    let recipe = client
        .get(&db, cache.get_ref(), id.into_inner(), query.currency.as_deref())
        .await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true, "data": recipe })))
}
