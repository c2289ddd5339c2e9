use futures::stream::StreamExt;
use mongodb::bson::{doc, oid::ObjectId, DateTime as BsonDateTime};

use crate::{
    database::{is_duplicate_key, MongoDB},
    models::{FavoriteRecipe, Recipe, RecipeListItem, FAVORITES, RECIPES},
    services::recipe_service::find_recipe,
    utils::{
        cache::Cache,
        pagination::{cached_page, invalidate, page_cache_key, paginate_slice, Page, PageQuery},
        AppError,
    },
};

pub const FAVORITES_CACHE_PREFIX: &str = "favorites:";

fn user_prefix(user_id: &ObjectId) -> String {
    format!("{}{}", FAVORITES_CACHE_PREFIX, user_id.to_hex())
}

pub async fn add(db: &MongoDB, cache: &dyn Cache, user_id: &ObjectId, recipe_id: &ObjectId) -> Result<(), AppError> {
    let recipe = find_recipe(db, recipe_id).await?;
    if !recipe.visible_to(Some(user_id)) {
        return Err(AppError::NotFound("Recipe not found".to_string()));
    }

    let favorite = FavoriteRecipe {
        id: None,
        user_id: *user_id,
        recipe_id: *recipe_id,
        created_at: BsonDateTime::now(),
    };

    match db.collection::<FavoriteRecipe>(FAVORITES).insert_one(&favorite).await {
        Ok(_) => {}
        Err(e) if is_duplicate_key(&e) => {
            return Err(AppError::Conflict("Recipe is already in favorites".to_string()));
        }
        Err(e) => return Err(e.into()),
    }

    invalidate(cache, &user_prefix(user_id)).await;
    log::info!("⭐ {} added recipe {} to favorites", user_id, recipe_id);
    Ok(())
}

pub async fn remove(db: &MongoDB, cache: &dyn Cache, user_id: &ObjectId, recipe_id: &ObjectId) -> Result<(), AppError> {
    let result = db
        .collection::<FavoriteRecipe>(FAVORITES)
        .delete_one(doc! { "user_id": user_id, "recipe_id": recipe_id })
        .await?;

    if result.deleted_count == 0 {
        return Err(AppError::NotFound("Recipe is not in favorites".to_string()));
    }

    invalidate(cache, &user_prefix(user_id)).await;
    Ok(())
}

pub async fn status(db: &MongoDB, user_id: &ObjectId, recipe_id: &ObjectId) -> Result<bool, AppError> {
    let found = db
        .collection::<FavoriteRecipe>(FAVORITES)
        .find_one(doc! { "user_id": user_id, "recipe_id": recipe_id })
        .await?;
    Ok(found.is_some())
}

async fn load_page(db: &MongoDB, user_id: &ObjectId, page: &PageQuery) -> Result<Page<RecipeListItem>, AppError> {
    let options = mongodb::options::FindOptions::builder()
        .sort(doc! { "created_at": -1 })
        .build();

    let mut cursor = db
        .collection::<FavoriteRecipe>(FAVORITES)
        .find(doc! { "user_id": user_id })
        .with_options(options)
        .await?;

    let mut order = Vec::new();
    while let Some(result) = cursor.next().await {
        match result {
            Ok(favorite) => order.push(favorite.recipe_id),
            Err(e) => log::error!("Error reading favorite: {}", e),
        }
    }

    let mut cursor = db
        .collection::<Recipe>(RECIPES)
        .find(doc! { "_id": { "$in": order.clone() } })
        .await?;

    let mut recipes = Vec::new();
    while let Some(result) = cursor.next().await {
        match result {
            // a favorite whose recipe went private is hidden
            Ok(recipe) if recipe.visible_to(Some(user_id)) => recipes.push(recipe),
            Ok(_) => {}
            Err(e) => log::error!("Error reading recipe: {}", e),
        }
    }

    // keep the favorites order (newest first), then page in memory so the
    // total only counts what the user can see
    let items: Vec<RecipeListItem> = order
        .iter()
        .filter_map(|id| {
            recipes
                .iter()
                .find(|r| r.id.as_ref() == Some(id))
                .map(|r| RecipeListItem::from(r.clone()))
        })
        .collect();

    Ok(paginate_slice(items, page))
}

pub async fn list(
    db: &MongoDB,
    cache: &dyn Cache,
    ttl_secs: u64,
    user_id: &ObjectId,
    page: &PageQuery,
) -> Result<Page<RecipeListItem>, AppError> {
    let key = page_cache_key(
        &user_prefix(user_id),
        &[page.page().to_string().as_str(), page.limit().to_string().as_str()],
    );
    cached_page(cache, &key, ttl_secs, || load_page(db, user_id, page)).await
}

/// Drops every favorite of a user (account deletion).
pub async fn delete_for_user(db: &MongoDB, user_id: &ObjectId) -> Result<u64, AppError> {
    let result = db
        .collection::<FavoriteRecipe>(FAVORITES)
        .delete_many(doc! { "user_id": user_id })
        .await?;
    Ok(result.deleted_count)
}
