use futures::stream::StreamExt;
use mongodb::bson::{doc, oid::ObjectId, DateTime as BsonDateTime, Document};
use serde::Deserialize;

use crate::{
    database::MongoDB,
    models::{
        number_instructions, Comment, CreateRecipeRequest, FavoriteRecipe, Ingredient, Recipe,
        RecipeDto, RecipeListItem, UpdateRecipeRequest, COMMENTS, FAVORITES, RECIPES,
    },
    utils::{
        cache::Cache,
        pagination::{cached_page, invalidate, page_cache_key, Page, PageQuery},
        validation::Violations,
        AppError,
    },
};

pub const RECIPES_CACHE_PREFIX: &str = "recipes:";

pub const TITLE_MAX: usize = 120;
pub const DESCRIPTION_MAX: usize = 2000;

/// `GET /api/recipes` query string.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecipeListQuery {
    pub page: Option<u64>,
    pub limit: Option<u64>,
    pub category: Option<String>,
    pub cuisine: Option<String>,
    pub search: Option<String>,
}

impl RecipeListQuery {
    pub fn page_query(&self) -> PageQuery {
        PageQuery { page: self.page, limit: self.limit }
    }

    fn cache_key(&self) -> String {
        let page = self.page_query();
        // encoded so a ':' inside a filter value cannot shift the other parts
        let norm = |v: &Option<String>| {
            v.as_deref()
                .map(|s| urlencoding::encode(&s.trim().to_lowercase()).into_owned())
                .unwrap_or_default()
        };
        page_cache_key(
            "recipes:list",
            &[
                page.page().to_string().as_str(),
                page.limit().to_string().as_str(),
                norm(&self.category).as_str(),
                norm(&self.cuisine).as_str(),
                norm(&self.search).as_str(),
            ],
        )
    }

    fn filter(&self) -> Document {
        let mut filter = doc! { "is_public": true };
        if let Some(category) = non_blank(&self.category) {
            filter.insert("category", exact_ci(category));
        }
        if let Some(cuisine) = non_blank(&self.cuisine) {
            filter.insert("cuisine", exact_ci(cuisine));
        }
        if let Some(search) = non_blank(&self.search) {
            filter.insert(
                "title",
                doc! { "$regex": regex::escape(search), "$options": "i" },
            );
        }
        filter
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn exact_ci(value: &str) -> Document {
    doc! { "$regex": format!("^{}$", regex::escape(value)), "$options": "i" }
}

// ==================== VALIDATION ====================

fn validate_recipe(
    title: &str,
    description: Option<&str>,
    servings: u32,
    ingredients: &[Ingredient],
    instruction_count: usize,
) -> Result<(), AppError> {
    let mut v = Violations::new();
    v.text("Title", title, 1, TITLE_MAX);
    if let Some(description) = description {
        v.check(
            description.chars().count() <= DESCRIPTION_MAX,
            format!("Description must be at most {} characters long", DESCRIPTION_MAX),
        );
    }
    v.check(servings >= 1, "Servings must be at least 1");
    v.check(!ingredients.is_empty(), "At least one ingredient is required");
    v.check(
        ingredients.iter().all(|i| !i.name.trim().is_empty()),
        "Ingredient name must not be empty",
    );
    v.check(
        ingredients
            .iter()
            .all(|i| i.quantity.map(|q| q.is_finite() && q >= 0.0).unwrap_or(true)),
        "Ingredient quantity must be a non-negative number",
    );
    v.check(instruction_count >= 1, "At least one instruction is required");
    v.into_result()
}

fn clean_optional(value: Option<String>) -> Option<String> {
    value.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

// ==================== QUERIES ====================

pub async fn find_recipe(db: &MongoDB, id: &ObjectId) -> Result<Recipe, AppError> {
    db.collection::<Recipe>(RECIPES)
        .find_one(doc! { "_id": id })
        .await?
        .ok_or_else(|| AppError::NotFound("Recipe not found".to_string()))
}

/// Recipe as seen by `viewer`; private recipes of others look missing.
pub async fn get(db: &MongoDB, id: &ObjectId, viewer: Option<&ObjectId>) -> Result<RecipeDto, AppError> {
    let recipe = find_recipe(db, id).await?;
    if !recipe.visible_to(viewer) {
        return Err(AppError::NotFound("Recipe not found".to_string()));
    }
    Ok(recipe.into())
}

async fn load_page(db: &MongoDB, filter: Document, page: &PageQuery) -> Result<Page<RecipeListItem>, AppError> {
    let collection = db.collection::<Recipe>(RECIPES);
    let total = collection.count_documents(filter.clone()).await?;

    let options = mongodb::options::FindOptions::builder()
        .sort(doc! { "created_at": -1 })
        .skip(page.skip())
        .limit(page.limit() as i64)
        .build();

    let mut cursor = collection.find(filter).with_options(options).await?;

    let mut items = Vec::new();
    while let Some(result) = cursor.next().await {
        match result {
            Ok(recipe) => items.push(RecipeListItem::from(recipe)),
            Err(e) => log::error!("Error reading recipe: {}", e),
        }
    }

    Ok(Page::new(items, page, total))
}

pub async fn list(
    db: &MongoDB,
    cache: &dyn Cache,
    ttl_secs: u64,
    query: &RecipeListQuery,
) -> Result<Page<RecipeListItem>, AppError> {
    let page = query.page_query();
    cached_page(cache, &query.cache_key(), ttl_secs, || {
        load_page(db, query.filter(), &page)
    })
    .await
}

/// Recipes of `owner`. The owner also sees their private ones.
pub async fn list_by_user(
    db: &MongoDB,
    cache: &dyn Cache,
    ttl_secs: u64,
    owner: &ObjectId,
    viewer: Option<&ObjectId>,
    page: &PageQuery,
) -> Result<Page<RecipeListItem>, AppError> {
    let own = viewer == Some(owner);
    let mut filter = doc! { "owner_id": owner };
    if !own {
        filter.insert("is_public", true);
    }

    let key = page_cache_key(
        "recipes:user",
        &[
            owner.to_hex().as_str(),
            if own { "all" } else { "public" },
            page.page().to_string().as_str(),
            page.limit().to_string().as_str(),
        ],
    );

    cached_page(cache, &key, ttl_secs, || load_page(db, filter, page)).await
}

// ==================== WRITES ====================

pub async fn create(
    db: &MongoDB,
    cache: &dyn Cache,
    owner: &ObjectId,
    request: CreateRecipeRequest,
) -> Result<RecipeDto, AppError> {
    let instructions = number_instructions(request.instructions);
    validate_recipe(
        &request.title,
        request.description.as_deref(),
        request.servings,
        &request.ingredients,
        instructions.len(),
    )?;

    let now = BsonDateTime::now();
    let recipe = Recipe {
        id: Some(ObjectId::new()),
        owner_id: *owner,
        title: request.title.trim().to_string(),
        description: clean_optional(request.description),
        category: clean_optional(request.category),
        cuisine: clean_optional(request.cuisine),
        servings: request.servings,
        prep_minutes: request.prep_minutes,
        cook_minutes: request.cook_minutes,
        image_url: clean_optional(request.image_url),
        ingredients: request.ingredients,
        instructions,
        is_public: request.is_public,
        created_at: now,
        updated_at: now,
    };

    db.collection::<Recipe>(RECIPES).insert_one(&recipe).await?;
    invalidate(cache, RECIPES_CACHE_PREFIX).await;

    log::info!("✅ Recipe created: {} by {}", recipe.title, owner);
    Ok(recipe.into())
}

fn merge(mut recipe: Recipe, update: UpdateRecipeRequest) -> Recipe {
    if let Some(title) = update.title {
        recipe.title = title.trim().to_string();
    }
    if update.description.is_some() {
        recipe.description = clean_optional(update.description);
    }
    if update.category.is_some() {
        recipe.category = clean_optional(update.category);
    }
    if update.cuisine.is_some() {
        recipe.cuisine = clean_optional(update.cuisine);
    }
    if let Some(servings) = update.servings {
        recipe.servings = servings;
    }
    if update.prep_minutes.is_some() {
        recipe.prep_minutes = update.prep_minutes;
    }
    if update.cook_minutes.is_some() {
        recipe.cook_minutes = update.cook_minutes;
    }
    if update.image_url.is_some() {
        recipe.image_url = clean_optional(update.image_url);
    }
    if let Some(ingredients) = update.ingredients {
        recipe.ingredients = ingredients;
    }
    if let Some(steps) = update.instructions {
        recipe.instructions = number_instructions(steps);
    }
    if let Some(is_public) = update.is_public {
        recipe.is_public = is_public;
    }
    recipe
}

async fn find_owned(db: &MongoDB, id: &ObjectId, user_id: &ObjectId) -> Result<Recipe, AppError> {
    let recipe = find_recipe(db, id).await?;
    if !recipe.is_owned_by(user_id) {
        return Err(AppError::Forbidden(
            "Only the author can modify this recipe".to_string(),
        ));
    }
    Ok(recipe)
}

pub async fn update(
    db: &MongoDB,
    cache: &dyn Cache,
    user_id: &ObjectId,
    id: &ObjectId,
    request: UpdateRecipeRequest,
) -> Result<RecipeDto, AppError> {
    let existing = find_owned(db, id, user_id).await?;

    let mut recipe = merge(existing, request);
    validate_recipe(
        &recipe.title,
        recipe.description.as_deref(),
        recipe.servings,
        &recipe.ingredients,
        recipe.instructions.len(),
    )?;
    recipe.updated_at = BsonDateTime::now();

    db.collection::<Recipe>(RECIPES)
        .replace_one(doc! { "_id": id }, &recipe)
        .await?;
    invalidate(cache, RECIPES_CACHE_PREFIX).await;
    invalidate(cache, super::favorite_service::FAVORITES_CACHE_PREFIX).await;

    log::info!("✅ Recipe updated: {}", id);
    Ok(recipe.into())
}

pub async fn delete(db: &MongoDB, cache: &dyn Cache, user_id: &ObjectId, id: &ObjectId) -> Result<(), AppError> {
    find_owned(db, id, user_id).await?;
    delete_cascade(db, &[*id]).await?;

    invalidate(cache, RECIPES_CACHE_PREFIX).await;
    invalidate(cache, super::favorite_service::FAVORITES_CACHE_PREFIX).await;

    log::info!("🗑️ Recipe deleted: {}", id);
    Ok(())
}

/// Removes recipes together with their comments and favorites.
pub async fn delete_cascade(db: &MongoDB, ids: &[ObjectId]) -> Result<u64, AppError> {
    if ids.is_empty() {
        return Ok(0);
    }
    let ids: Vec<ObjectId> = ids.to_vec();

    let comments = db
        .collection::<Comment>(COMMENTS)
        .delete_many(doc! { "recipe_id": { "$in": ids.clone() } })
        .await?;
    let favorites = db
        .collection::<FavoriteRecipe>(FAVORITES)
        .delete_many(doc! { "recipe_id": { "$in": ids.clone() } })
        .await?;
    let recipes = db
        .collection::<Recipe>(RECIPES)
        .delete_many(doc! { "_id": { "$in": ids.clone() } })
        .await?;

    log::info!(
        "✅ Deleted {} recipes, {} comments, {} favorites",
        recipes.deleted_count,
        comments.deleted_count,
        favorites.deleted_count
    );
    Ok(recipes.deleted_count)
}

pub async fn ids_owned_by(db: &MongoDB, owner: &ObjectId) -> Result<Vec<ObjectId>, AppError> {
    let mut cursor = db
        .collection::<Recipe>(RECIPES)
        .find(doc! { "owner_id": owner })
        .await?;

    let mut ids = Vec::new();
    while let Some(result) = cursor.next().await {
        if let Some(id) = result?.id {
            ids.push(id);
        }
    }
    Ok(ids)
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::database::test_support::{drop_db, fresh_db};
    use crate::models::{CreateCommentRequest, Instruction};
    use crate::services::{comment_service, favorite_service};
    use crate::utils::cache::MemoryCache;

    pub fn recipe_request(title: &str, is_public: bool) -> CreateRecipeRequest {
        CreateRecipeRequest {
            title: title.into(),
            description: None,
            category: Some("Soup".into()),
            cuisine: None,
            servings: 2,
            prep_minutes: Some(5),
            cook_minutes: Some(20),
            image_url: None,
            ingredients: vec![Ingredient { name: "water".into(), quantity: Some(1.0), unit: Some("l".into()) }],
            instructions: vec!["Boil".into()],
            is_public,
        }
    }

    /// Creates a recipe and returns its id.
    pub async fn seed_recipe(db: &MongoDB, owner: &ObjectId, is_public: bool) -> ObjectId {
        let dto = create(db, &MemoryCache::new(), owner, recipe_request("Soup", is_public))
            .await
            .unwrap();
        ObjectId::parse_str(&dto.id).unwrap()
    }

    fn ingredient(name: &str) -> Ingredient {
        Ingredient { name: name.into(), quantity: Some(1.0), unit: None }
    }

    #[test]
    fn test_validation_collects_all_problems() {
        let err = validate_recipe("", None, 0, &[], 0).unwrap_err();
        match err {
            AppError::BadRequest(msgs) => {
                assert_eq!(msgs.len(), 4);
                assert!(msgs.iter().any(|m| m.starts_with("Title")));
                assert!(msgs.contains(&"Servings must be at least 1".to_string()));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_validation_title_length() {
        let long = "x".repeat(TITLE_MAX + 1);
        assert!(validate_recipe(&long, None, 1, &[ingredient("salt")], 1).is_err());
        assert!(validate_recipe("Soup", None, 1, &[ingredient("salt")], 1).is_ok());
        let bad_qty = Ingredient { name: "salt".into(), quantity: Some(-1.0), unit: None };
        assert!(validate_recipe("Soup", None, 1, &[bad_qty], 1).is_err());
    }

    #[test]
    fn test_merge_renumbers_instructions() {
        let recipe = Recipe {
            id: Some(ObjectId::new()),
            owner_id: ObjectId::new(),
            title: "Soup".into(),
            description: Some("Warm".into()),
            category: None,
            cuisine: None,
            servings: 2,
            prep_minutes: None,
            cook_minutes: None,
            image_url: None,
            ingredients: vec![ingredient("water")],
            instructions: vec![Instruction { step: 1, text: "Boil".into() }],
            is_public: true,
            created_at: BsonDateTime::now(),
            updated_at: BsonDateTime::now(),
        };

        let merged = merge(
            recipe,
            UpdateRecipeRequest {
                title: Some("  Better soup ".into()),
                description: Some("   ".into()),
                instructions: Some(vec!["Chop".into(), "Boil".into(), "Serve".into()]),
                ..Default::default()
            },
        );

        assert_eq!(merged.title, "Better soup");
        assert_eq!(merged.description, None);
        assert_eq!(merged.servings, 2);
        assert_eq!(merged.instructions.iter().map(|i| i.step).collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn test_list_filter_and_cache_key() {
        let query = RecipeListQuery {
            page: Some(2),
            limit: Some(500),
            category: Some(" Dessert ".into()),
            cuisine: None,
            search: Some("pie (apple)".into()),
        };

        assert_eq!(query.cache_key(), "recipes:list:2:100:dessert::pie%20%28apple%29");
        assert!(query.cache_key().starts_with(RECIPES_CACHE_PREFIX));

        let filter = query.filter();
        assert_eq!(filter.get_bool("is_public").unwrap(), true);
        let title = filter.get_document("title").unwrap();
        assert_eq!(title.get_str("$regex").unwrap(), r"pie \(apple\)");
        assert!(filter.get("cuisine").is_none());
    }

    #[test]
    fn test_cache_key_separates_filters_containing_colons() {
        let first = RecipeListQuery {
            category: Some("a:b".into()),
            cuisine: Some("c".into()),
            ..Default::default()
        };
        let second = RecipeListQuery {
            category: Some("a".into()),
            cuisine: Some("b:c".into()),
            ..Default::default()
        };

        assert_ne!(first.filter(), second.filter());
        assert_ne!(first.cache_key(), second.cache_key());
        assert_eq!(first.cache_key(), "recipes:list:1:10:a%3Ab:c:");
    }

    #[tokio::test]
    #[ignore = "needs MongoDB"]
    async fn test_only_owner_can_update_or_delete() {
        let db = fresh_db().await;
        let cache = MemoryCache::new();
        let owner = ObjectId::new();
        let stranger = ObjectId::new();
        let id = seed_recipe(&db, &owner, true).await;

        let change = UpdateRecipeRequest { title: Some("Mine now".into()), ..Default::default() };
        assert!(matches!(
            update(&db, &cache, &stranger, &id, change.clone()).await,
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(delete(&db, &cache, &stranger, &id).await, Err(AppError::Forbidden(_))));

        let updated = update(&db, &cache, &owner, &id, change).await.unwrap();
        assert_eq!(updated.title, "Mine now");
        delete(&db, &cache, &owner, &id).await.unwrap();
        assert!(matches!(find_recipe(&db, &id).await, Err(AppError::NotFound(_))));

        drop_db(db).await;
    }

    #[tokio::test]
    #[ignore = "needs MongoDB"]
    async fn test_private_recipe_is_hidden_from_others() {
        let db = fresh_db().await;
        let owner = ObjectId::new();
        let id = seed_recipe(&db, &owner, false).await;

        assert!(get(&db, &id, Some(&owner)).await.is_ok());
        assert!(matches!(get(&db, &id, Some(&ObjectId::new())).await, Err(AppError::NotFound(_))));
        assert!(matches!(get(&db, &id, None).await, Err(AppError::NotFound(_))));

        drop_db(db).await;
    }

    #[tokio::test]
    #[ignore = "needs MongoDB"]
    async fn test_delete_cascades_comments_and_favorites() {
        let db = fresh_db().await;
        let cache = MemoryCache::new();
        let owner = ObjectId::new();
        let fan = ObjectId::new();
        let id = seed_recipe(&db, &owner, true).await;
        let other = seed_recipe(&db, &owner, true).await;

        favorite_service::add(&db, &cache, &fan, &id).await.unwrap();
        favorite_service::add(&db, &cache, &fan, &other).await.unwrap();
        let request = || CreateCommentRequest { text: "Tasty".into(), parent_id: None };
        comment_service::add(&db, &fan, &id, request()).await.unwrap();
        comment_service::add(&db, &fan, &other, request()).await.unwrap();

        delete(&db, &cache, &owner, &id).await.unwrap();

        let comments = db.collection::<Comment>(COMMENTS);
        let favorites = db.collection::<FavoriteRecipe>(FAVORITES);
        assert_eq!(comments.count_documents(doc! { "recipe_id": id }).await.unwrap(), 0);
        assert_eq!(favorites.count_documents(doc! { "recipe_id": id }).await.unwrap(), 0);
        // the other recipe keeps its own
        assert_eq!(comments.count_documents(doc! { "recipe_id": other }).await.unwrap(), 1);
        assert_eq!(favorites.count_documents(doc! { "recipe_id": other }).await.unwrap(), 1);

        drop_db(db).await;
    }
}
