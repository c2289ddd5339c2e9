use mongodb::bson::{oid::ObjectId, DateTime as BsonDateTime};
use serde::{Deserialize, Serialize};

use super::rfc3339;

pub const RECIPES: &str = "recipes";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, utoipa::ToSchema)]
pub struct Ingredient {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, utoipa::ToSchema)]
pub struct Instruction {
    pub step: u32,
    pub text: String,
}

/// Recipe document (collection `recipes`) with embedded ingredients and steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recipe {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub owner_id: ObjectId,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub cuisine: Option<String>,
    pub servings: u32,
    #[serde(default)]
    pub prep_minutes: Option<u32>,
    #[serde(default)]
    pub cook_minutes: Option<u32>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub ingredients: Vec<Ingredient>,
    #[serde(default)]
    pub instructions: Vec<Instruction>,
    #[serde(default = "default_public")]
    pub is_public: bool,
    pub created_at: BsonDateTime,
    pub updated_at: BsonDateTime,
}

fn default_public() -> bool {
    true
}

impl Recipe {
    pub fn is_owned_by(&self, user_id: &ObjectId) -> bool {
        &self.owner_id == user_id
    }

    pub fn visible_to(&self, viewer: Option<&ObjectId>) -> bool {
        self.is_public || viewer.map(|v| self.is_owned_by(v)).unwrap_or(false)
    }

    pub fn total_minutes(&self) -> Option<u32> {
        match (self.prep_minutes, self.cook_minutes) {
            (None, None) => None,
            (prep, cook) => Some(prep.unwrap_or(0) + cook.unwrap_or(0)),
        }
    }
}

/// Body of `POST /api/recipes`, also the shape `PUT` merges into.
#[derive(Debug, Clone, Deserialize, utoipa::ToSchema)]
pub struct CreateRecipeRequest {
    pub title: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub cuisine: Option<String>,
    pub servings: u32,
    pub prep_minutes: Option<u32>,
    pub cook_minutes: Option<u32>,
    pub image_url: Option<String>,
    pub ingredients: Vec<Ingredient>,
    /// Step texts in order; numbered on save.
    pub instructions: Vec<String>,
    #[serde(default = "default_public")]
    pub is_public: bool,
}

#[derive(Debug, Clone, Default, Deserialize, utoipa::ToSchema)]
pub struct UpdateRecipeRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub cuisine: Option<String>,
    pub servings: Option<u32>,
    pub prep_minutes: Option<u32>,
    pub cook_minutes: Option<u32>,
    pub image_url: Option<String>,
    pub ingredients: Option<Vec<Ingredient>>,
    pub instructions: Option<Vec<String>>,
    pub is_public: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct RecipeDto {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub cuisine: Option<String>,
    pub servings: u32,
    pub prep_minutes: Option<u32>,
    pub cook_minutes: Option<u32>,
    pub total_minutes: Option<u32>,
    pub image_url: Option<String>,
    pub ingredients: Vec<Ingredient>,
    pub instructions: Vec<Instruction>,
    pub is_public: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Recipe> for RecipeDto {
    fn from(recipe: Recipe) -> Self {
        let total_minutes = recipe.total_minutes();
        RecipeDto {
            id: recipe.id.map(|id| id.to_hex()).unwrap_or_default(),
            owner_id: recipe.owner_id.to_hex(),
            title: recipe.title,
            description: recipe.description,
            category: recipe.category,
            cuisine: recipe.cuisine,
            servings: recipe.servings,
            prep_minutes: recipe.prep_minutes,
            cook_minutes: recipe.cook_minutes,
            total_minutes,
            image_url: recipe.image_url,
            ingredients: recipe.ingredients,
            instructions: recipe.instructions,
            is_public: recipe.is_public,
            created_at: rfc3339(&recipe.created_at),
            updated_at: rfc3339(&recipe.updated_at),
        }
    }
}

/// Compact list entry (no ingredients/steps).
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct RecipeListItem {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub category: Option<String>,
    pub cuisine: Option<String>,
    pub servings: u32,
    pub total_minutes: Option<u32>,
    pub image_url: Option<String>,
    pub created_at: String,
}

impl From<Recipe> for RecipeListItem {
    fn from(recipe: Recipe) -> Self {
        let total_minutes = recipe.total_minutes();
        RecipeListItem {
            id: recipe.id.map(|id| id.to_hex()).unwrap_or_default(),
            owner_id: recipe.owner_id.to_hex(),
            title: recipe.title,
            category: recipe.category,
            cuisine: recipe.cuisine,
            servings: recipe.servings,
            total_minutes,
            image_url: recipe.image_url,
            created_at: rfc3339(&recipe.created_at),
        }
    }
}

/// Numbers steps `1..n` in the order given, dropping blank ones.
pub fn number_instructions(steps: Vec<String>) -> Vec<Instruction> {
    steps
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .enumerate()
        .map(|(i, text)| Instruction { step: i as u32 + 1, text })
        .collect()
}
