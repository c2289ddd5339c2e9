use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;

use crate::{
    database::MongoDB,
    models::Money,
    services::currency_service,
    utils::{
        cache::Cache,
        key_rotator::{ApiKeyRotator, KeyAttemptError},
        AppError,
    },
};

const PROXY_CACHE_PREFIX: &str = "proxy:";
const PROXY_CACHE_TTL_SECS: u64 = 600;
const MAX_NUMBER: u32 = 100;
const DEFAULT_NUMBER: u32 = 10;

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub query: String,
    pub offset: Option<u32>,
    pub number: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct RandomQuery {
    pub number: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct RecipeQuery {
    pub currency: Option<String>,
}

fn clamp_number(number: Option<u32>) -> u32 {
    number.unwrap_or(DEFAULT_NUMBER).clamp(1, MAX_NUMBER)
}

/// Free text is percent-encoded so it cannot inject `:` or glob characters
/// into the key.
fn search_cache_key(text: &str, offset: u32, number: u32) -> String {
    format!(
        "{}search:{}:{}:{}",
        PROXY_CACHE_PREFIX,
        urlencoding::encode(&text.to_lowercase()),
        offset,
        number
    )
}

/// How an upstream answer reflects on the key that made it.
///
/// 401/402 mean the key is invalid or out of quota. On listing endpoints the
/// upstream also answers 404 for an expired key; on a lookup by id a 404 is
/// a missing recipe.
fn classify(status: StatusCode, not_found_is_key: bool) -> Result<(), KeyAttemptError> {
    if status.is_success() {
        return Ok(());
    }
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::PAYMENT_REQUIRED => {
            Err(KeyAttemptError::KeyRejected(status.to_string()))
        }
        StatusCode::NOT_FOUND if not_found_is_key => Err(KeyAttemptError::KeyRejected(status.to_string())),
        StatusCode::NOT_FOUND => Err(KeyAttemptError::Failed(AppError::NotFound(
            "Recipe not found".to_string(),
        ))),
        _ => Err(KeyAttemptError::Failed(AppError::Upstream(format!(
            "Recipe API error: {}",
            status
        )))),
    }
}

/// Client for the upstream recipe API with key rotation.
pub struct RecipeApiClient {
    http: reqwest::Client,
    base_url: String,
    rotator: ApiKeyRotator,
}

impl RecipeApiClient {
    pub fn new(base_url: &str, rotator: ApiKeyRotator) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            rotator,
        }
    }

    pub fn keys_left(&self) -> usize {
        self.rotator.len()
    }

    async fn fetch(&self, path: String, params: Vec<(&'static str, String)>, not_found_is_key: bool) -> Result<Value, AppError> {
        let url = format!("{}{}", self.base_url, path);

        self.rotator
            .call_with_rotation(|key| {
                let mut query = params.clone();
                query.push(("apiKey", key));
                let request = self
                    .http
                    .get(&url)
                    .query(&query)
                    .header("Accept", "application/json")
                    .timeout(std::time::Duration::from_secs(10));

                async move {
                    let response = request
                        .send()
                        .await
                        .map_err(|e| KeyAttemptError::Failed(e.into()))?;
                    classify(response.status(), not_found_is_key)?;
                    let body: Value = response
                        .json()
                        .await
                        .map_err(|e| KeyAttemptError::Failed(e.into()))?;
                    Ok(body)
                }
            })
            .await
    }

    async fn cached<F, Fut>(&self, cache: &dyn Cache, key: &str, load: F) -> Result<Value, AppError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<Value, AppError>>,
    {
        match cache.get(key).await {
            Ok(Some(raw)) => {
                if let Ok(value) = serde_json::from_str(&raw) {
                    log::debug!("📦 Proxy cache hit: {}", key);
                    return Ok(value);
                }
            }
            Ok(None) => {}
            Err(e) => log::warn!("⚠️ Proxy cache read failed for {}: {}", key, e),
        }

        let value = load().await?;
        if let Err(e) = cache.set_ex(key, &value.to_string(), PROXY_CACHE_TTL_SECS).await {
            log::warn!("⚠️ Proxy cache write failed for {}: {}", key, e);
        }
        Ok(value)
    }

    pub async fn search(&self, cache: &dyn Cache, query: &SearchQuery) -> Result<Value, AppError> {
        let text = query.query.trim();
        if text.is_empty() {
            return Err(AppError::bad_request("Query must not be empty"));
        }
        let offset = query.offset.unwrap_or(0);
        let number = clamp_number(query.number);

        let key = search_cache_key(text, offset, number);

        self.cached(cache, &key, || {
            self.fetch(
                "/recipes/complexSearch".to_string(),
                vec![
                    ("query", text.to_string()),
                    ("offset", offset.to_string()),
                    ("number", number.to_string()),
                ],
                true,
            )
        })
        .await
    }

    /// Not cached: every call should be random.
    pub async fn random(&self, number: Option<u32>) -> Result<Value, AppError> {
        self.fetch(
            "/recipes/random".to_string(),
            vec![("number", clamp_number(number).to_string())],
            true,
        )
        .await
    }

    pub async fn get(
        &self,
        db: &MongoDB,
        cache: &dyn Cache,
        id: u64,
        currency: Option<&str>,
    ) -> Result<Value, AppError> {
        let key = format!("{}recipe:{}", PROXY_CACHE_PREFIX, id);
        let mut recipe = self
            .cached(cache, &key, || {
                self.fetch(
                    format!("/recipes/{}/information", id),
                    vec![("includeNutrition", "false".to_string())],
                    false,
                )
            })
            .await?;

        if let Some(code) = currency.filter(|c| !c.trim().is_empty()) {
            if let Some(cents) = recipe.get("pricePerServing").and_then(Value::as_f64) {
                let price = price_per_serving(db, cents, code).await?;
                if let Value::Object(map) = &mut recipe {
                    map.insert("price_per_serving".to_string(), serde_json::to_value(price)?);
                }
            }
        }

        Ok(recipe)
    }
}

/// Upstream prices are US cents per serving.
async fn price_per_serving(db: &MongoDB, cents: f64, currency: &str) -> Result<Money, AppError> {
    let conversion = currency_service::convert(db, cents / 100.0, "USD", currency).await?;
    Ok(Money {
        amount: conversion.converted,
        currency: conversion.to,
    })
}
