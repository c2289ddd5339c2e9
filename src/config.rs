use std::env;
use std::str::FromStr;

use crate::utils::error::AppError;

/// Runtime configuration, read once from the environment at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub redis_url: Option<String>,
    pub jwt: JwtConfig,
    pub activation_ttl_minutes: i64,
    pub page_cache_ttl_seconds: u64,
    pub bcrypt_cost: u32,
    pub api_url: String,
    pub client_url: String,
    pub cookie_secure: bool,
    pub recipe_api_url: String,
    pub recipe_api_keys: Vec<String>,
    pub exchange_rate_api_url: String,
    pub base_currency: String,
    pub mail: Option<MailConfig>,
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub access_secret: String,
    pub refresh_secret: String,
    pub issuer: String,
    pub audience: String,
    pub access_ttl_minutes: i64,
    pub refresh_ttl_days: i64,
}

#[derive(Debug, Clone)]
pub struct MailConfig {
    pub api_url: String,
    pub api_key: String,
    pub from: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let database_url = required("DATABASE_URL")?;

        let jwt = JwtConfig {
            access_secret: required("JWT_ACCESS_SECRET")?,
            refresh_secret: required("JWT_REFRESH_SECRET")?,
            issuer: env_or("JWT_ISSUER", "recipe-service"),
            audience: env_or("JWT_AUDIENCE", "recipe-api"),
            access_ttl_minutes: parse_or("ACCESS_TOKEN_TTL_MINUTES", 15)?,
            refresh_ttl_days: parse_or("REFRESH_TOKEN_TTL_DAYS", 30)?,
        };

        let mail = match env::var("MAIL_API_URL").ok().filter(|v| !v.trim().is_empty()) {
            Some(api_url) => Some(MailConfig {
                api_url,
                api_key: required("MAIL_API_KEY")?,
                from: env_or("MAIL_FROM", "no-reply@recipe-service.local"),
            }),
            None => None,
        };

        Ok(Self {
            host: env_or("HOST", "0.0.0.0"),
            port: parse_or("PORT", 3002)?,
            database_url,
            redis_url: env::var("REDIS_URL").ok().filter(|v| !v.trim().is_empty()),
            jwt,
            activation_ttl_minutes: parse_or("ACTIVATION_TTL_MINUTES", 30)?,
            page_cache_ttl_seconds: parse_or("PAGE_CACHE_TTL_SECONDS", 60)?,
            bcrypt_cost: parse_or("BCRYPT_COST", bcrypt::DEFAULT_COST)?,
            api_url: env_or("API_URL", "http://localhost:3002"),
            client_url: env_or("CLIENT_URL", "http://localhost:3000"),
            cookie_secure: parse_or("COOKIE_SECURE", false)?,
            recipe_api_url: env_or("RECIPE_API_URL", "https://api.spoonacular.com"),
            recipe_api_keys: split_list(&env::var("RECIPE_API_KEYS").unwrap_or_default()),
            exchange_rate_api_url: env_or(
                "EXCHANGE_RATE_API_URL",
                "https://api.exchangerate-api.com/v4/latest",
            ),
            base_currency: env_or("BASE_CURRENCY", "USD").to_uppercase(),
            mail,
        })
    }
}

fn required(key: &str) -> Result<String, AppError> {
    env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| AppError::Internal(format!("{} must be set", key)))
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_or<T: FromStr>(key: &str, default: T) -> Result<T, AppError> {
    match env::var(key) {
        Ok(raw) => parse_value(key, &raw),
        Err(_) => Ok(default),
    }
}

fn parse_value<T: FromStr>(key: &str, raw: &str) -> Result<T, AppError> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| AppError::Internal(format!("{} has an invalid value: '{}'", key, raw)))
}

/// Comma separated list, blanks dropped.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
