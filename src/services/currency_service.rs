use futures::stream::StreamExt;
use mongodb::bson::{doc, DateTime as BsonDateTime};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::{
    database::MongoDB,
    models::{Currency, CURRENCIES},
    utils::{validation::is_valid_currency_code, AppError},
};

#[derive(Debug, Serialize, Deserialize)]
pub struct ExchangeRatesResponse {
    pub base: String,
    #[serde(default)]
    pub date: Option<String>,
    pub rates: HashMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, utoipa::ToSchema)]
pub struct ConversionDto {
    pub from: String,
    pub to: String,
    pub amount: f64,
    pub converted: f64,
    pub rate: f64,
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// `amount / rate(from) * rate(to)` with both rates against the same base.
pub fn convert_amount(amount: f64, from_rate: f64, to_rate: f64) -> f64 {
    round2(amount / from_rate * to_rate)
}

fn normalize_code(code: &str) -> Result<String, AppError> {
    let code = code.trim();
    if !is_valid_currency_code(code) {
        return Err(AppError::bad_request(format!("Invalid currency code: {}", code)));
    }
    Ok(code.to_uppercase())
}

pub async fn find(db: &MongoDB, code: &str) -> Result<Currency, AppError> {
    let code = normalize_code(code)?;
    db.collection::<Currency>(CURRENCIES)
        .find_one(doc! { "code": &code })
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Currency {} not found", code)))
}

pub async fn list(db: &MongoDB) -> Result<Vec<Currency>, AppError> {
    let options = mongodb::options::FindOptions::builder()
        .sort(doc! { "code": 1 })
        .build();

    let mut cursor = db
        .collection::<Currency>(CURRENCIES)
        .find(doc! {})
        .with_options(options)
        .await?;

    let mut currencies = Vec::new();
    while let Some(result) = cursor.next().await {
        match result {
            Ok(currency) => currencies.push(currency),
            Err(e) => log::error!("Error reading currency: {}", e),
        }
    }

    Ok(currencies)
}

/// A checked conversion request. Same-code requests are answered without a
/// rate lookup.
#[derive(Debug, PartialEq)]
enum ConversionPlan {
    Identity(ConversionDto),
    Lookup { amount: f64, from: String, to: String },
}

fn plan_conversion(amount: f64, from: &str, to: &str) -> Result<ConversionPlan, AppError> {
    if !amount.is_finite() || amount < 0.0 {
        return Err(AppError::bad_request("Amount must be a non-negative number"));
    }

    let from = normalize_code(from)?;
    let to = normalize_code(to)?;

    if from == to {
        return Ok(ConversionPlan::Identity(ConversionDto {
            from,
            to,
            amount,
            converted: round2(amount),
            rate: 1.0,
        }));
    }

    Ok(ConversionPlan::Lookup { amount, from, to })
}

pub async fn convert(db: &MongoDB, amount: f64, from: &str, to: &str) -> Result<ConversionDto, AppError> {
    let (amount, from, to) = match plan_conversion(amount, from, to)? {
        ConversionPlan::Identity(dto) => return Ok(dto),
        ConversionPlan::Lookup { amount, from, to } => (amount, from, to),
    };

    let from_rate = find(db, &from).await?.rate;
    let to_rate = find(db, &to).await?.rate;
    if from_rate <= 0.0 {
        return Err(AppError::Internal(format!("Stored rate for {} is not positive", from)));
    }

    Ok(ConversionDto {
        converted: convert_amount(amount, from_rate, to_rate),
        rate: to_rate / from_rate,
        from,
        to,
        amount,
    })
}

pub async fn fetch_rates(api_url: &str, base: &str) -> Result<ExchangeRatesResponse, AppError> {
    let url = format!("{}/{}", api_url.trim_end_matches('/'), base.to_uppercase());

    log::info!("💱 Fetching exchange rates for base: {}", base);

    let client = reqwest::Client::new();
    let response = client
        .get(&url)
        .header("Accept", "application/json")
        .timeout(std::time::Duration::from_secs(10))
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(AppError::Upstream(format!(
            "Exchange rate API error: {}",
            response.status()
        )));
    }

    let rates: ExchangeRatesResponse = response.json().await?;
    Ok(rates)
}

/// Pulls the latest rates and upserts one document per currency.
/// Returns the number of currencies written.
pub async fn refresh_rates(db: &MongoDB, api_url: &str, base: &str) -> Result<usize, AppError> {
    let latest = fetch_rates(api_url, base).await?;
    let collection = db.collection::<Currency>(CURRENCIES);
    let now = BsonDateTime::now();

    let mut rates = latest.rates;
    rates.entry(base.to_uppercase()).or_insert(1.0);

    let mut written = 0;
    for (code, rate) in rates {
        if !is_valid_currency_code(&code) || !rate.is_finite() || rate <= 0.0 {
            log::debug!("Skipping rate {}={}", code, rate);
            continue;
        }

        let options = mongodb::options::UpdateOptions::builder()
            .upsert(true)
            .build();

        collection
            .update_one(
                doc! { "code": code.to_uppercase() },
                doc! { "$set": { "code": code.to_uppercase(), "rate": rate, "updated_at": now } },
            )
            .with_options(options)
            .await?;
        written += 1;
    }

    log::info!("✅ Stored {} exchange rates (base {})", written, base);
    Ok(written)
}
