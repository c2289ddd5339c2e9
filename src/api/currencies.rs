use actix_web::{web, HttpResponse};
use serde::Deserialize;

use crate::{
    database::MongoDB,
    models::CurrencyDto,
    services::currency_service::{self, ConversionDto},
    utils::AppError,
};

#[derive(Debug, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ConvertQuery {
    pub from: String,
    pub to: String,
    pub amount: f64,
}

#[utoipa::path(
    get,
    path = "/api/currencies",
    tag = "Currencies",
    responses(
        (status = 200, description = "All known currencies with their rate against the base", body = [CurrencyDto])
    )
)]
pub async fn list_currencies(db: web::Data<MongoDB>) -> Result<HttpResponse, AppError> {
    let currencies: Vec<CurrencyDto> = currency_service::list(&db)
        .await?
        .into_iter()
        .map(CurrencyDto::from)
        .collect();
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "count": currencies.len(),
        "currencies": currencies
    })))
}

#[utoipa::path(
    get,
    path = "/api/currencies/{code}",
    tag = "Currencies",
    params(("code" = String, Path, description = "ISO 4217 code, case-insensitive")),
    responses(
        (status = 200, description = "Currency", body = CurrencyDto),
        (status = 404, description = "Unknown currency")
    )
)]
pub async fn get_currency(db: web::Data<MongoDB>, code: web::Path<String>) -> Result<HttpResponse, AppError> {
    let currency = currency_service::find(&db, &code).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "currency": CurrencyDto::from(currency)
    })))
}

#[utoipa::path(
    get,
    path = "/api/currencies/convert",
    tag = "Currencies",
    params(ConvertQuery),
    responses(
        (status = 200, description = "Converted amount", body = ConversionDto),
        (status = 400, description = "Invalid amount or code"),
        (status = 404, description = "Unknown currency")
    )
)]
pub async fn convert(db: web::Data<MongoDB>, query: web::Query<ConvertQuery>) -> Result<HttpResponse, AppError> {
    log::debug!("💱 Converting {} {} -> {}", query.amount, query.from, query.to);

    let conversion = currency_service::convert(&db, query.amount, &query.from, &query.to).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "conversion": conversion
    })))
}
