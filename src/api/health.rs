use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};

use crate::{database::MongoDB, utils::cache::Cache};

#[derive(Serialize, Deserialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub timestamp: i64,
    pub mongodb: bool,
    pub cache: bool,
}

#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
        (status = 503, description = "A backing store is unreachable", body = HealthResponse)
    )
)]
pub async fn health_check(db: web::Data<MongoDB>, cache: web::Data<dyn Cache>) -> HttpResponse {
    let mongodb = db.ping().await;
    if !mongodb {
        log::warn!("⚠️ Health: MongoDB unreachable");
    }

    let cache = match cache.exists("health:ping").await {
        Ok(_) => true,
        Err(e) => {
            log::warn!("⚠️ Health: cache unreachable: {}", e);
            false
        }
    };

    let healthy = mongodb && cache;
    let body = HealthResponse {
        status: if healthy { "healthy" } else { "degraded" }.to_string(),
        service: "recipe-service".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now().timestamp(),
        mongodb,
        cache,
    };

    if healthy {
        HttpResponse::Ok().json(body)
    } else {
        HttpResponse::ServiceUnavailable().json(body)
    }
}
