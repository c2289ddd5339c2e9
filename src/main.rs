mod api;
mod config;
mod database;
mod jobs;
mod middleware;
mod models;
mod services;
mod utils;

use actix_cors::Cors;
use actix_web::{dev::Service, middleware::Logger, web, App, HttpServer};
use dotenv::dotenv;
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    config::AppConfig,
    services::{
        mail_service::{HttpMailer, LogMailer, Mailer},
        recipe_api_service::RecipeApiClient,
        token_service::{MongoTokenStore, TokenService},
    },
    utils::{
        cache::{Cache, MemoryCache, RedisCache},
        key_rotator::ApiKeyRotator,
        AppError,
    },
};

fn startup_error(e: AppError) -> std::io::Error {
    log::error!("❌ Startup failed: {}", e);
    std::io::Error::other(e.to_string())
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load environment variables
    dotenv().ok();

    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = AppConfig::from_env().map_err(startup_error)?;

    log::info!("🚀 Starting Recipe Service...");

    // Initialize MongoDB connection
    let db = database::MongoDB::new(&config.database_url)
        .await
        .map_err(startup_error)?;
    log::info!("✅ MongoDB connected successfully");

    let cache: Arc<dyn Cache> = match &config.redis_url {
        Some(url) => Arc::new(RedisCache::connect(url).await.map_err(startup_error)?),
        None => {
            log::warn!("⚠️ REDIS_URL not set, using in-process cache (single instance only)");
            Arc::new(MemoryCache::new())
        }
    };

    let tokens = TokenService::new(
        &config.jwt,
        Arc::new(MongoTokenStore::new(db.clone())),
        cache.clone(),
    );

    let mailer: Arc<dyn Mailer> = match &config.mail {
        Some(mail) => Arc::new(HttpMailer::new(mail.clone())),
        None => {
            log::warn!("⚠️ MAIL_API_URL not set, activation mails go to the log");
            Arc::new(LogMailer)
        }
    };

    let recipe_api = RecipeApiClient::new(
        &config.recipe_api_url,
        ApiKeyRotator::new(config.recipe_api_keys.clone()),
    );
    if recipe_api.keys_left() == 0 {
        log::warn!("⚠️ RECIPE_API_KEYS is empty, recipe search will answer 502");
    }

    log::info!("📅 Starting background jobs...");
    jobs::currency_rates_job::start_currency_rates_scheduler(db.clone(), &config).await;
    log::info!("✅ Background jobs started");

    let host = config.host.clone();
    let port = config.port;

    log::info!("🌐 Server starting on {}:{}", host, port);
    log::info!("📚 Swagger UI available at: http://{}:{}/swagger-ui/", host, port);
    log::info!("📄 OpenAPI spec at: http://{}:{}/api-docs/openapi.json", host, port);

    let db_data = web::Data::new(db);
    let cache_data: web::Data<dyn Cache> = web::Data::from(cache);
    let mailer_data: web::Data<dyn Mailer> = web::Data::from(mailer);
    let tokens_data = web::Data::new(tokens);
    let recipe_api_data = web::Data::new(recipe_api);
    let config_data = web::Data::new(config);

    // Start HTTP server
    HttpServer::new(move || {
        let cors = Cors::default()
            .allowed_origin(&config_data.client_url)
            .allowed_methods(vec!["GET", "POST", "PUT", "PATCH", "DELETE", "OPTIONS"])
            .allowed_headers(vec![
                actix_web::http::header::AUTHORIZATION,
                actix_web::http::header::CONTENT_TYPE,
                actix_web::http::header::ACCEPT,
            ])
            .expose_headers(vec![actix_web::http::header::CONTENT_TYPE])
            .supports_credentials()
            .max_age(3600);

        // Generate OpenAPI specification
        let openapi = api::swagger::ApiDoc::openapi();

        App::new()
            .app_data(db_data.clone())
            .app_data(cache_data.clone())
            .app_data(mailer_data.clone())
            .app_data(tokens_data.clone())
            .app_data(recipe_api_data.clone())
            .app_data(config_data.clone())
            .app_data(web::JsonConfig::default().error_handler(|err, _| {
                AppError::bad_request(err.to_string()).into()
            }))
            .app_data(web::QueryConfig::default().error_handler(|err, _| {
                AppError::bad_request(err.to_string()).into()
            }))
            .app_data(web::PathConfig::default().error_handler(|err, _| {
                AppError::bad_request(err.to_string()).into()
            }))
            .wrap_fn(|req, srv| {
                let fut = srv.call(req);
                async move {
                    let res = fut.await;
                    match &res {
                        Ok(response) => api::metrics::record(response.status()),
                        Err(e) => api::metrics::record(e.as_response_error().status_code()),
                    }
                    res
                }
            })
            .wrap(cors)
            .wrap(middleware::SecurityHeaders)
            .wrap(Logger::default())
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-docs/openapi.json", openapi.clone())
            )
            // Health check
            .route("/health", web::get().to(api::health::health_check))
            // Metrics
            .route("/metrics", web::get().to(api::metrics::get_metrics))
            .configure(api::configure)
    })
    .bind(format!("{}:{}", host, port))?
    .run()
    .await
}
