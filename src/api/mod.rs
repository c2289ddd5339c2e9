pub mod comments;
pub mod currencies;
pub mod health;
pub mod metrics;
pub mod recipe_api;
pub mod recipes;
pub mod swagger;
pub mod users;

use actix_web::web;

use crate::middleware::AuthMiddleware;

/// Mounts every `/api` route. Literal segments are registered before the
/// `{id}` patterns they would otherwise be captured by.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/users")
            .route("/registration", web::post().to(users::register))
            .route("/activate/{link}", web::get().to(users::activate))
            .route("/login", web::post().to(users::login))
            .route("/logout", web::post().to(users::logout))
            .route("/refresh", web::post().to(users::refresh))
            .service(
                web::resource("/me")
                    .wrap(AuthMiddleware)
                    .route(web::get().to(users::get_me))
                    .route(web::patch().to(users::update_me))
                    .route(web::delete().to(users::delete_me)),
            )
            .service(
                web::resource("/me/password")
                    .wrap(AuthMiddleware)
                    .route(web::put().to(users::change_password)),
            )
            .route("/{id}", web::get().to(users::get_user))
            .route("/{id}/recipes", web::get().to(users::get_user_recipes)),
    )
    .service(
        web::scope("/api/recipes")
            .service(
                web::resource("/favorites")
                    .wrap(AuthMiddleware)
                    .route(web::get().to(recipes::list_favorites)),
            )
            .service(
                web::resource("/{id}/favorite")
                    .wrap(AuthMiddleware)
                    .route(web::get().to(recipes::favorite_status))
                    .route(web::post().to(recipes::add_favorite))
                    .route(web::delete().to(recipes::remove_favorite)),
            )
            .route("", web::get().to(recipes::list_recipes))
            .route("", web::post().to(recipes::create_recipe))
            .route("/{id}", web::get().to(recipes::get_recipe))
            .route("/{id}", web::put().to(recipes::update_recipe))
            .route("/{id}", web::delete().to(recipes::delete_recipe)),
    )
    .service(
        web::scope("/api/comments")
            .route("/recipe/{recipe_id}", web::get().to(comments::list_comments))
            .route("/recipe/{recipe_id}", web::post().to(comments::add_comment))
            .route("/{id}", web::put().to(comments::update_comment))
            .route("/{id}", web::delete().to(comments::delete_comment))
            .route("/{id}/reactions", web::post().to(comments::react)),
    )
    .service(
        web::scope("/api/currencies")
            .route("", web::get().to(currencies::list_currencies))
            .route("/convert", web::get().to(currencies::convert))
            .route("/{code}", web::get().to(currencies::get_currency)),
    )
    .service(
        web::scope("/api/spoonacular/recipes")
            .route("/search", web::get().to(recipe_api::search))
            .route("/random", web::get().to(recipe_api::random))
            .route("/{id}", web::get().to(recipe_api::get_recipe)),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::token_service::tests::{jwt_config, service_with};
    use actix_web::{http::StatusCode, test, App};

    // The guarded resources answer before any store is touched.
    #[actix_web::test]
    async fn test_protected_routes_require_token() {
        let (service, _, _) = service_with(&jwt_config());
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(service))
                .configure(configure),
        )
        .await;

        for (method, uri) in [
            ("GET", "/api/users/me"),
            ("PUT", "/api/users/me/password"),
            ("GET", "/api/recipes/favorites"),
            ("DELETE", "/api/users/me"),
            ("POST", "/api/recipes/0123456789abcdef01234567/favorite"),
            ("GET", "/api/recipes/0123456789abcdef01234567/favorite"),
        ] {
            let req = test::TestRequest::default()
                .method(method.parse().unwrap())
                .uri(uri)
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::UNAUTHORIZED, "{} {}", method, uri);
        }
    }
}
