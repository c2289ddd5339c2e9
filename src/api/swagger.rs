use utoipa::OpenApi;
use utoipa::openapi::security::{SecurityScheme, HttpAuthScheme, HttpBuilder};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Recipe Service API",
        version = "1.0.0",
        description = "Recipe sharing backend.\n\n**Authentication:** protected endpoints take a JWT access token as `Authorization: Bearer <token>`. The refresh token travels in the `refreshToken` cookie (or the request body).\n\n**Features:**\n- Registration with email activation\n- Access/refresh token rotation with revocation\n- Recipes, favorites and threaded comments\n- Upstream recipe search with API key rotation\n- Currency conversion\n- Health monitoring and metrics",
        contact(
            name = "Recipe Service Team",
            email = "support@recipe-service.local"
        )
    ),
    paths(
        // Users
        crate::api::users::register,
        crate::api::users::login,
        crate::api::users::refresh,
        crate::api::users::get_me,

        // Recipes
        crate::api::recipes::list_recipes,
        crate::api::recipes::create_recipe,
        crate::api::recipes::get_recipe,

        // Comments
        crate::api::comments::add_comment,

        // Currencies
        crate::api::currencies::list_currencies,
        crate::api::currencies::get_currency,
        crate::api::currencies::convert,

        // Health & Metrics
        crate::api::health::health_check,
        crate::api::metrics::get_metrics,
    ),
    components(
        schemas(
            // Users
            crate::services::auth_service::RegisterRequest,
            crate::services::auth_service::LoginRequest,
            crate::services::auth_service::RefreshTokenRequest,
            crate::services::auth_service::UpdateMeRequest,
            crate::services::auth_service::ChangePasswordRequest,
            crate::services::auth_service::AuthResponse,
            crate::services::token_service::TokenPair,
            crate::models::UserDto,
            crate::models::PublicUserDto,

            // Recipes
            crate::models::CreateRecipeRequest,
            crate::models::UpdateRecipeRequest,
            crate::models::RecipeDto,
            crate::models::RecipeListItem,
            crate::models::Ingredient,
            crate::models::Instruction,

            // Comments
            crate::models::CreateCommentRequest,
            crate::models::UpdateCommentRequest,
            crate::models::ReactionRequest,
            crate::models::ReactionKind,
            crate::models::CommentDto,

            // Currencies
            crate::models::CurrencyDto,
            crate::models::Money,
            crate::services::currency_service::ConversionDto,

            // Health & Metrics
            crate::api::health::HealthResponse,
            crate::api::metrics::MetricsResponse,
        )
    ),
    tags(
        (name = "Users", description = "Registration, activation, login, token refresh and profile management."),
        (name = "Recipes", description = "User recipes and favorites. Private recipes are only visible to their owner."),
        (name = "Comments", description = "Comments on recipes with one level of replies and like/dislike reactions."),
        (name = "Currencies", description = "Exchange rates and currency conversion."),
        (name = "Health", description = "Health check and system metrics endpoints for monitoring service status."),
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .description(Some("Access token from /api/users/login"))
                        .build()
                ),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_document() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/api/users/login"));
        assert!(doc.paths.paths.contains_key("/api/currencies/convert"));

        let components = doc.components.expect("components");
        assert!(components.security_schemes.contains_key("bearer_auth"));
        assert!(components.schemas.contains_key("RecipeDto"));
    }
}
