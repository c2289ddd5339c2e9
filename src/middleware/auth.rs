use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Payload, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::{HeaderMap, AUTHORIZATION},
    web, Error, FromRequest, HttpMessage, HttpRequest, ResponseError,
};
use futures::future::LocalBoxFuture;
use mongodb::bson::oid::ObjectId;
use std::future::{ready, Ready};
use std::rc::Rc;

use crate::services::token_service::{Claims, TokenService};
use crate::utils::AppError;

/// The authenticated caller, inserted into request extensions.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: ObjectId,
    pub email: String,
    pub roles: Vec<String>,
    pub jti: String,
    pub exp: i64,
}

impl AuthUser {
    fn from_claims(claims: Claims) -> Result<Self, AppError> {
        Ok(Self {
            user_id: claims.user_id()?,
            email: claims.email,
            roles: claims.roles,
            jti: claims.jti,
            exp: claims.exp,
        })
    }
}

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

async fn authenticate(tokens: Option<web::Data<TokenService>>, token: Option<String>) -> Result<AuthUser, AppError> {
    let tokens = tokens.ok_or_else(|| AppError::Internal("TokenService is not registered".to_string()))?;
    let token = token.ok_or_else(|| AppError::Unauthorized("Missing authorization token".to_string()))?;
    AuthUser::from_claims(tokens.validate_access(&token).await?)
}

// ==================== MIDDLEWARE ====================

/// Rejects requests without a valid, non-revoked access token.
pub struct AuthMiddleware;

impl<S, B> Transform<S, ServiceRequest> for AuthMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = AuthMiddlewareService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AuthMiddlewareService {
            service: Rc::new(service),
        }))
    }
}

pub struct AuthMiddlewareService<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for AuthMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let tokens = req.app_data::<web::Data<TokenService>>().cloned();
        let token = bearer_token(req.headers()).map(str::to_string);

        Box::pin(async move {
            match authenticate(tokens, token).await {
                Ok(user) => {
                    req.extensions_mut().insert(user);
                    let res = service.call(req).await?;
                    Ok(res.map_into_left_body())
                }
                Err(e) => {
                    log::debug!("🔒 {} {} rejected: {}", req.method(), req.path(), e);
                    let response = e.error_response();
                    Ok(req.into_response(response).map_into_right_body())
                }
            }
        })
    }
}

// ==================== EXTRACTORS ====================

impl FromRequest for AuthUser {
    type Error = AppError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        if let Some(user) = req.extensions().get::<AuthUser>().cloned() {
            return Box::pin(async move { Ok(user) });
        }

        let tokens = req.app_data::<web::Data<TokenService>>().cloned();
        let token = bearer_token(req.headers()).map(str::to_string);
        Box::pin(authenticate(tokens, token))
    }
}

/// Caller when a valid access token is present, anonymous otherwise.
#[derive(Debug, Clone)]
pub struct OptionalAuthUser(pub Option<AuthUser>);

impl OptionalAuthUser {
    pub fn user_id(&self) -> Option<&ObjectId> {
        self.0.as_ref().map(|u| &u.user_id)
    }
}

impl FromRequest for OptionalAuthUser {
    type Error = AppError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, payload: &mut Payload) -> Self::Future {
        let has_token = bearer_token(req.headers()).is_some();
        let user = AuthUser::from_request(req, payload);

        Box::pin(async move {
            if !has_token {
                return Ok(OptionalAuthUser(None));
            }
            Ok(OptionalAuthUser(user.await.ok()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::token_service::{tests::{jwt_config, service_with}, TokenSubject};
    use actix_web::{http::StatusCode, test, App, HttpResponse};

    async fn whoami(user: AuthUser) -> HttpResponse {
        HttpResponse::Ok().body(user.email)
    }

    async fn maybe(user: OptionalAuthUser) -> HttpResponse {
        HttpResponse::Ok().body(user.0.map(|u| u.email).unwrap_or_else(|| "anonymous".into()))
    }

    fn subject() -> TokenSubject {
        TokenSubject {
            user_id: ObjectId::new(),
            email: "cook@example.com".into(),
            roles: vec!["user".into()],
        }
    }

    #[actix_web::test]
    async fn test_bearer_token_parsing() {
        let req = test::TestRequest::default()
            .insert_header((AUTHORIZATION, "Bearer abc.def"))
            .to_http_request();
        assert_eq!(bearer_token(req.headers()), Some("abc.def"));

        let req = test::TestRequest::default()
            .insert_header((AUTHORIZATION, "Basic abc"))
            .to_http_request();
        assert_eq!(bearer_token(req.headers()), None);

        let req = test::TestRequest::default()
            .insert_header((AUTHORIZATION, "Bearer "))
            .to_http_request();
        assert_eq!(bearer_token(req.headers()), None);
    }

    #[actix_web::test]
    async fn test_middleware_accepts_and_rejects() {
        let (service, _, _) = service_with(&jwt_config());
        let pair = service.start_session(&subject()).await.unwrap();
        let tokens = web::Data::new(service);

        let app = test::init_service(
            App::new().app_data(tokens.clone()).service(
                web::resource("/me")
                    .wrap(AuthMiddleware)
                    .route(web::get().to(whoami)),
            ),
        )
        .await;

        // missing token
        let resp = test::call_service(&app, test::TestRequest::get().uri("/me").to_request()).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["errors"][0], "Missing authorization token");

        // valid token
        let req = test::TestRequest::get()
            .uri("/me")
            .insert_header((AUTHORIZATION, format!("Bearer {}", pair.access_token)))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(test::read_body(resp).await, "cook@example.com");

        // refresh token is not an access token
        let req = test::TestRequest::get()
            .uri("/me")
            .insert_header((AUTHORIZATION, format!("Bearer {}", pair.refresh_token)))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);

        // blacklisted after logout
        tokens.revoke(None, Some(&pair.access_token)).await.unwrap();
        let req = test::TestRequest::get()
            .uri("/me")
            .insert_header((AUTHORIZATION, format!("Bearer {}", pair.access_token)))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn test_extractors_without_middleware() {
        let (service, _, _) = service_with(&jwt_config());
        let pair = service.generate_tokens(&subject()).unwrap();
        let tokens = web::Data::new(service);

        let app = test::init_service(
            App::new()
                .app_data(tokens)
                .route("/strict", web::get().to(whoami))
                .route("/loose", web::get().to(maybe)),
        )
        .await;

        let resp = test::call_service(&app, test::TestRequest::get().uri("/strict").to_request()).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let resp = test::call_service(&app, test::TestRequest::get().uri("/loose").to_request()).await;
        assert_eq!(test::read_body(resp).await, "anonymous");

        let req = test::TestRequest::get()
            .uri("/loose")
            .insert_header((AUTHORIZATION, format!("Bearer {}", pair.access_token)))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(test::read_body(resp).await, "cook@example.com");

        let req = test::TestRequest::get()
            .uri("/loose")
            .insert_header((AUTHORIZATION, "Bearer not-a-jwt"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(test::read_body(resp).await, "anonymous");
    }
}
