use actix_web::{web, HttpResponse};

use crate::{
    database::MongoDB,
    middleware::{AuthUser, OptionalAuthUser},
    models::{CommentDto, CreateCommentRequest, ReactionRequest, UpdateCommentRequest},
    services::comment_service,
    utils::{pagination::PageQuery, validation::parse_object_id, AppError},
};

/// GET /api/comments/recipe/{recipe_id}
pub async fn list_comments(
    db: web::Data<MongoDB>,
    viewer: OptionalAuthUser,
    recipe_id: web::Path<String>,
    page: web::Query<PageQuery>,
) -> Result<HttpResponse, AppError> {
    let recipe_id = parse_object_id(&recipe_id, "recipe")?;
    let comments = comment_service::list(&db, &recipe_id, viewer.user_id(), &page).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true, "comments": comments })))
}

#[utoipa::path(
    post,
    path = "/api/comments/recipe/{recipe_id}",
    tag = "Comments",
    params(("recipe_id" = String, Path, description = "Recipe id")),
    request_body = CreateCommentRequest,
    responses(
        (status = 201, description = "Comment added", body = CommentDto),
        (status = 400, description = "Invalid text or parent"),
        (status = 404, description = "Recipe or parent comment not found")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn add_comment(
    db: web::Data<MongoDB>,
    user: AuthUser,
    recipe_id: web::Path<String>,
    request: web::Json<CreateCommentRequest>,
) -> Result<HttpResponse, AppError> {
    let recipe_id = parse_object_id(&recipe_id, "recipe")?;
    let comment = comment_service::add(&db, &user.user_id, &recipe_id, request.into_inner()).await?;
    Ok(HttpResponse::Created().json(serde_json::json!({ "success": true, "comment": comment })))
}

/// PUT /api/comments/{id}
pub async fn update_comment(
    db: web::Data<MongoDB>,
    user: AuthUser,
    id: web::Path<String>,
    request: web::Json<UpdateCommentRequest>,
) -> Result<HttpResponse, AppError> {
    let id = parse_object_id(&id, "comment")?;
    let comment = comment_service::update(&db, &user.user_id, &id, &request.text).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true, "comment": comment })))
}

/// DELETE /api/comments/{id}
pub async fn delete_comment(
    db: web::Data<MongoDB>,
    user: AuthUser,
    id: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    log::info!("🗑️ DELETE /comments/{} - {}", id, user.user_id);

    let id = parse_object_id(&id, "comment")?;
    let deleted = comment_service::delete(&db, &user.user_id, &id).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true, "deleted": deleted })))
}

/// POST /api/comments/{id}/reactions
pub async fn react(
    db: web::Data<MongoDB>,
    user: AuthUser,
    id: web::Path<String>,
    request: web::Json<ReactionRequest>,
) -> Result<HttpResponse, AppError> {
    let id = parse_object_id(&id, "comment")?;
    let (comment, reaction) = comment_service::react(&db, &user.user_id, &id, request.kind).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "comment": comment,
        "reaction": reaction
    })))
}
