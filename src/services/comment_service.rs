use futures::stream::StreamExt;
use mongodb::bson::{doc, oid::ObjectId, DateTime as BsonDateTime, Document};
use std::collections::HashMap;

use crate::{
    database::MongoDB,
    models::{
        toggle_reaction, Comment, CommentDto, CreateCommentRequest, ReactionKind, Recipe, COMMENTS,
        RECIPES,
    },
    services::recipe_service::find_recipe,
    utils::{
        pagination::{Page, PageQuery},
        validation::{parse_object_id, Violations},
        AppError,
    },
};

pub const TEXT_MAX: usize = 1000;

fn validate_text(text: &str) -> Result<(), AppError> {
    let mut v = Violations::new();
    v.text("Comment", text, 1, TEXT_MAX);
    v.into_result()
}

async fn find_comment(db: &MongoDB, id: &ObjectId) -> Result<Comment, AppError> {
    db.collection::<Comment>(COMMENTS)
        .find_one(doc! { "_id": id })
        .await?
        .ok_or_else(|| AppError::NotFound("Comment not found".to_string()))
}

async fn collect(db: &MongoDB, filter: Document, options: mongodb::options::FindOptions) -> Result<Vec<Comment>, AppError> {
    let mut cursor = db
        .collection::<Comment>(COMMENTS)
        .find(filter)
        .with_options(options)
        .await?;

    let mut comments = Vec::new();
    while let Some(result) = cursor.next().await {
        match result {
            Ok(comment) => comments.push(comment),
            Err(e) => log::error!("Error reading comment: {}", e),
        }
    }
    Ok(comments)
}

/// Nests replies under their top-level comment, keeping both orders.
fn attach_replies(top_level: Vec<Comment>, replies: Vec<Comment>) -> Vec<CommentDto> {
    let mut by_parent: HashMap<ObjectId, Vec<CommentDto>> = HashMap::new();
    for reply in replies {
        if let Some(parent) = reply.parent_id {
            by_parent.entry(parent).or_default().push(reply.into());
        }
    }

    top_level
        .into_iter()
        .map(|comment| {
            let replies = comment
                .id
                .and_then(|id| by_parent.remove(&id))
                .unwrap_or_default();
            let mut dto = CommentDto::from(comment);
            dto.replies = replies;
            dto
        })
        .collect()
}

pub async fn add(
    db: &MongoDB,
    author: &ObjectId,
    recipe_id: &ObjectId,
    request: CreateCommentRequest,
) -> Result<CommentDto, AppError> {
    validate_text(&request.text)?;

    let recipe = find_recipe(db, recipe_id).await?;
    if !recipe.visible_to(Some(author)) {
        return Err(AppError::NotFound("Recipe not found".to_string()));
    }

    let parent_id = match request.parent_id.as_deref().filter(|p| !p.trim().is_empty()) {
        Some(raw) => {
            let parent = find_comment(db, &parse_object_id(raw, "comment")?).await?;
            if &parent.recipe_id != recipe_id {
                return Err(AppError::bad_request(
                    "Parent comment belongs to another recipe",
                ));
            }
            // replies stay one level deep
            parent.parent_id.or(parent.id)
        }
        None => None,
    };

    let now = BsonDateTime::now();
    let comment = Comment {
        id: Some(ObjectId::new()),
        recipe_id: *recipe_id,
        author_id: *author,
        parent_id,
        text: request.text.trim().to_string(),
        reactions: vec![],
        created_at: now,
        updated_at: now,
    };

    db.collection::<Comment>(COMMENTS).insert_one(&comment).await?;
    log::info!("💬 Comment added to recipe {} by {}", recipe_id, author);

    Ok(comment.into())
}

/// Top-level comments of a recipe, newest first, each with its replies.
pub async fn list(
    db: &MongoDB,
    recipe_id: &ObjectId,
    viewer: Option<&ObjectId>,
    page: &PageQuery,
) -> Result<Page<CommentDto>, AppError> {
    let recipe = find_recipe(db, recipe_id).await?;
    if !recipe.visible_to(viewer) {
        return Err(AppError::NotFound("Recipe not found".to_string()));
    }

    let filter = doc! { "recipe_id": recipe_id, "parent_id": null };
    let total = db
        .collection::<Comment>(COMMENTS)
        .count_documents(filter.clone())
        .await?;

    let options = mongodb::options::FindOptions::builder()
        .sort(doc! { "created_at": -1 })
        .skip(page.skip())
        .limit(page.limit() as i64)
        .build();
    let top_level = collect(db, filter, options).await?;

    let ids: Vec<ObjectId> = top_level.iter().filter_map(|c| c.id).collect();
    let replies = if ids.is_empty() {
        vec![]
    } else {
        let options = mongodb::options::FindOptions::builder()
            .sort(doc! { "created_at": 1 })
            .build();
        collect(db, doc! { "parent_id": { "$in": ids } }, options).await?
    };

    Ok(Page::new(attach_replies(top_level, replies), page, total))
}

pub async fn update(db: &MongoDB, user_id: &ObjectId, id: &ObjectId, text: &str) -> Result<CommentDto, AppError> {
    validate_text(text)?;

    let mut comment = find_comment(db, id).await?;
    if &comment.author_id != user_id {
        return Err(AppError::Forbidden("Only the author can edit this comment".to_string()));
    }

    comment.text = text.trim().to_string();
    comment.updated_at = BsonDateTime::now();

    db.collection::<Comment>(COMMENTS)
        .update_one(
            doc! { "_id": id },
            doc! { "$set": { "text": &comment.text, "updated_at": comment.updated_at } },
        )
        .await?;

    Ok(comment.into())
}

/// Author or recipe owner may delete. Replies go with their parent.
pub async fn delete(db: &MongoDB, user_id: &ObjectId, id: &ObjectId) -> Result<u64, AppError> {
    let comment = find_comment(db, id).await?;

    let recipe_owner = db
        .collection::<Recipe>(RECIPES)
        .find_one(doc! { "_id": comment.recipe_id })
        .await?
        .map(|r| r.owner_id);

    let allowed = &comment.author_id == user_id || recipe_owner.as_ref() == Some(user_id);
    if !allowed {
        return Err(AppError::Forbidden(
            "Only the author or the recipe owner can delete this comment".to_string(),
        ));
    }

    let result = db
        .collection::<Comment>(COMMENTS)
        .delete_many(doc! { "$or": [ { "_id": id }, { "parent_id": id } ] })
        .await?;

    log::info!("🗑️ Deleted comment {} ({} documents)", id, result.deleted_count);
    Ok(result.deleted_count)
}

/// Toggles the user's reaction. Returns the comment and the user's reaction
/// after the toggle.
pub async fn react(
    db: &MongoDB,
    user_id: &ObjectId,
    id: &ObjectId,
    kind: ReactionKind,
) -> Result<(CommentDto, Option<ReactionKind>), AppError> {
    let mut comment = find_comment(db, id).await?;
    let recipe = find_recipe(db, &comment.recipe_id).await?;
    if !recipe.visible_to(Some(user_id)) {
        return Err(AppError::NotFound("Comment not found".to_string()));
    }

    let current = toggle_reaction(&mut comment.reactions, *user_id, kind);

    let reactions = mongodb::bson::to_bson(&comment.reactions)?;
    db.collection::<Comment>(COMMENTS)
        .update_one(doc! { "_id": id }, doc! { "$set": { "reactions": reactions } })
        .await?;

    Ok((comment.into(), current))
}

/// Removes a user's comments and the replies under them (account deletion).
pub async fn delete_for_author(db: &MongoDB, author: &ObjectId) -> Result<u64, AppError> {
    let own = collect(
        db,
        doc! { "author_id": author },
        mongodb::options::FindOptions::default(),
    )
    .await?;
    let ids: Vec<ObjectId> = own.iter().filter_map(|c| c.id).collect();

    let result = db
        .collection::<Comment>(COMMENTS)
        .delete_many(doc! { "$or": [ { "author_id": author }, { "parent_id": { "$in": ids } } ] })
        .await?;
    Ok(result.deleted_count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::test_support::{drop_db, fresh_db};
    use crate::services::recipe_service::tests::seed_recipe;

    fn comment(recipe: ObjectId, parent: Option<ObjectId>, text: &str) -> Comment {
        Comment {
            id: Some(ObjectId::new()),
            recipe_id: recipe,
            author_id: ObjectId::new(),
            parent_id: parent,
            text: text.into(),
            reactions: vec![],
            created_at: BsonDateTime::now(),
            updated_at: BsonDateTime::now(),
        }
    }

    #[test]
    fn test_attach_replies() {
        let recipe = ObjectId::new();
        let first = comment(recipe, None, "first");
        let second = comment(recipe, None, "second");
        let r1 = comment(recipe, first.id, "reply 1");
        let r2 = comment(recipe, first.id, "reply 2");
        let orphan = comment(recipe, Some(ObjectId::new()), "orphan");

        let nested = attach_replies(vec![second, first], vec![r1, r2, orphan]);

        assert_eq!(nested.len(), 2);
        assert_eq!(nested[0].text, "second");
        assert!(nested[0].replies.is_empty());
        assert_eq!(
            nested[1].replies.iter().map(|r| r.text.as_str()).collect::<Vec<_>>(),
            vec!["reply 1", "reply 2"]
        );
    }

    #[test]
    fn test_text_limits() {
        assert!(validate_text("  ").is_err());
        assert!(validate_text(&"a".repeat(TEXT_MAX + 1)).is_err());
        assert!(validate_text("Nice one").is_ok());
    }

    fn text(text: &str, parent: Option<&CommentDto>) -> CreateCommentRequest {
        CreateCommentRequest {
            text: text.into(),
            parent_id: parent.map(|p| p.id.clone()),
        }
    }

    #[tokio::test]
    #[ignore = "needs MongoDB"]
    async fn test_replies_are_flattened_to_one_level() {
        let db = fresh_db().await;
        let owner = ObjectId::new();
        let reader = ObjectId::new();
        let recipe = seed_recipe(&db, &owner, true).await;

        let top = add(&db, &reader, &recipe, text("Lovely", None)).await.unwrap();
        let reply = add(&db, &owner, &recipe, text("Thanks", Some(&top))).await.unwrap();
        let nested = add(&db, &reader, &recipe, text("Welcome", Some(&reply))).await.unwrap();

        assert_eq!(reply.parent_id.as_deref(), Some(top.id.as_str()));
        assert_eq!(nested.parent_id.as_deref(), Some(top.id.as_str()));

        let page = list(&db, &recipe, None, &PageQuery::new(1, 10)).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].replies.len(), 2);

        drop_db(db).await;
    }

    #[tokio::test]
    #[ignore = "needs MongoDB"]
    async fn test_parent_must_belong_to_the_same_recipe() {
        let db = fresh_db().await;
        let owner = ObjectId::new();
        let first = seed_recipe(&db, &owner, true).await;
        let second = seed_recipe(&db, &owner, true).await;

        let top = add(&db, &owner, &first, text("On the first", None)).await.unwrap();
        let result = add(&db, &owner, &second, text("Misplaced", Some(&top))).await;
        assert!(matches!(result, Err(AppError::BadRequest(_))));

        drop_db(db).await;
    }

    #[tokio::test]
    #[ignore = "needs MongoDB"]
    async fn test_reactions_respect_recipe_visibility() {
        let db = fresh_db().await;
        let owner = ObjectId::new();
        let stranger = ObjectId::new();
        let recipe = seed_recipe(&db, &owner, false).await;

        let comment = add(&db, &owner, &recipe, text("Note to self", None)).await.unwrap();
        let id = ObjectId::parse_str(&comment.id).unwrap();

        let denied = react(&db, &stranger, &id, ReactionKind::Like).await;
        assert!(matches!(denied, Err(AppError::NotFound(_))));

        let (dto, current) = react(&db, &owner, &id, ReactionKind::Like).await.unwrap();
        assert_eq!(current, Some(ReactionKind::Like));
        assert_eq!(dto.likes, 1);

        drop_db(db).await;
    }
}
