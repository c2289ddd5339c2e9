use mongodb::bson::{oid::ObjectId, DateTime as BsonDateTime};
use serde::{Deserialize, Serialize};

use super::rfc3339;

pub const COMMENTS: &str = "comments";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ReactionKind {
    Like,
    Dislike,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Reaction {
    pub user_id: ObjectId,
    pub kind: ReactionKind,
}

/// Comment document (collection `comments`). `parent_id` points at another
/// comment of the same recipe when this is a reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub recipe_id: ObjectId,
    pub author_id: ObjectId,
    #[serde(default)]
    pub parent_id: Option<ObjectId>,
    pub text: String,
    #[serde(default)]
    pub reactions: Vec<Reaction>,
    pub created_at: BsonDateTime,
    pub updated_at: BsonDateTime,
}

impl Comment {
    pub fn count(&self, kind: ReactionKind) -> usize {
        self.reactions.iter().filter(|r| r.kind == kind).count()
    }
}

/// Applies a user's reaction: the same kind again removes it, another kind
/// replaces it. Returns the user's reaction afterwards.
pub fn toggle_reaction(
    reactions: &mut Vec<Reaction>,
    user_id: ObjectId,
    kind: ReactionKind,
) -> Option<ReactionKind> {
    match reactions.iter().position(|r| r.user_id == user_id) {
        Some(idx) if reactions[idx].kind == kind => {
            reactions.remove(idx);
            None
        }
        Some(idx) => {
            reactions[idx].kind = kind;
            Some(kind)
        }
        None => {
            reactions.push(Reaction { user_id, kind });
            Some(kind)
        }
    }
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct CreateCommentRequest {
    pub text: String,
    pub parent_id: Option<String>,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct UpdateCommentRequest {
    pub text: String,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct ReactionRequest {
    pub kind: ReactionKind,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct CommentDto {
    pub id: String,
    pub recipe_id: String,
    pub author_id: String,
    pub parent_id: Option<String>,
    pub text: String,
    pub likes: usize,
    pub dislikes: usize,
    #[schema(no_recursion)]
    pub replies: Vec<CommentDto>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Comment> for CommentDto {
    fn from(comment: Comment) -> Self {
        CommentDto {
            id: comment.id.map(|id| id.to_hex()).unwrap_or_default(),
            recipe_id: comment.recipe_id.to_hex(),
            author_id: comment.author_id.to_hex(),
            parent_id: comment.parent_id.map(|id| id.to_hex()),
            likes: comment.count(ReactionKind::Like),
            dislikes: comment.count(ReactionKind::Dislike),
            text: comment.text,
            replies: vec![],
            created_at: rfc3339(&comment.created_at),
            updated_at: rfc3339(&comment.updated_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toggle_reaction() {
        let mut reactions = Vec::new();
        let alice = ObjectId::new();
        let bob = ObjectId::new();

        assert_eq!(toggle_reaction(&mut reactions, alice, ReactionKind::Like), Some(ReactionKind::Like));
        assert_eq!(toggle_reaction(&mut reactions, bob, ReactionKind::Dislike), Some(ReactionKind::Dislike));
        assert_eq!(reactions.len(), 2);

        // switching kind replaces
        assert_eq!(toggle_reaction(&mut reactions, alice, ReactionKind::Dislike), Some(ReactionKind::Dislike));
        assert_eq!(reactions.len(), 2);

        // same kind again removes
        assert_eq!(toggle_reaction(&mut reactions, alice, ReactionKind::Dislike), None);
        assert_eq!(reactions.len(), 1);
        assert_eq!(reactions[0].user_id, bob);
    }

    #[test]
    fn test_dto_counts() {
        let comment = Comment {
            id: Some(ObjectId::new()),
            recipe_id: ObjectId::new(),
            author_id: ObjectId::new(),
            parent_id: None,
            text: "Lovely".into(),
            reactions: vec![
                Reaction { user_id: ObjectId::new(), kind: ReactionKind::Like },
                Reaction { user_id: ObjectId::new(), kind: ReactionKind::Like },
                Reaction { user_id: ObjectId::new(), kind: ReactionKind::Dislike },
            ],
            created_at: BsonDateTime::now(),
            updated_at: BsonDateTime::now(),
        };
        let dto = CommentDto::from(comment);
        assert_eq!(dto.likes, 2);
        assert_eq!(dto.dislikes, 1);
        assert!(dto.parent_id.is_none());
    }

    #[test]
    fn test_reaction_kind_wire_format() {
        let req: ReactionRequest = serde_json::from_str(r#"{"kind":"like"}"#).unwrap();
        assert_eq!(req.kind, ReactionKind::Like);
    }
}
