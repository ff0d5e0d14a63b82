use serde::{Deserialize, Serialize};

use crate::collect::{CanonicalRecord, CollectResult};

use super::field::{Fallback, FieldKind, FieldSet, FieldSpec};
use super::{required_nested, Entity, Identified};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentAuthor {
    pub id: String,
    pub username: String,
}

impl Entity for CommentAuthor {
    const NAME: &'static str = "comment_author";
    const FIELDS: &'static [FieldSpec] = &[
        FieldSpec::required("id", &["pk", "id"], FieldKind::Str),
        FieldSpec::required("username", &["username"], FieldKind::Str),
    ];

    fn assemble(fields: FieldSet, _record: &CanonicalRecord) -> CollectResult<Self> {
        Ok(Self {
            id: fields.str("id"),
            username: fields.str("username"),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub user: CommentAuthor,
    pub post_id: String,
    pub created_at_utc: i64,
    pub status: Option<String>,
    pub share_enabled: Option<bool>,
    pub is_ranked_comment: Option<bool>,
    pub text: String,
    pub has_translation: bool,
    pub is_liked_by_post_owner: bool,
    pub comment_like_count: u64,
    pub child_comment_count: u64,
}

impl Entity for Comment {
    const NAME: &'static str = "comment";
    const FIELDS: &'static [FieldSpec] = &[
        FieldSpec::required("id", &["pk", "id"], FieldKind::Str),
        FieldSpec::required("post_id", &["media_id", "post_id"], FieldKind::Str),
        FieldSpec::required("created_at_utc", &["created_at_utc", "created_at"], FieldKind::Int),
        FieldSpec::optional("status", &["status"], FieldKind::Str),
        FieldSpec::optional("share_enabled", &["share_enabled"], FieldKind::Bool),
        FieldSpec::optional("is_ranked_comment", &["is_ranked_comment"], FieldKind::Bool),
        FieldSpec::required("text", &["text"], FieldKind::Str),
        FieldSpec::defaulted(
            "has_translation",
            &["has_translation"],
            FieldKind::Bool,
            Fallback::Bool(false),
        ),
        FieldSpec::defaulted(
            "is_liked_by_post_owner",
            &["has_liked_comment", "is_liked_by_post_owner"],
            FieldKind::Bool,
            Fallback::Bool(false),
        ),
        FieldSpec::defaulted(
            "comment_like_count",
            &["comment_like_count", "like_count"],
            FieldKind::Count,
            Fallback::Int(0),
        ),
        FieldSpec::defaulted(
            "child_comment_count",
            &["child_comment_count"],
            FieldKind::Count,
            Fallback::Int(0),
        ),
    ];

    fn assemble(fields: FieldSet, record: &CanonicalRecord) -> CollectResult<Self> {
        Ok(Self {
            id: fields.str("id"),
            user: required_nested(Self::NAME, record, &["user"])?,
            post_id: fields.str("post_id"),
            created_at_utc: fields.int("created_at_utc"),
            status: fields.opt_str("status"),
            share_enabled: fields.opt_bool("share_enabled"),
            is_ranked_comment: fields.opt_bool("is_ranked_comment"),
            text: fields.str("text"),
            has_translation: fields.bool("has_translation"),
            is_liked_by_post_owner: fields.bool("is_liked_by_post_owner"),
            comment_like_count: fields.count("comment_like_count"),
            child_comment_count: fields.count("child_comment_count"),
        })
    }
}

impl Identified for Comment {
    fn id(&self) -> &str {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::EntityMapper;
    use serde_json::json;

    #[test]
    fn created_at_falls_back_and_likes_default() {
        let raw = CanonicalRecord::from_value(json!({
            "pk": "18010",
            "media_id": "3179223655971394742",
            "created_at": 1694000100,
            "text": "Godspeed",
            "user": {"pk": "77", "username": "fan"},
            "has_liked_comment": true,
        }))
        .unwrap();
        let comment: Comment = EntityMapper.map(&raw).unwrap();
        assert_eq!(comment.created_at_utc, 1694000100);
        assert_eq!(comment.post_id, "3179223655971394742");
        assert!(comment.is_liked_by_post_owner);
        assert_eq!(comment.comment_like_count, 0);
        assert_eq!(comment.user.username, "fan");
    }
}
