use crate::{
    error::ValidationError,
    ids::{CommentId, PostId, ShareId, UserId},
};
use sea_orm::{entity::prelude::*, Set};
use serde::{Deserialize, Serialize};

/// Discriminator stored in `comment.post_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(8))")]
#[serde(rename_all = "snake_case")]
pub enum CommentTarget {
    #[sea_orm(string_value = "post")]
    Post,
    #[sea_orm(string_value = "share")]
    Share,
}

/// The entity a comment hangs off. Exactly one of post/share, never both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum CommentParent {
    Post(PostId),
    Share(ShareId),
}

impl CommentParent {
    /// Builds the parent from the two optional references a caller may supply.
    pub fn from_refs(
        post_id: Option<PostId>,
        share_id: Option<ShareId>,
    ) -> Result<Self, ValidationError> {
        match (post_id, share_id) {
            (Some(post_id), None) => Ok(Self::Post(post_id)),
            (None, Some(share_id)) => Ok(Self::Share(share_id)),
            (Some(_), Some(_)) => Err(ValidationError::AmbiguousParent),
            (None, None) => Err(ValidationError::MissingParent),
        }
    }

    pub fn target(&self) -> CommentTarget {
        match self {
            Self::Post(_) => CommentTarget::Post,
            Self::Share(_) => CommentTarget::Share,
        }
    }

    pub fn post_id(&self) -> Option<PostId> {
        match self {
            Self::Post(id) => Some(*id),
            Self::Share(_) => None,
        }
    }

    pub fn share_id(&self) -> Option<ShareId> {
        match self {
            Self::Post(_) => None,
            Self::Share(id) => Some(*id),
        }
    }

    /// Filter selecting every comment attached to this parent.
    pub fn comments_condition(&self) -> sea_orm::Condition {
        let condition = sea_orm::Condition::all().add(Column::PostType.eq(self.target()));
        match self {
            Self::Post(id) => condition.add(Column::PostId.eq(*id)),
            Self::Share(id) => condition.add(Column::ShareId.eq(*id)),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "comment")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: CommentId,
    pub user_id: UserId,
    pub content: String,
    pub parent_comment_id: Option<CommentId>, // NULL for top-level comments
    pub post_type: CommentTarget,
    pub post_id: Option<PostId>,
    pub share_id: Option<ShareId>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

impl Model {
    /// Reads the tagged parent back. `None` only for rows whose tag and
    /// references disagree.
    pub fn parent(&self) -> Option<CommentParent> {
        match (self.post_type, self.post_id, self.share_id) {
            (CommentTarget::Post, Some(post_id), None) => Some(CommentParent::Post(post_id)),
            (CommentTarget::Share, None, Some(share_id)) => Some(CommentParent::Share(share_id)),
            _ => None,
        }
    }

    pub fn is_reply(&self) -> bool {
        self.parent_comment_id.is_some()
    }
}

impl ActiveModel {
    /// The only place a comment row is assembled; tag and references are
    /// always derived from the same `CommentParent`.
    pub fn new_comment(
        user_id: UserId,
        parent: CommentParent,
        content: String,
        parent_comment_id: Option<CommentId>,
    ) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: Set(CommentId::new()),
            user_id: Set(user_id),
            content: Set(content),
            parent_comment_id: Set(parent_comment_id),
            post_type: Set(parent.target()),
            post_id: Set(parent.post_id()),
            share_id: Set(parent.share_id()),
            created_at: Set(now),
            updated_at: Set(now),
        }
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::post::Entity",
        from = "Column::PostId",
        to = "super::post::Column::Id"
    )]
    Post,
    #[sea_orm(
        belongs_to = "super::share::Entity",
        from = "Column::ShareId",
        to = "super::share::Column::Id"
    )]
    Share,
    #[sea_orm(
        belongs_to = "Entity",
        from = "Column::ParentCommentId",
        to = "Column::Id"
    )]
    ParentComment,
}

impl Related<super::post::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Post.def()
    }
}

impl Related<super::share::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Share.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
