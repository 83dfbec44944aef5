use crate::ids::{PostId, ShareId, UserId};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Message stored on a share whose original post was deleted.
pub const TOMBSTONE_MESSAGE: &str = "content unavailable";

/// A repost of an original post.
///
/// `shared_post_id` is a soft reference: when the original goes away the
/// share is tombstoned (`deleted = true`, reference cleared) instead of
/// being removed.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "share")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: ShareId,
    pub user_id: UserId,
    pub content: String,
    pub shared_post_id: Option<PostId>,
    pub deleted: bool,
    pub deleted_message: Option<String>,
    pub comment_count: i64,
    pub share_count: i64,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

impl Model {
    pub fn is_tombstoned(&self) -> bool {
        self.deleted || self.shared_post_id.is_none()
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id"
    )]
    User,
    #[sea_orm(
        belongs_to = "super::post::Entity",
        from = "Column::SharedPostId",
        to = "super::post::Column::Id"
    )]
    Post,
    #[sea_orm(has_many = "super::comment::Entity")]
    Comment,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl Related<super::post::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Post.def()
    }
}

impl Related<super::comment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Comment.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
