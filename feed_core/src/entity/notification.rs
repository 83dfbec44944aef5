//! Notification entity.

use crate::ids::{CommentId, NotificationId, PostId, ShareId, StoryId, UserId};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Closed set of notification types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    #[sea_orm(string_value = "like_post")]
    LikePost,
    #[sea_orm(string_value = "like_comment")]
    LikeComment,
    #[sea_orm(string_value = "like_share")]
    LikeShare,
    #[sea_orm(string_value = "comment_post")]
    CommentPost,
    #[sea_orm(string_value = "comment_share")]
    CommentShare,
    #[sea_orm(string_value = "reply_comment")]
    ReplyComment,
    #[sea_orm(string_value = "share_post")]
    SharePost,
    #[sea_orm(string_value = "follow")]
    Follow,
    #[sea_orm(string_value = "new_post")]
    NewPost,
    #[sea_orm(string_value = "new_story")]
    NewStory,
    #[sea_orm(string_value = "change_profile")]
    ChangeProfile,
}

impl NotificationKind {
    /// Kinds that go to every follower of the actor instead of a single owner.
    pub fn is_broadcast(&self) -> bool {
        matches!(self, Self::NewPost | Self::NewStory | Self::ChangeProfile)
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "notification")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: NotificationId,

    /// The user receiving the notification
    pub user_id: UserId,

    /// The user who triggered the notification
    pub from_user_id: UserId,

    pub kind: NotificationKind,

    pub post_id: Option<PostId>,
    pub comment_id: Option<CommentId>,
    pub share_id: Option<ShareId>,
    pub story_id: Option<StoryId>,

    /// New profile picture URL, for `change_profile`
    pub profile: Option<String>,

    pub message: String,

    pub is_read: bool,

    #[sea_orm(column_type = "Json")]
    pub metadata: Json,

    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id",
        on_delete = "Cascade"
    )]
    Recipient,

    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::FromUserId",
        to = "super::user::Column::Id",
        on_delete = "Cascade"
    )]
    Actor,
}

impl ActiveModelBehavior for ActiveModel {}
