// SeaORM entities
// One module per table; `prelude` re-exports them under prefixed names.

use sea_orm::FromJsonQueryResult;
use serde::{Deserialize, Serialize};

pub mod comment;
pub mod content_like;
pub mod follow;
pub mod identity;
pub mod notification;
pub mod post;
pub mod share;
pub mod story;
pub mod user;


/// URLs returned by the media store, kept in a JSON column.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult)]
pub struct MediaUrls(pub Vec<String>);

impl From<Vec<String>> for MediaUrls {
    fn from(urls: Vec<String>) -> Self {
        Self(urls)
    }
}

pub mod prelude {
    // Re-export all entities for convenience
    pub use super::comment::{
        ActiveModel as CommentActiveModel, Column as CommentColumn, CommentParent,
        CommentTarget, Entity as Comment, Model as CommentModel,
    };
    pub use super::content_like::{
        ActiveModel as LikeActiveModel, Column as LikeColumn, Entity as Like, LikeKind,
        LikeTarget, Model as LikeModel,
    };
    pub use super::follow::{
        ActiveModel as FollowActiveModel, Column as FollowColumn, Entity as Follow,
        Model as FollowModel,
    };
    pub use super::identity::{
        ActiveModel as IdentityActiveModel, Column as IdentityColumn, Entity as Identity,
        Model as IdentityModel,
    };
    pub use super::notification::{
        ActiveModel as NotificationActiveModel, Column as NotificationColumn,
        Entity as Notification, Model as NotificationModel, NotificationKind,
    };
    pub use super::post::{
        ActiveModel as PostActiveModel, Column as PostColumn, Entity as Post, Model as PostModel,
    };
    pub use super::share::{
        ActiveModel as ShareActiveModel, Column as ShareColumn, Entity as Share,
        Model as ShareModel,
    };
    pub use super::story::{
        ActiveModel as StoryActiveModel, Column as StoryColumn, Entity as Story,
        Model as StoryModel,
    };
    pub use super::user::{
        ActiveModel as UserActiveModel, Column as UserColumn, Entity as User, Model as UserModel,
    };
    pub use super::MediaUrls;

    // Re-export commonly used SeaORM types and traits
    pub use sea_orm::{
        ActiveModelTrait,
        ActiveValue,

        ColumnTrait,
        Condition,
        ConnectionTrait,

        // Database and connection types
        Database,
        DatabaseConnection,
        DbConn,
        // Common result types
        DbErr,

        // Core traits
        EntityTrait,
        ModelTrait,
        NotSet,
        // Pagination
        PaginatorTrait,
        QueryFilter,
        QueryOrder,
        QuerySelect,
        Related,
        RelationTrait,
        // Active model helpers
        Set,

        Unchanged,
    };
}
