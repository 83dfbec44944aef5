use crate::ids::{CommentId, LikeId, PostId, ShareId, UserId};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(8))")]
#[serde(rename_all = "snake_case")]
pub enum LikeKind {
    #[sea_orm(string_value = "post")]
    Post,
    #[sea_orm(string_value = "share")]
    Share,
    #[sea_orm(string_value = "comment")]
    Comment,
}

/// Something that carries a like-set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum LikeTarget {
    Post(PostId),
    Share(ShareId),
    Comment(CommentId),
}

impl LikeTarget {
    pub fn kind(&self) -> LikeKind {
        match self {
            Self::Post(_) => LikeKind::Post,
            Self::Share(_) => LikeKind::Share,
            Self::Comment(_) => LikeKind::Comment,
        }
    }

    pub fn target_id(&self) -> Uuid {
        match self {
            Self::Post(id) => id.into_uuid(),
            Self::Share(id) => id.into_uuid(),
            Self::Comment(id) => id.into_uuid(),
        }
    }

    pub fn condition(&self) -> sea_orm::Condition {
        sea_orm::Condition::all()
            .add(Column::TargetKind.eq(self.kind()))
            .add(Column::TargetId.eq(self.target_id()))
    }
}

/// One member of a like-set. `(target_kind, target_id, user_id)` is unique.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "content_like")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: LikeId,
    pub target_kind: LikeKind,
    pub target_id: Uuid,
    pub user_id: UserId,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id"
    )]
    User,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
