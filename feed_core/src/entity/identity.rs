use crate::ids::UserId;
use sea_orm::{entity::prelude::*, Set};
use serde::{Deserialize, Serialize};

/// Binds an iroh node key to the user it acts for.
///
/// `node_id` is the raw 32-byte public key. A node speaks for exactly one
/// user; a user may own several nodes.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "identity")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub node_id: Vec<u8>,
    pub user_id: UserId,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id",
        on_delete = "Cascade"
    )]
    User,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModel {
    pub fn binding(node_id: &[u8], user_id: UserId) -> Self {
        Self {
            node_id: Set(node_id.to_vec()),
            user_id: Set(user_id),
        }
    }
}

impl ActiveModelBehavior for ActiveModel {}
