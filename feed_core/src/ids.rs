//! Typed UUIDv7 identifiers.
//!
//! Every row id gets its own newtype so a `PostId` can never be passed where a
//! `ShareId` is expected. They serialize as bare UUID strings and bind to
//! sea-orm `Uuid` columns.

use std::{fmt, str::FromStr};

use sea_orm::{
    sea_query::{ArrayType, Nullable, ValueType, ValueTypeErr},
    ColIdx, ColumnType, DbErr, QueryResult, TryFromU64, TryGetError, TryGetable, Value,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
#[error("invalid {kind}: {source}")]
pub struct IdParseError {
    pub kind: &'static str,
    #[source]
    pub source: uuid::Error,
}

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Fresh time-ordered id.
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }

            pub fn into_uuid(self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl FromStr for $name {
            type Err = IdParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self).map_err(|source| IdParseError {
                    kind: stringify!($name),
                    source,
                })
            }
        }

        uuid_column!($name);
    };
}

/// sea-orm plumbing so an id can be used as a column value and primary key.
macro_rules! uuid_column {
    ($name:ident) => {
        impl From<$name> for Value {
            fn from(id: $name) -> Self {
                Value::Uuid(Some(Box::new(id.0)))
            }
        }

        impl TryGetable for $name {
            fn try_get_by<I: ColIdx>(res: &QueryResult, idx: I) -> Result<Self, TryGetError> {
                Uuid::try_get_by(res, idx).map(Self)
            }
        }

        impl ValueType for $name {
            fn try_from(v: Value) -> Result<Self, ValueTypeErr> {
                match v {
                    Value::Uuid(Some(uuid)) => Ok(Self(*uuid)),
                    _ => Err(ValueTypeErr),
                }
            }

            fn type_name() -> String {
                stringify!($name).to_owned()
            }

            fn array_type() -> ArrayType {
                ArrayType::Uuid
            }

            fn column_type() -> ColumnType {
                ColumnType::Uuid
            }
        }

        impl Nullable for $name {
            fn null() -> Value {
                Value::Uuid(None)
            }
        }

        // Ids are generated client side, never auto-incremented.
        impl TryFromU64 for $name {
            fn try_from_u64(_: u64) -> Result<Self, DbErr> {
                Err(DbErr::ConvertFromU64(stringify!($name)))
            }
        }
    };
}

define_id!(UserId);
define_id!(PostId);
define_id!(
    /// A re-post of a `PostId`, with its own comments and likes.
    ShareId
);
define_id!(CommentId);
define_id!(StoryId);
define_id!(NotificationId);
define_id!(
    /// Row id of a like; the liked target is addressed by `LikeTarget`.
    LikeId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        let id1 = CommentId::new();
        let id2 = CommentId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn ids_are_time_ordered() {
        let first = NotificationId::new();
        let second = NotificationId::new();
        assert!(first.as_uuid() < second.as_uuid());
    }

    #[test]
    fn parses_display_output() {
        let id = ShareId::new();
        let parsed: ShareId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn parse_error_names_the_id_kind() {
        let err = "not-a-uuid".parse::<StoryId>().unwrap_err();
        assert_eq!(err.kind, "StoryId");
        assert!(err.to_string().starts_with("invalid StoryId"));
    }

    #[test]
    fn serializes_transparently() {
        let uuid = Uuid::now_v7();
        let id = PostId::from_uuid(uuid);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{uuid}\""));
        let back: PostId = serde_json::from_str(&json).unwrap();
        assert_eq!(back.into_uuid(), uuid);
    }
}
