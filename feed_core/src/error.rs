use std::fmt;

use sea_orm::DbErr;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::error;
use zel_core::prelude::ResourceError;

/// Kinds of record a lookup can miss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
    User,
    Post,
    Share,
    Comment,
    Story,
    Notification,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Resource::User => "user",
            Resource::Post => "post",
            Resource::Share => "share",
            Resource::Comment => "comment",
            Resource::Story => "story",
            Resource::Notification => "notification",
        };
        f.write_str(name)
    }
}

/// Malformed input, with a reason callers can match on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationError {
    #[error("either a post id or a share id must be supplied, not both")]
    AmbiguousParent,

    #[error("a post id or a share id is required")]
    MissingParent,

    #[error("replies can only be nested one level deep")]
    NestedReply,

    #[error("a reply must be attached to the same post or share as its parent comment")]
    ReplyParentMismatch,

    #[error("content must not be empty")]
    EmptyContent,

    #[error("you have already shared this post")]
    DuplicateShare,

    #[error("you cannot share a shared post")]
    ShareOfShare,

    #[error("you cannot follow yourself")]
    SelfFollow,

    #[error("you are already following this user")]
    AlreadyFollowing,

    #[error("username is already taken")]
    UsernameTaken,
}

impl ValidationError {
    /// Stable machine-readable reason.
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::AmbiguousParent => "ambiguous_parent",
            ValidationError::MissingParent => "missing_parent",
            ValidationError::NestedReply => "nested_reply",
            ValidationError::ReplyParentMismatch => "reply_parent_mismatch",
            ValidationError::EmptyContent => "empty_content",
            ValidationError::DuplicateShare => "duplicate_share",
            ValidationError::ShareOfShare => "share_of_share",
            ValidationError::SelfFollow => "self_follow",
            ValidationError::AlreadyFollowing => "already_following",
            ValidationError::UsernameTaken => "username_taken",
        }
    }
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("fatal database error")]
    Store(#[from] DbErr),

    #[error("{0} not found")]
    NotFound(Resource),

    #[error("not authorized to {0}")]
    Unauthorized(&'static str),

    #[error("unknown caller identity")]
    Unauthenticated,

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl ServiceError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ServiceError::NotFound(_))
    }
}

/// What leaves the process when the store fails; the `DbErr` itself is only logged.
#[derive(Debug, Error)]
#[error("storage is temporarily unavailable")]
pub struct StoreUnavailable;

impl From<ServiceError> for ResourceError {
    fn from(error: ServiceError) -> Self {
        match error {
            ServiceError::Store(db_err) => {
                error!(error = %db_err, "store call failed");
                ResourceError::infra(StoreUnavailable)
            }
            ServiceError::NotFound(_) => ResourceError::app(error),
            ServiceError::Unauthorized(_) => ResourceError::app(error),
            ServiceError::Unauthenticated => ResourceError::app(error),
            ServiceError::Validation(_) => ResourceError::app(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_are_human_readable() {
        assert_eq!(
            ServiceError::NotFound(Resource::Comment).to_string(),
            "comment not found"
        );
        assert_eq!(
            ServiceError::Unauthorized("delete this comment").to_string(),
            "not authorized to delete this comment"
        );
        assert_eq!(
            ServiceError::from(ValidationError::NestedReply).to_string(),
            "replies can only be nested one level deep"
        );
    }

    #[test]
    fn store_errors_hide_the_driver_message() {
        let error = ServiceError::Store(DbErr::Custom("disk I/O error at page 7".into()));
        assert_eq!(error.to_string(), "fatal database error");
    }

    #[test]
    fn validation_reasons_serialize_as_codes() {
        let json = serde_json::to_string(&ValidationError::DuplicateShare).unwrap();
        assert_eq!(json, format!("\"{}\"", ValidationError::DuplicateShare.code()));
    }
}
