//! Entity store adapter.
//!
//! Thin helpers over sea-orm shared by the services. Numeric counters move
//! through a single `UPDATE .. SET col = col + n`, like-sets through
//! read-then-write on `content_like`. Nothing here opens a transaction.

use sea_orm::sea_query::Expr;
use sea_orm::SqlErr;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::{
    entity::prelude::*,
    error::{Resource, ServiceError},
    ids::{CommentId, LikeId, PostId, ShareId, StoryId, UserId},
};

/// Outcome of a like-set toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LikeToggle {
    Liked,
    Unliked,
}

pub async fn require_user<C: ConnectionTrait>(
    db: &C,
    user_id: UserId,
) -> Result<UserModel, ServiceError> {
    User::find_by_id(user_id)
        .one(db)
        .await?
        .ok_or(ServiceError::NotFound(Resource::User))
}

pub async fn require_post<C: ConnectionTrait>(
    db: &C,
    post_id: PostId,
) -> Result<PostModel, ServiceError> {
    Post::find_by_id(post_id)
        .one(db)
        .await?
        .ok_or(ServiceError::NotFound(Resource::Post))
}

pub async fn require_share<C: ConnectionTrait>(
    db: &C,
    share_id: ShareId,
) -> Result<ShareModel, ServiceError> {
    Share::find_by_id(share_id)
        .one(db)
        .await?
        .ok_or(ServiceError::NotFound(Resource::Share))
}

pub async fn require_comment<C: ConnectionTrait>(
    db: &C,
    comment_id: CommentId,
) -> Result<CommentModel, ServiceError> {
    Comment::find_by_id(comment_id)
        .one(db)
        .await?
        .ok_or(ServiceError::NotFound(Resource::Comment))
}

pub async fn require_story<C: ConnectionTrait>(
    db: &C,
    story_id: StoryId,
) -> Result<StoryModel, ServiceError> {
    Story::find_by_id(story_id)
        .one(db)
        .await?
        .ok_or(ServiceError::NotFound(Resource::Story))
}

/// Author of the post or share a comment hangs off.
pub async fn parent_owner<C: ConnectionTrait>(
    db: &C,
    parent: CommentParent,
) -> Result<UserId, ServiceError> {
    match parent {
        CommentParent::Post(post_id) => Ok(require_post(db, post_id).await?.user_id),
        CommentParent::Share(share_id) => Ok(require_share(db, share_id).await?.user_id),
    }
}

/// Adds `delta` to the parent's comment counter. Negative deltas are clamped
/// so the stored value never stays below zero.
pub async fn adjust_comment_count<C: ConnectionTrait>(
    db: &C,
    parent: CommentParent,
    delta: i64,
) -> Result<(), DbErr> {
    match parent {
        CommentParent::Post(post_id) => {
            Post::update_many()
                .col_expr(
                    PostColumn::CommentCount,
                    Expr::col(PostColumn::CommentCount).add(delta),
                )
                .filter(PostColumn::Id.eq(post_id))
                .exec(db)
                .await?;
        }
        CommentParent::Share(share_id) => {
            Share::update_many()
                .col_expr(
                    ShareColumn::CommentCount,
                    Expr::col(ShareColumn::CommentCount).add(delta),
                )
                .filter(ShareColumn::Id.eq(share_id))
                .exec(db)
                .await?;
        }
    }

    if delta < 0 {
        clamp_comment_count(db, parent).await?;
    }
    Ok(())
}

async fn clamp_comment_count<C: ConnectionTrait>(
    db: &C,
    parent: CommentParent,
) -> Result<(), DbErr> {
    let clamped = match parent {
        CommentParent::Post(post_id) => {
            Post::update_many()
                .col_expr(PostColumn::CommentCount, Expr::value(0i64))
                .filter(PostColumn::Id.eq(post_id))
                .filter(PostColumn::CommentCount.lt(0))
                .exec(db)
                .await?
                .rows_affected
        }
        CommentParent::Share(share_id) => {
            Share::update_many()
                .col_expr(ShareColumn::CommentCount, Expr::value(0i64))
                .filter(ShareColumn::Id.eq(share_id))
                .filter(ShareColumn::CommentCount.lt(0))
                .exec(db)
                .await?
                .rows_affected
        }
    };

    if clamped > 0 {
        warn!(?parent, "comment counter went negative, clamped to zero");
    }
    Ok(())
}

/// Adds `delta` to a post's share counter, clamping at zero.
pub async fn adjust_share_count<C: ConnectionTrait>(
    db: &C,
    post_id: PostId,
    delta: i64,
) -> Result<(), DbErr> {
    Post::update_many()
        .col_expr(
            PostColumn::ShareCount,
            Expr::col(PostColumn::ShareCount).add(delta),
        )
        .filter(PostColumn::Id.eq(post_id))
        .exec(db)
        .await?;

    if delta < 0 {
        let clamped = Post::update_many()
            .col_expr(PostColumn::ShareCount, Expr::value(0i64))
            .filter(PostColumn::Id.eq(post_id))
            .filter(PostColumn::ShareCount.lt(0))
            .exec(db)
            .await?
            .rows_affected;

        if clamped > 0 {
            warn!(%post_id, "share counter went negative, clamped to zero");
        }
    }
    Ok(())
}

/// Authoritative number of comments (top-level and replies) under a parent.
pub async fn count_comments<C: ConnectionTrait>(
    db: &C,
    parent: CommentParent,
) -> Result<u64, DbErr> {
    Comment::find()
        .filter(parent.comments_condition())
        .count(db)
        .await
}

/// Authoritative number of shares still referencing a post.
pub async fn count_shares<C: ConnectionTrait>(db: &C, post_id: PostId) -> Result<u64, DbErr> {
    Share::find()
        .filter(ShareColumn::SharedPostId.eq(post_id))
        .count(db)
        .await
}

/// Flips `user_id`'s membership in the target's like-set.
pub async fn toggle_like<C: ConnectionTrait>(
    db: &C,
    target: LikeTarget,
    user_id: UserId,
) -> Result<LikeToggle, DbErr> {
    let existing = Like::find()
        .filter(target.condition())
        .filter(LikeColumn::UserId.eq(user_id))
        .one(db)
        .await?;

    if let Some(like) = existing {
        Like::delete_by_id(like.id).exec(db).await?;
        return Ok(LikeToggle::Unliked);
    }

    let like = LikeActiveModel {
        id: Set(LikeId::new()),
        target_kind: Set(target.kind()),
        target_id: Set(target.target_id()),
        user_id: Set(user_id),
        created_at: Set(chrono::Utc::now()),
    };

    match Like::insert(like).exec(db).await {
        Ok(_) => Ok(LikeToggle::Liked),
        // A concurrent toggle by the same user got there first; the set already
        // holds the member.
        Err(err) if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
            Ok(LikeToggle::Liked)
        }
        Err(err) => Err(err),
    }
}

pub async fn is_liked_by<C: ConnectionTrait>(
    db: &C,
    target: LikeTarget,
    user_id: UserId,
) -> Result<bool, DbErr> {
    let count = Like::find()
        .filter(target.condition())
        .filter(LikeColumn::UserId.eq(user_id))
        .count(db)
        .await?;
    Ok(count > 0)
}

pub async fn like_count<C: ConnectionTrait>(db: &C, target: LikeTarget) -> Result<u64, DbErr> {
    Like::find().filter(target.condition()).count(db).await
}

/// Members of a like-set, oldest like first.
pub async fn likers<C: ConnectionTrait>(
    db: &C,
    target: LikeTarget,
) -> Result<Vec<UserId>, DbErr> {
    let likes = Like::find()
        .filter(target.condition())
        .order_by_asc(LikeColumn::CreatedAt)
        .all(db)
        .await?;
    Ok(likes.into_iter().map(|like| like.user_id).collect())
}

/// Empties the like-sets of every listed target of one kind.
pub async fn delete_likes<C: ConnectionTrait>(
    db: &C,
    kind: LikeKind,
    target_ids: Vec<Uuid>,
) -> Result<u64, DbErr> {
    if target_ids.is_empty() {
        return Ok(0);
    }
    let result = Like::delete_many()
        .filter(LikeColumn::TargetKind.eq(kind))
        .filter(LikeColumn::TargetId.is_in(target_ids))
        .exec(db)
        .await?;
    Ok(result.rows_affected)
}

/// Like cleanup that trails a committed delete. A failure leaves orphaned
/// likes behind and is only logged.
pub async fn sweep_likes<C: ConnectionTrait>(db: &C, kind: LikeKind, target_ids: Vec<Uuid>) {
    let targets = target_ids.len();
    if let Err(error) = delete_likes(db, kind, target_ids).await {
        warn!(?kind, targets, %error, "likes left behind");
    }
}

pub async fn follower_ids<C: ConnectionTrait>(
    db: &C,
    user_id: UserId,
) -> Result<Vec<UserId>, DbErr> {
    let edges = Follow::find()
        .filter(FollowColumn::FolloweeId.eq(user_id))
        .order_by_asc(FollowColumn::CreatedAt)
        .all(db)
        .await?;
    Ok(edges.into_iter().map(|edge| edge.follower_id).collect())
}

pub async fn following_ids<C: ConnectionTrait>(
    db: &C,
    user_id: UserId,
) -> Result<Vec<UserId>, DbErr> {
    let edges = Follow::find()
        .filter(FollowColumn::FollowerId.eq(user_id))
        .order_by_asc(FollowColumn::CreatedAt)
        .all(db)
        .await?;
    Ok(edges.into_iter().map(|edge| edge.followee_id).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::migrator::Migrator;
    use sea_orm_migration::MigratorTrait;

    async fn setup_test_db() -> DatabaseConnection {
        let db = Database::connect("sqlite::memory:")
            .await
            .expect("Failed to create in-memory database");

        Migrator::up(&db, None)
            .await
            .expect("Failed to run migrations");

        db
    }

    async fn create_test_user(db: &DatabaseConnection, username: &str) -> UserId {
        let user_id = UserId::new();
        let user = UserActiveModel {
            id: Set(user_id),
            full_name: Set(username.to_uppercase()),
            username: Set(username.to_string()),
            profile_picture: Set(None),
            created_at: Set(chrono::Utc::now()),
        };
        User::insert(user).exec(db).await.unwrap();
        user_id
    }

    async fn create_test_post(db: &DatabaseConnection, user_id: UserId, comment_count: i64) -> PostId {
        let post_id = PostId::new();
        let now = chrono::Utc::now();
        let post = PostActiveModel {
            id: Set(post_id),
            user_id: Set(user_id),
            content: Set("hello".to_string()),
            media_urls: Set(MediaUrls::default()),
            comment_count: Set(comment_count),
            share_count: Set(0),
            created_at: Set(now),
            updated_at: Set(now),
        };
        Post::insert(post).exec(db).await.unwrap();
        post_id
    }

    #[tokio::test]
    async fn increments_are_applied_in_the_database() {
        let db = setup_test_db().await;
        let user = create_test_user(&db, "ada").await;
        let post_id = create_test_post(&db, user, 0).await;

        for _ in 0..3 {
            adjust_comment_count(&db, CommentParent::Post(post_id), 1)
                .await
                .unwrap();
        }

        let post = require_post(&db, post_id).await.unwrap();
        assert_eq!(post.comment_count, 3);
    }

    #[tokio::test]
    async fn decrements_clamp_at_zero() {
        let db = setup_test_db().await;
        let user = create_test_user(&db, "ada").await;
        let post_id = create_test_post(&db, user, 2).await;

        adjust_comment_count(&db, CommentParent::Post(post_id), -5)
            .await
            .unwrap();

        let post = require_post(&db, post_id).await.unwrap();
        assert_eq!(post.comment_count, 0);
    }

    #[tokio::test]
    async fn share_count_clamps_at_zero() {
        let db = setup_test_db().await;
        let user = create_test_user(&db, "ada").await;
        let post_id = create_test_post(&db, user, 0).await;

        adjust_share_count(&db, post_id, 1).await.unwrap();
        adjust_share_count(&db, post_id, -2).await.unwrap();

        let post = require_post(&db, post_id).await.unwrap();
        assert_eq!(post.share_count, 0);
    }

    #[tokio::test]
    async fn toggle_like_flips_membership() {
        let db = setup_test_db().await;
        let author = create_test_user(&db, "ada").await;
        let fan = create_test_user(&db, "bob").await;
        let post_id = create_test_post(&db, author, 0).await;
        let target = LikeTarget::Post(post_id);

        assert_eq!(toggle_like(&db, target, fan).await.unwrap(), LikeToggle::Liked);
        assert!(is_liked_by(&db, target, fan).await.unwrap());
        assert_eq!(likers(&db, target).await.unwrap(), vec![fan]);

        assert_eq!(toggle_like(&db, target, fan).await.unwrap(), LikeToggle::Unliked);
        assert!(!is_liked_by(&db, target, fan).await.unwrap());
        assert_eq!(like_count(&db, target).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn like_sets_are_per_target() {
        let db = setup_test_db().await;
        let author = create_test_user(&db, "ada").await;
        let fan = create_test_user(&db, "bob").await;
        let first = create_test_post(&db, author, 0).await;
        let second = create_test_post(&db, author, 0).await;

        toggle_like(&db, LikeTarget::Post(first), fan).await.unwrap();

        assert!(!is_liked_by(&db, LikeTarget::Post(second), fan).await.unwrap());
        let removed = delete_likes(&db, LikeKind::Post, vec![first.into_uuid()])
            .await
            .unwrap();
        assert_eq!(removed, 1);
    }

    #[tokio::test]
    async fn follower_lookup_follows_edge_direction() {
        let db = setup_test_db().await;
        let star = create_test_user(&db, "star").await;
        let fan = create_test_user(&db, "fan").await;

        let edge = FollowActiveModel {
            follower_id: Set(fan),
            followee_id: Set(star),
            created_at: Set(chrono::Utc::now()),
        };
        Follow::insert(edge).exec(&db).await.unwrap();

        assert_eq!(follower_ids(&db, star).await.unwrap(), vec![fan]);
        assert!(follower_ids(&db, fan).await.unwrap().is_empty());
        assert_eq!(following_ids(&db, fan).await.unwrap(), vec![star]);
    }
}
