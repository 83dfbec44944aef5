use std::collections::HashMap;

use sea_orm::{sea_query::Expr, DatabaseConnection};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;
use zel_core::prelude::*;

use crate::{
    entity::prelude::*,
    error::{ServiceError, ValidationError},
    ids::{CommentId, PostId, ShareId, UserId},
    service::{
        identities::NodeIdentities,
        notifications::{NotificationsService, SocialEvent},
    },
    store::{self, LikeToggle},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentView {
    pub comment: CommentModel,
    pub like_count: u64,
}

/// A top-level comment with its replies, oldest reply first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentThread {
    pub comment: CommentView,
    pub replies: Vec<CommentView>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterRepair {
    pub checked: u64,
    pub corrected: u64,
}

#[derive(Clone)]
pub struct CommentsService {
    db: DatabaseConnection,
    notifications: NotificationsService,
    identities: NodeIdentities,
}

impl CommentsService {
    pub fn new(db: DatabaseConnection, notifications: NotificationsService) -> Self {
        Self {
            identities: NodeIdentities::new(db.clone()),
            db,
            notifications,
        }
    }

    /// Attach a comment, or a reply when `parent_comment_id` is set, to a post
    /// or share.
    pub async fn _add_comment(
        &self,
        author_id: UserId,
        parent: CommentParent,
        content: String,
        parent_comment_id: Option<CommentId>,
    ) -> Result<CommentModel, ServiceError> {
        if content.trim().is_empty() {
            return Err(ValidationError::EmptyContent.into());
        }

        store::require_user(&self.db, author_id).await?;
        let parent_owner = store::parent_owner(&self.db, parent).await?;

        let replied_to = match parent_comment_id {
            Some(parent_comment_id) => {
                let parent_comment = store::require_comment(&self.db, parent_comment_id).await?;
                if parent_comment.is_reply() {
                    return Err(ValidationError::NestedReply.into());
                }
                if parent_comment.parent() != Some(parent) {
                    return Err(ValidationError::ReplyParentMismatch.into());
                }
                Some(parent_comment)
            }
            None => None,
        };

        let comment =
            CommentActiveModel::new_comment(author_id, parent, content, parent_comment_id);
        let comment = Comment::insert(comment)
            .exec_with_returning(&self.db)
            .await?;

        self.settle_comment_count(parent, 1).await;
        info!(comment_id = %comment.id, ?parent, "comment added");

        let event = match (replied_to, parent) {
            (Some(parent_comment), _) => SocialEvent::ReplyComment {
                parent_comment_id: parent_comment.id,
                reply_id: comment.id,
                owner: parent_comment.user_id,
            },
            (None, CommentParent::Post(post_id)) => SocialEvent::CommentPost {
                post_id,
                comment_id: comment.id,
                owner: parent_owner,
            },
            (None, CommentParent::Share(share_id)) => SocialEvent::CommentShare {
                share_id,
                comment_id: comment.id,
                owner: parent_owner,
            },
        };
        self.notifications.announce(author_id, event).await;

        Ok(comment)
    }

    /// Second half of a comment insert or delete. The row change has already
    /// happened; a failed counter update only leaves drift for the repair pass.
    async fn settle_comment_count(&self, parent: CommentParent, delta: i64) {
        match store::adjust_comment_count(&self.db, parent, delta).await {
            Ok(()) => debug!(?parent, delta, "comment counter adjusted"),
            Err(error) => {
                warn!(?parent, delta, %error, "comment counter not adjusted, left for repair")
            }
        }
    }

    /// Top-level comments newest first, each with its replies.
    pub async fn _list_comments(
        &self,
        parent: CommentParent,
    ) -> Result<Vec<CommentThread>, ServiceError> {
        store::parent_owner(&self.db, parent).await?;

        let comments = Comment::find()
            .filter(parent.comments_condition())
            .order_by_desc(CommentColumn::CreatedAt)
            .order_by_desc(CommentColumn::Id)
            .all(&self.db)
            .await?;

        let like_counts = self.like_counts(&comments).await?;
        let view = |comment: CommentModel| CommentView {
            like_count: like_counts.get(&comment.id).copied().unwrap_or(0),
            comment,
        };

        let mut replies: HashMap<CommentId, Vec<CommentView>> = HashMap::new();
        let mut top_level = Vec::new();
        for comment in comments {
            match comment.parent_comment_id {
                Some(parent_comment_id) => replies
                    .entry(parent_comment_id)
                    .or_default()
                    .push(view(comment)),
                None => top_level.push(comment),
            }
        }

        let threads = top_level
            .into_iter()
            .map(|comment| {
                let mut thread_replies = replies.remove(&comment.id).unwrap_or_default();
                // Fetched newest first
                thread_replies.reverse();
                CommentThread {
                    comment: view(comment),
                    replies: thread_replies,
                }
            })
            .collect();

        Ok(threads)
    }

    async fn like_counts(
        &self,
        comments: &[CommentModel],
    ) -> Result<HashMap<CommentId, u64>, DbErr> {
        let ids: Vec<Uuid> = comments.iter().map(|c| c.id.into_uuid()).collect();
        let likes = Like::find()
            .filter(LikeColumn::TargetKind.eq(LikeKind::Comment))
            .filter(LikeColumn::TargetId.is_in(ids))
            .all(&self.db)
            .await?;

        let mut counts = HashMap::new();
        for like in likes {
            *counts.entry(CommentId::from_uuid(like.target_id)).or_insert(0) += 1;
        }
        Ok(counts)
    }

    /// Change the text of a comment. Author only.
    pub async fn _update_comment(
        &self,
        comment_id: CommentId,
        requester_id: UserId,
        content: String,
    ) -> Result<CommentModel, ServiceError> {
        let comment = store::require_comment(&self.db, comment_id).await?;
        if comment.user_id != requester_id {
            return Err(ServiceError::Unauthorized("edit this comment"));
        }
        if content.trim().is_empty() {
            return Err(ValidationError::EmptyContent.into());
        }

        let mut comment: CommentActiveModel = comment.into();
        comment.content = Set(content);
        comment.updated_at = Set(chrono::Utc::now());

        Ok(comment.update(&self.db).await?)
    }

    /// Delete a comment together with its direct replies.
    ///
    /// Allowed for the comment author and for the owner of the post or share it
    /// hangs off. Returns the number of comments removed.
    pub async fn _delete_comment(
        &self,
        comment_id: CommentId,
        requester_id: UserId,
    ) -> Result<u64, ServiceError> {
        let comment = store::require_comment(&self.db, comment_id).await?;
        let parent = comment.parent();

        if comment.user_id != requester_id {
            let parent_owner = match parent {
                Some(parent) => Some(store::parent_owner(&self.db, parent).await?),
                None => None,
            };
            if parent_owner != Some(requester_id) {
                return Err(ServiceError::Unauthorized("delete this comment"));
            }
        }

        let reply_ids: Vec<Uuid> = Comment::find()
            .filter(CommentColumn::ParentCommentId.eq(comment_id))
            .all(&self.db)
            .await?
            .into_iter()
            .map(|reply| reply.id.into_uuid())
            .collect();

        // Replies first: the parent row cascades to them, and cascaded rows
        // are not reported in rows_affected.
        let replies_removed = Comment::delete_many()
            .filter(CommentColumn::ParentCommentId.eq(comment_id))
            .exec(&self.db)
            .await?
            .rows_affected;
        let removed = replies_removed
            + Comment::delete_by_id(comment_id)
                .exec(&self.db)
                .await?
                .rows_affected;

        match parent {
            Some(parent) => self.settle_comment_count(parent, -(removed as i64)).await,
            None => warn!(%comment_id, "comment had no consistent parent, no counter adjusted"),
        }

        let mut like_targets = reply_ids;
        like_targets.push(comment_id.into_uuid());
        store::sweep_likes(&self.db, LikeKind::Comment, like_targets).await;
        info!(%comment_id, removed, "comment deleted");

        Ok(removed)
    }

    pub async fn _toggle_like_comment(
        &self,
        comment_id: CommentId,
        user_id: UserId,
    ) -> Result<LikeToggle, ServiceError> {
        let comment = store::require_comment(&self.db, comment_id).await?;
        store::require_user(&self.db, user_id).await?;

        let toggle = store::toggle_like(&self.db, LikeTarget::Comment(comment_id), user_id).await?;
        if toggle == LikeToggle::Liked {
            self.notifications
                .announce(
                    user_id,
                    SocialEvent::LikeComment {
                        comment_id,
                        owner: comment.user_id,
                    },
                )
                .await;
        }

        Ok(toggle)
    }

    /// Overwrite every post and share comment counter with the number of
    /// comment rows that actually reference it.
    pub async fn _repair_comment_counters(&self) -> Result<CounterRepair, ServiceError> {
        let mut repair = CounterRepair::default();

        for post in Post::find().all(&self.db).await? {
            let actual = store::count_comments(&self.db, CommentParent::Post(post.id)).await? as i64;
            repair.checked += 1;
            if post.comment_count != actual {
                warn!(post_id = %post.id, stored = post.comment_count, actual, "post comment counter drifted");
                Post::update_many()
                    .col_expr(PostColumn::CommentCount, Expr::value(actual))
                    .filter(PostColumn::Id.eq(post.id))
                    .exec(&self.db)
                    .await?;
                repair.corrected += 1;
            }
        }

        for share in Share::find().all(&self.db).await? {
            let actual =
                store::count_comments(&self.db, CommentParent::Share(share.id)).await? as i64;
            repair.checked += 1;
            if share.comment_count != actual {
                warn!(share_id = %share.id, stored = share.comment_count, actual, "share comment counter drifted");
                Share::update_many()
                    .col_expr(ShareColumn::CommentCount, Expr::value(actual))
                    .filter(ShareColumn::Id.eq(share.id))
                    .exec(&self.db)
                    .await?;
                repair.corrected += 1;
            }
        }

        info!(checked = repair.checked, corrected = repair.corrected, "comment counters repaired");
        Ok(repair)
    }
}

#[zel_service(name = "comment")]
trait Comments {
    #[method(name = "add_comment")]
    async fn add_comment(
        &self,
        post_id: Option<PostId>,
        share_id: Option<ShareId>,
        content: String,
        parent_comment_id: Option<CommentId>,
    ) -> Result<CommentModel, ResourceError>;

    #[method(name = "list_comments")]
    async fn list_comments(
        &self,
        post_id: Option<PostId>,
        share_id: Option<ShareId>,
    ) -> Result<Vec<CommentThread>, ResourceError>;

    #[method(name = "update_comment")]
    async fn update_comment(
        &self,
        comment_id: CommentId,
        content: String,
    ) -> Result<CommentModel, ResourceError>;

    #[method(name = "delete_comment")]
    async fn delete_comment(&self, comment_id: CommentId) -> Result<u64, ResourceError>;

    #[method(name = "toggle_like_comment")]
    async fn toggle_like_comment(&self, comment_id: CommentId)
        -> Result<LikeToggle, ResourceError>;
}

#[async_trait]
impl CommentsServer for CommentsService {
    async fn add_comment(
        &self,
        ctx: RequestContext,
        post_id: Option<PostId>,
        share_id: Option<ShareId>,
        content: String,
        parent_comment_id: Option<CommentId>,
    ) -> Result<CommentModel, ResourceError> {
        let caller = self.identities.caller(&ctx).await?;
        let parent = CommentParent::from_refs(post_id, share_id).map_err(ServiceError::from)?;
        Ok(self
            ._add_comment(caller, parent, content, parent_comment_id)
            .await?)
    }

    async fn list_comments(
        &self,
        _ctx: RequestContext,
        post_id: Option<PostId>,
        share_id: Option<ShareId>,
    ) -> Result<Vec<CommentThread>, ResourceError> {
        let parent = CommentParent::from_refs(post_id, share_id).map_err(ServiceError::from)?;
        Ok(self._list_comments(parent).await?)
    }

    async fn update_comment(
        &self,
        ctx: RequestContext,
        comment_id: CommentId,
        content: String,
    ) -> Result<CommentModel, ResourceError> {
        let caller = self.identities.caller(&ctx).await?;
        Ok(self._update_comment(comment_id, caller, content).await?)
    }

    async fn delete_comment(
        &self,
        ctx: RequestContext,
        comment_id: CommentId,
    ) -> Result<u64, ResourceError> {
        let caller = self.identities.caller(&ctx).await?;
        Ok(self._delete_comment(comment_id, caller).await?)
    }

    async fn toggle_like_comment(
        &self,
        ctx: RequestContext,
        comment_id: CommentId,
    ) -> Result<LikeToggle, ResourceError> {
        let caller = self.identities.caller(&ctx).await?;
        Ok(self._toggle_like_comment(comment_id, caller).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Resource;
    use crate::test_utils::{
        create_test_db, create_test_post, create_test_share, create_test_user,
        notifications_for, recording_notifications,
    };

    async fn setup_test_service() -> (CommentsService, DatabaseConnection) {
        let db = create_test_db().await;
        let (notifications, _channel) = recording_notifications(&db);
        (CommentsService::new(db.clone(), notifications), db)
    }

    async fn post_comment_count(db: &DatabaseConnection, post_id: PostId) -> i64 {
        store::require_post(db, post_id).await.unwrap().comment_count
    }

    #[tokio::test]
    async fn test_top_level_comment_bumps_counter_and_notifies_owner() {
        let (service, db) = setup_test_service().await;
        let owner = create_test_user(&db, "owner").await;
        let commenter = create_test_user(&db, "commenter").await;
        let post_id = create_test_post(&db, owner).await;

        let comment = service
            ._add_comment(commenter, CommentParent::Post(post_id), "nice".into(), None)
            .await
            .unwrap();

        assert_eq!(comment.post_type, CommentTarget::Post);
        assert_eq!(comment.post_id, Some(post_id));
        assert_eq!(comment.share_id, None);
        assert_eq!(post_comment_count(&db, post_id).await, 1);

        let received = notifications_for(&db, owner).await;
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].kind, NotificationKind::CommentPost);
        assert_eq!(received[0].comment_id, Some(comment.id));
        assert_eq!(received[0].message, "Commenter commented on your post");
    }

    #[tokio::test]
    async fn test_commenting_on_own_post_notifies_nobody() {
        let (service, db) = setup_test_service().await;
        let owner = create_test_user(&db, "owner").await;
        let post_id = create_test_post(&db, owner).await;

        service
            ._add_comment(owner, CommentParent::Post(post_id), "bump".into(), None)
            .await
            .unwrap();

        assert!(notifications_for(&db, owner).await.is_empty());
        assert_eq!(post_comment_count(&db, post_id).await, 1);
    }

    #[tokio::test]
    async fn test_reply_notifies_parent_comment_author_not_post_owner() {
        let (service, db) = setup_test_service().await;
        let owner = create_test_user(&db, "owner").await;
        let first = create_test_user(&db, "first").await;
        let second = create_test_user(&db, "second").await;
        let post_id = create_test_post(&db, owner).await;

        let top = service
            ._add_comment(first, CommentParent::Post(post_id), "top".into(), None)
            .await
            .unwrap();
        service
            ._add_comment(second, CommentParent::Post(post_id), "reply".into(), Some(top.id))
            .await
            .unwrap();

        let to_owner = notifications_for(&db, owner).await;
        assert_eq!(to_owner.len(), 1);
        assert_eq!(to_owner[0].kind, NotificationKind::CommentPost);

        let to_first = notifications_for(&db, first).await;
        assert_eq!(to_first.len(), 1);
        assert_eq!(to_first[0].kind, NotificationKind::ReplyComment);
        assert_eq!(to_first[0].from_user_id, second);

        assert_eq!(post_comment_count(&db, post_id).await, 2);
    }

    #[tokio::test]
    async fn test_reply_to_reply_fails_validation() {
        let (service, db) = setup_test_service().await;
        let owner = create_test_user(&db, "owner").await;
        let post_id = create_test_post(&db, owner).await;
        let parent = CommentParent::Post(post_id);

        let top = service
            ._add_comment(owner, parent, "top".into(), None)
            .await
            .unwrap();
        let reply = service
            ._add_comment(owner, parent, "reply".into(), Some(top.id))
            .await
            .unwrap();

        let result = service
            ._add_comment(owner, parent, "too deep".into(), Some(reply.id))
            .await;

        assert!(matches!(
            result,
            Err(ServiceError::Validation(ValidationError::NestedReply))
        ));
        assert_eq!(post_comment_count(&db, post_id).await, 2);
    }

    #[tokio::test]
    async fn test_reply_must_share_parent_target() {
        let (service, db) = setup_test_service().await;
        let owner = create_test_user(&db, "owner").await;
        let first_post = create_test_post(&db, owner).await;
        let second_post = create_test_post(&db, owner).await;

        let top = service
            ._add_comment(owner, CommentParent::Post(first_post), "top".into(), None)
            .await
            .unwrap();

        let result = service
            ._add_comment(owner, CommentParent::Post(second_post), "stray".into(), Some(top.id))
            .await;

        assert!(matches!(
            result,
            Err(ServiceError::Validation(ValidationError::ReplyParentMismatch))
        ));
    }

    #[tokio::test]
    async fn test_missing_parent_and_empty_content_are_rejected() {
        let (service, db) = setup_test_service().await;
        let owner = create_test_user(&db, "owner").await;
        let post_id = create_test_post(&db, owner).await;

        let missing = service
            ._add_comment(owner, CommentParent::Post(PostId::new()), "hi".into(), None)
            .await;
        assert!(matches!(missing, Err(ServiceError::NotFound(Resource::Post))));

        let empty = service
            ._add_comment(owner, CommentParent::Post(post_id), "   ".into(), None)
            .await;
        assert!(matches!(
            empty,
            Err(ServiceError::Validation(ValidationError::EmptyContent))
        ));
    }

    #[tokio::test]
    async fn test_share_comments_use_share_counter_only() {
        let (service, db) = setup_test_service().await;
        let owner = create_test_user(&db, "owner").await;
        let sharer = create_test_user(&db, "sharer").await;
        let post_id = create_test_post(&db, owner).await;
        let share_id = create_test_share(&db, sharer, post_id).await;

        let comment = service
            ._add_comment(owner, CommentParent::Share(share_id), "on share".into(), None)
            .await
            .unwrap();

        assert_eq!(comment.post_type, CommentTarget::Share);
        assert_eq!(store::require_share(&db, share_id).await.unwrap().comment_count, 1);
        assert_eq!(post_comment_count(&db, post_id).await, 0);

        let to_sharer = notifications_for(&db, sharer).await;
        assert_eq!(to_sharer.len(), 1);
        assert_eq!(to_sharer[0].kind, NotificationKind::CommentShare);
    }

    #[tokio::test]
    async fn test_list_comments_nests_replies() {
        let (service, db) = setup_test_service().await;
        let owner = create_test_user(&db, "owner").await;
        let post_id = create_test_post(&db, owner).await;
        let parent = CommentParent::Post(post_id);

        let older = service
            ._add_comment(owner, parent, "older".into(), None)
            .await
            .unwrap();
        let newer = service
            ._add_comment(owner, parent, "newer".into(), None)
            .await
            .unwrap();
        let first_reply = service
            ._add_comment(owner, parent, "r1".into(), Some(older.id))
            .await
            .unwrap();
        let second_reply = service
            ._add_comment(owner, parent, "r2".into(), Some(older.id))
            .await
            .unwrap();

        let threads = service._list_comments(parent).await.unwrap();

        assert_eq!(threads.len(), 2);
        assert_eq!(threads[0].comment.comment.id, newer.id);
        assert!(threads[0].replies.is_empty());
        assert_eq!(threads[1].comment.comment.id, older.id);
        let reply_ids: Vec<CommentId> = threads[1].replies.iter().map(|r| r.comment.id).collect();
        assert_eq!(reply_ids, vec![first_reply.id, second_reply.id]);
    }

    #[tokio::test]
    async fn test_delete_top_level_removes_replies_and_decrements() {
        let (service, db) = setup_test_service().await;
        let owner = create_test_user(&db, "owner").await;
        let post_id = create_test_post(&db, owner).await;
        let parent = CommentParent::Post(post_id);

        let top = service
            ._add_comment(owner, parent, "top".into(), None)
            .await
            .unwrap();
        for i in 0..3 {
            service
                ._add_comment(owner, parent, format!("reply {i}"), Some(top.id))
                .await
                .unwrap();
        }
        service
            ._add_comment(owner, parent, "other".into(), None)
            .await
            .unwrap();
        assert_eq!(post_comment_count(&db, post_id).await, 5);

        let removed = service._delete_comment(top.id, owner).await.unwrap();

        assert_eq!(removed, 4);
        assert_eq!(post_comment_count(&db, post_id).await, 1);
        assert_eq!(store::count_comments(&db, parent).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_delete_clamps_counter_at_zero() {
        let (service, db) = setup_test_service().await;
        let owner = create_test_user(&db, "owner").await;
        let post_id = create_test_post(&db, owner).await;
        let parent = CommentParent::Post(post_id);

        let top = service
            ._add_comment(owner, parent, "top".into(), None)
            .await
            .unwrap();
        for i in 0..2 {
            service
                ._add_comment(owner, parent, format!("reply {i}"), Some(top.id))
                .await
                .unwrap();
        }

        // Simulate drift: the cache lost two increments
        Post::update_many()
            .col_expr(PostColumn::CommentCount, Expr::value(1i64))
            .filter(PostColumn::Id.eq(post_id))
            .exec(&db)
            .await
            .unwrap();

        let removed = service._delete_comment(top.id, owner).await.unwrap();

        assert_eq!(removed, 3);
        assert_eq!(post_comment_count(&db, post_id).await, 0);
    }

    #[tokio::test]
    async fn test_delete_settles_counter_when_like_cleanup_fails() {
        let (service, db) = setup_test_service().await;
        let owner = create_test_user(&db, "owner").await;
        let fan = create_test_user(&db, "fan").await;
        let post_id = create_test_post(&db, owner).await;
        let parent = CommentParent::Post(post_id);

        let top = service
            ._add_comment(owner, parent, "top".into(), None)
            .await
            .unwrap();
        let reply = service
            ._add_comment(owner, parent, "reply".into(), Some(top.id))
            .await
            .unwrap();
        service._toggle_like_comment(reply.id, fan).await.unwrap();

        db.execute_unprepared("DROP TABLE content_like").await.unwrap();

        let removed = service._delete_comment(top.id, owner).await.unwrap();

        assert_eq!(removed, 2);
        assert_eq!(post_comment_count(&db, post_id).await, 0);
        assert_eq!(store::count_comments(&db, parent).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_removes_reply_likes() {
        let (service, db) = setup_test_service().await;
        let owner = create_test_user(&db, "owner").await;
        let fan = create_test_user(&db, "fan").await;
        let post_id = create_test_post(&db, owner).await;
        let parent = CommentParent::Post(post_id);

        let top = service
            ._add_comment(owner, parent, "top".into(), None)
            .await
            .unwrap();
        let reply = service
            ._add_comment(owner, parent, "reply".into(), Some(top.id))
            .await
            .unwrap();
        service._toggle_like_comment(top.id, fan).await.unwrap();
        service._toggle_like_comment(reply.id, fan).await.unwrap();

        service._delete_comment(top.id, owner).await.unwrap();

        let leftover = Like::find()
            .filter(LikeColumn::TargetKind.eq(LikeKind::Comment))
            .count(&db)
            .await
            .unwrap();
        assert_eq!(leftover, 0);
    }

    #[tokio::test]
    async fn test_delete_permissions() {
        let (service, db) = setup_test_service().await;
        let owner = create_test_user(&db, "owner").await;
        let commenter = create_test_user(&db, "commenter").await;
        let stranger = create_test_user(&db, "stranger").await;
        let post_id = create_test_post(&db, owner).await;
        let parent = CommentParent::Post(post_id);

        let first = service
            ._add_comment(commenter, parent, "one".into(), None)
            .await
            .unwrap();
        let second = service
            ._add_comment(commenter, parent, "two".into(), None)
            .await
            .unwrap();

        let denied = service._delete_comment(first.id, stranger).await;
        assert!(matches!(denied, Err(ServiceError::Unauthorized(_))));

        // Post owner may moderate
        assert_eq!(service._delete_comment(first.id, owner).await.unwrap(), 1);
        // Author may delete their own
        assert_eq!(service._delete_comment(second.id, commenter).await.unwrap(), 1);
        assert_eq!(post_comment_count(&db, post_id).await, 0);
    }

    #[tokio::test]
    async fn test_update_is_author_only() {
        let (service, db) = setup_test_service().await;
        let owner = create_test_user(&db, "owner").await;
        let commenter = create_test_user(&db, "commenter").await;
        let post_id = create_test_post(&db, owner).await;

        let comment = service
            ._add_comment(commenter, CommentParent::Post(post_id), "typo".into(), None)
            .await
            .unwrap();

        let denied = service
            ._update_comment(comment.id, owner, "hijack".into())
            .await;
        assert!(matches!(denied, Err(ServiceError::Unauthorized(_))));

        let updated = service
            ._update_comment(comment.id, commenter, "fixed".into())
            .await
            .unwrap();
        assert_eq!(updated.content, "fixed");
        assert_eq!(post_comment_count(&db, post_id).await, 1);
        assert_eq!(notifications_for(&db, owner).await.len(), 1);
    }

    #[tokio::test]
    async fn test_like_then_unlike_notifies_once() {
        let (service, db) = setup_test_service().await;
        let owner = create_test_user(&db, "owner").await;
        let fan = create_test_user(&db, "fan").await;
        let post_id = create_test_post(&db, owner).await;

        let comment = service
            ._add_comment(owner, CommentParent::Post(post_id), "like me".into(), None)
            .await
            .unwrap();

        let liked = service._toggle_like_comment(comment.id, fan).await.unwrap();
        let unliked = service._toggle_like_comment(comment.id, fan).await.unwrap();

        assert_eq!(liked, LikeToggle::Liked);
        assert_eq!(unliked, LikeToggle::Unliked);
        let received = notifications_for(&db, owner).await;
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].kind, NotificationKind::LikeComment);
        assert!(!store::is_liked_by(&db, LikeTarget::Comment(comment.id), fan)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_repair_restores_counters() {
        let (service, db) = setup_test_service().await;
        let owner = create_test_user(&db, "owner").await;
        let post_id = create_test_post(&db, owner).await;
        let share_id = create_test_share(&db, owner, post_id).await;

        for _ in 0..3 {
            service
                ._add_comment(owner, CommentParent::Post(post_id), "c".into(), None)
                .await
                .unwrap();
        }
        service
            ._add_comment(owner, CommentParent::Share(share_id), "s".into(), None)
            .await
            .unwrap();

        Post::update_many()
            .col_expr(PostColumn::CommentCount, Expr::value(42i64))
            .exec(&db)
            .await
            .unwrap();
        Share::update_many()
            .col_expr(ShareColumn::CommentCount, Expr::value(0i64))
            .exec(&db)
            .await
            .unwrap();

        let repair = service._repair_comment_counters().await.unwrap();

        assert_eq!(repair, CounterRepair { checked: 2, corrected: 2 });
        assert_eq!(post_comment_count(&db, post_id).await, 3);
        assert_eq!(store::require_share(&db, share_id).await.unwrap().comment_count, 1);
    }
}
