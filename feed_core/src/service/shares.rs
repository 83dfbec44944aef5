use std::collections::HashMap;

use sea_orm::{sea_query::Expr, DatabaseConnection, SqlErr};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;
use zel_core::prelude::*;

use crate::{
    entity::{prelude::*, share::TOMBSTONE_MESSAGE},
    error::{Resource, ServiceError, ValidationError},
    ids::{PostId, ShareId, UserId},
    service::{
        comments::CounterRepair,
        identities::NodeIdentities,
        notifications::{NotificationsService, SocialEvent},
    },
    store::{self, LikeToggle},
};

/// A share as clients see it.
///
/// Live shares carry their original post. Tombstoned shares have
/// `deleted = true`, no original and the tombstone message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareView {
    pub share: ShareModel,
    pub original: Option<PostModel>,
    pub like_count: u64,
    pub deleted: bool,
    pub message: Option<String>,
}

#[derive(Clone)]
pub struct SharesService {
    db: DatabaseConnection,
    notifications: NotificationsService,
    identities: NodeIdentities,
}

impl SharesService {
    pub fn new(db: DatabaseConnection, notifications: NotificationsService) -> Self {
        Self {
            identities: NodeIdentities::new(db.clone()),
            db,
            notifications,
        }
    }

    /// Repost an original post. One share per (author, post); shares
    /// themselves cannot be shared.
    pub async fn _create_share(
        &self,
        author_id: UserId,
        original_post_id: PostId,
        content: String,
    ) -> Result<ShareModel, ServiceError> {
        store::require_user(&self.db, author_id).await?;

        let Some(original) = Post::find_by_id(original_post_id).one(&self.db).await? else {
            let share_id = ShareId::from_uuid(original_post_id.into_uuid());
            if Share::find_by_id(share_id).one(&self.db).await?.is_some() {
                return Err(ValidationError::ShareOfShare.into());
            }
            return Err(ServiceError::NotFound(Resource::Post));
        };

        let already_shared = Share::find()
            .filter(ShareColumn::UserId.eq(author_id))
            .filter(ShareColumn::SharedPostId.eq(original_post_id))
            .count(&self.db)
            .await?;
        if already_shared > 0 {
            return Err(ValidationError::DuplicateShare.into());
        }

        let now = chrono::Utc::now();
        let share = ShareActiveModel {
            id: Set(ShareId::new()),
            user_id: Set(author_id),
            content: Set(content),
            shared_post_id: Set(Some(original_post_id)),
            deleted: Set(false),
            deleted_message: Set(None),
            comment_count: Set(0),
            share_count: Set(0),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let share = match Share::insert(share).exec_with_returning(&self.db).await {
            Ok(share) => share,
            // Lost a race against the same author sharing the same post
            Err(err) if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                return Err(ValidationError::DuplicateShare.into());
            }
            Err(err) => return Err(err.into()),
        };

        self.settle_share_count(original_post_id, 1).await;
        info!(share_id = %share.id, %original_post_id, "post shared");

        self.notifications
            .announce(
                author_id,
                SocialEvent::SharePost {
                    post_id: original_post_id,
                    share_id: share.id,
                    owner: original.user_id,
                },
            )
            .await;

        Ok(share)
    }

    async fn settle_share_count(&self, post_id: PostId, delta: i64) {
        match store::adjust_share_count(&self.db, post_id, delta).await {
            Ok(()) => debug!(%post_id, delta, "share counter adjusted"),
            Err(error) => {
                warn!(%post_id, delta, %error, "share counter not adjusted, left for repair")
            }
        }
    }

    /// Hard-delete a share with its comments. Author only.
    ///
    /// The original's share counter goes down by one while the share still
    /// references it.
    pub async fn _delete_share(
        &self,
        share_id: ShareId,
        requester_id: UserId,
    ) -> Result<(), ServiceError> {
        let share = store::require_share(&self.db, share_id).await?;
        if share.user_id != requester_id {
            return Err(ServiceError::Unauthorized("delete this share"));
        }

        let comment_ids: Vec<Uuid> = Comment::find()
            .filter(CommentParent::Share(share_id).comments_condition())
            .all(&self.db)
            .await?
            .into_iter()
            .map(|comment| comment.id.into_uuid())
            .collect();

        Comment::delete_many()
            .filter(CommentParent::Share(share_id).comments_condition())
            .exec(&self.db)
            .await?;

        let original_post_id = share.shared_post_id;
        share.delete(&self.db).await?;

        if let Some(post_id) = original_post_id {
            self.settle_share_count(post_id, -1).await;
        }

        store::sweep_likes(&self.db, LikeKind::Comment, comment_ids).await;
        store::sweep_likes(&self.db, LikeKind::Share, vec![share_id.into_uuid()]).await;
        info!(%share_id, "share deleted");

        Ok(())
    }

    /// Change the text of a share. Author only.
    pub async fn _update_share(
        &self,
        share_id: ShareId,
        requester_id: UserId,
        content: String,
    ) -> Result<ShareModel, ServiceError> {
        let share = store::require_share(&self.db, share_id).await?;
        if share.user_id != requester_id {
            return Err(ServiceError::Unauthorized("edit this share"));
        }

        let mut share: ShareActiveModel = share.into();
        share.content = Set(content);
        share.updated_at = Set(chrono::Utc::now());

        Ok(share.update(&self.db).await?)
    }

    /// Tombstone every share of a post that is about to go away. Shares are
    /// never removed here. Returns how many were tombstoned.
    ///
    /// Must run before the post row is deleted: the foreign key nulls the
    /// reference on delete and the shares would no longer be found.
    pub async fn _handle_original_post_deleted(&self, post_id: PostId) -> Result<u64, ServiceError> {
        let result = Share::update_many()
            .col_expr(ShareColumn::SharedPostId, Expr::value(Option::<Uuid>::None))
            .col_expr(ShareColumn::Deleted, Expr::value(true))
            .col_expr(ShareColumn::DeletedMessage, Expr::value(TOMBSTONE_MESSAGE))
            .col_expr(ShareColumn::UpdatedAt, Expr::value(chrono::Utc::now()))
            .filter(ShareColumn::SharedPostId.eq(post_id))
            .exec(&self.db)
            .await?;

        info!(%post_id, tombstoned = result.rows_affected, "shares of deleted post tombstoned");
        Ok(result.rows_affected)
    }

    pub async fn _get_share(&self, share_id: ShareId) -> Result<ShareView, ServiceError> {
        let share = store::require_share(&self.db, share_id).await?;
        let mut views = self.views(vec![share]).await?;
        views.pop().ok_or(ServiceError::NotFound(Resource::Share))
    }

    /// Live shares of a post, newest first.
    pub async fn _list_shares_of_post(
        &self,
        post_id: PostId,
    ) -> Result<Vec<ShareView>, ServiceError> {
        let shares = Share::find()
            .filter(ShareColumn::SharedPostId.eq(post_id))
            .order_by_desc(ShareColumn::CreatedAt)
            .order_by_desc(ShareColumn::Id)
            .all(&self.db)
            .await?;
        Ok(self.views(shares).await?)
    }

    /// Everything a user has shared, tombstones included, newest first.
    pub async fn _list_shares_by_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<ShareView>, ServiceError> {
        let shares = Share::find()
            .filter(ShareColumn::UserId.eq(user_id))
            .order_by_desc(ShareColumn::CreatedAt)
            .order_by_desc(ShareColumn::Id)
            .all(&self.db)
            .await?;
        Ok(self.views(shares).await?)
    }

    async fn views(&self, shares: Vec<ShareModel>) -> Result<Vec<ShareView>, DbErr> {
        let post_ids: Vec<PostId> = shares.iter().filter_map(|s| s.shared_post_id).collect();
        let share_ids: Vec<Uuid> = shares.iter().map(|s| s.id.into_uuid()).collect();

        let originals: HashMap<PostId, PostModel> = Post::find()
            .filter(PostColumn::Id.is_in(post_ids))
            .all(&self.db)
            .await?
            .into_iter()
            .map(|post| (post.id, post))
            .collect();

        let mut like_counts: HashMap<ShareId, u64> = HashMap::new();
        let likes = Like::find()
            .filter(LikeColumn::TargetKind.eq(LikeKind::Share))
            .filter(LikeColumn::TargetId.is_in(share_ids))
            .all(&self.db)
            .await?;
        for like in likes {
            *like_counts
                .entry(ShareId::from_uuid(like.target_id))
                .or_insert(0) += 1;
        }

        let views = shares
            .into_iter()
            .map(|share| {
                let original = share
                    .shared_post_id
                    .and_then(|post_id| originals.get(&post_id).cloned());
                let like_count = like_counts.get(&share.id).copied().unwrap_or(0);

                if share.is_tombstoned() || original.is_none() {
                    let message = share
                        .deleted_message
                        .clone()
                        .unwrap_or_else(|| TOMBSTONE_MESSAGE.to_string());
                    ShareView {
                        share,
                        original: None,
                        like_count,
                        deleted: true,
                        message: Some(message),
                    }
                } else {
                    ShareView {
                        share,
                        original,
                        like_count,
                        deleted: false,
                        message: None,
                    }
                }
            })
            .collect();

        Ok(views)
    }

    pub async fn _toggle_like_share(
        &self,
        share_id: ShareId,
        user_id: UserId,
    ) -> Result<LikeToggle, ServiceError> {
        let share = store::require_share(&self.db, share_id).await?;
        store::require_user(&self.db, user_id).await?;

        let toggle = store::toggle_like(&self.db, LikeTarget::Share(share_id), user_id).await?;
        if toggle == LikeToggle::Liked {
            self.notifications
                .announce(
                    user_id,
                    SocialEvent::LikeShare {
                        share_id,
                        owner: share.user_id,
                    },
                )
                .await;
        }

        Ok(toggle)
    }

    /// Overwrite every post's share counter with the number of shares that
    /// still reference it.
    pub async fn _repair_share_counters(&self) -> Result<CounterRepair, ServiceError> {
        let mut repair = CounterRepair::default();

        for post in Post::find().all(&self.db).await? {
            let actual = store::count_shares(&self.db, post.id).await? as i64;
            repair.checked += 1;
            if post.share_count != actual {
                warn!(post_id = %post.id, stored = post.share_count, actual, "post share counter drifted");
                Post::update_many()
                    .col_expr(PostColumn::ShareCount, Expr::value(actual))
                    .filter(PostColumn::Id.eq(post.id))
                    .exec(&self.db)
                    .await?;
                repair.corrected += 1;
            }
        }

        info!(checked = repair.checked, corrected = repair.corrected, "share counters repaired");
        Ok(repair)
    }
}

#[zel_service(name = "share")]
trait Shares {
    #[method(name = "create_share")]
    async fn create_share(
        &self,
        post_id: PostId,
        content: String,
    ) -> Result<ShareModel, ResourceError>;

    #[method(name = "update_share")]
    async fn update_share(
        &self,
        share_id: ShareId,
        content: String,
    ) -> Result<ShareModel, ResourceError>;

    #[method(name = "delete_share")]
    async fn delete_share(&self, share_id: ShareId) -> Result<(), ResourceError>;

    #[method(name = "get_share")]
    async fn get_share(&self, share_id: ShareId) -> Result<ShareView, ResourceError>;

    #[method(name = "list_shares_of_post")]
    async fn list_shares_of_post(&self, post_id: PostId) -> Result<Vec<ShareView>, ResourceError>;

    #[method(name = "list_shares_by_user")]
    async fn list_shares_by_user(&self, user_id: UserId)
        -> Result<Vec<ShareView>, ResourceError>;

    #[method(name = "toggle_like_share")]
    async fn toggle_like_share(&self, share_id: ShareId) -> Result<LikeToggle, ResourceError>;
}

#[async_trait]
impl SharesServer for SharesService {
    async fn create_share(
        &self,
        ctx: RequestContext,
        post_id: PostId,
        content: String,
    ) -> Result<ShareModel, ResourceError> {
        let caller = self.identities.caller(&ctx).await?;
        Ok(self._create_share(caller, post_id, content).await?)
    }

    async fn update_share(
        &self,
        ctx: RequestContext,
        share_id: ShareId,
        content: String,
    ) -> Result<ShareModel, ResourceError> {
        let caller = self.identities.caller(&ctx).await?;
        Ok(self._update_share(share_id, caller, content).await?)
    }

    async fn delete_share(&self, ctx: RequestContext, share_id: ShareId) -> Result<(), ResourceError> {
        let caller = self.identities.caller(&ctx).await?;
        Ok(self._delete_share(share_id, caller).await?)
    }

    async fn get_share(
        &self,
        _ctx: RequestContext,
        share_id: ShareId,
    ) -> Result<ShareView, ResourceError> {
        Ok(self._get_share(share_id).await?)
    }

    async fn list_shares_of_post(
        &self,
        _ctx: RequestContext,
        post_id: PostId,
    ) -> Result<Vec<ShareView>, ResourceError> {
        Ok(self._list_shares_of_post(post_id).await?)
    }

    async fn list_shares_by_user(
        &self,
        _ctx: RequestContext,
        user_id: UserId,
    ) -> Result<Vec<ShareView>, ResourceError> {
        Ok(self._list_shares_by_user(user_id).await?)
    }

    async fn toggle_like_share(
        &self,
        ctx: RequestContext,
        share_id: ShareId,
    ) -> Result<LikeToggle, ResourceError> {
        let caller = self.identities.caller(&ctx).await?;
        Ok(self._toggle_like_share(share_id, caller).await?)
    }
}
