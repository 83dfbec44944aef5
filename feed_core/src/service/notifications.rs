//! Notification fan-out.
//!
//! Every state-changing social action ends here as a [`SocialEvent`]. The
//! service resolves recipients (the content owner, or every follower of the
//! actor for broadcast kinds), persists one row per recipient and pushes the
//! hydrated row to whoever is online. Pushes are best effort.

use std::collections::HashMap;
use std::sync::Arc;

use futures::{stream, StreamExt};
use sea_orm::{sea_query::Expr, DatabaseConnection};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};
use zel_core::prelude::*;

use crate::{
    entity::prelude::*,
    error::{Resource, ServiceError},
    ids::{CommentId, NotificationId, PostId, ShareId, StoryId, UserId},
    realtime::{ConnectionId, PushChannel, PushError, PushReceiver, NEW_NOTIFICATION_EVENT},
    service::identities::NodeIdentities,
    store,
};

const DEFAULT_FANOUT_CONCURRENCY: usize = 8;
const DEFAULT_MAX_PAGE_SIZE: u64 = 50;

/// Content a notification points at.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRefs {
    pub post_id: Option<PostId>,
    pub comment_id: Option<CommentId>,
    pub share_id: Option<ShareId>,
    pub story_id: Option<StoryId>,
    pub profile: Option<String>,
}

/// A social action that may produce notifications.
///
/// Targeted events carry the owner being notified; broadcast events go to the
/// actor's followers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocialEvent {
    LikePost {
        post_id: PostId,
        owner: UserId,
    },
    LikeComment {
        comment_id: CommentId,
        owner: UserId,
    },
    LikeShare {
        share_id: ShareId,
        owner: UserId,
    },
    CommentPost {
        post_id: PostId,
        comment_id: CommentId,
        owner: UserId,
    },
    CommentShare {
        share_id: ShareId,
        comment_id: CommentId,
        owner: UserId,
    },
    ReplyComment {
        parent_comment_id: CommentId,
        reply_id: CommentId,
        owner: UserId,
    },
    SharePost {
        post_id: PostId,
        share_id: ShareId,
        owner: UserId,
    },
    Follow {
        followee: UserId,
    },
    NewPost {
        post_id: PostId,
    },
    NewStory {
        story_id: StoryId,
    },
    ChangeProfile {
        profile_picture: String,
    },
}

impl SocialEvent {
    pub fn kind(&self) -> NotificationKind {
        match self {
            Self::LikePost { .. } => NotificationKind::LikePost,
            Self::LikeComment { .. } => NotificationKind::LikeComment,
            Self::LikeShare { .. } => NotificationKind::LikeShare,
            Self::CommentPost { .. } => NotificationKind::CommentPost,
            Self::CommentShare { .. } => NotificationKind::CommentShare,
            Self::ReplyComment { .. } => NotificationKind::ReplyComment,
            Self::SharePost { .. } => NotificationKind::SharePost,
            Self::Follow { .. } => NotificationKind::Follow,
            Self::NewPost { .. } => NotificationKind::NewPost,
            Self::NewStory { .. } => NotificationKind::NewStory,
            Self::ChangeProfile { .. } => NotificationKind::ChangeProfile,
        }
    }

    /// Single recipient, or `None` for follower broadcasts.
    pub fn recipient(&self) -> Option<UserId> {
        match self {
            Self::LikePost { owner, .. }
            | Self::LikeComment { owner, .. }
            | Self::LikeShare { owner, .. }
            | Self::CommentPost { owner, .. }
            | Self::CommentShare { owner, .. }
            | Self::ReplyComment { owner, .. }
            | Self::SharePost { owner, .. } => Some(*owner),
            Self::Follow { followee } => Some(*followee),
            Self::NewPost { .. } | Self::NewStory { .. } | Self::ChangeProfile { .. } => None,
        }
    }

    pub fn message(&self, actor_name: &str) -> String {
        let action = match self {
            Self::LikePost { .. } => "liked your post",
            Self::LikeComment { .. } => "liked your comment",
            Self::LikeShare { .. } => "liked your share",
            Self::CommentPost { .. } => "commented on your post",
            Self::CommentShare { .. } => "commented on your share",
            Self::ReplyComment { .. } => "replied to your comment",
            Self::SharePost { .. } => "shared your post",
            Self::Follow { .. } => "started following you",
            Self::NewPost { .. } => "created a new post",
            Self::NewStory { .. } => "created a new story",
            Self::ChangeProfile { .. } => "changed profile picture",
        };
        format!("{actor_name} {action}")
    }

    pub fn refs(&self) -> NotificationRefs {
        let mut refs = NotificationRefs::default();
        match self {
            Self::LikePost { post_id, .. } | Self::NewPost { post_id } => {
                refs.post_id = Some(*post_id);
            }
            Self::LikeComment { comment_id, .. } => refs.comment_id = Some(*comment_id),
            Self::LikeShare { share_id, .. } => refs.share_id = Some(*share_id),
            Self::CommentPost {
                post_id,
                comment_id,
                ..
            } => {
                refs.post_id = Some(*post_id);
                refs.comment_id = Some(*comment_id);
            }
            Self::CommentShare {
                share_id,
                comment_id,
                ..
            } => {
                refs.share_id = Some(*share_id);
                refs.comment_id = Some(*comment_id);
            }
            Self::ReplyComment { reply_id, .. } => refs.comment_id = Some(*reply_id),
            Self::SharePost {
                post_id, share_id, ..
            } => {
                refs.post_id = Some(*post_id);
                refs.share_id = Some(*share_id);
            }
            Self::Follow { .. } => {}
            Self::NewStory { story_id } => refs.story_id = Some(*story_id),
            Self::ChangeProfile { profile_picture } => {
                refs.profile = Some(profile_picture.clone());
            }
        }
        refs
    }

    /// Ids involved in the event, stored alongside the notification.
    pub fn metadata(&self) -> serde_json::Value {
        match self {
            Self::LikePost { post_id, .. } | Self::NewPost { post_id } => {
                json!({ "post_id": post_id })
            }
            Self::LikeComment { comment_id, .. } => json!({ "comment_id": comment_id }),
            Self::LikeShare { share_id, .. } => json!({ "share_id": share_id }),
            Self::CommentPost {
                post_id,
                comment_id,
                ..
            } => json!({ "post_id": post_id, "comment_id": comment_id }),
            Self::CommentShare {
                share_id,
                comment_id,
                ..
            } => json!({ "share_id": share_id, "comment_id": comment_id }),
            Self::ReplyComment {
                parent_comment_id,
                reply_id,
                ..
            } => json!({ "parent_comment_id": parent_comment_id, "reply_id": reply_id }),
            Self::SharePost {
                post_id, share_id, ..
            } => json!({ "post_id": post_id, "share_id": share_id }),
            Self::Follow { followee } => json!({ "followed_user_id": followee }),
            Self::NewStory { story_id } => json!({ "story_id": story_id }),
            Self::ChangeProfile { profile_picture } => {
                json!({ "profile_picture": profile_picture })
            }
        }
    }
}

/// Per-follower outcome counts of a broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FanoutReport {
    pub delivered: usize,
    pub suppressed: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// Self-notification, or the actor no longer exists.
    Suppressed,
    Created(Box<NotificationModel>),
    FannedOut(FanoutReport),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: UserId,
    pub full_name: String,
    pub username: String,
    pub profile_picture: Option<String>,
}

impl From<UserModel> for UserSummary {
    fn from(user: UserModel) -> Self {
        Self {
            id: user.id,
            full_name: user.full_name,
            username: user.username,
            profile_picture: user.profile_picture,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostPreview {
    pub id: PostId,
    pub content: String,
    pub media_urls: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentPreview {
    pub id: CommentId,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharePreview {
    pub id: ShareId,
    pub content: String,
    pub deleted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryPreview {
    pub id: StoryId,
    pub media_urls: Vec<String>,
}

/// A notification with its actor and referenced content attached. Missing
/// references (deleted since) are left empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationView {
    pub notification: NotificationModel,
    pub from_user: Option<UserSummary>,
    pub post: Option<PostPreview>,
    pub comment: Option<CommentPreview>,
    pub share: Option<SharePreview>,
    pub story: Option<StoryPreview>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPage {
    pub notifications: Vec<NotificationView>,
    pub total: u64,
    pub total_pages: u64,
    pub current_page: u64,
}

#[derive(Clone)]
pub struct NotificationsService {
    db: DatabaseConnection,
    push: Arc<dyn PushChannel>,
    identities: NodeIdentities,
    fanout_concurrency: usize,
    max_page_size: u64,
}

impl NotificationsService {
    pub fn new(db: DatabaseConnection, push: Arc<dyn PushChannel>) -> Self {
        Self {
            identities: NodeIdentities::new(db.clone()),
            db,
            push,
            fanout_concurrency: DEFAULT_FANOUT_CONCURRENCY,
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
        }
    }

    pub fn with_limits(mut self, fanout_concurrency: usize, max_page_size: u64) -> Self {
        self.fanout_concurrency = fanout_concurrency.max(1);
        self.max_page_size = max_page_size.max(1);
        self
    }

    /// Largest page any listing hands out.
    pub fn max_page_size(&self) -> u64 {
        self.max_page_size
    }

    /// Persist a notification for `recipient_id` and try to push it.
    ///
    /// Returns `None` without touching the store when the actor is the
    /// recipient.
    pub async fn _notify(
        &self,
        kind: NotificationKind,
        recipient_id: UserId,
        actor_id: UserId,
        refs: NotificationRefs,
        message: String,
        metadata: serde_json::Value,
    ) -> Result<Option<NotificationModel>, ServiceError> {
        if recipient_id == actor_id {
            debug!(%actor_id, ?kind, "self notification suppressed");
            return Ok(None);
        }

        let notification = NotificationActiveModel {
            id: Set(NotificationId::new()),
            user_id: Set(recipient_id),
            from_user_id: Set(actor_id),
            kind: Set(kind),
            post_id: Set(refs.post_id),
            comment_id: Set(refs.comment_id),
            share_id: Set(refs.share_id),
            story_id: Set(refs.story_id),
            profile: Set(refs.profile),
            message: Set(message),
            is_read: Set(false),
            metadata: Set(metadata),
            created_at: Set(chrono::Utc::now()),
        };

        let notification = Notification::insert(notification)
            .exec_with_returning(&self.db)
            .await?;

        self.push_notification(&notification).await;
        Ok(Some(notification))
    }

    /// Notify every follower of `author_id`, at most `fanout_concurrency` at a
    /// time. One follower failing never stops the others.
    pub async fn _notify_followers(
        &self,
        kind: NotificationKind,
        author_id: UserId,
        refs: NotificationRefs,
        message: String,
        metadata: serde_json::Value,
    ) -> Result<FanoutReport, ServiceError> {
        let followers = store::follower_ids(&self.db, author_id).await?;
        let audience = followers.len();

        let outcomes = stream::iter(followers)
            .map(|follower_id| {
                let refs = refs.clone();
                let message = message.clone();
                let metadata = metadata.clone();
                async move {
                    let outcome = self
                        ._notify(kind, follower_id, author_id, refs, message, metadata)
                        .await;
                    (follower_id, outcome)
                }
            })
            .buffer_unordered(self.fanout_concurrency)
            .collect::<Vec<_>>()
            .await;

        let mut report = FanoutReport::default();
        for (follower_id, outcome) in outcomes {
            match outcome {
                Ok(Some(_)) => report.delivered += 1,
                Ok(None) => report.suppressed += 1,
                Err(error) => {
                    warn!(%follower_id, %author_id, ?kind, %error, "follower notification failed");
                    report.failed += 1;
                }
            }
        }

        info!(
            %author_id,
            ?kind,
            audience,
            delivered = report.delivered,
            failed = report.failed,
            "follower fan-out finished"
        );
        Ok(report)
    }

    /// Turn a social event into notifications.
    ///
    /// Messages are rendered from the actor's display name; an actor that no
    /// longer exists produces nothing.
    pub async fn _dispatch(
        &self,
        actor_id: UserId,
        event: SocialEvent,
    ) -> Result<DispatchOutcome, ServiceError> {
        let kind = event.kind();
        let Some(actor) = User::find_by_id(actor_id).one(&self.db).await? else {
            debug!(%actor_id, ?kind, "actor missing, notification dropped");
            return Ok(DispatchOutcome::Suppressed);
        };

        let message = event.message(&actor.full_name);
        let refs = event.refs();
        let metadata = event.metadata();

        match event.recipient() {
            Some(recipient_id) => {
                let created = self
                    ._notify(kind, recipient_id, actor_id, refs, message, metadata)
                    .await?;
                Ok(created
                    .map(|notification| DispatchOutcome::Created(Box::new(notification)))
                    .unwrap_or(DispatchOutcome::Suppressed))
            }
            None => {
                let report = self
                    ._notify_followers(kind, actor_id, refs, message, metadata)
                    .await?;
                Ok(DispatchOutcome::FannedOut(report))
            }
        }
    }

    /// `_dispatch` for callers whose own writes already went through: a
    /// failure here is logged and dropped.
    pub async fn announce(&self, actor_id: UserId, event: SocialEvent) {
        let kind = event.kind();
        if let Err(error) = self._dispatch(actor_id, event).await {
            warn!(%actor_id, ?kind, %error, "notification dispatch failed");
        }
    }

    async fn push_notification(&self, notification: &NotificationModel) {
        let recipient_id = notification.user_id;

        let view = match self.hydrate(vec![notification.clone()]).await {
            Ok(mut views) => views.pop(),
            Err(error) => {
                warn!(%recipient_id, %error, "could not load notification for push");
                return;
            }
        };
        let Some(view) = view else {
            return;
        };

        let payload = match serde_json::to_value(&view) {
            Ok(payload) => payload,
            Err(error) => {
                warn!(%recipient_id, %error, "could not encode notification for push");
                return;
            }
        };

        match self
            .push
            .emit(recipient_id, NEW_NOTIFICATION_EVENT, payload)
            .await
        {
            Ok(()) => debug!(%recipient_id, "notification pushed"),
            Err(PushError::Offline) => debug!(%recipient_id, "recipient offline, push skipped"),
            Err(error) => warn!(%recipient_id, %error, "notification push failed"),
        }
    }

    /// Attach actors and referenced content, one query per table.
    async fn hydrate(
        &self,
        notifications: Vec<NotificationModel>,
    ) -> Result<Vec<NotificationView>, DbErr> {
        let actor_ids: Vec<UserId> = notifications.iter().map(|n| n.from_user_id).collect();
        let post_ids: Vec<PostId> = notifications.iter().filter_map(|n| n.post_id).collect();
        let comment_ids: Vec<CommentId> =
            notifications.iter().filter_map(|n| n.comment_id).collect();
        let share_ids: Vec<ShareId> = notifications.iter().filter_map(|n| n.share_id).collect();
        let story_ids: Vec<StoryId> = notifications.iter().filter_map(|n| n.story_id).collect();

        let actors: HashMap<UserId, UserSummary> = User::find()
            .filter(UserColumn::Id.is_in(actor_ids))
            .all(&self.db)
            .await?
            .into_iter()
            .map(|user| (user.id, UserSummary::from(user)))
            .collect();

        let posts: HashMap<PostId, PostPreview> = Post::find()
            .filter(PostColumn::Id.is_in(post_ids))
            .all(&self.db)
            .await?
            .into_iter()
            .map(|post| {
                let preview = PostPreview {
                    id: post.id,
                    content: post.content,
                    media_urls: post.media_urls.0,
                };
                (post.id, preview)
            })
            .collect();

        let comments: HashMap<CommentId, CommentPreview> = Comment::find()
            .filter(CommentColumn::Id.is_in(comment_ids))
            .all(&self.db)
            .await?
            .into_iter()
            .map(|comment| {
                let preview = CommentPreview {
                    id: comment.id,
                    content: comment.content,
                };
                (comment.id, preview)
            })
            .collect();

        let shares: HashMap<ShareId, SharePreview> = Share::find()
            .filter(ShareColumn::Id.is_in(share_ids))
            .all(&self.db)
            .await?
            .into_iter()
            .map(|share| {
                let preview = SharePreview {
                    id: share.id,
                    deleted: share.is_tombstoned(),
                    content: share.content,
                };
                (share.id, preview)
            })
            .collect();

        let stories: HashMap<StoryId, StoryPreview> = Story::find()
            .filter(StoryColumn::Id.is_in(story_ids))
            .all(&self.db)
            .await?
            .into_iter()
            .map(|story| {
                let preview = StoryPreview {
                    id: story.id,
                    media_urls: story.media_urls.0,
                };
                (story.id, preview)
            })
            .collect();

        let views = notifications
            .into_iter()
            .map(|notification| NotificationView {
                from_user: actors.get(&notification.from_user_id).cloned(),
                post: notification.post_id.and_then(|id| posts.get(&id).cloned()),
                comment: notification
                    .comment_id
                    .and_then(|id| comments.get(&id).cloned()),
                share: notification.share_id.and_then(|id| shares.get(&id).cloned()),
                story: notification.story_id.and_then(|id| stories.get(&id).cloned()),
                notification,
            })
            .collect();

        Ok(views)
    }

    /// Newest first. `page` starts at 1; `page_size` is capped at the
    /// configured maximum.
    pub async fn _list_notifications(
        &self,
        user_id: UserId,
        page: u64,
        page_size: u64,
    ) -> Result<NotificationPage, ServiceError> {
        let page = page.max(1);
        let page_size = page_size.clamp(1, self.max_page_size);

        let paginator = Notification::find()
            .filter(NotificationColumn::UserId.eq(user_id))
            .order_by_desc(NotificationColumn::CreatedAt)
            .order_by_desc(NotificationColumn::Id)
            .paginate(&self.db, page_size);

        let totals = paginator.num_items_and_pages().await?;
        let notifications = paginator.fetch_page(page - 1).await?;
        let notifications = self.hydrate(notifications).await?;

        Ok(NotificationPage {
            notifications,
            total: totals.number_of_items,
            total_pages: totals.number_of_pages,
            current_page: page,
        })
    }

    pub async fn _unread_count(&self, user_id: UserId) -> Result<u64, ServiceError> {
        let count = Notification::find()
            .filter(NotificationColumn::UserId.eq(user_id))
            .filter(NotificationColumn::IsRead.eq(false))
            .count(&self.db)
            .await?;
        Ok(count)
    }

    async fn owned_notification(
        &self,
        notification_id: NotificationId,
        user_id: UserId,
    ) -> Result<NotificationModel, ServiceError> {
        // A foreign id looks exactly like a missing one
        Notification::find_by_id(notification_id)
            .filter(NotificationColumn::UserId.eq(user_id))
            .one(&self.db)
            .await?
            .ok_or(ServiceError::NotFound(Resource::Notification))
    }

    pub async fn _mark_read(
        &self,
        notification_id: NotificationId,
        user_id: UserId,
    ) -> Result<NotificationModel, ServiceError> {
        let notification = self.owned_notification(notification_id, user_id).await?;
        if notification.is_read {
            return Ok(notification);
        }

        let mut notification: NotificationActiveModel = notification.into();
        notification.is_read = Set(true);
        Ok(notification.update(&self.db).await?)
    }

    /// Attach a live connection for `user_id`. Notifications created while the
    /// receiver is held are pushed to it.
    pub async fn _subscribe(
        &self,
        user_id: UserId,
    ) -> Result<(ConnectionId, PushReceiver), ServiceError> {
        store::require_user(&self.db, user_id).await?;
        let subscription = self.push.register(user_id).await;
        debug!(%user_id, connection_id = ?subscription.0, "push subscription opened");
        Ok(subscription)
    }

    pub async fn _unsubscribe(&self, user_id: UserId, connection_id: ConnectionId) {
        self.push.unregister(user_id, connection_id).await;
    }

    /// Returns how many notifications flipped to read.
    pub async fn _mark_all_read(&self, user_id: UserId) -> Result<u64, ServiceError> {
        let result = Notification::update_many()
            .col_expr(NotificationColumn::IsRead, Expr::value(true))
            .filter(NotificationColumn::UserId.eq(user_id))
            .filter(NotificationColumn::IsRead.eq(false))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected)
    }

    pub async fn _delete_notification(
        &self,
        notification_id: NotificationId,
        user_id: UserId,
    ) -> Result<(), ServiceError> {
        let notification = self.owned_notification(notification_id, user_id).await?;
        notification.delete(&self.db).await?;
        Ok(())
    }
}

#[zel_service(name = "notification")]
trait Notifications {
    #[method(name = "list_notifications")]
    async fn list_notifications(
        &self,
        page: u64,
        page_size: u64,
    ) -> Result<NotificationPage, ResourceError>;

    #[method(name = "unread_count")]
    async fn unread_count(&self) -> Result<u64, ResourceError>;

    #[method(name = "mark_read")]
    async fn mark_read(
        &self,
        notification_id: NotificationId,
    ) -> Result<NotificationModel, ResourceError>;

    #[method(name = "mark_all_read")]
    async fn mark_all_read(&self) -> Result<u64, ResourceError>;

    #[method(name = "delete_notification")]
    async fn delete_notification(&self, notification_id: NotificationId)
        -> Result<(), ResourceError>;
}

#[async_trait]
impl NotificationsServer for NotificationsService {
    async fn list_notifications(
        &self,
        ctx: RequestContext,
        page: u64,
        page_size: u64,
    ) -> Result<NotificationPage, ResourceError> {
        let caller = self.identities.caller(&ctx).await?;
        Ok(self._list_notifications(caller, page, page_size).await?)
    }

    async fn unread_count(&self, ctx: RequestContext) -> Result<u64, ResourceError> {
        let caller = self.identities.caller(&ctx).await?;
        Ok(self._unread_count(caller).await?)
    }

    async fn mark_read(
        &self,
        ctx: RequestContext,
        notification_id: NotificationId,
    ) -> Result<NotificationModel, ResourceError> {
        let caller = self.identities.caller(&ctx).await?;
        Ok(self._mark_read(notification_id, caller).await?)
    }

    async fn mark_all_read(&self, ctx: RequestContext) -> Result<u64, ResourceError> {
        let caller = self.identities.caller(&ctx).await?;
        Ok(self._mark_all_read(caller).await?)
    }

    async fn delete_notification(
        &self,
        ctx: RequestContext,
        notification_id: NotificationId,
    ) -> Result<(), ResourceError> {
        let caller = self.identities.caller(&ctx).await?;
        Ok(self._delete_notification(notification_id, caller).await?)
    }
}
