use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;
use zel_core::prelude::*;

use crate::{
    entity::prelude::*,
    error::{ServiceError, ValidationError},
    ids::{PostId, UserId},
    service::{
        identities::NodeIdentities,
        notifications::{NotificationsService, SocialEvent},
        shares::SharesService,
    },
    store::{self, LikeToggle},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostView {
    pub post: PostModel,
    pub like_count: u64,
}

#[derive(Clone)]
pub struct PostsService {
    db: DatabaseConnection,
    notifications: NotificationsService,
    shares: SharesService,
    identities: NodeIdentities,
}

impl PostsService {
    pub fn new(
        db: DatabaseConnection,
        notifications: NotificationsService,
        shares: SharesService,
    ) -> Self {
        Self {
            identities: NodeIdentities::new(db.clone()),
            db,
            notifications,
            shares,
        }
    }

    fn page_limit(&self, limit: u64) -> u64 {
        limit.clamp(1, self.notifications.max_page_size())
    }

    /// Create a new post and tell the author's followers
    pub async fn _create_post(
        &self,
        author_id: UserId,
        content: String,
        media_urls: Vec<String>,
    ) -> Result<PostModel, ServiceError> {
        if content.trim().is_empty() && media_urls.is_empty() {
            return Err(ValidationError::EmptyContent.into());
        }

        store::require_user(&self.db, author_id).await?;

        let now = chrono::Utc::now();
        let post = PostActiveModel {
            id: Set(PostId::new()),
            user_id: Set(author_id),
            content: Set(content),
            media_urls: Set(MediaUrls(media_urls)),
            comment_count: Set(0),
            share_count: Set(0),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let post = Post::insert(post).exec_with_returning(&self.db).await?;
        info!(post_id = %post.id, %author_id, "post created");

        self.notifications
            .announce(author_id, SocialEvent::NewPost { post_id: post.id })
            .await;

        Ok(post)
    }

    /// Get a specific post by ID
    pub async fn _get_post(&self, post_id: PostId) -> Result<PostView, ServiceError> {
        let post = store::require_post(&self.db, post_id).await?;
        let like_count = store::like_count(&self.db, LikeTarget::Post(post_id)).await?;
        Ok(PostView { post, like_count })
    }

    /// Every post, newest first
    pub async fn _list_feed(&self, limit: u64, offset: u64) -> Result<Vec<PostModel>, ServiceError> {
        let limit = self.page_limit(limit);
        let posts = Post::find()
            .order_by_desc(PostColumn::CreatedAt)
            .order_by_desc(PostColumn::Id)
            .limit(limit)
            .offset(offset)
            .all(&self.db)
            .await?;

        Ok(posts)
    }

    /// Posts by a specific user, newest first
    pub async fn _list_posts_by_user(
        &self,
        user_id: UserId,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<PostModel>, ServiceError> {
        let limit = self.page_limit(limit);
        let posts = Post::find()
            .filter(PostColumn::UserId.eq(user_id))
            .order_by_desc(PostColumn::CreatedAt)
            .order_by_desc(PostColumn::Id)
            .limit(limit)
            .offset(offset)
            .all(&self.db)
            .await?;

        Ok(posts)
    }

    /// Update a post (only by author)
    pub async fn _update_post(
        &self,
        post_id: PostId,
        user_id: UserId,
        content: Option<String>,
        media_urls: Option<Vec<String>>,
    ) -> Result<PostModel, ServiceError> {
        let post = store::require_post(&self.db, post_id).await?;

        if post.user_id != user_id {
            return Err(ServiceError::Unauthorized("edit this post"));
        }

        // Only update fields that were provided
        let mut post_active: PostActiveModel = post.into();

        if let Some(new_content) = content {
            post_active.content = Set(new_content);
        }

        if let Some(new_media_urls) = media_urls {
            post_active.media_urls = Set(MediaUrls(new_media_urls));
        }

        post_active.updated_at = Set(chrono::Utc::now());

        let updated = post_active.update(&self.db).await?;
        Ok(updated)
    }

    /// Delete a post (only by author).
    ///
    /// Shares of the post are tombstoned first, then the post's comments and
    /// like-sets go with it.
    pub async fn _delete_post(&self, post_id: PostId, user_id: UserId) -> Result<(), ServiceError> {
        let post = store::require_post(&self.db, post_id).await?;

        if post.user_id != user_id {
            return Err(ServiceError::Unauthorized("delete this post"));
        }

        self.shares._handle_original_post_deleted(post_id).await?;

        let comment_ids: Vec<Uuid> = Comment::find()
            .filter(CommentParent::Post(post_id).comments_condition())
            .all(&self.db)
            .await?
            .into_iter()
            .map(|comment| comment.id.into_uuid())
            .collect();

        // Cascaded replies are not reported in rows_affected; count from the scan.
        let comments_removed = comment_ids.len();
        Comment::delete_many()
            .filter(CommentParent::Post(post_id).comments_condition())
            .exec(&self.db)
            .await?;
        post.delete(&self.db).await?;

        store::sweep_likes(&self.db, LikeKind::Comment, comment_ids).await;
        store::sweep_likes(&self.db, LikeKind::Post, vec![post_id.into_uuid()]).await;
        info!(%post_id, comments_removed, "post deleted");

        Ok(())
    }

    pub async fn _toggle_like_post(
        &self,
        post_id: PostId,
        user_id: UserId,
    ) -> Result<LikeToggle, ServiceError> {
        let post = store::require_post(&self.db, post_id).await?;
        store::require_user(&self.db, user_id).await?;

        let toggle = store::toggle_like(&self.db, LikeTarget::Post(post_id), user_id).await?;
        if toggle == LikeToggle::Liked {
            self.notifications
                .announce(
                    user_id,
                    SocialEvent::LikePost {
                        post_id,
                        owner: post.user_id,
                    },
                )
                .await;
        }

        Ok(toggle)
    }

    /// Users who liked a post, earliest first
    pub async fn _list_likers(&self, post_id: PostId) -> Result<Vec<UserId>, ServiceError> {
        store::require_post(&self.db, post_id).await?;
        Ok(store::likers(&self.db, LikeTarget::Post(post_id)).await?)
    }
}

#[zel_service(name = "post")]
trait Posts {
    #[method(name = "create_post")]
    async fn create_post(
        &self,
        content: String,
        media_urls: Vec<String>,
    ) -> Result<PostModel, ResourceError>;

    #[method(name = "get_post")]
    async fn get_post(&self, post_id: PostId) -> Result<PostView, ResourceError>;

    #[method(name = "list_feed")]
    async fn list_feed(&self, limit: u64, offset: u64) -> Result<Vec<PostModel>, ResourceError>;

    #[method(name = "list_posts_by_user")]
    async fn list_posts_by_user(
        &self,
        user_id: UserId,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<PostModel>, ResourceError>;

    #[method(name = "update_post")]
    async fn update_post(
        &self,
        post_id: PostId,
        content: Option<String>,
        media_urls: Option<Vec<String>>,
    ) -> Result<PostModel, ResourceError>;

    #[method(name = "delete_post")]
    async fn delete_post(&self, post_id: PostId) -> Result<(), ResourceError>;

    #[method(name = "toggle_like_post")]
    async fn toggle_like_post(&self, post_id: PostId) -> Result<LikeToggle, ResourceError>;

    #[method(name = "list_likers")]
    async fn list_likers(&self, post_id: PostId) -> Result<Vec<UserId>, ResourceError>;
}

#[async_trait]
impl PostsServer for PostsService {
    async fn create_post(
        &self,
        ctx: RequestContext,
        content: String,
        media_urls: Vec<String>,
    ) -> Result<PostModel, ResourceError> {
        let caller = self.identities.caller(&ctx).await?;
        Ok(self._create_post(caller, content, media_urls).await?)
    }

    async fn get_post(&self, _ctx: RequestContext, post_id: PostId) -> Result<PostView, ResourceError> {
        Ok(self._get_post(post_id).await?)
    }

    async fn list_feed(
        &self,
        _ctx: RequestContext,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<PostModel>, ResourceError> {
        Ok(self._list_feed(limit, offset).await?)
    }

    async fn list_posts_by_user(
        &self,
        _ctx: RequestContext,
        user_id: UserId,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<PostModel>, ResourceError> {
        Ok(self._list_posts_by_user(user_id, limit, offset).await?)
    }

    async fn update_post(
        &self,
        ctx: RequestContext,
        post_id: PostId,
        content: Option<String>,
        media_urls: Option<Vec<String>>,
    ) -> Result<PostModel, ResourceError> {
        let caller = self.identities.caller(&ctx).await?;
        Ok(self._update_post(post_id, caller, content, media_urls).await?)
    }

    async fn delete_post(&self, ctx: RequestContext, post_id: PostId) -> Result<(), ResourceError> {
        let caller = self.identities.caller(&ctx).await?;
        Ok(self._delete_post(post_id, caller).await?)
    }

    async fn toggle_like_post(
        &self,
        ctx: RequestContext,
        post_id: PostId,
    ) -> Result<LikeToggle, ResourceError> {
        let caller = self.identities.caller(&ctx).await?;
        Ok(self._toggle_like_post(post_id, caller).await?)
    }

    async fn list_likers(
        &self,
        _ctx: RequestContext,
        post_id: PostId,
    ) -> Result<Vec<UserId>, ResourceError> {
        Ok(self._list_likers(post_id).await?)
    }
}
