use sea_orm::DatabaseConnection;
use tracing::info;
use zel_core::prelude::*;

use crate::{
    entity::prelude::*,
    error::{ServiceError, ValidationError},
    ids::{StoryId, UserId},
    service::{
        identities::NodeIdentities,
        notifications::{NotificationsService, SocialEvent},
    },
    store,
};

#[derive(Clone)]
pub struct StoriesService {
    db: DatabaseConnection,
    notifications: NotificationsService,
    identities: NodeIdentities,
}

impl StoriesService {
    pub fn new(db: DatabaseConnection, notifications: NotificationsService) -> Self {
        Self {
            identities: NodeIdentities::new(db.clone()),
            db,
            notifications,
        }
    }

    /// Publish a story and tell the author's followers
    pub async fn _create_story(
        &self,
        author_id: UserId,
        content: String,
        media_urls: Vec<String>,
    ) -> Result<StoryModel, ServiceError> {
        if content.trim().is_empty() && media_urls.is_empty() {
            return Err(ValidationError::EmptyContent.into());
        }

        store::require_user(&self.db, author_id).await?;

        let story = StoryActiveModel {
            id: Set(StoryId::new()),
            user_id: Set(author_id),
            content: Set(content),
            media_urls: Set(MediaUrls(media_urls)),
            created_at: Set(chrono::Utc::now()),
        };
        let story = Story::insert(story).exec_with_returning(&self.db).await?;
        info!(story_id = %story.id, %author_id, "story created");

        self.notifications
            .announce(author_id, SocialEvent::NewStory { story_id: story.id })
            .await;

        Ok(story)
    }

    pub async fn _get_story(&self, story_id: StoryId) -> Result<StoryModel, ServiceError> {
        store::require_story(&self.db, story_id).await
    }

    pub async fn _list_stories_by_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<StoryModel>, ServiceError> {
        let stories = Story::find()
            .filter(StoryColumn::UserId.eq(user_id))
            .order_by_desc(StoryColumn::CreatedAt)
            .order_by_desc(StoryColumn::Id)
            .all(&self.db)
            .await?;
        Ok(stories)
    }
}

#[zel_service(name = "story")]
trait Stories {
    #[method(name = "create_story")]
    async fn create_story(
        &self,
        content: String,
        media_urls: Vec<String>,
    ) -> Result<StoryModel, ResourceError>;

    #[method(name = "get_story")]
    async fn get_story(&self, story_id: StoryId) -> Result<StoryModel, ResourceError>;

    #[method(name = "list_stories_by_user")]
    async fn list_stories_by_user(&self, user_id: UserId)
        -> Result<Vec<StoryModel>, ResourceError>;
}

#[async_trait]
impl StoriesServer for StoriesService {
    async fn create_story(
        &self,
        ctx: RequestContext,
        content: String,
        media_urls: Vec<String>,
    ) -> Result<StoryModel, ResourceError> {
        let caller = self.identities.caller(&ctx).await?;
        Ok(self._create_story(caller, content, media_urls).await?)
    }

    async fn get_story(&self, _ctx: RequestContext, story_id: StoryId) -> Result<StoryModel, ResourceError> {
        Ok(self._get_story(story_id).await?)
    }

    async fn list_stories_by_user(
        &self,
        _ctx: RequestContext,
        user_id: UserId,
    ) -> Result<Vec<StoryModel>, ResourceError> {
        Ok(self._list_stories_by_user(user_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Resource;
    use crate::test_utils::{
        create_test_db, create_test_user, follow, notifications_for, recording_notifications,
    };

    #[tokio::test]
    async fn test_story_fans_out_new_story() {
        let db = create_test_db().await;
        let (notifications, channel) = recording_notifications(&db);
        let service = StoriesService::new(db.clone(), notifications);
        let author = create_test_user(&db, "author").await;
        let follower = create_test_user(&db, "follower").await;
        follow(&db, follower, author).await;

        let story = service
            ._create_story(author, String::new(), vec!["https://cdn/s.jpg".into()])
            .await
            .unwrap();

        let received = notifications_for(&db, follower).await;
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].kind, NotificationKind::NewStory);
        assert_eq!(received[0].story_id, Some(story.id));

        let pushes = channel.pushes_to(follower);
        assert_eq!(pushes.len(), 1);
        assert_eq!(
            pushes[0].payload["story"]["media_urls"][0],
            serde_json::json!("https://cdn/s.jpg")
        );
    }

    #[tokio::test]
    async fn test_get_story() {
        let db = create_test_db().await;
        let (notifications, _channel) = recording_notifications(&db);
        let service = StoriesService::new(db.clone(), notifications);
        let author = create_test_user(&db, "author").await;

        let story = service
            ._create_story(author, "today".into(), vec![])
            .await
            .unwrap();

        assert_eq!(service._get_story(story.id).await.unwrap(), story);
        assert_eq!(service._list_stories_by_user(author).await.unwrap().len(), 1);
        assert!(matches!(
            service._get_story(StoryId::new()).await,
            Err(ServiceError::NotFound(Resource::Story))
        ));
    }
}
