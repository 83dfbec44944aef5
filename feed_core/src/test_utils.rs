use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sea_orm_migration::MigratorTrait;

use crate::{
    entity::prelude::*,
    ids::{PostId, ShareId, UserId},
    models::migrator::Migrator,
    realtime::{ConnectionId, PushChannel, PushError, PushReceiver},
    service::notifications::NotificationsService,
};

/// Create a fresh in-memory SQLite database with every migration applied.
///
/// Each call is an isolated database; sea-orm keeps a single connection for
/// `sqlite::memory:` so the schema is visible to every query in the test.
pub async fn create_test_db() -> DatabaseConnection {
    let db = Database::connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory database");

    Migrator::up(&db, None)
        .await
        .expect("Failed to run migrations");

    db
}

/// Insert a user whose display name is `username` capitalised.
pub async fn create_test_user(db: &DatabaseConnection, username: &str) -> UserId {
    let user_id = UserId::new();
    let mut full_name = username.to_string();
    if let Some(first) = full_name.get_mut(0..1) {
        first.make_ascii_uppercase();
    }

    let user = UserActiveModel {
        id: Set(user_id),
        full_name: Set(full_name),
        username: Set(username.to_string()),
        profile_picture: Set(None),
        created_at: Set(chrono::Utc::now()),
    };
    User::insert(user)
        .exec(db)
        .await
        .expect("Failed to insert user");
    user_id
}

/// Insert a follow edge `follower -> followee` directly.
pub async fn follow(db: &DatabaseConnection, follower: UserId, followee: UserId) {
    let edge = FollowActiveModel {
        follower_id: Set(follower),
        followee_id: Set(followee),
        created_at: Set(chrono::Utc::now()),
    };
    Follow::insert(edge)
        .exec(db)
        .await
        .expect("Failed to insert follow edge");
}

/// Insert a post by `author` with zeroed counters.
pub async fn create_test_post(db: &DatabaseConnection, author: UserId) -> PostId {
    let post_id = PostId::new();
    let now = chrono::Utc::now();
    let post = PostActiveModel {
        id: Set(post_id),
        user_id: Set(author),
        content: Set(format!("post {post_id}")),
        media_urls: Set(MediaUrls::default()),
        comment_count: Set(0),
        share_count: Set(0),
        created_at: Set(now),
        updated_at: Set(now),
    };
    Post::insert(post)
        .exec(db)
        .await
        .expect("Failed to insert post");
    post_id
}

/// Insert a live share of `post_id` by `author` without touching counters.
pub async fn create_test_share(db: &DatabaseConnection, author: UserId, post_id: PostId) -> ShareId {
    let share_id = ShareId::new();
    let now = chrono::Utc::now();
    let share = ShareActiveModel {
        id: Set(share_id),
        user_id: Set(author),
        content: Set(String::new()),
        shared_post_id: Set(Some(post_id)),
        deleted: Set(false),
        deleted_message: Set(None),
        comment_count: Set(0),
        share_count: Set(0),
        created_at: Set(now),
        updated_at: Set(now),
    };
    Share::insert(share)
        .exec(db)
        .await
        .expect("Failed to insert share");
    share_id
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedPush {
    pub user_id: UserId,
    pub event: String,
    pub payload: serde_json::Value,
}

/// Push channel that records every emit and treats every user as online.
#[derive(Clone, Default)]
pub struct RecordingChannel {
    pushes: Arc<Mutex<Vec<RecordedPush>>>,
}

impl RecordingChannel {
    pub fn pushes(&self) -> Vec<RecordedPush> {
        self.pushes.lock().unwrap().clone()
    }

    pub fn pushes_to(&self, user_id: UserId) -> Vec<RecordedPush> {
        self.pushes()
            .into_iter()
            .filter(|push| push.user_id == user_id)
            .collect()
    }
}

#[async_trait]
impl PushChannel for RecordingChannel {
    async fn register(&self, _user_id: UserId) -> (ConnectionId, PushReceiver) {
        unimplemented!("recording channel does not hand out connections")
    }

    async fn unregister(&self, _user_id: UserId, _connection_id: ConnectionId) {}

    async fn emit(
        &self,
        user_id: UserId,
        event: &str,
        payload: serde_json::Value,
    ) -> Result<(), PushError> {
        self.pushes.lock().unwrap().push(RecordedPush {
            user_id,
            event: event.to_string(),
            payload,
        });
        Ok(())
    }
}

/// Notification service over `db` wired to a fresh recording channel.
pub fn recording_notifications(db: &DatabaseConnection) -> (NotificationsService, RecordingChannel) {
    let channel = RecordingChannel::default();
    let service = NotificationsService::new(db.clone(), Arc::new(channel.clone()));
    (service, channel)
}

/// Every notification row addressed to `user_id`, oldest first.
pub async fn notifications_for(db: &DatabaseConnection, user_id: UserId) -> Vec<NotificationModel> {
    Notification::find()
        .filter(NotificationColumn::UserId.eq(user_id))
        .order_by_asc(NotificationColumn::CreatedAt)
        .all(db)
        .await
        .expect("Failed to list notifications")
}
