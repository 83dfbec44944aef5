pub mod entity;
pub mod ids;
pub mod models;

use std::{sync::Arc, time::Duration};

use sea_orm::DatabaseConnection;
use tracing::info;
use zel_core::{prelude::RpcServerBuilder, IrohBundle};

use crate::{
    error::ServiceError,
    ids::UserId,
    realtime::{ConnectionId, ConnectionRegistry, PushReceiver},
    service::{
        comments::{CommentsServer, CommentsService, CounterRepair},
        notifications::{NotificationsServer, NotificationsService},
        posts::{PostsServer, PostsService},
        shares::{SharesServer, SharesService},
        stories::{StoriesServer, StoriesService},
        users::{UsersServer, UsersService},
    },
};

pub mod service;

pub mod error;

pub mod config;

pub mod realtime;

pub mod store;

pub mod telemetry;

#[cfg(test)]
pub(crate) mod test_utils;

static ALPN: &[u8] = b"feed::0.1.0";

/// Main runtime handle for the feed.
pub struct FeedCore {
    pub config: config::FeedConfig,

    /// Server bundle that accepts inbound RPC traffic.
    pub server: IrohBundle,

    pub db: DatabaseConnection,

    /// Live push connections, keyed by user. Nothing registers on its own:
    /// the embedding transport opens one with `subscribe` per connected client.
    pub push: ConnectionRegistry,

    pub comments: CommentsService,
    pub shares: SharesService,
    pub notifications: NotificationsService,
}

impl FeedCore {
    /// Start with the config from the platform data directory.
    pub async fn start() -> Result<Self, Box<dyn std::error::Error>> {
        let config = config::get_or_init().await?;
        Self::start_with(config).await
    }

    pub async fn start_with(
        config: config::FeedConfig,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        telemetry::init(&config.log_filter);

        // DB + migrations
        let db = models::open_or_create_db(&config).await?;
        models::migrate_up(&db).await?;

        let push = ConnectionRegistry::new();
        let notifications = NotificationsService::new(db.clone(), Arc::new(push.clone()))
            .with_limits(config.fanout_concurrency, config.max_page_size);
        let comments = CommentsService::new(db.clone(), notifications.clone());
        let shares = SharesService::new(db.clone(), notifications.clone());
        let posts = PostsService::new(db.clone(), notifications.clone(), shares.clone());
        let users = UsersService::new(db.clone(), notifications.clone());
        let stories = StoriesService::new(db.clone(), notifications.clone());

        // ----------------
        // Server endpoint
        // ----------------
        let mut server_builder = IrohBundle::builder(Some(config.secret_key.clone())).await?;
        let server_endpoint = server_builder.endpoint().clone();

        // Register RPC servers
        let rpc_server_builder = RpcServerBuilder::new(ALPN, server_endpoint.clone());

        let rpc_server_builder = users.register_service(rpc_server_builder);
        let rpc_server_builder = posts.register_service(rpc_server_builder);
        let rpc_server_builder = comments.clone().register_service(rpc_server_builder);
        let rpc_server_builder = shares.clone().register_service(rpc_server_builder);
        let rpc_server_builder = stories.register_service(rpc_server_builder);
        let rpc_server_builder = notifications.clone().register_service(rpc_server_builder);

        let rpc_server = rpc_server_builder.build();

        let server = server_builder.accept(ALPN, rpc_server).finish().await;

        server.wait_online().await;
        info!(node_id = %config.secret_key.public(), "feed core online");

        Ok(Self {
            config,
            server,
            db,
            push,
            comments,
            shares,
            notifications,
        })
    }

    /// Open a push subscription for `user_id`. New notifications for that user
    /// arrive on the receiver until `unsubscribe` is called or it is dropped.
    pub async fn subscribe(
        &self,
        user_id: UserId,
    ) -> Result<(ConnectionId, PushReceiver), ServiceError> {
        self.notifications._subscribe(user_id).await
    }

    pub async fn unsubscribe(&self, user_id: UserId, connection_id: ConnectionId) {
        self.notifications._unsubscribe(user_id, connection_id).await
    }

    /// Recompute every comment and share counter from the rows themselves.
    pub async fn repair_counters(&self) -> Result<(CounterRepair, CounterRepair), ServiceError> {
        let comments = self.comments._repair_comment_counters().await?;
        let shares = self.shares._repair_share_counters().await?;
        Ok((comments, shares))
    }

    pub async fn shutdown(self) -> Result<(), Box<dyn std::error::Error>> {
        // Shutdown server bundle
        self.server.shutdown(Duration::from_secs(5)).await?;
        self.db.close().await?;
        info!("feed core stopped");
        Ok(())
    }
}

pub mod prelude {
    pub use super::ids;
    pub use super::entity;
    pub use super::models;

    pub use super::service;

    pub use super::error;

    pub use super::config;

    pub use super::realtime::{
        ConnectionId, ConnectionRegistry, PushChannel, PushMessage, PushReceiver,
    };

    pub use super::FeedCore;

    pub use zel_core;
}
