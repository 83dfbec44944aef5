//! Real-time push channel.
//!
//! Each user may hold any number of live connections. The registry is owned by
//! the process and handed to the notification service; transports call
//! `register` when a client connects and `unregister` when it goes away.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use crate::ids::UserId;

/// Event name used for freshly created notifications.
pub const NEW_NOTIFICATION_EVENT: &str = "new_notification";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushMessage {
    pub event: String,
    pub payload: serde_json::Value,
}

pub type PushSender = mpsc::UnboundedSender<PushMessage>;
pub type PushReceiver = mpsc::UnboundedReceiver<PushMessage>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(Uuid);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PushError {
    #[error("user has no active connection")]
    Offline,
    #[error("every connection for the user was closed")]
    Closed,
}

/// Per-user addressable, fire-and-forget delivery.
#[async_trait]
pub trait PushChannel: Send + Sync {
    /// Attaches a new connection for `user_id`.
    async fn register(&self, user_id: UserId) -> (ConnectionId, PushReceiver);

    /// Detaches one connection. Unknown ids are ignored.
    async fn unregister(&self, user_id: UserId, connection_id: ConnectionId);

    async fn emit(
        &self,
        user_id: UserId,
        event: &str,
        payload: serde_json::Value,
    ) -> Result<(), PushError>;
}

/// In-process registry backed by unbounded channels.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    connections: Arc<RwLock<HashMap<UserId, Vec<(ConnectionId, PushSender)>>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn connection_count(&self, user_id: UserId) -> usize {
        let connections = self.connections.read().await;
        connections.get(&user_id).map(|v| v.len()).unwrap_or(0)
    }

    pub async fn connected_users_count(&self) -> usize {
        self.connections.read().await.len()
    }
}

#[async_trait]
impl PushChannel for ConnectionRegistry {
    async fn register(&self, user_id: UserId) -> (ConnectionId, PushReceiver) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let connection_id = ConnectionId(Uuid::now_v7());

        self.connections
            .write()
            .await
            .entry(user_id)
            .or_default()
            .push((connection_id, sender));

        tracing::debug!(%user_id, "push connection registered");
        (connection_id, receiver)
    }

    async fn unregister(&self, user_id: UserId, connection_id: ConnectionId) {
        let mut connections = self.connections.write().await;
        if let Some(senders) = connections.get_mut(&user_id) {
            senders.retain(|(id, _)| *id != connection_id);
            if senders.is_empty() {
                connections.remove(&user_id);
            }
        }
        tracing::debug!(%user_id, "push connection unregistered");
    }

    async fn emit(
        &self,
        user_id: UserId,
        event: &str,
        payload: serde_json::Value,
    ) -> Result<(), PushError> {
        let mut connections = self.connections.write().await;
        let Some(senders) = connections.get_mut(&user_id) else {
            return Err(PushError::Offline);
        };

        let message = PushMessage {
            event: event.to_string(),
            payload,
        };

        // Closed receivers are dropped here rather than on disconnect
        senders.retain(|(_, sender)| sender.send(message.clone()).is_ok());

        if senders.is_empty() {
            connections.remove(&user_id);
            return Err(PushError::Closed);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn emit_reaches_every_connection_of_the_user() {
        let registry = ConnectionRegistry::new();
        let user = UserId::new();

        let (_, mut first) = registry.register(user).await;
        let (_, mut second) = registry.register(user).await;

        registry
            .emit(user, NEW_NOTIFICATION_EVENT, json!({ "n": 1 }))
            .await
            .unwrap();

        assert_eq!(first.recv().await.unwrap().payload, json!({ "n": 1 }));
        assert_eq!(second.recv().await.unwrap().event, NEW_NOTIFICATION_EVENT);
    }

    #[tokio::test]
    async fn emit_to_offline_user_fails_softly() {
        let registry = ConnectionRegistry::new();

        let result = registry.emit(UserId::new(), "x", json!(null)).await;
        assert_eq!(result, Err(PushError::Offline));
    }

    #[tokio::test]
    async fn closed_connections_are_pruned() {
        let registry = ConnectionRegistry::new();
        let user = UserId::new();

        let (_, receiver) = registry.register(user).await;
        drop(receiver);

        let result = registry.emit(user, "x", json!(null)).await;
        assert_eq!(result, Err(PushError::Closed));
        assert_eq!(registry.connection_count(user).await, 0);
    }

    #[tokio::test]
    async fn unregister_removes_only_that_connection() {
        let registry = ConnectionRegistry::new();
        let user = UserId::new();

        let (first_id, _first) = registry.register(user).await;
        let (_, _second) = registry.register(user).await;
        registry.unregister(user, first_id).await;

        assert_eq!(registry.connection_count(user).await, 1);
        assert_eq!(registry.connected_users_count().await, 1);
    }
}
