use async_trait::async_trait;
use sea_orm::DatabaseConnection;
use tracing::info;
use zel_core::prelude::RequestContext;

use crate::{
    entity::prelude::*,
    error::{Resource, ServiceError},
    ids::UserId,
    store,
};

/// Turns a caller credential into the user it speaks for.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, credential: &[u8]) -> Result<UserId, ServiceError>;
}

/// Resolves callers by their iroh node key.
///
/// A node key is bound to exactly one user through the `identity` table; an
/// unbound key is `Unauthenticated`.
#[derive(Clone)]
pub struct NodeIdentities {
    db: DatabaseConnection,
}

impl NodeIdentities {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Binds `node_id` to `user_id`, replacing any previous binding of that key.
    pub async fn _link_identity(
        &self,
        node_id: &[u8],
        user_id: UserId,
    ) -> Result<IdentityModel, ServiceError> {
        store::require_user(&self.db, user_id).await?;

        Identity::delete_many()
            .filter(IdentityColumn::NodeId.eq(node_id.to_vec()))
            .exec(&self.db)
            .await?;

        let identity = IdentityActiveModel::binding(node_id, user_id);
        let identity = Identity::insert(identity)
            .exec_with_returning(&self.db)
            .await?;

        info!(%user_id, "node identity linked");
        Ok(identity)
    }

    /// The user behind the connection a request arrived on.
    pub async fn caller(&self, ctx: &RequestContext) -> Result<UserId, ServiceError> {
        let node_id = ctx.connection().remote_id();
        self.verify(node_id.as_bytes()).await
    }

    pub async fn _identities_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<IdentityModel>, ServiceError> {
        let identities = Identity::find()
            .filter(IdentityColumn::UserId.eq(user_id))
            .all(&self.db)
            .await?;
        Ok(identities)
    }
}

#[async_trait]
impl IdentityVerifier for NodeIdentities {
    async fn verify(&self, credential: &[u8]) -> Result<UserId, ServiceError> {
        let identity = Identity::find_by_id(credential.to_vec())
            .one(&self.db)
            .await?
            .ok_or(ServiceError::Unauthenticated)?;

        // The row can outlive its user only if foreign keys were off when the
        // user went away
        User::find_by_id(identity.user_id)
            .one(&self.db)
            .await?
            .ok_or(ServiceError::NotFound(Resource::User))?;

        Ok(identity.user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::migrator::Migrator;
    use sea_orm_migration::MigratorTrait;

    async fn setup_test_identities() -> NodeIdentities {
        let db = Database::connect("sqlite::memory:")
            .await
            .expect("Failed to create in-memory database");

        Migrator::up(&db, None)
            .await
            .expect("Failed to run migrations");

        NodeIdentities::new(db)
    }

    async fn create_test_user(identities: &NodeIdentities) -> UserId {
        let user_id = UserId::new();
        let user = UserActiveModel {
            id: Set(user_id),
            full_name: Set("Node Owner".to_string()),
            username: Set(format!("owner_{user_id}")),
            profile_picture: Set(None),
            created_at: Set(chrono::Utc::now()),
        };
        User::insert(user).exec(&identities.db).await.unwrap();
        user_id
    }

    #[tokio::test]
    async fn linked_key_verifies_as_its_user() {
        let identities = setup_test_identities().await;
        let user_id = create_test_user(&identities).await;
        let node_key = [7u8; 32];

        identities._link_identity(&node_key, user_id).await.unwrap();

        assert_eq!(identities.verify(&node_key).await.unwrap(), user_id);
    }

    #[tokio::test]
    async fn unknown_key_is_unauthenticated() {
        let identities = setup_test_identities().await;

        let result = identities.verify(&[1u8; 32]).await;
        assert!(matches!(result, Err(ServiceError::Unauthenticated)));
    }

    #[tokio::test]
    async fn relinking_moves_the_key() {
        let identities = setup_test_identities().await;
        let first = create_test_user(&identities).await;
        let second = create_test_user(&identities).await;
        let node_key = [9u8; 32];

        identities._link_identity(&node_key, first).await.unwrap();
        identities._link_identity(&node_key, second).await.unwrap();

        assert_eq!(identities.verify(&node_key).await.unwrap(), second);
        assert!(identities
            ._identities_for_user(first)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn linking_requires_an_existing_user() {
        let identities = setup_test_identities().await;

        let result = identities._link_identity(&[3u8; 32], UserId::new()).await;
        assert!(matches!(result, Err(ServiceError::NotFound(Resource::User))));
    }
}
