use std::collections::HashMap;

use sea_orm::{DatabaseConnection, SqlErr, TransactionTrait};
use serde::{Deserialize, Serialize};
use tracing::info;
use zel_core::prelude::*;

use crate::{
    entity::prelude::*,
    error::{ServiceError, ValidationError},
    ids::UserId,
    service::{
        identities::NodeIdentities,
        notifications::{NotificationsService, SocialEvent, UserSummary},
    },
    store,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user: UserModel,
    pub followers: u64,
    pub following: u64,
}

#[derive(Clone)]
pub struct UsersService {
    db: DatabaseConnection,
    notifications: NotificationsService,
    identities: NodeIdentities,
}

fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

async fn insert_user<C: ConnectionTrait>(
    db: &C,
    full_name: String,
    username: String,
) -> Result<UserModel, ServiceError> {
    if full_name.trim().is_empty() || username.trim().is_empty() {
        return Err(ValidationError::EmptyContent.into());
    }

    let taken = User::find()
        .filter(UserColumn::Username.eq(username.as_str()))
        .count(db)
        .await?;
    if taken > 0 {
        return Err(ValidationError::UsernameTaken.into());
    }

    let user = UserActiveModel {
        id: Set(UserId::new()),
        full_name: Set(full_name),
        username: Set(username),
        profile_picture: Set(None),
        created_at: Set(chrono::Utc::now()),
    };

    match User::insert(user).exec_with_returning(db).await {
        Ok(user) => Ok(user),
        Err(err) if is_unique_violation(&err) => Err(ValidationError::UsernameTaken.into()),
        Err(err) => Err(err.into()),
    }
}

impl UsersService {
    pub fn new(db: DatabaseConnection, notifications: NotificationsService) -> Self {
        Self {
            identities: NodeIdentities::new(db.clone()),
            db,
            notifications,
        }
    }

    pub async fn _create_user(
        &self,
        full_name: String,
        username: String,
    ) -> Result<UserModel, ServiceError> {
        let user = insert_user(&self.db, full_name, username).await?;
        info!(user_id = %user.id, "user created");
        Ok(user)
    }

    /// Create a user and bind `node_id` to it in one transaction.
    pub async fn _create_user_for_node(
        &self,
        node_id: &[u8],
        full_name: String,
        username: String,
    ) -> Result<UserModel, ServiceError> {
        let txn = self.db.begin().await?;

        let user = insert_user(&txn, full_name, username).await?;

        Identity::delete_many()
            .filter(IdentityColumn::NodeId.eq(node_id.to_vec()))
            .exec(&txn)
            .await?;
        let identity = IdentityActiveModel::binding(node_id, user.id);
        Identity::insert(identity).exec(&txn).await?;

        txn.commit().await?;

        info!(user_id = %user.id, "user created for node");
        Ok(user)
    }

    pub async fn _link_identity(
        &self,
        node_id: &[u8],
        user_id: UserId,
    ) -> Result<IdentityModel, ServiceError> {
        self.identities._link_identity(node_id, user_id).await
    }

    pub async fn _get_user(&self, user_id: UserId) -> Result<UserProfile, ServiceError> {
        let user = store::require_user(&self.db, user_id).await?;

        let followers = Follow::find()
            .filter(FollowColumn::FolloweeId.eq(user_id))
            .count(&self.db)
            .await?;
        let following = Follow::find()
            .filter(FollowColumn::FollowerId.eq(user_id))
            .count(&self.db)
            .await?;

        Ok(UserProfile {
            user,
            followers,
            following,
        })
    }

    pub async fn _follow(
        &self,
        follower_id: UserId,
        followee_id: UserId,
    ) -> Result<FollowModel, ServiceError> {
        if follower_id == followee_id {
            return Err(ValidationError::SelfFollow.into());
        }

        store::require_user(&self.db, follower_id).await?;
        store::require_user(&self.db, followee_id).await?;

        let existing = Follow::find_by_id((follower_id, followee_id))
            .one(&self.db)
            .await?;
        if existing.is_some() {
            return Err(ValidationError::AlreadyFollowing.into());
        }

        let edge = FollowActiveModel {
            follower_id: Set(follower_id),
            followee_id: Set(followee_id),
            created_at: Set(chrono::Utc::now()),
        };
        let edge = match Follow::insert(edge).exec_with_returning(&self.db).await {
            Ok(edge) => edge,
            Err(err) if is_unique_violation(&err) => {
                return Err(ValidationError::AlreadyFollowing.into());
            }
            Err(err) => return Err(err.into()),
        };

        info!(%follower_id, %followee_id, "follow edge created");
        self.notifications
            .announce(
                follower_id,
                SocialEvent::Follow {
                    followee: followee_id,
                },
            )
            .await;

        Ok(edge)
    }

    /// Returns whether an edge was removed.
    pub async fn _unfollow(
        &self,
        follower_id: UserId,
        followee_id: UserId,
    ) -> Result<bool, ServiceError> {
        let result = Follow::delete_by_id((follower_id, followee_id))
            .exec(&self.db)
            .await?;

        if result.rows_affected > 0 {
            info!(%follower_id, %followee_id, "follow edge removed");
        }
        Ok(result.rows_affected > 0)
    }

    pub async fn _followers(&self, user_id: UserId) -> Result<Vec<UserSummary>, ServiceError> {
        store::require_user(&self.db, user_id).await?;
        let ids = store::follower_ids(&self.db, user_id).await?;
        self.summaries(ids).await
    }

    pub async fn _following(&self, user_id: UserId) -> Result<Vec<UserSummary>, ServiceError> {
        store::require_user(&self.db, user_id).await?;
        let ids = store::following_ids(&self.db, user_id).await?;
        self.summaries(ids).await
    }

    /// Summaries in the order of `ids`.
    async fn summaries(&self, ids: Vec<UserId>) -> Result<Vec<UserSummary>, ServiceError> {
        let mut users: HashMap<UserId, UserModel> = User::find()
            .filter(UserColumn::Id.is_in(ids.clone()))
            .all(&self.db)
            .await?
            .into_iter()
            .map(|user| (user.id, user))
            .collect();

        Ok(ids
            .into_iter()
            .filter_map(|id| users.remove(&id))
            .map(UserSummary::from)
            .collect())
    }

    /// Store a new profile picture URL and tell the user's followers.
    pub async fn _change_profile_picture(
        &self,
        user_id: UserId,
        profile_picture: String,
    ) -> Result<UserModel, ServiceError> {
        let user = store::require_user(&self.db, user_id).await?;

        let mut user: UserActiveModel = user.into();
        user.profile_picture = Set(Some(profile_picture.clone()));
        let user = user.update(&self.db).await?;

        info!(%user_id, "profile picture changed");
        self.notifications
            .announce(user_id, SocialEvent::ChangeProfile { profile_picture })
            .await;

        Ok(user)
    }
}

#[zel_service(name = "user")]
trait Users {
    /// Creates a user and binds the calling node to it.
    #[method(name = "create_user")]
    async fn create_user(
        &self,
        full_name: String,
        username: String,
    ) -> Result<UserModel, ResourceError>;

    #[method(name = "me")]
    async fn me(&self) -> Result<UserProfile, ResourceError>;

    #[method(name = "get_user")]
    async fn get_user(&self, user_id: UserId) -> Result<UserProfile, ResourceError>;

    #[method(name = "follow")]
    async fn follow(&self, user_id: UserId) -> Result<FollowModel, ResourceError>;

    #[method(name = "unfollow")]
    async fn unfollow(&self, user_id: UserId) -> Result<bool, ResourceError>;

    #[method(name = "followers")]
    async fn followers(&self, user_id: UserId) -> Result<Vec<UserSummary>, ResourceError>;

    #[method(name = "following")]
    async fn following(&self, user_id: UserId) -> Result<Vec<UserSummary>, ResourceError>;

    #[method(name = "change_profile_picture")]
    async fn change_profile_picture(
        &self,
        profile_picture: String,
    ) -> Result<UserModel, ResourceError>;
}

#[async_trait]
impl UsersServer for UsersService {
    async fn create_user(
        &self,
        ctx: RequestContext,
        full_name: String,
        username: String,
    ) -> Result<UserModel, ResourceError> {
        let node_id = ctx.connection().remote_id();
        Ok(self
            ._create_user_for_node(node_id.as_bytes(), full_name, username)
            .await?)
    }

    async fn me(&self, ctx: RequestContext) -> Result<UserProfile, ResourceError> {
        let caller = self.identities.caller(&ctx).await?;
        Ok(self._get_user(caller).await?)
    }

    async fn get_user(
        &self,
        _ctx: RequestContext,
        user_id: UserId,
    ) -> Result<UserProfile, ResourceError> {
        Ok(self._get_user(user_id).await?)
    }

    async fn follow(&self, ctx: RequestContext, user_id: UserId) -> Result<FollowModel, ResourceError> {
        let caller = self.identities.caller(&ctx).await?;
        Ok(self._follow(caller, user_id).await?)
    }

    async fn unfollow(&self, ctx: RequestContext, user_id: UserId) -> Result<bool, ResourceError> {
        let caller = self.identities.caller(&ctx).await?;
        Ok(self._unfollow(caller, user_id).await?)
    }

    async fn followers(
        &self,
        _ctx: RequestContext,
        user_id: UserId,
    ) -> Result<Vec<UserSummary>, ResourceError> {
        Ok(self._followers(user_id).await?)
    }

    async fn following(
        &self,
        _ctx: RequestContext,
        user_id: UserId,
    ) -> Result<Vec<UserSummary>, ResourceError> {
        Ok(self._following(user_id).await?)
    }

    async fn change_profile_picture(
        &self,
        ctx: RequestContext,
        profile_picture: String,
    ) -> Result<UserModel, ResourceError> {
        let caller = self.identities.caller(&ctx).await?;
        Ok(self._change_profile_picture(caller, profile_picture).await?)
    }
}
