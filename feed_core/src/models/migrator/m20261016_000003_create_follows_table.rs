use sea_orm_migration::{prelude::*, schema::*};

use super::m20261016_000001_create_users_table::User;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Follow::Table)
                    .col(uuid(Follow::FollowerId))
                    .col(uuid(Follow::FolloweeId))
                    .col(timestamp_with_time_zone(Follow::CreatedAt))
                    .primary_key(
                        Index::create()
                            .col(Follow::FollowerId)
                            .col(Follow::FolloweeId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-follow-follower_id")
                            .from(Follow::Table, Follow::FollowerId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-follow-followee_id")
                            .from(Follow::Table, Follow::FolloweeId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Fan-out reads followers by followee
        manager
            .create_index(
                Index::create()
                    .name("idx_follows_followee_id")
                    .table(Follow::Table)
                    .col(Follow::FolloweeId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Follow::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Follow {
    Table,
    FollowerId,
    FolloweeId,
    CreatedAt,
}
