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
                    .table(ContentLike::Table)
                    .col(pk_uuid(ContentLike::Id))
                    .col(string_len(ContentLike::TargetKind, 8))
                    .col(uuid(ContentLike::TargetId))
                    .col(uuid(ContentLike::UserId))
                    .col(timestamp_with_time_zone(ContentLike::CreatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-content_like-user_id")
                            .from(ContentLike::Table, ContentLike::UserId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // A user is in a like-set at most once
        manager
            .create_index(
                Index::create()
                    .name("idx_content_likes_target_user")
                    .table(ContentLike::Table)
                    .col(ContentLike::TargetKind)
                    .col(ContentLike::TargetId)
                    .col(ContentLike::UserId)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ContentLike::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum ContentLike {
    Table,
    Id,
    TargetKind,
    TargetId,
    UserId,
    CreatedAt,
}
