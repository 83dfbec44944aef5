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
                    .table(Story::Table)
                    .col(pk_uuid(Story::Id))
                    .col(uuid(Story::UserId))
                    .col(text(Story::Content))
                    .col(json(Story::MediaUrls))
                    .col(timestamp_with_time_zone(Story::CreatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-story-user_id")
                            .from(Story::Table, Story::UserId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Story::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Story {
    Table,
    Id,
    UserId,
    Content,
    MediaUrls,
    CreatedAt,
}
