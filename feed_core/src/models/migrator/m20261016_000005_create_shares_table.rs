use sea_orm_migration::{prelude::*, schema::*};

use super::m20261016_000001_create_users_table::User;
use super::m20261016_000004_create_posts_table::Post;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Share::Table)
                    .col(pk_uuid(Share::Id))
                    .col(uuid(Share::UserId))
                    .col(text(Share::Content))
                    .col(uuid_null(Share::SharedPostId)) // NULL once tombstoned
                    .col(boolean(Share::Deleted).default(false))
                    .col(string_null(Share::DeletedMessage))
                    .col(ColumnDef::new(Share::CommentCount).big_integer().not_null().default(0))
                    .col(ColumnDef::new(Share::ShareCount).big_integer().not_null().default(0))
                    .col(timestamp_with_time_zone(Share::CreatedAt))
                    .col(timestamp_with_time_zone(Share::UpdatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-share-user_id")
                            .from(Share::Table, Share::UserId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-share-shared_post_id")
                            .from(Share::Table, Share::SharedPostId)
                            .to(Post::Table, Post::Id)
                            .on_delete(ForeignKeyAction::SetNull)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // One share per (author, original post)
        manager
            .create_index(
                Index::create()
                    .name("idx_shares_user_id_shared_post_id")
                    .table(Share::Table)
                    .col(Share::UserId)
                    .col(Share::SharedPostId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_shares_shared_post_id")
                    .table(Share::Table)
                    .col(Share::SharedPostId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Share::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Share {
    Table,
    Id,
    UserId,
    Content,
    SharedPostId,
    Deleted,
    DeletedMessage,
    CommentCount,
    ShareCount,
    CreatedAt,
    UpdatedAt,
}
