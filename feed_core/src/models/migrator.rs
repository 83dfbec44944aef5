use sea_orm_migration::prelude::*;

mod m20261016_000001_create_users_table;
mod m20261016_000002_create_identity_table;
mod m20261016_000003_create_follows_table;
mod m20261016_000004_create_posts_table;
mod m20261016_000005_create_shares_table;
mod m20261016_000006_create_comments_table;
mod m20261016_000007_create_content_likes_table;
mod m20261016_000008_create_stories_table;
mod m20261016_000009_create_notifications_table;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20261016_000001_create_users_table::Migration),
            Box::new(m20261016_000002_create_identity_table::Migration),
            Box::new(m20261016_000003_create_follows_table::Migration),
            Box::new(m20261016_000004_create_posts_table::Migration),
            Box::new(m20261016_000005_create_shares_table::Migration),
            Box::new(m20261016_000006_create_comments_table::Migration),
            Box::new(m20261016_000007_create_content_likes_table::Migration),
            Box::new(m20261016_000008_create_stories_table::Migration),
            Box::new(m20261016_000009_create_notifications_table::Migration),
        ]
    }
}

#[cfg(test)]
use sea_orm::{Database, DbErr};

#[tokio::test]
async fn test_migrations_okay() -> Result<(), DbErr> {
    let db = Database::connect("sqlite::memory:").await?;
    let schema_manager = SchemaManager::new(&db);

    Migrator::refresh(&db).await?;

    assert!(schema_manager.has_table("user").await?);
    assert!(schema_manager.has_table("identity").await?);
    assert!(schema_manager.has_table("follow").await?);
    assert!(schema_manager.has_table("post").await?);
    assert!(schema_manager.has_table("share").await?);
    assert!(schema_manager.has_table("comment").await?);
    assert!(schema_manager.has_table("content_like").await?);
    assert!(schema_manager.has_table("story").await?);
    assert!(schema_manager.has_table("notification").await?);

    Ok(())
}
