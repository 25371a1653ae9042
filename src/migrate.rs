use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

/// Create the schema in the configured database. Idempotent.
pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate(&pool).await?;
    pool.close().await;
    Ok(())
}

pub async fn migrate(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS apps (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            description TEXT,
            keywords_json TEXT NOT NULL DEFAULT '[]',
            creator TEXT NOT NULL,
            updater TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id TEXT PRIMARY KEY,
            app_id TEXT NOT NULL,
            name TEXT NOT NULL,
            content_hash TEXT NOT NULL,
            size INTEGER NOT NULL,
            file_path TEXT NOT NULL,
            mime_type TEXT NOT NULL,
            extension TEXT NOT NULL,
            creator TEXT NOT NULL,
            updater TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER,
            UNIQUE(app_id, content_hash, size)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // No foreign keys: images are written before the chunk that lists them,
    // and rollback restores each chunk before its images.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            id TEXT PRIMARY KEY,
            document_id TEXT NOT NULL,
            page INTEGER NOT NULL,
            position INTEGER NOT NULL,
            tags_json TEXT NOT NULL DEFAULT '[]',
            images_json TEXT NOT NULL DEFAULT '[]',
            content TEXT NOT NULL,
            file_creation_date TEXT,
            file_mod_date TEXT,
            creator TEXT NOT NULL,
            updater TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS images (
            id TEXT PRIMARY KEY,
            chunk_id TEXT NOT NULL,
            position INTEGER NOT NULL,
            image_url TEXT NOT NULL,
            image_description TEXT,
            creator TEXT NOT NULL,
            updater TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_apps_creator ON apps(creator)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_app_id ON documents(app_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_document_id ON chunks(document_id, page, position)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_images_chunk_id ON images(chunk_id, position)")
        .execute(pool)
        .await?;

    Ok(())
}
