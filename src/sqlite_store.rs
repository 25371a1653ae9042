//! SQLite-backed store implementations.
//!
//! One table per record type (see [`crate::migrate`]). List-valued fields
//! (`keywords`, `tags`, `images`) are stored as JSON text and timestamps as
//! unix seconds.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use docvault_core::models::{App, Chunk, Document, Image};
use docvault_core::store::{AppStore, ChunkStore, DocumentStore, ImageStore};

/// SQLite implementation of every store trait.
///
/// Cheap to clone; all clones share one pool.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn to_ts(dt: &DateTime<Utc>) -> i64 {
    dt.timestamp()
}

fn from_ts(ts: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(ts, 0).with_context(|| format!("timestamp out of range: {}", ts))
}

fn from_opt_ts(ts: Option<i64>) -> Result<Option<DateTime<Utc>>> {
    ts.map(from_ts).transpose()
}

fn to_json(values: &[String]) -> Result<String> {
    Ok(serde_json::to_string(values)?)
}

fn from_json(row: &SqliteRow, column: &str) -> Result<Vec<String>> {
    let raw: String = row.try_get(column)?;
    serde_json::from_str(&raw).with_context(|| format!("malformed JSON in column {}", column))
}

fn row_to_app(row: &SqliteRow) -> Result<App> {
    Ok(App {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        keywords: from_json(row, "keywords_json")?,
        creator: row.try_get("creator")?,
        updater: row.try_get("updater")?,
        created_at: from_ts(row.try_get("created_at")?)?,
        updated_at: from_opt_ts(row.try_get("updated_at")?)?,
    })
}

fn row_to_document(row: &SqliteRow) -> Result<Document> {
    let size: i64 = row.try_get("size")?;
    Ok(Document {
        id: row.try_get("id")?,
        app_id: row.try_get("app_id")?,
        name: row.try_get("name")?,
        content_hash: row.try_get("content_hash")?,
        size: u64::try_from(size).context("negative document size")?,
        file_path: row.try_get("file_path")?,
        mime_type: row.try_get("mime_type")?,
        extension: row.try_get("extension")?,
        creator: row.try_get("creator")?,
        updater: row.try_get("updater")?,
        created_at: from_ts(row.try_get("created_at")?)?,
        updated_at: from_opt_ts(row.try_get("updated_at")?)?,
    })
}

fn position_of(row: &SqliteRow) -> Result<u32> {
    let position: i64 = row.try_get("position")?;
    u32::try_from(position).context("position out of range")
}

fn row_to_chunk(row: &SqliteRow) -> Result<Chunk> {
    let page: i64 = row.try_get("page")?;
    Ok(Chunk {
        id: row.try_get("id")?,
        document_id: row.try_get("document_id")?,
        page: u32::try_from(page).context("page number out of range")?,
        position: position_of(row)?,
        tags: from_json(row, "tags_json")?,
        images: from_json(row, "images_json")?,
        content: row.try_get("content")?,
        file_creation_date: row.try_get("file_creation_date")?,
        file_mod_date: row.try_get("file_mod_date")?,
        creator: row.try_get("creator")?,
        updater: row.try_get("updater")?,
        created_at: from_ts(row.try_get("created_at")?)?,
        updated_at: from_opt_ts(row.try_get("updated_at")?)?,
    })
}

fn row_to_image(row: &SqliteRow) -> Result<Image> {
    Ok(Image {
        id: row.try_get("id")?,
        chunk_id: row.try_get("chunk_id")?,
        position: position_of(row)?,
        image_url: row.try_get("image_url")?,
        image_description: row.try_get("image_description")?,
        creator: row.try_get("creator")?,
        updater: row.try_get("updater")?,
        created_at: from_ts(row.try_get("created_at")?)?,
        updated_at: from_opt_ts(row.try_get("updated_at")?)?,
    })
}

#[async_trait]
impl AppStore for SqliteStore {
    async fn insert_app(&self, app: &App) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO apps (id, name, description, keywords_json, creator, updater,
                              created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&app.id)
        .bind(&app.name)
        .bind(&app.description)
        .bind(to_json(&app.keywords)?)
        .bind(&app.creator)
        .bind(&app.updater)
        .bind(to_ts(&app.created_at))
        .bind(app.updated_at.as_ref().map(to_ts))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_app(&self, id: &str) -> Result<Option<App>> {
        let row = sqlx::query("SELECT * FROM apps WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_app).transpose()
    }

    async fn get_app_by_name(&self, name: &str) -> Result<Option<App>> {
        let row = sqlx::query("SELECT * FROM apps WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_app).transpose()
    }

    async fn list_apps_by_creator(&self, creator: &str) -> Result<Vec<App>> {
        let rows = sqlx::query("SELECT * FROM apps WHERE creator = ? ORDER BY name")
            .bind(creator)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_app).collect()
    }

    async fn update_app(&self, app: &App) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE apps SET description = ?, keywords_json = ?, updater = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&app.description)
        .bind(to_json(&app.keywords)?)
        .bind(&app.updater)
        .bind(app.updated_at.as_ref().map(to_ts))
        .bind(&app.id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_app(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM apps WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

const DOCUMENT_COLUMNS: &str = "id, app_id, name, content_hash, size, file_path, mime_type, \
    extension, creator, updater, created_at, updated_at";

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn insert_document(&self, document: &Document) -> Result<()> {
        let sql = format!(
            "INSERT INTO documents ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            DOCUMENT_COLUMNS
        );
        bind_document(sqlx::query(&sql), document)?
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn upsert_document(&self, document: &Document) -> Result<()> {
        let sql = format!(
            r#"
            INSERT INTO documents ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                app_id = excluded.app_id,
                name = excluded.name,
                content_hash = excluded.content_hash,
                size = excluded.size,
                file_path = excluded.file_path,
                mime_type = excluded.mime_type,
                extension = excluded.extension,
                creator = excluded.creator,
                updater = excluded.updater,
                created_at = excluded.created_at,
                updated_at = excluded.updated_at
            "#,
            DOCUMENT_COLUMNS
        );
        bind_document(sqlx::query(&sql), document)?
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        let row = sqlx::query("SELECT * FROM documents WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_document).transpose()
    }

    async fn document_exists(&self, app_id: &str, content_hash: &str, size: u64) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT COUNT(*) > 0 FROM documents WHERE app_id = ? AND content_hash = ? AND size = ?",
        )
        .bind(app_id)
        .bind(content_hash)
        .bind(i64::try_from(size)?)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn list_documents_by_app(&self, app_id: &str) -> Result<Vec<Document>> {
        let rows = sqlx::query("SELECT * FROM documents WHERE app_id = ? ORDER BY created_at, name")
            .bind(app_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_document).collect()
    }

    async fn update_document(&self, document: &Document) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE documents SET name = ?, file_path = ?, updater = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&document.name)
        .bind(&document.file_path)
        .bind(&document.updater)
        .bind(document.updated_at.as_ref().map(to_ts))
        .bind(&document.id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_document(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

type SqliteQuery<'q> = sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>;

fn bind_document<'q>(query: SqliteQuery<'q>, document: &'q Document) -> Result<SqliteQuery<'q>> {
    Ok(query
        .bind(&document.id)
        .bind(&document.app_id)
        .bind(&document.name)
        .bind(&document.content_hash)
        .bind(i64::try_from(document.size)?)
        .bind(&document.file_path)
        .bind(&document.mime_type)
        .bind(&document.extension)
        .bind(&document.creator)
        .bind(&document.updater)
        .bind(to_ts(&document.created_at))
        .bind(document.updated_at.as_ref().map(to_ts)))
}

#[async_trait]
impl ChunkStore for SqliteStore {
    async fn insert_chunk(&self, chunk: &Chunk) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO chunks (id, document_id, page, position, tags_json, images_json,
                                content, file_creation_date, file_mod_date, creator,
                                updater, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&chunk.id)
        .bind(&chunk.document_id)
        .bind(i64::from(chunk.page))
        .bind(i64::from(chunk.position))
        .bind(to_json(&chunk.tags)?)
        .bind(to_json(&chunk.images)?)
        .bind(&chunk.content)
        .bind(&chunk.file_creation_date)
        .bind(&chunk.file_mod_date)
        .bind(&chunk.creator)
        .bind(&chunk.updater)
        .bind(to_ts(&chunk.created_at))
        .bind(chunk.updated_at.as_ref().map(to_ts))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_chunk(&self, id: &str) -> Result<Option<Chunk>> {
        let row = sqlx::query("SELECT * FROM chunks WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_chunk).transpose()
    }

    async fn list_chunks_by_document(&self, document_id: &str) -> Result<Vec<Chunk>> {
        let rows = sqlx::query("SELECT * FROM chunks WHERE document_id = ? ORDER BY page, position")
            .bind(document_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_chunk).collect()
    }

    async fn delete_chunk(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM chunks WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl ImageStore for SqliteStore {
    async fn insert_image(&self, image: &Image) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO images (id, chunk_id, position, image_url, image_description, creator,
                                updater, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&image.id)
        .bind(&image.chunk_id)
        .bind(i64::from(image.position))
        .bind(&image.image_url)
        .bind(&image.image_description)
        .bind(&image.creator)
        .bind(&image.updater)
        .bind(to_ts(&image.created_at))
        .bind(image.updated_at.as_ref().map(to_ts))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_image(&self, id: &str) -> Result<Option<Image>> {
        let row = sqlx::query("SELECT * FROM images WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_image).transpose()
    }

    async fn list_images_by_chunk(&self, chunk_id: &str) -> Result<Vec<Image>> {
        let rows = sqlx::query("SELECT * FROM images WHERE chunk_id = ? ORDER BY position")
            .bind(chunk_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_image).collect()
    }

    async fn update_image(&self, image: &Image) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE images SET image_description = ?, updater = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&image.image_description)
        .bind(&image.updater)
        .bind(image.updated_at.as_ref().map(to_ts))
        .bind(&image.id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_image(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM images WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
