//! Storage abstraction for DocVault.
//!
//! One trait per collection. The chunk engine is the only caller that
//! writes to more than one of them in a single logical operation, and it
//! does so without transactions: consistency comes from its compensation
//! log, so implementations only need single-record atomicity.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.
//! `insert_*` fails when a record with the same id already exists;
//! `delete_*` and `update_*` return whether a record was affected.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{App, Chunk, Document, Image};

#[async_trait]
pub trait AppStore: Send + Sync {
    async fn insert_app(&self, app: &App) -> Result<()>;
    async fn get_app(&self, id: &str) -> Result<Option<App>>;
    async fn get_app_by_name(&self, name: &str) -> Result<Option<App>>;
    async fn list_apps_by_creator(&self, creator: &str) -> Result<Vec<App>>;
    async fn update_app(&self, app: &App) -> Result<bool>;
    async fn delete_app(&self, id: &str) -> Result<bool>;
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn insert_document(&self, document: &Document) -> Result<()>;

    /// Insert, or overwrite the record with the same id.
    async fn upsert_document(&self, document: &Document) -> Result<()>;

    async fn get_document(&self, id: &str) -> Result<Option<Document>>;

    /// True when `app_id` already holds content with this hash and size.
    async fn document_exists(&self, app_id: &str, content_hash: &str, size: u64) -> Result<bool>;

    async fn list_documents_by_app(&self, app_id: &str) -> Result<Vec<Document>>;
    async fn update_document(&self, document: &Document) -> Result<bool>;
    async fn delete_document(&self, id: &str) -> Result<bool>;
}

#[async_trait]
pub trait ChunkStore: Send + Sync {
    async fn insert_chunk(&self, chunk: &Chunk) -> Result<()>;
    async fn get_chunk(&self, id: &str) -> Result<Option<Chunk>>;

    /// All chunks of a document, ordered by page then position.
    async fn list_chunks_by_document(&self, document_id: &str) -> Result<Vec<Chunk>>;

    async fn delete_chunk(&self, id: &str) -> Result<bool>;
}

#[async_trait]
pub trait ImageStore: Send + Sync {
    async fn insert_image(&self, image: &Image) -> Result<()>;
    async fn get_image(&self, id: &str) -> Result<Option<Image>>;

    /// Images of a chunk, ordered by position.
    async fn list_images_by_chunk(&self, chunk_id: &str) -> Result<Vec<Image>>;
    async fn update_image(&self, image: &Image) -> Result<bool>;
    async fn delete_image(&self, id: &str) -> Result<bool>;
}
