//! Wiring from [`Config`] to a ready-to-use set of services.
//!
//! ```text
//! Config ─▶ SqlitePool ─▶ SqliteStore ─┬─▶ AppRegistry ──┐
//!                                       ├─▶ DocumentRegistry ─┼─▶ ChunkEngine
//! data_dir ─▶ DiskStorage ──────────────┤                    │
//!           └▶ PdfChunker ──────────────┴─▶ ImageService ────┘
//! ```

use std::sync::Arc;

use anyhow::Result;
use sqlx::SqlitePool;
use tracing::info;

use docvault_core::access::Actor;
use docvault_core::app::AppRegistry;
use docvault_core::chunk::Chunker;
use docvault_core::document::{DocumentBatch, DocumentRegistry};
use docvault_core::engine::ChunkEngine;
use docvault_core::image::ImageService;
use docvault_core::models::App;
use docvault_core::{VaultError, VaultResult};

use crate::config::Config;
use crate::db;
use crate::files::DiskStorage;
use crate::migrate;
use crate::pdf::PdfChunker;
use crate::sqlite_store::SqliteStore;

/// Everything removed by [`Vault::delete_app_cascade`].
#[derive(Debug)]
pub struct AppRemoval {
    pub app: App,
    pub chunk_documents: usize,
    pub documents: DocumentBatch,
}

pub struct Vault {
    pub config: Config,
    pub apps: AppRegistry,
    pub documents: DocumentRegistry,
    pub images: ImageService,
    pub engine: ChunkEngine,
    pool: SqlitePool,
}

impl Vault {
    /// Connect, migrate, and wire the services with the PDF chunker.
    pub async fn open(config: Config) -> Result<Self> {
        let chunker = Arc::new(PdfChunker::new(config.storage.data_dir.clone()));
        Self::with_chunker(config, chunker).await
    }

    /// Like [`open`](Self::open) with a caller-supplied chunker.
    pub async fn with_chunker(config: Config, chunker: Arc<dyn Chunker>) -> Result<Self> {
        let pool = db::connect(&config).await?;
        migrate::migrate(&pool).await?;

        let store = Arc::new(SqliteStore::new(pool.clone()));
        let files = Arc::new(DiskStorage::new(config.storage.data_dir.clone()));

        let apps = AppRegistry::new(store.clone(), files.clone());
        let documents = DocumentRegistry::new(apps.clone(), store.clone(), files);
        let images = ImageService::new(store.clone(), store.clone(), store.clone(), store.clone());
        let engine = ChunkEngine::new(apps.clone(), documents.clone(), images.clone(), store, chunker);

        info!(db = %config.db.path.display(), data_dir = %config.storage.data_dir.display(), "vault opened");
        Ok(Self {
            config,
            apps,
            documents,
            images,
            engine,
            pool,
        })
    }

    /// Delete an app with everything it owns: chunks, then documents, then the app.
    pub async fn delete_app_cascade(&self, app_id: &str, actor: &Actor) -> VaultResult<AppRemoval> {
        let app = self.apps.get_app(app_id).await?;
        let chunked = self.engine.delete_chunks_for_app(&app.id, actor).await?;
        let documents = self.documents.delete_documents(&app.id, None, actor).await?;
        if !documents.failed.is_empty() {
            let names: Vec<&str> = documents.failed.iter().map(|f| f.name.as_str()).collect();
            return Err(VaultError::Conflict(format!(
                "app {} kept: could not delete documents {}",
                app.name,
                names.join(", ")
            )));
        }
        let app = self.apps.delete_app(&app.id, actor).await?;
        Ok(AppRemoval {
            app,
            chunk_documents: chunked.len(),
            documents,
        })
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}
