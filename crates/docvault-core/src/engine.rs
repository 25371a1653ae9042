//! Chunk engine: chunk creation and cascading deletion with manual rollback.
//!
//! The engine is the only component that writes to more than one collection
//! per operation. There are no transactions underneath, so every
//! document-level operation keeps a [`Compensation`] log and unwinds it on
//! the first failure:
//!
//! | Operation | Forward steps | On failure |
//! |-----------|---------------|------------|
//! | create for document | insert images, then chunk, per segment | remove everything inserted, raise CHUNK_CREATE_FAILED |
//! | delete for document | delete images, then chunk, per chunk | re-insert every deleted record, raise CHUNK_DELETE_FAILED |
//! | create for app | create for each document | record the error, continue |
//! | delete for app | delete for each document | restore processed documents and their chunks, raise |
//!
//! Restores re-insert full snapshots, so rolled-back records keep their ids
//! and positions. Each document-level write holds a [`DocumentLease`] for
//! its duration. Extracted image files are removed only once a delete has
//! fully succeeded; a rolled-back delete leaves them in place.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::access::{Access, Actor, Grant};
use crate::app::AppRegistry;
use crate::chunk::{ChunkParams, ChunkRequest, Chunker, PageSegment};
use crate::compensation::{Compensation, Stores, Undo};
use crate::document::DocumentRegistry;
use crate::error::{ErrorKind, VaultError, VaultResult};
use crate::image::ImageService;
use crate::lease::{DocumentLease, DocumentLeases};
use crate::models::{Chunk, Document, Image};
use crate::store::ChunkStore;

/// The only extension the chunker accepts.
pub const CHUNKABLE_EXTENSION: &str = "pdf";

/// Records removed by a document-level delete, in deletion order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DeletedChunks {
    pub chunks: Vec<Chunk>,
    pub images: Vec<Image>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentChunks {
    pub document_id: String,
    pub chunks: Vec<Chunk>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentFailure {
    pub document_id: String,
    pub kind: ErrorKind,
    pub error: String,
}

/// Outcome of [`ChunkEngine::create_chunks_for_app`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct BulkChunkReport {
    pub succeeded: Vec<DocumentChunks>,
    pub failed: Vec<DocumentFailure>,
}

impl BulkChunkReport {
    /// `Some(PartialBatchFailure)` when at least one document failed.
    pub fn kind(&self) -> Option<ErrorKind> {
        (!self.failed.is_empty()).then_some(ErrorKind::PartialBatchFailure)
    }
}

/// Folder the chunker extracts a document's images into.
fn image_scope(document: &Document) -> String {
    format!("{}/{}", document.app_id, document.id)
}

fn ensure_chunkable(document: &Document) -> VaultResult<()> {
    if document.extension == CHUNKABLE_EXTENSION {
        Ok(())
    } else {
        Err(VaultError::UnsupportedType {
            extension: document.extension.clone(),
        })
    }
}

#[derive(Clone)]
pub struct ChunkEngine {
    apps: AppRegistry,
    documents: DocumentRegistry,
    images: ImageService,
    chunks: Arc<dyn ChunkStore>,
    chunker: Arc<dyn Chunker>,
    leases: Arc<DocumentLeases>,
}

impl ChunkEngine {
    pub fn new(
        apps: AppRegistry,
        documents: DocumentRegistry,
        images: ImageService,
        chunks: Arc<dyn ChunkStore>,
        chunker: Arc<dyn Chunker>,
    ) -> Self {
        Self {
            apps,
            documents,
            images,
            chunks,
            chunker,
            leases: DocumentLeases::new(),
        }
    }

    pub fn leases(&self) -> &Arc<DocumentLeases> {
        &self.leases
    }

    fn stores(&self) -> Stores<'_> {
        Stores {
            documents: &self.documents,
            chunks: self.chunks.as_ref(),
            images: self.images.images.as_ref(),
        }
    }

    // ─── Creation ───────────────────────────────────────────────────────

    /// Replace the chunks of one document with fresh chunker output.
    ///
    /// All-or-nothing: on failure no chunk or image from this attempt remains.
    pub async fn create_chunks_for_document(
        &self,
        document_id: &str,
        params: ChunkParams,
        access: Access,
    ) -> VaultResult<Vec<Chunk>> {
        params.validate()?;
        let document = self.documents.get_document(document_id).await?;
        ensure_chunkable(&document)?;
        let grant = access.authorize(&document, "create chunks")?;
        let lease = self.leases.try_acquire(&document.id)?;
        self.rechunk(&document, &params, &grant, &lease).await
    }

    async fn rechunk(
        &self,
        document: &Document,
        params: &ChunkParams,
        grant: &Grant,
        lease: &DocumentLease,
    ) -> VaultResult<Vec<Chunk>> {
        let previous = self.remove_chunks(document, lease).await?;
        if !previous.chunks.is_empty() {
            debug!(document_id = %document.id, removed = previous.chunks.len(), "cleared previous chunks");
        }

        let request = ChunkRequest {
            file_path: document.file_path.clone(),
            image_scope: image_scope(document),
            params: *params,
        };
        let segments = self.chunker.chunk(&request).await.map_err(|cause| {
            warn!(document_id = %document.id, error = %cause, "chunker failed");
            VaultError::ChunkCreateFailed {
                document_id: document.id.clone(),
                cause: cause.context("document preprocessing failed"),
                rollback_errors: Vec::new(),
            }
        })?;

        let mut log = Compensation::new();
        let mut created = Vec::with_capacity(segments.len());
        for (position, segment) in (0u32..).zip(&segments) {
            match self.persist_segment(document, position, segment, grant.actor(), &mut log).await {
                Ok(chunk) => created.push(chunk),
                Err(cause) => {
                    warn!(
                        document_id = %document.id,
                        persisted = created.len(),
                        error = %cause,
                        "chunk creation failed, rolling back"
                    );
                    let rollback_errors = log.unwind(self.stores(), "create_chunks", &document.id).await;
                    return Err(VaultError::ChunkCreateFailed {
                        document_id: document.id.clone(),
                        cause,
                        rollback_errors,
                    });
                }
            }
        }

        let images: usize = created.iter().map(|c| c.images.len()).sum();
        info!(document_id = %document.id, chunks = created.len(), images, "chunks created");
        Ok(created)
    }

    /// Write one segment: its images first, then the chunk that lists them.
    async fn persist_segment(
        &self,
        document: &Document,
        position: u32,
        segment: &PageSegment,
        actor: &Actor,
        log: &mut Compensation,
    ) -> anyhow::Result<Chunk> {
        let mut chunk = Chunk::from_segment(&document.id, position, segment, actor.id());

        for (slot, path) in (0u32..).zip(&segment.images) {
            let image = self
                .images
                .create_image(&Image::new(&chunk.id, path, actor.id()).at(slot))
                .await?;
            log.record(Undo::RemoveImage(image.id.clone()));
            chunk.images.push(image.id);
        }

        self.chunks.insert_chunk(&chunk).await?;
        log.record(Undo::RemoveChunk(chunk.id.clone()));
        Ok(chunk)
    }

    // ─── Deletion ───────────────────────────────────────────────────────

    /// Delete every chunk of a document together with its images.
    ///
    /// All-or-nothing: on failure every deleted record is re-inserted. On
    /// success the document's extracted image folder is removed as well.
    pub async fn delete_chunks_for_document(&self, document_id: &str, access: Access) -> VaultResult<DeletedChunks> {
        let (document, deleted) = self.delete_document_chunks(document_id, access).await?;
        self.remove_image_files(&document).await;
        Ok(deleted)
    }

    async fn delete_document_chunks(&self, document_id: &str, access: Access) -> VaultResult<(Document, DeletedChunks)> {
        let document = self.documents.get_document(document_id).await?;
        ensure_chunkable(&document)?;
        access.authorize(&document, "delete chunks")?;
        let lease = self.leases.try_acquire(&document.id)?;
        let deleted = self.remove_chunks(&document, &lease).await?;
        Ok((document, deleted))
    }

    /// The records are already gone, so a leftover folder is only logged.
    async fn remove_image_files(&self, document: &Document) {
        let scope = image_scope(document);
        if let Err(e) = self.documents.files.remove_image_folder(&scope).await {
            let detail = format!("{:#}", e);
            warn!(document_id = %document.id, scope = %scope, error = %detail, "could not remove extracted images");
        }
    }

    async fn remove_chunks(&self, document: &Document, _lease: &DocumentLease) -> VaultResult<DeletedChunks> {
        let chunks = self.chunks.list_chunks_by_document(&document.id).await?;

        let mut log = Compensation::new();
        let mut deleted = DeletedChunks::default();
        for chunk in &chunks {
            if let Err(cause) = self.remove_chunk(chunk, &mut log, &mut deleted).await {
                warn!(
                    document_id = %document.id,
                    chunk_id = %chunk.id,
                    error = %cause,
                    "chunk deletion failed, restoring"
                );
                let rollback_errors = log.unwind(self.stores(), "delete_chunks", &document.id).await;
                return Err(VaultError::ChunkDeleteFailed {
                    document_id: document.id.clone(),
                    cause,
                    rollback_errors,
                });
            }
        }

        if !deleted.chunks.is_empty() {
            info!(
                document_id = %document.id,
                chunks = deleted.chunks.len(),
                images = deleted.images.len(),
                "chunks deleted"
            );
        }
        Ok(deleted)
    }

    async fn remove_chunk(
        &self,
        chunk: &Chunk,
        log: &mut Compensation,
        deleted: &mut DeletedChunks,
    ) -> anyhow::Result<()> {
        let images = self.images.images.list_images_by_chunk(&chunk.id).await?;
        for image in images {
            if self.images.delete_image(&image.id).await? {
                log.record(Undo::RestoreImage(image.clone()));
                deleted.images.push(image);
            }
        }

        if self.chunks.delete_chunk(&chunk.id).await? {
            log.record(Undo::RestoreChunk(chunk.clone()));
            deleted.chunks.push(chunk.clone());
        }
        Ok(())
    }

    // ─── App-level batches ──────────────────────────────────────────────

    /// Chunk every document of an app. Failures are isolated per document.
    pub async fn create_chunks_for_app(
        &self,
        app_id: &str,
        params: ChunkParams,
        actor: &Actor,
    ) -> VaultResult<BulkChunkReport> {
        params.validate()?;
        let grant = self.authorize_app(app_id, actor, "create chunks").await?;
        let documents = self.documents.documents_by_app(app_id).await?;

        let mut report = BulkChunkReport::default();
        for document in documents {
            let outcome = self
                .create_chunks_for_document(&document.id, params, Access::Granted(grant.clone()))
                .await;
            match outcome {
                Ok(chunks) => report.succeeded.push(DocumentChunks {
                    document_id: document.id,
                    chunks,
                }),
                Err(e) => {
                    warn!(app_id, document_id = %document.id, kind = %e.kind(), error = %e, "document skipped in batch");
                    report.failed.push(DocumentFailure {
                        document_id: document.id,
                        kind: e.kind(),
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            app_id,
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            "app chunking finished"
        );
        Ok(report)
    }

    /// Delete the chunks of every document of an app.
    ///
    /// Documents that cannot hold chunks are skipped. The first failure
    /// aborts the batch; documents already processed are restored together
    /// with the chunks and images removed from them.
    pub async fn delete_chunks_for_app(&self, app_id: &str, actor: &Actor) -> VaultResult<Vec<DocumentChunks>> {
        let grant = self.authorize_app(app_id, actor, "delete chunks").await?;
        let documents = self.documents.documents_by_app(app_id).await?;

        let mut processed: Vec<(Document, DeletedChunks)> = Vec::new();
        for document in documents {
            if ensure_chunkable(&document).is_err() {
                continue;
            }
            let outcome = self
                .delete_document_chunks(&document.id, Access::Granted(grant.clone()))
                .await;
            match outcome {
                Ok(done) => processed.push(done),
                Err(e) => {
                    warn!(
                        app_id,
                        document_id = %document.id,
                        restored_documents = processed.len(),
                        error = %e,
                        "app chunk deletion aborted, restoring processed documents"
                    );
                    let mut rollback_errors = e.rollback_errors().to_vec();
                    rollback_errors.extend(self.restore_documents(app_id, processed).await);
                    return Err(VaultError::ChunkDeleteFailed {
                        document_id: document.id,
                        cause: e.into(),
                        rollback_errors,
                    });
                }
            }
        }

        for (document, _) in &processed {
            self.remove_image_files(document).await;
        }
        Ok(processed
            .into_iter()
            .map(|(document, deleted)| DocumentChunks {
                document_id: document.id,
                chunks: deleted.chunks,
            })
            .collect())
    }

    async fn restore_documents(&self, app_id: &str, processed: Vec<(Document, DeletedChunks)>) -> Vec<String> {
        let mut log = Compensation::new();
        for (document, deleted) in processed {
            log.record(Undo::RestoreDocument(document));
            for image in deleted.images {
                log.record(Undo::RestoreImage(image));
            }
            for chunk in deleted.chunks {
                log.record(Undo::RestoreChunk(chunk));
            }
        }
        log.unwind(self.stores(), "delete_chunks_for_app", app_id).await
    }

    async fn authorize_app(&self, app_id: &str, actor: &Actor, action: &str) -> VaultResult<Grant> {
        let app = self.apps.get_app(app_id).await?;
        if !actor.owns(&app.creator) {
            return Err(VaultError::Forbidden(format!(
                "{} may not {} for app {}",
                actor.id(),
                action,
                app.name
            )));
        }
        Ok(Grant::for_app(actor.clone(), &app.id))
    }

    // ─── Single chunks ──────────────────────────────────────────────────

    /// Fetch a chunk. The actor must be its creator or the app creator.
    pub async fn get_chunk(&self, chunk_id: &str, actor: &Actor) -> VaultResult<Chunk> {
        let chunk = self
            .chunks
            .get_chunk(chunk_id)
            .await?
            .ok_or_else(|| VaultError::not_found("chunk", chunk_id))?;

        if !actor.owns(&chunk.creator) {
            let app_creator = self.images.app_creator_of(&chunk).await?;
            if !actor.manages(&chunk.creator, app_creator.as_deref()) {
                return Err(VaultError::Forbidden(format!("{} may not access chunk {}", actor.id(), chunk_id)));
            }
        }
        Ok(chunk)
    }

    /// Chunks of a document, ordered by page.
    pub async fn get_chunks_for_document(&self, document_id: &str, access: Access) -> VaultResult<Vec<Chunk>> {
        let document = self.documents.get_document(document_id).await?;
        access.authorize(&document, "read chunks")?;
        Ok(self.chunks.list_chunks_by_document(&document.id).await?)
    }

    /// Delete one chunk and its images; restores the images if the chunk delete fails.
    pub async fn delete_chunk(&self, chunk_id: &str, actor: &Actor) -> VaultResult<Chunk> {
        let chunk = self.get_chunk(chunk_id, actor).await?;
        let _lease = self.leases.try_acquire(&chunk.document_id)?;

        let mut log = Compensation::new();
        let mut deleted = DeletedChunks::default();
        if let Err(cause) = self.remove_chunk(&chunk, &mut log, &mut deleted).await {
            warn!(chunk_id = %chunk.id, error = %cause, "chunk deletion failed, restoring images");
            let rollback_errors = log.unwind(self.stores(), "delete_chunk", &chunk.document_id).await;
            return Err(VaultError::ChunkDeleteFailed {
                document_id: chunk.document_id.clone(),
                cause,
                rollback_errors,
            });
        }
        if deleted.chunks.is_empty() {
            return Err(VaultError::not_found("chunk", chunk_id));
        }
        info!(chunk_id = %chunk.id, images = deleted.images.len(), "chunk deleted");
        Ok(chunk)
    }
}
