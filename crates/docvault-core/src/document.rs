//! Document registry: uploaded source files scoped to an app.
//!
//! Uploads are deduplicated per app by SHA-256 content hash plus byte size,
//! and file names are unique per app. Bytes go to [`FileStorage`] under
//! `{APP_NAME}/{extension}/{file name}` before the record is written; if the
//! record write fails the file is removed again.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::access::Actor;
use crate::app::AppRegistry;
use crate::error::{VaultError, VaultResult};
use crate::models::{new_id, Document};
use crate::storage::FileStorage;
use crate::store::DocumentStore;

/// Raw upload as received from the transport layer.
#[derive(Debug, Clone)]
pub struct DocumentUpload {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// Lowercase hex SHA-256 of `bytes`.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Extension after the last dot, lowercased; `"etc"` when there is none.
pub fn file_extension(file_name: &str) -> String {
    match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => ext.to_ascii_lowercase(),
        _ => "etc".to_string(),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentError {
    pub name: String,
    pub error: String,
}

/// Per-file outcome of a batch upload or delete.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DocumentBatch {
    pub succeeded: Vec<Document>,
    pub failed: Vec<DocumentError>,
}

#[derive(Clone)]
pub struct DocumentRegistry {
    apps: AppRegistry,
    pub(crate) documents: Arc<dyn DocumentStore>,
    pub(crate) files: Arc<dyn FileStorage>,
}

impl DocumentRegistry {
    pub fn new(apps: AppRegistry, documents: Arc<dyn DocumentStore>, files: Arc<dyn FileStorage>) -> Self {
        Self { apps, documents, files }
    }

    pub async fn create_document(&self, app_id: &str, upload: DocumentUpload, actor: &Actor) -> VaultResult<Document> {
        let app = self.apps.get_app(app_id).await?;

        let hash = content_hash(&upload.bytes);
        let size = upload.bytes.len() as u64;
        if self.documents.document_exists(&app.id, &hash, size).await? {
            return Err(VaultError::Conflict(format!(
                "app {} already holds a document with the same content as '{}'",
                app.name, upload.file_name
            )));
        }
        if self.name_taken(&app.id, &upload.file_name).await? {
            return Err(VaultError::Conflict(format!(
                "app {} already holds a document named '{}'",
                app.name, upload.file_name
            )));
        }

        let extension = file_extension(&upload.file_name);
        let file_path = self
            .files
            .save_document(&app.name, &extension, &upload.file_name, &upload.bytes)
            .await
            .map_err(|e| VaultError::Storage(e.context("failed to save uploaded file")))?;

        let document = Document {
            id: new_id(),
            app_id: app.id.clone(),
            name: upload.file_name,
            content_hash: hash,
            size,
            file_path,
            mime_type: upload.mime_type,
            extension,
            creator: actor.id().to_string(),
            updater: None,
            created_at: Utc::now(),
            updated_at: None,
        };

        if let Err(e) = self.documents.insert_document(&document).await {
            if let Err(cleanup) = self.files.delete_document(&document.file_path).await {
                warn!(path = %document.file_path, error = %cleanup, "could not remove orphaned upload");
            }
            return Err(e.into());
        }

        info!(document_id = %document.id, app = %app.name, size, "document stored");
        Ok(document)
    }

    /// Store several uploads. Duplicates land in `failed`; any other error aborts.
    pub async fn upload_documents(
        &self,
        app_id: &str,
        uploads: Vec<DocumentUpload>,
        actor: &Actor,
    ) -> VaultResult<DocumentBatch> {
        if uploads.is_empty() {
            return Err(VaultError::InvalidInput("no documents were uploaded".into()));
        }

        let mut batch = DocumentBatch::default();
        for upload in uploads {
            let name = upload.file_name.clone();
            match self.create_document(app_id, upload, actor).await {
                Ok(doc) => batch.succeeded.push(doc),
                Err(e @ VaultError::Conflict(_)) => batch.failed.push(DocumentError {
                    name,
                    error: e.to_string(),
                }),
                Err(e) => return Err(e),
            }
        }
        Ok(batch)
    }

    pub async fn get_document(&self, id: &str) -> VaultResult<Document> {
        self.documents
            .get_document(id)
            .await?
            .ok_or_else(|| VaultError::not_found("document", id))
    }

    /// Every document of an app; empty when it has none.
    pub async fn documents_by_app(&self, app_id: &str) -> VaultResult<Vec<Document>> {
        Ok(self.documents.list_documents_by_app(app_id).await?)
    }

    /// Like [`documents_by_app`](Self::documents_by_app), but the app must
    /// exist and hold at least one document.
    pub async fn list_documents(&self, app_id: &str) -> VaultResult<Vec<Document>> {
        let app = self.apps.get_app(app_id).await?;
        let documents = self.documents_by_app(&app.id).await?;
        if documents.is_empty() {
            return Err(VaultError::not_found("documents for app", app.name));
        }
        Ok(documents)
    }

    async fn name_taken(&self, app_id: &str, file_name: &str) -> VaultResult<bool> {
        let documents = self.documents_by_app(app_id).await?;
        Ok(documents.iter().any(|d| d.name == file_name))
    }

    /// Write a document record back exactly as given.
    pub async fn restore_document(&self, document: &Document) -> VaultResult<()> {
        Ok(self.documents.upsert_document(document).await?)
    }

    /// Rename the stored file, keeping its extension.
    pub async fn rename_document(&self, id: &str, new_stem: &str, actor: &Actor) -> VaultResult<Document> {
        let mut document = self.get_document(id).await?;
        if !actor.owns(&document.creator) {
            return Err(VaultError::Forbidden(format!("only the creator may rename document {}", id)));
        }
        if new_stem.is_empty() || new_stem.contains(['/', '\\']) {
            return Err(VaultError::InvalidInput(format!("invalid document name '{}'", new_stem)));
        }

        let new_name = format!("{}.{}", new_stem, document.extension);
        if new_name != document.name && self.name_taken(&document.app_id, &new_name).await? {
            return Err(VaultError::Conflict(format!("a document named '{}' already exists", new_name)));
        }
        let new_path = self
            .files
            .rename_document(&document.file_path, &new_name)
            .await
            .map_err(|e| VaultError::Storage(e.context("failed to rename stored file")))?;

        document.name = new_name;
        document.file_path = new_path;
        document.updater = Some(actor.id().to_string());
        document.updated_at = Some(Utc::now());

        if !self.documents.update_document(&document).await? {
            return Err(VaultError::not_found("document", id));
        }
        Ok(document)
    }

    /// Remove the stored file and the record.
    ///
    /// Chunks are not cascaded here; remove them through the chunk engine first.
    pub async fn delete_document(&self, id: &str, actor: &Actor) -> VaultResult<Document> {
        let document = self.get_document(id).await?;
        if !actor.owns(&document.creator) {
            return Err(VaultError::Forbidden(format!("only the creator may delete document {}", id)));
        }

        self.remove_document(document).await
    }

    async fn remove_document(&self, document: Document) -> VaultResult<Document> {
        self.files.delete_document(&document.file_path).await?;
        if !self.documents.delete_document(&document.id).await? {
            return Err(VaultError::not_found("document", &document.id));
        }
        info!(document_id = %document.id, "document deleted");
        Ok(document)
    }

    /// Delete the listed documents, or every document of the app when `ids` is `None`.
    ///
    /// Requires the app creator, who may remove any document of the app.
    /// Per-document failures are collected.
    pub async fn delete_documents(
        &self,
        app_id: &str,
        ids: Option<Vec<String>>,
        actor: &Actor,
    ) -> VaultResult<DocumentBatch> {
        let app = self.apps.get_app(app_id).await?;
        if !actor.owns(&app.creator) {
            return Err(VaultError::Forbidden(format!("only the creator may delete documents of app {}", app.name)));
        }

        let targets = match ids {
            Some(ids) if !ids.is_empty() => ids,
            _ => self
                .documents_by_app(&app.id)
                .await?
                .into_iter()
                .map(|d| d.id)
                .collect(),
        };

        let mut batch = DocumentBatch::default();
        for id in targets {
            let outcome = match self.get_document(&id).await {
                Ok(doc) if doc.app_id != app.id => Err(VaultError::Forbidden(format!(
                    "document {} does not belong to app {}",
                    id, app.name
                ))),
                Ok(doc) => self.remove_document(doc).await,
                Err(e) => Err(e),
            };
            match outcome {
                Ok(doc) => batch.succeeded.push(doc),
                Err(e) => batch.failed.push(DocumentError {
                    name: id,
                    error: e.to_string(),
                }),
            }
        }
        Ok(batch)
    }
}
