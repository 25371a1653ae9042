//! Image service: CRUD over extracted images.
//!
//! A leaf of the chunk engine; nothing here spans more than one collection
//! except the ownership lookups (image → chunk → document → app).

use std::sync::Arc;

use chrono::Utc;

use crate::access::Actor;
use crate::error::{VaultError, VaultResult};
use crate::models::{Chunk, Image};
use crate::store::{AppStore, ChunkStore, DocumentStore, ImageStore};

#[derive(Clone)]
pub struct ImageService {
    pub(crate) images: Arc<dyn ImageStore>,
    chunks: Arc<dyn ChunkStore>,
    documents: Arc<dyn DocumentStore>,
    apps: Arc<dyn AppStore>,
}

impl ImageService {
    pub fn new(
        images: Arc<dyn ImageStore>,
        chunks: Arc<dyn ChunkStore>,
        documents: Arc<dyn DocumentStore>,
        apps: Arc<dyn AppStore>,
    ) -> Self {
        Self {
            images,
            chunks,
            documents,
            apps,
        }
    }

    pub async fn create_image(&self, image: &Image) -> VaultResult<Image> {
        self.images.insert_image(image).await?;
        Ok(image.clone())
    }

    pub async fn get_image(&self, image_id: &str, actor: &Actor) -> VaultResult<Image> {
        let image = self
            .images
            .get_image(image_id)
            .await?
            .ok_or_else(|| VaultError::not_found("image", image_id))?;

        if !actor.owns(&image.creator) {
            let app_creator = match self.chunks.get_chunk(&image.chunk_id).await? {
                Some(chunk) => self.app_creator_of(&chunk).await?,
                None => None,
            };
            if !actor.manages(&image.creator, app_creator.as_deref()) {
                return Err(VaultError::Forbidden(format!("{} may not read image {}", actor.id(), image_id)));
            }
        }
        Ok(image)
    }

    /// Images of a chunk. The actor must manage the chunk.
    pub async fn get_images_by_chunk(&self, chunk_id: &str, actor: &Actor) -> VaultResult<Vec<Image>> {
        let chunk = self
            .chunks
            .get_chunk(chunk_id)
            .await?
            .ok_or_else(|| VaultError::not_found("chunk", chunk_id))?;

        let app_creator = self.app_creator_of(&chunk).await?;
        if !actor.manages(&chunk.creator, app_creator.as_deref()) {
            return Err(VaultError::Forbidden(format!(
                "{} may not read images of chunk {}",
                actor.id(),
                chunk_id
            )));
        }
        Ok(self.images.list_images_by_chunk(&chunk.id).await?)
    }

    /// Set an image's description. Only the image creator may do this.
    pub async fn update_image(&self, image_id: &str, description: &str, actor: &Actor) -> VaultResult<Image> {
        let mut image = self
            .images
            .get_image(image_id)
            .await?
            .ok_or_else(|| VaultError::not_found("image", image_id))?;

        if !actor.owns(&image.creator) {
            return Err(VaultError::Forbidden(format!("only the creator may update image {}", image_id)));
        }

        image.image_description = Some(description.to_string());
        image.updater = Some(actor.id().to_string());
        image.updated_at = Some(Utc::now());

        if !self.images.update_image(&image).await? {
            return Err(VaultError::not_found("image", image_id));
        }
        Ok(image)
    }

    /// Returns whether a record was removed.
    pub async fn delete_image(&self, image_id: &str) -> VaultResult<bool> {
        Ok(self.images.delete_image(image_id).await?)
    }

    /// Creator of the app that owns `chunk`, if the chain is intact.
    pub(crate) async fn app_creator_of(&self, chunk: &Chunk) -> VaultResult<Option<String>> {
        let Some(document) = self.documents.get_document(&chunk.document_id).await? else {
            return Ok(None);
        };
        Ok(self.apps.get_app(&document.app_id).await?.map(|app| app.creator))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{new_id, App, Document};
    use crate::store::memory::InMemoryStore;
    use crate::ErrorKind;

    async fn seeded() -> (ImageService, Arc<InMemoryStore>, Chunk) {
        let store = Arc::new(InMemoryStore::new());
        let now = Utc::now();
        let app = App {
            id: new_id(),
            name: "TEST".into(),
            description: None,
            keywords: vec![],
            creator: "owner".into(),
            updater: None,
            created_at: now,
            updated_at: None,
        };
        store.insert_app(&app).await.unwrap();
        let doc = Document {
            id: new_id(),
            app_id: app.id.clone(),
            name: "a.pdf".into(),
            content_hash: "h".into(),
            size: 1,
            file_path: "mem://TEST/pdf/a.pdf".into(),
            mime_type: "application/pdf".into(),
            extension: "pdf".into(),
            creator: "author".into(),
            updater: None,
            created_at: now,
            updated_at: None,
        };
        store.insert_document(&doc).await.unwrap();
        let chunk = Chunk {
            id: new_id(),
            document_id: doc.id.clone(),
            page: 1,
            position: 0,
            tags: vec![],
            images: vec![],
            content: "text".into(),
            file_creation_date: None,
            file_mod_date: None,
            creator: "author".into(),
            updater: None,
            created_at: now,
            updated_at: None,
        };
        store.insert_chunk(&chunk).await.unwrap();
        let service = ImageService::new(store.clone(), store.clone(), store.clone(), store.clone());
        (service, store, chunk)
    }

    #[tokio::test]
    async fn test_app_creator_may_read_chunk_images() {
        let (images, _store, chunk) = seeded().await;
        images.create_image(&Image::new(&chunk.id, "/img/1.jpg", "author")).await.unwrap();

        assert_eq!(images.get_images_by_chunk(&chunk.id, &Actor::new("author")).await.unwrap().len(), 1);
        assert_eq!(images.get_images_by_chunk(&chunk.id, &Actor::new("owner")).await.unwrap().len(), 1);
        let err = images
            .get_images_by_chunk(&chunk.id, &Actor::new("stranger"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        let err = images.get_images_by_chunk("nope", &Actor::new("author")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_update_description_requires_creator() {
        let (images, _store, chunk) = seeded().await;
        let image = images.create_image(&Image::new(&chunk.id, "/img/1.jpg", "author")).await.unwrap();

        let err = images.update_image(&image.id, "a chart", &Actor::new("owner")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        let updated = images.update_image(&image.id, "a chart", &Actor::new("author")).await.unwrap();
        assert_eq!(updated.image_description.as_deref(), Some("a chart"));
        let fetched = images.get_image(&image.id, &Actor::new("owner")).await.unwrap();
        assert_eq!(fetched.image_description.as_deref(), Some("a chart"));
    }

    #[tokio::test]
    async fn test_delete_reports_whether_removed() {
        let (images, store, chunk) = seeded().await;
        let image = images.create_image(&Image::new(&chunk.id, "/img/1.jpg", "author")).await.unwrap();
        assert!(images.delete_image(&image.id).await.unwrap());
        assert!(!images.delete_image(&image.id).await.unwrap());
        assert_eq!(store.image_count(), 0);
    }
}
