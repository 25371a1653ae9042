//! In-memory store implementations for tests and embedding.
//!
//! [`InMemoryStore`] implements all four collection traits over
//! `std::sync::RwLock`-guarded maps. Listings sort by the records'
//! `position`, never by insertion order. [`InMemoryFiles`]
//! implements [`FileStorage`] over a path → bytes map.

use std::collections::{BTreeSet, HashMap};
use std::sync::{PoisonError, RwLock};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use crate::models::{App, Chunk, Document, Image};
use crate::storage::FileStorage;

use super::{AppStore, ChunkStore, DocumentStore, ImageStore};

fn poisoned<T>(_: PoisonError<T>) -> anyhow::Error {
    anyhow!("in-memory store lock poisoned")
}

/// In-memory store for tests and embedded use.
pub struct InMemoryStore {
    apps: RwLock<HashMap<String, App>>,
    documents: RwLock<HashMap<String, Document>>,
    chunks: RwLock<Vec<Chunk>>,
    images: RwLock<HashMap<String, Image>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            apps: RwLock::new(HashMap::new()),
            documents: RwLock::new(HashMap::new()),
            chunks: RwLock::new(Vec::new()),
            images: RwLock::new(HashMap::new()),
        }
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.read().map(|c| c.len()).unwrap_or(0)
    }

    pub fn image_count(&self) -> usize {
        self.images.read().map(|i| i.len()).unwrap_or(0)
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AppStore for InMemoryStore {
    async fn insert_app(&self, app: &App) -> Result<()> {
        let mut apps = self.apps.write().map_err(poisoned)?;
        if apps.contains_key(&app.id) {
            bail!("duplicate app id: {}", app.id);
        }
        apps.insert(app.id.clone(), app.clone());
        Ok(())
    }

    async fn get_app(&self, id: &str) -> Result<Option<App>> {
        Ok(self.apps.read().map_err(poisoned)?.get(id).cloned())
    }

    async fn get_app_by_name(&self, name: &str) -> Result<Option<App>> {
        let apps = self.apps.read().map_err(poisoned)?;
        Ok(apps.values().find(|a| a.name == name).cloned())
    }

    async fn list_apps_by_creator(&self, creator: &str) -> Result<Vec<App>> {
        let apps = self.apps.read().map_err(poisoned)?;
        let mut found: Vec<App> = apps.values().filter(|a| a.creator == creator).cloned().collect();
        found.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(found)
    }

    async fn update_app(&self, app: &App) -> Result<bool> {
        let mut apps = self.apps.write().map_err(poisoned)?;
        match apps.get_mut(&app.id) {
            Some(slot) => {
                *slot = app.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_app(&self, id: &str) -> Result<bool> {
        Ok(self.apps.write().map_err(poisoned)?.remove(id).is_some())
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn insert_document(&self, document: &Document) -> Result<()> {
        let mut docs = self.documents.write().map_err(poisoned)?;
        if docs.contains_key(&document.id) {
            bail!("duplicate document id: {}", document.id);
        }
        docs.insert(document.id.clone(), document.clone());
        Ok(())
    }

    async fn upsert_document(&self, document: &Document) -> Result<()> {
        let mut docs = self.documents.write().map_err(poisoned)?;
        docs.insert(document.id.clone(), document.clone());
        Ok(())
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        Ok(self.documents.read().map_err(poisoned)?.get(id).cloned())
    }

    async fn document_exists(&self, app_id: &str, content_hash: &str, size: u64) -> Result<bool> {
        let docs = self.documents.read().map_err(poisoned)?;
        Ok(docs
            .values()
            .any(|d| d.app_id == app_id && d.content_hash == content_hash && d.size == size))
    }

    async fn list_documents_by_app(&self, app_id: &str) -> Result<Vec<Document>> {
        let docs = self.documents.read().map_err(poisoned)?;
        let mut found: Vec<Document> = docs.values().filter(|d| d.app_id == app_id).cloned().collect();
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.name.cmp(&b.name)));
        Ok(found)
    }

    async fn update_document(&self, document: &Document) -> Result<bool> {
        let mut docs = self.documents.write().map_err(poisoned)?;
        match docs.get_mut(&document.id) {
            Some(slot) => {
                *slot = document.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_document(&self, id: &str) -> Result<bool> {
        Ok(self.documents.write().map_err(poisoned)?.remove(id).is_some())
    }
}

#[async_trait]
impl ChunkStore for InMemoryStore {
    async fn insert_chunk(&self, chunk: &Chunk) -> Result<()> {
        let mut chunks = self.chunks.write().map_err(poisoned)?;
        if chunks.iter().any(|c| c.id == chunk.id) {
            bail!("duplicate chunk id: {}", chunk.id);
        }
        chunks.push(chunk.clone());
        Ok(())
    }

    async fn get_chunk(&self, id: &str) -> Result<Option<Chunk>> {
        let chunks = self.chunks.read().map_err(poisoned)?;
        Ok(chunks.iter().find(|c| c.id == id).cloned())
    }

    async fn list_chunks_by_document(&self, document_id: &str) -> Result<Vec<Chunk>> {
        let chunks = self.chunks.read().map_err(poisoned)?;
        let mut found: Vec<Chunk> = chunks
            .iter()
            .filter(|c| c.document_id == document_id)
            .cloned()
            .collect();
        found.sort_by_key(|c| (c.page, c.position));
        Ok(found)
    }

    async fn delete_chunk(&self, id: &str) -> Result<bool> {
        let mut chunks = self.chunks.write().map_err(poisoned)?;
        let before = chunks.len();
        chunks.retain(|c| c.id != id);
        Ok(chunks.len() < before)
    }
}

#[async_trait]
impl ImageStore for InMemoryStore {
    async fn insert_image(&self, image: &Image) -> Result<()> {
        let mut images = self.images.write().map_err(poisoned)?;
        if images.contains_key(&image.id) {
            bail!("duplicate image id: {}", image.id);
        }
        images.insert(image.id.clone(), image.clone());
        Ok(())
    }

    async fn get_image(&self, id: &str) -> Result<Option<Image>> {
        Ok(self.images.read().map_err(poisoned)?.get(id).cloned())
    }

    async fn list_images_by_chunk(&self, chunk_id: &str) -> Result<Vec<Image>> {
        let images = self.images.read().map_err(poisoned)?;
        let mut found: Vec<Image> = images.values().filter(|i| i.chunk_id == chunk_id).cloned().collect();
        found.sort_by_key(|i| i.position);
        Ok(found)
    }

    async fn update_image(&self, image: &Image) -> Result<bool> {
        let mut images = self.images.write().map_err(poisoned)?;
        match images.get_mut(&image.id) {
            Some(slot) => {
                *slot = image.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_image(&self, id: &str) -> Result<bool> {
        Ok(self.images.write().map_err(poisoned)?.remove(id).is_some())
    }
}

/// In-memory [`FileStorage`]. Paths look like `mem://{APP}/{ext}/{file}`;
/// extracted images live under `mem://{app_id}/{document_id}/`.
#[derive(Default)]
pub struct InMemoryFiles {
    folders: RwLock<BTreeSet<String>>,
    files: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryFiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_folder(&self, app_name: &str) -> bool {
        self.folders.read().map(|f| f.contains(app_name)).unwrap_or(false)
    }

    pub fn read(&self, path: &str) -> Option<Vec<u8>> {
        self.files.read().ok().and_then(|f| f.get(path).cloned())
    }

    /// Place a file directly, the way a chunker drops extracted images.
    pub fn write(&self, path: &str, bytes: &[u8]) -> Result<()> {
        self.files
            .write()
            .map_err(poisoned)?
            .insert(path.to_string(), bytes.to_vec());
        Ok(())
    }

    fn remove_prefix(&self, prefix: &str) -> Result<()> {
        let prefix = format!("mem://{}/", prefix);
        self.files
            .write()
            .map_err(poisoned)?
            .retain(|path, _| !path.starts_with(&prefix));
        Ok(())
    }
}

#[async_trait]
impl FileStorage for InMemoryFiles {
    async fn create_app_folder(&self, app_name: &str) -> Result<()> {
        self.folders.write().map_err(poisoned)?.insert(app_name.to_string());
        Ok(())
    }

    async fn remove_app_folder(&self, app_name: &str) -> Result<()> {
        self.folders.write().map_err(poisoned)?.remove(app_name);
        self.remove_prefix(app_name)
    }

    async fn save_document(
        &self,
        app_name: &str,
        extension: &str,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<String> {
        let path = format!("mem://{}/{}/{}", app_name, extension, file_name);
        let mut files = self.files.write().map_err(poisoned)?;
        if files.contains_key(&path) {
            bail!("{} already exists", path);
        }
        files.insert(path.clone(), bytes.to_vec());
        Ok(path)
    }

    async fn rename_document(&self, file_path: &str, new_file_name: &str) -> Result<String> {
        let mut files = self.files.write().map_err(poisoned)?;
        let dir = file_path.rsplit_once('/').map(|(d, _)| d).unwrap_or("mem:/");
        let new_path = format!("{}/{}", dir, new_file_name);
        if files.contains_key(&new_path) {
            bail!("{} already exists", new_path);
        }
        let bytes = files
            .remove(file_path)
            .ok_or_else(|| anyhow!("file does not exist: {}", file_path))?;
        files.insert(new_path.clone(), bytes);
        Ok(new_path)
    }

    async fn delete_document(&self, file_path: &str) -> Result<()> {
        self.files.write().map_err(poisoned)?.remove(file_path);
        Ok(())
    }

    async fn remove_image_folder(&self, scope: &str) -> Result<()> {
        if scope.is_empty() {
            bail!("empty image scope");
        }
        self.remove_prefix(scope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn chunk(id: &str, document_id: &str, page: u32, position: u32) -> Chunk {
        Chunk {
            id: id.into(),
            document_id: document_id.into(),
            page,
            position,
            tags: vec![],
            images: vec![],
            content: format!("chunk {}", id),
            file_creation_date: None,
            file_mod_date: None,
            creator: "u".into(),
            updater: None,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    #[tokio::test]
    async fn test_chunks_listed_by_page_then_position() {
        let store = InMemoryStore::new();
        store.insert_chunk(&chunk("c3", "d1", 2, 2)).await.unwrap();
        store.insert_chunk(&chunk("c2", "d1", 1, 1)).await.unwrap();
        store.insert_chunk(&chunk("c1", "d1", 1, 0)).await.unwrap();
        store.insert_chunk(&chunk("x", "d2", 1, 0)).await.unwrap();

        let ids: Vec<String> = store
            .list_chunks_by_document("d1")
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec!["c1", "c2", "c3"]);
    }

    #[tokio::test]
    async fn test_duplicate_insert_rejected() {
        let store = InMemoryStore::new();
        store.insert_chunk(&chunk("c1", "d1", 1, 0)).await.unwrap();
        assert!(store.insert_chunk(&chunk("c1", "d1", 1, 0)).await.is_err());
        assert!(store.delete_chunk("c1").await.unwrap());
        assert!(!store.delete_chunk("c1").await.unwrap());
    }

    #[tokio::test]
    async fn test_files_rename_and_remove_folder() {
        let files = InMemoryFiles::new();
        files.create_app_folder("TEST").await.unwrap();
        let path = files.save_document("TEST", "pdf", "a.pdf", b"%PDF").await.unwrap();
        assert_eq!(path, "mem://TEST/pdf/a.pdf");
        let renamed = files.rename_document(&path, "b.pdf").await.unwrap();
        assert_eq!(renamed, "mem://TEST/pdf/b.pdf");
        assert_eq!(files.read(&renamed).unwrap(), b"%PDF");

        assert!(files.save_document("TEST", "pdf", "b.pdf", b"other").await.is_err());

        files.remove_app_folder("TEST").await.unwrap();
        assert!(!files.has_folder("TEST"));
        assert!(files.read(&renamed).is_none());
    }

    #[tokio::test]
    async fn test_image_folder_removal_is_scoped() {
        let files = InMemoryFiles::new();
        files.write("mem://app1/doc1/1_1.jpg", b"a").unwrap();
        files.write("mem://app1/doc2/1_1.jpg", b"b").unwrap();
        files.write("mem://app2/doc3/1_1.jpg", b"c").unwrap();

        files.remove_image_folder("app1/doc1").await.unwrap();
        assert!(files.read("mem://app1/doc1/1_1.jpg").is_none());
        assert!(files.read("mem://app1/doc2/1_1.jpg").is_some());

        files.remove_image_folder("app1").await.unwrap();
        assert!(files.read("mem://app1/doc2/1_1.jpg").is_none());
        assert!(files.read("mem://app2/doc3/1_1.jpg").is_some());
    }
}
