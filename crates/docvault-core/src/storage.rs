//! File storage for uploaded bytes and per-app folders.
//!
//! Layout (relative to the storage root):
//!
//! ```text
//! {APP_NAME}/                       provisioned on app registration
//! {APP_NAME}/{extension}/{file}     uploaded documents
//! {app_id}/{document_id}/           images extracted by the chunker
//! ```

use anyhow::Result;
use async_trait::async_trait;

#[async_trait]
pub trait FileStorage: Send + Sync {
    async fn create_app_folder(&self, app_name: &str) -> Result<()>;

    /// Remove the app folder and everything under it. Missing folders are ignored.
    async fn remove_app_folder(&self, app_name: &str) -> Result<()>;

    /// Store `bytes` and return the path the document can be read back from.
    ///
    /// Fails when the target file already exists.
    async fn save_document(
        &self,
        app_name: &str,
        extension: &str,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<String>;

    /// Rename a stored document within its folder; returns the new path.
    async fn rename_document(&self, file_path: &str, new_file_name: &str) -> Result<String>;

    async fn delete_document(&self, file_path: &str) -> Result<()>;

    /// Remove the folder the chunker extracted images into, `{app_id}` or
    /// `{app_id}/{document_id}`. Missing folders are ignored.
    async fn remove_image_folder(&self, scope: &str) -> Result<()>;
}
