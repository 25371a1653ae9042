//! On-disk [`FileStorage`] rooted at `storage.data_dir`.

use std::path::{Component, Path, PathBuf};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use docvault_core::storage::FileStorage;

pub struct DiskStorage {
    root: PathBuf,
}

impl DiskStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `relative` under the root, rejecting anything that could escape it.
    fn resolve(&self, relative: &str) -> Result<PathBuf> {
        let rel = Path::new(relative);
        if rel
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            bail!("path escapes storage root: {}", relative);
        }
        Ok(self.root.join(rel))
    }

    /// Accept only paths this storage handed out.
    fn owned(&self, file_path: &str) -> Result<PathBuf> {
        let path = PathBuf::from(file_path);
        let relative = path
            .strip_prefix(&self.root)
            .with_context(|| format!("{} is outside the storage root", file_path))?;
        let relative = relative
            .to_str()
            .with_context(|| format!("non UTF-8 path: {}", file_path))?;
        self.resolve(relative)
    }
}

fn single_name(name: &str) -> Result<&str> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        bail!("invalid file name: {:?}", name);
    }
    Ok(name)
}

#[async_trait]
impl FileStorage for DiskStorage {
    async fn create_app_folder(&self, app_name: &str) -> Result<()> {
        let dir = self.resolve(single_name(app_name)?)?;
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        Ok(())
    }

    async fn remove_app_folder(&self, app_name: &str) -> Result<()> {
        let dir = self.resolve(single_name(app_name)?)?;
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to remove {}", dir.display())),
        }
    }

    async fn save_document(
        &self,
        app_name: &str,
        extension: &str,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<String> {
        let dir = self.resolve(&format!("{}/{}", single_name(app_name)?, single_name(extension)?))?;
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join(single_name(file_name)?);
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .with_context(|| format!("Failed to create {}", path.display()))?;
        file.write_all(bytes)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        file.flush().await?;
        debug!(path = %path.display(), bytes = bytes.len(), "document saved");
        Ok(path.to_string_lossy().into_owned())
    }

    async fn rename_document(&self, file_path: &str, new_file_name: &str) -> Result<String> {
        let from = self.owned(file_path)?;
        let dir = from
            .parent()
            .with_context(|| format!("{} has no parent folder", file_path))?;
        let to = dir.join(single_name(new_file_name)?);
        if tokio::fs::try_exists(&to).await? {
            bail!("{} already exists", to.display());
        }
        tokio::fs::rename(&from, &to)
            .await
            .with_context(|| format!("Failed to rename {}", from.display()))?;
        Ok(to.to_string_lossy().into_owned())
    }

    async fn delete_document(&self, file_path: &str) -> Result<()> {
        let path = self.owned(file_path)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to delete {}", path.display())),
        }
    }

    async fn remove_image_folder(&self, scope: &str) -> Result<()> {
        for part in scope.split('/') {
            single_name(part)?;
        }
        let dir = self.resolve(scope)?;
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {
                debug!(dir = %dir.display(), "image folder removed");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to remove {}", dir.display())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_save_rename_delete() {
        let tmp = TempDir::new().unwrap();
        let storage = DiskStorage::new(tmp.path());
        storage.create_app_folder("TEST").await.unwrap();

        let path = storage.save_document("TEST", "pdf", "a.pdf", b"%PDF").await.unwrap();
        assert!(path.ends_with("TEST/pdf/a.pdf"));
        assert_eq!(std::fs::read(&path).unwrap(), b"%PDF");
        // an existing file is never overwritten
        assert!(storage.save_document("TEST", "pdf", "a.pdf", b"other").await.is_err());
        assert_eq!(std::fs::read(&path).unwrap(), b"%PDF");

        let renamed = storage.rename_document(&path, "b.pdf").await.unwrap();
        assert!(Path::new(&renamed).exists());
        assert!(!Path::new(&path).exists());

        storage.delete_document(&renamed).await.unwrap();
        assert!(!Path::new(&renamed).exists());
        // deleting twice is fine
        storage.delete_document(&renamed).await.unwrap();

        storage.remove_app_folder("TEST").await.unwrap();
        assert!(!tmp.path().join("TEST").exists());
    }

    #[tokio::test]
    async fn test_remove_image_folder() {
        let tmp = TempDir::new().unwrap();
        let storage = DiskStorage::new(tmp.path());
        let doc_dir = tmp.path().join("app1/doc1");
        std::fs::create_dir_all(&doc_dir).unwrap();
        std::fs::write(doc_dir.join("1_1.jpg"), b"jpg").unwrap();
        std::fs::create_dir_all(tmp.path().join("app1/doc2")).unwrap();

        storage.remove_image_folder("app1/doc1").await.unwrap();
        assert!(!doc_dir.exists());
        assert!(tmp.path().join("app1/doc2").exists());
        // missing folders are fine
        storage.remove_image_folder("app1/doc1").await.unwrap();

        assert!(storage.remove_image_folder("").await.is_err());
        assert!(storage.remove_image_folder("app1/../..").await.is_err());
        storage.remove_image_folder("app1").await.unwrap();
        assert!(!tmp.path().join("app1").exists());
    }

    #[tokio::test]
    async fn test_rejects_paths_outside_root() {
        let tmp = TempDir::new().unwrap();
        let storage = DiskStorage::new(tmp.path().join("data"));

        assert!(storage.save_document("TEST", "pdf", "../x.pdf", b"x").await.is_err());
        assert!(storage.delete_document("/etc/passwd").await.is_err());
        let sneaky = format!("{}/data/../outside", tmp.path().display());
        assert!(storage.delete_document(&sneaky).await.is_err());
    }
}
