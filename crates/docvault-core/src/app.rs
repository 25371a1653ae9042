//! App registry: named workspaces that own documents.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::access::Actor;
use crate::error::{VaultError, VaultResult};
use crate::models::{new_id, App};
use crate::storage::FileStorage;
use crate::store::AppStore;

/// Fields a creator may change after registration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppDetails {
    pub description: Option<String>,
    pub keywords: Vec<String>,
}

/// Check the four-uppercase-letter app name rule (`^[A-Z]{4}$`).
pub fn validate_app_name(name: &str) -> VaultResult<()> {
    if name.len() == 4 && name.bytes().all(|b| b.is_ascii_uppercase()) {
        Ok(())
    } else {
        Err(VaultError::InvalidInput(format!(
            "app name must be exactly four uppercase letters (e.g. 'ABCD'), got '{}'",
            name
        )))
    }
}

#[derive(Clone)]
pub struct AppRegistry {
    pub(crate) apps: Arc<dyn AppStore>,
    files: Arc<dyn FileStorage>,
}

impl AppRegistry {
    pub fn new(apps: Arc<dyn AppStore>, files: Arc<dyn FileStorage>) -> Self {
        Self { apps, files }
    }

    /// Register a new app and provision its storage folder.
    ///
    /// If the folder cannot be created the record is removed again.
    pub async fn register_app(&self, name: &str, details: AppDetails, actor: &Actor) -> VaultResult<App> {
        validate_app_name(name)?;
        if self.apps.get_app_by_name(name).await?.is_some() {
            return Err(VaultError::Conflict(format!("app name '{}' is already taken", name)));
        }

        let app = App {
            id: new_id(),
            name: name.to_string(),
            description: details.description,
            keywords: details.keywords,
            creator: actor.id().to_string(),
            updater: None,
            created_at: Utc::now(),
            updated_at: None,
        };
        self.apps.insert_app(&app).await?;

        if let Err(e) = self.files.create_app_folder(&app.name).await {
            warn!(app = %app.name, error = %e, "app folder provisioning failed, removing record");
            if let Err(undo) = self.apps.delete_app(&app.id).await {
                warn!(target: crate::compensation::ROLLBACK_TARGET, app_id = %app.id, error = %undo, "could not remove app record");
            }
            return Err(VaultError::Storage(e.context("failed to create app folder")));
        }

        info!(app_id = %app.id, app = %app.name, "app registered");
        Ok(app)
    }

    pub async fn get_app(&self, id: &str) -> VaultResult<App> {
        self.apps
            .get_app(id)
            .await?
            .ok_or_else(|| VaultError::not_found("app", id))
    }

    pub async fn list_apps(&self, actor: &Actor) -> VaultResult<Vec<App>> {
        Ok(self.apps.list_apps_by_creator(actor.id()).await?)
    }

    pub async fn update_app(&self, id: &str, details: AppDetails, actor: &Actor) -> VaultResult<App> {
        let mut app = self.get_app(id).await?;
        if !actor.owns(&app.creator) {
            return Err(VaultError::Forbidden(format!("only the creator may update app {}", app.name)));
        }

        app.description = details.description;
        app.keywords = details.keywords;
        app.updater = Some(actor.id().to_string());
        app.updated_at = Some(Utc::now());

        if !self.apps.update_app(&app).await? {
            return Err(VaultError::not_found("app", id));
        }
        Ok(app)
    }

    /// Delete the app record, its storage folder, and its image folder.
    ///
    /// Document and chunk records are not touched here; callers that want
    /// a cascade remove them first.
    pub async fn delete_app(&self, id: &str, actor: &Actor) -> VaultResult<App> {
        let app = self.get_app(id).await?;
        if !actor.owns(&app.creator) {
            return Err(VaultError::Forbidden(format!("only the creator may delete app {}", app.name)));
        }

        self.files.remove_app_folder(&app.name).await?;
        self.files.remove_image_folder(&app.id).await?;
        if !self.apps.delete_app(&app.id).await? {
            return Err(VaultError::not_found("app", id));
        }
        info!(app_id = %app.id, app = %app.name, "app deleted");
        Ok(app)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::{InMemoryFiles, InMemoryStore};
    use crate::ErrorKind;

    fn registry() -> (AppRegistry, Arc<InMemoryFiles>) {
        let files = Arc::new(InMemoryFiles::new());
        (AppRegistry::new(Arc::new(InMemoryStore::new()), files.clone()), files)
    }

    #[test]
    fn test_app_name_rule() {
        assert!(validate_app_name("TEST").is_ok());
        for bad in ["abcd", "ABC", "ABCDE", "AB1D", "ÄBCD"] {
            assert!(validate_app_name(bad).is_err(), "{} should be rejected", bad);
        }
    }

    #[tokio::test]
    async fn test_register_provisions_folder_and_rejects_duplicates() {
        let (apps, files) = registry();
        let alice = Actor::new("alice");

        let app = apps.register_app("TEST", AppDetails::default(), &alice).await.unwrap();
        assert_eq!(app.creator, "alice");
        assert!(files.has_folder("TEST"));

        let err = apps
            .register_app("TEST", AppDetails::default(), &Actor::new("bob"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let err = apps.register_app("test", AppDetails::default(), &alice).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn test_only_creator_updates_and_deletes() {
        let (apps, files) = registry();
        let alice = Actor::new("alice");
        let bob = Actor::new("bob");
        let app = apps.register_app("DOCS", AppDetails::default(), &alice).await.unwrap();

        let details = AppDetails {
            description: Some("manuals".into()),
            keywords: vec!["pdf".into()],
        };
        let err = apps.update_app(&app.id, details.clone(), &bob).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        let updated = apps.update_app(&app.id, details, &alice).await.unwrap();
        assert_eq!(updated.description.as_deref(), Some("manuals"));
        assert_eq!(updated.updater.as_deref(), Some("alice"));

        let image = format!("mem://{}/doc1/1_1.jpg", app.id);
        files.write(&image, b"jpg").unwrap();

        assert_eq!(apps.delete_app(&app.id, &bob).await.unwrap_err().kind(), ErrorKind::Forbidden);
        assert!(files.read(&image).is_some());
        apps.delete_app(&app.id, &alice).await.unwrap();
        assert!(!files.has_folder("DOCS"));
        assert!(files.read(&image).is_none());
        assert_eq!(apps.get_app(&app.id).await.unwrap_err().kind(), ErrorKind::NotFound);
        assert!(apps.list_apps(&alice).await.unwrap().is_empty());
    }
}
