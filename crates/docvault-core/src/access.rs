//! Actors and authorization capabilities.
//!
//! Every entry point receives an [`Actor`] resolved by the authentication
//! layer. Once ownership of a document chain has been checked, the engine
//! mints a [`Grant`] and passes it down instead of re-checking. Grants can
//! only be constructed inside this crate, so callers cannot skip the check.

use serde::{Deserialize, Serialize};

use crate::error::{VaultError, VaultResult};
use crate::models::Document;

/// A resolved user identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Actor(String);

impl Actor {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self(user_id.into())
    }

    pub fn id(&self) -> &str {
        &self.0
    }

    /// True when this actor is the recorded creator.
    pub fn owns(&self, creator: &str) -> bool {
        self.0 == creator
    }

    /// Chunk and image rule: the record's creator or the owning app's creator.
    pub fn manages(&self, creator: &str, app_creator: Option<&str>) -> bool {
        self.owns(creator) || app_creator.is_some_and(|c| self.owns(c))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum GrantScope {
    App(String),
    Document(String),
}

/// Proof that `actor` was authorized for an app or a single document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grant {
    actor: Actor,
    scope: GrantScope,
}

impl Grant {
    pub(crate) fn for_app(actor: Actor, app_id: &str) -> Self {
        Self {
            actor,
            scope: GrantScope::App(app_id.to_string()),
        }
    }

    pub(crate) fn for_document(actor: Actor, document_id: &str) -> Self {
        Self {
            actor,
            scope: GrantScope::Document(document_id.to_string()),
        }
    }

    pub fn actor(&self) -> &Actor {
        &self.actor
    }

    pub fn covers(&self, document: &Document) -> bool {
        match &self.scope {
            GrantScope::App(app_id) => *app_id == document.app_id,
            GrantScope::Document(document_id) => *document_id == document.id,
        }
    }
}

/// How a document-level call is authorized.
#[derive(Debug, Clone)]
pub enum Access {
    /// Ownership still has to be checked.
    Actor(Actor),
    /// Ownership was already established further up the call chain.
    Granted(Grant),
}

impl Access {
    pub fn actor(&self) -> &Actor {
        match self {
            Access::Actor(actor) => actor,
            Access::Granted(grant) => grant.actor(),
        }
    }

    /// Resolve this access into a grant for `document`, or fail with FORBIDDEN.
    pub fn authorize(self, document: &Document, action: &str) -> VaultResult<Grant> {
        match self {
            Access::Granted(grant) if grant.covers(document) => Ok(grant),
            Access::Granted(grant) => Err(VaultError::Forbidden(format!(
                "grant held by {} does not cover document {}",
                grant.actor().id(),
                document.id
            ))),
            Access::Actor(actor) if actor.owns(&document.creator) => {
                Ok(Grant::for_document(actor, &document.id))
            }
            Access::Actor(actor) => Err(VaultError::Forbidden(format!(
                "{} may not {} on document {}",
                actor.id(),
                action,
                document.id
            ))),
        }
    }
}

impl From<Actor> for Access {
    fn from(actor: Actor) -> Self {
        Access::Actor(actor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn doc(id: &str, app_id: &str, creator: &str) -> Document {
        Document {
            id: id.into(),
            app_id: app_id.into(),
            name: "a.pdf".into(),
            content_hash: "h".into(),
            size: 1,
            file_path: "/tmp/a.pdf".into(),
            mime_type: "application/pdf".into(),
            extension: "pdf".into(),
            creator: creator.into(),
            updater: None,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    #[test]
    fn test_actor_must_own_document() {
        let d = doc("d1", "a1", "alice");
        assert!(Access::Actor(Actor::new("alice")).authorize(&d, "create chunks").is_ok());
        let err = Access::Actor(Actor::new("bob"))
            .authorize(&d, "create chunks")
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Forbidden);
    }

    #[test]
    fn test_app_grant_covers_its_documents_only() {
        let grant = Grant::for_app(Actor::new("alice"), "a1");
        assert!(grant.covers(&doc("d1", "a1", "bob")));
        assert!(!grant.covers(&doc("d2", "a2", "alice")));
        assert!(Access::Granted(grant)
            .authorize(&doc("d2", "a2", "alice"), "delete chunks")
            .is_err());
    }

    #[test]
    fn test_manages_accepts_app_creator() {
        let actor = Actor::new("owner");
        assert!(actor.manages("someone", Some("owner")));
        assert!(!actor.manages("someone", None));
    }
}
