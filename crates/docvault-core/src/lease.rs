//! Per-document mutation leases.
//!
//! Two chunk mutations on the same document must not interleave: both would
//! run the pre-delete step and double-invoke the chunker. The engine takes a
//! [`DocumentLease`] before any document-level write and fails fast with
//! CONFLICT if another task already holds it. The lease is released on drop,
//! which also covers errors and cancelled futures. Leases are process-local.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::{VaultError, VaultResult};

#[derive(Debug, Default)]
pub struct DocumentLeases {
    held: Mutex<HashSet<String>>,
}

impl DocumentLeases {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Claim `document_id`, or fail with CONFLICT if it is already claimed.
    pub fn try_acquire(self: &Arc<Self>, document_id: &str) -> VaultResult<DocumentLease> {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        if !held.insert(document_id.to_string()) {
            return Err(VaultError::Conflict(format!(
                "document {} is busy with another chunk operation",
                document_id
            )));
        }
        Ok(DocumentLease {
            leases: Arc::clone(self),
            document_id: document_id.to_string(),
        })
    }

    pub fn is_held(&self, document_id: &str) -> bool {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(document_id)
    }
}

/// Exclusive claim on one document's chunk set.
#[derive(Debug)]
pub struct DocumentLease {
    leases: Arc<DocumentLeases>,
    document_id: String,
}

impl Drop for DocumentLease {
    fn drop(&mut self) {
        self.leases
            .held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.document_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn test_second_acquire_conflicts_until_drop() {
        let leases = DocumentLeases::new();
        let lease = leases.try_acquire("d1").unwrap();
        assert!(leases.is_held("d1"));

        let err = leases.try_acquire("d1").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert!(leases.try_acquire("d2").is_ok());

        drop(lease);
        assert!(!leases.is_held("d1"));
        assert!(leases.try_acquire("d1").is_ok());
    }
}
