//! Classified errors returned by every DocVault service.
//!
//! Store traits speak `anyhow::Result`; services convert store failures into
//! [`VaultError::Storage`] and everything else into a specific variant. Each
//! variant maps to an [`ErrorKind`], which carries the transport status a
//! front end should use.

use std::fmt;

use serde::Serialize;

/// Coarse classification of a [`VaultError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    NotFound,
    Forbidden,
    UnsupportedType,
    ChunkCreateFailed,
    ChunkDeleteFailed,
    /// Only reported by app-level chunk creation, where per-document errors
    /// are collected instead of raised.
    PartialBatchFailure,
    Conflict,
    InvalidInput,
    Storage,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Forbidden => "FORBIDDEN",
            ErrorKind::UnsupportedType => "UNSUPPORTED_TYPE",
            ErrorKind::ChunkCreateFailed => "CHUNK_CREATE_FAILED",
            ErrorKind::ChunkDeleteFailed => "CHUNK_DELETE_FAILED",
            ErrorKind::PartialBatchFailure => "PARTIAL_BATCH_FAILURE",
            ErrorKind::Conflict => "CONFLICT",
            ErrorKind::InvalidInput => "INVALID_INPUT",
            ErrorKind::Storage => "STORAGE",
        }
    }

    /// HTTP-style status code for this kind.
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorKind::NotFound => 404,
            ErrorKind::Forbidden => 403,
            ErrorKind::UnsupportedType => 415,
            ErrorKind::ChunkCreateFailed | ErrorKind::ChunkDeleteFailed => 500,
            ErrorKind::PartialBatchFailure => 207,
            ErrorKind::Conflict => 409,
            ErrorKind::InvalidInput => 400,
            ErrorKind::Storage => 500,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned by DocVault services.
///
/// The compensated variants carry the underlying cause and any failures
/// hit while rolling back; a non-empty `rollback_errors` means the stores
/// may be inconsistent.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("chunking is only supported for pdf documents (got '{extension}')")]
    UnsupportedType { extension: String },

    #[error("chunk creation failed for document {document_id}: {cause:#}{}", rollback_note(.rollback_errors))]
    ChunkCreateFailed {
        document_id: String,
        cause: anyhow::Error,
        rollback_errors: Vec<String>,
    },

    #[error("chunk deletion failed for document {document_id}: {cause:#}{}", rollback_note(.rollback_errors))]
    ChunkDeleteFailed {
        document_id: String,
        cause: anyhow::Error,
        rollback_errors: Vec<String>,
    },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

fn rollback_note(errors: &[String]) -> String {
    if errors.is_empty() {
        String::new()
    } else {
        format!(" (rollback incomplete: {})", errors.join("; "))
    }
}

impl VaultError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        VaultError::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            VaultError::NotFound { .. } => ErrorKind::NotFound,
            VaultError::Forbidden(_) => ErrorKind::Forbidden,
            VaultError::UnsupportedType { .. } => ErrorKind::UnsupportedType,
            VaultError::ChunkCreateFailed { .. } => ErrorKind::ChunkCreateFailed,
            VaultError::ChunkDeleteFailed { .. } => ErrorKind::ChunkDeleteFailed,
            VaultError::Conflict(_) => ErrorKind::Conflict,
            VaultError::InvalidInput(_) => ErrorKind::InvalidInput,
            VaultError::Storage(_) => ErrorKind::Storage,
        }
    }

    /// Failures recorded while compensating, if this error carries any.
    pub fn rollback_errors(&self) -> &[String] {
        match self {
            VaultError::ChunkCreateFailed {
                rollback_errors, ..
            }
            | VaultError::ChunkDeleteFailed {
                rollback_errors, ..
            } => rollback_errors,
            _ => &[],
        }
    }
}

pub type VaultResult<T> = std::result::Result<T, VaultError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_and_status() {
        let err = VaultError::not_found("document", "d1");
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.kind().status_code(), 404);
        assert_eq!(err.to_string(), "document not found: d1");
    }

    #[test]
    fn test_rollback_errors_in_message() {
        let err = VaultError::ChunkCreateFailed {
            document_id: "d1".into(),
            cause: anyhow::anyhow!("disk full"),
            rollback_errors: vec!["image i1: gone".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("disk full"));
        assert!(msg.contains("rollback incomplete: image i1: gone"));
        assert_eq!(err.rollback_errors().len(), 1);
    }

    #[test]
    fn test_storage_from_anyhow() {
        let err: VaultError = anyhow::anyhow!("connection reset").into();
        assert_eq!(err.kind(), ErrorKind::Storage);
        assert_eq!(err.to_string(), "connection reset");
        assert_eq!(ErrorKind::PartialBatchFailure.to_string(), "PARTIAL_BATCH_FAILURE");
    }
}
