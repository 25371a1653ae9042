//! Core records stored by DocVault.
//!
//! Ownership is strictly tree-shaped: an [`App`] owns [`Document`]s, a
//! document owns [`Chunk`]s, and a chunk owns [`Image`]s. Identifiers are
//! UUID v4 strings assigned before the record is persisted, so a chunk's id
//! is known while its images are still being written.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::chunk::PageSegment;

/// Generate a fresh record identifier.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// A named workspace. `name` is always four uppercase ASCII letters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct App {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub keywords: Vec<String>,
    pub creator: String,
    pub updater: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// An uploaded source file scoped to an [`App`].
///
/// `(app_id, content_hash, size)` is unique across the collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub app_id: String,
    pub name: String,
    pub content_hash: String,
    pub size: u64,
    pub file_path: String,
    pub mime_type: String,
    pub extension: String,
    pub creator: String,
    pub updater: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// A page-scoped unit of text, tags and images derived from a [`Document`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub page: u32,
    /// Index of the chunk in its document's chunker output. Listing sorts
    /// by `(page, position)`, so re-inserted records land where they were.
    pub position: u32,
    pub tags: Vec<String>,
    /// Ids of the [`Image`]s created for this chunk, in extraction order.
    pub images: Vec<String>,
    pub content: String,
    pub file_creation_date: Option<String>,
    pub file_mod_date: Option<String>,
    pub creator: String,
    pub updater: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Chunk {
    /// Build an unpersisted chunk for the `position`-th segment of `document_id`.
    ///
    /// The image list starts empty; the engine fills it as each image
    /// record is written.
    pub fn from_segment(document_id: &str, position: u32, segment: &PageSegment, creator: &str) -> Self {
        Self {
            id: new_id(),
            document_id: document_id.to_string(),
            page: segment.page,
            position,
            tags: segment.tags.clone(),
            images: Vec::new(),
            content: segment.content.clone(),
            file_creation_date: segment.file_creation_date.clone(),
            file_mod_date: segment.file_mod_date.clone(),
            creator: creator.to_string(),
            updater: None,
            created_at: Utc::now(),
            updated_at: None,
        }
    }
}

/// An extracted picture belonging to one [`Chunk`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Image {
    pub id: String,
    pub chunk_id: String,
    /// Extraction order within the chunk.
    pub position: u32,
    /// File-system path of the extracted picture.
    pub image_url: String,
    pub image_description: Option<String>,
    pub creator: String,
    pub updater: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Image {
    pub fn new(chunk_id: &str, image_url: &str, creator: &str) -> Self {
        Self {
            id: new_id(),
            chunk_id: chunk_id.to_string(),
            position: 0,
            image_url: image_url.to_string(),
            image_description: None,
            creator: creator.to_string(),
            updater: None,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    /// Same image at extraction slot `position`.
    pub fn at(mut self, position: u32) -> Self {
        self.position = position;
        self
    }
}
