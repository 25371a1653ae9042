//! Reverse-order undo log for multi-collection writes.
//!
//! Each successful forward step records the [`Undo`] that reverses it. On
//! failure the log is unwound newest-first. Unwinding is best-effort: a
//! failing undo step is logged on the `docvault::rollback` target and
//! collected, and the remaining steps still run. Nothing retries them.

use anyhow::Result;
use tracing::{error, info};

use crate::document::DocumentRegistry;
use crate::models::{Chunk, Document, Image};
use crate::store::{ChunkStore, ImageStore};

/// Tracing target for rollback activity, kept apart from primary failures.
pub const ROLLBACK_TARGET: &str = "docvault::rollback";

#[derive(Debug, Clone)]
pub(crate) enum Undo {
    RemoveImage(String),
    RemoveChunk(String),
    RestoreImage(Image),
    RestoreChunk(Chunk),
    RestoreDocument(Document),
}

impl Undo {
    fn describe(&self) -> String {
        match self {
            Undo::RemoveImage(id) => format!("remove image {}", id),
            Undo::RemoveChunk(id) => format!("remove chunk {}", id),
            Undo::RestoreImage(image) => format!("restore image {}", image.id),
            Undo::RestoreChunk(chunk) => format!("restore chunk {}", chunk.id),
            Undo::RestoreDocument(doc) => format!("restore document {}", doc.id),
        }
    }

    async fn apply(&self, stores: &Stores<'_>) -> Result<()> {
        match self {
            // a record that is already gone needs no removal
            Undo::RemoveImage(id) => stores.images.delete_image(id).await.map(|_| ()),
            Undo::RemoveChunk(id) => stores.chunks.delete_chunk(id).await.map(|_| ()),
            // full snapshot re-insert keeps the original id
            Undo::RestoreImage(image) => stores.images.insert_image(image).await,
            Undo::RestoreChunk(chunk) => stores.chunks.insert_chunk(chunk).await,
            Undo::RestoreDocument(doc) => Ok(stores.documents.restore_document(doc).await?),
        }
    }
}

/// The collections an undo step may touch.
#[derive(Clone, Copy)]
pub(crate) struct Stores<'a> {
    pub documents: &'a DocumentRegistry,
    pub chunks: &'a dyn ChunkStore,
    pub images: &'a dyn ImageStore,
}

#[derive(Debug, Default)]
pub(crate) struct Compensation {
    steps: Vec<Undo>,
}

impl Compensation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, undo: Undo) {
        self.steps.push(undo);
    }

    /// Run every recorded undo step, newest first.
    ///
    /// Returns one message per failed step; empty means the rollback was complete.
    pub async fn unwind(self, stores: Stores<'_>, operation: &str, document_id: &str) -> Vec<String> {
        let total = self.steps.len();
        let mut failures = Vec::new();

        for step in self.steps.into_iter().rev() {
            if let Err(e) = step.apply(&stores).await {
                let what = step.describe();
                let detail = format!("{:#}", e);
                error!(
                    target: ROLLBACK_TARGET,
                    operation,
                    document_id,
                    step = %what,
                    error = %detail,
                    "compensation step failed"
                );
                failures.push(format!("{}: {}", what, detail));
            }
        }

        if failures.is_empty() {
            info!(target: ROLLBACK_TARGET, operation, document_id, steps = total, "rollback complete");
        } else {
            error!(
                target: ROLLBACK_TARGET,
                operation,
                document_id,
                steps = total,
                failed = failures.len(),
                "rollback incomplete, stores may be inconsistent"
            );
        }
        failures
    }
}
