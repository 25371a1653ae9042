//! Chunker interface and the page-level text splitter.
//!
//! A [`Chunker`] turns a stored file into an ordered list of
//! [`PageSegment`]s. The engine treats it as opaque; it only requires the
//! output to be finite, ordered, and deterministic for identical input.
//!
//! [`split_page`] is the splitter shared by chunker implementations. It
//! packs paragraphs (`\n\n`-separated) into windows of at most
//! `size - overlap` characters, hard-splits oversized paragraphs at the
//! nearest whitespace, and then prefixes every window after the first with
//! the tail of its predecessor so consecutive windows share `overlap`
//! characters. Every window is at most `size` characters long.
//!
//! ```rust
//! use docvault_core::chunk::{split_page, ChunkParams};
//!
//! let params = ChunkParams { size: 500, overlap: 50 };
//! let windows = split_page("First paragraph.\n\nSecond paragraph.", &params);
//! assert_eq!(windows.len(), 1);
//! ```

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{VaultError, VaultResult};

/// Window size and overlap, both in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkParams {
    pub size: usize,
    pub overlap: usize,
}

impl ChunkParams {
    pub fn validate(&self) -> VaultResult<()> {
        if self.size == 0 {
            return Err(VaultError::InvalidInput("chunk size must be > 0".into()));
        }
        if self.overlap >= self.size {
            return Err(VaultError::InvalidInput(format!(
                "chunk overlap ({}) must be smaller than chunk size ({})",
                self.overlap, self.size
            )));
        }
        Ok(())
    }
}

/// Input to a [`Chunker`].
#[derive(Debug, Clone)]
pub struct ChunkRequest {
    pub file_path: String,
    /// Where extracted images go, relative to the storage root: `{app_id}/{document_id}`.
    pub image_scope: String,
    pub params: ChunkParams,
}

/// One unit of chunker output. Becomes exactly one chunk record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageSegment {
    pub page: u32,
    pub tags: Vec<String>,
    /// Paths of images extracted for this segment.
    pub images: Vec<String>,
    pub content: String,
    pub file_creation_date: Option<String>,
    pub file_mod_date: Option<String>,
}

#[async_trait]
pub trait Chunker: Send + Sync {
    async fn chunk(&self, request: &ChunkRequest) -> Result<Vec<PageSegment>>;
}

/// Split one page of text into overlapping windows.
///
/// Blank pages produce no windows. `params` must satisfy
/// [`ChunkParams::validate`].
pub fn split_page(text: &str, params: &ChunkParams) -> Vec<String> {
    let budget = params.size.saturating_sub(params.overlap).max(1);
    let windows = pack_paragraphs(text, budget);
    if params.overlap == 0 {
        return windows;
    }

    let mut out: Vec<String> = Vec::with_capacity(windows.len());
    for (i, window) in windows.iter().enumerate() {
        if i == 0 {
            out.push(window.clone());
            continue;
        }
        // one char of the overlap budget goes to the joining space
        let tail = overlap_tail(&windows[i - 1], params.overlap - 1);
        let tail = tail.trim();
        if tail.is_empty() {
            out.push(window.clone());
        } else {
            out.push(format!("{} {}", tail, window));
        }
    }
    out
}

fn pack_paragraphs(text: &str, max_chars: usize) -> Vec<String> {
    let mut windows = Vec::new();
    let mut current = String::new();

    for para in text.split("\n\n") {
        let trimmed = para.trim();
        if trimmed.is_empty() {
            continue;
        }
        let para_len = trimmed.chars().count();

        let would_be = if current.is_empty() {
            para_len
        } else {
            current.chars().count() + 2 + para_len
        };
        if would_be > max_chars && !current.is_empty() {
            windows.push(std::mem::take(&mut current));
        }

        if para_len > max_chars {
            hard_split(trimmed, max_chars, &mut windows);
        } else {
            if !current.is_empty() {
                current.push_str("\n\n");
            }
            current.push_str(trimmed);
        }
    }

    if !current.is_empty() {
        windows.push(current);
    }
    windows
}

fn hard_split(paragraph: &str, max_chars: usize, windows: &mut Vec<String>) {
    let mut remaining = paragraph;
    while !remaining.is_empty() {
        let limit = byte_offset_of_char(remaining, max_chars);
        let split_at = if limit < remaining.len() {
            remaining[..limit]
                .rfind(['\n', ' '])
                .filter(|&pos| pos > 0)
                .map(|pos| pos + 1)
                .unwrap_or(limit)
        } else {
            limit
        };
        let piece = remaining[..split_at].trim();
        if !piece.is_empty() {
            windows.push(piece.to_string());
        }
        remaining = remaining[split_at..].trim_start();
    }
}

/// Byte offset of the `n`th char, or the string length if shorter.
fn byte_offset_of_char(s: &str, n: usize) -> usize {
    s.char_indices().nth(n).map(|(i, _)| i).unwrap_or(s.len())
}

/// Last `n` chars of `s`, starting at a word boundary when one is available.
fn overlap_tail(s: &str, n: usize) -> &str {
    let count = s.chars().count();
    if n >= count {
        return s;
    }
    let start = byte_offset_of_char(s, count - n);
    let tail = &s[start..];
    if s[..start].ends_with(char::is_whitespace) {
        return tail;
    }
    match tail.find(char::is_whitespace) {
        Some(pos) => &tail[pos..],
        None => tail,
    }
}
