//! PDF chunker.
//!
//! Page text comes from `pdf-extract`, embedded JPEG images and the
//! document info dates from `lopdf`. Parsing is CPU-bound, so the whole
//! pass runs on the blocking pool. Each page is split with
//! [`split_page`]; the page's images ride on its first segment so every
//! picture is recorded exactly once.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use lopdf::Object;
use tracing::debug;

use docvault_core::chunk::{split_page, ChunkParams, ChunkRequest, Chunker, PageSegment};

pub struct PdfChunker {
    data_dir: PathBuf,
}

impl PdfChunker {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }
}

#[async_trait]
impl Chunker for PdfChunker {
    async fn chunk(&self, request: &ChunkRequest) -> Result<Vec<PageSegment>> {
        let bytes = tokio::fs::read(&request.file_path)
            .await
            .with_context(|| format!("Failed to read {}", request.file_path))?;
        let image_dir = image_dir(&self.data_dir, &request.image_scope)?;
        let params = request.params;

        let segments = tokio::task::spawn_blocking(move || chunk_pdf(&bytes, &image_dir, &params))
            .await
            .context("pdf chunking task panicked")??;

        debug!(file = %request.file_path, segments = segments.len(), "pdf chunked");
        Ok(segments)
    }
}

fn image_dir(data_dir: &Path, scope: &str) -> Result<PathBuf> {
    if scope.is_empty() || scope.split('/').any(|part| part.is_empty() || part == "." || part == "..") {
        bail!("invalid image scope: {:?}", scope);
    }
    Ok(data_dir.join(scope))
}

struct PageImage {
    file_name: String,
    bytes: Vec<u8>,
}

fn chunk_pdf(bytes: &[u8], image_dir: &Path, params: &ChunkParams) -> Result<Vec<PageSegment>> {
    let pages = pdf_extract::extract_text_from_mem_by_pages(bytes)
        .map_err(|e| anyhow::anyhow!("PDF text extraction failed: {}", e))?;
    let doc = lopdf::Document::load_mem(bytes).context("Failed to parse PDF structure")?;
    let (creation_date, mod_date) = info_dates(&doc);

    // Stale pictures from an earlier run would otherwise linger.
    if image_dir.exists() {
        std::fs::remove_dir_all(image_dir)
            .with_context(|| format!("Failed to clear {}", image_dir.display()))?;
    }

    let page_ids: Vec<_> = doc.get_pages().into_values().collect();
    let mut segments = Vec::new();

    for (index, text) in pages.iter().enumerate() {
        let page = index as u32 + 1;
        let images = match page_ids.get(index) {
            Some(id) => jpeg_images(&doc, *id, page),
            None => Vec::new(),
        };
        let image_paths = save_images(image_dir, images)?;
        let tags = hashtags(text);

        let mut windows = split_page(text, params);
        if windows.is_empty() && !image_paths.is_empty() {
            windows.push(String::new());
        }

        let mut image_paths = Some(image_paths);
        for content in windows {
            segments.push(PageSegment {
                page,
                tags: tags.clone(),
                images: image_paths.take().unwrap_or_default(),
                content,
                file_creation_date: creation_date.clone(),
                file_mod_date: mod_date.clone(),
            });
        }
    }

    Ok(segments)
}

fn jpeg_images(doc: &lopdf::Document, page_id: lopdf::ObjectId, page: u32) -> Vec<PageImage> {
    let Ok(images) = doc.get_page_images(page_id) else {
        return Vec::new();
    };
    images
        .into_iter()
        .filter(|image| {
            image
                .filters
                .as_ref()
                .is_some_and(|filters| filters.iter().any(|f| f == "DCTDecode"))
        })
        .enumerate()
        .map(|(n, image)| PageImage {
            file_name: format!("{}_{}.jpg", page, n + 1),
            bytes: image.content.to_vec(),
        })
        .collect()
}

fn save_images(dir: &Path, images: Vec<PageImage>) -> Result<Vec<String>> {
    if images.is_empty() {
        return Ok(Vec::new());
    }
    std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    images
        .into_iter()
        .map(|image| {
            let path = dir.join(&image.file_name);
            std::fs::write(&path, &image.bytes)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            Ok(path.to_string_lossy().into_owned())
        })
        .collect()
}

/// `/CreationDate` and `/ModDate` from the trailer's info dictionary, verbatim.
fn info_dates(doc: &lopdf::Document) -> (Option<String>, Option<String>) {
    let info = match doc.trailer.get(b"Info") {
        Ok(Object::Reference(id)) => doc.get_dictionary(*id).ok(),
        Ok(Object::Dictionary(dict)) => Some(dict),
        _ => None,
    };
    let Some(info) = info else {
        return (None, None);
    };
    let read = |key: &[u8]| {
        info.get(key)
            .and_then(Object::as_str)
            .ok()
            .map(|raw| String::from_utf8_lossy(raw).into_owned())
    };
    (read(b"CreationDate"), read(b"ModDate"))
}

/// Distinct `#hashtag` words in order of first appearance, without the `#`.
fn hashtags(text: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for word in text.split_whitespace() {
        let Some(tag) = word.strip_prefix('#') else {
            continue;
        };
        let tag = tag.trim_end_matches(|c: char| !(c.is_alphanumeric() || c == '_' || c == '-'));
        if !tag.is_empty() && !tags.iter().any(|t| t == tag) {
            tags.push(tag.to_string());
        }
    }
    tags
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Stream};
    use tempfile::TempDir;

    /// One-page PDF with a line of text, one DCT image, and an info dictionary.
    fn sample_pdf(text: &str) -> Vec<u8> {
        let mut doc = lopdf::Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let image_id = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => 1,
                "Height" => 1,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
                "Filter" => "DCTDecode",
            },
            vec![0xFF, 0xD8, 0xFF, 0xD9],
        ));
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![100.into(), 700.into()]),
                Operation::new("Tj", vec![Object::string_literal(text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Resources" => dictionary! {
                "Font" => dictionary! { "F1" => font_id },
                "XObject" => dictionary! { "Im1" => image_id },
            },
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        let info_id = doc.add_object(dictionary! {
            "CreationDate" => Object::string_literal("D:20240101120000Z"),
        });
        doc.trailer.set("Root", catalog_id);
        doc.trailer.set("Info", info_id);

        let mut out = Vec::new();
        doc.save_to(&mut out).unwrap();
        out
    }

    #[test]
    fn test_hashtags_are_distinct_and_trimmed() {
        assert_eq!(
            hashtags("see #setup, then #Deploy and #setup again. # alone"),
            vec!["setup".to_string(), "Deploy".to_string()]
        );
    }

    #[test]
    fn test_image_scope_must_stay_relative() {
        let root = Path::new("/data");
        assert!(image_dir(root, "app/doc").is_ok());
        assert!(image_dir(root, "../doc").is_err());
        assert!(image_dir(root, "").is_err());
    }

    #[tokio::test]
    async fn test_chunks_generated_pdf() {
        let tmp = TempDir::new().unwrap();
        let pdf_path = tmp.path().join("manual.pdf");
        std::fs::write(&pdf_path, sample_pdf("vault test phrase #manual")).unwrap();

        let chunker = PdfChunker::new(tmp.path().join("data"));
        let request = ChunkRequest {
            file_path: pdf_path.to_string_lossy().into_owned(),
            image_scope: "app1/doc1".into(),
            params: ChunkParams { size: 500, overlap: 50 },
        };
        let segments = chunker.chunk(&request).await.unwrap();

        assert_eq!(segments.len(), 1);
        let segment = &segments[0];
        assert_eq!(segment.page, 1);
        assert!(segment.content.contains("vault test phrase"));
        assert_eq!(segment.tags, vec!["manual".to_string()]);
        assert_eq!(segment.file_creation_date.as_deref(), Some("D:20240101120000Z"));
        assert_eq!(segment.images.len(), 1);
        assert!(segment.images[0].ends_with("app1/doc1/1_1.jpg"));
        assert_eq!(std::fs::read(&segment.images[0]).unwrap(), vec![0xFF, 0xD8, 0xFF, 0xD9]);
    }

    #[tokio::test]
    async fn test_garbage_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("broken.pdf");
        std::fs::write(&path, b"not a pdf").unwrap();

        let chunker = PdfChunker::new(tmp.path());
        let request = ChunkRequest {
            file_path: path.to_string_lossy().into_owned(),
            image_scope: "a/b".into(),
            params: ChunkParams { size: 500, overlap: 50 },
        };
        assert!(chunker.chunk(&request).await.is_err());
    }
}
