//! Document loading: uploaded file → ordered [`Segment`]s.
//!
//! The loader is selected from a closed set of formats detected by file
//! extension. Each supported [`DocumentFormat`] maps to one extractor
//! function; anything else is [`DocumentFormat::Unsupported`] and fails
//! uniformly with [`RagError::UnsupportedFormat`].
//!
//! | Format | Natural unit | `position` |
//! |--------|--------------|------------|
//! | PDF    | page         | 0-based page index |
//! | DOCX   | block of paragraphs | block index |
//! | Text   | chunk        | chunk index |
//!
//! Loading is all-or-nothing: if extraction fails partway, the segments
//! produced so far are dropped and a [`RagError::ParseFailure`] naming the
//! file is returned.

use std::fmt;
use std::io::{Cursor, Read};
use std::path::Path;
use std::sync::Arc;

use quick_xml::Reader;
use quick_xml::events::Event;
use tracing::{debug, error, info};

use crate::chunking::{Chunker, RecursiveChunker};
use crate::config::RagConfig;
use crate::document::{Segment, SegmentMetadata};
use crate::error::{RagError, Result};
use crate::storage::FileStore;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A file format, detected from the file extension.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DocumentFormat {
    Pdf,
    Docx,
    Text,
    /// Any other extension (lowercase, without the dot; empty if none).
    Unsupported(String),
}

impl DocumentFormat {
    /// Detect the format of `file_id` from its extension, case-insensitively.
    pub fn detect(file_id: &str) -> Self {
        let extension = Path::new(file_id)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match extension.as_str() {
            "pdf" => Self::Pdf,
            "docx" => Self::Docx,
            "txt" => Self::Text,
            _ => Self::Unsupported(extension),
        }
    }

    /// Whether a loader exists for this format.
    pub fn is_supported(&self) -> bool {
        self.extractor().is_some()
    }

    fn extractor(&self) -> Option<Extractor> {
        match self {
            Self::Pdf => Some(extract_pdf),
            Self::Docx => Some(extract_docx),
            Self::Text => Some(extract_text),
            Self::Unsupported(_) => None,
        }
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pdf => f.write_str("pdf"),
            Self::Docx => f.write_str("docx"),
            Self::Text => f.write_str("text"),
            Self::Unsupported(ext) => write!(f, "unsupported({ext})"),
        }
    }
}

/// The raw bytes of an uploaded file together with its detected format.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub file_id: String,
    pub format: DocumentFormat,
    pub bytes: Vec<u8>,
}

/// Raw text pulled out of a file before it becomes segments.
enum Extracted {
    /// One entry per page, in page order.
    Pages(Vec<String>),
    /// Continuous text to be chunked.
    Text(String),
}

type Extractor = fn(&[u8]) -> std::result::Result<Extracted, BoxError>;

/// Converts uploaded files into ordered [`Segment`]s.
///
/// # Example
///
/// ```rust,ignore
/// use dose_rag::{DocumentLoader, LocalFileStore, RagConfig};
///
/// let loader = DocumentLoader::from_config(Arc::new(LocalFileStore::new("uploads")), &RagConfig::default());
/// let segments = loader.load("report.pdf").await?;
/// ```
pub struct DocumentLoader {
    store: Arc<dyn FileStore>,
    chunker: Arc<dyn Chunker>,
}

impl DocumentLoader {
    /// Create a loader reading from `store` and splitting text with `chunker`.
    pub fn new(store: Arc<dyn FileStore>, chunker: Arc<dyn Chunker>) -> Self {
        Self { store, chunker }
    }

    /// Create a loader whose chunker follows the configured size and overlap.
    pub fn from_config(store: Arc<dyn FileStore>, config: &RagConfig) -> Self {
        Self::new(store, Arc::new(RecursiveChunker::new(config.chunk_size, config.chunk_overlap)))
    }

    /// Load one file into segments.
    ///
    /// # Errors
    ///
    /// - [`RagError::FileNotFound`] if the file does not exist or cannot be read
    /// - [`RagError::UnsupportedFormat`] if the extension has no loader
    /// - [`RagError::ParseFailure`] if the contents cannot be decoded
    pub async fn load(&self, file_id: &str) -> Result<Vec<Segment>> {
        let source = self.read(file_id).await?;
        self.parse(&source)
    }

    /// Check existence and format, then read the raw bytes of a file.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::FileNotFound`] or [`RagError::UnsupportedFormat`].
    pub async fn read(&self, file_id: &str) -> Result<SourceFile> {
        if !self.store.exists(file_id).await {
            error!(file_id, "file not found");
            return Err(RagError::FileNotFound { file_id: file_id.to_string() });
        }

        let format = DocumentFormat::detect(file_id);
        if let DocumentFormat::Unsupported(extension) = &format {
            error!(file_id, extension = %extension, "unsupported file type");
            return Err(RagError::UnsupportedFormat {
                file_id: file_id.to_string(),
                extension: extension.clone(),
            });
        }

        let bytes = self.store.read(file_id).await.map_err(|e| {
            error!(file_id, error = %e, "failed to read file");
            RagError::FileNotFound { file_id: file_id.to_string() }
        })?;
        debug!(file_id, %format, bytes = bytes.len(), "read source file");

        Ok(SourceFile { file_id: file_id.to_string(), format, bytes })
    }

    /// Decode an already-read file into segments.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::UnsupportedFormat`] or [`RagError::ParseFailure`].
    pub fn parse(&self, source: &SourceFile) -> Result<Vec<Segment>> {
        let file_id = source.file_id.as_str();
        let Some(extract) = source.format.extractor() else {
            let extension = match &source.format {
                DocumentFormat::Unsupported(ext) => ext.clone(),
                other => other.to_string(),
            };
            return Err(RagError::UnsupportedFormat { file_id: file_id.to_string(), extension });
        };

        let extracted = extract(&source.bytes).map_err(|e| {
            error!(file_id, format = %source.format, error = %e, "failed to parse document");
            RagError::parse(file_id, e)
        })?;

        let format = source.format.to_string();
        let segments: Vec<Segment> = match extracted {
            Extracted::Pages(pages) => pages
                .into_iter()
                .enumerate()
                .filter_map(|(index, text)| {
                    let text = text.trim();
                    (!text.is_empty()).then(|| {
                        let metadata = SegmentMetadata::new(file_id, index)
                            .with_extra("format", format.as_str())
                            .with_extra("page", (index + 1).to_string());
                        Segment::new(text, metadata)
                    })
                })
                .collect(),
            Extracted::Text(text) => self
                .chunker
                .split(&text)
                .into_iter()
                .enumerate()
                .map(|(index, chunk)| {
                    let metadata =
                        SegmentMetadata::new(file_id, index).with_extra("format", format.as_str());
                    Segment::new(chunk, metadata)
                })
                .collect(),
        };

        info!(file_id, format = %source.format, segment_count = segments.len(), "loaded document");
        Ok(segments)
    }
}

fn extract_text(bytes: &[u8]) -> std::result::Result<Extracted, BoxError> {
    let text = std::str::from_utf8(bytes)?;
    Ok(Extracted::Text(text.trim_start_matches('\u{feff}').to_string()))
}

fn extract_pdf(bytes: &[u8]) -> std::result::Result<Extracted, BoxError> {
    let document = lopdf::Document::load_mem(bytes)?;
    let mut pages = Vec::new();
    for page_number in document.get_pages().into_keys() {
        pages.push(document.extract_text(&[page_number])?);
    }
    Ok(Extracted::Pages(pages))
}

fn extract_docx(bytes: &[u8]) -> std::result::Result<Extracted, BoxError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;
    let mut xml = String::new();
    archive.by_name("word/document.xml")?.read_to_string(&mut xml)?;
    let paragraphs = docx_paragraphs(&xml)?;
    Ok(Extracted::Text(paragraphs.join("\n\n")))
}

/// Collect the non-blank paragraphs of a WordprocessingML body.
fn docx_paragraphs(xml: &str) -> std::result::Result<Vec<String>, quick_xml::Error> {
    let mut reader = Reader::from_str(xml);
    let mut paragraphs = Vec::new();
    let mut current = String::new();
    let mut in_text = false;
    // Paragraph properties hold tab stops and run defaults, never text.
    let mut properties_depth = 0usize;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.name().as_ref() {
                b"w:t" => in_text = true,
                b"w:pPr" => properties_depth += 1,
                _ => {}
            },
            Event::End(e) => match e.name().as_ref() {
                b"w:t" => in_text = false,
                b"w:pPr" => properties_depth = properties_depth.saturating_sub(1),
                b"w:p" => {
                    let paragraph = current.trim();
                    if !paragraph.is_empty() {
                        paragraphs.push(paragraph.to_string());
                    }
                    current.clear();
                }
                _ => {}
            },
            Event::Empty(e) if properties_depth == 0 => match e.name().as_ref() {
                b"w:tab" => current.push('\t'),
                b"w:br" | b"w:cr" => current.push('\n'),
                _ => {}
            },
            Event::Text(t) if in_text => current.push_str(&t.unescape()?),
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(paragraphs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_are_detected_case_insensitively() {
        assert_eq!(DocumentFormat::detect("report.PDF"), DocumentFormat::Pdf);
        assert_eq!(DocumentFormat::detect("letter.docx"), DocumentFormat::Docx);
        assert_eq!(DocumentFormat::detect("notes.txt"), DocumentFormat::Text);
        assert_eq!(DocumentFormat::detect("data.csv"), DocumentFormat::Unsupported("csv".into()));
        assert_eq!(DocumentFormat::detect("README"), DocumentFormat::Unsupported(String::new()));
        assert!(!DocumentFormat::detect("legacy.doc").is_supported());
    }

    #[test]
    fn docx_paragraphs_keep_runs_tabs_and_breaks() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
  <w:body>
    <w:p><w:r><w:t>Quarterly</w:t></w:r><w:r><w:t xml:space="preserve"> report</w:t></w:r></w:p>
    <w:p></w:p>
    <w:p><w:r><w:t>Revenue</w:t><w:tab/><w:t>up &amp; right</w:t><w:br/><w:t>Costs flat</w:t></w:r></w:p>
  </w:body>
</w:document>"#;

        let paragraphs = docx_paragraphs(xml).unwrap();
        assert_eq!(paragraphs, vec!["Quarterly report", "Revenue\tup & right\nCosts flat"]);
    }

    #[test]
    fn tab_stop_definitions_are_not_text() {
        let xml = r#"<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
  <w:body>
    <w:p>
      <w:pPr><w:tabs><w:tab w:val="left" w:pos="720"/><w:tab w:val="right" w:pos="9360"/></w:tabs></w:pPr>
      <w:r><w:t>Name</w:t><w:tab/><w:t>Total</w:t></w:r>
    </w:p>
    <w:p>
      <w:r><w:t>Left</w:t></w:r>
      <w:pPr><w:tabs><w:tab w:val="center" w:pos="4680"/></w:tabs></w:pPr>
      <w:r><w:t>Right</w:t></w:r>
    </w:p>
    <w:p><w:pPr><w:tabs><w:tab w:val="left" w:pos="720"/></w:tabs></w:pPr></w:p>
  </w:body>
</w:document>"#;

        let paragraphs = docx_paragraphs(xml).unwrap();
        assert_eq!(paragraphs, vec!["Name\tTotal", "LeftRight"]);
    }

    #[test]
    fn invalid_utf8_text_is_rejected() {
        assert!(extract_text(&[0xff, 0xfe, 0x00, 0x80]).is_err());
    }

    #[test]
    fn garbage_is_not_a_pdf_or_docx() {
        assert!(extract_pdf(b"not a pdf at all").is_err());
        assert!(extract_docx(b"not a zip archive").is_err());
    }
}
