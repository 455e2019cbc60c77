//! Plain-text extraction for uploaded documents.
//!
//! Dispatch is by declared MIME type: PDFs go through `pdf-extract`, JPEG/PNG images
//! through the Tesseract CLI, and Word documents through `docx-rs`. PDFs are always
//! parsed locally; scanned PDFs simply yield little or no text.

mod docx;
mod ocr;
mod pdf;

use tracing::{debug, warn};

use crate::config::OcrConfig;

pub const MIME_PDF: &str = "application/pdf";
pub const MIME_JPEG: &str = "image/jpeg";
pub const MIME_JPG: &str = "image/jpg";
pub const MIME_PNG: &str = "image/png";
pub const MIME_DOCX: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// Families of documents the adapter knows how to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Image,
    Docx,
}

impl DocumentKind {
    /// Parameters such as `; charset=binary` are ignored.
    pub fn from_mime(mime_type: &str) -> Option<Self> {
        let parsed: mime::Mime = mime_type.trim().parse().ok()?;
        match parsed.essence_str().to_ascii_lowercase().as_str() {
            MIME_PDF => Some(Self::Pdf),
            MIME_JPEG | MIME_JPG | MIME_PNG => Some(Self::Image),
            MIME_DOCX => Some(Self::Docx),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("pdf parsing failed: {0}")]
    Pdf(String),
    #[error("ocr failed: {0}")]
    Ocr(String),
    #[error("ocr is disabled")]
    OcrDisabled,
    #[error("docx parsing failed: {0}")]
    Docx(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Stateless adapter turning raw document bytes into text.
#[derive(Debug, Clone, Default)]
pub struct TextExtractor {
    ocr: OcrConfig,
}

impl TextExtractor {
    pub fn new(ocr: OcrConfig) -> Self {
        Self { ocr }
    }

    /// Never fails: any extraction problem is logged and yields an empty string.
    pub fn extract(&self, bytes: &[u8], mime_type: &str) -> String {
        match self.try_extract(bytes, mime_type) {
            Ok(Some(text)) => {
                debug!(mime_type, chars = text.len(), "extracted document text");
                text
            }
            Ok(None) => {
                debug!(mime_type, "no extractor for mime type");
                String::new()
            }
            Err(err) => {
                warn!(mime_type, error = %err, "text extraction failed, storing without text");
                String::new()
            }
        }
    }

    /// Fallible form of [`TextExtractor::extract`]; `Ok(None)` means unsupported type.
    pub fn try_extract(
        &self,
        bytes: &[u8],
        mime_type: &str,
    ) -> Result<Option<String>, ExtractionError> {
        let Some(kind) = DocumentKind::from_mime(mime_type) else {
            return Ok(None);
        };

        let raw = match kind {
            DocumentKind::Pdf => pdf::extract_pdf(bytes)?,
            DocumentKind::Image => ocr::ocr_image(bytes, image_extension(mime_type), &self.ocr)?,
            DocumentKind::Docx => docx::extract_docx(bytes)?,
        };

        Ok(Some(clean_text(&raw)))
    }
}

fn image_extension(mime_type: &str) -> &'static str {
    if mime_type.eq_ignore_ascii_case(MIME_PNG) {
        "png"
    } else {
        "jpg"
    }
}

/// Normalizes line endings, strips trailing spaces and collapses long blank runs.
pub(crate) fn clean_text(raw: &str) -> String {
    let normalized = raw.replace("\r\n", "\n").replace('\r', "\n");
    let mut out = String::with_capacity(normalized.len());
    let mut blank_run = 0usize;

    for line in normalized.lines() {
        let line = line.trim_end();
        if line.is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(line);
        out.push('\n');
    }

    out.trim().to_string()
}
