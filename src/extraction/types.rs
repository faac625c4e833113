//! Extraction records, the library boundary trait, and the error taxonomy.

use serde::Serialize;
use thiserror::Error;

/// Errors raised while opening or decoding a PDF.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// The document needs decryption support that this build does not include.
    #[error("Decryption support unavailable: {0}")]
    DependencyMissing(String),
    /// The document is encrypted and the empty-password pass did not unlock it.
    #[error("PDF is encrypted and could not be decrypted: {0}")]
    DocumentEncrypted(String),
    /// Generic failure while parsing the document or a page.
    #[error("Failed to extract PDF text: {0}")]
    ExtractionFailed(String),
}

impl ExtractionError {
    /// Stable identifier reported to clients.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DependencyMissing(_) => "dependency",
            Self::DocumentEncrypted(_) => "encryption",
            Self::ExtractionFailed(_) => "extraction",
        }
    }

    /// Operator-facing hint describing how to resolve the failure.
    pub fn remediation(&self) -> Option<&'static str> {
        match self {
            Self::DependencyMissing(_) => Some(
                "Rebuild with the `encrypted-pdf` feature enabled to process encrypted PDFs.",
            ),
            Self::DocumentEncrypted(_) => Some(
                "The PDF is password protected. Remove the protection or provide the password.",
            ),
            Self::ExtractionFailed(_) => None,
        }
    }
}

/// Text recovered from a single page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageText {
    /// One-based page number.
    pub page_number: u32,
    /// Extracted text; empty when the page failed.
    pub text: String,
    /// Character count of `text`.
    pub char_count: usize,
    /// Whitespace-delimited word count of `text`.
    pub word_count: usize,
    /// Failure recorded for this page, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PageText {
    pub(crate) fn ok(page_number: u32, text: String) -> Self {
        Self {
            page_number,
            char_count: text.chars().count(),
            word_count: count_words(&text),
            text,
            error: None,
        }
    }

    pub(crate) fn failed(page_number: u32, error: String) -> Self {
        Self {
            page_number,
            text: String::new(),
            char_count: 0,
            word_count: 0,
            error: Some(error),
        }
    }
}

/// Document-level extraction result.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExtractedDocument {
    /// Non-empty page texts joined by a blank line.
    pub full_text: String,
    /// One record per page, in page order.
    pub pages: Vec<PageText>,
    /// Number of pages in the document.
    pub page_count: usize,
    /// Character count of `full_text`.
    pub total_chars: usize,
    /// Word count of `full_text`.
    pub total_words: usize,
}

impl ExtractedDocument {
    /// Pages that recorded an extraction failure.
    pub fn failed_pages(&self) -> impl Iterator<Item = &PageText> {
        self.pages.iter().filter(|page| page.error.is_some())
    }
}

/// Page-level access to an opened PDF.
///
/// The lopdf-backed [`super::LopdfSource`] is the production implementation; tests provide
/// scripted sources to exercise per-page failures.
pub trait PdfSource {
    /// One-based page numbers in document order.
    fn page_numbers(&self) -> Vec<u32>;

    /// Extract the text of one page.
    fn page_text(&self, page_number: u32) -> Result<String, ExtractionError>;
}

/// Count whitespace-delimited words.
pub fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}
