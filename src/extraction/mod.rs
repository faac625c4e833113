//! PDF text extraction.
//!
//! Extraction is best effort at page granularity: a page that fails keeps a record with its
//! `error` set and empty text, and the remaining pages are still read. Document-level failures
//! are classified into three kinds (missing decryption support, encrypted document, generic
//! failure) so callers can show the matching remediation text.

mod pdf;
mod types;

pub use pdf::{LopdfSource, extract_document, extract_pdf};
pub use types::{ExtractedDocument, ExtractionError, PageText, PdfSource, count_words};
