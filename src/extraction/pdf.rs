use super::types::{ExtractedDocument, ExtractionError, PageText, PdfSource, count_words};
use lopdf::Document;

/// [`PdfSource`] backed by an in-memory lopdf document.
pub struct LopdfSource {
    document: Document,
}

impl LopdfSource {
    /// Parse a PDF byte stream, attempting one empty-password decryption pass when the
    /// document is encrypted.
    ///
    /// lopdf already decrypts with the empty password while loading and records the
    /// encryption state; only documents it could not open that way are retried here.
    pub fn open(bytes: &[u8]) -> Result<Self, ExtractionError> {
        let mut document = Document::load_mem(bytes).map_err(classify_load_error)?;
        if document.is_encrypted() {
            if document.encryption_state.is_some() {
                tracing::debug!("PDF opened with the empty password");
            } else {
                tracing::info!("PDF is encrypted; trying empty password");
                decrypt_with_empty_password(&mut document)?;
                tracing::debug!("PDF decrypted");
            }
        }
        Ok(Self { document })
    }
}

impl PdfSource for LopdfSource {
    fn page_numbers(&self) -> Vec<u32> {
        self.document.get_pages().keys().copied().collect()
    }

    fn page_text(&self, page_number: u32) -> Result<String, ExtractionError> {
        self.document
            .extract_text(&[page_number])
            .map_err(|err| ExtractionError::ExtractionFailed(err.to_string()))
    }
}

#[cfg(feature = "encrypted-pdf")]
fn decrypt_with_empty_password(document: &mut Document) -> Result<(), ExtractionError> {
    document
        .decrypt("")
        .map_err(|err| ExtractionError::DocumentEncrypted(err.to_string()))
}

#[cfg(not(feature = "encrypted-pdf"))]
fn decrypt_with_empty_password(_document: &mut Document) -> Result<(), ExtractionError> {
    Err(ExtractionError::DependencyMissing(
        "document is encrypted and this build has no decryption support".into(),
    ))
}

fn classify_load_error(err: lopdf::Error) -> ExtractionError {
    match err {
        lopdf::Error::Decryption(inner) => ExtractionError::DocumentEncrypted(inner.to_string()),
        other => ExtractionError::ExtractionFailed(other.to_string()),
    }
}

/// Open a PDF byte stream and extract every page.
pub fn extract_pdf(bytes: &[u8]) -> Result<ExtractedDocument, ExtractionError> {
    let source = LopdfSource::open(bytes)?;
    Ok(extract_document(&source))
}

/// Extract every page of an opened document, recording per-page failures.
pub fn extract_document(source: &dyn PdfSource) -> ExtractedDocument {
    let page_numbers = source.page_numbers();
    let mut pages = Vec::with_capacity(page_numbers.len());

    for page_number in page_numbers {
        match source.page_text(page_number) {
            Ok(text) => pages.push(PageText::ok(page_number, text)),
            Err(err) => {
                tracing::warn!(page = page_number, error = %err, "Page extraction failed");
                pages.push(PageText::failed(page_number, err.to_string()));
            }
        }
    }

    let full_text = pages
        .iter()
        .map(|page| page.text.trim())
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n");

    tracing::debug!(
        pages = pages.len(),
        failed = pages.iter().filter(|page| page.error.is_some()).count(),
        chars = full_text.chars().count(),
        "Extraction finished"
    );

    ExtractedDocument {
        page_count: pages.len(),
        total_chars: full_text.chars().count(),
        total_words: count_words(&full_text),
        full_text,
        pages,
    }
}
