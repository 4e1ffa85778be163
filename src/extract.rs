//! Text extraction collaborators.
//!
//! The pipeline treats format-specific parsing as an external concern behind
//! the [`TextExtractor`] trait. The built-in registry covers the text-native
//! formats (plain text, markdown, logs, CSV) and HTML; binary formats such as
//! PDF and DOCX fail with [`RagError::UnsupportedFormat`] unless a caller
//! registers an extractor for them.

use scraper::{Html, Selector};

use crate::types::RagError;

/// Document content type, detected from the filename extension.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ContentType {
    Pdf,
    Docx,
    PlainText,
    Csv,
    Spreadsheet,
    Html,
    Unknown,
}

impl ContentType {
    /// Maps a filename to a content type by its extension, case-insensitive.
    #[must_use]
    pub fn detect(filename: &str) -> Self {
        let lowered = filename.to_ascii_lowercase();
        let ext = lowered.rsplit_once('.').map(|(_, ext)| ext).unwrap_or("");
        match ext {
            "pdf" => ContentType::Pdf,
            "docx" => ContentType::Docx,
            "txt" | "log" | "md" => ContentType::PlainText,
            "csv" => ContentType::Csv,
            "xls" | "xlsx" => ContentType::Spreadsheet,
            "html" | "htm" => ContentType::Html,
            _ => ContentType::Unknown,
        }
    }

    /// MIME-style label stored on the document record.
    #[must_use]
    pub fn as_mime(&self) -> &'static str {
        match self {
            ContentType::Pdf => "application/pdf",
            ContentType::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            ContentType::PlainText => "text/plain",
            ContentType::Csv => "text/csv",
            ContentType::Spreadsheet => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            }
            ContentType::Html => "text/html",
            ContentType::Unknown => "application/octet-stream",
        }
    }
}

/// Converts raw document bytes into text. Pure per call; implementations
/// must not keep state between extractions.
pub trait TextExtractor: Send + Sync {
    fn supports(&self, content_type: ContentType) -> bool;
    fn extract(&self, bytes: &[u8]) -> Result<String, RagError>;
}

/// Lossy UTF-8 decoding for text-native formats.
///
/// CSV is deliberately passed through as-is: rows and separators survive as
/// plain text, which is what the chunker and lexical scorer operate on.
pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn supports(&self, content_type: ContentType) -> bool {
        matches!(content_type, ContentType::PlainText | ContentType::Csv)
    }

    fn extract(&self, bytes: &[u8]) -> Result<String, RagError> {
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }
}

/// Extracts visible text from HTML, dropping markup, scripts, and styles.
pub struct HtmlExtractor;

impl TextExtractor for HtmlExtractor {
    fn supports(&self, content_type: ContentType) -> bool {
        content_type == ContentType::Html
    }

    fn extract(&self, bytes: &[u8]) -> Result<String, RagError> {
        let raw = String::from_utf8_lossy(bytes);
        let document = Html::parse_document(&raw);
        let body_selector = Selector::parse("body")
            .map_err(|err| RagError::UnsupportedFormat(format!("html selector: {err}")))?;
        let skip_selector = Selector::parse("script, style, noscript")
            .map_err(|err| RagError::UnsupportedFormat(format!("html selector: {err}")))?;

        // Text nodes under script/style are reachable from the body's
        // recursive text iterator; mark them by slice address and skip.
        let mut skip = std::collections::HashSet::new();
        for element in document.select(&skip_selector) {
            for text in element.text() {
                skip.insert(text.as_ptr() as usize);
            }
        }

        let root = document
            .select(&body_selector)
            .next()
            .unwrap_or_else(|| document.root_element());
        let fragments: Vec<&str> = root
            .text()
            .filter(|text| !skip.contains(&(text.as_ptr() as usize)))
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .collect();
        Ok(fragments.join("\n"))
    }
}

/// Ordered collection of extractors; the first one that supports the content
/// type wins.
pub struct ExtractorRegistry {
    extractors: Vec<Box<dyn TextExtractor>>,
}

impl ExtractorRegistry {
    /// Registry with the built-in plain-text and HTML extractors.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self {
            extractors: vec![Box::new(PlainTextExtractor), Box::new(HtmlExtractor)],
        }
    }

    /// Empty registry for callers that want full control.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            extractors: Vec::new(),
        }
    }

    /// Adds an extractor; later registrations take precedence over the
    /// defaults only for content types the defaults do not claim.
    pub fn register(&mut self, extractor: Box<dyn TextExtractor>) {
        self.extractors.push(extractor);
    }

    /// Extracts text for the given content type, or fails with
    /// `UnsupportedFormat` when no registered extractor claims it.
    pub fn extract(&self, bytes: &[u8], content_type: ContentType) -> Result<String, RagError> {
        let extractor = self
            .extractors
            .iter()
            .find(|extractor| extractor.supports(content_type))
            .ok_or_else(|| RagError::UnsupportedFormat(content_type.as_mime().to_string()))?;
        extractor.extract(bytes)
    }
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
