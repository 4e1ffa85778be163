//! Sliding-window chunking with stable character offsets.
//!
//! Chunking is the first purely algorithmic stage of ingestion: the extracted
//! text is normalized and cut into fixed-size windows that overlap by a
//! configured number of characters, so a sentence straddling a window edge is
//! still fully contained in one of its neighbors. The emitted spans carry
//! exact offsets into the normalized text; downstream citation display looks
//! chunks up by ordinal, which is why emission order is preserved all the way
//! to persistence.
//!
//! The chunker is pure and deterministic, performs no I/O, and has no failure
//! modes of its own: the one invalid configuration (overlap >= window size,
//! which would never terminate) is rejected when [`ChunkingConfig`] is built.

use crate::config::ChunkingConfig;

/// One window of a document's text, with its position in the original.
#[derive(Clone, Debug, PartialEq)]
pub struct ChunkSpan {
    /// 0-based, contiguous position within the document.
    pub ordinal: usize,
    pub text: String,
    /// Start offset in characters into the normalized document text.
    pub start_char: usize,
    /// End offset (exclusive). `end_char - start_char` equals the chunk's
    /// character length.
    pub end_char: usize,
}

/// Collapses `\r\n` and bare `\r` line endings to `\n`.
///
/// Applied before slicing so offsets are stable across platform encodings of
/// the same document.
#[must_use]
pub fn normalize_line_endings(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

/// Splits `text` into overlapping windows of `config.max_chars()` characters.
///
/// Starting at offset 0, each window covers `[start, start + max_chars)`
/// (clamped to the end of the text); the window that reaches the end is the
/// last one, and every other pair of consecutive windows overlaps by exactly
/// `config.overlap()` characters. The sequence covers the whole input with no
/// gaps. Empty text yields no chunks.
///
/// Offsets and lengths are measured in characters, not bytes, so multi-byte
/// input never splits inside a code point.
#[must_use]
pub fn chunk_text(text: &str, config: &ChunkingConfig) -> Vec<ChunkSpan> {
    let normalized = normalize_line_endings(text);
    let chars: Vec<char> = normalized.chars().collect();
    if chars.is_empty() {
        return Vec::new();
    }

    let max_chars = config.max_chars();
    let overlap = config.overlap();
    let mut spans = Vec::new();
    let mut start = 0usize;
    loop {
        let end = usize::min(chars.len(), start + max_chars);
        spans.push(ChunkSpan {
            ordinal: spans.len(),
            text: chars[start..end].iter().collect(),
            start_char: start,
            end_char: end,
        });
        if end == chars.len() {
            break;
        }
        start = end.saturating_sub(overlap);
    }
    spans
}
