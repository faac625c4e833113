//! Boundary-aware character chunking.
//!
//! Text is normalized first, then cut into windows of roughly `chunk_size` characters that
//! overlap by `overlap` characters. Each cut is moved to the nearest natural break (paragraph,
//! sentence, clause, comma) within a small window around the target, falling back to the
//! nearest preceding space and finally to the raw target. Offsets are character indices into
//! the normalized text.
//!
//! Termination is guaranteed two ways: every step advances `start` strictly, and the loop is
//! capped at `len / 100 + 100` iterations.

use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

use super::types::ChunkingError;

/// Break sequences in priority order. Distance ties are resolved by this order.
const NATURAL_BREAKS: [&str; 13] = [
    "\n\n", ". ", ".\n", "! ", "!\n", "? ", "?\n", "; ", ";\n", ": ", ":\n", ", ", ",\n",
];

const MAX_BREAK_WINDOW: usize = 50;

static HORIZONTAL_WS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\S\n]+").expect("valid whitespace pattern"));
static SPACE_AROUND_NEWLINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r" ?\n ?").expect("valid newline pattern"));
static BLANK_LINE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid blank line pattern"));

/// Parameters controlling chunk geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingParams {
    /// Target chunk length in characters.
    pub chunk_size: usize,
    /// Characters shared by consecutive chunks.
    pub overlap: usize,
    /// Minimum trimmed length of an emitted chunk.
    pub min_chunk_size: usize,
}

impl Default for ChunkingParams {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            overlap: 200,
            min_chunk_size: 100,
        }
    }
}

/// A bounded text segment with offsets into the normalized document text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    /// Trimmed chunk text.
    pub text: String,
    /// Position in emission order, starting at zero.
    pub index: usize,
    /// Inclusive start offset (characters).
    pub start_offset: usize,
    /// Exclusive end offset (characters).
    pub end_offset: usize,
    /// Character count of `text`.
    pub char_count: usize,
    /// Whitespace-delimited word count of `text`.
    pub word_count: usize,
    /// Name of the document the chunk came from.
    pub source_document: String,
}

/// Collapse horizontal whitespace to single spaces and blank-line runs to one blank line.
///
/// The result is trimmed and normalizing it again returns it unchanged.
pub fn normalize_whitespace(text: &str) -> String {
    let unified = text.replace("\r\n", "\n").replace('\r', "\n");
    let collapsed = HORIZONTAL_WS.replace_all(&unified, " ");
    let tightened = SPACE_AROUND_NEWLINE.replace_all(&collapsed, "\n");
    let paragraphs = BLANK_LINE_RUN.replace_all(&tightened, "\n\n");
    paragraphs.trim().to_string()
}

/// Normalize `text` and split it into overlapping chunks.
///
/// Text shorter than `min_chunk_size` yields one chunk spanning the whole text; empty text
/// yields no chunks.
pub fn chunk_text(
    text: &str,
    source_document: &str,
    params: ChunkingParams,
) -> Result<Vec<Chunk>, ChunkingError> {
    if params.chunk_size == 0 {
        return Err(ChunkingError::InvalidChunkSize);
    }

    let normalized = normalize_whitespace(text);
    let chars: Vec<char> = normalized.chars().collect();
    let len = chars.len();

    if len == 0 {
        return Ok(Vec::new());
    }

    if len < params.min_chunk_size {
        return Ok(vec![build_chunk(&chars, 0, len, 0, source_document)]);
    }

    let max_iterations = len / 100 + 100;
    let mut chunks = Vec::new();
    let mut start = 0usize;
    let mut iterations = 0usize;

    while start < len && iterations < max_iterations {
        iterations += 1;

        let candidate = start.saturating_add(params.chunk_size);
        let end = if candidate < len {
            find_natural_break(&chars, start, candidate)
        } else {
            len
        };

        let trimmed_len = trimmed_char_count(&chars[start..end]);
        let is_tail = end == len;
        if trimmed_len >= params.min_chunk_size || (is_tail && trimmed_len > 0) {
            let chunk = build_chunk(&chars, start, end, chunks.len(), source_document);
            chunks.push(chunk);
        }

        if is_tail {
            break;
        }

        let mut next = end.saturating_sub(params.overlap);
        if next <= start {
            next = start.saturating_add((params.chunk_size / 2).max(1));
        }
        // never skip past the end of the chunk just produced
        start = next.min(end);
    }

    if start < len && iterations >= max_iterations {
        tracing::warn!(
            document = source_document,
            iterations,
            max_iterations,
            reached = start,
            len,
            "Chunking hit the iteration cap; remaining text dropped"
        );
    }

    tracing::debug!(
        document = source_document,
        chunks = chunks.len(),
        iterations,
        "Chunking finished"
    );
    Ok(chunks)
}

/// Find the cut position for a chunk starting at `start` whose target end is `preferred_end`.
fn find_natural_break(chars: &[char], start: usize, preferred_end: usize) -> usize {
    let len = chars.len();
    if preferred_end >= len {
        return len;
    }
    if preferred_end <= start {
        return preferred_end;
    }

    let window = MAX_BREAK_WINDOW.min((preferred_end - start) / 2);
    let search_start = preferred_end.saturating_sub(window).max(start);
    let search_end = (preferred_end + window).min(len);
    let region = &chars[search_start..search_end];

    let mut best: Option<(usize, usize)> = None;
    for pattern in NATURAL_BREAKS {
        let needle: Vec<char> = pattern.chars().collect();
        if region.len() < needle.len() {
            continue;
        }
        for offset in 0..=region.len() - needle.len() {
            if region[offset..offset + needle.len()] != needle[..] {
                continue;
            }
            let position = search_start + offset + needle.len();
            let distance = position.abs_diff(preferred_end);
            if best.is_none_or(|(best_distance, _)| distance < best_distance) {
                best = Some((distance, position));
            }
        }
    }

    if let Some((_, position)) = best {
        return position;
    }

    (search_start..=preferred_end)
        .rev()
        .find(|&index| index < len && chars[index] == ' ')
        .map(|index| index + 1)
        .unwrap_or(preferred_end)
}

fn trimmed_char_count(slice: &[char]) -> usize {
    let leading = slice.iter().take_while(|c| c.is_whitespace()).count();
    if leading == slice.len() {
        return 0;
    }
    let trailing = slice.iter().rev().take_while(|c| c.is_whitespace()).count();
    slice.len() - leading - trailing
}

fn build_chunk(
    chars: &[char],
    start: usize,
    end: usize,
    index: usize,
    source_document: &str,
) -> Chunk {
    let raw: String = chars[start..end].iter().collect();
    let text = raw.trim().to_string();
    Chunk {
        char_count: text.chars().count(),
        word_count: text.split_whitespace().count(),
        text,
        index,
        start_offset: start,
        end_offset: end,
        source_document: source_document.to_string(),
    }
}
