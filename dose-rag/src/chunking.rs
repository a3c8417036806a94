//! Text chunking strategies used by the document loaders.
//!
//! Sizes are measured in characters, never bytes, so multi-byte text is
//! always split on a character boundary.

/// A strategy for splitting extracted text into segment-sized pieces.
///
/// Implementations must be deterministic: the same input always produces
/// the same pieces in the same order. Returned pieces are trimmed and never
/// empty.
pub trait Chunker: Send + Sync {
    /// Split `text` into ordered pieces.
    fn split(&self, text: &str) -> Vec<String>;
}

/// Splits text hierarchically: paragraphs → sentences → words → characters.
///
/// First splits by paragraph separators (`\n\n`). Pieces are merged back
/// together while they fit in `chunk_size`; a piece that is still too large
/// is split by the next separator (`\n`, sentence ends, then spaces). When a
/// new chunk starts, up to `chunk_overlap` trailing characters of the
/// previous chunk are carried over, starting at a word boundary.
///
/// # Example
///
/// ```rust,ignore
/// use dose_rag::chunking::{Chunker, RecursiveChunker};
///
/// let chunker = RecursiveChunker::new(1000, 200);
/// let pieces = chunker.split(&text);
/// ```
#[derive(Debug, Clone)]
pub struct RecursiveChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

const SEPARATORS: [&str; 6] = ["\n\n", "\n", ". ", "! ", "? ", " "];

impl RecursiveChunker {
    /// Create a new `RecursiveChunker`.
    ///
    /// # Arguments
    ///
    /// * `chunk_size`: maximum number of characters per chunk (at least 1)
    /// * `chunk_overlap`: number of overlapping characters between consecutive chunks
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self { chunk_size: chunk_size.max(1), chunk_overlap }
    }
}

impl Chunker for RecursiveChunker {
    fn split(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        split_and_merge(text, self.chunk_size, self.chunk_overlap, &SEPARATORS)
            .into_iter()
            .map(|chunk| chunk.trim().to_string())
            .filter(|chunk| !chunk.is_empty())
            .collect()
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Split text by a separator, then merge pieces into chunks that respect
/// `chunk_size`. Chunks that are still too large are split further using
/// the next-level separator.
fn split_and_merge(
    text: &str,
    chunk_size: usize,
    chunk_overlap: usize,
    separators: &[&str],
) -> Vec<String> {
    if char_len(text) <= chunk_size {
        return vec![text.to_string()];
    }
    let Some((separator, remaining)) = separators.split_first() else {
        return split_by_size(text, chunk_size, chunk_overlap);
    };

    let mut chunks = Vec::new();
    let mut current = String::new();

    for piece in split_keeping_separator(text, separator) {
        if current.is_empty() {
            current = piece.to_string();
        } else if char_len(&current) + char_len(piece) <= chunk_size {
            current.push_str(piece);
        } else {
            let tail = overlap_tail(&current, chunk_overlap).to_string();
            flush(&mut chunks, std::mem::take(&mut current), chunk_size, chunk_overlap, remaining);
            current = if !tail.is_empty() && char_len(&tail) + char_len(piece) <= chunk_size {
                format!("{tail}{piece}")
            } else {
                piece.to_string()
            };
        }
    }

    if !current.is_empty() {
        flush(&mut chunks, current, chunk_size, chunk_overlap, remaining);
    }

    chunks
}

fn flush(
    chunks: &mut Vec<String>,
    chunk: String,
    chunk_size: usize,
    chunk_overlap: usize,
    separators: &[&str],
) {
    if char_len(&chunk) > chunk_size {
        chunks.extend(split_and_merge(&chunk, chunk_size, chunk_overlap, separators));
    } else {
        chunks.push(chunk);
    }
}

/// The last `overlap` characters of `chunk`, advanced to the next word start.
fn overlap_tail(chunk: &str, overlap: usize) -> &str {
    if overlap == 0 {
        return "";
    }
    let Some((start, _)) = chunk.char_indices().rev().nth(overlap - 1) else {
        return "";
    };
    let tail = &chunk[start..];
    match tail.find(char::is_whitespace) {
        Some(pos) => tail[pos..].trim_start(),
        None => "",
    }
}

/// Split text at a separator while keeping the separator attached to the preceding piece.
fn split_keeping_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    let mut result = Vec::new();
    let mut start = 0;

    while let Some(pos) = text[start..].find(separator) {
        let end = start + pos + separator.len();
        result.push(&text[start..end]);
        start = end;
    }

    if start < text.len() {
        result.push(&text[start..]);
    }

    result
}

/// Character-based splitting with overlap, the last resort for unbroken text.
fn split_by_size(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return Vec::new();
    }

    let step = chunk_size.saturating_sub(chunk_overlap).max(1);
    let mut chunks = Vec::new();
    let mut start = 0;

    loop {
        let end = (start + chunk_size).min(chars.len());
        chunks.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += step;
    }

    chunks
}
