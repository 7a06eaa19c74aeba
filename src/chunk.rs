//! Boundary-aware overlapping text chunker.
//!
//! Splits a policy document into [`Chunk`]s no longer than `chunk_size`
//! characters. Split points prefer, in order: paragraph break (`\n\n`),
//! line break, sentence end, word boundary, character boundary — falling
//! down the list only when a higher-priority separator cannot keep a piece
//! under the target size. Each chunk after the first repeats the trailing
//! `overlap` characters of its predecessor so context is not lost at cut
//! points.
//!
//! Segments keep their separators, so concatenating the non-overlapping
//! portions of the chunks reconstructs the original document exactly.
//!
//! Each chunk receives a UUID plus a SHA-256 hash of its text for
//! staleness detection.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::Chunk;

pub const DEFAULT_CHUNK_SIZE: usize = 400;
pub const DEFAULT_OVERLAP: usize = 50;

/// Separator cascade, highest priority first. The final fallback is a raw
/// character split.
const SEPARATORS: [&str; 6] = ["\n\n", "\n", ". ", "! ", "? ", " "];

/// Split a document into chunks with contiguous sequence indices starting
/// at 0.
///
/// Empty or whitespace-only input yields an empty Vec; input shorter than
/// `chunk_size` yields exactly one chunk. `overlap` must be smaller than
/// `chunk_size` (enforced at config load).
pub fn chunk_document(source_id: &str, text: &str, chunk_size: usize, overlap: usize) -> Vec<Chunk> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    // Atomic segments are capped at chunk_size - overlap so that an
    // overlap tail plus any single segment always fits in one chunk.
    let segment_max = chunk_size.saturating_sub(overlap).max(1);
    let segments = split_segments(text, segment_max, &SEPARATORS);

    let mut chunks = Vec::new();
    let mut buf = String::new();
    let mut sequence_index: i64 = 0;

    for seg in segments {
        if !buf.is_empty() && buf.len() + seg.len() > chunk_size {
            let tail = overlap_tail(&buf, overlap);
            chunks.push(make_chunk(source_id, sequence_index, &buf));
            sequence_index += 1;
            buf = tail;
        }
        buf.push_str(seg);
    }

    if !buf.is_empty() {
        chunks.push(make_chunk(source_id, sequence_index, &buf));
    }

    chunks
}

/// Recursively split `text` into segments of at most `max` bytes, trying
/// each separator in priority order and keeping separators attached to the
/// preceding segment.
fn split_segments<'a>(text: &'a str, max: usize, separators: &[&str]) -> Vec<&'a str> {
    if text.len() <= max {
        return vec![text];
    }

    match separators.split_first() {
        Some((sep, rest)) => {
            let mut out = Vec::new();
            for piece in text.split_inclusive(sep) {
                if piece.len() <= max {
                    out.push(piece);
                } else {
                    out.extend(split_segments(piece, max, rest));
                }
            }
            out
        }
        None => char_windows(text, max),
    }
}

/// Last-resort split into windows of at most `max` bytes, snapped to UTF-8
/// character boundaries.
fn char_windows(text: &str, max: usize) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    while start < text.len() {
        let mut end = (start + max).min(text.len());
        while end > start && !text.is_char_boundary(end) {
            end -= 1;
        }
        if end == start {
            // A single character wider than the window; emit it whole.
            let ch = text[start..].chars().next().expect("non-empty remainder");
            end = start + ch.len_utf8();
        }
        out.push(&text[start..end]);
        start = end;
    }
    out
}

/// The trailing `overlap`-sized span of a chunk, snapped to a character
/// boundary, used to seed the next chunk.
fn overlap_tail(text: &str, overlap: usize) -> String {
    if overlap == 0 {
        return String::new();
    }
    if text.len() <= overlap {
        return text.to_string();
    }
    let mut start = text.len() - overlap;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    text[start..].to_string()
}

fn make_chunk(source_id: &str, sequence_index: i64, text: &str) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        id: Uuid::new_v4().to_string(),
        source_id: source_id.to_string(),
        sequence_index,
        text: text.to_string(),
        hash,
    }
}
