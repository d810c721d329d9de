//! Paragraph-boundary text chunker.
//!
//! Splits extracted document text into [`Chunk`]s that respect a
//! configurable `max_tokens` limit. Splitting happens on blank lines first so
//! that each retrieved passage stays readable; a paragraph longer than the
//! limit is hard-split on the last newline or space that fits.
//!
//! Sizes are measured in bytes but every cut lands on a UTF-8 character
//! boundary, so accented and CJK text is never split mid-character.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::Chunk;

/// Approximate chars-per-token ratio.
const CHARS_PER_TOKEN: usize = 4;

/// Split text into chunks on paragraph boundaries, respecting `max_tokens`.
///
/// Returns chunks with contiguous indices starting at 0. Whitespace-only
/// text yields no chunks.
pub fn chunk_text(document_id: &str, text: &str, max_tokens: usize) -> Vec<Chunk> {
    let max_chars = (max_tokens * CHARS_PER_TOKEN).max(1);

    let mut chunks = Vec::new();
    let mut current_buf = String::new();

    let push = |chunks: &mut Vec<Chunk>, piece: &str| {
        let index = chunks.len() as i64;
        chunks.push(make_chunk(document_id, index, piece));
    };

    for para in normalize_newlines(text).split("\n\n") {
        let trimmed = para.trim();
        if trimmed.is_empty() {
            continue;
        }

        let would_be = if current_buf.is_empty() {
            trimmed.len()
        } else {
            current_buf.len() + 2 + trimmed.len()
        };

        if would_be > max_chars && !current_buf.is_empty() {
            push(&mut chunks, &current_buf);
            current_buf.clear();
        }

        if trimmed.len() > max_chars {
            let mut remaining = trimmed;
            while !remaining.is_empty() {
                let cut = split_point(remaining, max_chars);
                let piece = remaining[..cut].trim();
                if !piece.is_empty() {
                    push(&mut chunks, piece);
                }
                remaining = &remaining[cut..];
            }
        } else {
            if !current_buf.is_empty() {
                current_buf.push_str("\n\n");
            }
            current_buf.push_str(trimmed);
        }
    }

    if !current_buf.is_empty() {
        push(&mut chunks, &current_buf);
    }

    chunks
}

fn normalize_newlines(text: &str) -> String {
    text.replace("\r\n", "\n")
}

/// Byte offset at which to cut `s` so the head is at most `max` bytes,
/// preferring the last newline or space, never inside a character.
fn split_point(s: &str, max: usize) -> usize {
    if s.len() <= max {
        return s.len();
    }
    let mut limit = max;
    while limit > 0 && !s.is_char_boundary(limit) {
        limit -= 1;
    }
    if limit == 0 {
        // A single character wider than the budget; take it whole.
        return s.chars().next().map(char::len_utf8).unwrap_or(s.len());
    }
    let head = &s[..limit];
    head.rfind('\n')
        .or_else(|| head.rfind(' '))
        .map(|pos| pos + 1)
        .filter(|&pos| pos > 0)
        .unwrap_or(limit)
}

fn make_chunk(document_id: &str, index: i64, text: &str) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        id: Uuid::new_v4().to_string(),
        document_id: document_id.to_string(),
        chunk_index: index,
        text: text.to_string(),
        hash,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_text_single_chunk() {
        let chunks = chunk_text("doc1", "Hello, world!", 700);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].text, "Hello, world!");
        assert_eq!(chunks[0].document_id, "doc1");
    }

    #[test]
    fn test_blank_text_has_no_chunks() {
        assert!(chunk_text("doc1", "", 700).is_empty());
        assert!(chunk_text("doc1", "  \n\n \t ", 700).is_empty());
    }

    #[test]
    fn test_multiple_paragraphs_under_limit() {
        let text = "First paragraph.\n\nSecond paragraph.\n\nThird paragraph.";
        let chunks = chunk_text("doc1", text, 700);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].text.contains("First paragraph."));
        assert!(chunks[0].text.contains("Third paragraph."));
    }

    #[test]
    fn test_crlf_paragraphs_are_split() {
        let text = "This is paragraph one.\r\n\r\nThis is paragraph two.";
        let chunks = chunk_text("doc1", text, 6);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].text, "This is paragraph two.");
    }

    #[test]
    fn test_chunk_indices_contiguous() {
        let text = (0..50)
            .map(|i| format!("Paragraph number {}.", i))
            .collect::<Vec<_>>()
            .join("\n\n");
        let chunks = chunk_text("doc1", &text, 10);
        assert!(chunks.len() > 1);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i as i64, "Index mismatch at position {}", i);
            assert!(c.text.len() <= 40);
        }
    }

    #[test]
    fn test_long_paragraph_is_hard_split_on_spaces() {
        let text = "word ".repeat(100);
        let chunks = chunk_text("doc1", &text, 5);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.text.len() <= 20);
            assert!(!c.text.starts_with(' '));
        }
    }

    #[test]
    fn test_multibyte_text_never_panics() {
        let text = "ação".repeat(200);
        let chunks = chunk_text("doc1", &text, 3);
        let rebuilt: String = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn test_deterministic_text_and_hash() {
        let text = "Alpha\n\nBeta\n\nGamma\n\nDelta";
        let c1 = chunk_text("doc1", text, 5);
        let c2 = chunk_text("doc1", text, 5);
        assert_eq!(c1.len(), c2.len());
        for (a, b) in c1.iter().zip(c2.iter()) {
            assert_eq!(a.text, b.text);
            assert_eq!(a.hash, b.hash);
            assert_eq!(a.chunk_index, b.chunk_index);
        }
    }
}
