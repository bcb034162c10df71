//! Utilities for splitting document text into retrieval-sized chunks.
//!
//! A personal knowledge store ingests whole documents (notes, resumes,
//! project write-ups) but retrieves and embeds small passages. This module
//! turns raw text into a sequence of [`TextChunk`]s bounded by an estimated
//! token budget, with a configurable overlap between consecutive chunks so
//! that facts straddling a boundary stay retrievable from both sides.
//!
//! Splitting is delimiter-aware: the text is first broken into atomic
//! segments at the highest-priority delimiter (paragraph breaks), falling
//! back to sentence ends, line breaks, and finally single spaces when a
//! segment is still over budget. Segments are then packed greedily into
//! chunks, so cuts land on paragraph or sentence boundaries whenever the
//! input allows it. The process is deterministic: the same input always
//! produces byte-identical chunks.
//!
//! ```
//! use sage_ai_context::text::TextChunker;
//!
//! let chunker = TextChunker::new("notes/2024-review.md", 50, 10);
//! let text = "First paragraph about a project.\n\nSecond paragraph with more detail. \
//!             It has two sentences.";
//! let chunks = chunker.chunk(text);
//!
//! assert!(!chunks.is_empty());
//! assert_eq!(chunks[0].source, "notes/2024-review.md");
//! assert_eq!(chunks[0].sequence, 0);
//! for chunk in &chunks {
//!     assert!(chunk.token_estimate <= 50);
//! }
//! ```
use regex::Regex;
use serde::Serialize;
use std::ops::Range;

/// Delimiter patterns for prose documents, ordered from most to least
/// significant. The chunker prefers cutting at earlier patterns.
///
/// - `(?m)^\s*#{1,6}\s+`: Markdown headings start a new logical section.
/// - `\n\s*\n`: blank lines separate paragraphs.
/// - `[.!?]["')\]]*\s+`: sentence ends (closing quotes/brackets included).
/// - `\n`: line breaks.
/// - ` `: single spaces, the last resort before hard character splits.
pub const DOCUMENT_DELIMITERS: &[&str] = &[
    r"(?m)^\s*#{1,6}\s+",
    r"\n\s*\n",
    r#"[.!?]["')\]]*\s+"#,
    r"\n",
    r" ",
];

/// Estimate the token count of a piece of text.
///
/// Uses the common ~4 characters per token heuristic, rounded up, so the
/// estimate never undercounts to zero for non-empty text. Retrieval budgets
/// and chunk bounds both use this estimate; what matters is that the same
/// function is applied consistently on both sides.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// Splits document text into overlapping, token-bounded chunks.
///
/// Construct one per source document: the `source` identifier is stamped on
/// every emitted chunk as provenance metadata.
pub struct TextChunker {
    source: String,
    delimiters: Vec<Regex>,
    max_tokens: usize,
    overlap_tokens: usize,
    min_text_len: usize,
}

/// One bounded segment of a source document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextChunk {
    /// Identifier of the document this chunk came from.
    pub source: String,
    /// Position of this chunk within the document (0-indexed).
    pub sequence: usize,
    /// The chunk text, including any overlap carried from the predecessor.
    pub text: String,
    /// Byte offset of the chunk start in the original text.
    pub start: usize,
    /// Byte offset one past the chunk end in the original text.
    pub end: usize,
    /// Estimated token count of `text`.
    pub token_estimate: usize,
}

impl TextChunker {
    /// Create a chunker for `source` with the given token budget and overlap.
    ///
    /// `overlap_tokens` is clamped to half of `max_tokens` so every chunk is
    /// guaranteed to make forward progress through the document.
    ///
    /// # Panics
    /// Panics if the built-in delimiter patterns fail to compile, which
    /// cannot happen for the shipped constants.
    pub fn new(source: impl Into<String>, max_tokens: usize, overlap_tokens: usize) -> Self {
        Self::with_delimiters(source, DOCUMENT_DELIMITERS, max_tokens, overlap_tokens)
    }

    /// Create a chunker with custom delimiter patterns, ordered from most to
    /// least significant.
    ///
    /// # Panics
    /// Panics if any pattern is not a valid regular expression.
    pub fn with_delimiters(
        source: impl Into<String>,
        delimiter_patterns: &[&str],
        max_tokens: usize,
        overlap_tokens: usize,
    ) -> Self {
        let delimiters = delimiter_patterns
            .iter()
            .map(|&pattern| Regex::new(pattern).unwrap())
            .collect();
        let max_tokens = max_tokens.max(1);

        TextChunker {
            source: source.into(),
            delimiters,
            max_tokens,
            overlap_tokens: overlap_tokens.min(max_tokens / 2),
            min_text_len: 1,
        }
    }

    /// Set the minimum trimmed input length below which no chunks are
    /// produced. Defaults to 1, so only empty or whitespace-only input is
    /// degenerate.
    pub fn with_min_text_len(mut self, min_text_len: usize) -> Self {
        self.min_text_len = min_text_len.max(1);
        self
    }

    /// The maximum estimated tokens per emitted chunk.
    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    /// The overlap budget shared between consecutive chunks, in tokens.
    pub fn overlap_tokens(&self) -> usize {
        self.overlap_tokens
    }

    /// Split `text` into chunks.
    ///
    /// Degenerate input (empty, whitespace-only, or shorter than the
    /// configured minimum) yields an empty vector, never an error. Re-running
    /// on identical input produces identical output.
    pub fn chunk(&self, text: &str) -> Vec<TextChunk> {
        if text.trim().len() < self.min_text_len {
            return Vec::new();
        }

        let max_chars = self.max_tokens * 4;
        let overlap_chars = self.overlap_tokens * 4;
        let segments = self.split_recursively_into_segments(text, 0, max_chars, 0);

        let mut chunks: Vec<TextChunk> = Vec::new();
        // Segment ranges making up the chunk currently being packed. The
        // overlap carried into the next chunk is a suffix of these.
        let mut window: Vec<Range<usize>> = Vec::new();
        let mut window_start = 0usize;
        let mut window_end = 0usize;

        for segment in segments {
            let segment_len = segment.end - segment.start;
            let filled = window_end - window_start;
            if filled + segment_len > max_chars && filled > 0 {
                self.push_chunk(&mut chunks, text, window_start, window_end);
                // Seed the next window with whole trailing segments of the
                // finished one, up to the overlap budget, capped by the room
                // the incoming segment leaves under the chunk budget.
                let budget = overlap_chars.min(max_chars.saturating_sub(segment_len));
                let overlap_start = Self::overlap_start(&window, window_end, budget);
                window.retain(|range| range.start >= overlap_start);
                window_start = overlap_start;
            }
            if window_end == window_start && window.is_empty() {
                window_start = segment.start;
            }
            window_end = segment.end;
            window.push(segment);
        }

        if window_end > window_start {
            self.push_chunk(&mut chunks, text, window_start, window_end);
        }

        chunks
    }

    fn push_chunk(&self, chunks: &mut Vec<TextChunk>, text: &str, start: usize, end: usize) {
        let chunk_text = &text[start..end];
        if chunk_text.trim().is_empty() {
            return;
        }
        chunks.push(TextChunk {
            source: self.source.clone(),
            sequence: chunks.len(),
            text: chunk_text.to_string(),
            start,
            end,
            token_estimate: estimate_tokens(chunk_text),
        });
    }

    /// Largest segment-aligned start offset such that the overlap region
    /// `[start, window_end)` stays within the overlap budget. Returns
    /// `window_end` (empty overlap) when even the last segment is too long.
    fn overlap_start(window: &[Range<usize>], window_end: usize, overlap_chars: usize) -> usize {
        let mut start = window_end;
        for segment in window.iter().rev() {
            if window_end - segment.start > overlap_chars {
                break;
            }
            start = segment.start;
        }
        start
    }

    // Recursively splits text into atomic byte ranges. A range is emitted
    // once it fits the budget or once all delimiters are exhausted, in which
    // case it is hard-split on character boundaries.
    fn split_recursively_into_segments(
        &self,
        text: &str,
        delimiter_idx: usize,
        max_chars: usize,
        current_offset: usize,
    ) -> Vec<Range<usize>> {
        let mut result_segments: Vec<Range<usize>> = Vec::new();

        if text.is_empty() {
            return result_segments;
        }

        if text.len() <= max_chars {
            result_segments.push(current_offset..(current_offset + text.len()));
            return result_segments;
        }

        if delimiter_idx >= self.delimiters.len() {
            let mut local_start = 0;
            while local_start < text.len() {
                let mut local_end = (local_start + max_chars).min(text.len());
                while !text.is_char_boundary(local_end) {
                    local_end -= 1;
                }
                result_segments.push(current_offset + local_start..current_offset + local_end);
                local_start = local_end;
            }
            return result_segments;
        }

        let current_delimiter = &self.delimiters[delimiter_idx];
        let mut local_start = 0;

        for mat in current_delimiter.find_iter(text) {
            if mat.start() > local_start {
                result_segments.extend(self.split_recursively_into_segments(
                    &text[local_start..mat.start()],
                    delimiter_idx + 1,
                    max_chars,
                    current_offset + local_start,
                ));
            }
            // The delimiter match itself is kept as a segment so chunk text
            // remains an exact slice of the input.
            result_segments.push(current_offset + mat.start()..current_offset + mat.end());
            local_start = mat.end();
        }

        if local_start < text.len() {
            result_segments.extend(self.split_recursively_into_segments(
                &text[local_start..],
                delimiter_idx + 1,
                max_chars,
                current_offset + local_start,
            ));
        }

        result_segments
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sentences(n: usize) -> String {
        (0..n)
            .map(|i| format!("Sentence number {i} talks about one small fact. "))
            .collect()
    }

    #[test]
    fn chunking_is_deterministic() {
        let chunker = TextChunker::new("doc.md", 50, 10);
        let text = sentences(40);

        let first = chunker.chunk(&text);
        let second = chunker.chunk(&text);

        assert!(!first.is_empty());
        assert_eq!(first, second);
    }

    #[test]
    fn chunks_respect_token_budget() {
        let chunker = TextChunker::new("doc.md", 50, 10);
        let text = sentences(60);

        let chunks = chunker.chunk(&text);
        assert!(chunks.len() > 1, "expected multiple chunks");
        for chunk in &chunks {
            assert!(
                chunk.token_estimate <= 50,
                "chunk {} estimated at {} tokens",
                chunk.sequence,
                chunk.token_estimate
            );
        }
    }

    #[test]
    fn consecutive_chunks_share_overlap() {
        let chunker = TextChunker::new("doc.md", 50, 12);
        let text = sentences(60);

        let chunks = chunker.chunk(&text);
        assert!(chunks.len() > 1);
        for pair in chunks.windows(2) {
            let (prev, next) = (&pair[0], &pair[1]);
            assert!(next.start < prev.end, "chunks should overlap");
            assert!(next.start > prev.start, "chunks must make progress");
            let shared = prev.end - next.start;
            assert!(
                shared <= 12 * 4,
                "overlap of {shared} bytes exceeds the configured budget"
            );
            assert!(next.text.starts_with(&prev.text[prev.text.len() - shared..]));
        }
    }

    #[test]
    fn non_overlapped_content_covers_the_input() {
        let chunker = TextChunker::new("doc.md", 50, 10);
        let text = sentences(60);

        let chunks = chunker.chunk(&text);
        let mut reconstructed = String::new();
        let mut covered_to = 0;
        for chunk in &chunks {
            reconstructed.push_str(&text[covered_to.max(chunk.start)..chunk.end]);
            covered_to = chunk.end;
        }
        assert_eq!(reconstructed, text);
    }

    #[test]
    fn short_text_yields_single_chunk() {
        let chunker = TextChunker::new("doc.md", 1000, 200);
        let chunks = chunker.chunk("Just one small note.");

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Just one small note.");
        assert_eq!(chunks[0].sequence, 0);
        assert_eq!(chunks[0].start, 0);
    }

    #[test]
    fn degenerate_input_yields_no_chunks() {
        let chunker = TextChunker::new("doc.md", 1000, 200);
        assert!(chunker.chunk("").is_empty());
        assert!(chunker.chunk("   \n\n  \t ").is_empty());

        let strict = TextChunker::new("doc.md", 1000, 200).with_min_text_len(10);
        assert!(strict.chunk("tiny").is_empty());
    }

    #[test]
    fn paragraph_boundaries_are_preferred() {
        let chunker = TextChunker::new("doc.md", 20, 0);
        let text = "First paragraph that is reasonably long for the test.\n\n\
                    Second paragraph that is also reasonably long here.";

        let chunks = chunker.chunk(&text);
        assert!(chunks.len() >= 2);
        // The cut should land at the paragraph break, not mid-sentence.
        assert!(chunks[0].text.starts_with("First paragraph"));
        assert!(
            chunks
                .iter()
                .any(|c| c.text.trim_start().starts_with("Second paragraph"))
        );
    }

    #[test]
    fn unbreakable_text_is_hard_split() {
        let chunker = TextChunker::new("doc.md", 10, 0);
        let text = "x".repeat(200);

        let chunks = chunker.chunk(&text);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.text.len() <= 40);
        }
        let reconstructed: String = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(reconstructed, text);
    }

    #[test]
    fn token_estimate_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abc"), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }
}
