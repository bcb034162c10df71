pub mod text;

// Re-export the chunking types for external use
pub use text::{DOCUMENT_DELIMITERS, TextChunk, TextChunker, estimate_tokens};
