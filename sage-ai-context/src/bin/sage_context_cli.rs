use clap::Parser;
use sage_ai_context::text::{DOCUMENT_DELIMITERS, TextChunker};
use std::fs;
use std::io::{self, Read};

/// A CLI tool to preview chunk boundaries as JSON using sage-ai-context.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the input text file. If not provided, reads from stdin.
    #[arg(short, long)]
    input: Option<String>,

    /// Source identifier stamped on each chunk.
    #[arg(short, long, default_value = "stdin")]
    source: String,

    /// Maximum estimated tokens per chunk.
    #[arg(short, long, default_value_t = 1000)]
    max_tokens: usize,

    /// Estimated tokens shared between consecutive chunks.
    #[arg(short, long, default_value_t = 200)]
    overlap_tokens: usize,

    /// Comma-separated list of regex patterns for delimiters.
    /// Defaults to the document delimiters if not provided.
    #[arg(short, long, value_delimiter = ',')]
    delimiters: Option<Vec<String>>,
}

fn main() -> io::Result<()> {
    let args = Args::parse();

    let (content, source) = if let Some(input_path) = args.input {
        let content = fs::read_to_string(&input_path)?;
        let source = if args.source == "stdin" {
            input_path
        } else {
            args.source
        };
        (content, source)
    } else {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        (buffer, args.source)
    };

    let chunker = if let Some(patterns) = args.delimiters {
        let patterns: Vec<&str> = patterns.iter().map(|s| s.as_str()).collect();
        TextChunker::with_delimiters(source, &patterns, args.max_tokens, args.overlap_tokens)
    } else {
        TextChunker::with_delimiters(
            source,
            DOCUMENT_DELIMITERS,
            args.max_tokens,
            args.overlap_tokens,
        )
    };

    let chunks = chunker.chunk(&content);
    println!("{}", serde_json::to_string_pretty(&chunks)?);

    Ok(())
}
