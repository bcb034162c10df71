use clap::{Parser, Subcommand};
use sage_ai_chat::{ChatService, TurnOutcome};
use sage_ai_retriever::store::FeedbackKind;
use std::path::PathBuf;
use std::process;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::EnvFilter;

/// Chat over a personal knowledge store, with feedback that teaches it.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Base directory containing the .sage-ai.db database file
    #[arg(short, long, default_value = ".")]
    base_dir: PathBuf,

    /// Session id; turns within a session share history
    #[arg(short, long, default_value = "cli")]
    session: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Ask a single question and print the grounded answer
    Ask {
        /// The question
        question: String,
    },
    /// Interactive chat loop over stdin (/quit to leave, /clear to reset)
    Chat,
    /// React to a previous turn: correct, improve, or incorrect
    Feedback {
        /// Turn id printed with the answer
        turn_id: i64,
        /// correct | improve | incorrect
        kind: FeedbackKind,
        /// Correction text, required for improve
        text: Option<String>,
    },
    /// Show store and model status
    Status,
    /// Summarize a session's conversation
    Summary {
        /// Session to summarize (defaults to --session)
        session: Option<String>,
    },
    /// Export a session's turns as JSON
    Export {
        /// Session to export (defaults to --session)
        session: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("sage_ai=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let service = ChatService::create(&args.base_dir).await?;

    match args.command {
        Commands::Ask { question } => {
            let outcome = service.ask(&args.session, &question).await?;
            print_outcome(&outcome);
            Ok(())
        }
        Commands::Chat => {
            println!("Chatting in session '{}'. /quit to leave, /clear to reset.", args.session);
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            let mut stdout = tokio::io::stdout();
            loop {
                stdout.write_all(b"you> ").await?;
                stdout.flush().await?;
                let Some(line) = lines.next_line().await? else {
                    break;
                };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match line {
                    "/quit" | "/exit" => break,
                    "/clear" => {
                        let removed = service.clear(&args.session).await?;
                        println!("Cleared {removed} turns.");
                        continue;
                    }
                    _ => {}
                }
                let outcome = service.ask(&args.session, line).await?;
                print_outcome(&outcome);
            }
            Ok(())
        }
        Commands::Feedback {
            turn_id,
            kind,
            text,
        } => {
            let record = service.feedback(turn_id, kind, text).await?;
            match kind {
                FeedbackKind::Correct => println!("Endorsed the chunks behind turn {turn_id}."),
                FeedbackKind::Incorrect => println!("Demerited the chunks behind turn {turn_id}."),
                FeedbackKind::Improve => println!(
                    "Stored your correction as {} new chunk(s) superseding turn {turn_id}.",
                    record.produced_chunk_ids.len()
                ),
            }
            Ok(())
        }
        Commands::Status => {
            println!("{}", service.status().await?);
            Ok(())
        }
        Commands::Summary { session } => {
            let session = session.unwrap_or(args.session);
            println!("{}", service.summary(&session).await?);
            Ok(())
        }
        Commands::Export { session } => {
            let session = session.unwrap_or(args.session);
            println!("{}", service.export(&session).await?);
            Ok(())
        }
    }
}

fn print_outcome(outcome: &TurnOutcome) {
    let marker = if outcome.degraded { ", degraded" } else { "" };
    println!("[turn {}{marker}] {}", outcome.turn_id, outcome.response);
    if !outcome.context.is_empty() {
        println!("Sources:");
        for (i, scored) in outcome.context.chunks.iter().enumerate() {
            println!(
                "  [{}] {} ({}, trust {})",
                i + 1,
                scored.chunk.source,
                scored.chunk.category.as_deref().unwrap_or("uncategorized"),
                scored.chunk.trust_level
            );
        }
    }
}
