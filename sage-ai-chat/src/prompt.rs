//! Prompt assembly for conversation turns.
//!
//! The prompt layout is fixed: system instructions, numbered context
//! excerpts with category and trust annotations, a truncated slice of
//! recent history, then the new message. Keeping assembly in one place
//! makes the layout testable without a live model.

use sage_ai_retriever::router::RoutedContext;
use sage_ai_retriever::store::Turn;

/// Used when the configuration supplies no system prompt.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a personal knowledge assistant. \
Answer from the numbered context excerpts when they are relevant, cite them as [n], \
and say plainly when they do not contain the answer. Prefer user-corrected excerpts \
over enriched or raw ones when they disagree.";

/// Chunks quoted in a degraded reply when the model is unreachable.
const DEGRADED_EXCERPTS: usize = 3;

/// Assemble the full completion prompt for one turn.
pub fn build_prompt(
    system_prompt: Option<&str>,
    context: &RoutedContext,
    history: &[Turn],
    message: &str,
) -> String {
    let mut prompt = String::new();
    prompt.push_str(system_prompt.unwrap_or(DEFAULT_SYSTEM_PROMPT));
    prompt.push_str("\n\n");

    if context.is_empty() {
        prompt.push_str("No stored context matched this question.\n");
    } else {
        prompt.push_str("Context:\n");
        for (i, scored) in context.chunks.iter().enumerate() {
            let category = scored.chunk.category.as_deref().unwrap_or("uncategorized");
            prompt.push_str(&format!(
                "[{}] ({category}, trust {}) {}\n",
                i + 1,
                scored.chunk.trust_level,
                scored.chunk.text
            ));
        }
    }

    if !history.is_empty() {
        prompt.push_str("\nRecent conversation:\n");
        for turn in history {
            prompt.push_str(&format!("User: {}\n", turn.user_message));
            prompt.push_str(&format!("Assistant: {}\n", turn.assistant_response));
        }
    }

    prompt.push_str(&format!("\nUser: {message}\nAssistant:"));
    prompt
}

/// Best-effort reply when the language model stays unreachable after
/// retries: apologize and quote the top retrieved excerpts verbatim.
pub fn degraded_response(context: &RoutedContext) -> String {
    if context.is_empty() {
        return "I could not reach the language model and no stored context matched \
                this question. Please try again once the model is running."
            .to_string();
    }
    let mut out = String::from(
        "I could not reach the language model, so here is the most relevant stored context:\n",
    );
    for (i, scored) in context.chunks.iter().take(DEGRADED_EXCERPTS).enumerate() {
        out.push_str(&format!("[{}] {}\n", i + 1, scored.chunk.text));
    }
    out
}

/// Prompt asking the model to condense a whole session.
pub fn build_summary_prompt(turns: &[Turn]) -> String {
    let mut prompt = String::from(
        "Summarize the following conversation in one short paragraph. \
         Mention what the user asked about and any corrections they made.\n\n",
    );
    for turn in turns {
        prompt.push_str(&format!("User: {}\n", turn.user_message));
        prompt.push_str(&format!("Assistant: {}\n", turn.assistant_response));
    }
    prompt.push_str("\nSummary:");
    prompt
}
