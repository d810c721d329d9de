//! Prompt assembly: retrieved context, recent history and the question.

use crate::interaction_log::clip;
use crate::models::{Message, Passage};

/// Appended when the retrieved context is cut to fit the prompt budget.
pub const TRUNCATION_NOTICE: &str = "...\n[Context truncated due to size]";

/// Used as the context section when retrieval returns nothing.
pub const NO_CONTEXT: &str = "No relevant documents found in the knowledge base.";

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant that answers questions \
about the documents the user has uploaded. Base your answers on the provided document context \
whenever it is relevant, say so plainly when the documents do not contain the answer, and keep \
answers clear and well organized. Use Markdown formatting where it helps readability.";

/// Keep at most `max_chars` characters of `context`.
pub fn truncate_context(context: &str, max_chars: usize) -> String {
    match context.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}{}", &context[..byte_idx], TRUNCATION_NOTICE),
        None => context.to_string(),
    }
}

/// Render the last `max_messages` messages as `Role: content` lines.
pub fn format_chat_history(messages: &[Message], max_messages: usize, max_chars: usize) -> String {
    let start = messages.len().saturating_sub(max_messages);
    messages[start..]
        .iter()
        .map(|m| format!("{}: {}", m.role.label(), clip(&m.content, max_chars)))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Number the retrieved passages, each cut to `excerpt_chars`.
pub fn format_context(passages: &[Passage], excerpt_chars: usize) -> String {
    if passages.is_empty() {
        return NO_CONTEXT.to_string();
    }
    passages
        .iter()
        .enumerate()
        .map(|(i, p)| format!("**Document {}:** {}", i + 1, clip(&p.text, excerpt_chars)))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// The user-turn prompt sent alongside the system prompt.
pub fn build_prompt(context: &str, history: &str, question: &str) -> String {
    let history = if history.trim().is_empty() {
        "(no previous messages)"
    } else {
        history
    };

    format!(
        "## CONTEXT FROM UPLOADED DOCUMENTS\n\
         {context}\n\n\
         ## CONVERSATION HISTORY\n\
         {history}\n\n\
         ## CURRENT QUESTION\n\
         {question}\n\n\
         ## INSTRUCTIONS\n\
         Answer the current question using the document context above when it is relevant. \
         If the context does not contain the answer, say so and answer from general knowledge. \
         Stay consistent with the conversation history."
    )
}
