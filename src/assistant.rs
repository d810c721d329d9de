//! One chat turn: retrieve context, ask the model, persist the exchange.

use sqlx::SqlitePool;
use thiserror::Error;

use crate::chats::{load_chats, save_chats};
use crate::collection;
use crate::config::Config;
use crate::embedding;
use crate::interaction_log::{log_interaction, LogEntry};
use crate::llm::LlmClient;
use crate::models::{Message, Passage};
use crate::paths::{collection_name, DataLayout};
use crate::prompt::{
    build_prompt, format_chat_history, format_context, truncate_context, DEFAULT_SYSTEM_PROMPT,
};
use crate::transcript::append_interaction;

#[derive(Debug, Error)]
pub enum TurnError {
    #[error("chat not found: {0}")]
    ChatNotFound(String),
    #[error("message must not be empty")]
    EmptyMessage,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// The assistant's reply and the chat as it now stands.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub reply: String,
    pub messages: Vec<Message>,
}

/// Format an LLM failure as the assistant's reply.
pub fn error_reply(err: &anyhow::Error) -> String {
    format!(
        "⚠️ **Error generating response:** {}\n\nPlease check your connection and try again.",
        err
    )
}

/// Embed the question and fetch up to `top_k` passages from the user's collection.
async fn retrieve(
    config: &Config,
    pool: &SqlitePool,
    email: &str,
    question: &str,
) -> anyhow::Result<Vec<Passage>> {
    let collection = collection_name(email);
    let available = collection::count(pool, &collection).await?;
    let n = config.retrieval.top_k.min(available.max(0) as usize);
    if n == 0 {
        return Ok(Vec::new());
    }
    let provider = embedding::create_provider(&config.embedding)?;
    let query_vec = embedding::embed_query(&config.embedding, question).await?;
    collection::query(pool, &collection, provider.model_name(), &query_vec, n).await
}

/// Run a full chat turn for `email` in `chat`.
///
/// LLM failures do not fail the turn: the error text becomes the reply and
/// is persisted like any other answer.
#[allow(clippy::too_many_arguments)]
pub async fn handle_user_message(
    config: &Config,
    pool: &SqlitePool,
    layout: &DataLayout,
    llm: &LlmClient,
    api_key: &str,
    email: &str,
    chat: &str,
    content: &str,
) -> Result<TurnOutcome, TurnError> {
    let content = content.trim();
    if content.is_empty() {
        return Err(TurnError::EmptyMessage);
    }

    let mut chats = load_chats(layout, email)?;
    let messages = chats
        .get_mut(chat)
        .ok_or_else(|| TurnError::ChatNotFound(chat.to_string()))?;

    let history = format_chat_history(
        messages,
        config.retrieval.history_messages,
        config.retrieval.history_message_chars,
    );
    messages.push(Message::user(content));
    log_interaction(layout, email, LogEntry::user_message(chat, content))?;

    let context = match retrieve(config, pool, email, content).await {
        Ok(passages) => format_context(&passages, config.retrieval.doc_excerpt_chars),
        Err(e) => {
            tracing::warn!(user = %email, error = %e, "context retrieval failed");
            format!("Error retrieving context: {}", e)
        }
    };
    let context = truncate_context(&context, config.retrieval.max_context_chars);

    let system = config
        .llm
        .system_prompt
        .as_deref()
        .unwrap_or(DEFAULT_SYSTEM_PROMPT);
    let prompt = build_prompt(&context, &history, content);

    let reply = match llm.complete(api_key, system, &prompt).await {
        Ok(text) => text,
        Err(e) => {
            tracing::error!(user = %email, chat = %chat, error = %e, "LLM request failed");
            error_reply(&e)
        }
    };

    messages.push(Message::assistant(reply.clone()));
    let messages = messages.clone();

    append_interaction(layout, email, chat, content, &reply)?;
    log_interaction(layout, email, LogEntry::assistant_response(chat, &reply))?;
    save_chats(layout, email, &chats)?;

    Ok(TurnOutcome { reply, messages })
}
