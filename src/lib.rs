//! # docchat
//!
//! A document-grounded chat assistant.
//!
//! Users sign in, upload documents (PDF, DOCX, CSV, TXT, HTML) that are
//! reduced to text, chunked, embedded and stored in a per-user collection,
//! then chat with a hosted LLM whose prompts carry the most similar passages.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌────────────────────┐   ┌───────────┐
//! │  Upload  │──▶│ Extract→Chunk→Embed│──▶│  SQLite   │
//! └──────────┘   └────────────────────┘   │ users+vec │
//!                                         └─────┬─────┘
//! ┌──────────┐   ┌────────────────────┐         │
//! │ Message  │──▶│ Retrieve→Prompt→LLM│◀────────┘
//! └──────────┘   └─────────┬──────────┘
//!                          ▼
//!               chats / transcripts / logs (JSON files)
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`paths`] | Sanitized names and per-user file layout |
//! | [`users`] | Credential store |
//! | [`session`] | Bearer-token login sessions |
//! | [`chats`] | Per-user chat threads |
//! | [`transcript`] | Per-chat interaction history and CSV export |
//! | [`interaction_log`] | Activity log and feedback log |
//! | [`extract`] | Text extraction from uploaded files |
//! | [`chunk`] | Text chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`collection`] | Per-user vector collections |
//! | [`ingest`] | Upload pipeline |
//! | [`llm`] | Chat-completion client |
//! | [`prompt`] | Prompt assembly |
//! | [`assistant`] | One chat turn |
//! | [`server`] | HTTP server |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema setup |

pub mod assistant;
pub mod chats;
pub mod chunk;
pub mod collection;
pub mod config;
pub mod db;
pub mod embedding;
pub mod extract;
pub mod ingest;
pub mod interaction_log;
pub mod llm;
pub mod migrate;
pub mod models;
pub mod paths;
pub mod prompt;
pub mod server;
pub mod session;
pub mod transcript;
pub mod ui;
pub mod users;
