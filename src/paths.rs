//! Filesystem-safe names and the on-disk layout of per-user files.
//!
//! Every per-user artifact is keyed by [`user_key`]: the sanitized local part
//! of the email followed by a digest of the whole address. `ana.lima@x.org`
//! and `ana_lima@y.org` sanitize to the same text but get different keys.
//! Chat files get the same treatment through [`chat_file_stem`].
//!
//! ```text
//! <data_dir>/
//!   chats/<user_key>.json
//!   transcripts/<user_key>/<chat_stem>.json
//!   transcripts/<user_key>/<chat_stem>.csv
//!   logs/<user_key>/log.json
//!   feedback_log.jsonl
//! ```

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Hex characters of SHA-256 appended to sanitized names.
const DIGEST_CHARS: usize = 16;

/// Replace anything outside `[A-Za-z0-9_-]` with `_`, trim surrounding
/// underscores, and fall back to `"user"` when nothing is left.
pub fn sanitize_component(raw: &str) -> String {
    let replaced: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = replaced.trim_matches('_');
    if trimmed.is_empty() {
        "user".to_string()
    } else {
        trimmed.to_string()
    }
}

fn short_digest(raw: &str) -> String {
    let mut hex = format!("{:x}", Sha256::digest(raw.as_bytes()));
    hex.truncate(DIGEST_CHARS);
    hex
}

/// Storage key for a user: `<sanitized local part>-<digest of the full email>`.
pub fn user_key(email: &str) -> String {
    let email = email.trim();
    let local = email.split('@').next().unwrap_or_default();
    format!("{}-{}", sanitize_component(local), short_digest(email))
}

/// File stem for a chat's transcript. Distinct chat names never share a stem.
pub fn chat_file_stem(chat: &str) -> String {
    format!("{}-{}", sanitize_component(chat), short_digest(chat))
}

/// Vector collection name for a user.
pub fn collection_name(email: &str) -> String {
    format!("document_embeddings_{}", user_key(email))
}

/// Resolves per-user file locations under a data directory.
#[derive(Debug, Clone)]
pub struct DataLayout {
    root: PathBuf,
}

impl DataLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn chats_file(&self, email: &str) -> PathBuf {
        self.root
            .join("chats")
            .join(format!("{}.json", user_key(email)))
    }

    pub fn transcript_dir(&self, email: &str) -> PathBuf {
        self.root.join("transcripts").join(user_key(email))
    }

    pub fn transcript_file(&self, email: &str, chat: &str) -> PathBuf {
        self.transcript_dir(email)
            .join(format!("{}.json", chat_file_stem(chat)))
    }

    pub fn transcript_csv(&self, email: &str, chat: &str) -> PathBuf {
        self.transcript_dir(email)
            .join(format!("{}.csv", chat_file_stem(chat)))
    }

    pub fn log_file(&self, email: &str) -> PathBuf {
        self.root
            .join("logs")
            .join(user_key(email))
            .join("log.json")
    }

    pub fn feedback_file(&self) -> PathBuf {
        self.root.join("feedback_log.jsonl")
    }
}

/// Create the parent directory of `path` if it does not exist.
pub(crate) fn ensure_parent(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent),
        _ => Ok(()),
    }
}
