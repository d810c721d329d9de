//! Per-user activity log (`logs/<user>/log.json`) and the shared feedback log.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::io::Write;

use crate::paths::{ensure_parent, DataLayout};

/// Longest assistant reply kept verbatim in the activity log.
pub const LOGGED_RESPONSE_CHARS: usize = 500;

/// One entry of a user's activity log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LogEntry {
    FileUpload {
        timestamp: String,
        filename: String,
        file_type: String,
        file_size: u64,
        status: String,
    },
    UserMessage {
        timestamp: String,
        chat: String,
        message: String,
    },
    AssistantResponse {
        timestamp: String,
        chat: String,
        response: String,
    },
}

fn now() -> String {
    chrono::Local::now().to_rfc3339()
}

impl LogEntry {
    pub fn file_upload(filename: &str, file_type: &str, file_size: u64) -> Self {
        LogEntry::FileUpload {
            timestamp: now(),
            filename: filename.to_string(),
            file_type: file_type.to_string(),
            file_size,
            status: "success".to_string(),
        }
    }

    pub fn user_message(chat: &str, message: &str) -> Self {
        LogEntry::UserMessage {
            timestamp: now(),
            chat: chat.to_string(),
            message: message.to_string(),
        }
    }

    /// Long replies are cut to [`LOGGED_RESPONSE_CHARS`] with a trailing `...`.
    pub fn assistant_response(chat: &str, response: &str) -> Self {
        LogEntry::AssistantResponse {
            timestamp: now(),
            chat: chat.to_string(),
            response: clip(response, LOGGED_RESPONSE_CHARS),
        }
    }
}

/// Cut `text` to `max` characters, appending `...` when anything was dropped.
pub fn clip(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((byte_idx, _)) => format!("{}...", &text[..byte_idx]),
        None => text.to_string(),
    }
}

pub fn load_logs(layout: &DataLayout, email: &str) -> Result<Vec<LogEntry>> {
    let path = layout.log_file(email);
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read log: {}", path.display()))?;
    let logs = serde_json::from_str(&content)
        .with_context(|| format!("Corrupt log: {}", path.display()))?;
    Ok(logs)
}

/// Append an entry to the user's activity log.
pub fn log_interaction(layout: &DataLayout, email: &str, entry: LogEntry) -> Result<()> {
    let mut logs = load_logs(layout, email)?;
    logs.push(entry);

    let path = layout.log_file(email);
    ensure_parent(&path)?;
    std::fs::write(&path, serde_json::to_string_pretty(&logs)?)
        .with_context(|| format!("Failed to write log: {}", path.display()))?;
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackKind {
    Positive,
    Negative,
}

/// A thumbs-up/down on an assistant message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackEntry {
    pub user: String,
    pub chat: String,
    pub message_index: usize,
    pub feedback: FeedbackKind,
    pub timestamp: String,
}

impl FeedbackEntry {
    pub fn new(user: &str, chat: &str, message_index: usize, feedback: FeedbackKind) -> Self {
        Self {
            user: user.to_string(),
            chat: chat.to_string(),
            message_index,
            feedback,
            timestamp: now(),
        }
    }
}

/// Append one JSON line to the feedback log.
pub fn save_feedback(layout: &DataLayout, entry: &FeedbackEntry) -> Result<()> {
    let path = layout.feedback_file();
    ensure_parent(&path)?;
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("Failed to open feedback log: {}", path.display()))?;
    writeln!(file, "{}", serde_json::to_string(entry)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn clip_respects_char_boundaries() {
        assert_eq!(clip("short", 10), "short");
        assert_eq!(clip("abcdef", 3), "abc...");
        assert_eq!(clip("ããããã", 2), "ãã...");
        assert_eq!(clip("exact", 5), "exact");
    }

    #[test]
    fn entries_serialize_with_type_tag() {
        let entry = LogEntry::user_message("notes", "hello");
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["type"], "user_message");
        assert_eq!(json["chat"], "notes");
        assert_eq!(json["message"], "hello");
    }

    #[test]
    fn assistant_response_is_truncated() {
        let long = "x".repeat(LOGGED_RESPONSE_CHARS + 20);
        match LogEntry::assistant_response("c", &long) {
            LogEntry::AssistantResponse { response, .. } => {
                assert_eq!(response.chars().count(), LOGGED_RESPONSE_CHARS + 3);
                assert!(response.ends_with("..."));
            }
            other => panic!("unexpected entry: {:?}", other),
        }
    }

    #[test]
    fn log_appends() {
        let tmp = TempDir::new().unwrap();
        let layout = DataLayout::new(tmp.path());
        log_interaction(&layout, "a@x.io", LogEntry::file_upload("r.pdf", "application/pdf", 42))
            .unwrap();
        log_interaction(&layout, "a@x.io", LogEntry::user_message("c", "hi")).unwrap();

        let logs = load_logs(&layout, "a@x.io").unwrap();
        assert_eq!(logs.len(), 2);
        assert!(matches!(logs[0], LogEntry::FileUpload { file_size: 42, .. }));
        assert!(layout.log_file("a@x.io").exists());
    }

    #[test]
    fn feedback_is_json_lines() {
        let tmp = TempDir::new().unwrap();
        let layout = DataLayout::new(tmp.path());
        save_feedback(
            &layout,
            &FeedbackEntry::new("a@x.io", "c", 1, FeedbackKind::Positive),
        )
        .unwrap();
        save_feedback(
            &layout,
            &FeedbackEntry::new("a@x.io", "c", 3, FeedbackKind::Negative),
        )
        .unwrap();

        let content = std::fs::read_to_string(layout.feedback_file()).unwrap();
        let entries: Vec<FeedbackEntry> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].feedback, FeedbackKind::Positive);
        assert_eq!(entries[1].message_index, 3);
    }
}
