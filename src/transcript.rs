//! Per-chat transcripts: the question/answer pairs of a chat, kept apart
//! from the UI message list so they can be reviewed and exported to CSV.

use anyhow::{Context, Result};
use std::path::PathBuf;

use crate::models::Interaction;
use crate::paths::{ensure_parent, DataLayout};

pub fn load_interactions(layout: &DataLayout, email: &str, chat: &str) -> Result<Vec<Interaction>> {
    let path = layout.transcript_file(email, chat);
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read transcript: {}", path.display()))?;
    let interactions = serde_json::from_str(&content)
        .with_context(|| format!("Corrupt transcript: {}", path.display()))?;
    Ok(interactions)
}

/// Append one exchange, stamped with the current local time.
pub fn append_interaction(
    layout: &DataLayout,
    email: &str,
    chat: &str,
    user: &str,
    assistant: &str,
) -> Result<Interaction> {
    let mut history = load_interactions(layout, email, chat)?;
    let interaction = Interaction {
        timestamp: chrono::Local::now().to_rfc3339(),
        user: user.to_string(),
        assistant: assistant.to_string(),
    };
    history.push(interaction.clone());

    let path = layout.transcript_file(email, chat);
    ensure_parent(&path)?;
    std::fs::write(&path, serde_json::to_string_pretty(&history)?)
        .with_context(|| format!("Failed to write transcript: {}", path.display()))?;

    Ok(interaction)
}

/// Render a transcript as CSV with a `timestamp,user,assistant` header.
pub fn interactions_to_csv(interactions: &[Interaction]) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(["timestamp", "user", "assistant"])?;
    for item in interactions {
        writer.write_record([&item.timestamp, &item.user, &item.assistant])?;
    }
    writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("CSV flush failed: {}", e))
}

/// Write the chat's transcript next to its JSON file as CSV.
///
/// Returns `None` when the chat has no recorded exchanges.
pub fn export_csv(layout: &DataLayout, email: &str, chat: &str) -> Result<Option<PathBuf>> {
    let history = load_interactions(layout, email, chat)?;
    if history.is_empty() {
        return Ok(None);
    }

    let path = layout.transcript_csv(email, chat);
    ensure_parent(&path)?;
    std::fs::write(&path, interactions_to_csv(&history)?)
        .with_context(|| format!("Failed to write CSV export: {}", path.display()))?;
    Ok(Some(path))
}
