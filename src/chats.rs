//! Per-user chat threads, persisted as one JSON object per user:
//! `{ "<chat name>": [ { "role": "user", "content": "..." }, ... ] }`.

use anyhow::{Context, Result};
use std::collections::BTreeMap;

use crate::models::Message;
use crate::paths::{ensure_parent, DataLayout};

/// All chats of one user, keyed by chat name.
pub type Chats = BTreeMap<String, Vec<Message>>;

/// Load a user's chats. A missing file means no chats yet.
pub fn load_chats(layout: &DataLayout, email: &str) -> Result<Chats> {
    let path = layout.chats_file(email);
    if !path.exists() {
        return Ok(Chats::new());
    }
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read chats file: {}", path.display()))?;
    let chats = serde_json::from_str(&content)
        .with_context(|| format!("Corrupt chats file: {}", path.display()))?;
    Ok(chats)
}

pub fn save_chats(layout: &DataLayout, email: &str, chats: &Chats) -> Result<()> {
    let path = layout.chats_file(email);
    ensure_parent(&path)?;
    let json = serde_json::to_string_pretty(chats)?;
    std::fs::write(&path, json)
        .with_context(|| format!("Failed to write chats file: {}", path.display()))?;
    Ok(())
}

/// Add an empty chat. Returns `false` if the (trimmed) name is empty or taken.
pub fn create_chat(chats: &mut Chats, name: &str) -> bool {
    let name = name.trim();
    if name.is_empty() || chats.contains_key(name) {
        return false;
    }
    chats.insert(name.to_string(), Vec::new());
    true
}

/// Remove a chat if present.
pub fn delete_chat(chats: &mut Chats, name: &str) -> bool {
    chats.remove(name).is_some()
}
