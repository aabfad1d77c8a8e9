//! In-memory per-session conversation log.
//!
//! This store is the deliberate in-memory placeholder for a durable
//! deployment: it keeps everything behind four operations (`append`,
//! `read`, `clear`, `active_sessions`) so another backend can be swapped
//! in without touching callers. No eviction and no size bound.
use std::{
    collections::HashMap,
    sync::Mutex,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[cfg(test)]
mod tests;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
/// Author of a stored chat message.
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
/// One message in a chat session.
pub struct ChatMessageRecord {
    pub session_id: String,
    pub role: ChatRole,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl ChatMessageRecord {
    /// Builds a record stamped with the current time. The timestamp is
    /// metadata only; ordering is always append order.
    pub fn new(session_id: impl Into<String>, role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            role,
            content: content.into(),
            user_id: None,
            timestamp: Utc::now(),
            metadata: None,
        }
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// In-memory session store. One lock guards the whole map, which also
/// serializes concurrent appends to the same session.
#[derive(Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<String, Vec<ChatMessageRecord>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn guard(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<ChatMessageRecord>>> {
        match self.sessions.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Appends a message to its session, creating the session on first use.
    pub fn append(&self, record: ChatMessageRecord) {
        let mut sessions = self.guard();
        sessions
            .entry(record.session_id.clone())
            .or_default()
            .push(record);
    }

    /// Returns the session's messages in append order, or the most recent
    /// `limit` of them. Unknown sessions read as empty.
    pub fn read(&self, session_id: &str, limit: Option<usize>) -> Vec<ChatMessageRecord> {
        let sessions = self.guard();
        let Some(messages) = sessions.get(session_id) else {
            return Vec::new();
        };
        match limit {
            Some(limit) => {
                let start = messages.len().saturating_sub(limit);
                messages[start..].to_vec()
            }
            None => messages.clone(),
        }
    }

    /// Removes a session entirely. Clearing an absent session is a no-op.
    pub fn clear(&self, session_id: &str) {
        let mut sessions = self.guard();
        sessions.remove(session_id);
    }

    /// Sorted ids of sessions currently holding at least one message.
    pub fn active_sessions(&self) -> Vec<String> {
        let sessions = self.guard();
        let mut ids = sessions
            .iter()
            .filter(|(_, messages)| !messages.is_empty())
            .map(|(id, _)| id.clone())
            .collect::<Vec<_>>();
        ids.sort();
        ids
    }
}
