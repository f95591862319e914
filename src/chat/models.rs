//! Data model for conversations

use chrono::{DateTime, Utc};
use rusqlite::{
    ToSql,
    types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef},
};
use serde::{Deserialize, Serialize};

/// Number of characters of the first user message kept as the session
/// title before truncating.
const TITLE_MAX_CHARS: usize = 30;

/// Which side of the conversation a message came from.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Sender {
    #[serde(rename = "user")]
    User,
    #[serde(rename = "bot")]
    Bot,
}

impl ToSql for Sender {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        // Use serde serialization to convert the enum into a string to
        // save to the database while still enforcing the sender column
        // can only be a `Sender` variant.
        let name = serde_json::to_string(self).expect("Failed to parse enum into string");
        let value: String = serde_json::from_str(&name).expect("Failed to parse string from enum");
        Ok(value.into())
    }
}

impl FromSql for Sender {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        // Serde deserialization can only parse an enum from string if
        // it's double quoted.
        serde_json::from_str(&format!("\"{}\"", value.as_str()?))
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

/// A single message within a session's transcript.
#[derive(Serialize, Clone, Debug)]
pub struct ChatMessage {
    pub text: String,
    pub sender: Sender,
    pub created_at: DateTime<Utc>,
}

/// A full session including its transcript, ordered oldest first.
#[derive(Serialize, Clone, Debug)]
pub struct Session {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub messages: Vec<ChatMessage>,
}

/// Session metadata returned by history listings. Transcripts are only
/// loaded when fetching a single session.
#[derive(Serialize, Clone, Debug)]
pub struct SessionSummary {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub message_count: i64,
}

/// Derive a session title from the first user message of a new
/// session. Computed once at creation and never recomputed, even if
/// the original message is evicted later.
pub fn derive_title(text: &str) -> String {
    let mut chars = text.chars();
    let title: String = chars.by_ref().take(TITLE_MAX_CHARS).collect();
    if chars.next().is_some() {
        format!("{}...", title)
    } else {
        title
    }
}
