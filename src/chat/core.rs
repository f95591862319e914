//! Conversation orchestration: validates input, assembles bounded
//! context, calls the completion service, and reconciles the outcome
//! into the history store.

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio_rusqlite::Connection;

use crate::accounts;
use crate::chat::context;
use crate::chat::store::{self, HistoryError};
use crate::core::AppConfig;
use crate::openai::{CompletionClient, CompletionError, Message, Role};

/// Reply recorded in place of a completion when the completion service
/// fails, so the user's message is never dropped.
pub const FALLBACK_REPLY: &str =
    "Sorry, I'm having trouble connecting to the AI service. Please try again later.";

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("{0}")]
    InvalidInput(String),
    #[error("User not found")]
    UserNotFound,
    #[error("Chat session not found")]
    SessionNotFound,
    /// The completion call failed after the user's message and a
    /// fallback reply were already persisted to `session_id`.
    #[error("{source}")]
    CompletionFailed {
        session_id: String,
        source: CompletionError,
    },
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl From<HistoryError> for ChatError {
    fn from(err: HistoryError) -> Self {
        match err {
            HistoryError::UserNotFound => ChatError::UserNotFound,
            HistoryError::SessionNotFound => ChatError::SessionNotFound,
            HistoryError::Storage(e) => ChatError::Storage(e.into()),
        }
    }
}

/// Receipt returned to the caller after a successful turn.
#[derive(Clone, Debug)]
pub struct TurnReceipt {
    pub reply: String,
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
}

/// Per-request conversation orchestrator. Holds the completion client
/// and the conversation tunables; constructed once at startup and
/// shared by every request.
#[derive(Clone)]
pub struct ChatService {
    completions: CompletionClient,
    max_message_length: usize,
    context_window: usize,
    max_sessions: usize,
}

impl ChatService {
    pub fn new(completions: CompletionClient, config: &AppConfig) -> Self {
        Self {
            completions,
            max_message_length: config.max_message_length,
            context_window: config.context_window,
            max_sessions: config.max_sessions,
        }
    }

    /// Run one conversation turn: validate the message, resolve the
    /// user and session, send the recent transcript to the completion
    /// service, and store the resulting message pair.
    ///
    /// When the completion fails, the user's message still lands in
    /// history with [`FALLBACK_REPLY`] before the categorized failure
    /// is returned.
    pub async fn send_message(
        &self,
        db: &Connection,
        user_id: &str,
        text: &str,
        session_id: Option<&str>,
    ) -> Result<TurnReceipt, ChatError> {
        let text = validate_message(text, self.max_message_length)?;

        accounts::find_user(db, user_id)
            .await?
            .ok_or(ChatError::UserNotFound)?;

        // An unknown session must fail before any completion call
        let mut turns = match session_id {
            Some(sid) => {
                let session = store::find_session(db, user_id, sid).await?;
                context::context_window(&session.messages, self.context_window)
            }
            None => Vec::new(),
        };
        turns.push(Message::new(Role::User, &text));

        match self.completions.complete(&turns).await {
            Ok(reply) => {
                let appended =
                    store::append_turn(db, user_id, session_id, &text, &reply, self.max_sessions)
                        .await?;
                Ok(TurnReceipt {
                    reply,
                    session_id: appended.session_id,
                    timestamp: appended.appended_at,
                })
            }
            Err(err) => {
                tracing::error!("Completion failed: {}", err);
                let appended = store::append_turn(
                    db,
                    user_id,
                    session_id,
                    &text,
                    FALLBACK_REPLY,
                    self.max_sessions,
                )
                .await?;
                Err(ChatError::CompletionFailed {
                    session_id: appended.session_id,
                    source: err,
                })
            }
        }
    }
}

fn validate_message(text: &str, max_chars: usize) -> Result<String, ChatError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ChatError::InvalidInput("Message is required".to_string()));
    }
    if trimmed.chars().count() > max_chars {
        return Err(ChatError::InvalidInput(format!(
            "Message exceeds maximum length of {} characters",
            max_chars
        )));
    }
    Ok(trimmed.to_string())
}
