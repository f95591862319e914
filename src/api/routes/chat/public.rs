//! Public types for the chat API
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::chat::models::{Session, SessionSummary};
use crate::chat::store::Pagination;
use crate::openai::CompletionKind;

#[derive(Deserialize)]
pub struct SendMessageRequest {
    pub message: String,
    pub session_id: Option<String>,
}

#[derive(Serialize)]
pub struct SendMessageResponse {
    pub reply: String,
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
}

/// Returned with a 503 when the completion service fails. The turn was
/// still recorded against `session_id` with a fallback reply.
#[derive(Serialize)]
pub struct CompletionFailureResponse {
    pub error: &'static str,
    pub category: CompletionKind,
    pub message: String,
    pub session_id: String,
}

#[derive(Deserialize)]
pub struct HistoryQuery {
    // Kept as strings so malformed values fall back to defaults
    // instead of rejecting the request
    pub page: Option<String>,
    pub limit: Option<String>,
}

#[derive(Serialize)]
pub struct HistoryResponse {
    pub sessions: Vec<SessionSummary>,
    pub pagination: Pagination,
}

#[derive(Serialize)]
pub struct SessionResponse {
    pub session: Session,
}

#[derive(Serialize)]
pub struct DeleteSessionResponse {
    pub message: String,
    pub deleted_session_id: String,
}

#[derive(Serialize)]
pub struct ClearHistoryResponse {
    pub message: String,
    pub deleted_count: usize,
}
