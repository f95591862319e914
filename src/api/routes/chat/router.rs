//! Router for the chat API

use std::sync::{Arc, RwLock};

use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use axum_extra::extract::Query;
use serde_json::json;

use super::public;
use crate::api::auth::UserId;
use crate::api::state::AppState;
use crate::chat::core::ChatError;
use crate::chat::store::{self, HistoryError};

type SharedState = Arc<RwLock<AppState>>;

/// List the user's sessions, most recently active first
async fn chat_history(
    State(state): State<SharedState>,
    UserId(user_id): UserId,
    Query(params): Query<public::HistoryQuery>,
) -> Result<impl IntoResponse, crate::api::public::ApiError> {
    let db = state.read().expect("Unable to read share state").db.clone();
    let page = params
        .page
        .as_deref()
        .and_then(|raw| raw.parse::<usize>().ok());
    let limit = params
        .limit
        .as_deref()
        .and_then(|raw| raw.parse::<usize>().ok());

    match store::list_sessions(&db, &user_id, page, limit).await {
        Ok(session_page) => Ok(axum::Json(public::HistoryResponse {
            sessions: session_page.sessions,
            pagination: session_page.pagination,
        })
        .into_response()),
        Err(HistoryError::UserNotFound) => Ok((
            StatusCode::NOT_FOUND,
            axum::Json(json!({ "message": "User not found" })),
        )
            .into_response()),
        Err(err) => Err(err.into()),
    }
}

/// Send a message and get the assistant's reply
async fn send_message(
    State(state): State<SharedState>,
    UserId(user_id): UserId,
    axum::Json(payload): axum::Json<public::SendMessageRequest>,
) -> Result<impl IntoResponse, crate::api::public::ApiError> {
    let (db, chat) = {
        let shared_state = state.read().expect("Unable to read share state");
        (shared_state.db.clone(), shared_state.chat.clone())
    };

    let result = chat
        .send_message(&db, &user_id, &payload.message, payload.session_id.as_deref())
        .await;

    match result {
        Ok(receipt) => Ok(axum::Json(public::SendMessageResponse {
            reply: receipt.reply,
            session_id: receipt.session_id,
            timestamp: receipt.timestamp,
        })
        .into_response()),
        Err(ChatError::InvalidInput(reason)) => Ok((
            StatusCode::BAD_REQUEST,
            axum::Json(json!({ "message": reason })),
        )
            .into_response()),
        Err(err @ ChatError::UserNotFound) | Err(err @ ChatError::SessionNotFound) => Ok((
            StatusCode::NOT_FOUND,
            axum::Json(json!({ "message": err.to_string() })),
        )
            .into_response()),
        // The turn was persisted with a fallback reply before this
        // failure was surfaced
        Err(ChatError::CompletionFailed { session_id, source }) => Ok((
            StatusCode::SERVICE_UNAVAILABLE,
            axum::Json(public::CompletionFailureResponse {
                error: "ai_service_error",
                category: source.kind(),
                message: source.to_string(),
                session_id,
            }),
        )
            .into_response()),
        Err(ChatError::Storage(err)) => Err(err.into()),
    }
}

/// Get a single chat session with its full transcript
async fn view_session(
    State(state): State<SharedState>,
    UserId(user_id): UserId,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, crate::api::public::ApiError> {
    let db = state.read().expect("Unable to read share state").db.clone();

    match store::find_session(&db, &user_id, &id).await {
        Ok(session) => Ok(axum::Json(public::SessionResponse { session }).into_response()),
        Err(HistoryError::UserNotFound) => Ok((
            StatusCode::NOT_FOUND,
            axum::Json(json!({ "message": "User not found" })),
        )
            .into_response()),
        Err(HistoryError::SessionNotFound) => Ok((
            StatusCode::NOT_FOUND,
            axum::Json(json!({ "message": format!("Chat session {} not found", id) })),
        )
            .into_response()),
        Err(err) => Err(err.into()),
    }
}

/// Delete a single chat session
async fn delete_session(
    State(state): State<SharedState>,
    UserId(user_id): UserId,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, crate::api::public::ApiError> {
    let db = state.read().expect("Unable to read share state").db.clone();

    match store::delete_session(&db, &user_id, &id).await {
        Ok(()) => Ok(axum::Json(public::DeleteSessionResponse {
            message: "Chat session deleted successfully".to_string(),
            deleted_session_id: id,
        })
        .into_response()),
        Err(HistoryError::UserNotFound) => Ok((
            StatusCode::NOT_FOUND,
            axum::Json(json!({ "message": "User not found" })),
        )
            .into_response()),
        Err(HistoryError::SessionNotFound) => Ok((
            StatusCode::NOT_FOUND,
            axum::Json(json!({ "message": format!("Chat session {} not found", id) })),
        )
            .into_response()),
        Err(err) => Err(err.into()),
    }
}

/// Delete all of the user's chat history
async fn clear_history(
    State(state): State<SharedState>,
    UserId(user_id): UserId,
) -> Result<impl IntoResponse, crate::api::public::ApiError> {
    let db = state.read().expect("Unable to read share state").db.clone();

    match store::clear_history(&db, &user_id).await {
        Ok(deleted_count) => Ok(axum::Json(public::ClearHistoryResponse {
            message: "Chat history cleared successfully".to_string(),
            deleted_count,
        })
        .into_response()),
        Err(HistoryError::UserNotFound) => Ok((
            StatusCode::NOT_FOUND,
            axum::Json(json!({ "message": "User not found" })),
        )
            .into_response()),
        Err(err) => Err(err.into()),
    }
}

/// Create the chat router
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/history", get(chat_history).delete(clear_history))
        .route("/message", post(send_message))
        .route("/session/{id}", get(view_session).delete(delete_session))
}
