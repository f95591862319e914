//! Test utilities for integration tests
use std::env;
use std::fs;
use std::sync::{Arc, RwLock};
use std::time::SystemTime;

use axum::{Router, body::Body};

use chatd::accounts::create_user;
use chatd::api::AppState;
use chatd::api::app;
use chatd::chat::ChatService;
use chatd::core::AppConfig;
use chatd::core::db::async_db;
use chatd::core::db::initialize_db;
use chatd::openai::CompletionClient;

/// Creates a test application router backed by its own database, with
/// one seeded user whose id is returned alongside the router.
///
/// The completion API hostname is a parameter so each test can point
/// the app at its own mock server. Every call gets a fresh database
/// directory, so tests are free to run in parallel.
pub async fn test_app(api_hostname: &str) -> (Router, String) {
    // Create a unique directory for the test with a randomly
    // generated name using a timestamp to avoid collisions and
    // vulnerabilities
    let temp_dir = env::temp_dir();
    let ts = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap()
        .as_nanos()
        .to_string();
    let db_path = temp_dir.join(format!("chatd-test-{}", ts)).join("db");
    fs::create_dir_all(&db_path).expect("Failed to create db directory");

    let db = async_db(db_path.to_str().unwrap())
        .await
        .expect("Failed to connect to async db");
    db.call(|conn| {
        initialize_db(conn).expect("Failed to migrate db");
        Ok(())
    })
    .await
    .unwrap();

    let user = create_user(&db, "testuser", "test@example.com")
        .await
        .expect("Failed to seed test user");

    let app_config = AppConfig {
        db_path: db_path.display().to_string(),
        openai_model: String::from("gpt-4o-mini"),
        openai_api_hostname: api_hostname.to_string(),
        openai_api_key: String::from("test-api-key"),
        max_tokens: 500,
        temperature: 0.7,
        completion_timeout_secs: 5,
        max_message_length: 1000,
        context_window: 5,
        max_sessions: 50,
    };
    let chat = ChatService::new(CompletionClient::new(&app_config), &app_config);
    let app_state = AppState::new(db, app_config, chat);
    (app(Arc::new(RwLock::new(app_state))), user.id)
}

pub async fn body_to_string(body: Body) -> String {
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .expect("Failed to read response body");
    String::from_utf8(bytes.to_vec()).expect("Response body was not utf-8")
}

/// Canned OpenAI-style completion response for mock servers.
pub fn completion_body(content: &str) -> String {
    serde_json::json!({
        "id": "chatcmpl-123",
        "object": "chat.completion",
        "created": 1694268190,
        "model": "gpt-4o-mini",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": content },
            "finish_reason": "stop"
        }]
    })
    .to_string()
}
