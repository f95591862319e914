use std::env;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub db_path: String,
    pub openai_model: String,
    pub openai_api_hostname: String,
    pub openai_api_key: String,
    pub max_tokens: u32,
    pub temperature: f64,
    pub completion_timeout_secs: u64,
    pub max_message_length: usize,
    pub context_window: usize,
    pub max_sessions: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        let storage_path = env::var("CHATD_STORAGE_PATH").unwrap_or("./".to_string());
        let db_path = format!("{}/db", storage_path);
        let openai_api_hostname =
            env::var("CHATD_LLM_HOST").unwrap_or_else(|_| "https://api.openai.com".to_string());
        let openai_api_key =
            env::var("OPENAI_API_KEY").unwrap_or_else(|_| "thiswontworkforopenai".to_string());
        let openai_model =
            env::var("CHATD_LLM_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
        let max_tokens = parsed_env("CHATD_MAX_TOKENS", 500);
        let temperature = parsed_env("CHATD_TEMPERATURE", 0.7);
        let completion_timeout_secs = parsed_env("CHATD_COMPLETION_TIMEOUT_SECS", 30);
        let max_message_length = parsed_env("CHATD_MAX_MESSAGE_LENGTH", 1000);
        let context_window = parsed_env("CHATD_CONTEXT_WINDOW", 5);
        let max_sessions = parsed_env("CHATD_MAX_SESSIONS", 50);

        Self {
            db_path,
            openai_model,
            openai_api_hostname,
            openai_api_key,
            max_tokens,
            temperature,
            completion_timeout_secs,
            max_message_length,
            context_window,
            max_sessions,
        }
    }
}

fn parsed_env<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}
