use tokio_rusqlite::Connection;

use crate::chat::ChatService;
use crate::core::AppConfig;

pub struct AppState {
    pub db: Connection,
    pub config: AppConfig,
    pub chat: ChatService,
}

impl AppState {
    pub fn new(db: Connection, config: AppConfig, chat: ChatService) -> Self {
        Self { db, config, chat }
    }
}
