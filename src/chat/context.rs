//! Assembles the bounded prompt context for a completion call

use crate::chat::models::{ChatMessage, Sender};
use crate::openai::{Message, Role};

/// Map the tail of a session transcript into role-tagged completion
/// turns, oldest first. Only the last `window` messages are included
/// so prompts stay bounded no matter how long the session gets.
pub fn context_window(messages: &[ChatMessage], window: usize) -> Vec<Message> {
    let start = messages.len().saturating_sub(window);
    messages[start..]
        .iter()
        .map(|msg| {
            let role = match msg.sender {
                Sender::User => Role::User,
                Sender::Bot => Role::Assistant,
            };
            Message::new(role, &msg.text)
        })
        .collect()
}
