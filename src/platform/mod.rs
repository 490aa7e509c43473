pub mod telegram;

use anyhow::Result;
use async_trait::async_trait;

/// Sends text straight to the chat transport, bypassing the bus
#[async_trait]
pub trait DirectReply: Send + Sync {
    async fn send_direct(&self, chat_id: &str, text: &str) -> Result<()>;
}

/// Hide all but the last four characters of a chat id for logging
pub fn mask_chat_id(chat_id: &str) -> String {
    let len = chat_id.chars().count();
    if len <= 4 {
        return "*".repeat(len);
    }
    chat_id
        .chars()
        .enumerate()
        .map(|(i, c)| if i < len - 4 { '*' } else { c })
        .collect()
}
