use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::ChatId;
use tracing::{error, info, warn};

use crate::classifier::classify;
use crate::consumer::spawn_guarded;
use crate::platform::{mask_chat_id, DirectReply};
use crate::router::Router;

/// Telegram's hard limit is 4096; leave some headroom
const MAX_CHUNK: usize = 4000;

/// Split long messages for Telegram's 4096 char limit
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut start = 0;

    while start < text.len() {
        let mut end = (start + max_len).min(text.len());
        // Walk back to a valid UTF-8 char boundary so slicing doesn't panic
        while end > start && !text.is_char_boundary(end) {
            end -= 1;
        }
        let actual_end = if end < text.len() {
            text[start..end]
                .rfind('\n')
                .or_else(|| text[start..end].rfind(' '))
                .map(|pos| start + pos + 1)
                .unwrap_or(end)
        } else {
            end
        };

        chunks.push(text[start..actual_end].to_string());
        start = actual_end;
    }

    chunks
}

/// Sends plain text to a Telegram chat
#[derive(Clone)]
pub struct TelegramSender {
    bot: Bot,
}

impl TelegramSender {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl DirectReply for TelegramSender {
    async fn send_direct(&self, chat_id: &str, text: &str) -> Result<()> {
        let id: i64 = chat_id
            .parse()
            .with_context(|| format!("Invalid Telegram chat id: {}", mask_chat_id(chat_id)))?;
        for chunk in split_message(text, MAX_CHUNK) {
            self.bot
                .send_message(ChatId(id), chunk)
                .await
                .context("Failed to send Telegram message")?;
        }
        Ok(())
    }
}

/// Run the Telegram dispatcher until shutdown
pub async fn run(bot: Bot, router: Arc<Router>) -> Result<()> {
    info!("Starting Telegram platform...");

    let handler = Update::filter_message().endpoint(handle_message);

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![router])
        .default_handler(|upd| async move {
            warn!("Unhandled update: {:?}", upd.id);
        })
        .error_handler(LoggingErrorHandler::with_custom_text("telegram"))
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}

async fn handle_message(msg: Message, router: Arc<Router>) -> ResponseResult<()> {
    let text = match msg.text() {
        Some(t) => t.to_string(),
        None => return Ok(()),
    };
    let chat_id = msg.chat.id.0.to_string();
    let classified = classify(&text);
    let responder = router.responder().clone();

    // Awaiting keeps the dispatcher's per-chat ordering; the guard turns a
    // panic into the generic failure reply.
    let task_chat_id = chat_id.clone();
    let guard = spawn_guarded(
        async move {
            router.route(&task_chat_id, &classified).await;
        },
        responder,
        Some(chat_id.clone()),
    );
    if let Err(e) = guard.await {
        error!("Guard task for {} failed: {}", mask_chat_id(&chat_id), e);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_message_single_chunk() {
        assert_eq!(split_message("hello", 10), vec!["hello".to_string()]);
    }

    #[test]
    fn test_split_prefers_newlines() {
        let chunks = split_message("line one\nline two\nline three", 12);
        assert_eq!(chunks[0], "line one\n");
        assert_eq!(chunks.concat(), "line one\nline two\nline three");
    }

    #[test]
    fn test_split_respects_char_boundaries() {
        let text = "ж".repeat(10);
        let chunks = split_message(&text, 5);
        assert!(chunks.iter().all(|c| c.len() <= 5));
        assert_eq!(chunks.concat(), text);
    }
}
