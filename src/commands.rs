use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

use crate::classifier::START_COMMAND;
use crate::platform::mask_chat_id;
use crate::responder::Responder;

/// Executes bot commands in-process
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Perform the command and reply to the chat
    async fn process_command(&self, name: &str, args: &[String], chat_id: &str) -> Result<()>;

    /// Welcome text for the activation command
    fn handler_start(&self, args: &str) -> String;

    /// Reply for free text that is not a command
    fn handler_q(&self) -> String;
}

const HELP_TEXT: &str = "Available commands:\n\
     /start - Activate the bot\n\
     /help - Show this message";

/// Built-in command set: activation welcome, help and unknown-command replies
pub struct BotCommands {
    responder: Responder,
}

impl BotCommands {
    pub fn new(responder: Responder) -> Self {
        Self { responder }
    }
}

#[async_trait]
impl CommandHandler for BotCommands {
    async fn process_command(&self, name: &str, args: &[String], chat_id: &str) -> Result<()> {
        info!(
            "Processing command {} for user {}",
            name,
            mask_chat_id(chat_id)
        );
        let reply = match name {
            START_COMMAND => self.handler_start(&args.join(" ")),
            "/help" => HELP_TEXT.to_string(),
            other => format!(
                "Unknown command {}. Send /help for the list of commands.",
                other
            ),
        };
        self.responder.send(chat_id, &reply).await;
        Ok(())
    }

    fn handler_start(&self, args: &str) -> String {
        let mut text = String::from("👋 Welcome! The bot is now active for this chat.\n\n");
        if !args.trim().is_empty() {
            text.push_str(&format!("Start parameter: {}\n\n", args.trim()));
        }
        text.push_str(HELP_TEXT);
        text
    }

    fn handler_q(&self) -> String {
        "I only understand commands. Send /help to see what I can do.".to_string()
    }
}
