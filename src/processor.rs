use std::sync::Arc;

use tracing::{error, info};

use crate::activation::{activate_from, Activation};
use crate::bus::envelope;
use crate::classifier::{classify, ClassifiedMessage};
use crate::commands::CommandHandler;
use crate::platform::mask_chat_id;
use crate::responder::{Responder, ACTIVATION_REQUIRED, PROCESSING_FAILED};
use crate::store::UserStore;

pub const INVALID_FORMAT: &str = "Error: Invalid message format";
pub const START_ACTIVATED: &str = "Processed /start: user activated";
pub const START_PROCESSED: &str = "Processed /start";
pub const START_CREATED: &str = "Processed /start: new user created";
pub const START_CREATE_FAILED: &str = "Error while creating new user";
pub const COMMAND_PROCESSED: &str = "Command processed";

/// Runs the activation/command logic for messages that arrive from the bus.
/// Replies go out through the [`Responder`]; the returned string is a
/// short status for the caller's logs.
pub struct BusProcessor {
    store: Arc<dyn UserStore>,
    commands: Arc<dyn CommandHandler>,
    responder: Responder,
}

impl BusProcessor {
    pub fn new(
        store: Arc<dyn UserStore>,
        commands: Arc<dyn CommandHandler>,
        responder: Responder,
    ) -> Self {
        Self {
            store,
            commands,
            responder,
        }
    }

    pub fn responder(&self) -> &Responder {
        &self.responder
    }

    pub async fn process(&self, payload: &str) -> String {
        let envelope = match envelope::parse(payload) {
            Ok(e) => e,
            Err(e) => {
                error!("Failed to parse bus message ({}): {}", e, payload);
                return INVALID_FORMAT.to_string();
            }
        };

        let chat_id = envelope.chat_id.as_str();
        info!("Processing bus message from user: {}", mask_chat_id(chat_id));

        let message = classify(&envelope.message);
        if message.is_start() {
            self.process_start(chat_id, &message).await
        } else {
            self.process_message(chat_id, &message).await
        }
    }

    async fn process_start(&self, chat_id: &str, message: &ClassifiedMessage) -> String {
        let masked = mask_chat_id(chat_id);

        let existing = match self.store.lookup(chat_id).await {
            Ok(u) => u,
            Err(e) => {
                error!("[START] Failed to look up user {}: {:#}", masked, e);
                return PROCESSING_FAILED.to_string();
            }
        };
        let creating = existing.is_none();

        // The transport side may already have written the flag; both outcomes
        // are normal here.
        let activation = match activate_from(self.store.as_ref(), existing, chat_id).await {
            Ok(a) => a,
            Err(e) if creating => {
                error!("[START] Error saving new user {}: {:#}", masked, e);
                return START_CREATE_FAILED.to_string();
            }
            Err(e) => {
                error!("[START] Error activating user {}: {:#}", masked, e);
                return PROCESSING_FAILED.to_string();
            }
        };

        let welcome = self.commands.handler_start(&message.args_text());
        self.responder.send(chat_id, &welcome).await;

        let status = match activation {
            Activation::AlreadyActive(_) => START_PROCESSED,
            Activation::Activated(_) => START_ACTIVATED,
            Activation::Created(_) => START_CREATED,
        };
        status.to_string()
    }

    async fn process_message(&self, chat_id: &str, message: &ClassifiedMessage) -> String {
        let masked = mask_chat_id(chat_id);

        let user = match self.store.lookup(chat_id).await {
            Ok(u) => u,
            Err(e) => {
                error!("Error checking user status for {}: {:#}", masked, e);
                return PROCESSING_FAILED.to_string();
            }
        };

        if !user.is_some_and(|u| u.has_started) {
            self.responder.send(chat_id, ACTIVATION_REQUIRED).await;
            return ACTIVATION_REQUIRED.to_string();
        }

        if message.is_command {
            return match self
                .commands
                .process_command(&message.command_name, &message.args, chat_id)
                .await
            {
                Ok(()) => COMMAND_PROCESSED.to_string(),
                Err(e) => {
                    error!(
                        "Command {} failed for {}: {:#}",
                        message.command_name, masked, e
                    );
                    self.responder.send(chat_id, PROCESSING_FAILED).await;
                    PROCESSING_FAILED.to_string()
                }
            };
        }

        let reply = self.commands.handler_q();
        self.responder.send(chat_id, &reply).await;
        reply
    }
}
