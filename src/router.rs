use std::sync::Arc;

use tracing::{error, info, warn};

use crate::activation::ensure_activated;
use crate::bus::MessageBus;
use crate::classifier::{classify, ClassifiedMessage, START_COMMAND};
use crate::commands::CommandHandler;
use crate::platform::{mask_chat_id, DirectReply};
use crate::responder::{Responder, ACTIVATION_REQUIRED, PROCESSING_FAILED};
use crate::store::{User, UserStore};

/// What happened to a routed message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Handed to the bus for downstream processing
    Forwarded,
    /// Bus publish failed; processed in-process instead
    HandledLocally,
    /// Command from a chat that is not activated
    Rejected,
    /// Store failure; nothing was sent
    Dropped,
}

/// Activation-gated router for messages coming from the chat transport.
///
/// `/start` is persisted before it is published, so anything downstream that
/// sees an activation message can trust the stored flag. Every other message
/// is gated on that flag. Bus failures fall back to the in-process command
/// handler so the chat always gets an answer.
pub struct Router {
    store: Arc<dyn UserStore>,
    bus: Arc<dyn MessageBus>,
    commands: Arc<dyn CommandHandler>,
    responder: Responder,
    direct: Arc<dyn DirectReply>,
}

impl Router {
    pub fn new(
        store: Arc<dyn UserStore>,
        bus: Arc<dyn MessageBus>,
        commands: Arc<dyn CommandHandler>,
        responder: Responder,
        direct: Arc<dyn DirectReply>,
    ) -> Self {
        Self {
            store,
            bus,
            commands,
            responder,
            direct,
        }
    }

    pub fn responder(&self) -> &Responder {
        &self.responder
    }

    pub async fn route(&self, chat_id: &str, message: &ClassifiedMessage) -> RouteOutcome {
        info!(
            "Received message from user: {}, command: {}",
            mask_chat_id(chat_id),
            message.is_command
        );
        if message.is_start() {
            self.route_activation(chat_id, message).await
        } else {
            self.route_message(chat_id, message).await
        }
    }

    async fn route_activation(&self, chat_id: &str, message: &ClassifiedMessage) -> RouteOutcome {
        let masked = mask_chat_id(chat_id);

        // Nothing is published until the activation write has completed
        if let Err(e) = ensure_activated(self.store.as_ref(), chat_id).await {
            error!("Error processing user for chatId {}: {:#}", masked, e);
            return RouteOutcome::Dropped;
        }

        match self.bus.publish_inbound(chat_id, &message.raw_text).await {
            Ok(()) => {
                info!("Start command from user {} sent to bus after save", masked);
                RouteOutcome::Forwarded
            }
            Err(e) => {
                warn!(
                    "Bus publish of /start failed for {} ({}), processing locally",
                    masked, e
                );
                self.run_command(START_COMMAND, &message.args, chat_id).await;
                RouteOutcome::HandledLocally
            }
        }
    }

    async fn route_message(&self, chat_id: &str, message: &ClassifiedMessage) -> RouteOutcome {
        let masked = mask_chat_id(chat_id);

        // Unknown chats are treated as not activated, without writing a record
        let user = match self.store.lookup(chat_id).await {
            Ok(Some(user)) => user,
            Ok(None) => User::new(chat_id),
            Err(e) => {
                error!("Error checking user status for {}: {:#}", masked, e);
                return RouteOutcome::Dropped;
            }
        };

        if message.is_command && !user.has_started {
            info!(
                "User {} not activated, rejecting command {}",
                masked, message.command_name
            );
            self.reject(chat_id).await;
            return RouteOutcome::Rejected;
        }

        match self.bus.publish_inbound(chat_id, &message.raw_text).await {
            Ok(()) => {
                info!("Message from user {} sent to bus", masked);
                RouteOutcome::Forwarded
            }
            Err(e) => {
                warn!(
                    "Bus publish failed for {} ({}), processing locally",
                    masked, e
                );
                self.process_locally(&user, &message.raw_text).await;
                RouteOutcome::HandledLocally
            }
        }
    }

    /// Direct reply first; the bus only if the transport itself failed
    async fn reject(&self, chat_id: &str) {
        let masked = mask_chat_id(chat_id);
        match self.direct.send_direct(chat_id, ACTIVATION_REQUIRED).await {
            Ok(()) => info!("Sent direct activation notice to user {}", masked),
            Err(e) => {
                error!("Error sending direct message to user {}: {:#}", masked, e);
                if let Err(e) = self.bus.publish_outbound(chat_id, ACTIVATION_REQUIRED).await {
                    error!("Activation notice for {} lost: {}", masked, e);
                }
            }
        }
    }

    async fn process_locally(&self, user: &User, raw_text: &str) {
        let chat_id = user.chat_id.as_str();
        let message = classify(raw_text);

        if !message.is_command {
            let reply = if user.has_started {
                self.commands.handler_q()
            } else {
                ACTIVATION_REQUIRED.to_string()
            };
            self.responder.send(chat_id, &reply).await;
            return;
        }

        match self
            .store
            .check_authorization(&message.command_name, chat_id)
            .await
        {
            Ok(true) => {
                self.run_command(&message.command_name, &message.args, chat_id)
                    .await
            }
            Ok(false) => {
                let reply = self
                    .store
                    .authorization_error_message(&message.command_name);
                self.responder.send(chat_id, &reply).await;
            }
            Err(e) => {
                error!(
                    "Authorization check failed for {}: {:#}",
                    mask_chat_id(chat_id),
                    e
                );
                self.responder.send(chat_id, PROCESSING_FAILED).await;
            }
        }
    }

    async fn run_command(&self, name: &str, args: &[String], chat_id: &str) {
        if let Err(e) = self.commands.process_command(name, args, chat_id).await {
            error!(
                "Command {} failed for {}: {:#}",
                name,
                mask_chat_id(chat_id),
                e
            );
            self.responder.send(chat_id, PROCESSING_FAILED).await;
        }
    }
}
