use std::sync::Arc;

use tracing::{error, info, warn};

use crate::bus::MessageBus;
use crate::platform::{mask_chat_id, DirectReply};

/// Sent when a command arrives from a chat that never ran /start
pub const ACTIVATION_REQUIRED: &str =
    "❌ Please start working with the bot using the /start command";

/// Sent when processing failed unexpectedly
pub const PROCESSING_FAILED: &str = "❌ An error occurred while processing your message.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    ViaBus,
    Direct,
    Failed,
}

/// Uniform "send text to chat". Prefers the bus; falls back to the direct
/// transport when one is wired. One attempt per path, errors are logged.
#[derive(Clone)]
pub struct Responder {
    bus: Arc<dyn MessageBus>,
    direct: Option<Arc<dyn DirectReply>>,
}

impl Responder {
    pub fn new(bus: Arc<dyn MessageBus>, direct: Option<Arc<dyn DirectReply>>) -> Self {
        Self { bus, direct }
    }

    pub async fn send(&self, chat_id: &str, text: &str) -> SendOutcome {
        let masked = mask_chat_id(chat_id);
        info!("[SEND] Sending response to user: {}", masked);

        let bus_err = match self.bus.publish_outbound(chat_id, text).await {
            Ok(()) => return SendOutcome::ViaBus,
            Err(e) => e,
        };

        let Some(direct) = &self.direct else {
            error!("[SEND] Failed to publish response for {}: {}", masked, bus_err);
            return SendOutcome::Failed;
        };

        warn!(
            "[SEND] Bus publish failed for {} ({}), replying directly",
            masked, bus_err
        );
        match direct.send_direct(chat_id, text).await {
            Ok(()) => SendOutcome::Direct,
            Err(e) => {
                error!("[SEND] Direct reply to {} failed: {:#}", masked, e);
                SendOutcome::Failed
            }
        }
    }
}
