use std::future::Future;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::bus::{envelope, BusDelivery, Channel};
use crate::platform::{mask_chat_id, DirectReply};
use crate::processor::BusProcessor;
use crate::responder::{Responder, PROCESSING_FAILED};

/// Run `task` on its own tokio task. If it panics and the chat is known,
/// the chat gets the generic failure reply.
pub fn spawn_guarded<F>(task: F, responder: Responder, chat_id: Option<String>) -> JoinHandle<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let Err(e) = tokio::spawn(task).await else {
            return;
        };
        if !e.is_panic() {
            return;
        }
        match chat_id {
            Some(chat_id) => {
                error!("Message task for {} panicked", mask_chat_id(&chat_id));
                responder.send(&chat_id, PROCESSING_FAILED).await;
            }
            None => error!("Message task panicked"),
        }
    })
}

/// Drain bus deliveries until every publisher is gone. Inbound payloads run
/// through the processor, outbound ones are delivered to the chat.
pub async fn run(
    mut deliveries: mpsc::Receiver<BusDelivery>,
    processor: Arc<BusProcessor>,
    outbound: Arc<dyn DirectReply>,
) {
    info!("Bus consumer started");
    while let Some(delivery) = deliveries.recv().await {
        match delivery.channel {
            Channel::Inbound => {
                let chat_id = envelope::parse(&delivery.payload).ok().map(|e| e.chat_id);
                let responder = processor.responder().clone();
                let processor = processor.clone();
                spawn_guarded(
                    async move {
                        let status = processor.process(&delivery.payload).await;
                        debug!("Bus message processed: {}", status);
                    },
                    responder,
                    chat_id,
                );
            }
            Channel::Outbound => {
                let outbound = outbound.clone();
                tokio::spawn(async move { deliver(outbound.as_ref(), &delivery.payload).await });
            }
        }
    }
    info!("Bus consumer stopped");
}

async fn deliver(outbound: &dyn DirectReply, payload: &str) {
    let envelope = match envelope::parse(payload) {
        Ok(e) => e,
        Err(e) => {
            warn!("Dropping malformed outbound message ({}): {}", e, payload);
            return;
        }
    };
    let masked = mask_chat_id(&envelope.chat_id);
    match outbound.send_direct(&envelope.chat_id, &envelope.message).await {
        Ok(()) => info!("Delivered reply to {}", masked),
        Err(e) => error!("Failed to deliver reply to {}: {:#}", masked, e),
    }
}
