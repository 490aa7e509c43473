use anyhow::{Context, Result};
use tracing::info;

use crate::platform::mask_chat_id;
use crate::store::{User, UserStore};

/// How the activation flag came to be set
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Activation {
    /// Record existed with `has_started` already true; nothing written
    AlreadyActive(User),
    /// Record existed and was flipped to true
    Activated(User),
    /// No record existed; one was created with `has_started = true`
    Created(User),
}

/// Make sure `chat_id` is durably activated. Returns only after any needed
/// write has completed.
pub async fn ensure_activated(store: &dyn UserStore, chat_id: &str) -> Result<Activation> {
    let existing = store
        .lookup(chat_id)
        .await
        .with_context(|| format!("Failed to look up user {}", mask_chat_id(chat_id)))?;
    activate_from(store, existing, chat_id).await
}

/// Second half of [`ensure_activated`] for callers that already looked the
/// user up
pub async fn activate_from(
    store: &dyn UserStore,
    existing: Option<User>,
    chat_id: &str,
) -> Result<Activation> {
    let masked = mask_chat_id(chat_id);
    match existing {
        Some(user) if user.has_started => {
            info!("User {} already activated", masked);
            Ok(Activation::AlreadyActive(user))
        }
        Some(mut user) => {
            info!("Activating existing user {}", masked);
            user.has_started = true;
            let saved = store
                .save(&user)
                .await
                .with_context(|| format!("Failed to activate user {}", masked))?;
            Ok(Activation::Activated(saved))
        }
        None => {
            info!("Creating activated user {}", masked);
            let saved = store
                .save(&User::activated(chat_id))
                .await
                .with_context(|| format!("Failed to create user {}", masked))?;
            Ok(Activation::Created(saved))
        }
    }
}
