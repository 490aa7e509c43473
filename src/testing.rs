//! Recording fakes shared by unit tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;

use crate::bus::{BusEnvelope, BusError, Channel, MessageBus};
use crate::commands::CommandHandler;
use crate::platform::DirectReply;
use crate::store::{SqliteUserStore, User, UserStore};

/// Ordered record of side effects across fakes
pub type EventLog = Arc<Mutex<Vec<String>>>;

pub fn event_log() -> EventLog {
    Arc::new(Mutex::new(Vec::new()))
}

#[derive(Default)]
pub struct RecordingBus {
    fail: AtomicBool,
    attempts: AtomicUsize,
    published: Mutex<Vec<(Channel, BusEnvelope)>>,
    log: Option<EventLog>,
}

impl RecordingBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        let bus = Self::default();
        bus.fail.store(true, Ordering::SeqCst);
        Arc::new(bus)
    }

    pub fn with_log(log: EventLog) -> Arc<Self> {
        Arc::new(Self {
            log: Some(log),
            ..Self::default()
        })
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn published(&self, channel: Channel) -> Vec<(String, String)> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _)| *c == channel)
            .map(|(_, e)| (e.chat_id.clone(), e.message.clone()))
            .collect()
    }
}

#[async_trait]
impl MessageBus for RecordingBus {
    async fn publish(&self, channel: Channel, envelope: &BusEnvelope) -> Result<(), BusError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(log) = &self.log {
            log.lock()
                .unwrap()
                .push(format!("publish:{}:{}", channel, envelope.chat_id));
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(BusError::Unavailable("test bus down".to_string()));
        }
        self.published
            .lock()
            .unwrap()
            .push((channel, envelope.clone()));
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingDirect {
    fail: AtomicBool,
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingDirect {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        let direct = Self::default();
        direct.fail.store(true, Ordering::SeqCst);
        Arc::new(direct)
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl DirectReply for RecordingDirect {
    async fn send_direct(&self, chat_id: &str, text: &str) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("telegram unreachable");
        }
        self.sent
            .lock()
            .unwrap()
            .push((chat_id.to_string(), text.to_string()));
        Ok(())
    }
}

/// In-memory SQLite store that appends `save:<chat_id>` to the log once a
/// write has completed
pub struct LoggingStore {
    pub inner: SqliteUserStore,
    log: EventLog,
}

impl LoggingStore {
    pub fn new(log: EventLog) -> Arc<Self> {
        Arc::new(Self {
            inner: SqliteUserStore::open_in_memory().unwrap(),
            log,
        })
    }
}

#[async_trait]
impl UserStore for LoggingStore {
    async fn lookup(&self, chat_id: &str) -> Result<Option<User>> {
        self.inner.lookup(chat_id).await
    }

    async fn save(&self, user: &User) -> Result<User> {
        let saved = self.inner.save(user).await?;
        self.log
            .lock()
            .unwrap()
            .push(format!("save:{}", user.chat_id));
        Ok(saved)
    }

    async fn check_authorization(&self, command: &str, chat_id: &str) -> Result<bool> {
        self.inner.check_authorization(command, chat_id).await
    }

    fn authorization_error_message(&self, command: &str) -> String {
        self.inner.authorization_error_message(command)
    }
}

/// Store whose every operation fails
pub struct FailingStore;

#[async_trait]
impl UserStore for FailingStore {
    async fn lookup(&self, _chat_id: &str) -> Result<Option<User>> {
        anyhow::bail!("store down")
    }

    async fn save(&self, _user: &User) -> Result<User> {
        anyhow::bail!("store down")
    }

    async fn check_authorization(&self, _command: &str, _chat_id: &str) -> Result<bool> {
        anyhow::bail!("store down")
    }

    fn authorization_error_message(&self, command: &str) -> String {
        format!("denied {}", command)
    }
}

/// Command handler whose commands always fail
pub struct FailingCommands;

#[async_trait]
impl CommandHandler for FailingCommands {
    async fn process_command(&self, name: &str, _args: &[String], _chat_id: &str) -> Result<()> {
        anyhow::bail!("{} is broken", name)
    }

    fn handler_start(&self, _args: &str) -> String {
        "welcome".to_string()
    }

    fn handler_q(&self) -> String {
        "ask me".to_string()
    }
}
