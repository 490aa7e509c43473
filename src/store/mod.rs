pub mod users;

use anyhow::{Context, Result};
use async_trait::async_trait;
use rusqlite::Connection;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

pub use users::User;

/// Persistent access to user activation records, keyed by chat id
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn lookup(&self, chat_id: &str) -> Result<Option<User>>;

    /// Idempotent upsert. Returns the record as stored.
    async fn save(&self, user: &User) -> Result<User>;

    /// Whether `chat_id` may run `command` right now
    async fn check_authorization(&self, command: &str, chat_id: &str) -> Result<bool>;

    fn authorization_error_message(&self, command: &str) -> String;
}

/// SQLite-backed user store
#[derive(Clone)]
pub struct SqliteUserStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteUserStore {
    /// Open or create the SQLite database at the given path
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;

        // journal_mode PRAGMA always returns the resulting mode, so use query_row
        let _: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;

        Self::run_migrations(&conn)?;

        info!("User store initialized at: {}", path.display());
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory database (for testing)
    #[allow(dead_code)]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::run_migrations(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn run_migrations(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS users (
                chat_id TEXT PRIMARY KEY,
                has_started INTEGER NOT NULL DEFAULT 0,
                username TEXT,
                first_name TEXT,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );
            ",
        )
        .context("Failed to create users table")?;
        Ok(())
    }
}
