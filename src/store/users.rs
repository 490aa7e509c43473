use anyhow::{Context, Result};
use async_trait::async_trait;
use rusqlite::OptionalExtension;

use super::{SqliteUserStore, UserStore};
use crate::classifier::START_COMMAND;

/// Commands that may run before activation
const OPEN_COMMANDS: &[&str] = &[START_COMMAND, "/help"];

/// One chat participant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub chat_id: String,
    pub has_started: bool,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

impl User {
    /// A fresh, not yet activated user. Not persisted.
    pub fn new(chat_id: impl Into<String>) -> Self {
        Self {
            chat_id: chat_id.into(),
            has_started: false,
            username: None,
            first_name: None,
            created_at: None,
            updated_at: None,
        }
    }

    pub fn activated(chat_id: impl Into<String>) -> Self {
        Self {
            has_started: true,
            ..Self::new(chat_id)
        }
    }
}

fn parse_user_row(row: &rusqlite::Row) -> rusqlite::Result<User> {
    Ok(User {
        chat_id: row.get(0)?,
        has_started: row.get(1)?,
        username: row.get(2)?,
        first_name: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

const SELECT_USER: &str = "SELECT chat_id, has_started, username, first_name, created_at, updated_at
     FROM users WHERE chat_id = ?1";

#[async_trait]
impl UserStore for SqliteUserStore {
    async fn lookup(&self, chat_id: &str) -> Result<Option<User>> {
        let conn = self.conn.lock().await;
        conn.query_row(SELECT_USER, rusqlite::params![chat_id], parse_user_row)
            .optional()
            .context("Failed to look up user")
    }

    async fn save(&self, user: &User) -> Result<User> {
        let now = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string();
        let conn = self.conn.lock().await;

        // Single-statement upsert: concurrent first contacts collapse into one
        // row, and has_started only ever moves from 0 to 1.
        conn.execute(
            "INSERT INTO users (chat_id, has_started, username, first_name, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(chat_id) DO UPDATE SET
                has_started = MAX(users.has_started, excluded.has_started),
                username = COALESCE(excluded.username, users.username),
                first_name = COALESCE(excluded.first_name, users.first_name),
                updated_at = excluded.updated_at",
            rusqlite::params![
                &user.chat_id,
                user.has_started,
                &user.username,
                &user.first_name,
                &now,
            ],
        )
        .context("Failed to save user")?;

        conn.query_row(SELECT_USER, rusqlite::params![&user.chat_id], parse_user_row)
            .context("Failed to read back saved user")
    }

    async fn check_authorization(&self, command: &str, chat_id: &str) -> Result<bool> {
        if OPEN_COMMANDS.contains(&command) {
            return Ok(true);
        }
        let user = self.lookup(chat_id).await?;
        Ok(user.is_some_and(|u| u.has_started))
    }

    fn authorization_error_message(&self, command: &str) -> String {
        format!("❌ The {} command is available only after /start", command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn count_rows(store: &SqliteUserStore, chat_id: &str) -> i64 {
        let conn = store.conn.lock().await;
        conn.query_row(
            "SELECT count(*) FROM users WHERE chat_id = ?1",
            rusqlite::params![chat_id],
            |row| row.get(0),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_lookup_missing_user() {
        let store = SqliteUserStore::open_in_memory().unwrap();
        assert!(store.lookup("42").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_and_lookup() {
        let store = SqliteUserStore::open_in_memory().unwrap();
        let saved = store.save(&User::activated("42")).await.unwrap();
        assert!(saved.has_started);
        assert!(saved.created_at.is_some());

        let found = store.lookup("42").await.unwrap().unwrap();
        assert_eq!(found.chat_id, "42");
        assert!(found.has_started);
    }

    #[tokio::test]
    async fn test_upsert_twice_keeps_one_record() {
        let store = SqliteUserStore::open_in_memory().unwrap();
        store.save(&User::activated("42")).await.unwrap();
        store.save(&User::activated("42")).await.unwrap();
        assert_eq!(count_rows(&store, "42").await, 1);
    }

    #[tokio::test]
    async fn test_has_started_never_reset() {
        let store = SqliteUserStore::open_in_memory().unwrap();
        store.save(&User::activated("42")).await.unwrap();

        let saved = store.save(&User::new("42")).await.unwrap();
        assert!(saved.has_started);
    }

    #[tokio::test]
    async fn test_profile_fields_preserved() {
        let store = SqliteUserStore::open_in_memory().unwrap();
        let mut user = User::new("42");
        user.username = Some("alice".to_string());
        user.first_name = Some("Alice".to_string());
        store.save(&user).await.unwrap();

        let saved = store.save(&User::activated("42")).await.unwrap();
        assert!(saved.has_started);
        assert_eq!(saved.username.as_deref(), Some("alice"));
        assert_eq!(saved.first_name.as_deref(), Some("Alice"));
    }

    #[tokio::test]
    async fn test_concurrent_first_saves_collapse() {
        let store = SqliteUserStore::open_in_memory().unwrap();
        let a = User::activated("99");
        let b = User::activated("99");
        let (ra, rb) = futures::future::join(store.save(&a), store.save(&b)).await;
        assert!(ra.unwrap().has_started);
        assert!(rb.unwrap().has_started);
        assert_eq!(count_rows(&store, "99").await, 1);
    }

    #[tokio::test]
    async fn test_authorization() {
        let store = SqliteUserStore::open_in_memory().unwrap();
        assert!(store.check_authorization("/start", "1").await.unwrap());
        assert!(store.check_authorization("/help", "1").await.unwrap());
        assert!(!store.check_authorization("/balance", "1").await.unwrap());

        store.save(&User::new("1")).await.unwrap();
        assert!(!store.check_authorization("/balance", "1").await.unwrap());

        store.save(&User::activated("1")).await.unwrap();
        assert!(store.check_authorization("/balance", "1").await.unwrap());
    }

    #[test]
    fn test_authorization_error_names_command() {
        let store = SqliteUserStore::open_in_memory().unwrap();
        let msg = store.authorization_error_message("/balance");
        assert!(msg.contains("/balance"));
        assert!(msg.contains("/start"));
    }
}
