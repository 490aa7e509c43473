use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub bus: BusConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BusBackend {
    #[default]
    Local,
    Kafka,
}

impl std::fmt::Display for BusBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BusBackend::Local => write!(f, "local"),
            BusBackend::Kafka => write!(f, "kafka"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct BusConfig {
    #[serde(default)]
    pub backend: BusBackend,
    #[serde(default = "default_inbound_topic")]
    pub inbound_topic: String,
    #[serde(default = "default_outbound_topic")]
    pub outbound_topic: String,
    /// Buffered deliveries before publishing starts failing
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    pub kafka: Option<KafkaConfig>,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            backend: BusBackend::default(),
            inbound_topic: default_inbound_topic(),
            outbound_topic: default_outbound_topic(),
            capacity: default_capacity(),
            kafka: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct KafkaConfig {
    pub brokers: Vec<String>,
    #[serde(default = "default_group_id")]
    pub group_id: String,
    #[serde(default = "default_delivery_timeout_ms")]
    pub delivery_timeout_ms: u64,
    /// Also process the inbound topic in this process
    #[serde(default = "default_true")]
    pub consume_inbound: bool,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("telegram-gate.db")
}

fn default_inbound_topic() -> String {
    "telegram-incoming-messages".to_string()
}

fn default_outbound_topic() -> String {
    "telegram-outgoing-messages".to_string()
}

fn default_capacity() -> usize {
    256
}

fn default_group_id() -> String {
    "telegram-gate".to_string()
}

fn default_delivery_timeout_ms() -> u64 {
    5000
}

fn default_true() -> bool {
    true
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse config file")?;
        if config.telegram.bot_token.trim().is_empty() {
            anyhow::bail!("telegram.bot_token must not be empty");
        }
        if config.bus.backend == BusBackend::Kafka && config.bus.kafka.is_none() {
            anyhow::bail!("bus.backend = \"kafka\" requires a [bus.kafka] section");
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = Config::parse(
            r#"
            [telegram]
            bot_token = "123:abc"
            "#,
        )
        .unwrap();
        assert_eq!(config.telegram.bot_token, "123:abc");
        assert_eq!(config.database.path, PathBuf::from("telegram-gate.db"));
        assert_eq!(config.bus.backend, BusBackend::Local);
        assert_eq!(config.bus.inbound_topic, "telegram-incoming-messages");
        assert_eq!(config.bus.outbound_topic, "telegram-outgoing-messages");
        assert_eq!(config.bus.capacity, 256);
        assert!(config.bus.kafka.is_none());
    }

    #[test]
    fn test_kafka_section() {
        let config = Config::parse(
            r#"
            [telegram]
            bot_token = "t"

            [database]
            path = "/var/lib/bot/users.db"

            [bus]
            backend = "kafka"
            inbound_topic = "in"

            [bus.kafka]
            brokers = ["k1:9092", "k2:9092"]
            consume_inbound = false
            "#,
        )
        .unwrap();
        assert_eq!(config.bus.backend, BusBackend::Kafka);
        assert_eq!(config.bus.inbound_topic, "in");
        let kafka = config.bus.kafka.unwrap();
        assert_eq!(kafka.brokers.len(), 2);
        assert_eq!(kafka.group_id, "telegram-gate");
        assert_eq!(kafka.delivery_timeout_ms, 5000);
        assert!(!kafka.consume_inbound);
    }

    #[test]
    fn test_kafka_backend_without_section_rejected() {
        let err = Config::parse(
            r#"
            [telegram]
            bot_token = "t"
            [bus]
            backend = "kafka"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("[bus.kafka]"));
    }

    #[test]
    fn test_empty_token_rejected() {
        assert!(Config::parse("[telegram]\nbot_token = \"  \"\n").is_err());
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let content = "[telegram]\nbot_token = \"t\"\n[bus]\nbackend = \"nats\"\n";
        assert!(Config::parse(content).is_err());
    }
}
