use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Payload exchanged with the bus
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusEnvelope {
    #[serde(rename = "chatId")]
    pub chat_id: String,
    pub message: String,
}

impl BusEnvelope {
    pub fn new(chat_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            chat_id: chat_id.into(),
            message: message.into(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnvelopeError {
    #[error("envelope has no chatId")]
    MissingChatId,
    #[error("envelope has no message text")]
    MissingMessage,
}

/// Recover `{chatId, message}` from a bus payload.
///
/// Structured JSON is tried first; the chat id may be a string or a bare
/// number, and the text may live under `message` or `text`. Payloads that
/// are not valid JSON (or carry the fields in an unexpected shape) are then
/// scanned field by field, so a partially broken producer still gets through.
pub fn parse(payload: &str) -> Result<BusEnvelope, EnvelopeError> {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(payload) {
        let chat_id = map.get("chatId").and_then(chat_id_from_value);
        let message = map
            .get("message")
            .or_else(|| map.get("text"))
            .and_then(Value::as_str);
        if let (Some(chat_id), Some(message)) = (chat_id, message) {
            return Ok(BusEnvelope::new(chat_id, message));
        }
    }

    let chat_id = scan_chat_id(payload).ok_or(EnvelopeError::MissingChatId)?;
    let message = scan_string_field(payload, "message")
        .or_else(|| scan_string_field(payload, "text"))
        .ok_or(EnvelopeError::MissingMessage)?;
    Ok(BusEnvelope::new(chat_id, message))
}

fn chat_id_from_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Position just past `"key"` and the following `:`
fn value_start(payload: &str, key: &str) -> Option<usize> {
    let needle = format!("\"{}\"", key);
    let mut from = 0;
    while let Some(found) = payload[from..].find(&needle) {
        let after_key = from + found + needle.len();
        let rest = &payload[after_key..];
        let trimmed = rest.trim_start();
        if let Some(after_colon) = trimmed.strip_prefix(':') {
            let skipped = rest.len() - after_colon.len();
            let value = &payload[after_key + skipped..];
            return Some(after_key + skipped + (value.len() - value.trim_start().len()));
        }
        from = after_key;
    }
    None
}

fn scan_chat_id(payload: &str) -> Option<String> {
    let start = value_start(payload, "chatId")?;
    if payload[start..].starts_with('"') {
        return scan_quoted(&payload[start..])
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
    }

    // Bare value: runs up to the first unquoted `,` or `}`
    let rest = &payload[start..];
    let end = rest.find(|c| c == ',' || c == '}')?;
    let id = rest[..end].trim();
    (!id.is_empty()).then(|| id.to_string())
}

fn scan_string_field(payload: &str, key: &str) -> Option<String> {
    let start = value_start(payload, key)?;
    scan_quoted(&payload[start..])
}

/// Read a quoted string starting at `s[0] == '"'`, honoring backslash escapes
fn scan_quoted(s: &str) -> Option<String> {
    let mut chars = s.strip_prefix('"')?.chars();
    let mut out = String::new();
    while let Some(c) = chars.next() {
        match c {
            '"' => return Some(out),
            '\\' => match chars.next()? {
                'n' => out.push('\n'),
                't' => out.push('\t'),
                'r' => out.push('\r'),
                other => out.push(other),
            },
            other => out.push(other),
        }
    }
    None
}
