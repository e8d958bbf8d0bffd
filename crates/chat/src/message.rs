//! Wire messages and UI log entries.

use std::fmt;

use peerchat_net::PeerId;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// A chat message as carried over gossipsub, encoded as JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub message: String,
    #[serde(rename = "senderid")]
    pub sender_id: String,
    #[serde(rename = "sendername")]
    pub sender_name: String,
}

impl ChatMessage {
    pub fn new(message: impl Into<String>, sender: &PeerId, sender_name: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            sender_id: sender.to_string(),
            sender_name: sender_name.into(),
        }
    }

    /// Whether this message was sent by `peer`.
    pub fn is_from(&self, peer: &PeerId) -> bool {
        self.sender_id == peer.to_string()
    }
}

/// Category of a UI log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogCategory {
    /// Serialization or publish failure.
    PubErr,
    /// Deserialization failure or closed subscription.
    SubErr,
    Log,
    Error,
    /// Rejected user input.
    Input,
}

impl fmt::Display for LogCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::PubErr => "puberr",
            Self::SubErr => "suberr",
            Self::Log => "log",
            Self::Error => "error",
            Self::Input => "input",
        })
    }
}

/// A log line shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub category: LogCategory,
    pub text: String,
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.category, self.text)
    }
}

/// Sender side of the UI log queue.
///
/// Entries are mirrored to `tracing` so they also reach the diagnostics log.
#[derive(Debug, Clone)]
pub struct LogSink {
    tx: mpsc::UnboundedSender<LogEntry>,
}

impl LogSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<LogEntry>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn send(&self, category: LogCategory, text: impl Into<String>) {
        let text = text.into();
        match category {
            LogCategory::PubErr | LogCategory::SubErr | LogCategory::Error => {
                warn!(%category, %text, "chat log")
            }
            LogCategory::Log | LogCategory::Input => debug!(%category, %text, "chat log"),
        }
        // The UI may already be gone during shutdown.
        let _ = self.tx.send(LogEntry { category, text });
    }

    pub fn puberr(&self, text: impl Into<String>) {
        self.send(LogCategory::PubErr, text);
    }

    pub fn suberr(&self, text: impl Into<String>) {
        self.send(LogCategory::SubErr, text);
    }

    pub fn log(&self, text: impl Into<String>) {
        self.send(LogCategory::Log, text);
    }

    pub fn error(&self, text: impl Into<String>) {
        self.send(LogCategory::Error, text);
    }

    pub fn input(&self, text: impl Into<String>) {
        self.send(LogCategory::Input, text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_field_names() {
        let peer = PeerId::random();
        let message = ChatMessage::new("hi", &peer, "alice");
        let json: serde_json::Value = serde_json::to_value(&message).unwrap();

        assert_eq!(json["message"], "hi");
        assert_eq!(json["senderid"], peer.to_string());
        assert_eq!(json["sendername"], "alice");
        assert_eq!(json.as_object().unwrap().len(), 3);
    }

    #[test]
    fn test_decode_foreign_payload() {
        let raw = br#"{"message":"yo","senderid":"12D3KooWabc","sendername":"bob"}"#;
        let message: ChatMessage = serde_json::from_slice(raw).unwrap();
        assert_eq!(message.sender_name, "bob");
        assert_eq!(message.sender_id, "12D3KooWabc");
    }

    #[test]
    fn test_is_from() {
        let peer = PeerId::random();
        let message = ChatMessage::new("hi", &peer, "alice");
        assert!(message.is_from(&peer));
        assert!(!message.is_from(&PeerId::random()));
    }

    #[test]
    fn test_log_entry_display() {
        let (sink, mut rx) = LogSink::channel();
        sink.suberr("subscription has closed");
        let entry = rx.try_recv().unwrap();
        assert_eq!(entry.to_string(), "suberr: subscription has closed");
    }
}
