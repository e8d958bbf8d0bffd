//! Chat metrics

use metrics::Counter;

/// Room session counters, shared by every session of the process.
#[derive(Clone, Debug)]
pub(crate) struct ChatMetrics {
    /// Messages published to a room topic
    pub(crate) published_total: Counter,
    /// Messages from other peers handed to the UI
    pub(crate) received_total: Counter,
    /// Queued messages published while a session was leaving
    pub(crate) flushed_total: Counter,
    /// Payloads that failed to encode, publish or decode
    pub(crate) errors_total: Counter,
}

impl Default for ChatMetrics {
    fn default() -> Self {
        Self {
            published_total: metrics::counter!("chat.messages.published_total"),
            received_total: metrics::counter!("chat.messages.received_total"),
            flushed_total: metrics::counter!("chat.messages.flushed_total"),
            errors_total: metrics::counter!("chat.messages.errors_total"),
        }
    }
}
