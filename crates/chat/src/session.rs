//! A node's membership in one chat room.
//!
//! A [`RoomSession`] owns two loops: the publish loop drains the outbound
//! queue into the room topic, and the subscribe loop turns topic deliveries
//! into [`ChatMessage`]s on the inbound queue. Both stop on the session's
//! cancel token; [`RoomSession::leave`] waits for them before releasing the
//! topic.

use std::{sync::Arc, time::Duration};

use peerchat_net::PeerId;
use peerchat_tasks::{CancelToken, TaskExecutor};
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
    time::sleep,
};
use tracing::{debug, info, warn};

use crate::{
    ChatError, ChatMessage, LogSink,
    metrics::ChatMetrics,
    substrate::{PubSub, Subscription, Topic},
};

/// Room joined when none is given.
pub const DEFAULT_ROOM: &str = "lobby";

/// User name used when none is given.
pub const DEFAULT_USER: &str = "newuser";

/// Capacity of the inbound and outbound queues.
pub const CHAT_ROOM_BUFFER: usize = 128;

const TOPIC_PREFIX: &str = "room-peerchat-";

/// Gossip topic carrying `room`.
pub fn topic_name(room: &str) -> String {
    format!("{TOPIC_PREFIX}{room}")
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Capacity of the inbound and outbound queues.
    pub buffer: usize,
    /// Delay between stopping the loops and releasing the topic.
    pub leave_grace: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            buffer: CHAT_ROOM_BUFFER,
            leave_grace: Duration::from_millis(250),
        }
    }
}

/// Everything a session needs from its surroundings.
#[derive(Clone)]
pub struct SessionContext {
    pub pubsub: Arc<dyn PubSub>,
    pub local_peer: PeerId,
    pub logs: LogSink,
    pub executor: TaskExecutor,
    /// Parent of every session's cancel token.
    pub cancel: CancelToken,
    pub config: SessionConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Joining,
    Active,
    Leaving,
    /// Terminal.
    Closed,
}

#[derive(Debug)]
enum Outbound {
    Message(String),
    Rename(String),
}

/// Membership in one room.
pub struct RoomSession {
    room: String,
    topic: Arc<dyn Topic>,
    outbound: mpsc::Sender<Outbound>,
    inbound: mpsc::Receiver<ChatMessage>,
    state: Arc<watch::Sender<SessionState>>,
    cancel: CancelToken,
    tasks: Vec<JoinHandle<()>>,
    executor: TaskExecutor,
    leave_grace: Duration,
}

impl RoomSession {
    /// Join `room` as `user`. Empty names fall back to [`DEFAULT_ROOM`] and
    /// [`DEFAULT_USER`].
    ///
    /// Fails without side effects if the topic cannot be joined or subscribed.
    pub async fn join(ctx: &SessionContext, room: &str, user: &str) -> Result<Self, ChatError> {
        let room = non_empty_or(room, DEFAULT_ROOM);
        let user = non_empty_or(user, DEFAULT_USER);
        let (state, _) = watch::channel(SessionState::Joining);
        let topic_name = topic_name(&room);

        let topic = ctx
            .pubsub
            .join_topic(&topic_name)
            .await
            .map_err(|source| ChatError::Join {
                room: room.clone(),
                source,
            })?;
        let subscription = match topic.subscribe().await {
            Ok(subscription) => subscription,
            Err(source) => {
                let _ = topic.close().await;
                return Err(ChatError::Join { room, source });
            }
        };

        let buffer = ctx.config.buffer.max(1);
        let (outbound_tx, outbound_rx) = mpsc::channel(buffer);
        let (inbound_tx, inbound_rx) = mpsc::channel(buffer);
        let state = Arc::new(state);
        let cancel = ctx.cancel.child();
        let metrics = ChatMetrics::default();

        let publisher = ctx.executor.spawn(
            "room-publish",
            publish_loop(PublishLoop {
                topic: topic.clone(),
                queue: outbound_rx,
                local_peer: ctx.local_peer,
                user,
                logs: ctx.logs.clone(),
                cancel: cancel.clone(),
                metrics: metrics.clone(),
            }),
        );
        let subscriber = ctx.executor.spawn(
            "room-subscribe",
            subscribe_loop(SubscribeLoop {
                subscription,
                inbound: inbound_tx,
                local_peer: ctx.local_peer,
                logs: ctx.logs.clone(),
                state: state.clone(),
                cancel: cancel.clone(),
                metrics,
            }),
        );

        state.send_replace(SessionState::Active);
        info!(%room, topic = %topic_name, "Joined room");

        Ok(Self {
            room,
            topic,
            outbound: outbound_tx,
            inbound: inbound_rx,
            state,
            cancel,
            tasks: vec![publisher, subscriber],
            executor: ctx.executor.clone(),
            leave_grace: ctx.config.leave_grace,
        })
    }

    pub fn room(&self) -> &str {
        &self.room
    }

    pub fn topic(&self) -> &Arc<dyn Topic> {
        &self.topic
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Queue `text` for publishing.
    pub async fn publish(&self, text: impl Into<String>) -> Result<(), ChatError> {
        self.enqueue(Outbound::Message(text.into())).await
    }

    /// Use `name` for messages queued after this call.
    pub async fn rename(&self, name: impl Into<String>) -> Result<(), ChatError> {
        self.enqueue(Outbound::Rename(name.into())).await
    }

    async fn enqueue(&self, item: Outbound) -> Result<(), ChatError> {
        if self.cancel.is_cancelled() {
            return Err(ChatError::SessionClosed);
        }
        self.outbound
            .send(item)
            .await
            .map_err(|_| ChatError::SessionClosed)
    }

    /// Next message from another peer; `None` once the subscription closed.
    pub async fn recv(&mut self) -> Option<ChatMessage> {
        self.inbound.recv().await
    }

    /// Stop both loops, wait for them, then release the topic after the
    /// grace period on a detached task. Calling it again does nothing.
    pub async fn leave(&mut self) {
        if self.tasks.is_empty() {
            return;
        }
        self.state.send_if_modified(|state| {
            let active = *state == SessionState::Active;
            if active {
                *state = SessionState::Leaving;
            }
            active
        });
        self.cancel.cancel();

        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                warn!(room = %self.room, %e, "Room task failed");
            }
        }
        self.state.send_replace(SessionState::Closed);

        let topic = self.topic.clone();
        let grace = self.leave_grace;
        self.executor.spawn("room-release", async move {
            sleep(grace).await;
            if let Err(e) = topic.close().await {
                debug!(topic = topic.name(), %e, "Failed to release topic");
            }
        });
        info!(room = %self.room, "Left room");
    }
}

impl Drop for RoomSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn non_empty_or(value: &str, default: &str) -> String {
    if value.is_empty() {
        default.to_string()
    } else {
        value.to_string()
    }
}

struct PublishLoop {
    topic: Arc<dyn Topic>,
    queue: mpsc::Receiver<Outbound>,
    local_peer: PeerId,
    user: String,
    logs: LogSink,
    cancel: CancelToken,
    metrics: ChatMetrics,
}

async fn publish_loop(mut this: PublishLoop) {
    loop {
        let item = tokio::select! {
            biased;
            _ = this.cancel.cancelled() => None,
            item = this.queue.recv() => item,
        };
        let Some(item) = item else { break };
        this.handle(item).await;
    }

    // Anything accepted before the session started leaving still goes out on
    // this topic; it stays open until the release grace period ends.
    this.queue.close();
    let mut flushed = 0u64;
    while let Ok(item) = this.queue.try_recv() {
        if matches!(item, Outbound::Message(_)) {
            flushed += 1;
        }
        this.handle(item).await;
    }
    if flushed > 0 {
        this.metrics.flushed_total.increment(flushed);
        debug!(topic = this.topic.name(), flushed, "Flushed queued messages on leave");
    }
}

impl PublishLoop {
    async fn handle(&mut self, item: Outbound) {
        match item {
            Outbound::Rename(name) => self.user = name,
            Outbound::Message(text) => {
                let message = ChatMessage::new(text, &self.local_peer, &self.user);
                let data = match serde_json::to_vec(&message) {
                    Ok(data) => data,
                    Err(e) => {
                        self.metrics.errors_total.increment(1);
                        self.logs.puberr(format!("could not marshal JSON: {e}"));
                        return;
                    }
                };
                match self.topic.publish(data).await {
                    Ok(()) => self.metrics.published_total.increment(1),
                    Err(e) => {
                        self.metrics.errors_total.increment(1);
                        self.logs.puberr(format!("could not publish to topic: {e}"));
                    }
                }
            }
        }
    }
}

struct SubscribeLoop {
    subscription: Box<dyn Subscription>,
    inbound: mpsc::Sender<ChatMessage>,
    local_peer: PeerId,
    logs: LogSink,
    state: Arc<watch::Sender<SessionState>>,
    cancel: CancelToken,
    metrics: ChatMetrics,
}

async fn subscribe_loop(mut this: SubscribeLoop) {
    loop {
        let next = tokio::select! {
            biased;
            _ = this.cancel.cancelled() => None,
            delivery = this.subscription.next() => Some(delivery),
        };
        let Some(delivery) = next else {
            this.subscription.cancel();
            return;
        };
        let Some(delivery) = delivery else {
            this.logs.suberr("subscription has closed");
            this.state.send_replace(SessionState::Closed);
            this.cancel.cancel();
            return;
        };

        if delivery.received_from == this.local_peer {
            continue;
        }
        let message: ChatMessage = match serde_json::from_slice(&delivery.data) {
            Ok(message) => message,
            Err(e) => {
                this.metrics.errors_total.increment(1);
                this.logs.suberr(format!("could not unmarshal JSON: {e}"));
                continue;
            }
        };
        if message.is_from(&this.local_peer) {
            continue;
        }

        let sent = tokio::select! {
            biased;
            _ = this.cancel.cancelled() => false,
            sent = this.inbound.send(message) => sent.is_ok(),
        };
        if !sent {
            this.subscription.cancel();
            return;
        }
        this.metrics.received_total.increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_name() {
        assert_eq!(topic_name("lobby"), "room-peerchat-lobby");
    }

    #[test]
    fn test_non_empty_or() {
        assert_eq!(non_empty_or("", DEFAULT_ROOM), "lobby");
        assert_eq!(non_empty_or("   ", DEFAULT_USER), "   ");
        assert_eq!(non_empty_or(" rust ", DEFAULT_ROOM), " rust ");
    }
}
