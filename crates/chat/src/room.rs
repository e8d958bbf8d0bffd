//! The active room and switching between rooms.

use std::{mem, sync::Arc};

use peerchat_net::PeerId;
use tokio::sync::watch;
use tracing::info;

use crate::{
    ChatError, ChatMessage,
    session::{RoomSession, SessionContext, SessionState},
    substrate::Topic,
};

/// Owns the node's single active [`RoomSession`].
///
/// Switching rooms joins the new room first; the current session is only
/// replaced once the join succeeded and the old session's loops have stopped.
pub struct ChatRoom {
    ctx: SessionContext,
    user: String,
    session: RoomSession,
    topic_tx: watch::Sender<Arc<dyn Topic>>,
}

impl ChatRoom {
    pub async fn join(ctx: SessionContext, room: &str, user: &str) -> Result<Self, ChatError> {
        let session = RoomSession::join(&ctx, room, user).await?;
        let (topic_tx, _) = watch::channel(session.topic().clone());
        let user = match user {
            "" => crate::DEFAULT_USER.to_string(),
            user => user.to_string(),
        };
        Ok(Self {
            ctx,
            user,
            session,
            topic_tx,
        })
    }

    pub fn room_name(&self) -> &str {
        self.session.room()
    }

    pub fn user_name(&self) -> &str {
        &self.user
    }

    pub fn local_peer_id(&self) -> PeerId {
        self.ctx.local_peer
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    /// Publish `text` in the active room.
    pub async fn publish(&self, text: impl Into<String>) -> Result<(), ChatError> {
        self.session.publish(text).await
    }

    /// Next message in the active room; `None` once its subscription closed.
    pub async fn recv(&mut self) -> Option<ChatMessage> {
        self.session.recv().await
    }

    /// Move to `room`. On failure the current room stays active.
    pub async fn switch_room(&mut self, room: &str) -> Result<(), ChatError> {
        let next = RoomSession::join(&self.ctx, room, &self.user).await?;

        self.session.leave().await;
        let previous = mem::replace(&mut self.session, next);
        self.topic_tx.send_replace(self.session.topic().clone());

        info!(from = previous.room(), to = self.session.room(), "Switched room");
        Ok(())
    }

    /// Use `name` for future messages, in this room and the next ones.
    pub async fn change_user_name(&mut self, name: &str) -> Result<(), ChatError> {
        if name.is_empty() {
            return Err(ChatError::EmptyUserName);
        }
        self.user = name.to_string();
        match self.session.rename(name).await {
            Ok(()) | Err(ChatError::SessionClosed) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Remote peers subscribed to the active room.
    pub async fn peer_list(&self) -> Result<Vec<PeerId>, ChatError> {
        Ok(self.session.topic().list_peers().await?)
    }

    /// Follows the active room's topic across switches.
    pub fn peer_watch(&self) -> watch::Receiver<Arc<dyn Topic>> {
        self.topic_tx.subscribe()
    }

    /// Leave the active room.
    pub async fn leave(&mut self) {
        self.session.leave().await;
    }
}
