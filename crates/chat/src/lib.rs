//! Peer-to-peer chat rooms.
//!
//! - [`overlay`] - joining the routing overlay through seed peers
//! - [`discovery`] - finding other chat nodes through provider records
//! - [`session`] - membership in one room
//! - [`room`] - the active room and room switches
//! - [`substrate`] - the network contract, with libp2p and in-memory backends

mod command;
mod error;
mod message;
mod metrics;

pub mod discovery;
pub mod overlay;
pub mod room;
pub mod session;
pub mod substrate;

pub use command::{Command, CommandError, HELP, Input};
pub use discovery::{Discovery, DiscoveryConfig, DiscoveryMode, SERVICE_NAME, ServiceAdvertisement};
pub use error::{ChatError, SubstrateError};
pub use message::{ChatMessage, LogCategory, LogEntry, LogSink};
pub use overlay::{BootstrapReport, bootstrap};
pub use room::ChatRoom;
pub use session::{
    CHAT_ROOM_BUFFER, DEFAULT_ROOM, DEFAULT_USER, RoomSession, SessionConfig, SessionContext,
    SessionState, topic_name,
};
