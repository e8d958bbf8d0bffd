//! Line-oriented chat console on stdin/stdout.

use std::{sync::Arc, time::Duration};

use eyre::Result;
use parking_lot::Mutex;
use peerchat_chat::{
    ChatMessage, ChatRoom, Command, HELP, Input, LogEntry, LogSink, substrate::Topic,
};
use peerchat_net::PeerId;
use peerchat_tasks::{CancelToken, TaskExecutor};
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, BufReader},
    sync::{mpsc, watch},
    time::interval,
};
use tracing::{debug, error};

const REFRESH_INTERVAL: Duration = Duration::from_secs(1);

/// Chat front-end. Owns the [`ChatRoom`].
pub(crate) struct Console {
    room: ChatRoom,
    logs: LogSink,
    log_rx: mpsc::UnboundedReceiver<LogEntry>,
    /// Written by the refresh task, read on every tick.
    peers: Arc<Mutex<Vec<PeerId>>>,
    shown_peers: Vec<PeerId>,
    executor: TaskExecutor,
    shutdown: CancelToken,
}

enum Event {
    Line(std::io::Result<Option<String>>),
    Message(Option<ChatMessage>),
    Log(LogEntry),
    Tick,
    Shutdown,
}

impl Console {
    pub(crate) fn new(
        room: ChatRoom,
        logs: LogSink,
        log_rx: mpsc::UnboundedReceiver<LogEntry>,
        executor: TaskExecutor,
        shutdown: CancelToken,
    ) -> Self {
        Self {
            room,
            logs,
            log_rx,
            peers: Arc::default(),
            shown_peers: Vec::new(),
            executor,
            shutdown,
        }
    }

    pub(crate) async fn run(self) -> Result<()> {
        self.run_with(BufReader::new(tokio::io::stdin())).await
    }

    /// Drive the console from `input` until `/quit`, end of input, a read
    /// error, or shutdown. The room is always left before returning.
    async fn run_with<R>(mut self, input: R) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        self.executor.spawn_with_cancel(
            "peer-refresh",
            self.shutdown.child(),
            refresh_peers(self.room.peer_watch(), self.peers.clone()),
        );

        let mut lines = input.lines();
        let mut tick = interval(REFRESH_INTERVAL);
        let mut inbound_open = true;

        println!("{HELP}");
        self.print_room();

        loop {
            let event = tokio::select! {
                _ = self.shutdown.cancelled() => Event::Shutdown,
                line = lines.next_line() => Event::Line(line),
                message = self.room.recv(), if inbound_open => Event::Message(message),
                Some(entry) = self.log_rx.recv() => Event::Log(entry),
                _ = tick.tick() => Event::Tick,
            };

            match event {
                Event::Shutdown => break,
                Event::Line(line) => {
                    let line = match line {
                        Ok(Some(line)) => line,
                        Ok(None) => {
                            debug!("stdin closed");
                            break;
                        }
                        Err(e) => {
                            error!(%e, "Failed to read from stdin");
                            break;
                        }
                    };
                    match Input::parse(&line) {
                        Ok(Input::Empty) => {}
                        Ok(Input::Message(text)) => self.send(text).await,
                        Ok(Input::Command(Command::Quit)) => break,
                        Ok(Input::Command(command)) => {
                            if self.handle_command(command).await {
                                inbound_open = true;
                            }
                        }
                        Err(e) => self.logs.input(e.to_string()),
                    }
                }
                Event::Message(Some(message)) => println!("{}", render_message(&message)),
                Event::Message(None) => inbound_open = false,
                Event::Log(entry) => println!("{entry}"),
                Event::Tick => {
                    let peers = self.peers.lock().clone();
                    if peers != self.shown_peers {
                        self.shown_peers = peers;
                        self.print_peers();
                    }
                }
            }
        }

        self.room.leave().await;
        Ok(())
    }

    async fn send(&mut self, text: String) {
        let echo = format!("{} (me): {text}", self.room.user_name());
        match self.room.publish(text).await {
            Ok(()) => println!("{echo}"),
            Err(e) => self.logs.error(format!("message not sent: {e}")),
        }
    }

    /// Returns true when a new room was joined.
    async fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::Room(room) => match self.room.switch_room(&room).await {
                Ok(()) => {
                    self.logs.log(format!("joined room {}", self.room.room_name()));
                    self.shown_peers.clear();
                    self.peers.lock().clear();
                    self.print_room();
                    return true;
                }
                Err(e) => self.logs.error(e.to_string()),
            },
            Command::User(name) => match self.room.change_user_name(&name).await {
                Ok(()) => self.logs.log(format!("user name changed to {name}")),
                Err(e) => self.logs.input(e.to_string()),
            },
            Command::Sync => match self.room.peer_list().await {
                Ok(peers) => {
                    *self.peers.lock() = peers.clone();
                    self.shown_peers = peers;
                    self.print_peers();
                }
                Err(e) => self.logs.error(format!("could not list peers: {e}")),
            },
            Command::Help => println!("{HELP}"),
            Command::Quit => {}
        }
        false
    }

    fn print_room(&self) {
        println!(
            "Room: {} | User: {} | Peer: {}",
            self.room.room_name(),
            self.room.user_name(),
            short_id(&self.room.local_peer_id())
        );
    }

    fn print_peers(&self) {
        println!("{}", render_peers(self.room.room_name(), &self.shown_peers));
    }
}

/// Keep `peers` in sync with the active room's topic, once per second and
/// right after every room switch.
async fn refresh_peers(mut topics: watch::Receiver<Arc<dyn Topic>>, peers: Arc<Mutex<Vec<PeerId>>>) {
    let mut tick = interval(REFRESH_INTERVAL);
    loop {
        tokio::select! {
            _ = tick.tick() => {}
            changed = topics.changed() => {
                if changed.is_err() {
                    return;
                }
            }
        }

        let topic = topics.borrow_and_update().clone();
        match topic.list_peers().await {
            Ok(mut list) => {
                list.sort();
                *peers.lock() = list;
            }
            Err(e) => debug!(topic = topic.name(), %e, "Failed to list peers"),
        }
    }
}

/// Last eight characters of a peer id.
fn short_id(peer: &PeerId) -> String {
    let id = peer.to_string();
    let (_, tail) = id.split_at(id.len().saturating_sub(8));
    tail.to_string()
}

fn render_message(message: &ChatMessage) -> String {
    format!("{}: {}", message.sender_name, message.message)
}

fn render_peers(room: &str, peers: &[PeerId]) -> String {
    if peers.is_empty() {
        return format!("peers in {room}: none");
    }
    let ids: Vec<String> = peers.iter().map(short_id).collect();
    format!("peers in {room}: {}", ids.join(", "))
}

#[cfg(test)]
mod tests {
    use std::{
        io,
        pin::Pin,
        task::{Context, Poll},
    };

    use peerchat_chat::{
        SessionConfig, SessionContext, substrate::loopback::LoopbackHub, topic_name,
    };
    use tokio::{
        io::{AsyncRead, ReadBuf, duplex},
        time::{sleep, timeout},
    };

    use super::*;

    struct BrokenInput;

    impl AsyncRead for BrokenInput {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            Poll::Ready(Err(io::Error::other("terminal went away")))
        }
    }

    async fn lobby_console(hub: &LoopbackHub, shutdown: &CancelToken) -> Console {
        let peer = PeerId::random();
        let (logs, log_rx) = LogSink::channel();
        let executor = TaskExecutor::current();
        let ctx = SessionContext {
            pubsub: Arc::new(hub.pubsub(peer)),
            local_peer: peer,
            logs: logs.clone(),
            executor: executor.clone(),
            cancel: shutdown.child(),
            config: SessionConfig::default(),
        };
        let room = ChatRoom::join(ctx, "lobby", "alice").await.unwrap();
        Console::new(room, logs, log_rx, executor, shutdown.clone())
    }

    #[tokio::test]
    async fn test_read_error_leaves_room() {
        let hub = LoopbackHub::new();
        let shutdown = CancelToken::new();
        let console = lobby_console(&hub, &shutdown).await;
        assert_eq!(hub.subscriber_count(&topic_name("lobby")), 1);

        timeout(Duration::from_secs(1), console.run_with(BufReader::new(BrokenInput)))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(hub.subscriber_count(&topic_name("lobby")), 0);
    }

    #[tokio::test]
    async fn test_shutdown_while_waiting_for_input_leaves_room() {
        let hub = LoopbackHub::new();
        let shutdown = CancelToken::new();
        let console = lobby_console(&hub, &shutdown).await;
        let (_writer, reader) = duplex(64);

        let run = console.run_with(BufReader::new(reader));
        let interrupt = async {
            sleep(Duration::from_millis(50)).await;
            shutdown.cancel();
        };
        let (result, ()) = timeout(Duration::from_secs(1), async { tokio::join!(run, interrupt) })
            .await
            .unwrap();
        result.unwrap();
        assert_eq!(hub.subscriber_count(&topic_name("lobby")), 0);
    }

    #[tokio::test]
    async fn test_quit_after_message() {
        let hub = LoopbackHub::new();
        let shutdown = CancelToken::new();
        let console = lobby_console(&hub, &shutdown).await;

        let input: &[u8] = b"hello\n/quit\nnever sent\n";
        timeout(Duration::from_secs(1), console.run_with(input))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(hub.subscriber_count(&topic_name("lobby")), 0);
    }

    #[test]
    fn test_short_id_is_suffix() {
        let peer = PeerId::random();
        let short = short_id(&peer);
        assert_eq!(short.len(), 8);
        assert!(peer.to_string().ends_with(&short));
    }

    #[test]
    fn test_render_message() {
        let message = ChatMessage {
            message: "hi all".into(),
            sender_id: PeerId::random().to_string(),
            sender_name: "bob".into(),
        };
        assert_eq!(render_message(&message), "bob: hi all");
    }

    #[test]
    fn test_render_peers() {
        assert_eq!(render_peers("lobby", &[]), "peers in lobby: none");

        let peer = PeerId::random();
        let rendered = render_peers("lobby", &[peer]);
        assert_eq!(rendered, format!("peers in lobby: {}", short_id(&peer)));
    }
}
