//! Server network layer: connection multiplexing and the room/session state
//! loop.
//!
//! All mutable game state (rooms, directory) is owned by one event loop.
//! Listener acceptors, per-connection frame readers, the operator stdin
//! reader and the broadcast receiver run as spawned tasks that forward typed
//! events over a single channel into that loop, so no locking is needed:
//! mutual exclusion is structural.

use log::{debug, error, info, warn};
use shared::protocol::{self, Message};
use shared::{PlayerSlot, END_GAME_COMMAND, PROMPT_STAGGER, ROUND_SETTLE};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::ops::ControlFlow;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time;

use crate::announcer::{self, Announcer};
use crate::directory::PlayerDirectory;
use crate::judge::Outcome;
use crate::rooms::{AssignOutcome, Room, RoomRegistry};

pub type ConnId = u32;

pub const NAME_PROMPT: &str = "Please enter your name:";
pub const ROOM_PROMPT: &str =
    "These are available rooms. Please select one of them and enter its number:";
pub const ROOM_UNAVAILABLE: &str = "This room is not available right now. Please try again.";
pub const SLOT_A_WAIT: &str = "Game will start soon! Please wait...";
pub const SLOT_B_READY: &str = "Let's start!";
pub const MOVE_MENU: &str = "Choose between\n1)rock\n2)paper\n3)scissors";
pub const END_GAME_BANNER: &str = "The game ended. Here is the list of players and win counts:\n";

/// Which listening endpoint a connection came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Lobby,
    RoomSlot { room: usize },
}

/// Events fed into the main server loop by the spawned I/O tasks.
#[derive(Debug)]
pub enum ServerEvent {
    LobbyAccepted {
        stream: TcpStream,
        addr: SocketAddr,
    },
    RoomAccepted {
        room: usize,
        stream: TcpStream,
        addr: SocketAddr,
    },
    Frame {
        conn: ConnId,
        body: String,
    },
    Closed {
        conn: ConnId,
    },
    Operator {
        line: String,
    },
    Announcement {
        body: String,
    },
}

struct Connection {
    writer: OwnedWriteHalf,
    role: Role,
    addr: SocketAddr,
}

/// Main server coordinating matchmaking, rounds and broadcasts.
pub struct Server {
    registry: RoomRegistry,
    directory: PlayerDirectory,
    announcer: Announcer,
    connections: HashMap<ConnId, Connection>,
    next_conn_id: ConnId,
    events_tx: UnboundedSender<ServerEvent>,
    events_rx: UnboundedReceiver<ServerEvent>,
}

impl Server {
    /// Binds the lobby endpoint, one endpoint per room on `port + number`,
    /// and the shared broadcast socket, then wires up the I/O tasks. Any
    /// bind failure here is fatal and propagates to the caller.
    pub async fn new(
        host: &str,
        port: u16,
        room_count: usize,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let lobby = TcpListener::bind((host, port)).await?;
        info!("lobby listening on {}", lobby.local_addr()?);

        let registry = RoomRegistry::new(port, room_count)?;
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        for (index, room) in registry.rooms().iter().enumerate() {
            let listener = TcpListener::bind((host, room.port())).await?;
            debug!("room {} listening on {}", room.number(), listener.local_addr()?);
            spawn_acceptor(listener, events_tx.clone(), Some(index));
        }
        spawn_acceptor(lobby, events_tx.clone(), None);

        let broadcast = Arc::new(UdpSocket::from_std(shared::broadcast_socket()?)?);
        spawn_broadcast_listener(Arc::clone(&broadcast), events_tx.clone());
        spawn_operator_reader(events_tx.clone());

        let announcer = Announcer::new(broadcast, shared::broadcast_target());

        Ok(Self {
            registry,
            directory: PlayerDirectory::new(),
            announcer,
            connections: HashMap::new(),
            next_conn_id: 1,
            events_tx,
            events_rx,
        })
    }

    /// Runs the event loop until the final standings go out or the process
    /// is interrupted. There is no drain: an interrupt abandons in-flight
    /// rounds.
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        info!("server ready with {} rooms", self.registry.len());

        loop {
            tokio::select! {
                event = self.events_rx.recv() => match event {
                    Some(event) => {
                        if self.handle_event(event).await.is_break() {
                            break;
                        }
                    }
                    None => break,
                },
                _ = tokio::signal::ctrl_c() => {
                    info!("interrupted, shutting down");
                    break;
                }
            }
        }

        Ok(())
    }

    async fn handle_event(&mut self, event: ServerEvent) -> ControlFlow<()> {
        match event {
            ServerEvent::LobbyAccepted { stream, addr } => {
                let conn = self.register(stream, addr, Role::Lobby);
                self.send(conn, &Message::NameRequest(NAME_PROMPT.into()))
                    .await;
            }

            ServerEvent::RoomAccepted { room, stream, addr } => {
                let conn = self.register(stream, addr, Role::RoomSlot { room });
                self.attach_to_room(room, conn).await;
            }

            ServerEvent::Frame { conn, body } => match Message::decode(&body) {
                Ok(message) => return self.handle_message(conn, message).await,
                Err(e) => warn!("ignoring frame from connection {}: {}", conn, e),
            },

            ServerEvent::Closed { conn } => self.handle_closed(conn).await,

            ServerEvent::Operator { line } => {
                if line.trim() == END_GAME_COMMAND {
                    info!("operator requested final standings");
                    let text = format!("{END_GAME_BANNER}{}", self.directory.standings_text());
                    self.announcer.final_standings(text).await;
                } else {
                    debug!("ignoring operator input {:?}", line);
                }
            }

            ServerEvent::Announcement { body } => match Message::decode(&body) {
                Ok(Message::RoundResult(text)) => info!("observed broadcast: {}", text.trim()),
                Ok(Message::FinalStandings(_)) => {
                    info!("final standings broadcast observed, shutting down");
                    return ControlFlow::Break(());
                }
                Ok(other) => debug!("unexpected {} broadcast", other.opcode()),
                Err(e) => debug!("undecodable broadcast datagram: {}", e),
            },
        }

        ControlFlow::Continue(())
    }

    async fn handle_message(&mut self, conn: ConnId, message: Message) -> ControlFlow<()> {
        match message {
            Message::NameSubmit(name) => {
                let name = name.trim().to_string();
                if name.is_empty() {
                    warn!("connection {} submitted an empty name", conn);
                    self.send(conn, &Message::NameRequest(NAME_PROMPT.into()))
                        .await;
                } else {
                    if !self.directory.register(conn, &name) {
                        warn!("connection {} tried to register a second name", conn);
                    }
                    let list = self.room_list_message(ROOM_PROMPT);
                    self.send(conn, &list).await;
                }
            }

            Message::RoomChoice(number) => match self.registry.assign(number, conn) {
                AssignOutcome::Redirect(port) => {
                    self.send(conn, &Message::RoomRedirect(port)).await;
                }
                AssignOutcome::Unavailable => {
                    let list = self.room_list_message(ROOM_UNAVAILABLE);
                    self.send(conn, &list).await;
                }
            },

            Message::MoveSubmit { room, slot, mv } => {
                let Some(index) = room.checked_sub(1).map(|i| i as usize) else {
                    warn!("move for room 0 from connection {}", conn);
                    return ControlFlow::Continue(());
                };
                // The sender must be the room connection occupying the slot
                // it claims.
                let occupant = self.registry.room(index).and_then(|r| r.slot_conn(slot));
                if occupant != Some(conn) {
                    warn!(
                        "connection {} submitted a move for room {} slot {:?} it does not hold",
                        conn, room, slot
                    );
                    return ControlFlow::Continue(());
                }
                let ready = match self.registry.room_mut(index) {
                    Some(room) => room.submit(slot, mv),
                    None => return ControlFlow::Continue(()),
                };
                debug!("room {}: slot {:?} submitted {:?}", room, slot, mv);
                if ready {
                    self.finish_round(index).await;
                }
            }

            other => warn!(
                "unexpected {} from connection {}",
                other.opcode(),
                conn
            ),
        }

        ControlFlow::Continue(())
    }

    /// First room-endpoint connection becomes slot A and waits; the second
    /// becomes slot B, after which both slots are prompted for moves.
    async fn attach_to_room(&mut self, index: usize, conn: ConnId) {
        let slot = self.registry.room_mut(index).and_then(|r| r.attach(conn));
        match slot {
            Some(PlayerSlot::A) => {
                self.send(conn, &Message::SlotAWait(SLOT_A_WAIT.into())).await;
            }
            Some(PlayerSlot::B) => {
                self.send(conn, &Message::SlotBReady(SLOT_B_READY.into()))
                    .await;
                self.start_round(index).await;
            }
            None => {
                warn!("room {} endpoint got a third connection, dropping", index + 1);
                self.connections.remove(&conn);
            }
        }
    }

    async fn start_round(&mut self, index: usize) {
        let (a_conn, b_conn) = {
            let Some(room) = self.registry.room_mut(index) else {
                return;
            };
            // Each slot is prompted at most once per round.
            if room.asked(PlayerSlot::A) && room.asked(PlayerSlot::B) {
                return;
            }
            room.set_asked(PlayerSlot::A);
            room.set_asked(PlayerSlot::B);
            (
                room.slot_conn(PlayerSlot::A),
                room.slot_conn(PlayerSlot::B),
            )
        };

        let prompt = Message::MovePrompt(MOVE_MENU.into());
        if let Some(conn) = a_conn {
            self.send(conn, &prompt).await;
        }
        // Stagger the second prompt so the two frames do not leave in the
        // same multiplexing pass.
        time::sleep(PROMPT_STAGGER).await;
        if let Some(conn) = b_conn {
            self.send(conn, &prompt).await;
        }
    }

    /// Judges a completed round, publishes the result, updates win counts
    /// and recycles the room. `Judged` is never observable from outside:
    /// the reset happens before control returns to the event loop.
    async fn finish_round(&mut self, index: usize) {
        let (number, outcome, assigned) = {
            let Some(room) = self.registry.room(index) else {
                return;
            };
            let Some(outcome) = room.outcome() else {
                return;
            };
            (room.number(), outcome, room.assigned().to_vec())
        };

        let winner_name = match outcome {
            Outcome::Draw => None,
            Outcome::PlayerA => Some(self.player_name(assigned.first().copied())),
            Outcome::PlayerB => Some(self.player_name(assigned.get(1).copied())),
        };
        if let Some(name) = &winner_name {
            self.directory.record_win(name);
        }

        let text = announcer::result_text(number, winner_name.as_deref());
        info!("room {}: {}", number, text);
        self.announcer.round_result(&text).await;

        time::sleep(ROUND_SETTLE).await;

        let cleared = match self.registry.room_mut(index) {
            Some(room) => room.reset(),
            None => return,
        };
        for conn in cleared.slot_conns {
            self.connections.remove(&conn);
        }

        let list = self.room_list_message(ROOM_PROMPT);
        for conn in cleared.assigned {
            self.send(conn, &list).await;
        }
    }

    /// Orderly or errored peer shutdown. The connection is deregistered so
    /// the loop never revisits a dead descriptor; a vanished room slot
    /// aborts the round in progress.
    async fn handle_closed(&mut self, conn: ConnId) {
        let Some(connection) = self.connections.remove(&conn) else {
            // Already dropped during a room reset.
            return;
        };
        info!("connection {} from {} closed", conn, connection.addr);

        match connection.role {
            Role::Lobby => {
                self.directory.forget_connection(conn);
                if let Some(index) = self.registry.find_assigned(conn) {
                    let underway = self
                        .registry
                        .room(index)
                        .map_or(false, Room::round_underway);
                    if underway {
                        // Releasing only this reservation would let a third
                        // player backfill the pairing and take credit for
                        // the departed player's slot.
                        self.abort_round(index).await;
                    } else if let Some(room) = self.registry.room_mut(index) {
                        room.unassign(conn);
                    }
                }
            }
            Role::RoomSlot { room } => {
                let slot = self.registry.room(room).and_then(|r| r.slot_of(conn));
                if let Some(slot) = slot {
                    debug!(
                        "slot {:?} left room {}, releasing slot {:?}",
                        slot,
                        room + 1,
                        slot.other()
                    );
                    self.abort_round(room).await;
                }
            }
        }
    }

    async fn abort_round(&mut self, index: usize) {
        let cleared = match self.registry.room_mut(index) {
            Some(room) => {
                warn!("room {} abandoned mid-round, resetting", room.number());
                room.reset()
            }
            None => return,
        };
        for conn in cleared.slot_conns {
            self.connections.remove(&conn);
        }
        let list = self.room_list_message(ROOM_PROMPT);
        for conn in cleared.assigned {
            self.send(conn, &list).await;
        }
    }

    fn player_name(&self, conn: Option<ConnId>) -> String {
        conn.and_then(|c| self.directory.name_of(c))
            .map(str::to_string)
            .unwrap_or_else(|| "unknown".to_string())
    }

    fn room_list_message(&self, prefix: &str) -> Message {
        Message::RoomList(format!("{prefix}{}", self.registry.open_rooms_text()))
    }

    /// Registers an accepted stream under a fresh connection id and spawns
    /// its frame reader. The reader surfaces EOF as an explicit close event.
    fn register(&mut self, stream: TcpStream, addr: SocketAddr, role: Role) -> ConnId {
        let conn = self.next_conn_id;
        self.next_conn_id += 1;

        let (read_half, writer) = stream.into_split();
        self.connections.insert(conn, Connection { writer, role, addr });
        info!("connection {} accepted from {} ({:?})", conn, addr, role);

        let events = self.events_tx.clone();
        tokio::spawn(async move {
            let mut reader = read_half;
            loop {
                match protocol::read_frame(&mut reader).await {
                    Ok(Some(body)) => {
                        if events.send(ServerEvent::Frame { conn, body }).is_err() {
                            return;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!("read error on connection {}: {}", conn, e);
                        break;
                    }
                }
            }
            let _ = events.send(ServerEvent::Closed { conn });
        });

        conn
    }

    async fn send(&mut self, conn: ConnId, message: &Message) {
        let failed = match self.connections.get_mut(&conn) {
            Some(connection) => protocol::write_frame(&mut connection.writer, message)
                .await
                .err(),
            None => {
                debug!("dropping {} for gone connection {}", message.opcode(), conn);
                None
            }
        };
        if let Some(e) = failed {
            error!("send of {} to connection {} failed: {}", message.opcode(), conn, e);
            self.connections.remove(&conn);
        }
    }
}

fn spawn_acceptor(
    listener: TcpListener,
    events: UnboundedSender<ServerEvent>,
    room: Option<usize>,
) {
    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    let event = match room {
                        Some(room) => ServerEvent::RoomAccepted { room, stream, addr },
                        None => ServerEvent::LobbyAccepted { stream, addr },
                    };
                    if events.send(event).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    error!("accept failed: {}", e);
                    time::sleep(std::time::Duration::from_millis(10)).await;
                }
            }
        }
    });
}

fn spawn_broadcast_listener(socket: Arc<UdpSocket>, events: UnboundedSender<ServerEvent>) {
    tokio::spawn(async move {
        let mut buffer = [0u8; 2048];
        loop {
            match socket.recv_from(&mut buffer).await {
                Ok((len, _)) => {
                    if let Ok(body) = std::str::from_utf8(&buffer[..len]) {
                        let event = ServerEvent::Announcement {
                            body: body.to_string(),
                        };
                        if events.send(event).is_err() {
                            break;
                        }
                    }
                }
                Err(e) => {
                    error!("broadcast receive failed: {}", e);
                    time::sleep(std::time::Duration::from_millis(10)).await;
                }
            }
        }
    });
}

fn spawn_operator_reader(events: UnboundedSender<ServerEvent>) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if events.send(ServerEvent::Operator { line }).is_err() {
                break;
            }
        }
    });
}
