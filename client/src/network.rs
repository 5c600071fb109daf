//! Client network layer: lobby and room connections, broadcast reception
//! and the prompt-driven input loop.
//!
//! The client is a protocol interpreter. It never acts on its own: every
//! prompt it prints and every frame it sends is a reaction to a server
//! message, a typed line, or the move deadline elapsing.

use log::{debug, info, warn};
use shared::protocol::{self, Message};
use shared::{Move, PlayerSlot, MOVE_DEADLINE, SEND_STAGGER};
use std::ops::ControlFlow;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::{self, Instant};

use crate::input::{self, ReadIntent};

type BoxError = Box<dyn std::error::Error>;

/// Terminal game client.
pub struct Client {
    host: String,
    base_port: u16,
    lobby_reader: OwnedReadHalf,
    lobby_writer: OwnedWriteHalf,
    room_reader: Option<OwnedReadHalf>,
    room_writer: Option<OwnedWriteHalf>,
    room_number: Option<u32>,
    slot: Option<PlayerSlot>,
    staged_move: Option<Move>,
    deadline: Option<Instant>,
    intent: ReadIntent,
    broadcast: UdpSocket,
}

impl Client {
    /// Connects to the lobby and joins the shared broadcast port. The
    /// broadcast socket uses address reuse so every client on the machine
    /// (and the server itself) can listen on the same port.
    pub async fn new(host: &str, port: u16) -> Result<Self, BoxError> {
        let lobby = TcpStream::connect((host, port)).await?;
        info!("connected to lobby at {}", lobby.peer_addr()?);
        let (lobby_reader, lobby_writer) = lobby.into_split();

        let broadcast = UdpSocket::from_std(shared::broadcast_socket()?)?;

        Ok(Self {
            host: host.to_string(),
            base_port: port,
            lobby_reader,
            lobby_writer,
            room_reader: None,
            room_writer: None,
            room_number: None,
            slot: None,
            staged_move: None,
            deadline: None,
            intent: ReadIntent::Idle,
            broadcast,
        })
    }

    /// Runs until the final standings arrive over broadcast or the lobby
    /// connection drops.
    pub async fn run(&mut self) -> Result<(), BoxError> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut datagram = [0u8; 2048];
        let mut stdin_open = true;

        loop {
            let step = tokio::select! {
                frame = protocol::read_frame(&mut self.lobby_reader) => {
                    match frame? {
                        Some(body) => self.handle_frame(&body).await,
                        None => return Err("lobby connection closed by server".into()),
                    }
                }
                frame = read_optional(&mut self.room_reader) => {
                    match frame {
                        Ok(Some(body)) => self.handle_frame(&body).await,
                        Ok(None) => {
                            debug!("room connection closed");
                            self.leave_room();
                            ControlFlow::Continue(())
                        }
                        Err(e) => {
                            warn!("room connection error: {}", e);
                            self.leave_room();
                            ControlFlow::Continue(())
                        }
                    }
                }
                received = self.broadcast.recv_from(&mut datagram) => {
                    let (len, _) = received?;
                    self.handle_broadcast(&datagram[..len])
                }
                line = lines.next_line(), if stdin_open => {
                    match line? {
                        Some(line) => self.handle_line(&line).await?,
                        None => {
                            // Terminal input closed; keep running for results.
                            stdin_open = false;
                            ControlFlow::Continue(())
                        }
                    }
                }
                _ = wait_until(self.deadline) => {
                    self.deadline_elapsed().await?;
                    ControlFlow::Continue(())
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("interrupted, shutting down");
                    ControlFlow::Break(())
                }
            };

            if step.is_break() {
                return Ok(());
            }
        }
    }

    async fn handle_frame(&mut self, body: &str) -> ControlFlow<()> {
        let message = match Message::decode(body) {
            Ok(message) => message,
            Err(e) => {
                warn!("ignoring server frame: {}", e);
                return ControlFlow::Continue(());
            }
        };

        match message {
            Message::NameRequest(text) => {
                println!("{text}");
                self.intent = ReadIntent::Name;
            }
            Message::RoomList(text) => {
                println!("{text}");
                self.intent = ReadIntent::RoomNumber;
            }
            Message::RoomRedirect(port) => {
                self.intent = ReadIntent::Idle;
                self.join_room(port).await;
            }
            Message::SlotAWait(text) => {
                println!("{text}");
                self.slot = Some(PlayerSlot::A);
            }
            Message::SlotBReady(text) => {
                println!("{text}");
                self.slot = Some(PlayerSlot::B);
            }
            Message::MovePrompt(text) => {
                println!("{text}");
                self.intent = ReadIntent::Move;
                self.staged_move = None;
                self.deadline = Some(Instant::now() + MOVE_DEADLINE);
            }
            other => warn!("unexpected {} from server", other.opcode()),
        }

        ControlFlow::Continue(())
    }

    fn handle_broadcast(&mut self, datagram: &[u8]) -> ControlFlow<()> {
        let body = match std::str::from_utf8(datagram) {
            Ok(body) => body,
            Err(_) => {
                debug!("non-utf8 broadcast datagram");
                return ControlFlow::Continue(());
            }
        };
        match Message::decode(body) {
            Ok(Message::RoundResult(text)) => println!("{text}"),
            Ok(Message::FinalStandings(text)) => {
                println!("{text}");
                return ControlFlow::Break(());
            }
            Ok(other) => debug!("unexpected {} broadcast", other.opcode()),
            Err(e) => debug!("undecodable broadcast datagram: {}", e),
        }
        ControlFlow::Continue(())
    }

    async fn handle_line(&mut self, line: &str) -> Result<ControlFlow<()>, BoxError> {
        match self.intent {
            ReadIntent::Name => {
                let name = line.trim();
                if name.is_empty() {
                    println!("Please enter a non-empty name.");
                } else {
                    protocol::write_frame(
                        &mut self.lobby_writer,
                        &Message::NameSubmit(name.to_string()),
                    )
                    .await?;
                    self.intent = ReadIntent::Idle;
                }
            }
            ReadIntent::RoomNumber => match input::parse_room_number(line) {
                Some(number) => {
                    protocol::write_frame(&mut self.lobby_writer, &Message::RoomChoice(number))
                        .await?;
                    self.intent = ReadIntent::Idle;
                }
                None => println!("Please enter a room number."),
            },
            ReadIntent::Move => match input::parse_move(line) {
                Some(mv) => {
                    self.staged_move = Some(mv);
                    println!("Waiting for the result...");
                    self.intent = ReadIntent::Idle;
                }
                None => println!("Please enter 1, 2 or 3."),
            },
            ReadIntent::Idle => debug!("ignoring input {:?}", line),
        }
        Ok(ControlFlow::Continue(()))
    }

    /// Fires once per round, whether or not a move was typed. Slot B defers
    /// briefly so the two submissions do not race into the same
    /// multiplexing pass on the server.
    async fn deadline_elapsed(&mut self) -> Result<(), BoxError> {
        self.deadline = None;
        self.intent = ReadIntent::Idle;
        let mv = self.staged_move.take();

        let (Some(room), Some(slot)) = (self.room_number, self.slot) else {
            warn!("move deadline elapsed outside a room");
            return Ok(());
        };

        if slot == PlayerSlot::B {
            time::sleep(SEND_STAGGER).await;
        }

        if let Some(writer) = self.room_writer.as_mut() {
            protocol::write_frame(writer, &Message::MoveSubmit { room, slot, mv }).await?;
            debug!("submitted {:?} for room {} as slot {:?}", mv, room, slot);
        }
        Ok(())
    }

    /// Opens the second TCP connection to the room endpoint we were
    /// redirected to. Room numbering mirrors the server's port layout.
    async fn join_room(&mut self, port: u16) {
        let number = match port.checked_sub(self.base_port) {
            Some(offset) if offset > 0 => u32::from(offset),
            _ => {
                warn!("redirect to implausible port {}", port);
                return;
            }
        };

        match TcpStream::connect((self.host.as_str(), port)).await {
            Ok(stream) => {
                info!("joined room {} on port {}", number, port);
                let (reader, writer) = stream.into_split();
                self.room_reader = Some(reader);
                self.room_writer = Some(writer);
                self.room_number = Some(number);
            }
            Err(e) => {
                warn!("could not join room on port {}: {}", port, e);
                self.leave_room();
            }
        }
    }

    fn leave_room(&mut self) {
        self.room_reader = None;
        self.room_writer = None;
        self.room_number = None;
        self.slot = None;
        self.staged_move = None;
        self.deadline = None;
    }
}

async fn read_optional(reader: &mut Option<OwnedReadHalf>) -> std::io::Result<Option<String>> {
    match reader {
        Some(reader) => protocol::read_frame(reader).await,
        None => std::future::pending().await,
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
