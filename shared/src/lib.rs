//! Types and constants shared between the game server and the client:
//! the move/slot vocabulary, protocol-wide timing constants, and the
//! construction of the UDP socket both sides use for result broadcasts.

pub mod protocol;

use socket2::{Domain, Protocol, Socket, Type};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::time::Duration;

/// Local-segment broadcast address used for round results and standings.
pub const BROADCAST_IP: Ipv4Addr = Ipv4Addr::new(127, 255, 255, 255);
/// Well-known port of the broadcast channel, independent of the server port.
pub const BROADCAST_PORT: u16 = 9090;

/// A room holds at most two players.
pub const ROOM_CAPACITY: usize = 2;

/// How long a player has to enter a move after the prompt.
pub const MOVE_DEADLINE: Duration = Duration::from_secs(10);
/// Delay between the two move prompts so they do not collide on the wire.
pub const PROMPT_STAGGER: Duration = Duration::from_millis(10);
/// Extra delay slot B waits after its deadline so slot A's frame goes first.
pub const SEND_STAGGER: Duration = Duration::from_millis(10);
/// Pause between broadcasting a result and tearing the room down.
pub const ROUND_SETTLE: Duration = Duration::from_millis(10);

/// Operator stdin line that triggers the final standings broadcast.
pub const END_GAME_COMMAND: &str = "end_game";

pub fn broadcast_target() -> SocketAddr {
    SocketAddr::V4(SocketAddrV4::new(BROADCAST_IP, BROADCAST_PORT))
}

/// Builds the shared broadcast socket: SO_BROADCAST plus address/port reuse
/// so several processes on one host can all bind the well-known port. The
/// socket is returned non-blocking, ready for `tokio::net::UdpSocket::from_std`.
pub fn broadcast_socket() -> std::io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    #[cfg(unix)]
    socket.set_reuse_port(true)?;
    socket.set_broadcast(true)?;
    socket.set_nonblocking(true)?;
    let bind_addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, BROADCAST_PORT));
    socket.bind(&bind_addr.into())?;
    Ok(socket.into())
}

/// A player's move. The "no move" timeout default is `Option::<Move>::None`,
/// not a variant, so the unsubmitted case cannot be confused with a real move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Move {
    Rock,
    Paper,
    Scissors,
}

impl Move {
    /// Wire code, matching the move menu numbering. Code 0 is "no move".
    pub fn code(self) -> u8 {
        match self {
            Move::Rock => 1,
            Move::Paper => 2,
            Move::Scissors => 3,
        }
    }

    pub fn from_code(code: u8) -> Option<Move> {
        match code {
            1 => Some(Move::Rock),
            2 => Some(Move::Paper),
            3 => Some(Move::Scissors),
            _ => None,
        }
    }

    pub fn beats(self, other: Move) -> bool {
        matches!(
            (self, other),
            (Move::Rock, Move::Scissors)
                | (Move::Paper, Move::Rock)
                | (Move::Scissors, Move::Paper)
        )
    }
}

/// One of the two player positions within a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerSlot {
    A,
    B,
}

impl PlayerSlot {
    pub fn code(self) -> u8 {
        match self {
            PlayerSlot::A => 1,
            PlayerSlot::B => 2,
        }
    }

    pub fn from_code(code: u8) -> Option<PlayerSlot> {
        match code {
            1 => Some(PlayerSlot::A),
            2 => Some(PlayerSlot::B),
            _ => None,
        }
    }

    pub fn other(self) -> PlayerSlot {
        match self {
            PlayerSlot::A => PlayerSlot::B,
            PlayerSlot::B => PlayerSlot::A,
        }
    }
}
