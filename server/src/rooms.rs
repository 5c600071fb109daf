//! Room registry, matchmaking and the per-room session state machine.
//!
//! Rooms are allocated once at startup and live for the process lifetime,
//! cycling open -> filling -> playing -> judged -> open. Each room owns a
//! dedicated listening port derived from the lobby port plus the 1-based room
//! number, so a client can be redirected without a rendezvous service.
//!
//! A room tracks two kinds of connections: the lobby connections of the
//! players assigned to it (capacity is reserved at choice time) and the room
//! connections that arrive on its dedicated endpoint, which become slot A and
//! slot B in accept order.

use log::info;
use shared::{Move, PlayerSlot, ROOM_CAPACITY};
use std::fmt;

use crate::judge::{judge, Outcome};
use crate::network::ConnId;

/// Submission state of one slot. `Submitted(None)` is the timeout default
/// and is distinct from "nothing submitted yet".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SlotMove {
    #[default]
    Pending,
    Submitted(Option<Move>),
}

#[derive(Debug)]
pub struct Room {
    number: u32,
    port: u16,
    assigned: Vec<ConnId>,
    slot_a: Option<ConnId>,
    slot_b: Option<ConnId>,
    asked_a: bool,
    asked_b: bool,
    move_a: SlotMove,
    move_b: SlotMove,
}

/// Connections released by a room reset: the room-endpoint connections to
/// drop and the lobby connections to return to matchmaking.
#[derive(Debug)]
pub struct ClearedRoom {
    pub slot_conns: Vec<ConnId>,
    pub assigned: Vec<ConnId>,
}

impl Room {
    fn new(number: u32, port: u16) -> Self {
        Self {
            number,
            port,
            assigned: Vec::new(),
            slot_a: None,
            slot_b: None,
            asked_a: false,
            asked_b: false,
            move_a: SlotMove::Pending,
            move_b: SlotMove::Pending,
        }
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn is_full(&self) -> bool {
        self.assigned.len() >= ROOM_CAPACITY
    }

    /// Lobby connections of the assigned players, in assignment order.
    /// Index 0 corresponds to slot A, index 1 to slot B.
    pub fn assigned(&self) -> &[ConnId] {
        &self.assigned
    }

    pub fn unassign(&mut self, conn: ConnId) -> bool {
        let before = self.assigned.len();
        self.assigned.retain(|c| *c != conn);
        self.assigned.len() != before
    }

    /// Attaches a room-endpoint connection to the next free slot.
    pub fn attach(&mut self, conn: ConnId) -> Option<PlayerSlot> {
        if self.slot_a.is_none() {
            self.slot_a = Some(conn);
            Some(PlayerSlot::A)
        } else if self.slot_b.is_none() {
            self.slot_b = Some(conn);
            Some(PlayerSlot::B)
        } else {
            None
        }
    }

    /// Whether a round is forming or in play: at least one room-endpoint
    /// connection has attached since the last reset.
    pub fn round_underway(&self) -> bool {
        self.slot_a.is_some() || self.slot_b.is_some()
    }

    pub fn slot_conn(&self, slot: PlayerSlot) -> Option<ConnId> {
        match slot {
            PlayerSlot::A => self.slot_a,
            PlayerSlot::B => self.slot_b,
        }
    }

    pub fn slot_of(&self, conn: ConnId) -> Option<PlayerSlot> {
        if self.slot_a == Some(conn) {
            Some(PlayerSlot::A)
        } else if self.slot_b == Some(conn) {
            Some(PlayerSlot::B)
        } else {
            None
        }
    }

    pub fn set_asked(&mut self, slot: PlayerSlot) {
        match slot {
            PlayerSlot::A => self.asked_a = true,
            PlayerSlot::B => self.asked_b = true,
        }
    }

    pub fn asked(&self, slot: PlayerSlot) -> bool {
        match slot {
            PlayerSlot::A => self.asked_a,
            PlayerSlot::B => self.asked_b,
        }
    }

    /// Records one slot's move and reports whether the round is ready to be
    /// judged, i.e. whether the other slot has already submitted too.
    pub fn submit(&mut self, slot: PlayerSlot, mv: Option<Move>) -> bool {
        match slot {
            PlayerSlot::A => self.move_a = SlotMove::Submitted(mv),
            PlayerSlot::B => self.move_b = SlotMove::Submitted(mv),
        }
        matches!(
            (self.move_a, self.move_b),
            (SlotMove::Submitted(_), SlotMove::Submitted(_))
        )
    }

    /// Judges the round once both submissions are present.
    pub fn outcome(&self) -> Option<Outcome> {
        match (self.move_a, self.move_b) {
            (SlotMove::Submitted(a), SlotMove::Submitted(b)) => Some(judge(a, b)),
            _ => None,
        }
    }

    /// Returns the room to its initial open state, releasing all connections.
    /// Must run before any new player may occupy the room.
    pub fn reset(&mut self) -> ClearedRoom {
        let cleared = ClearedRoom {
            slot_conns: self.slot_a.into_iter().chain(self.slot_b).collect(),
            assigned: std::mem::take(&mut self.assigned),
        };
        self.slot_a = None;
        self.slot_b = None;
        self.asked_a = false;
        self.asked_b = false;
        self.move_a = SlotMove::Pending;
        self.move_b = SlotMove::Pending;
        cleared
    }
}

/// Reply to a matchmaking request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOutcome {
    /// Assigned; the client should reconnect to this room port.
    Redirect(u16),
    /// Room full or unknown; the client gets a fresh room list instead.
    Unavailable,
}

/// The requested room count does not fit above the base port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortRangeExceeded {
    pub base_port: u16,
    pub rooms: usize,
}

impl fmt::Display for PortRangeExceeded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} rooms above base port {} would need a port beyond {}",
            self.rooms,
            self.base_port,
            u16::MAX
        )
    }
}

impl std::error::Error for PortRangeExceeded {}

#[derive(Debug)]
pub struct RoomRegistry {
    rooms: Vec<Room>,
}

impl RoomRegistry {
    /// Allocates `count` rooms; room i (1-based) listens on `base_port + i`.
    /// Fails when the highest room port would not fit in a u16.
    pub fn new(base_port: u16, count: usize) -> Result<Self, PortRangeExceeded> {
        let rooms = (1..=count as u32)
            .map(|number| {
                u16::try_from(number)
                    .ok()
                    .and_then(|offset| base_port.checked_add(offset))
                    .map(|port| Room::new(number, port))
                    .ok_or(PortRangeExceeded {
                        base_port,
                        rooms: count,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rooms })
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    pub fn rooms(&self) -> &[Room] {
        &self.rooms
    }

    pub fn room(&self, index: usize) -> Option<&Room> {
        self.rooms.get(index)
    }

    pub fn room_mut(&mut self, index: usize) -> Option<&mut Room> {
        self.rooms.get_mut(index)
    }

    /// Renders every open room as a line of the matchmaking list.
    pub fn open_rooms_text(&self) -> String {
        let mut text = String::new();
        for room in &self.rooms {
            if !room.is_full() {
                text.push_str(&format!("\nRoom {}", room.number()));
            }
        }
        text.push('\n');
        text
    }

    /// Assigns a lobby connection to a room chosen by 1-based number.
    pub fn assign(&mut self, number: u32, conn: ConnId) -> AssignOutcome {
        let Some(room) = number
            .checked_sub(1)
            .and_then(|index| self.rooms.get_mut(index as usize))
        else {
            return AssignOutcome::Unavailable;
        };
        if room.is_full() {
            return AssignOutcome::Unavailable;
        }
        room.assigned.push(conn);
        info!("connection {} assigned to room {}", conn, room.number);
        AssignOutcome::Redirect(room.port)
    }

    /// Locates the room and slot a room-endpoint connection occupies.
    pub fn find_slot_conn(&self, conn: ConnId) -> Option<(usize, PlayerSlot)> {
        self.rooms
            .iter()
            .enumerate()
            .find_map(|(index, room)| room.slot_of(conn).map(|slot| (index, slot)))
    }

    /// Locates the room a lobby connection is assigned to, if any.
    pub fn find_assigned(&self, conn: ConnId) -> Option<usize> {
        self.rooms
            .iter()
            .position(|room| room.assigned.contains(&conn))
    }
}
