//! Wire protocol shared by server and client.
//!
//! Every message is the text `*opcode*payload`: a leading delimiter, an
//! opcode token from a closed vocabulary, a second delimiter, then the raw
//! payload. Only the first two delimiters are structural; the payload may
//! contain further delimiters (compound payloads such as the move submission
//! use them as field separators, split with [`decode_fields`]).
//!
//! Over TCP each message is carried as a length-prefixed frame (u32 big
//! endian, then the message text) so a payload can never be confused with a
//! frame boundary. Broadcast datagrams carry the bare message text, since
//! UDP already preserves boundaries.

use crate::{Move, PlayerSlot};
use std::fmt;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Structural delimiter of the wire format.
pub const DELIMITER: char = '*';

/// Upper bound on a frame body; anything larger is a protocol violation.
pub const MAX_FRAME_LEN: usize = 16 * 1024;

/// The fixed opcode vocabulary with typed payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// server -> client: prompt for the player's display name.
    NameRequest(String),
    /// client -> server: the display name, registered once per connection.
    NameSubmit(String),
    /// server -> client: prompt text plus newline-separated open rooms.
    RoomList(String),
    /// client -> server: chosen room number (1-based).
    RoomChoice(u32),
    /// server -> client: port of the room endpoint to reconnect to.
    RoomRedirect(u16),
    /// server -> client: first player in the room, please wait.
    SlotAWait(String),
    /// server -> client: second player arrived, game starting.
    SlotBReady(String),
    /// server -> client: move menu, arms the client's move deadline.
    MovePrompt(String),
    /// client -> server: `room*player*move`, `move` code 0 meaning none.
    MoveSubmit {
        room: u32,
        slot: PlayerSlot,
        mv: Option<Move>,
    },
    /// server -> broadcast: human-readable round outcome.
    RoundResult(String),
    /// server -> broadcast: final `name: wins` standings, ends the game.
    FinalStandings(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Fewer than two delimiters; there is no opcode to interpret.
    Malformed,
    /// Syntactically valid frame with an opcode outside the vocabulary.
    UnknownOpcode(String),
    /// Known opcode whose payload does not parse.
    BadPayload { opcode: &'static str, detail: String },
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::Malformed => write!(f, "malformed frame: missing delimiters"),
            ProtocolError::UnknownOpcode(op) => write!(f, "unknown opcode {:?}", op),
            ProtocolError::BadPayload { opcode, detail } => {
                write!(f, "bad {} payload: {}", opcode, detail)
            }
        }
    }
}

impl std::error::Error for ProtocolError {}

impl Message {
    pub fn opcode(&self) -> &'static str {
        match self {
            Message::NameRequest(_) => "name-request",
            Message::NameSubmit(_) => "name-submit",
            Message::RoomList(_) => "room-list",
            Message::RoomChoice(_) => "room-choice",
            Message::RoomRedirect(_) => "room-redirect",
            Message::SlotAWait(_) => "slot-a-wait",
            Message::SlotBReady(_) => "slot-b-ready",
            Message::MovePrompt(_) => "move-prompt",
            Message::MoveSubmit { .. } => "move-submit",
            Message::RoundResult(_) => "round-result",
            Message::FinalStandings(_) => "final-standings",
        }
    }

    fn payload(&self) -> String {
        match self {
            Message::NameRequest(text)
            | Message::NameSubmit(text)
            | Message::RoomList(text)
            | Message::SlotAWait(text)
            | Message::SlotBReady(text)
            | Message::MovePrompt(text)
            | Message::RoundResult(text)
            | Message::FinalStandings(text) => text.clone(),
            Message::RoomChoice(number) => number.to_string(),
            Message::RoomRedirect(port) => port.to_string(),
            Message::MoveSubmit { room, slot, mv } => format!(
                "{room}{DELIMITER}{}{DELIMITER}{}",
                slot.code(),
                mv.map_or(0, Move::code)
            ),
        }
    }

    /// Renders the message as `*opcode*payload`.
    pub fn encode(&self) -> String {
        format!("{DELIMITER}{}{DELIMITER}{}", self.opcode(), self.payload())
    }

    /// Parses `*opcode*payload`. Anything before the first delimiter is
    /// discarded; everything after the second belongs to the payload.
    pub fn decode(input: &str) -> Result<Message, ProtocolError> {
        let first = input.find(DELIMITER).ok_or(ProtocolError::Malformed)?;
        let rest = &input[first + DELIMITER.len_utf8()..];
        let second = rest.find(DELIMITER).ok_or(ProtocolError::Malformed)?;
        let opcode = &rest[..second];
        let payload = &rest[second + DELIMITER.len_utf8()..];

        match opcode {
            "name-request" => Ok(Message::NameRequest(payload.to_string())),
            "name-submit" => Ok(Message::NameSubmit(payload.to_string())),
            "room-list" => Ok(Message::RoomList(payload.to_string())),
            "room-choice" => {
                let number = payload.trim().parse().map_err(|_| bad_payload(
                    "room-choice",
                    format!("{payload:?} is not a room number"),
                ))?;
                Ok(Message::RoomChoice(number))
            }
            "room-redirect" => {
                let port = payload.trim().parse().map_err(|_| bad_payload(
                    "room-redirect",
                    format!("{payload:?} is not a port"),
                ))?;
                Ok(Message::RoomRedirect(port))
            }
            "slot-a-wait" => Ok(Message::SlotAWait(payload.to_string())),
            "slot-b-ready" => Ok(Message::SlotBReady(payload.to_string())),
            "move-prompt" => Ok(Message::MovePrompt(payload.to_string())),
            "move-submit" => decode_move_submit(payload),
            "round-result" => Ok(Message::RoundResult(payload.to_string())),
            "final-standings" => Ok(Message::FinalStandings(payload.to_string())),
            other => Err(ProtocolError::UnknownOpcode(other.to_string())),
        }
    }
}

fn bad_payload(opcode: &'static str, detail: String) -> ProtocolError {
    ProtocolError::BadPayload { opcode, detail }
}

/// Splits a compound payload on the delimiter into its ordered fields.
pub fn decode_fields(payload: &str) -> Vec<&str> {
    payload.split(DELIMITER).collect()
}

fn decode_move_submit(payload: &str) -> Result<Message, ProtocolError> {
    let fields = decode_fields(payload);
    let [room, slot, mv] = fields.as_slice() else {
        return Err(bad_payload(
            "move-submit",
            format!("expected 3 fields, got {}", fields.len()),
        ));
    };

    let room = room
        .parse()
        .map_err(|_| bad_payload("move-submit", format!("bad room field {room:?}")))?;
    let slot = slot
        .parse()
        .ok()
        .and_then(PlayerSlot::from_code)
        .ok_or_else(|| bad_payload("move-submit", format!("bad player field {slot:?}")))?;
    let mv = match mv.parse::<u8>() {
        Ok(0) => None,
        Ok(code) => Some(Move::from_code(code).ok_or_else(|| {
            bad_payload("move-submit", format!("bad move code {code}"))
        })?),
        Err(_) => {
            return Err(bad_payload(
                "move-submit",
                format!("bad move field {mv:?}"),
            ))
        }
    };

    Ok(Message::MoveSubmit { room, slot, mv })
}

/// Writes one length-prefixed frame to a stream.
pub async fn write_frame<W>(writer: &mut W, message: &Message) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let body = message.encode();
    writer.write_all(&(body.len() as u32).to_be_bytes()).await?;
    writer.write_all(body.as_bytes()).await?;
    writer.flush().await
}

/// Reads one length-prefixed frame body from a stream.
///
/// Returns `Ok(None)` on orderly peer shutdown (EOF before a new length
/// prefix), which callers must treat as a disconnect and deregister the
/// connection rather than retrying the read.
pub async fn read_frame<R>(reader: &mut R) -> std::io::Result<Option<String>>
where
    R: AsyncRead + Unpin,
{
    let mut len_bytes = [0u8; 4];
    match reader.read_exact(&mut len_bytes).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }

    let len = u32::from_be_bytes(len_bytes) as usize;
    if len > MAX_FRAME_LEN {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("frame of {len} bytes exceeds limit"),
        ));
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    String::from_utf8(body).map(Some).map_err(|_| {
        std::io::Error::new(std::io::ErrorKind::InvalidData, "frame is not valid utf-8")
    })
}
