//! Interpretation of operator keyboard input.
//!
//! What a typed line means depends entirely on the last prompt the server
//! sent, so the client tracks a [`ReadIntent`] and parses accordingly.

use shared::Move;

/// What the next line of terminal input will be interpreted as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadIntent {
    /// No prompt outstanding; input is ignored.
    #[default]
    Idle,
    Name,
    RoomNumber,
    Move,
}

/// Parses a menu selection ("1", "2" or "3") into a move.
pub fn parse_move(line: &str) -> Option<Move> {
    line.trim().parse::<u8>().ok().and_then(Move::from_code)
}

pub fn parse_room_number(line: &str) -> Option<u32> {
    line.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_move_menu_codes() {
        assert_eq!(parse_move("1"), Some(Move::Rock));
        assert_eq!(parse_move(" 2 "), Some(Move::Paper));
        assert_eq!(parse_move("3\n"), Some(Move::Scissors));
    }

    #[test]
    fn test_parse_move_rejects_garbage() {
        assert_eq!(parse_move(""), None);
        assert_eq!(parse_move("rock"), None);
        assert_eq!(parse_move("0"), None);
        assert_eq!(parse_move("4"), None);
        assert_eq!(parse_move("-1"), None);
    }

    #[test]
    fn test_parse_room_number() {
        assert_eq!(parse_room_number(" 2\n"), Some(2));
        assert_eq!(parse_room_number("two"), None);
        assert_eq!(parse_room_number(""), None);
    }

    #[test]
    fn test_default_intent_is_idle() {
        assert_eq!(ReadIntent::default(), ReadIntent::Idle);
    }
}
