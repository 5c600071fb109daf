//! Pure rock-paper-scissors outcome evaluation.

use shared::Move;

/// Result of a judged round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Draw,
    PlayerA,
    PlayerB,
}

/// Judges one round. `None` is the timeout default: a submitted move beats a
/// missing one from either side, and two missing moves draw. The default-win
/// rule is deliberately symmetric; under simultaneous timeout neither player
/// is favored.
pub fn judge(a: Option<Move>, b: Option<Move>) -> Outcome {
    match (a, b) {
        (None, None) => Outcome::Draw,
        (Some(_), None) => Outcome::PlayerA,
        (None, Some(_)) => Outcome::PlayerB,
        (Some(a), Some(b)) if a == b => Outcome::Draw,
        (Some(a), Some(b)) => {
            if a.beats(b) {
                Outcome::PlayerA
            } else {
                Outcome::PlayerB
            }
        }
    }
}
