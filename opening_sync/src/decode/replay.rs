//! Rules-engine replay of a SAN move list.

use shakmaty::{CastlingMode, Chess, Position, san::San, san::SanPlus};

use super::game::Color;
use crate::position::PositionKey;

/// One verified half-move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ply {
    /// Key of the position the move was played from.
    pub before: PositionKey,
    /// Move in UCI notation, e.g. `e2e4`, `e1g1`.
    pub uci: String,
    /// Normalized SAN, without check suffixes.
    pub san: String,
    pub mover: Color,
}

/// Where and why replay stopped early.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayFailure {
    /// Zero-based index of the offending token.
    pub ply: usize,
    pub token: String,
}

/// The legal prefix of a game.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Replay {
    pub plies: Vec<Ply>,
    pub failure: Option<ReplayFailure>,
}

impl Replay {
    pub fn is_partial(&self) -> bool {
        self.failure.is_some()
    }
}

/// Replays `moves` from the standard start, keeping every ply up to the first
/// token that does not parse or is illegal in the current position.
pub fn replay(moves: &[String]) -> Replay {
    let mut pos = Chess::default();
    let mut plies = Vec::with_capacity(moves.len());

    for (idx, token) in moves.iter().enumerate() {
        let mv = token
            .parse::<SanPlus>()
            .ok()
            .and_then(|san| san.san.to_move(&pos).ok());
        let Some(mv) = mv else {
            return Replay {
                plies,
                failure: Some(ReplayFailure {
                    ply: idx,
                    token: token.clone(),
                }),
            };
        };

        plies.push(Ply {
            before: PositionKey::of(&pos),
            uci: mv.to_uci(CastlingMode::Standard).to_string(),
            san: San::from_move(&pos, &mv).to_string(),
            mover: pos.turn().into(),
        });
        pos.play_unchecked(&mv);
    }

    Replay {
        plies,
        failure: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn moves(s: &str) -> Vec<String> {
        s.split_whitespace().map(str::to_string).collect()
    }

    #[test]
    fn full_game_replays() {
        let r = replay(&moves("e4 e5 Nf3 Nc6 Bc4 Nf6 O-O"));
        assert!(!r.is_partial());
        assert_eq!(r.plies.len(), 7);
        assert_eq!(r.plies[0].uci, "e2e4");
        assert_eq!(r.plies[0].before, PositionKey::initial());
        assert_eq!(r.plies[0].mover, Color::White);
        assert_eq!(r.plies[1].mover, Color::Black);
        assert_eq!(r.plies[6].uci, "e1g1");
        assert_eq!(r.plies[6].san, "O-O");
    }

    #[test]
    fn check_suffix_is_accepted_and_normalized() {
        let r = replay(&moves("e4 f5 Qh5+"));
        assert!(!r.is_partial());
        assert_eq!(r.plies[2].san, "Qh5");
    }

    #[test]
    fn illegal_move_keeps_prefix() {
        let r = replay(&moves("d4 d5 Ke3 Nf6"));
        assert_eq!(r.plies.len(), 2);
        assert_eq!(
            r.failure,
            Some(ReplayFailure {
                ply: 2,
                token: "Ke3".into()
            })
        );
    }

    #[test]
    fn garbage_token_keeps_prefix() {
        let r = replay(&moves("e4 ??? e5"));
        assert_eq!(r.plies.len(), 1);
        assert_eq!(r.failure.map(|f| f.ply), Some(1));
    }

    #[test]
    fn empty_game() {
        let r = replay(&[]);
        assert!(r.plies.is_empty());
        assert!(!r.is_partial());
    }
}
