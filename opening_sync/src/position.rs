//! Position key normalization.
//!
//! Two games that reach the same position at different move numbers must land
//! on the same graph node, so the key keeps piece placement, side to move,
//! castling rights and the en-passant square (only when a legal en-passant
//! capture exists) and drops the halfmove clock and fullmove number.

use std::fmt;

use serde::{Deserialize, Serialize};
use shakmaty::{CastlingMode, Chess, EnPassantMode, fen::Fen};

/// Canonical, counter-free FEN prefix identifying a position.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PositionKey(String);

impl PositionKey {
    /// Normalizes any FEN (full or already shortened) into a key.
    ///
    /// Parseable FENs go through the rules engine, so an en-passant square
    /// without a legal capture is dropped. Anything else is truncated
    /// textually, with missing trailing fields defaulting to `w - -`.
    pub fn from_fen(fen: &str) -> Self {
        let parsed = fen
            .parse::<Fen>()
            .ok()
            .and_then(|f| f.into_position::<Chess>(CastlingMode::Standard).ok());
        match parsed {
            Some(pos) => Self::of(&pos),
            None => Self::truncate(fen),
        }
    }

    /// Key of a live position.
    pub fn of(pos: &Chess) -> Self {
        let fen = Fen::from_position(pos.clone(), EnPassantMode::Legal);
        Self::truncate(&fen.to_string())
    }

    fn truncate(fen: &str) -> Self {
        let mut fields = fen.split_whitespace();
        let board = fields.next().unwrap_or_default();
        let turn = fields.next().unwrap_or("w");
        let castling = fields.next().unwrap_or("-");
        let ep = fields.next().unwrap_or("-");
        Self(format!("{board} {turn} {castling} {ep}"))
    }

    /// Key of the standard starting position.
    pub fn initial() -> Self {
        Self::of(&Chess::default())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PositionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
