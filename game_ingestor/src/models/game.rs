//! Canonical in-memory representation of one game record as delivered by a source.
//!
//! This struct is the standard output of every [`GameSource`](crate::providers::GameSource)
//! implementation. Fields are optional wherever a source may omit them; the
//! decoder in `opening_sync` falls back to PGN header tags when structured
//! fields are absent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One player slot (White or Black) of a raw game record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawPlayer {
    /// Account name as displayed by the source (case preserved).
    pub name: Option<String>,
    /// Rating at game start, when the source reports one.
    pub rating: Option<u32>,
}

/// A single game record, not yet attributed to any subject.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawGame {
    /// Source-assigned game id, unique per platform.
    pub id: String,
    /// When the game was created. Pagination cursors are expressed on this axis.
    pub created_at: Option<DateTime<Utc>>,
    /// When the last move was played.
    pub last_move_at: Option<DateTime<Utc>>,
    /// Rated/casual flag.
    pub rated: Option<bool>,
    /// Variant key (e.g. "standard", "chess960").
    pub variant: Option<String>,
    /// Speed class key (e.g. "blitz", "rapid").
    pub speed: Option<String>,
    /// White player.
    pub white: RawPlayer,
    /// Black player.
    pub black: RawPlayer,
    /// "white" or "black"; absent for draws and unfinished games.
    pub winner: Option<String>,
    /// Termination status key (e.g. "mate", "resign", "draw", "stalemate").
    pub status: Option<String>,
    /// Space-separated SAN movetext without move numbers.
    pub moves: Option<String>,
    /// Full PGN text (tags + movetext), when requested from the source.
    pub pgn: Option<String>,
}

impl RawGame {
    /// The timestamp used for ordering and cursors: creation time, else last-move time.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.created_at.or(self.last_move_at)
    }
}
