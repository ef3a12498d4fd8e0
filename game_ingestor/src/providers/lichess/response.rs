use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::models::game::{RawGame, RawPlayer};

#[derive(Deserialize, Debug, Default)]
pub struct LichessUser {
    pub name: String,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct LichessPlayer {
    pub user: Option<LichessUser>,
    pub rating: Option<u32>,
    pub ai_level: Option<u8>,
}

#[derive(Deserialize, Debug, Default)]
pub struct LichessPlayers {
    #[serde(default)]
    pub white: LichessPlayer,
    #[serde(default)]
    pub black: LichessPlayer,
}

/// One line of the NDJSON game export.
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct LichessGame {
    pub id: String,
    pub rated: Option<bool>,
    pub variant: Option<String>,
    pub speed: Option<String>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub last_move_at: Option<DateTime<Utc>>,
    pub status: Option<String>,
    #[serde(default)]
    pub players: LichessPlayers,
    pub winner: Option<String>,
    pub moves: Option<String>,
    pub pgn: Option<String>,
}

impl From<LichessPlayer> for RawPlayer {
    fn from(p: LichessPlayer) -> Self {
        let name = match (p.user, p.ai_level) {
            (Some(user), _) => Some(user.name),
            (None, Some(level)) => Some(format!("Stockfish level {level}")),
            (None, None) => None,
        };
        RawPlayer {
            name,
            rating: p.rating,
        }
    }
}

impl From<LichessGame> for RawGame {
    fn from(g: LichessGame) -> Self {
        RawGame {
            id: g.id,
            created_at: g.created_at,
            last_move_at: g.last_move_at,
            rated: g.rated,
            variant: g.variant,
            speed: g.speed,
            white: g.players.white.into(),
            black: g.players.black.into(),
            winner: g.winner,
            status: g.status,
            moves: g.moves,
            pgn: g.pgn,
        }
    }
}
