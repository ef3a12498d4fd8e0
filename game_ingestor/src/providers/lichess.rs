//! Lichess game-export provider (`GET /api/games/user/{username}`, NDJSON).

pub mod params;
pub mod provider;
pub mod response;

pub use provider::{LichessConfig, LichessProvider};
