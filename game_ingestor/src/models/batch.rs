//! A bounded, newest-first batch of raw records.

use chrono::{DateTime, Utc};

use crate::models::game::RawGame;

/// Result of one bounded fetch.
///
/// An empty batch is a legitimate "no more games in this window" signal and is
/// reported distinctly from errors.
#[derive(Debug, Clone, Default)]
pub struct GameBatch {
    /// Records in the order the source delivered them (newest first).
    pub games: Vec<RawGame>,
    /// Oldest record timestamp observed in this batch.
    pub oldest: Option<DateTime<Utc>>,
    /// Newest record timestamp observed in this batch.
    pub newest: Option<DateTime<Utc>>,
}

impl GameBatch {
    /// Appends a record and widens the observed window.
    pub fn push(&mut self, game: RawGame) {
        if let Some(ts) = game.timestamp() {
            self.oldest = Some(self.oldest.map_or(ts, |o| o.min(ts)));
            self.newest = Some(self.newest.map_or(ts, |n| n.max(ts)));
        }
        self.games.push(game);
    }

    pub fn len(&self) -> usize {
        self.games.len()
    }

    pub fn is_empty(&self) -> bool {
        self.games.is_empty()
    }
}
