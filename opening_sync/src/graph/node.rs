//! Per-position move tables.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::dimension::Dimension;
use crate::decode::Outcome;
use crate::position::PositionKey;

/// Who made a move, relative to the subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    /// Played by the subject.
    By,
    /// Played against the subject.
    Against,
}

impl Side {
    pub fn code(self) -> &'static str {
        match self {
            Side::By => "by",
            Side::Against => "against",
        }
    }

    pub fn from_code(code: &str) -> anyhow::Result<Self> {
        match code {
            "by" => Ok(Side::By),
            "against" => Ok(Side::Against),
            other => anyhow::bail!("unknown side: {other}"),
        }
    }
}

/// Statistics for one move out of one position.
///
/// Outcomes are always from the subject's point of view and every field only
/// grows. [`MoveStats::record`] folds in one game; [`MoveStats::merge`] adds
/// two tables together with the same sums and latest-timestamp rule that the
/// `position_move` upsert applies in SQL.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveStats {
    pub san: String,
    pub play_count: i64,
    pub wins: i64,
    pub losses: i64,
    pub draws: i64,
    pub rating_sum: i64,
    pub rating_count: i64,
    pub last_played_at: Option<DateTime<Utc>>,
}

impl MoveStats {
    pub fn record(
        &mut self,
        outcome: Outcome,
        opponent_rating: Option<u32>,
        played_at: DateTime<Utc>,
    ) {
        self.play_count += 1;
        match outcome {
            Outcome::Win => self.wins += 1,
            Outcome::Loss => self.losses += 1,
            Outcome::Draw => self.draws += 1,
            Outcome::Unknown => {}
        }
        if let Some(r) = opponent_rating {
            self.rating_sum += i64::from(r);
            self.rating_count += 1;
        }
        self.last_played_at = self.last_played_at.max(Some(played_at));
    }

    pub fn merge(&mut self, other: &MoveStats) {
        if self.san.is_empty() {
            self.san.clone_from(&other.san);
        }
        self.play_count += other.play_count;
        self.wins += other.wins;
        self.losses += other.losses;
        self.draws += other.draws;
        self.rating_sum += other.rating_sum;
        self.rating_count += other.rating_count;
        self.last_played_at = self.last_played_at.max(other.last_played_at);
    }

    pub fn avg_opponent_rating(&self) -> Option<f64> {
        (self.rating_count > 0).then(|| self.rating_sum as f64 / self.rating_count as f64)
    }
}

/// Both move tables of one (dimension, position) node, keyed by UCI move.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionNode {
    pub by: IndexMap<String, MoveStats>,
    pub against: IndexMap<String, MoveStats>,
}

impl PositionNode {
    pub fn table(&self, side: Side) -> &IndexMap<String, MoveStats> {
        match side {
            Side::By => &self.by,
            Side::Against => &self.against,
        }
    }

    pub fn table_mut(&mut self, side: Side) -> &mut IndexMap<String, MoveStats> {
        match side {
            Side::By => &mut self.by,
            Side::Against => &mut self.against,
        }
    }

    /// Union with another node for the same key.
    pub fn merge(&mut self, other: &PositionNode) {
        for side in [Side::By, Side::Against] {
            let table = self.table_mut(side);
            for (uci, stats) in other.table(side) {
                table.entry(uci.clone()).or_default().merge(stats);
            }
        }
    }

    /// Number of (side, move) entries.
    pub fn move_count(&self) -> usize {
        self.by.len() + self.against.len()
    }
}

/// Graph coordinate of a node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeKey {
    pub dimension: Dimension,
    pub position: PositionKey,
}

/// A drained node: the additive change since the previous drain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDelta {
    pub key: NodeKey,
    pub node: PositionNode,
}
