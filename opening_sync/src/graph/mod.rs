//! Opening graph aggregation.
//!
//! [`OpeningGraph`] replays decoded games and folds every verified ply into
//! the move tables of each [`Dimension`] the game matches. The graph only
//! holds what has not been written yet: [`OpeningGraph::take_dirty`] moves
//! the touched nodes out as additive [`NodeDelta`]s, and storage keeps the
//! cumulative state.
//!
//! Aggregation is commutative per game, so the same set of games folded in
//! any order yields the same node contents.

pub mod dimension;
pub mod node;

use indexmap::IndexMap;

pub use dimension::Dimension;
pub use node::{MoveStats, NodeDelta, NodeKey, PositionNode, Side};

use crate::decode::{DecodedGame, Replay, replay};
use crate::position::PositionKey;

/// In-memory buffer of un-drained graph changes.
#[derive(Debug, Default)]
pub struct OpeningGraph {
    nodes: IndexMap<NodeKey, PositionNode>,
}

impl OpeningGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replays `game` and records each legal ply in every matching dimension.
    ///
    /// Returns the replay so callers can report partial games.
    pub fn apply(&mut self, game: &DecodedGame) -> Replay {
        let replayed = replay(&game.moves);
        let dims = Dimension::for_game(game);
        let outcome = game.outcome();

        for ply in &replayed.plies {
            let side = if ply.mover == game.subject_color {
                Side::By
            } else {
                Side::Against
            };
            for dim in &dims {
                let key = NodeKey {
                    dimension: *dim,
                    position: ply.before.clone(),
                };
                let stats = self
                    .nodes
                    .entry(key)
                    .or_default()
                    .table_mut(side)
                    .entry(ply.uci.clone())
                    .or_insert_with(|| MoveStats {
                        san: ply.san.clone(),
                        ..MoveStats::default()
                    });
                stats.record(outcome, game.opponent_rating, game.played_at);
            }
        }
        replayed
    }

    /// Node for `(dimension, position)`, if touched since the last drain.
    pub fn node(&self, dimension: Dimension, position: &PositionKey) -> Option<&PositionNode> {
        self.nodes.get(&NodeKey {
            dimension,
            position: position.clone(),
        })
    }

    /// Number of dirty nodes.
    pub fn dirty_len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Drains every dirty node.
    pub fn take_dirty(&mut self) -> Vec<NodeDelta> {
        self.nodes
            .drain(..)
            .map(|(key, node)| NodeDelta { key, node })
            .collect()
    }
}
