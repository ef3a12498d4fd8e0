//! Bounded buffering between aggregation and storage.
//!
//! [`FlushQueue`] owns an [`OpeningGraph`] plus the decoded games that fed
//! it. Thresholds are checked on game boundaries only, so a [`FlushBatch`]
//! always carries complete games together with exactly the deltas they
//! produced.

use std::time::{Duration, Instant};

use tracing::debug;

use crate::decode::DecodedGame;
use crate::graph::{NodeDelta, OpeningGraph};

/// When a queue must emit a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushLimits {
    pub max_games: usize,
    pub max_dirty_nodes: usize,
    pub max_age: Duration,
}

impl Default for FlushLimits {
    fn default() -> Self {
        Self {
            max_games: 50,
            max_dirty_nodes: 2000,
            max_age: Duration::from_millis(2000),
        }
    }
}

/// Games and the node deltas they produced, consumed once by the writer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushBatch {
    pub games: Vec<DecodedGame>,
    pub nodes: Vec<NodeDelta>,
    /// Verified plies across `games`.
    pub plies: usize,
    /// Games whose replay stopped before the end of the movetext.
    pub partial_games: usize,
}

impl FlushBatch {
    pub fn is_empty(&self) -> bool {
        self.games.is_empty() && self.nodes.is_empty()
    }
}

#[derive(Debug)]
pub struct FlushQueue {
    limits: FlushLimits,
    graph: OpeningGraph,
    games: Vec<DecodedGame>,
    plies: usize,
    partial_games: usize,
    oldest_pending: Option<Instant>,
}

impl FlushQueue {
    pub fn new(limits: FlushLimits) -> Self {
        Self {
            limits,
            graph: OpeningGraph::new(),
            games: Vec::new(),
            plies: 0,
            partial_games: 0,
            oldest_pending: None,
        }
    }

    /// Aggregates `game` and returns a batch if any threshold is now reached.
    pub fn push(&mut self, game: DecodedGame) -> Option<FlushBatch> {
        let replayed = self.graph.apply(&game);
        if let Some(failure) = &replayed.failure {
            debug!(
                game = %game.external_id,
                ply = failure.ply,
                token = %failure.token,
                "replay stopped early; keeping prefix"
            );
            self.partial_games += 1;
        }
        self.plies += replayed.plies.len();
        self.games.push(game);
        self.oldest_pending.get_or_insert_with(Instant::now);

        self.is_due().then(|| self.take())
    }

    /// True once a size or age threshold is reached.
    pub fn is_due(&self) -> bool {
        if self.is_empty() {
            return false;
        }
        self.games.len() >= self.limits.max_games
            || self.graph.dirty_len() >= self.limits.max_dirty_nodes
            || self
                .oldest_pending
                .is_some_and(|t| t.elapsed() >= self.limits.max_age)
    }

    /// Emits a batch only if the age threshold expired; for idle ticks.
    pub fn poll_age(&mut self) -> Option<FlushBatch> {
        self.is_due().then(|| self.take())
    }

    /// Final drain: whatever is buffered, regardless of thresholds.
    pub fn drain(&mut self) -> Option<FlushBatch> {
        (!self.is_empty()).then(|| self.take())
    }

    pub fn is_empty(&self) -> bool {
        self.games.is_empty() && self.graph.is_empty()
    }

    pub fn pending_games(&self) -> usize {
        self.games.len()
    }

    fn take(&mut self) -> FlushBatch {
        self.oldest_pending = None;
        FlushBatch {
            games: std::mem::take(&mut self.games),
            nodes: self.graph.take_dirty(),
            plies: std::mem::take(&mut self.plies),
            partial_games: std::mem::take(&mut self.partial_games),
        }
    }
}
