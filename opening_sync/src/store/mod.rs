//! Durable storage for jobs, games and the opening graph (SQLite).
//!
//! Two idempotent write paths back the pipeline:
//! - games are inserted with duplicate-ignore semantics, keyed by
//!   `(job, platform, external id)`, and the job's `imported_count` grows by
//!   exactly the number of rows that were new, in the same transaction;
//! - graph deltas are merged into `position_move` (counts added, last-seen
//!   maxed) only for games this call *claims*, i.e. flips from un-indexed to
//!   indexed. A replayed batch claims nothing and therefore adds nothing.
//!
//! Every public write runs in one `BEGIN IMMEDIATE` transaction.

pub mod rows;
pub mod sqlite;

use chrono::{DateTime, Utc};

pub use sqlite::SqliteRepo;

use crate::decode::DecodedGame;
use crate::flush::FlushBatch;
use crate::graph::{Dimension, MoveStats, Side};
use crate::job::{ImportJob, JobPatch};
use crate::position::PositionKey;
use crate::target::SyncTarget;

#[derive(thiserror::Error, Debug)]
/// Errors callers may want to match on.
pub enum RepoError {
    #[error("import job {id} not found")]
    /// No job row with this id.
    UnknownJob {
        /// Job id that was looked up.
        id: i32,
    },
}

/// Result type used throughout the repository.
pub type RepoResult<T> = anyhow::Result<T>;

/// Timestamp range observed in one fetched batch, including records the
/// decoder later discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchWindow {
    pub oldest: DateTime<Utc>,
    pub newest: DateTime<Utc>,
}

/// Outcome of a duplicate-ignoring game insert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertSummary {
    pub inserted: usize,
    pub ignored: usize,
}

/// Outcome of committing one flush batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitSummary {
    /// Games newly stored by this call (streaming path only).
    pub inserted: usize,
    /// Games flipped to indexed by this call.
    pub indexed: usize,
    /// `position_move` rows upserted.
    pub moves_merged: usize,
}

/// One stored move out of a position.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct StoredMove {
    pub uci: String,
    pub stats: MoveStats,
}

/// Portable surface, SQLite implementation lives in `sqlite.rs`.
pub trait GraphRepo {
    /// Loads the job for `target`, if one exists.
    fn find_job(
        &self,
        conn: &mut diesel::SqliteConnection,
        target: &SyncTarget,
    ) -> RepoResult<Option<ImportJob>>;

    /// Loads the job for `target`, creating it in `indexing`/`running` on first use.
    fn get_or_create_job(
        &self,
        conn: &mut diesel::SqliteConnection,
        target: &SyncTarget,
    ) -> RepoResult<ImportJob>;

    fn load_job(&self, conn: &mut diesel::SqliteConnection, job_id: i32) -> RepoResult<ImportJob>;

    /// Inserts games (duplicates ignored), bumps `imported_count` by the
    /// number inserted, and moves the cursor and watermarks to cover `window`.
    fn insert_games(
        &self,
        conn: &mut diesel::SqliteConnection,
        job_id: i32,
        games: &[DecodedGame],
        window: Option<FetchWindow>,
    ) -> RepoResult<InsertSummary>;

    /// Up to `limit` stored but un-indexed games, newest first.
    fn load_unindexed(
        &self,
        conn: &mut diesel::SqliteConnection,
        job_id: i32,
        limit: usize,
    ) -> RepoResult<Vec<DecodedGame>>;

    /// Claims the batch's games and merges the graph deltas they produced.
    ///
    /// Games that are already indexed (or not stored) are left out; when
    /// that happens the deltas are recomputed from the claimed games only.
    fn commit_batch(
        &self,
        conn: &mut diesel::SqliteConnection,
        job_id: i32,
        batch: &FlushBatch,
    ) -> RepoResult<CommitSummary>;

    /// [`GraphRepo::insert_games`] followed by [`GraphRepo::commit_batch`]
    /// in a single transaction; the streaming consumer's write.
    fn store_and_commit(
        &self,
        conn: &mut diesel::SqliteConnection,
        job_id: i32,
        batch: &FlushBatch,
        window: Option<FetchWindow>,
    ) -> RepoResult<CommitSummary>;

    /// Applies a partial update and returns the fresh snapshot.
    fn patch_job(
        &self,
        conn: &mut diesel::SqliteConnection,
        job_id: i32,
        patch: &JobPatch,
    ) -> RepoResult<ImportJob>;

    /// Stored move table of one node, most played first.
    fn moves_at(
        &self,
        conn: &mut diesel::SqliteConnection,
        job_id: i32,
        dimension: Dimension,
        position: &PositionKey,
        side: Side,
    ) -> RepoResult<Vec<StoredMove>>;

    /// The `n` most recently played stored games.
    fn recent_games(
        &self,
        conn: &mut diesel::SqliteConnection,
        job_id: i32,
        n: usize,
    ) -> RepoResult<Vec<DecodedGame>>;
}
