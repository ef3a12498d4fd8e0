use std::collections::HashSet;

use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use diesel::prelude::*;
use diesel::sql_types::Text;
use diesel::upsert::excluded;

use super::rows::{GameRow, JobPatchRow, JobRow, MoveRow, NewGameRow, NewJobRow, NewMoveRow};
use super::{
    CommitSummary, FetchWindow, GraphRepo, InsertSummary, RepoError, RepoResult, StoredMove,
};
use crate::decode::DecodedGame;
use crate::flush::FlushBatch;
use crate::graph::{Dimension, MoveStats, NodeDelta, OpeningGraph, Side};
use crate::job::{ImportJob, JobPatch};
use crate::position::PositionKey;
use crate::schema::{game, import_job, position_move};
use crate::target::SyncTarget;
use crate::tz;

use crate::schema::game::dsl as g;
use crate::schema::import_job::dsl as ij;
use crate::schema::position_move::dsl as pm;

// Two-argument max() is SQLite's scalar max; RFC-3339 millis sort lexically.
diesel::define_sql_function! {
    #[sql_name = "max"]
    fn later_of(a: Text, b: Text) -> Text;
}

/// Repository for jobs, games and the opening graph in a SQLite database.
#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteRepo;

impl SqliteRepo {
    pub fn new() -> Self {
        Self
    }
}

fn now_str() -> String {
    tz::to_rfc3339_millis(Utc::now())
}

fn load_job_in(conn: &mut SqliteConnection, job_id: i32) -> RepoResult<ImportJob> {
    let row = ij::import_job
        .find(job_id)
        .select(JobRow::as_select())
        .first(conn)
        .optional()?
        .ok_or(RepoError::UnknownJob { id: job_id })?;
    ImportJob::try_from(row)
}

fn insert_games_in(
    conn: &mut SqliteConnection,
    job_id: i32,
    games: &[DecodedGame],
    window: Option<FetchWindow>,
) -> RepoResult<InsertSummary> {
    let mut summary = InsertSummary::default();
    for decoded in games {
        let row = NewGameRow::new(job_id, decoded);
        let n = diesel::insert_into(game::table)
            .values(&row)
            .on_conflict((g::job_id, g::platform, g::external_id))
            .do_nothing()
            .execute(conn)
            .with_context(|| format!("insert game {}", decoded.external_id))?;
        if n == 1 {
            summary.inserted += 1;
        } else {
            summary.ignored += 1;
        }
    }

    if summary.inserted > 0 {
        diesel::update(ij::import_job.find(job_id))
            .set(ij::imported_count.eq(ij::imported_count + summary.inserted as i64))
            .execute(conn)?;
    }

    if let Some(window) = window {
        advance_window(conn, job_id, window)?;
    }
    Ok(summary)
}

/// Cursor moves to just before `window.oldest`, never forward; watermarks widen.
fn advance_window(conn: &mut SqliteConnection, job_id: i32, window: FetchWindow) -> RepoResult<()> {
    let job = load_job_in(conn, job_id)?;
    let next_cursor = window.oldest - Duration::milliseconds(1);
    let cursor = job.cursor.map_or(next_cursor, |c| c.min(next_cursor));
    let newest = job.newest_seen_at.map_or(window.newest, |n| n.max(window.newest));
    let oldest = job.oldest_seen_at.map_or(window.oldest, |o| o.min(window.oldest));

    diesel::update(ij::import_job.find(job_id))
        .set((
            ij::cursor.eq(tz::to_rfc3339_millis(cursor)),
            ij::newest_seen_at.eq(tz::to_rfc3339_millis(newest)),
            ij::oldest_seen_at.eq(tz::to_rfc3339_millis(oldest)),
        ))
        .execute(conn)?;
    Ok(())
}

fn commit_batch_in(
    conn: &mut SqliteConnection,
    job_id: i32,
    batch: &FlushBatch,
) -> RepoResult<CommitSummary> {
    if batch.games.is_empty() {
        return Ok(CommitSummary::default());
    }
    let ids: Vec<&str> = batch.games.iter().map(|d| d.external_id.as_str()).collect();
    let claimable: HashSet<String> = g::game
        .filter(g::job_id.eq(job_id))
        .filter(g::external_id.eq_any(ids.iter().copied()))
        .filter(g::indexed_at.is_null())
        .select(g::external_id)
        .load::<String>(conn)?
        .into_iter()
        .collect();

    let recomputed;
    let nodes: &[NodeDelta] = if claimable.len() == batch.games.len() {
        &batch.nodes
    } else {
        let mut graph = OpeningGraph::new();
        let mut seen = HashSet::new();
        for decoded in &batch.games {
            let id = decoded.external_id.as_str();
            if claimable.contains(id) && seen.insert(id) {
                graph.apply(decoded);
            }
        }
        recomputed = graph.take_dirty();
        &recomputed
    };

    if claimable.is_empty() {
        return Ok(CommitSummary::default());
    }

    let claimed: Vec<&str> = claimable.iter().map(String::as_str).collect();
    let indexed = diesel::update(
        g::game
            .filter(g::job_id.eq(job_id))
            .filter(g::external_id.eq_any(claimed.iter().copied()))
            .filter(g::indexed_at.is_null()),
    )
    .set(g::indexed_at.eq(now_str()))
    .execute(conn)?;

    let moves_merged = merge_nodes(conn, job_id, nodes)?;

    diesel::update(ij::import_job.find(job_id))
        .set(ij::indexed_count.eq(ij::indexed_count + indexed as i64))
        .execute(conn)?;

    Ok(CommitSummary {
        inserted: 0,
        indexed,
        moves_merged,
    })
}

fn merge_nodes(conn: &mut SqliteConnection, job_id: i32, nodes: &[NodeDelta]) -> RepoResult<usize> {
    let mut merged = 0;
    for delta in nodes {
        let dimension = delta.key.dimension.code();
        for side in [Side::By, Side::Against] {
            for (uci, stats) in delta.node.table(side) {
                let row = NewMoveRow {
                    job_id,
                    dimension: &dimension,
                    position_key: delta.key.position.as_str(),
                    side: side.code(),
                    move_uci: uci,
                    san: &stats.san,
                    play_count: stats.play_count,
                    wins: stats.wins,
                    losses: stats.losses,
                    draws: stats.draws,
                    rating_sum: stats.rating_sum,
                    rating_count: stats.rating_count,
                    last_played_at: tz::to_rfc3339_millis(
                        stats.last_played_at.unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
                    ),
                };
                diesel::insert_into(position_move::table)
                    .values(&row)
                    .on_conflict((pm::job_id, pm::dimension, pm::position_key, pm::side, pm::move_uci))
                    .do_update()
                    .set((
                        pm::play_count.eq(pm::play_count + excluded(pm::play_count)),
                        pm::wins.eq(pm::wins + excluded(pm::wins)),
                        pm::losses.eq(pm::losses + excluded(pm::losses)),
                        pm::draws.eq(pm::draws + excluded(pm::draws)),
                        pm::rating_sum.eq(pm::rating_sum + excluded(pm::rating_sum)),
                        pm::rating_count.eq(pm::rating_count + excluded(pm::rating_count)),
                        pm::last_played_at
                            .eq(later_of(pm::last_played_at, excluded(pm::last_played_at))),
                    ))
                    .execute(conn)
                    .with_context(|| format!("merge {dimension} {} {uci}", delta.key.position))?;
                merged += 1;
            }
        }
    }
    Ok(merged)
}

impl GraphRepo for SqliteRepo {
    fn find_job(
        &self,
        conn: &mut SqliteConnection,
        target: &SyncTarget,
    ) -> RepoResult<Option<ImportJob>> {
        ij::import_job
            .filter(ij::platform.eq(target.platform.code()))
            .filter(ij::account.eq(&target.account))
            .filter(ij::subject.eq(&target.subject))
            .select(JobRow::as_select())
            .first(conn)
            .optional()?
            .map(ImportJob::try_from)
            .transpose()
    }

    fn get_or_create_job(
        &self,
        conn: &mut SqliteConnection,
        target: &SyncTarget,
    ) -> RepoResult<ImportJob> {
        conn.immediate_transaction(|conn| {
            let row = NewJobRow {
                platform: target.platform.code(),
                account: &target.account,
                subject: &target.subject,
                kind: target.kind.code(),
            };
            diesel::insert_into(import_job::table)
                .values(&row)
                .on_conflict((ij::platform, ij::account, ij::subject))
                .do_nothing()
                .execute(conn)?;

            self.find_job(conn, target)?
                .with_context(|| format!("job for {target} vanished after insert"))
        })
    }

    fn load_job(&self, conn: &mut SqliteConnection, job_id: i32) -> RepoResult<ImportJob> {
        load_job_in(conn, job_id)
    }

    fn insert_games(
        &self,
        conn: &mut SqliteConnection,
        job_id: i32,
        games: &[DecodedGame],
        window: Option<FetchWindow>,
    ) -> RepoResult<InsertSummary> {
        conn.immediate_transaction(|conn| insert_games_in(conn, job_id, games, window))
    }

    fn load_unindexed(
        &self,
        conn: &mut SqliteConnection,
        job_id: i32,
        limit: usize,
    ) -> RepoResult<Vec<DecodedGame>> {
        g::game
            .filter(g::job_id.eq(job_id))
            .filter(g::indexed_at.is_null())
            .order((g::played_at.desc(), g::id.desc()))
            .limit(limit as i64)
            .select(GameRow::as_select())
            .load(conn)?
            .into_iter()
            .map(DecodedGame::try_from)
            .collect()
    }

    fn commit_batch(
        &self,
        conn: &mut SqliteConnection,
        job_id: i32,
        batch: &FlushBatch,
    ) -> RepoResult<CommitSummary> {
        conn.immediate_transaction(|conn| commit_batch_in(conn, job_id, batch))
    }

    fn store_and_commit(
        &self,
        conn: &mut SqliteConnection,
        job_id: i32,
        batch: &FlushBatch,
        window: Option<FetchWindow>,
    ) -> RepoResult<CommitSummary> {
        conn.immediate_transaction(|conn| {
            let inserted = insert_games_in(conn, job_id, &batch.games, window)?;
            let committed = commit_batch_in(conn, job_id, batch)?;
            Ok(CommitSummary {
                inserted: inserted.inserted,
                ..committed
            })
        })
    }

    fn patch_job(
        &self,
        conn: &mut SqliteConnection,
        job_id: i32,
        patch: &JobPatch,
    ) -> RepoResult<ImportJob> {
        conn.immediate_transaction(|conn| {
            let row = JobPatchRow {
                stage: patch.stage.map(|s| s.code()),
                status: patch.status.map(|s| s.code()),
                ready: patch.ready.filter(|r| *r),
                last_error: patch.last_error.as_ref().map(|e| e.as_deref()),
                last_success_at: patch.last_success_at.map(tz::to_rfc3339_millis),
                cancel_requested: patch.cancel_requested,
                fallback_used: patch.fallback_used,
                updated_at: now_str(),
            };
            let n = diesel::update(ij::import_job.find(job_id)).set(&row).execute(conn)?;
            if n == 0 {
                return Err(RepoError::UnknownJob { id: job_id }.into());
            }
            load_job_in(conn, job_id)
        })
    }

    fn moves_at(
        &self,
        conn: &mut SqliteConnection,
        job_id: i32,
        dimension: Dimension,
        position: &PositionKey,
        side: Side,
    ) -> RepoResult<Vec<StoredMove>> {
        let rows = pm::position_move
            .filter(pm::job_id.eq(job_id))
            .filter(pm::dimension.eq(dimension.code()))
            .filter(pm::position_key.eq(position.as_str()))
            .filter(pm::side.eq(side.code()))
            .order((pm::play_count.desc(), pm::move_uci.asc()))
            .select(MoveRow::as_select())
            .load(conn)?;

        rows.into_iter()
            .map(|r| {
                Ok(StoredMove {
                    uci: r.move_uci,
                    stats: MoveStats {
                        san: r.san,
                        play_count: r.play_count,
                        wins: r.wins,
                        losses: r.losses,
                        draws: r.draws,
                        rating_sum: r.rating_sum,
                        rating_count: r.rating_count,
                        last_played_at: Some(tz::parse_ts_to_utc(&r.last_played_at)?),
                    },
                })
            })
            .collect()
    }

    fn recent_games(
        &self,
        conn: &mut SqliteConnection,
        job_id: i32,
        n: usize,
    ) -> RepoResult<Vec<DecodedGame>> {
        g::game
            .filter(g::job_id.eq(job_id))
            .order((g::played_at.desc(), g::id.desc()))
            .limit(n as i64)
            .select(GameRow::as_select())
            .load(conn)?
            .into_iter()
            .map(DecodedGame::try_from)
            .collect()
    }
}
