use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use diesel::SqliteConnection;
use game_ingestor::models::batch::GameBatch;
use game_ingestor::models::request_params::GamesRequestParams;
use game_ingestor::providers::GameSource;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::model::{CANCELLED, ImportJob, JobPatch, JobStatus, Stage};
use crate::config::{AppConfig, FlushCfg, PolicyCfg};
use crate::db::{connection, migrate};
use crate::decode::{DecodedGame, decode_game};
use crate::error::SyncError;
use crate::flush::{FlushBatch, FlushQueue};
use crate::graph::{Dimension, Side};
use crate::lock::{InvocationLocks, LockLease};
use crate::position::PositionKey;
use crate::store::{FetchWindow, GraphRepo, SqliteRepo, StoredMove};
use crate::target::{SubjectKind, SyncTarget};

/// Result of one invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SyncOutcome {
    /// Another invocation holds the lock; nothing was done.
    Busy,
    Progress(SyncReport),
}

impl SyncOutcome {
    pub fn report(&self) -> Option<&SyncReport> {
        match self {
            SyncOutcome::Busy => None,
            SyncOutcome::Progress(r) => Some(r),
        }
    }
}

/// What one invocation did, plus the job snapshot it left behind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub job: ImportJob,
    /// Raw records received from the source.
    pub fetched: usize,
    /// Records that were new to storage.
    pub inserted: usize,
    /// Records skipped by the decoder.
    pub discarded: usize,
    /// Games folded into the graph by this invocation.
    pub processed: usize,
    /// Games whose replay stopped early; their prefix still counts.
    pub partial_games: usize,
    /// The source returned nothing for the current window.
    pub exhausted: bool,
}

impl SyncReport {
    pub(crate) fn idle(job: ImportJob) -> Self {
        Self {
            job,
            fetched: 0,
            inserted: 0,
            discarded: 0,
            processed: 0,
            partial_games: 0,
            exhausted: false,
        }
    }
}

/// Drives imports for any number of targets against one database.
///
/// Clones share the lock table and the cancellation registry.
#[derive(Clone)]
pub struct SyncService {
    pub(crate) source: Arc<dyn GameSource>,
    pub(crate) repo: SqliteRepo,
    pub(crate) database_url: String,
    pub(crate) policy: PolicyCfg,
    pub(crate) flush: FlushCfg,
    pub(crate) locks: InvocationLocks,
    pub(crate) running: Arc<DashMap<SyncTarget, Running>>,
}

/// Cancellation token of a live invocation, tagged with its lock generation.
#[derive(Debug, Clone)]
pub(crate) struct Running {
    generation: u64,
    token: CancellationToken,
}

/// Removes the invocation's cancellation token when it ends, unless a later
/// invocation already replaced it.
pub(crate) struct RunningGuard {
    running: Arc<DashMap<SyncTarget, Running>>,
    target: SyncTarget,
    generation: u64,
    token: CancellationToken,
}

impl RunningGuard {
    pub(crate) fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        let generation = self.generation;
        self.running
            .remove_if(&self.target, |_, r| r.generation == generation);
    }
}

impl SyncService {
    pub fn new(
        source: Arc<dyn GameSource>,
        config: &AppConfig,
        database_url: impl Into<String>,
    ) -> Self {
        Self {
            source,
            repo: SqliteRepo::new(),
            database_url: database_url.into(),
            policy: config.policy.clone(),
            flush: config.flush.clone(),
            locks: InvocationLocks::new(config.policy.lock_ttl()),
            running: Arc::new(DashMap::new()),
        }
    }

    /// Opens a connection and refuses to work on an outdated schema.
    pub(crate) fn open(&self) -> Result<SqliteConnection, SyncError> {
        let mut conn = connection::connect_sqlite(&self.database_url)?;
        let pending = migrate::pending_migrations(&mut conn)?;
        if !pending.is_empty() {
            return Err(SyncError::NeedsMigration { pending });
        }
        Ok(conn)
    }

    /// Registers a cancellation token for the invocation holding `lease`.
    pub(crate) fn register_running(
        &self,
        target: &SyncTarget,
        lease: &LockLease,
        parent: Option<&CancellationToken>,
    ) -> RunningGuard {
        let token = parent.map_or_else(CancellationToken::new, CancellationToken::child_token);
        let generation = lease.generation();
        self.running.insert(
            target.clone(),
            Running {
                generation,
                token: token.clone(),
            },
        );
        RunningGuard {
            running: Arc::clone(&self.running),
            target: target.clone(),
            generation,
            token,
        }
    }

    /// How often a live invocation refreshes its lock.
    pub(crate) fn keepalive_every(&self) -> Duration {
        (self.policy.lock_ttl() / 4).max(Duration::from_millis(10))
    }

    /// One resumable step of the import for `target`.
    pub async fn continue_sync(&self, target: &SyncTarget) -> Result<SyncOutcome, SyncError> {
        let Some(lock) = self.locks.try_acquire(target) else {
            debug!(%target, "sync already in progress");
            return Ok(SyncOutcome::Busy);
        };
        let mut conn = self.open()?;
        let job = self.repo.get_or_create_job(&mut conn, target)?;

        if job.cancel_requested && job.status == JobStatus::Running {
            let job = self.mark_cancelled(&mut conn, job.id)?;
            info!(%target, "sync cancelled");
            return Ok(SyncOutcome::Progress(SyncReport::idle(job)));
        }
        let catch_up = job.status == JobStatus::Complete && job.backlog() > 0;
        if job.is_terminal() && !catch_up {
            return Ok(SyncOutcome::Progress(SyncReport::idle(job)));
        }

        let running = self.register_running(target, lock.lease(), None);
        let result = if catch_up {
            self.catch_up(&mut conn, job.clone())
        } else {
            self.step(&mut conn, job.clone(), running.token(), lock.lease()).await
        };

        match result {
            Ok(report) => {
                info!(
                    %target,
                    stage = report.job.stage.code(),
                    imported = report.job.imported_count,
                    indexed = report.job.indexed_count,
                    fetched = report.fetched,
                    inserted = report.inserted,
                    processed = report.processed,
                    "sync step finished"
                );
                Ok(SyncOutcome::Progress(report))
            }
            Err(e) => {
                warn!(%target, error = %e, "sync step failed; job stays resumable");
                self.record_error(&mut conn, job.id, &e);
                Err(e)
            }
        }
    }

    async fn step(
        &self,
        conn: &mut SqliteConnection,
        job: ImportJob,
        cancel: &CancellationToken,
        lease: &LockLease,
    ) -> Result<SyncReport, SyncError> {
        let ready = job.ready || job.stage >= Stage::Archiving;
        let (batch_size, slice) = if ready {
            (self.policy.archiving_batch, self.policy.archiving_slice)
        } else {
            (self.policy.indexing_batch, self.policy.indexing_slice)
        };

        let mut report = SyncReport::idle(job.clone());
        let mut fallback_used = job.fallback_used;

        let fetched = match self.plan_request(&job, batch_size, fallback_used) {
            Some(params) => self.fetch(&params, cancel, lease).await?,
            None => Some(GameBatch::default()),
        };
        let Some(mut batch) = fetched else {
            // stopped while the request was in flight; nothing new to flush
            let job = self.mark_cancelled(conn, job.id)?;
            return Ok(SyncReport::idle(job));
        };

        if batch.is_empty() && self.should_fall_back(&job) {
            info!(target = %job.target, "no games in lookback window; taking the newest games instead");
            self.repo.patch_job(
                conn,
                job.id,
                &JobPatch {
                    fallback_used: Some(true),
                    ..JobPatch::default()
                },
            )?;
            fallback_used = true;
            if let Some(params) = self.plan_request(&job, batch_size, true) {
                match self.fetch(&params, cancel, lease).await? {
                    Some(b) => batch = b,
                    None => {
                        let job = self.mark_cancelled(conn, job.id)?;
                        return Ok(SyncReport::idle(job));
                    }
                }
            }
        }
        debug!(target = %job.target, fetched = batch.len(), fallback_used, "batch fetched");

        report.fetched = batch.len();
        report.exhausted = batch.is_empty();

        if !batch.is_empty() {
            let (games, discarded) = self.decode_batch(&job.target, &batch);
            report.discarded = discarded;
            let window = match (batch.oldest, batch.newest) {
                (Some(oldest), Some(newest)) => Some(FetchWindow { oldest, newest }),
                _ => None,
            };
            if window.is_none() {
                warn!(target = %job.target, "batch carried no timestamps; treating source as exhausted");
                report.exhausted = true;
            }
            let inserted = self.repo.insert_games(conn, job.id, &games, window)?;
            report.inserted = inserted.inserted;
        }

        let (processed, partial) = self.index_slice(conn, job.id, slice)?;
        report.processed = processed;
        report.partial_games = partial;

        report.job = self.finish(conn, job.id, report.exhausted)?;
        Ok(report)
    }

    /// Folds leftover stored games into the graph of a finished job.
    fn catch_up(&self, conn: &mut SqliteConnection, job: ImportJob) -> Result<SyncReport, SyncError> {
        let mut report = SyncReport::idle(job.clone());
        let (processed, partial) = self.index_slice(conn, job.id, self.policy.archiving_slice)?;
        report.processed = processed;
        report.partial_games = partial;
        report.job = self.repo.load_job(conn, job.id)?;
        Ok(report)
    }

    /// Request for the next batch, or `None` when the window is already empty.
    fn plan_request(
        &self,
        job: &ImportJob,
        batch_size: u32,
        fallback: bool,
    ) -> Option<GamesRequestParams> {
        let mut max = batch_size;
        let since = match job.target.kind {
            SubjectKind::Own => None,
            SubjectKind::Opponent if fallback => {
                let cap = i64::from(self.policy.opponent_fallback_games);
                let remaining = cap - job.imported_count;
                if remaining <= 0 {
                    return None;
                }
                max = max.min(u32::try_from(remaining).unwrap_or(u32::MAX));
                None
            }
            SubjectKind::Opponent => {
                Some(Utc::now() - ChronoDuration::days(i64::from(self.policy.opponent_lookback_days)))
            }
        };
        let params = GamesRequestParams {
            username: job.target.subject.clone(),
            until: job.cursor,
            since,
            max: Some(max),
        };
        (!params.is_empty_window()).then_some(params)
    }

    pub(crate) fn should_fall_back(&self, job: &ImportJob) -> bool {
        job.target.kind == SubjectKind::Opponent && !job.fallback_used && job.imported_count == 0
    }

    /// `Ok(None)` means the fetch was abandoned on cancellation.
    ///
    /// The lock is refreshed while the request is in flight.
    async fn fetch(
        &self,
        params: &GamesRequestParams,
        cancel: &CancellationToken,
        lease: &LockLease,
    ) -> Result<Option<GameBatch>, SyncError> {
        let fetch = self.source.fetch_games(params);
        tokio::pin!(fetch);
        let mut keepalive = tokio::time::interval(self.keepalive_every());
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(None),
                batch = &mut fetch => return Ok(Some(batch?)),
                _ = keepalive.tick() => {
                    lease.refresh();
                }
            }
        }
    }

    pub(crate) fn decode_batch(
        &self,
        target: &SyncTarget,
        batch: &GameBatch,
    ) -> (Vec<DecodedGame>, usize) {
        let mut games = Vec::with_capacity(batch.len());
        let mut discarded = 0;
        for raw in &batch.games {
            match decode_game(raw, target.platform, &target.subject) {
                Ok(g) => games.push(g),
                Err(reason) => {
                    debug!(game = %raw.id, %reason, "record discarded");
                    discarded += 1;
                }
            }
        }
        if discarded > 0 {
            warn!(%target, discarded, "records skipped by decoder");
        }
        (games, discarded)
    }

    /// Aggregates up to `slice` un-indexed games; returns (indexed, partial).
    fn index_slice(
        &self,
        conn: &mut SqliteConnection,
        job_id: i32,
        slice: usize,
    ) -> Result<(usize, usize), SyncError> {
        let games = self.repo.load_unindexed(conn, job_id, slice)?;
        let mut queue = FlushQueue::new(self.flush.limits());
        let mut indexed = 0;
        let mut partial = 0;
        let mut commit = |conn: &mut SqliteConnection, batch: FlushBatch| -> Result<(), SyncError> {
            partial += batch.partial_games;
            let summary = self.repo.commit_batch(conn, job_id, &batch)?;
            debug!(
                job_id,
                games = batch.games.len(),
                indexed = summary.indexed,
                moves = summary.moves_merged,
                "flush committed"
            );
            indexed += summary.indexed;
            Ok(())
        };
        for game in games {
            if let Some(batch) = queue.push(game) {
                commit(conn, batch)?;
            }
        }
        if let Some(batch) = queue.drain() {
            commit(conn, batch)?;
        }
        Ok((indexed, partial))
    }

    /// Writes readiness, stage and success markers from the fresh counters.
    pub(crate) fn finish(
        &self,
        conn: &mut SqliteConnection,
        job_id: i32,
        exhausted: bool,
    ) -> Result<ImportJob, SyncError> {
        let job = self.repo.load_job(conn, job_id)?;
        let crossed = u64::try_from(job.indexed_count).unwrap_or(0) >= self.policy.ready_threshold;
        let done = exhausted && job.backlog() == 0;

        let mut patch = JobPatch {
            last_error: Some(None),
            last_success_at: Some(Utc::now()),
            ..JobPatch::default()
        };
        if crossed || done {
            patch.ready = Some(true);
        }
        if done {
            patch.stage = Some(Stage::Complete);
            patch.status = Some(JobStatus::Complete);
        } else if crossed && job.stage == Stage::Indexing {
            patch.stage = Some(Stage::Archiving);
        }
        Ok(self.repo.patch_job(conn, job_id, &patch)?)
    }

    pub(crate) fn mark_cancelled(
        &self,
        conn: &mut SqliteConnection,
        job_id: i32,
    ) -> Result<ImportJob, SyncError> {
        Ok(self.repo.patch_job(
            conn,
            job_id,
            &JobPatch {
                status: Some(JobStatus::Error),
                last_error: Some(Some(CANCELLED.to_string())),
                ..JobPatch::default()
            },
        )?)
    }

    /// Best effort: the job stays `running` with the message in `last_error`.
    pub(crate) fn record_error(&self, conn: &mut SqliteConnection, job_id: i32, err: &SyncError) {
        if let Err(e) = self.repo.patch_job(conn, job_id, &JobPatch::error(err.to_string())) {
            warn!(job_id, error = %e, "could not record job error");
        }
    }

    /// Requests cancellation: flags the job and trips any live invocation.
    pub fn stop_sync(&self, target: &SyncTarget) -> Result<ImportJob, SyncError> {
        let mut conn = self.open()?;
        let job = self.require_job(&mut conn, target)?;
        let job = self.repo.patch_job(
            &mut conn,
            job.id,
            &JobPatch {
                cancel_requested: Some(true),
                ..JobPatch::default()
            },
        )?;
        if let Some(live) = self.running.get(target) {
            live.token.cancel();
        }
        info!(%target, "stop requested");
        Ok(job)
    }

    /// Clears a cancellation and lets the job resume from its cursor.
    pub fn restart_sync(&self, target: &SyncTarget) -> Result<ImportJob, SyncError> {
        let mut conn = self.open()?;
        let job = self.require_job(&mut conn, target)?;
        let status = if job.stage == Stage::Complete && job.backlog() == 0 {
            JobStatus::Complete
        } else {
            JobStatus::Running
        };
        let job = self.repo.patch_job(
            &mut conn,
            job.id,
            &JobPatch {
                status: Some(status),
                cancel_requested: Some(false),
                last_error: Some(None),
                ..JobPatch::default()
            },
        )?;
        info!(%target, status = job.status.code(), "job restarted");
        Ok(job)
    }

    /// Current snapshot, if the target was ever synced.
    pub fn status(&self, target: &SyncTarget) -> Result<Option<ImportJob>, SyncError> {
        let mut conn = self.open()?;
        Ok(self.repo.find_job(&mut conn, target)?)
    }

    /// Whether an invocation in this process currently holds `target`.
    pub fn is_syncing(&self, target: &SyncTarget) -> bool {
        self.locks.is_held(target)
    }

    /// Stored move table for a position given as FEN.
    pub fn moves_at(
        &self,
        target: &SyncTarget,
        dimension: Dimension,
        fen: &str,
        side: Side,
    ) -> Result<Vec<StoredMove>, SyncError> {
        let mut conn = self.open()?;
        let job = self.require_job(&mut conn, target)?;
        let key = PositionKey::from_fen(fen);
        Ok(self.repo.moves_at(&mut conn, job.id, dimension, &key, side)?)
    }

    /// Most recently played stored games.
    pub fn recent_games(
        &self,
        target: &SyncTarget,
        n: usize,
    ) -> Result<Vec<DecodedGame>, SyncError> {
        let mut conn = self.open()?;
        let job = self.require_job(&mut conn, target)?;
        Ok(self.repo.recent_games(&mut conn, job.id, n)?)
    }

    fn require_job(
        &self,
        conn: &mut SqliteConnection,
        target: &SyncTarget,
    ) -> Result<ImportJob, SyncError> {
        self.repo
            .find_job(conn, target)?
            .ok_or_else(|| SyncError::UnknownJob {
                target: target.to_string(),
            })
    }
}
