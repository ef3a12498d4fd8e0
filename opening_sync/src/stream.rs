//! Streaming import: network on one side, storage on the other.
//!
//! A producer reads the provider's line-delimited stream, decodes and
//! aggregates each record into a [`FlushQueue`], and hands finished
//! [`FlushBatch`]es to a consumer over a bounded channel. The consumer runs
//! on the blocking pool, owns the SQLite connection, and commits each batch
//! in one transaction (insert games, claim them, merge deltas, move the
//! cursor). The producer awaits the consumer before returning so the last
//! batch is never lost. Both sides refresh the invocation lock: the producer
//! on every tick, the consumer after every commit.

use std::time::Duration;

use diesel::SqliteConnection;
use futures::StreamExt;
use game_ingestor::models::request_params::GamesRequestParams;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::decode::decode_game;
use crate::error::SyncError;
use crate::flush::{FlushBatch, FlushQueue};
use crate::job::{ImportJob, JobPatch, JobStatus, SyncOutcome, SyncReport, SyncService};
use crate::lock::LockLease;
use crate::store::{FetchWindow, GraphRepo, SqliteRepo};
use crate::target::{SubjectKind, SyncTarget};

/// One unit handed from producer to consumer.
#[derive(Debug)]
pub struct FlushMessage {
    pub batch: FlushBatch,
    /// Timestamps of every raw record read since the previous message,
    /// discarded ones included.
    pub window: Option<FetchWindow>,
}

#[derive(Debug, Default)]
struct ConsumerTotals {
    inserted: usize,
    indexed: usize,
    partial_games: usize,
    batches: usize,
}

fn consume(
    repo: SqliteRepo,
    mut conn: SqliteConnection,
    job_id: i32,
    lease: LockLease,
    mut rx: mpsc::Receiver<FlushMessage>,
) -> (SqliteConnection, anyhow::Result<ConsumerTotals>) {
    let mut totals = ConsumerTotals::default();
    while let Some(msg) = rx.blocking_recv() {
        match repo.store_and_commit(&mut conn, job_id, &msg.batch, msg.window) {
            Ok(summary) => {
                totals.inserted += summary.inserted;
                totals.indexed += summary.indexed;
                totals.partial_games += msg.batch.partial_games;
                totals.batches += 1;
                lease.refresh();
                debug!(
                    job_id,
                    games = msg.batch.games.len(),
                    inserted = summary.inserted,
                    indexed = summary.indexed,
                    "streamed batch committed"
                );
            }
            Err(e) => return (conn, Err(e)),
        }
    }
    (conn, Ok(totals))
}

fn widen(window: &mut Option<FetchWindow>, ts: chrono::DateTime<chrono::Utc>) {
    *window = Some(match *window {
        Some(w) => FetchWindow {
            oldest: w.oldest.min(ts),
            newest: w.newest.max(ts),
        },
        None => FetchWindow {
            oldest: ts,
            newest: ts,
        },
    });
}

enum ProducerEnd {
    Exhausted,
    Cancelled,
    ConsumerGone,
    Failed(SyncError),
}

impl SyncService {
    /// Imports everything older than the cursor in one long-lived run.
    ///
    /// Tripping `cancel` (or calling [`SyncService::stop_sync`]) abandons the
    /// in-flight read, flushes what is buffered once, and leaves the job
    /// resumable from the persisted cursor.
    pub async fn run_streaming_import(
        &self,
        target: &SyncTarget,
        cancel: CancellationToken,
    ) -> Result<SyncOutcome, SyncError> {
        let Some(lock) = self.locks.try_acquire(target) else {
            return Ok(SyncOutcome::Busy);
        };
        let mut conn = self.open()?;
        let job = self.repo.get_or_create_job(&mut conn, target)?;
        if job.cancel_requested && !job.is_terminal() {
            let job = self.mark_cancelled(&mut conn, job.id)?;
            return Ok(SyncOutcome::Progress(SyncReport::idle(job)));
        }
        if job.is_terminal() {
            return Ok(SyncOutcome::Progress(SyncReport::idle(job)));
        }
        let running = self.register_running(target, lock.lease(), Some(&cancel));
        let cancel = running.token().clone();

        let (tx, rx) = mpsc::channel::<FlushMessage>(self.flush.channel_capacity);
        let repo = self.repo;
        let job_id = job.id;
        let lease = lock.lease().clone();
        let consumer = tokio::task::spawn_blocking(move || consume(repo, conn, job_id, lease, rx));

        let (end, fetched, discarded) = self.produce(&job, tx, &cancel, lock.lease()).await;

        let (mut conn, consumed) = consumer
            .await
            .map_err(|e| SyncError::Storage(anyhow::anyhow!("consumer task failed: {e}")))?;

        let outcome = match (end, consumed) {
            (ProducerEnd::Failed(e), _) => Err(e),
            (_, Err(e)) => Err(SyncError::Storage(e)),
            (ProducerEnd::ConsumerGone, Ok(_)) => Err(SyncError::Storage(anyhow::anyhow!(
                "consumer stopped before the producer finished"
            ))),
            (end, Ok(totals)) => {
                let mut exhausted = matches!(end, ProducerEnd::Exhausted);
                if exhausted && self.should_fall_back(&self.repo.load_job(&mut conn, job.id)?) {
                    info!(%target, "no games in lookback window; next run takes the newest games");
                    self.repo.patch_job(
                        &mut conn,
                        job.id,
                        &JobPatch {
                            fallback_used: Some(true),
                            ..JobPatch::default()
                        },
                    )?;
                    exhausted = false;
                }
                let mut job = self.finish(&mut conn, job.id, exhausted)?;
                if job.cancel_requested && job.status == JobStatus::Running {
                    job = self.mark_cancelled(&mut conn, job.id)?;
                }
                info!(
                    %target,
                    fetched,
                    inserted = totals.inserted,
                    indexed = totals.indexed,
                    batches = totals.batches,
                    cancelled = matches!(end, ProducerEnd::Cancelled),
                    "streaming import finished"
                );
                Ok(SyncReport {
                    job,
                    fetched,
                    inserted: totals.inserted,
                    discarded,
                    processed: totals.indexed,
                    partial_games: totals.partial_games,
                    exhausted,
                })
            }
        };

        match outcome {
            Ok(report) => Ok(SyncOutcome::Progress(report)),
            Err(e) => {
                warn!(%target, error = %e, "streaming import failed; job stays resumable");
                self.record_error(&mut conn, job.id, &e);
                Err(e)
            }
        }
    }

    /// Reads, decodes and aggregates until the stream ends, fails or is cancelled.
    async fn produce(
        &self,
        job: &ImportJob,
        tx: mpsc::Sender<FlushMessage>,
        cancel: &CancellationToken,
        lease: &LockLease,
    ) -> (ProducerEnd, usize, usize) {
        let target = &job.target;
        let mut max = None;
        let since = match target.kind {
            SubjectKind::Own => None,
            SubjectKind::Opponent if job.fallback_used => {
                let remaining = i64::from(self.policy.opponent_fallback_games) - job.imported_count;
                if remaining <= 0 {
                    return (ProducerEnd::Exhausted, 0, 0);
                }
                max = u32::try_from(remaining).ok();
                None
            }
            SubjectKind::Opponent => Some(
                chrono::Utc::now()
                    - chrono::Duration::days(i64::from(self.policy.opponent_lookback_days)),
            ),
        };
        let params = GamesRequestParams {
            username: target.subject.clone(),
            until: job.cursor,
            since,
            max,
        };
        if params.is_empty_window() {
            return (ProducerEnd::Exhausted, 0, 0);
        }

        // opening may sit in provider retries; keep the lock alive meanwhile
        let opening = self.source.stream_games(&params);
        tokio::pin!(opening);
        let mut keepalive = tokio::time::interval(self.keepalive_every());
        let mut stream = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return (ProducerEnd::Cancelled, 0, 0),
                opened = &mut opening => match opened {
                    Ok(stream) => break stream,
                    Err(e) => return (ProducerEnd::Failed(e.into()), 0, 0),
                },
                _ = keepalive.tick() => {
                    lease.refresh();
                }
            }
        };

        let limits = self.flush.limits();
        let mut queue = FlushQueue::new(limits);
        let mut window = None;
        let mut fetched = 0;
        let mut discarded = 0;
        let every = limits.max_age.min(self.keepalive_every());
        let mut tick = tokio::time::interval(every.max(Duration::from_millis(10)));

        let end = loop {
            let batch = tokio::select! {
                biased;
                _ = cancel.cancelled() => break ProducerEnd::Cancelled,
                item = stream.next() => match item {
                    None => break ProducerEnd::Exhausted,
                    Some(Err(e)) => break ProducerEnd::Failed(e.into()),
                    Some(Ok(raw)) => {
                        fetched += 1;
                        if let Some(ts) = raw.timestamp() {
                            widen(&mut window, ts);
                        }
                        match decode_game(&raw, target.platform, &target.subject) {
                            Ok(game) => queue.push(game),
                            Err(reason) => {
                                debug!(game = %raw.id, %reason, "record discarded");
                                discarded += 1;
                                None
                            }
                        }
                    }
                },
                _ = tick.tick() => {
                    lease.refresh();
                    queue.poll_age()
                }
            };
            if let Some(batch) = batch {
                let msg = FlushMessage {
                    batch,
                    window: window.take(),
                };
                if tx.send(msg).await.is_err() {
                    break ProducerEnd::ConsumerGone;
                }
            }
        };
        drop(stream);

        // final drain: nothing buffered is dropped, whatever ended the loop
        if !matches!(end, ProducerEnd::ConsumerGone) {
            let leftover = queue.drain().unwrap_or_default();
            let window = window.take();
            if !leftover.is_empty() || window.is_some() {
                let msg = FlushMessage {
                    batch: leftover,
                    window,
                };
                if tx.send(msg).await.is_err() {
                    return (ProducerEnd::ConsumerGone, fetched, discarded);
                }
            }
        }
        if discarded > 0 {
            warn!(%target, discarded, "records skipped by decoder");
        }
        (end, fetched, discarded)
    }
}
