mod common;

use chrono::Duration;
use opening_sync::decode::{DecodedGame, decode_game};
use opening_sync::flush::{FlushLimits, FlushQueue};
use opening_sync::graph::{Dimension, Side};
use opening_sync::job::{JobPatch, JobStatus, Stage};
use opening_sync::position::PositionKey;
use opening_sync::store::{FetchWindow, GraphRepo, SqliteRepo};
use opening_sync::{Platform, SyncTarget};

use common::{assert_sqlite_pragmas, base_time, history, setup_db};

fn decoded(n: usize) -> Vec<DecodedGame> {
    history("alice", n, base_time())
        .iter()
        .map(|raw| decode_game(raw, Platform::Lichess, "alice").unwrap())
        .collect()
}

fn window(games: &[DecodedGame]) -> Option<FetchWindow> {
    let oldest = games.iter().map(|g| g.played_at).min()?;
    let newest = games.iter().map(|g| g.played_at).max()?;
    Some(FetchWindow { oldest, newest })
}

fn batch_of(games: &[DecodedGame]) -> opening_sync::flush::FlushBatch {
    let mut q = FlushQueue::new(FlushLimits {
        max_games: usize::MAX,
        ..FlushLimits::default()
    });
    for g in games {
        assert!(q.push(g.clone()).is_none());
    }
    q.drain().unwrap()
}

#[test]
fn pragmas_are_applied() {
    let (_db, mut conn) = setup_db();
    assert_sqlite_pragmas(&mut conn);
}

#[test]
fn job_is_created_once() {
    let (_db, mut conn) = setup_db();
    let repo = SqliteRepo::new();
    let target = SyncTarget::own(Platform::Lichess, "Alice");

    assert!(repo.find_job(&mut conn, &target).unwrap().is_none());
    let a = repo.get_or_create_job(&mut conn, &target).unwrap();
    let b = repo.get_or_create_job(&mut conn, &target).unwrap();
    assert_eq!(a.id, b.id);
    assert_eq!(a.stage, Stage::Indexing);
    assert_eq!(a.status, JobStatus::Running);
    assert!(!a.ready);
    assert_eq!(a.cursor, None);

    let scouting = SyncTarget::opponent(Platform::Lichess, "alice", "bob");
    let c = repo.get_or_create_job(&mut conn, &scouting).unwrap();
    assert_ne!(a.id, c.id);
}

#[test]
fn reinserting_games_is_a_no_op() {
    let (_db, mut conn) = setup_db();
    let repo = SqliteRepo::new();
    let job = repo
        .get_or_create_job(&mut conn, &SyncTarget::own(Platform::Lichess, "alice"))
        .unwrap();
    let games = decoded(10);

    let first = repo.insert_games(&mut conn, job.id, &games, window(&games)).unwrap();
    assert_eq!((first.inserted, first.ignored), (10, 0));

    // overlapping window after a resume: 5 old + 5 new
    let more = decoded(15);
    let second = repo.insert_games(&mut conn, job.id, &more[5..], window(&more[5..])).unwrap();
    assert_eq!((second.inserted, second.ignored), (5, 5));

    let job = repo.load_job(&mut conn, job.id).unwrap();
    assert_eq!(job.imported_count, 15);
    assert_eq!(job.indexed_count, 0);
}

#[test]
fn cursor_only_moves_backward() {
    let (_db, mut conn) = setup_db();
    let repo = SqliteRepo::new();
    let job = repo
        .get_or_create_job(&mut conn, &SyncTarget::own(Platform::Lichess, "alice"))
        .unwrap();
    let games = decoded(20);

    repo.insert_games(&mut conn, job.id, &games[10..], window(&games[10..])).unwrap();
    let after_old = repo.load_job(&mut conn, job.id).unwrap();
    let oldest = games[19].played_at;
    assert_eq!(after_old.cursor, Some(oldest - Duration::milliseconds(1)));

    // a newer window must not pull the cursor forward
    repo.insert_games(&mut conn, job.id, &games[..10], window(&games[..10])).unwrap();
    let after_new = repo.load_job(&mut conn, job.id).unwrap();
    assert_eq!(after_new.cursor, after_old.cursor);
    assert_eq!(after_new.newest_seen_at, Some(games[0].played_at));
    assert_eq!(after_new.oldest_seen_at, Some(oldest));
}

#[test]
fn commit_claims_each_game_once() {
    let (_db, mut conn) = setup_db();
    let repo = SqliteRepo::new();
    let job = repo
        .get_or_create_job(&mut conn, &SyncTarget::own(Platform::Lichess, "alice"))
        .unwrap();
    let games = decoded(8);
    repo.insert_games(&mut conn, job.id, &games, window(&games)).unwrap();

    let batch = batch_of(&games);
    let first = repo.commit_batch(&mut conn, job.id, &batch).unwrap();
    assert_eq!(first.indexed, 8);
    assert!(first.moves_merged > 0);

    let before = repo
        .moves_at(&mut conn, job.id, Dimension::All, &PositionKey::initial(), Side::By)
        .unwrap();

    // redelivery of the same batch adds nothing
    let again = repo.commit_batch(&mut conn, job.id, &batch).unwrap();
    assert_eq!(again.indexed, 0);
    assert_eq!(again.moves_merged, 0);

    let after = repo
        .moves_at(&mut conn, job.id, Dimension::All, &PositionKey::initial(), Side::By)
        .unwrap();
    assert_eq!(before, after);

    let job = repo.load_job(&mut conn, job.id).unwrap();
    assert_eq!(job.indexed_count, 8);
    assert!(repo.load_unindexed(&mut conn, job.id, 100).unwrap().is_empty());
}

#[test]
fn partially_indexed_batch_is_recomputed_from_claimed_games() {
    let (_db, mut conn) = setup_db();
    let repo = SqliteRepo::new();
    let job = repo
        .get_or_create_job(&mut conn, &SyncTarget::own(Platform::Lichess, "alice"))
        .unwrap();
    let games = decoded(6);
    repo.insert_games(&mut conn, job.id, &games, window(&games)).unwrap();

    repo.commit_batch(&mut conn, job.id, &batch_of(&games[..2])).unwrap();
    let overlapping = repo.commit_batch(&mut conn, job.id, &batch_of(&games)).unwrap();
    assert_eq!(overlapping.indexed, 4);

    // same totals as indexing all six exactly once
    let (_db2, mut fresh) = setup_db();
    let job2 = repo
        .get_or_create_job(&mut fresh, &SyncTarget::own(Platform::Lichess, "alice"))
        .unwrap();
    repo.insert_games(&mut fresh, job2.id, &games, window(&games)).unwrap();
    repo.commit_batch(&mut fresh, job2.id, &batch_of(&games)).unwrap();

    for side in [Side::By, Side::Against] {
        let split = repo
            .moves_at(&mut conn, job.id, Dimension::All, &PositionKey::initial(), side)
            .unwrap();
        let once = repo
            .moves_at(&mut fresh, job2.id, Dimension::All, &PositionKey::initial(), side)
            .unwrap();
        assert_eq!(split, once);
    }
}

#[test]
fn unindexed_and_recent_games_are_newest_first() {
    let (_db, mut conn) = setup_db();
    let repo = SqliteRepo::new();
    let job = repo
        .get_or_create_job(&mut conn, &SyncTarget::own(Platform::Lichess, "alice"))
        .unwrap();
    let games = decoded(12);
    // insert out of order
    let mut shuffled = games.clone();
    shuffled.reverse();
    repo.insert_games(&mut conn, job.id, &shuffled, window(&shuffled)).unwrap();

    let unindexed = repo.load_unindexed(&mut conn, job.id, 5).unwrap();
    let ids: Vec<_> = unindexed.iter().map(|g| g.external_id.as_str()).collect();
    assert_eq!(ids, ["g00000", "g00001", "g00002", "g00003", "g00004"]);

    let recent = repo.recent_games(&mut conn, job.id, 3).unwrap();
    assert_eq!(recent, games[..3].to_vec());
}

#[test]
fn patch_keeps_ready_monotonic() {
    let (_db, mut conn) = setup_db();
    let repo = SqliteRepo::new();
    let job = repo
        .get_or_create_job(&mut conn, &SyncTarget::own(Platform::Lichess, "alice"))
        .unwrap();

    let ready = repo
        .patch_job(&mut conn, job.id, &JobPatch {
            ready: Some(true),
            last_error: Some(Some("boom".into())),
            ..JobPatch::default()
        })
        .unwrap();
    assert!(ready.ready);
    assert_eq!(ready.last_error.as_deref(), Some("boom"));

    let still = repo
        .patch_job(&mut conn, job.id, &JobPatch {
            ready: Some(false),
            last_error: Some(None),
            ..JobPatch::default()
        })
        .unwrap();
    assert!(still.ready);
    assert_eq!(still.last_error, None);

    assert!(repo.patch_job(&mut conn, 9999, &JobPatch::default()).is_err());
}

#[test]
fn stored_move_table_snapshot() {
    let (_db, mut conn) = setup_db();
    let repo = SqliteRepo::new();
    let job = repo
        .get_or_create_job(&mut conn, &SyncTarget::own(Platform::Lichess, "alice"))
        .unwrap();
    let games = decoded(4);
    repo.insert_games(&mut conn, job.id, &games, window(&games)).unwrap();
    repo.commit_batch(&mut conn, job.id, &batch_of(&games)).unwrap();

    // alice is white in games 0 and 2 (1. e4 and 1. e4)
    let moves = repo
        .moves_at(&mut conn, job.id, Dimension::All, &PositionKey::initial(), Side::By)
        .unwrap();
    insta::assert_json_snapshot!(moves, @r#"
    [
      {
        "uci": "e2e4",
        "stats": {
          "san": "e4",
          "play_count": 2,
          "wins": 1,
          "losses": 0,
          "draws": 1,
          "rating_sum": 3100,
          "rating_count": 2,
          "last_played_at": "2024-06-01T12:00:00Z"
        }
      }
    ]
    "#);
}
