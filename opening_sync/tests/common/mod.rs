#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use diesel::QueryableByName;
use diesel::prelude::*;
use diesel::sql_types::{Integer, Text};
use futures::StreamExt;
use futures::stream;
use game_ingestor::models::game::{RawGame, RawPlayer};
use game_ingestor::models::request_params::GamesRequestParams;
use game_ingestor::providers::{
    GameSource, GameStream, NotFoundSnafu, ProviderError, RateLimitedSnafu,
};
use opening_sync::db::{connection, migrate};
use tempfile::TempDir;
use tokio::sync::Notify;

#[derive(QueryableByName)]
struct JournalMode {
    #[diesel(sql_type = Text)]
    journal_mode: String,
}
#[derive(QueryableByName)]
struct ForeignKeys {
    #[diesel(sql_type = Integer)]
    foreign_keys: i32,
}
#[derive(QueryableByName)]
struct BusyTimeout {
    #[diesel(sql_type = Integer, column_name = "timeout")]
    busy_timeout: i32,
}

pub struct TestDb {
    _dir: TempDir,    // keep alive for the life of the test
    pub path: String, // <tmpdir>/test.db
}

pub fn setup_db() -> (TestDb, SqliteConnection) {
    let dir = TempDir::new().expect("tempdir");
    let mut p = PathBuf::from(dir.path());
    p.push("test.db");
    let path = p.to_string_lossy().to_string();

    migrate::run_all(&path).expect("migrations");

    let conn = connection::connect_sqlite(&path).expect("connect");
    (TestDb { _dir: dir, path }, conn)
}

pub fn assert_sqlite_pragmas(conn: &mut SqliteConnection) {
    use diesel::sql_query;

    let jm: JournalMode = sql_query("PRAGMA journal_mode;").get_result(conn).unwrap();
    assert_eq!(jm.journal_mode.to_lowercase(), "wal");

    let fk: ForeignKeys = sql_query("PRAGMA foreign_keys;").get_result(conn).unwrap();
    assert_eq!(fk.foreign_keys, 1);

    let bt: BusyTimeout = sql_query("PRAGMA busy_timeout;").get_result(conn).unwrap();
    assert_eq!(bt.busy_timeout, 5000);
}

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

const OPENINGS: [&str; 4] = [
    "e4 e5 Nf3 Nc6 Bb5 a6",
    "d4 d5 c4 e6 Nc3 Nf6",
    "e4 c5 Nf3 d6 d4 cxd4",
    "c4 e5 Nc3 Nf6 g3 d5",
];

/// `n` games of `subject`, newest first, one minute apart ending at `newest`.
///
/// Colors, results, rated flags, speeds and openings rotate with the index.
pub fn history(subject: &str, n: usize, newest: DateTime<Utc>) -> Vec<RawGame> {
    (0..n)
        .map(|i| {
            let subject_white = i % 2 == 0;
            let opponent = RawPlayer {
                name: Some(format!("opp{}", i % 7)),
                rating: Some(1500 + (i % 5) as u32 * 50),
            };
            let me = RawPlayer {
                name: Some(subject.to_string()),
                rating: Some(1700),
            };
            let (white, black) = if subject_white {
                (me, opponent)
            } else {
                (opponent, me)
            };
            RawGame {
                id: format!("g{i:05}"),
                created_at: Some(newest - Duration::minutes(i as i64)),
                rated: Some(i % 3 != 0),
                variant: Some("standard".into()),
                speed: Some(if i % 4 == 0 { "rapid" } else { "blitz" }.into()),
                white,
                black,
                winner: match i % 3 {
                    0 => Some("white".into()),
                    1 => Some("black".into()),
                    _ => None,
                },
                status: Some(if i % 3 == 2 { "draw" } else { "resign" }.into()),
                moves: Some(OPENINGS[i % OPENINGS.len()].into()),
                ..RawGame::default()
            }
        })
        .collect()
}

pub enum Failure {
    NotFound,
    RateLimited,
}

/// In-memory game source honouring `until`/`since`/`max` like the real API.
#[derive(Default)]
pub struct ScriptedSource {
    games: Vec<RawGame>,
    pub requests: Mutex<Vec<GamesRequestParams>>,
    failures: Mutex<VecDeque<Failure>>,
    gate: Option<(Arc<Notify>, Arc<Notify>)>,
    hang_after_games: bool,
}

impl ScriptedSource {
    pub fn new(games: Vec<RawGame>) -> Self {
        Self {
            games,
            ..Self::default()
        }
    }

    pub fn fail_next(self, failure: Failure) -> Self {
        self.failures.lock().unwrap().push_back(failure);
        self
    }

    /// Every request first signals `entered`, then waits for `release`.
    pub fn gated(mut self) -> (Self, Arc<Notify>, Arc<Notify>) {
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        self.gate = Some((Arc::clone(&entered), Arc::clone(&release)));
        (self, entered, release)
    }

    /// Streams the matching games, then never ends.
    pub fn hanging(mut self) -> Self {
        self.hang_after_games = true;
        self
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl GameSource for ScriptedSource {
    async fn stream_games(&self, params: &GamesRequestParams) -> Result<GameStream, ProviderError> {
        self.requests.lock().unwrap().push(params.clone());
        if let Some((entered, release)) = &self.gate {
            entered.notify_one();
            release.notified().await;
        }
        let failure = self.failures.lock().unwrap().pop_front();
        match failure {
            Some(Failure::NotFound) => {
                return NotFoundSnafu {
                    subject: params.username.clone(),
                }
                .fail();
            }
            Some(Failure::RateLimited) => return RateLimitedSnafu { attempts: 3u32 }.fail(),
            None => {}
        }

        let mut selected: Vec<RawGame> = self
            .games
            .iter()
            .filter(|g| {
                let ts = g.timestamp().expect("scripted games are dated");
                params.until.is_none_or(|u| ts < u) && params.since.is_none_or(|s| ts >= s)
            })
            .cloned()
            .collect();
        if let Some(max) = params.max {
            selected.truncate(max as usize);
        }

        let games = stream::iter(selected.into_iter().map(Ok));
        if self.hang_after_games {
            Ok(games.chain(stream::pending()).boxed())
        } else {
            Ok(games.boxed())
        }
    }
}
