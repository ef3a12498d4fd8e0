//! Diesel row types and their mapping to domain values.

use anyhow::Context;
use diesel::prelude::*;

use crate::decode::{Color, DecodedGame, GameResult, Speed};
use crate::job::{ImportJob, JobStatus, Stage};
use crate::schema::{game, import_job, position_move};
use crate::target::{Platform, SubjectKind, SyncTarget};
use crate::tz;

/// Stored speed value for games without a known class.
pub(crate) const UNKNOWN_SPEED: &str = "unknown";

#[derive(Queryable, Selectable, Debug)]
#[diesel(table_name = import_job)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub(crate) struct JobRow {
    pub id: i32,
    pub platform: String,
    pub account: String,
    pub subject: String,
    pub kind: String,
    pub stage: String,
    pub status: String,
    pub ready: bool,
    pub imported_count: i64,
    pub indexed_count: i64,
    pub cursor: Option<String>,
    pub newest_seen_at: Option<String>,
    pub oldest_seen_at: Option<String>,
    pub last_error: Option<String>,
    pub last_success_at: Option<String>,
    pub cancel_requested: bool,
    pub fallback_used: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl TryFrom<JobRow> for ImportJob {
    type Error = anyhow::Error;

    fn try_from(r: JobRow) -> anyhow::Result<Self> {
        Ok(ImportJob {
            id: r.id,
            target: SyncTarget {
                platform: Platform::from_code(&r.platform)?,
                account: r.account,
                subject: r.subject,
                kind: SubjectKind::from_code(&r.kind)?,
            },
            stage: Stage::from_code(&r.stage)?,
            status: JobStatus::from_code(&r.status)?,
            ready: r.ready,
            imported_count: r.imported_count,
            indexed_count: r.indexed_count,
            cursor: tz::parse_opt(r.cursor.as_deref())?,
            newest_seen_at: tz::parse_opt(r.newest_seen_at.as_deref())?,
            oldest_seen_at: tz::parse_opt(r.oldest_seen_at.as_deref())?,
            last_error: r.last_error,
            last_success_at: tz::parse_opt(r.last_success_at.as_deref())?,
            cancel_requested: r.cancel_requested,
            fallback_used: r.fallback_used,
            created_at: tz::parse_ts_to_utc(&r.created_at)?,
            updated_at: tz::parse_ts_to_utc(&r.updated_at)?,
        })
    }
}

#[derive(Insertable, Debug)]
#[diesel(table_name = import_job)]
pub(crate) struct NewJobRow<'a> {
    pub platform: &'a str,
    pub account: &'a str,
    pub subject: &'a str,
    pub kind: &'a str,
}

#[derive(AsChangeset, Debug, Default)]
#[diesel(table_name = import_job)]
pub(crate) struct JobPatchRow<'a> {
    pub stage: Option<&'a str>,
    pub status: Option<&'a str>,
    pub ready: Option<bool>,
    pub last_error: Option<Option<&'a str>>,
    pub last_success_at: Option<String>,
    pub cancel_requested: Option<bool>,
    pub fallback_used: Option<bool>,
    // always set, so the changeset is never empty
    pub updated_at: String,
}

#[derive(Queryable, Selectable, Debug)]
#[diesel(table_name = game)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub(crate) struct GameRow {
    pub platform: String,
    pub external_id: String,
    pub played_at: String,
    pub subject_color: String,
    pub result: String,
    pub rated: bool,
    pub speed: String,
    pub opponent_name: Option<String>,
    pub opponent_rating: Option<i32>,
    pub moves: String,
}

impl TryFrom<GameRow> for DecodedGame {
    type Error = anyhow::Error;

    fn try_from(r: GameRow) -> anyhow::Result<Self> {
        Ok(DecodedGame {
            platform: Platform::from_code(&r.platform)?,
            played_at: tz::parse_ts_to_utc(&r.played_at)
                .with_context(|| format!("game {}", r.external_id))?,
            external_id: r.external_id,
            subject_color: Color::from_code(&r.subject_color)?,
            moves: r.moves.split_whitespace().map(str::to_string).collect(),
            result: GameResult::from_pgn(&r.result),
            rated: r.rated,
            speed: Speed::from_key(&r.speed),
            opponent_name: r.opponent_name,
            opponent_rating: r.opponent_rating.and_then(|v| u32::try_from(v).ok()),
        })
    }
}

#[derive(Insertable, Debug)]
#[diesel(table_name = game)]
pub(crate) struct NewGameRow<'a> {
    pub job_id: i32,
    pub platform: &'a str,
    pub external_id: &'a str,
    pub played_at: String,
    pub subject_color: &'a str,
    pub result: &'a str,
    pub rated: bool,
    pub speed: &'a str,
    pub opponent_name: Option<&'a str>,
    pub opponent_rating: Option<i32>,
    pub moves: String,
}

impl<'a> NewGameRow<'a> {
    pub fn new(job_id: i32, g: &'a DecodedGame) -> Self {
        Self {
            job_id,
            platform: g.platform.code(),
            external_id: &g.external_id,
            played_at: tz::to_rfc3339_millis(g.played_at),
            subject_color: g.subject_color.code(),
            result: g.result.pgn(),
            rated: g.rated,
            speed: g.speed.map_or(UNKNOWN_SPEED, Speed::code),
            opponent_name: g.opponent_name.as_deref(),
            opponent_rating: g.opponent_rating.and_then(|r| i32::try_from(r).ok()),
            moves: g.moves.join(" "),
        }
    }
}

#[derive(Insertable, Debug)]
#[diesel(table_name = position_move)]
pub(crate) struct NewMoveRow<'a> {
    pub job_id: i32,
    pub dimension: &'a str,
    pub position_key: &'a str,
    pub side: &'a str,
    pub move_uci: &'a str,
    pub san: &'a str,
    pub play_count: i64,
    pub wins: i64,
    pub losses: i64,
    pub draws: i64,
    pub rating_sum: i64,
    pub rating_count: i64,
    pub last_played_at: String,
}

#[derive(Queryable, Selectable, Debug)]
#[diesel(table_name = position_move)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub(crate) struct MoveRow {
    pub move_uci: String,
    pub san: String,
    pub play_count: i64,
    pub wins: i64,
    pub losses: i64,
    pub draws: i64,
    pub rating_sum: i64,
    pub rating_count: i64,
    pub last_played_at: String,
}
