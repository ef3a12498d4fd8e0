//! Turning raw source records into [`DecodedGame`]s.
//!
//! Structured fields win; PGN header tags fill whatever the source left out.
//! A record the subject did not play, a non-standard variant, or a record
//! with no usable timestamp is discarded with a [`DiscardReason`]; such a
//! record never aborts the batch it arrived in.

pub mod game;
pub mod pgn;
pub mod replay;

use game_ingestor::models::game::RawGame;
use thiserror::Error;

pub use game::{Color, DecodedGame, GameResult, Outcome, Speed};
pub use replay::{Ply, Replay, ReplayFailure, replay};

use crate::target::Platform;
use crate::tz;
use pgn::{PgnTags, parse_pgn, tokenize_movetext};

/// Why a raw record was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiscardReason {
    #[error("record has no game id")]
    MissingId,
    #[error("{subject} played neither side")]
    NotAParticipant { subject: String },
    #[error("unsupported variant: {variant}")]
    UnsupportedVariant { variant: String },
    #[error("game starts from a custom position")]
    CustomStart,
    #[error("no timestamp")]
    MissingTimestamp,
}

/// Decodes `raw` as a game of `subject` (matched case-insensitively).
pub fn decode_game(
    raw: &RawGame,
    platform: Platform,
    subject: &str,
) -> Result<DecodedGame, DiscardReason> {
    if raw.id.trim().is_empty() {
        return Err(DiscardReason::MissingId);
    }

    let (tags, movetext) = match raw.pgn.as_deref() {
        Some(pgn) => parse_pgn(pgn),
        None => (PgnTags::default(), String::new()),
    };

    let variant = raw.variant.as_deref().or(tags.get("Variant"));
    if let Some(v) = variant {
        if !v.eq_ignore_ascii_case("standard") {
            return Err(DiscardReason::UnsupportedVariant {
                variant: v.to_string(),
            });
        }
    }
    if tags.get("FEN").is_some() || tags.get("SetUp") == Some("1") {
        return Err(DiscardReason::CustomStart);
    }

    let white = raw.white.name.as_deref().or(tags.get("White"));
    let black = raw.black.name.as_deref().or(tags.get("Black"));
    let is_subject = |name: Option<&str>| name.is_some_and(|n| n.trim().eq_ignore_ascii_case(subject));
    let subject_color = if is_subject(white) {
        Color::White
    } else if is_subject(black) {
        Color::Black
    } else {
        return Err(DiscardReason::NotAParticipant {
            subject: subject.to_string(),
        });
    };

    let played_at = raw
        .timestamp()
        .or_else(|| {
            let date = tags.get("UTCDate").or(tags.get("Date"))?;
            tz::from_pgn_date(date, tags.get("UTCTime"))
        })
        .ok_or(DiscardReason::MissingTimestamp)?;

    let moves = match raw.moves.as_deref() {
        Some(m) if !m.trim().is_empty() => tokenize_movetext(m),
        _ => tokenize_movetext(&movetext),
    };

    let (opponent, opponent_tag, opponent_elo_tag) = match subject_color {
        Color::White => (&raw.black, "Black", "BlackElo"),
        Color::Black => (&raw.white, "White", "WhiteElo"),
    };
    let opponent_name = opponent
        .name
        .clone()
        .or_else(|| tags.get(opponent_tag).map(str::to_string));
    let opponent_rating = opponent
        .rating
        .or_else(|| tags.get(opponent_elo_tag).and_then(|e| e.parse().ok()));

    Ok(DecodedGame {
        platform,
        external_id: raw.id.clone(),
        played_at,
        subject_color,
        moves,
        result: resolve_result(raw, &tags),
        rated: resolve_rated(raw, &tags),
        speed: resolve_speed(raw, &tags),
        opponent_name,
        opponent_rating,
    })
}

fn resolve_result(raw: &RawGame, tags: &PgnTags) -> GameResult {
    match raw.winner.as_deref() {
        Some("white") => return GameResult::WhiteWins,
        Some("black") => return GameResult::BlackWins,
        _ => {}
    }
    match raw.status.as_deref() {
        Some("draw" | "stalemate" | "outoftime" | "timeout" | "insufficientMaterialClaim") => {
            GameResult::Draw
        }
        Some("created" | "started" | "aborted" | "noStart" | "unknownFinish") => {
            GameResult::Unknown
        }
        _ => tags
            .get("Result")
            .map(GameResult::from_pgn)
            .unwrap_or(GameResult::Unknown),
    }
}

fn resolve_rated(raw: &RawGame, tags: &PgnTags) -> bool {
    raw.rated.unwrap_or_else(|| {
        tags.get("Event")
            .is_some_and(|e| e.trim_start().to_lowercase().starts_with("rated"))
    })
}

fn resolve_speed(raw: &RawGame, tags: &PgnTags) -> Option<Speed> {
    raw.speed
        .as_deref()
        .and_then(Speed::from_key)
        .or_else(|| tags.get("Event").and_then(Speed::from_event_text))
        .or_else(|| tags.get("TimeControl").and_then(Speed::from_time_control))
}
