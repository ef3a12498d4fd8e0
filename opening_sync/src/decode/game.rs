//! Value types produced by the decoder.

use std::fmt;

use anyhow::bail;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::target::Platform;

/// Side of the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Color {
    White,
    Black,
}

impl Color {
    pub fn code(self) -> &'static str {
        match self {
            Color::White => "white",
            Color::Black => "black",
        }
    }

    pub fn from_code(code: &str) -> anyhow::Result<Self> {
        match code {
            "white" => Ok(Color::White),
            "black" => Ok(Color::Black),
            other => bail!("unknown color: {other}"),
        }
    }
}

impl From<shakmaty::Color> for Color {
    fn from(c: shakmaty::Color) -> Self {
        match c {
            shakmaty::Color::White => Color::White,
            shakmaty::Color::Black => Color::Black,
        }
    }
}

/// Declared game result, in PGN terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GameResult {
    WhiteWins,
    BlackWins,
    Draw,
    /// Unfinished, aborted or simply not reported.
    Unknown,
}

impl GameResult {
    pub fn pgn(self) -> &'static str {
        match self {
            GameResult::WhiteWins => "1-0",
            GameResult::BlackWins => "0-1",
            GameResult::Draw => "1/2-1/2",
            GameResult::Unknown => "*",
        }
    }

    pub fn from_pgn(s: &str) -> Self {
        match s.trim() {
            "1-0" => GameResult::WhiteWins,
            "0-1" => GameResult::BlackWins,
            "1/2-1/2" | "½-½" => GameResult::Draw,
            _ => GameResult::Unknown,
        }
    }

    /// The result seen from `color`'s chair.
    pub fn outcome_for(self, color: Color) -> Outcome {
        match (self, color) {
            (GameResult::WhiteWins, Color::White) | (GameResult::BlackWins, Color::Black) => {
                Outcome::Win
            }
            (GameResult::WhiteWins, Color::Black) | (GameResult::BlackWins, Color::White) => {
                Outcome::Loss
            }
            (GameResult::Draw, _) => Outcome::Draw,
            (GameResult::Unknown, _) => Outcome::Unknown,
        }
    }
}

/// Result relative to the subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Win,
    Loss,
    Draw,
    Unknown,
}

/// Time-control class.
///
/// Thresholds follow lichess: estimated duration is `base + 40 * increment`
/// seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speed {
    UltraBullet,
    Bullet,
    Blitz,
    Rapid,
    Classical,
    Correspondence,
}

impl Speed {
    pub const ALL: [Speed; 6] = [
        Speed::UltraBullet,
        Speed::Bullet,
        Speed::Blitz,
        Speed::Rapid,
        Speed::Classical,
        Speed::Correspondence,
    ];

    pub fn code(self) -> &'static str {
        match self {
            Speed::UltraBullet => "ultrabullet",
            Speed::Bullet => "bullet",
            Speed::Blitz => "blitz",
            Speed::Rapid => "rapid",
            Speed::Classical => "classical",
            Speed::Correspondence => "correspondence",
        }
    }

    /// Parses a structured speed key (`"blitz"`, `"ultraBullet"`, ...).
    pub fn from_key(key: &str) -> Option<Self> {
        let key = key.trim().to_lowercase();
        Self::ALL.into_iter().find(|s| s.code() == key)
    }

    /// Finds a speed word in free text such as `"Rated Blitz game"`.
    pub fn from_event_text(text: &str) -> Option<Self> {
        text.split(|c: char| !c.is_ascii_alphanumeric())
            .find_map(Self::from_key)
    }

    /// Classifies a PGN `TimeControl` value (`"300+3"`, `"60"`, `"-"`).
    pub fn from_time_control(tc: &str) -> Option<Self> {
        let tc = tc.trim();
        if tc == "-" {
            return Some(Speed::Correspondence);
        }
        let (base, inc) = match tc.split_once('+') {
            Some((b, i)) => (b.parse::<u64>().ok()?, i.parse::<u64>().ok()?),
            None => (tc.parse::<u64>().ok()?, 0),
        };
        // absurd tags saturate into the slowest class
        let estimate = inc
            .checked_mul(40)
            .and_then(|x| base.checked_add(x))
            .unwrap_or(u64::MAX);
        Some(match estimate {
            0..=29 => Speed::UltraBullet,
            30..=179 => Speed::Bullet,
            180..=479 => Speed::Blitz,
            480..=1499 => Speed::Rapid,
            _ => Speed::Classical,
        })
    }
}

impl fmt::Display for Speed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// One game attributed to a subject, ready for aggregation and storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedGame {
    pub platform: Platform,
    pub external_id: String,
    pub played_at: DateTime<Utc>,
    pub subject_color: Color,
    /// Mainline SAN tokens as delivered; not yet verified.
    pub moves: Vec<String>,
    pub result: GameResult,
    /// Unknown rated flags decode as casual.
    pub rated: bool,
    pub speed: Option<Speed>,
    pub opponent_name: Option<String>,
    pub opponent_rating: Option<u32>,
}

impl DecodedGame {
    pub fn outcome(&self) -> Outcome {
        self.result.outcome_for(self.subject_color)
    }
}
