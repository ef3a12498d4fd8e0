//! Declarative description of *whose* games to import, and from where.

use std::fmt;

use anyhow::bail;
use serde::{Deserialize, Serialize};

/// Which upstream to use (serde snake_case).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    /// lichess.org
    Lichess,
}

impl Platform {
    /// Code stored in the database.
    pub fn code(self) -> &'static str {
        match self {
            Platform::Lichess => "lichess",
        }
    }

    pub fn from_code(code: &str) -> anyhow::Result<Self> {
        match code.trim().to_lowercase().as_str() {
            "lichess" => Ok(Platform::Lichess),
            other => bail!("unknown platform: {other}"),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Whether the graph describes the account holder or someone they are scouting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectKind {
    /// The account's own history.
    Own,
    /// A scouted opponent; imports are bounded by a lookback window.
    Opponent,
}

impl SubjectKind {
    pub fn code(self) -> &'static str {
        match self {
            SubjectKind::Own => "own",
            SubjectKind::Opponent => "opponent",
        }
    }

    pub fn from_code(code: &str) -> anyhow::Result<Self> {
        match code {
            "own" => Ok(SubjectKind::Own),
            "opponent" => Ok(SubjectKind::Opponent),
            other => bail!("unknown subject kind: {other}"),
        }
    }
}

/// One import: `account` asks for the opening graph of `subject` on `platform`.
///
/// Names are trimmed and lowercased on construction; chess servers treat
/// usernames case-insensitively and so do we.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyncTarget {
    pub platform: Platform,
    pub account: String,
    pub subject: String,
    pub kind: SubjectKind,
}

impl SyncTarget {
    /// The account's own games.
    pub fn own(platform: Platform, account: &str) -> Self {
        let account = normalize_name(account);
        Self {
            platform,
            subject: account.clone(),
            account,
            kind: SubjectKind::Own,
        }
    }

    /// Games of `opponent`, scouted on behalf of `account`.
    pub fn opponent(platform: Platform, account: &str, opponent: &str) -> Self {
        Self {
            platform,
            account: normalize_name(account),
            subject: normalize_name(opponent),
            kind: SubjectKind::Opponent,
        }
    }
}

impl fmt::Display for SyncTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            SubjectKind::Own => write!(f, "{}:{}", self.platform, self.subject),
            SubjectKind::Opponent => {
                write!(f, "{}:{} (scouted by {})", self.platform, self.subject, self.account)
            }
        }
    }
}

fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}
