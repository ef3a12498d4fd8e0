//! Persisted import job state.

use anyhow::bail;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::target::SyncTarget;

/// Tier of the import. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Bootstrap: small batches until the graph is usable.
    Indexing,
    /// Ready; larger batches walk the rest of the history.
    Archiving,
    /// Source exhausted and backlog indexed.
    Complete,
}

impl Stage {
    pub fn code(self) -> &'static str {
        match self {
            Stage::Indexing => "indexing",
            Stage::Archiving => "archiving",
            Stage::Complete => "complete",
        }
    }

    pub fn from_code(code: &str) -> anyhow::Result<Self> {
        match code {
            "indexing" => Ok(Stage::Indexing),
            "archiving" => Ok(Stage::Archiving),
            "complete" => Ok(Stage::Complete),
            other => bail!("unknown stage: {other}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Running,
    Complete,
    /// Terminal until an explicit restart. Only cancellation lands here.
    Error,
}

impl JobStatus {
    pub fn code(self) -> &'static str {
        match self {
            JobStatus::Running => "running",
            JobStatus::Complete => "complete",
            JobStatus::Error => "error",
        }
    }

    pub fn from_code(code: &str) -> anyhow::Result<Self> {
        match code {
            "running" => Ok(JobStatus::Running),
            "complete" => Ok(JobStatus::Complete),
            "error" => Ok(JobStatus::Error),
            other => bail!("unknown status: {other}"),
        }
    }
}

/// `last_error` value written when a job is stopped on request.
pub const CANCELLED: &str = "cancelled";

/// Snapshot of one import job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportJob {
    pub id: i32,
    pub target: SyncTarget,
    pub stage: Stage,
    pub status: JobStatus,
    pub ready: bool,
    pub imported_count: i64,
    pub indexed_count: i64,
    /// Exclusive upper bound for the next fetch.
    pub cursor: Option<DateTime<Utc>>,
    pub newest_seen_at: Option<DateTime<Utc>>,
    pub oldest_seen_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub cancel_requested: bool,
    /// Scouting fell back to the newest N games.
    pub fallback_used: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ImportJob {
    /// Stored games not yet folded into the graph.
    pub fn backlog(&self) -> i64 {
        self.imported_count - self.indexed_count
    }

    pub fn is_terminal(&self) -> bool {
        self.status != JobStatus::Running
    }
}

/// Partial update of job fields; `None` leaves a column untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobPatch {
    pub stage: Option<Stage>,
    pub status: Option<JobStatus>,
    /// Only `Some(true)` is written; readiness never reverts.
    pub ready: Option<bool>,
    /// `Some(None)` clears the column.
    pub last_error: Option<Option<String>>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub cancel_requested: Option<bool>,
    pub fallback_used: Option<bool>,
}

impl JobPatch {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            last_error: Some(Some(message.into())),
            ..Self::default()
        }
    }
}
