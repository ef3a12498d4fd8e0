//! Resumable chess-game import and opening-graph aggregation.
//!
//! A [`job::SyncService`] pulls a subject's game history newest-first from a
//! [`game_ingestor::providers::GameSource`], stores every game once, and folds
//! each game exactly once into a position-keyed move graph split by filter
//! [`graph::Dimension`]. All progress lives in SQLite, so every invocation
//! can pick up where the previous one stopped.

pub mod config;
pub mod db;
pub mod decode;
pub mod error;
pub mod flush;
pub mod graph;
pub mod job;
pub mod lock;
pub mod position;
pub mod schema;
pub mod store;
pub mod stream;
pub mod target;
pub mod tz;

pub use error::SyncError;
pub use job::{SyncOutcome, SyncReport, SyncService};
pub use target::{Platform, SubjectKind, SyncTarget};
