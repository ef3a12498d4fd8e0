//! Remote game-history ingestion.
//!
//! This crate knows how to talk to a chess server's game-history endpoint and
//! hand back vendor-neutral [`models::game::RawGame`] records. It does not know
//! anything about opening graphs or storage; see the `opening_sync` crate for that.

pub mod models;
pub mod ndjson;
pub mod providers;
pub mod retry;
