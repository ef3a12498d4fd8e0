//! Small helpers shared by the ingestion and sync crates.

pub mod env;
