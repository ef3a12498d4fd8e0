//! The tiered import state machine.
//!
//! Each call to [`SyncService::continue_sync`] is one short, stateless
//! invocation: take the lock, read the persisted job, fetch one batch
//! older than the cursor, store it, fold a bounded slice of un-indexed
//! games into the graph, and write progress back. Callers poll until the
//! job's status is no longer `running`.
//!
//! ```text
//! indexing ──(indexed ≥ ready_threshold)──▶ archiving ──(source empty, no backlog)──▶ complete
//!     └──────────────────────(source empty, no backlog)──────────────────────────────────┘
//! ```

pub mod model;
pub mod service;

pub use model::{CANCELLED, ImportJob, JobPatch, JobStatus, Stage};
pub use service::{SyncOutcome, SyncReport, SyncService};
