#![warn(missing_docs)]

//! Cross-cluster replication syncer: standing, self-healing replication of a
//! database or table between two clusters of a distributed analytical
//! database, via Full Sync → Incremental Sync ⇄ Partial Sync with a durable
//! watermark per job.

pub mod adapter;
pub mod bridge;
pub mod config;
pub mod error;
pub mod job;
pub mod pipeline;
pub mod progress;
pub mod record;
pub mod registry;
pub mod report;
pub mod retry;
pub mod snapshot;
pub mod store;
pub mod watermark;
