//! Syncer and job configuration.

use crate::progress::JobScopeKind;
use crate::retry::RetryConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// What one replication job covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobScope {
    /// Replicate a whole database.
    Db {
        /// Database name.
        db: String,
    },
    /// Replicate a single table.
    Table {
        /// Database name.
        db: String,
        /// Table name.
        table: String,
    },
}

impl JobScope {
    /// The coarse scope kind used in progress strings.
    pub fn kind(&self) -> JobScopeKind {
        match self {
            JobScope::Db { .. } => JobScopeKind::Db,
            JobScope::Table { .. } => JobScopeKind::Table,
        }
    }

    /// The source database name.
    pub fn database(&self) -> &str {
        match self {
            JobScope::Db { db } | JobScope::Table { db, .. } => db,
        }
    }

    /// The scoped table, if table-scoped.
    pub fn table(&self) -> Option<&str> {
        match self {
            JobScope::Db { .. } => None,
            JobScope::Table { table, .. } => Some(table),
        }
    }
}

/// Configuration of one replication job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobConfig {
    /// Unique job name.
    pub name: String,
    /// What the job replicates.
    pub scope: JobScope,
    /// Source cluster endpoint.
    pub source: String,
    /// Destination cluster endpoint.
    pub dest: String,
}

/// Process-wide syncer configuration, loaded from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncerConfig {
    /// Directory holding the per-job durable state files.
    pub state_dir: PathBuf,
    /// Interval between stats reports, in seconds.
    pub report_interval_secs: u64,
    /// Deadline for backup completion polling, in seconds.
    pub backup_timeout_secs: u64,
    /// Deadline for restore completion polling, in seconds.
    pub restore_timeout_secs: u64,
    /// Deadline for one transactional-sink wait, in seconds.
    pub txn_wait_timeout_secs: u64,
    /// Records fetched from the binlog feed per batch.
    pub fetch_batch_size: usize,
    /// Bounded depth of the fetch-ahead queue, in batches.
    pub fetch_queue_depth: usize,
    /// Maximum attempts for transient/topology faults.
    pub transient_attempts: u32,
    /// Maximum fresh-snapshot attempts.
    pub snapshot_attempts: u32,
    /// Maximum lock-acquisition attempts.
    pub lock_attempts: u32,
    /// Initial retry backoff, in milliseconds.
    pub initial_backoff_ms: u64,
    /// Maximum retry backoff, in milliseconds.
    pub max_backoff_ms: u64,
}

impl Default for SyncerConfig {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from("state"),
            report_interval_secs: 10,
            backup_timeout_secs: 600,
            restore_timeout_secs: 600,
            txn_wait_timeout_secs: 60,
            fetch_batch_size: 64,
            fetch_queue_depth: 4,
            transient_attempts: 5,
            snapshot_attempts: 3,
            lock_attempts: 3,
            initial_backoff_ms: 100,
            max_backoff_ms: 10_000,
        }
    }
}

impl SyncerConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }

    /// The retry configuration derived from this config.
    pub fn retry(&self) -> RetryConfig {
        RetryConfig {
            transient_attempts: self.transient_attempts,
            snapshot_attempts: self.snapshot_attempts,
            lock_attempts: self.lock_attempts,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }

    /// Backup polling deadline.
    pub fn backup_timeout(&self) -> Duration {
        Duration::from_secs(self.backup_timeout_secs)
    }

    /// Restore polling deadline.
    pub fn restore_timeout(&self) -> Duration {
        Duration::from_secs(self.restore_timeout_secs)
    }

    /// Transactional-sink wait deadline.
    pub fn txn_wait_timeout(&self) -> Duration {
        Duration::from_secs(self.txn_wait_timeout_secs)
    }
}
