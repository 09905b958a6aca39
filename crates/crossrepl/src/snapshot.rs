//! Snapshot lifecycle: naming, status, and the in-flight guard.
//!
//! A snapshot is transient: created at the start of full or partial sync,
//! retired once restore is confirmed, abandoned after exhausting retries.
//! Each attempt gets a fresh unique name so that a stale cluster-side backup
//! job can never be confused with the current attempt.

use crate::error::{Result, SyncError};
use serde::{Deserialize, Serialize};

/// What a snapshot covers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SnapshotScope {
    /// The job's full table set.
    Full {
        /// Tables captured by the snapshot.
        tables: Vec<String>,
    },
    /// One table, optionally restricted to specific partitions.
    Partial {
        /// The diverged table.
        table: String,
        /// Diverged partitions; empty means the whole table.
        partitions: Vec<String>,
    },
}

/// Lifecycle status of a snapshot attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SnapshotStatus {
    /// Backup issued, not yet complete.
    Pending,
    /// Backup finished on the source.
    BackedUp,
    /// Restore confirmed on the destination.
    Restored,
    /// The source expired the snapshot before restore completed.
    Expired,
    /// Backup or restore failed terminally.
    Failed,
}

/// One snapshot attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Unique name of this attempt.
    pub name: String,
    /// What the snapshot covers.
    pub scope: SnapshotScope,
    /// Current status.
    pub status: SnapshotStatus,
    /// Commit sequence captured by the snapshot, known after backup.
    pub commit_seq: Option<u64>,
}

impl Snapshot {
    /// Create a pending snapshot with a freshly generated name.
    pub fn begin(job_name: &str, scope: SnapshotScope) -> Self {
        Self {
            name: generate_name(job_name),
            scope,
            status: SnapshotStatus::Pending,
            commit_seq: None,
        }
    }
}

/// Generate a unique snapshot name from the job identity and the current
/// time. The random suffix disambiguates attempts within one second.
pub fn generate_name(job_name: &str) -> String {
    let ts = chrono::Utc::now().timestamp();
    let suffix: u16 = rand::random();
    format!("ccr_{}_{}_{:04x}", job_name, ts, suffix)
}

/// Enforces at most one in-flight snapshot/restore per job.
#[derive(Debug, Default)]
pub struct SnapshotTracker {
    in_flight: Option<Snapshot>,
}

impl SnapshotTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin a new attempt. Errors if one is already in flight.
    pub fn begin(&mut self, job_name: &str, scope: SnapshotScope) -> Result<&Snapshot> {
        if let Some(s) = &self.in_flight {
            return Err(SyncError::SnapshotInFlight { name: s.name.clone() });
        }
        Ok(&*self.in_flight.insert(Snapshot::begin(job_name, scope)))
    }

    /// The current in-flight snapshot, if any.
    pub fn current(&self) -> Option<&Snapshot> {
        self.in_flight.as_ref()
    }

    /// Mutable access for status updates.
    pub fn current_mut(&mut self) -> Option<&mut Snapshot> {
        self.in_flight.as_mut()
    }

    /// Retire the in-flight snapshot, returning it.
    pub fn finish(&mut self) -> Option<Snapshot> {
        self.in_flight.take()
    }
}
