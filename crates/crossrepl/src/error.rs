//! Error types and fault classification for the replication syncer.

use thiserror::Error;

/// Errors surfaced by adapter calls and the replication core.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The RPC target is no longer the cluster's leader.
    #[error("cluster leader changed")]
    LeaderChanged,

    /// The management endpoint is unreachable (HTTP 404/timeout class).
    #[error("cluster endpoint unreachable: {msg}")]
    EndpointUnreachable {
        /// Description of the unreachable endpoint.
        msg: String,
    },

    /// Binlog is disabled at the database or table level.
    #[error("binlog disabled for {scope}")]
    BinlogDisabled {
        /// The scope missing binlog (database or table name).
        scope: String,
    },

    /// The requested commit sequence has fallen out of the retained binlog window.
    #[error("binlog commit sequence {seq} too old")]
    BinlogTooOld {
        /// The commit sequence that is no longer retained.
        seq: u64,
    },

    /// The requested commit sequence is ahead of the retained binlog window.
    #[error("binlog commit sequence {seq} too new")]
    BinlogTooNew {
        /// The commit sequence that is not yet visible.
        seq: u64,
    },

    /// The named snapshot does not exist on the cluster.
    #[error("snapshot not found: {name}")]
    SnapshotNotFound {
        /// Snapshot name.
        name: String,
    },

    /// The named snapshot exists but has expired.
    #[error("snapshot expired: {name}")]
    SnapshotExpired {
        /// Snapshot name.
        name: String,
    },

    /// Restore reported a signature mismatch for specific tables or views.
    #[error("restore signature mismatch: {objects:?}")]
    RestoreSignatureMismatch {
        /// The destination objects whose signatures did not match.
        objects: Vec<String>,
    },

    /// A cluster-side lock could not be acquired.
    #[error("lock acquisition failed: {msg}")]
    LockFailed {
        /// Description of the contended lock.
        msg: String,
    },

    /// Generic network failure talking to a cluster.
    #[error("network error: {msg}")]
    Network {
        /// Description of the network failure.
        msg: String,
    },

    /// A bounded operation exceeded its deadline.
    #[error("operation timed out: {op}")]
    Timeout {
        /// The operation that timed out.
        op: String,
    },

    /// A snapshot or restore is already in flight for this job.
    #[error("snapshot already in flight: {name}")]
    SnapshotInFlight {
        /// Name of the in-flight snapshot.
        name: String,
    },

    /// Job registration conflict.
    #[error("job already exists: {name}")]
    JobExists {
        /// Job name.
        name: String,
    },

    /// The named job is not registered.
    #[error("unknown job: {name}")]
    JobUnknown {
        /// Job name.
        name: String,
    },

    /// The job was cancelled cooperatively.
    #[error("job cancelled")]
    Cancelled,

    /// Generic internal fault on either cluster.
    #[error("internal error: {msg}")]
    Internal {
        /// Description of the internal fault.
        msg: String,
    },

    /// I/O error from the state store.
    #[error("I/O error")]
    Io(#[from] std::io::Error),

    /// Persisted state (de)serialization error.
    #[error("state serialization error")]
    Json(#[from] serde_json::Error),
}

/// Coarse fault classes driving the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultClass {
    /// Topology or network fault: re-resolve and retry with backoff.
    Transient,
    /// Missing precondition (binlog disabled): fatal until remediated.
    Precondition,
    /// Watermark fell outside the retained binlog window: re-snapshot.
    BinlogWindow,
    /// Snapshot vanished or expired: retry with a freshly named snapshot.
    SnapshotLifecycle,
    /// Destination schema diverged from the snapshot: drop and retry once.
    SchemaDivergence,
    /// Cluster-side lock contention: retry with backoff, bounded.
    Lock,
    /// Anything else: no auto-retry, surface to the operator.
    Unrecoverable,
}

impl SyncError {
    /// Classify this error for the retry policy.
    pub fn fault_class(&self) -> FaultClass {
        match self {
            SyncError::LeaderChanged
            | SyncError::EndpointUnreachable { .. }
            | SyncError::Network { .. }
            | SyncError::Timeout { .. } => FaultClass::Transient,
            SyncError::BinlogDisabled { .. } => FaultClass::Precondition,
            SyncError::BinlogTooOld { .. } | SyncError::BinlogTooNew { .. } => {
                FaultClass::BinlogWindow
            }
            SyncError::SnapshotNotFound { .. } | SyncError::SnapshotExpired { .. } => {
                FaultClass::SnapshotLifecycle
            }
            SyncError::RestoreSignatureMismatch { .. } => FaultClass::SchemaDivergence,
            SyncError::LockFailed { .. } => FaultClass::Lock,
            _ => FaultClass::Unrecoverable,
        }
    }

    /// True if the fault should first re-resolve the adapter target.
    pub fn wants_reresolve(&self) -> bool {
        matches!(
            self,
            SyncError::LeaderChanged | SyncError::EndpointUnreachable { .. }
        )
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SyncError>;
