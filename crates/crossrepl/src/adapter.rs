//! Cluster data-access contract consumed by the replication core.
//!
//! One adapter instance fronts one cluster endpoint. Every operation is
//! network-fallible and carries no retry of its own; retry policy lives in
//! the job state machine. The adapter is also an event source for topology
//! faults, delivered through the event bridge rather than a callback.

use crate::error::Result;
use crate::record::RecordKind;

/// Topology fault signals raised by an adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterEvent {
    /// The RPC target is no longer the cluster's leader.
    LeaderChanged,
    /// The management endpoint is unreachable.
    EndpointUnreachable,
}

/// Status of a cluster-side backup or restore job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobProgress {
    /// The job is still running.
    InProgress,
    /// The job finished successfully.
    Finished,
    /// The job failed terminally on the cluster side.
    Failed,
}

/// A captured table or view definition from the source cluster.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectDef {
    /// Object name.
    pub name: String,
    /// Captured creation statement.
    pub definition: String,
    /// True if the object is a view.
    pub is_view: bool,
}

/// Data-access operations the core needs from one cluster.
///
/// The operation set collapses the two adapter shapes observed across
/// backend versions into one capability set; narrow backends return
/// `Internal` for operations they cannot express.
#[async_trait::async_trait]
pub trait ClusterAdapter: Send + Sync {
    /// Check that the endpoint is reachable and credentials are usable.
    async fn valid(&self) -> Result<()>;

    /// Re-resolve the leader after a `LeaderChanged`/`EndpointUnreachable`
    /// signal. Subsequent calls target the refreshed endpoint.
    async fn refresh_leader(&self) -> Result<()>;

    // Binlog preconditions.

    /// Whether binlog is enabled for the scoped database.
    async fn database_enables_binlog(&self) -> Result<bool>;
    /// Whether binlog is enabled for the given table.
    async fn table_enables_binlog(&self, table: &str) -> Result<bool>;

    // Existence and discovery.

    /// Whether the scoped database exists.
    async fn database_exists(&self) -> Result<bool>;
    /// Whether the given table exists in the scoped database.
    async fn table_exists(&self, table: &str) -> Result<bool>;
    /// All table names in the scoped database.
    async fn all_tables(&self) -> Result<Vec<String>>;
    /// Captured definitions for the given tables (and their views).
    async fn object_defs(&self, tables: &[String]) -> Result<Vec<ObjectDef>>;

    // Database/table DDL.

    /// Create the scoped database.
    async fn create_database(&self) -> Result<()>;
    /// Create a table or view from a captured definition.
    async fn create_table_or_view(&self, def: &ObjectDef) -> Result<()>;
    /// Drop a table, optionally forcing.
    async fn drop_table(&self, table: &str, force: bool) -> Result<()>;
    /// Drop a view.
    async fn drop_view(&self, view: &str) -> Result<()>;

    // Snapshot / backup.

    /// Start a full snapshot of the given tables under `name`.
    async fn create_snapshot(&self, name: &str, tables: &[String]) -> Result<()>;
    /// Start a partial snapshot of one table, optionally restricted to
    /// specific partitions.
    async fn create_partial_snapshot(
        &self,
        name: &str,
        table: &str,
        partitions: &[String],
    ) -> Result<()>;
    /// Progress of the backup job for `name`.
    async fn backup_progress(&self, name: &str) -> Result<JobProgress>;
    /// Drop a retired snapshot. Best-effort cleanup after restore.
    async fn drop_snapshot(&self, name: &str) -> Result<()>;

    // Restore.

    /// Find the most recent compatible restorable backup with the given
    /// name prefix, returning its exact name.
    async fn find_backup(&self, prefix: &str) -> Result<Option<String>>;
    /// Issue a restore of the named snapshot into the scoped database,
    /// optionally renaming the restored table (partial-sync staging).
    async fn issue_restore(&self, name: &str, rename_to: Option<&str>) -> Result<()>;
    /// Progress of the restore job for `name`.
    async fn restore_progress(&self, name: &str) -> Result<JobProgress>;
    /// Destination objects whose signatures did not match the snapshot.
    /// Empty when the restore is clean.
    async fn signature_mismatched_objects(&self, name: &str) -> Result<Vec<String>>;
    /// Commit sequence captured by the named snapshot.
    async fn snapshot_commit_seq(&self, name: &str) -> Result<u64>;

    // Schema mutation (incremental apply).

    /// Apply a schema-shaped change record to the given table.
    async fn apply_schema_change(&self, table: &str, kind: &RecordKind) -> Result<()>;

    /// Mark tables as desynced on the destination side.
    async fn desync_tables(&self, tables: &[String]) -> Result<()>;
}

/// External transactional sink that physically loads row-level changes.
///
/// The core only starts a transaction and waits for its completion; the
/// row pipeline itself is outside this crate.
#[async_trait::async_trait]
pub trait TransactionSink: Send + Sync {
    /// Begin (or join) the destination transaction for `txn_id`.
    async fn begin(&self, txn_id: i64) -> Result<()>;
    /// Commit the destination transaction.
    async fn commit(&self, txn_id: i64) -> Result<()>;
    /// Block until the transaction is fully visible, up to `timeout`.
    /// Cancellable by dropping the future; returns `Timeout` on expiry.
    async fn wait_done(&self, txn_id: i64, timeout: std::time::Duration) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cluster_event_equality() {
        assert_eq!(ClusterEvent::LeaderChanged, ClusterEvent::LeaderChanged);
        assert_ne!(ClusterEvent::LeaderChanged, ClusterEvent::EndpointUnreachable);
    }

    #[test]
    fn test_job_progress_variants() {
        assert_ne!(JobProgress::InProgress, JobProgress::Finished);
        assert_ne!(JobProgress::Finished, JobProgress::Failed);
    }

    #[test]
    fn test_object_def_clone() {
        let def = ObjectDef {
            name: "t1".into(),
            definition: "CREATE TABLE t1 (...)".into(),
            is_view: false,
        };
        let cloned = def.clone();
        assert_eq!(cloned, def);
    }
}
