//! Binlog change records and the record feed contract.
//!
//! The source cluster exposes its change log as an ordered, replayable
//! sequence of records tagged with a monotonically increasing commit
//! sequence. Records for one table are delivered in non-decreasing order and
//! may be delivered more than once; application is idempotent per sequence.

use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Monotonically increasing identifier of a committed source change.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct CommitSeq(pub u64);

impl CommitSeq {
    /// The zero sequence, before any committed change.
    pub const ZERO: CommitSeq = CommitSeq(0);
}

impl std::fmt::Display for CommitSeq {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The kind-specific payload of a change record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RecordKind {
    /// A new table or view was created; carries the captured definition.
    CreateTableOrView {
        /// Captured creation statement or definition blob.
        definition: String,
        /// True if the object is a view.
        is_view: bool,
    },
    /// A partition was added to a table.
    AddPartition {
        /// Partition name.
        partition: String,
    },
    /// A partition was dropped from a table.
    DropPartition {
        /// Partition name.
        partition: String,
    },
    /// A column was renamed.
    RenameColumn {
        /// Old column name.
        from: String,
        /// New column name.
        to: String,
    },
    /// The table itself was renamed.
    RenameTable {
        /// New table name.
        to: String,
    },
    /// The table comment was modified.
    ModifyComment {
        /// New comment text.
        comment: String,
    },
    /// The table was truncated.
    TruncateTable,
    /// The table was replaced by another, optionally swapping the two.
    ReplaceTable {
        /// Name of the replacing table.
        with: String,
        /// Whether the two tables swap names.
        swap: bool,
    },
    /// A lightweight schema change adding or dropping columns.
    AddOrDropColumns {
        /// Opaque change description applied by the adapter.
        changes: String,
    },
    /// The table was dropped.
    DropTable,
    /// A view was dropped.
    DropView,
    /// The source marked these tables as no longer incrementally replayable.
    DesyncTables {
        /// Tables requiring a partial resync.
        tables: Vec<String>,
    },
    /// Row-level data change, loaded through the transactional sink.
    DataChange {
        /// Destination transaction identifier.
        txn_id: i64,
    },
}

impl RecordKind {
    /// True if applying this record mutates destination schema directly
    /// through the adapter (as opposed to the transactional sink).
    pub fn is_schema_change(&self) -> bool {
        !matches!(self, RecordKind::DataChange { .. } | RecordKind::DesyncTables { .. })
    }
}

/// One entry of the binlog record feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    /// Commit sequence of this change (strictly increasing per source).
    pub commit_seq: CommitSeq,
    /// The table this change belongs to. Empty for database-wide records
    /// such as `DesyncTables`.
    pub table: String,
    /// The change payload.
    pub kind: RecordKind,
}

impl ChangeRecord {
    /// Create a record.
    pub fn new(commit_seq: u64, table: impl Into<String>, kind: RecordKind) -> Self {
        Self {
            commit_seq: CommitSeq(commit_seq),
            table: table.into(),
            kind,
        }
    }
}

/// The binlog record feed contract: an ordered, replayable change stream.
///
/// Implementations decode the cluster's wire format; the core only relies on
/// ordering and at-least-once delivery.
#[async_trait::async_trait]
pub trait BinlogFeed: Send + Sync {
    /// Fetch up to `limit` records with commit sequence strictly greater
    /// than `after`. An empty vector means the feed is currently caught up.
    ///
    /// Returns `BinlogTooOld`/`BinlogTooNew` when `after` falls outside the
    /// retained window.
    async fn fetch_after(&self, after: CommitSeq, limit: usize) -> Result<Vec<ChangeRecord>>;
}
