//! Progress status strings observed by the stats reporter.
//!
//! Format: `{DB|Table}{Init|FullSync|PartialSync|IncrementalSync}[:<detail>]`.
//! Scope is determined by the `DB` prefix; the sync sub-phase by substring
//! match. Coarse running state is a separate summary field, never encoded
//! here.

use serde::{Deserialize, Serialize};

/// Whether a job replicates a whole database or a single table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobScopeKind {
    /// Database-scoped replication.
    Db,
    /// Table-scoped replication.
    Table,
}

/// The sync sub-phase encoded in a progress string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncPhaseKind {
    /// Validating adapters and preconditions.
    Init,
    /// Bootstrapping via snapshot/restore.
    FullSync,
    /// Re-snapshotting a diverged table subset.
    PartialSync,
    /// Steady-state binlog replay.
    IncrementalSync,
}

impl SyncPhaseKind {
    fn as_str(&self) -> &'static str {
        match self {
            SyncPhaseKind::Init => "Init",
            SyncPhaseKind::FullSync => "FullSync",
            SyncPhaseKind::PartialSync => "PartialSync",
            SyncPhaseKind::IncrementalSync => "IncrementalSync",
        }
    }
}

/// Render a progress string.
pub fn format_progress(scope: JobScopeKind, phase: SyncPhaseKind, detail: Option<&str>) -> String {
    let prefix = match scope {
        JobScopeKind::Db => "DB",
        JobScopeKind::Table => "Table",
    };
    match detail {
        Some(d) if !d.is_empty() => format!("{}{}:{}", prefix, phase.as_str(), d),
        _ => format!("{}{}", prefix, phase.as_str()),
    }
}

/// Parse a progress string back into scope and phase.
///
/// Substring matching mirrors how external dashboards interpret the string;
/// `PartialSync` is checked before `FullSync` so details never confuse the
/// match. Returns None for strings produced by no known phase.
pub fn parse_progress(s: &str) -> Option<(JobScopeKind, SyncPhaseKind)> {
    let scope = if s.starts_with("DB") {
        JobScopeKind::Db
    } else if s.starts_with("Table") {
        JobScopeKind::Table
    } else {
        return None;
    };
    let phase = if s.contains("PartialSync") {
        SyncPhaseKind::PartialSync
    } else if s.contains("IncrementalSync") {
        SyncPhaseKind::IncrementalSync
    } else if s.contains("FullSync") {
        SyncPhaseKind::FullSync
    } else if s.contains("Init") {
        SyncPhaseKind::Init
    } else {
        return None;
    };
    Some((scope, phase))
}
