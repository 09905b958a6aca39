//! Watermark tracking: the durable replication checkpoint.
//!
//! One job carries a single job-wide watermark plus per-table resume
//! overrides set by partial sync. A table's effective watermark is the max
//! of the two; overrides are dropped once the job watermark catches up.

use crate::record::CommitSeq;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The replication checkpoint for one job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Watermark {
    /// Highest commit sequence durably applied for the whole job.
    committed: CommitSeq,
    /// Per-table resume points ahead of the job watermark (partial sync).
    overrides: HashMap<String, CommitSeq>,
}

impl Watermark {
    /// Start at the given sequence (the initial snapshot's commit seq).
    pub fn at(seq: CommitSeq) -> Self {
        Self { committed: seq, overrides: HashMap::new() }
    }

    /// The job-wide committed sequence.
    pub fn committed(&self) -> CommitSeq {
        self.committed
    }

    /// Advance the job watermark. Never decreases; returns true if it moved.
    pub fn advance(&mut self, seq: CommitSeq) -> bool {
        if seq > self.committed {
            self.committed = seq;
            self.gc_overrides();
            true
        } else {
            false
        }
    }

    /// The effective watermark for one table.
    pub fn effective(&self, table: &str) -> CommitSeq {
        match self.overrides.get(table) {
            Some(o) if *o > self.committed => *o,
            _ => self.committed,
        }
    }

    /// True if a record at `seq` for `table` still needs applying.
    /// Records at or below the effective watermark are idempotent replays.
    pub fn applies(&self, table: &str, seq: CommitSeq) -> bool {
        seq > self.effective(table)
    }

    /// Set a per-table resume point after a partial resync.
    pub fn set_override(&mut self, table: &str, seq: CommitSeq) {
        if seq > self.committed {
            self.overrides.insert(table.to_string(), seq);
        }
    }

    /// Per-table overrides still ahead of the job watermark.
    pub fn overrides(&self) -> &HashMap<String, CommitSeq> {
        &self.overrides
    }

    fn gc_overrides(&mut self) {
        let committed = self.committed;
        self.overrides.retain(|_, seq| *seq > committed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod advance {
        use super::*;

        #[test]
        fn test_monotonic() {
            let mut wm = Watermark::at(CommitSeq(100));
            assert!(wm.advance(CommitSeq(101)));
            assert!(!wm.advance(CommitSeq(101)));
            assert!(!wm.advance(CommitSeq(50)));
            assert_eq!(wm.committed(), CommitSeq(101));
        }

        #[test]
        fn test_starts_at_snapshot_seq() {
            let wm = Watermark::at(CommitSeq(500));
            assert_eq!(wm.committed(), CommitSeq(500));
        }
    }

    mod applies {
        use super::*;

        #[test]
        fn test_replay_below_watermark_skipped() {
            let wm = Watermark::at(CommitSeq(100));
            assert!(!wm.applies("t1", CommitSeq(100)));
            assert!(!wm.applies("t1", CommitSeq(99)));
            assert!(wm.applies("t1", CommitSeq(101)));
        }

        #[test]
        fn test_override_raises_effective() {
            let mut wm = Watermark::at(CommitSeq(700));
            wm.set_override("t3", CommitSeq(750));
            assert_eq!(wm.effective("t3"), CommitSeq(750));
            assert_eq!(wm.effective("t4"), CommitSeq(700));
            assert!(!wm.applies("t3", CommitSeq(720)));
            assert!(wm.applies("t3", CommitSeq(751)));
            assert!(wm.applies("t4", CommitSeq(701)));
        }
    }

    mod overrides {
        use super::*;

        #[test]
        fn test_override_below_watermark_ignored() {
            let mut wm = Watermark::at(CommitSeq(700));
            wm.set_override("t3", CommitSeq(600));
            assert!(wm.overrides().is_empty());
            assert_eq!(wm.effective("t3"), CommitSeq(700));
        }

        #[test]
        fn test_gc_on_catchup() {
            let mut wm = Watermark::at(CommitSeq(700));
            wm.set_override("t3", CommitSeq(750));
            assert_eq!(wm.overrides().len(), 1);
            wm.advance(CommitSeq(750));
            assert!(wm.overrides().is_empty());
            assert_eq!(wm.effective("t3"), CommitSeq(750));
        }

        #[test]
        fn test_serde_roundtrip() {
            let mut wm = Watermark::at(CommitSeq(10));
            wm.set_override("t1", CommitSeq(20));
            let json = serde_json::to_string(&wm).unwrap();
            let back: Watermark = serde_json::from_str(&json).unwrap();
            assert_eq!(back, wm);
        }
    }
}
