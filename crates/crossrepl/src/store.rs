//! Durable per-job state.
//!
//! The persisted record carries everything a restart needs to resume rather
//! than restart replication: scope, coarse state, phase with its detail,
//! watermark, and the desynced-table set. Files are written atomically
//! (temp file + rename) so a crash never leaves a torn checkpoint, and the
//! job persists before acting on any advanced watermark.

use crate::config::JobConfig;
use crate::error::{Result, SyncError};
use crate::job::{JobPhase, JobState};
use crate::watermark::Watermark;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;

/// The durable image of one replication job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedJob {
    /// The job configuration it was created from.
    pub config: JobConfig,
    /// Coarse lifecycle state.
    pub state: JobState,
    /// Sync phase with phase-local detail.
    pub phase: JobPhase,
    /// Durable replication checkpoint.
    pub watermark: Watermark,
    /// Tables flagged for independent partial resync.
    pub desynced: BTreeSet<String>,
}

impl PersistedJob {
    /// A fresh record for a newly registered job.
    pub fn new(config: JobConfig) -> Self {
        Self {
            config,
            state: JobState::Initializing,
            phase: JobPhase::FullSync { snapshot: None },
            watermark: Watermark::default(),
            desynced: BTreeSet::new(),
        }
    }
}

/// Durable storage for job state.
#[async_trait::async_trait]
pub trait JobStateStore: Send + Sync {
    /// Persist the record durably. Must complete before the caller acts on
    /// the watermark it carries.
    async fn save(&self, job: &PersistedJob) -> Result<()>;
    /// Load one record by job name.
    async fn load(&self, name: &str) -> Result<Option<PersistedJob>>;
    /// Load every persisted record.
    async fn load_all(&self) -> Result<Vec<PersistedJob>>;
    /// Remove a record on job delete.
    async fn remove(&self, name: &str) -> Result<()>;
}

/// One JSON file per job under a state directory.
pub struct FileStateStore {
    dir: PathBuf,
}

impl FileStateStore {
    /// Open (creating if needed) a store rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }
}

#[async_trait::async_trait]
impl JobStateStore for FileStateStore {
    async fn save(&self, job: &PersistedJob) -> Result<()> {
        let path = self.path_for(&job.config.name);
        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(job)?;
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn load(&self, name: &str) -> Result<Option<PersistedJob>> {
        let path = self.path_for(name);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn load_all(&self) -> Result<Vec<PersistedJob>> {
        let mut jobs = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let bytes = tokio::fs::read(&path).await?;
            jobs.push(serde_json::from_slice(&bytes)?);
        }
        jobs.sort_by(|a: &PersistedJob, b: &PersistedJob| a.config.name.cmp(&b.config.name));
        Ok(jobs)
    }

    async fn remove(&self, name: &str) -> Result<()> {
        let path = self.path_for(name);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(SyncError::JobUnknown { name: name.to_string() })
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JobScope;
    use crate::record::CommitSeq;

    fn sample_job(name: &str) -> PersistedJob {
        PersistedJob::new(JobConfig {
            name: name.into(),
            scope: JobScope::Db { db: "sales".into() },
            source: "src:9030".into(),
            dest: "dst:9030".into(),
        })
    }

    mod file_store {
        use super::*;

        #[tokio::test]
        async fn test_save_load_roundtrip() {
            let dir = tempfile::tempdir().unwrap();
            let store = FileStateStore::open(dir.path()).unwrap();

            let mut job = sample_job("sales");
            job.watermark.advance(CommitSeq(100));
            job.desynced.insert("t3".into());
            store.save(&job).await.unwrap();

            let loaded = store.load("sales").await.unwrap().unwrap();
            assert_eq!(loaded, job);
        }

        #[tokio::test]
        async fn test_load_absent_returns_none() {
            let dir = tempfile::tempdir().unwrap();
            let store = FileStateStore::open(dir.path()).unwrap();
            assert!(store.load("nope").await.unwrap().is_none());
        }

        #[tokio::test]
        async fn test_save_overwrites_previous_checkpoint() {
            let dir = tempfile::tempdir().unwrap();
            let store = FileStateStore::open(dir.path()).unwrap();

            let mut job = sample_job("sales");
            store.save(&job).await.unwrap();
            job.watermark.advance(CommitSeq(42));
            job.phase = JobPhase::IncrementalSync;
            store.save(&job).await.unwrap();

            let loaded = store.load("sales").await.unwrap().unwrap();
            assert_eq!(loaded.watermark.committed(), CommitSeq(42));
            assert_eq!(loaded.phase, JobPhase::IncrementalSync);
        }

        #[tokio::test]
        async fn test_load_all_sorted_by_name() {
            let dir = tempfile::tempdir().unwrap();
            let store = FileStateStore::open(dir.path()).unwrap();

            store.save(&sample_job("zeta")).await.unwrap();
            store.save(&sample_job("alpha")).await.unwrap();

            let all = store.load_all().await.unwrap();
            assert_eq!(all.len(), 2);
            assert_eq!(all[0].config.name, "alpha");
            assert_eq!(all[1].config.name, "zeta");
        }

        #[tokio::test]
        async fn test_remove() {
            let dir = tempfile::tempdir().unwrap();
            let store = FileStateStore::open(dir.path()).unwrap();

            store.save(&sample_job("sales")).await.unwrap();
            store.remove("sales").await.unwrap();
            assert!(store.load("sales").await.unwrap().is_none());
        }

        #[tokio::test]
        async fn test_remove_absent_is_error() {
            let dir = tempfile::tempdir().unwrap();
            let store = FileStateStore::open(dir.path()).unwrap();
            let err = store.remove("ghost").await.unwrap_err();
            assert!(matches!(err, SyncError::JobUnknown { .. }));
        }

        #[tokio::test]
        async fn test_no_tmp_file_left_behind() {
            let dir = tempfile::tempdir().unwrap();
            let store = FileStateStore::open(dir.path()).unwrap();
            store.save(&sample_job("sales")).await.unwrap();

            let names: Vec<_> = std::fs::read_dir(dir.path())
                .unwrap()
                .map(|e| e.unwrap().file_name().into_string().unwrap())
                .collect();
            assert_eq!(names, vec!["sales.json"]);
        }
    }
}
