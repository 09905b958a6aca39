//! Job registry and scheduler.
//!
//! Owns the mapping from job name to running job task. Each job runs as one
//! independent tokio task; a fault in one never affects another job's
//! progress or the registry's ability to list and stop the rest. Durable
//! state is written on registration and restored at startup so a process
//! restart resumes rather than restarts replication.

use crate::adapter::{ClusterAdapter, TransactionSink};
use crate::bridge::{EventBridge, EventPublisher};
use crate::config::{JobConfig, SyncerConfig};
use crate::error::{Result, SyncError};
use crate::job::{JobControl, JobState, JobStatus, ReplicationJob};
use crate::record::BinlogFeed;
use crate::report::JobSummary;
use crate::store::{JobStateStore, PersistedJob};
use dashmap::DashMap;
use std::sync::{Arc, RwLock};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Everything a job needs to talk to its two clusters.
pub struct JobEndpoints {
    /// Source cluster adapter.
    pub source: Arc<dyn ClusterAdapter>,
    /// Destination cluster adapter.
    pub dest: Arc<dyn ClusterAdapter>,
    /// Transactional sink for row-level loads.
    pub sink: Arc<dyn TransactionSink>,
    /// Binlog record feed from the source.
    pub feed: Arc<dyn BinlogFeed>,
}

/// Builds concrete adapters for a job's endpoints. The event publishers are
/// handed to the adapters so topology faults reach the owning job's bridge.
#[async_trait::async_trait]
pub trait ClusterConnector: Send + Sync {
    /// Connect both ends of a replication pair.
    async fn connect(
        &self,
        config: &JobConfig,
        source_events: EventPublisher,
        dest_events: EventPublisher,
    ) -> Result<JobEndpoints>;
}

struct JobHandle {
    config: JobConfig,
    control: JobControl,
    status: Arc<RwLock<JobStatus>>,
    task: Option<JoinHandle<()>>,
}

/// The registry of active replication jobs.
pub struct JobRegistry {
    jobs: DashMap<String, JobHandle>,
    store: Arc<dyn JobStateStore>,
    connector: Arc<dyn ClusterConnector>,
    syncer: SyncerConfig,
}

impl JobRegistry {
    /// Create a registry.
    pub fn new(
        store: Arc<dyn JobStateStore>,
        connector: Arc<dyn ClusterConnector>,
        syncer: SyncerConfig,
    ) -> Self {
        Self { jobs: DashMap::new(), store, connector, syncer }
    }

    /// Register a new job from configuration and start its task.
    /// Adding a job that already exists is an error.
    pub async fn register(&self, config: JobConfig) -> Result<()> {
        if self.jobs.contains_key(&config.name) {
            return Err(SyncError::JobExists { name: config.name });
        }
        let persisted = PersistedJob::new(config);
        self.store.save(&persisted).await?;
        self.spawn(persisted).await
    }

    /// Restore every persisted job at startup. Jobs in `Error` are listed
    /// but not started; they wait for an explicit restart.
    pub async fn restore_from_store(&self) -> Result<usize> {
        let mut started = 0;
        for persisted in self.store.load_all().await? {
            let name = persisted.config.name.clone();
            if self.jobs.contains_key(&name) {
                continue;
            }
            match &persisted.state {
                JobState::Error { fault, .. } => {
                    warn!(job = %name, %fault, "job restored in error state, awaiting restart");
                    self.park(persisted);
                }
                JobState::Stopped => {
                    self.park(persisted);
                }
                _ => match self.spawn(persisted.clone()).await {
                    Ok(()) => started += 1,
                    Err(e) => {
                        warn!(job = %name, error = %e, "could not start restored job, parking it");
                        let mut parked = persisted;
                        parked.state = JobState::Error { fault: e.to_string(), scope: vec![] };
                        self.park(parked);
                    }
                },
            }
        }
        Ok(started)
    }

    /// Restart a parked (errored or stopped) job from its persisted
    /// watermark and phase.
    pub async fn restart(&self, name: &str) -> Result<()> {
        {
            let handle = self
                .jobs
                .get(name)
                .ok_or_else(|| SyncError::JobUnknown { name: name.to_string() })?;
            if handle.task.as_ref().is_some_and(|t| !t.is_finished()) {
                return Err(SyncError::Internal {
                    msg: format!("job {name} is already running"),
                });
            }
        }
        let mut persisted = self
            .store
            .load(name)
            .await?
            .ok_or_else(|| SyncError::JobUnknown { name: name.to_string() })?;
        // Resume from the last persisted watermark and phase; only the
        // coarse state is reset.
        persisted.state = JobState::Initializing;
        self.store.save(&persisted).await?;
        self.jobs.remove(name);
        match self.spawn(persisted.clone()).await {
            Ok(()) => Ok(()),
            Err(e) => {
                // Keep the job listed; it stays parked awaiting another
                // restart.
                warn!(job = name, error = %e, "restart failed, re-parking job");
                let mut parked = persisted;
                parked.state = JobState::Error { fault: e.to_string(), scope: vec![] };
                self.park(parked);
                Err(e)
            }
        }
    }

    /// Cooperatively stop a job and wait for its task to finish.
    pub async fn stop(&self, name: &str) -> Result<()> {
        let task = {
            let mut handle = self
                .jobs
                .get_mut(name)
                .ok_or_else(|| SyncError::JobUnknown { name: name.to_string() })?;
            handle.control.stop();
            handle.task.take()
        };
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(job = name, error = %e, "job task ended abnormally");
            }
        }
        Ok(())
    }

    /// Pause a job at its next safe checkpoint.
    pub fn pause(&self, name: &str) -> Result<()> {
        let handle = self
            .jobs
            .get(name)
            .ok_or_else(|| SyncError::JobUnknown { name: name.to_string() })?;
        handle.control.pause();
        Ok(())
    }

    /// Resume a paused job.
    pub fn resume(&self, name: &str) -> Result<()> {
        let handle = self
            .jobs
            .get(name)
            .ok_or_else(|| SyncError::JobUnknown { name: name.to_string() })?;
        handle.control.resume();
        Ok(())
    }

    /// Stop a job and delete its durable state.
    /// Removing a job that does not exist is an error.
    pub async fn remove(&self, name: &str) -> Result<()> {
        if !self.jobs.contains_key(name) {
            return Err(SyncError::JobUnknown { name: name.to_string() });
        }
        self.stop(name).await?;
        self.jobs.remove(name);
        self.store.remove(name).await?;
        info!(job = name, "job removed");
        Ok(())
    }

    /// Stop every job, used at process shutdown.
    pub async fn stop_all(&self) {
        let names: Vec<String> = self.jobs.iter().map(|e| e.key().clone()).collect();
        for name in names {
            if let Err(e) = self.stop(&name).await {
                warn!(job = %name, error = %e, "stop failed during shutdown");
            }
        }
    }

    /// Read-only snapshot of every job for the stats reporter. Never blocks
    /// on in-flight job operations.
    pub fn summaries(&self) -> Vec<JobSummary> {
        let mut summaries: Vec<JobSummary> = self
            .jobs
            .iter()
            .map(|entry| {
                let status = entry
                    .status
                    .read()
                    .map(|s| s.clone())
                    .unwrap_or_else(|poisoned| poisoned.into_inner().clone());
                JobSummary {
                    name: entry.key().clone(),
                    running: status.state.is_running(),
                    state: status.state,
                    progress: status.progress,
                }
            })
            .collect();
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        summaries
    }

    /// Number of registered jobs.
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// True if no jobs are registered.
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    async fn spawn(&self, persisted: PersistedJob) -> Result<()> {
        let name = persisted.config.name.clone();
        let (bridge, source_events, dest_events) = EventBridge::new(64);
        let endpoints = self
            .connector
            .connect(&persisted.config, source_events, dest_events)
            .await?;
        let control = JobControl::new();
        let config = persisted.config.clone();
        let job = ReplicationJob::new(
            persisted,
            endpoints.source,
            endpoints.dest,
            endpoints.sink,
            endpoints.feed,
            self.store.clone(),
            self.syncer.clone(),
            bridge,
            control.clone(),
        );
        let status = job.status_cell();
        // The handle is fully constructed before insertion; the stats path
        // never observes a partially built job.
        let task = tokio::spawn(job.run());
        self.jobs.insert(
            name,
            JobHandle { config, control, status, task: Some(task) },
        );
        Ok(())
    }

    /// Insert a non-running handle for a job awaiting restart.
    fn park(&self, persisted: PersistedJob) {
        let name = persisted.config.name.clone();
        let progress = String::new();
        let status = Arc::new(RwLock::new(JobStatus { state: persisted.state, progress }));
        self.jobs.insert(
            name,
            JobHandle {
                config: persisted.config,
                control: JobControl::new(),
                status,
                task: None,
            },
        );
    }

    /// The configuration of a registered job.
    pub fn job_config(&self, name: &str) -> Option<JobConfig> {
        self.jobs.get(name).map(|h| h.config.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JobScope;
    use crate::store::FileStateStore;

    /// Connector whose adapters fail validation immediately; registry tests
    /// only exercise lifecycle, not sync progress.
    struct FailingConnector;

    struct DeadAdapter;

    #[async_trait::async_trait]
    impl ClusterAdapter for DeadAdapter {
        async fn valid(&self) -> Result<()> {
            Err(SyncError::Internal { msg: "unconnected".into() })
        }
        async fn refresh_leader(&self) -> Result<()> {
            Ok(())
        }
        async fn database_enables_binlog(&self) -> Result<bool> {
            Ok(false)
        }
        async fn table_enables_binlog(&self, _: &str) -> Result<bool> {
            Ok(false)
        }
        async fn database_exists(&self) -> Result<bool> {
            Ok(false)
        }
        async fn table_exists(&self, _: &str) -> Result<bool> {
            Ok(false)
        }
        async fn all_tables(&self) -> Result<Vec<String>> {
            Ok(Vec::new())
        }
        async fn object_defs(&self, _: &[String]) -> Result<Vec<crate::adapter::ObjectDef>> {
            Ok(Vec::new())
        }
        async fn create_database(&self) -> Result<()> {
            Ok(())
        }
        async fn create_table_or_view(&self, _: &crate::adapter::ObjectDef) -> Result<()> {
            Ok(())
        }
        async fn drop_table(&self, _: &str, _: bool) -> Result<()> {
            Ok(())
        }
        async fn drop_view(&self, _: &str) -> Result<()> {
            Ok(())
        }
        async fn create_snapshot(&self, _: &str, _: &[String]) -> Result<()> {
            Ok(())
        }
        async fn create_partial_snapshot(&self, _: &str, _: &str, _: &[String]) -> Result<()> {
            Ok(())
        }
        async fn backup_progress(&self, _: &str) -> Result<crate::adapter::JobProgress> {
            Ok(crate::adapter::JobProgress::Failed)
        }
        async fn drop_snapshot(&self, _: &str) -> Result<()> {
            Ok(())
        }
        async fn find_backup(&self, _: &str) -> Result<Option<String>> {
            Ok(None)
        }
        async fn issue_restore(&self, _: &str, _: Option<&str>) -> Result<()> {
            Ok(())
        }
        async fn restore_progress(&self, _: &str) -> Result<crate::adapter::JobProgress> {
            Ok(crate::adapter::JobProgress::Failed)
        }
        async fn signature_mismatched_objects(&self, _: &str) -> Result<Vec<String>> {
            Ok(Vec::new())
        }
        async fn snapshot_commit_seq(&self, _: &str) -> Result<u64> {
            Ok(0)
        }
        async fn apply_schema_change(
            &self,
            _: &str,
            _: &crate::record::RecordKind,
        ) -> Result<()> {
            Ok(())
        }
        async fn desync_tables(&self, _: &[String]) -> Result<()> {
            Ok(())
        }
    }

    struct DeadSink;

    #[async_trait::async_trait]
    impl TransactionSink for DeadSink {
        async fn begin(&self, _: i64) -> Result<()> {
            Ok(())
        }
        async fn commit(&self, _: i64) -> Result<()> {
            Ok(())
        }
        async fn wait_done(&self, _: i64, _: std::time::Duration) -> Result<()> {
            Ok(())
        }
    }

    struct DeadFeed;

    #[async_trait::async_trait]
    impl BinlogFeed for DeadFeed {
        async fn fetch_after(
            &self,
            _: crate::record::CommitSeq,
            _: usize,
        ) -> Result<Vec<crate::record::ChangeRecord>> {
            Ok(Vec::new())
        }
    }

    #[async_trait::async_trait]
    impl ClusterConnector for FailingConnector {
        async fn connect(
            &self,
            _: &JobConfig,
            _: EventPublisher,
            _: EventPublisher,
        ) -> Result<JobEndpoints> {
            Ok(JobEndpoints {
                source: Arc::new(DeadAdapter),
                dest: Arc::new(DeadAdapter),
                sink: Arc::new(DeadSink),
                feed: Arc::new(DeadFeed),
            })
        }
    }

    /// Connector that cannot produce endpoints at all.
    struct RefusingConnector;

    #[async_trait::async_trait]
    impl ClusterConnector for RefusingConnector {
        async fn connect(
            &self,
            _: &JobConfig,
            _: EventPublisher,
            _: EventPublisher,
        ) -> Result<JobEndpoints> {
            Err(SyncError::Internal { msg: "no driver".into() })
        }
    }

    fn sample_config(name: &str) -> JobConfig {
        JobConfig {
            name: name.into(),
            scope: JobScope::Db { db: "sales".into() },
            source: "src:9030".into(),
            dest: "dst:9030".into(),
        }
    }

    fn registry(dir: &std::path::Path) -> JobRegistry {
        let store = Arc::new(FileStateStore::open(dir).unwrap());
        JobRegistry::new(store, Arc::new(FailingConnector), SyncerConfig::default())
    }

    #[tokio::test]
    async fn test_register_and_list() {
        let dir = tempfile::tempdir().unwrap();
        let reg = registry(dir.path());

        reg.register(sample_config("sales")).await.unwrap();
        assert_eq!(reg.len(), 1);
        let summaries = reg.summaries();
        assert_eq!(summaries[0].name, "sales");
    }

    #[tokio::test]
    async fn test_duplicate_register_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let reg = registry(dir.path());

        reg.register(sample_config("sales")).await.unwrap();
        let err = reg.register(sample_config("sales")).await.unwrap_err();
        assert!(matches!(err, SyncError::JobExists { .. }));
        assert_eq!(reg.len(), 1);
    }

    #[tokio::test]
    async fn test_remove_unknown_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let reg = registry(dir.path());
        let err = reg.remove("ghost").await.unwrap_err();
        assert!(matches!(err, SyncError::JobUnknown { .. }));
    }

    #[tokio::test]
    async fn test_stop_then_remove() {
        let dir = tempfile::tempdir().unwrap();
        let reg = registry(dir.path());

        reg.register(sample_config("sales")).await.unwrap();
        reg.stop("sales").await.unwrap();
        reg.remove("sales").await.unwrap();
        assert!(reg.is_empty());
    }

    #[tokio::test]
    async fn test_failed_job_does_not_affect_others() {
        let dir = tempfile::tempdir().unwrap();
        let reg = registry(dir.path());

        reg.register(sample_config("a")).await.unwrap();
        reg.register(sample_config("b")).await.unwrap();

        // DeadAdapter fails validation, so both jobs end in Error, but the
        // registry still lists and stops them.
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        let summaries = reg.summaries();
        assert_eq!(summaries.len(), 2);
        reg.stop_all().await;
    }

    #[tokio::test]
    async fn test_restore_from_store_resumes() {
        let dir = tempfile::tempdir().unwrap();
        {
            let reg = registry(dir.path());
            reg.register(sample_config("sales")).await.unwrap();
            reg.stop_all().await;
        }
        let reg = registry(dir.path());
        reg.restore_from_store().await.unwrap();
        assert_eq!(reg.len(), 1);
        reg.stop_all().await;
    }

    #[tokio::test]
    async fn test_restored_error_job_is_parked() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileStateStore::open(dir.path()).unwrap());
        let mut persisted = PersistedJob::new(sample_config("broken"));
        persisted.state = JobState::Error { fault: "binlog disabled".into(), scope: vec![] };
        store.save(&persisted).await.unwrap();

        let reg = JobRegistry::new(store, Arc::new(FailingConnector), SyncerConfig::default());
        let started = reg.restore_from_store().await.unwrap();
        assert_eq!(started, 0);
        assert_eq!(reg.len(), 1);

        let summaries = reg.summaries();
        assert!(!summaries[0].running);
        assert!(matches!(summaries[0].state, JobState::Error { .. }));
    }

    #[tokio::test]
    async fn test_failed_restart_keeps_job_listed() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileStateStore::open(dir.path()).unwrap());
        let mut persisted = PersistedJob::new(sample_config("sales"));
        persisted.state = JobState::Error { fault: "binlog disabled".into(), scope: vec![] };
        store.save(&persisted).await.unwrap();

        let reg = JobRegistry::new(store, Arc::new(RefusingConnector), SyncerConfig::default());
        reg.restore_from_store().await.unwrap();
        assert_eq!(reg.len(), 1);

        reg.restart("sales").await.unwrap_err();
        // The job stays listed and parked rather than vanishing.
        assert_eq!(reg.len(), 1);
        let summaries = reg.summaries();
        assert_eq!(summaries[0].name, "sales");
        assert!(!summaries[0].running);
        assert!(matches!(summaries[0].state, JobState::Error { .. }));
    }

    #[tokio::test]
    async fn test_pause_unknown_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let reg = registry(dir.path());
        assert!(matches!(reg.pause("ghost"), Err(SyncError::JobUnknown { .. })));
        assert!(matches!(reg.resume("ghost"), Err(SyncError::JobUnknown { .. })));
    }
}
