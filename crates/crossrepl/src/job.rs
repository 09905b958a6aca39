//! The per-job replication state machine.
//!
//! One job replicates a database or table from a source cluster to a
//! destination cluster through the sequence Full Sync → Incremental Sync ⇄
//! Partial Sync, advancing a durable watermark so that replication is
//! resumable and idempotent across restarts, leader failovers, and binlog
//! retention faults.

use crate::adapter::{ClusterAdapter, JobProgress, TransactionSink};
use crate::bridge::{ClusterSide, EventBridge};
use crate::config::{JobConfig, SyncerConfig};
use crate::error::{FaultClass, Result, SyncError};
use crate::pipeline::{check_batch_order, FetchPipeline, PipelineConfig};
use crate::progress::{format_progress, SyncPhaseKind};
use crate::record::{BinlogFeed, ChangeRecord, CommitSeq, RecordKind};
use crate::retry::{RetryBudget, RetryConfig};
use crate::snapshot::{SnapshotScope, SnapshotStatus, SnapshotTracker};
use crate::store::{JobStateStore, PersistedJob};
use crate::watermark::Watermark;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Coarse lifecycle state of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JobState {
    /// Validating adapters and preconditions.
    Initializing,
    /// Actively replicating.
    Running,
    /// Paused by the operator; resumes from the persisted watermark.
    Paused,
    /// Terminal until remediation; retains the triggering fault and scope.
    Error {
        /// Stringified triggering fault.
        fault: String,
        /// Affected tables; empty means job-wide.
        scope: Vec<String>,
    },
    /// Clean shutdown requested by the registry.
    Stopped,
}

impl JobState {
    /// True while the job task should keep making progress.
    pub fn is_running(&self) -> bool {
        matches!(self, JobState::Initializing | JobState::Running)
    }
}

/// Sync phase with phase-local detail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JobPhase {
    /// Bootstrapping via snapshot/restore; carries the in-flight snapshot
    /// name once one is issued.
    FullSync {
        /// In-flight snapshot name, if any.
        snapshot: Option<String>,
    },
    /// Steady-state binlog replay.
    IncrementalSync,
    /// Targeted re-snapshot of a diverged table subset.
    PartialSync {
        /// The affected tables.
        tables: Vec<String>,
    },
}

impl JobPhase {
    /// The phase kind encoded in progress strings.
    pub fn kind(&self) -> SyncPhaseKind {
        match self {
            JobPhase::FullSync { .. } => SyncPhaseKind::FullSync,
            JobPhase::IncrementalSync => SyncPhaseKind::IncrementalSync,
            JobPhase::PartialSync { .. } => SyncPhaseKind::PartialSync,
        }
    }
}

/// Shared status cell: written only by the owning job task, read by the
/// stats path without blocking on in-flight operations.
#[derive(Debug, Clone)]
pub struct JobStatus {
    /// Coarse lifecycle state.
    pub state: JobState,
    /// Progress string per the reporter contract.
    pub progress: String,
}

/// Cooperative control flags observed at safe checkpoints.
#[derive(Clone, Default)]
pub struct JobControl {
    stop: Arc<AtomicBool>,
    pause: Arc<AtomicBool>,
}

impl JobControl {
    /// Create a control handle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a clean stop at the next checkpoint.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Request a pause at the next checkpoint.
    pub fn pause(&self) {
        self.pause.store(true, Ordering::SeqCst);
    }

    /// Resume a paused job.
    pub fn resume(&self) {
        self.pause.store(false, Ordering::SeqCst);
    }

    /// Whether a stop has been requested.
    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Whether a pause is in effect.
    pub fn is_paused(&self) -> bool {
        self.pause.load(Ordering::SeqCst)
    }
}

/// One replication job: owns its adapters, feed, durable state, and retry
/// budget, and is mutated exclusively by its own task.
pub struct ReplicationJob {
    persisted: PersistedJob,
    source: Arc<dyn ClusterAdapter>,
    dest: Arc<dyn ClusterAdapter>,
    sink: Arc<dyn TransactionSink>,
    feed: Arc<dyn BinlogFeed>,
    store: Arc<dyn JobStateStore>,
    syncer: SyncerConfig,
    retry: RetryConfig,
    bridge: EventBridge,
    snapshots: SnapshotTracker,
    budget: RetryBudget,
    control: JobControl,
    status: Arc<RwLock<JobStatus>>,
    fail_scope: Vec<String>,
}

impl ReplicationJob {
    /// Build a job from its persisted (or freshly created) state.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        persisted: PersistedJob,
        source: Arc<dyn ClusterAdapter>,
        dest: Arc<dyn ClusterAdapter>,
        sink: Arc<dyn TransactionSink>,
        feed: Arc<dyn BinlogFeed>,
        store: Arc<dyn JobStateStore>,
        syncer: SyncerConfig,
        bridge: EventBridge,
        control: JobControl,
    ) -> Self {
        let retry = syncer.retry();
        let status = Arc::new(RwLock::new(JobStatus {
            state: persisted.state.clone(),
            progress: String::new(),
        }));
        let mut job = Self {
            persisted,
            source,
            dest,
            sink,
            feed,
            store,
            syncer,
            retry,
            bridge,
            snapshots: SnapshotTracker::new(),
            budget: RetryBudget::new(),
            control,
            status,
            fail_scope: Vec::new(),
        };
        job.publish_status();
        job
    }

    /// The shared status cell for the registry's stats path.
    pub fn status_cell(&self) -> Arc<RwLock<JobStatus>> {
        self.status.clone()
    }

    /// The job configuration.
    pub fn config(&self) -> &JobConfig {
        &self.persisted.config
    }

    /// Drive the job to a terminal state.
    pub async fn run(mut self) {
        let name = self.persisted.config.name.clone();
        info!(job = %name, "replication job starting");
        let outcome = self.drive().await;
        match outcome {
            Ok(()) | Err(SyncError::Cancelled) => {
                info!(job = %name, "replication job stopped");
                self.persisted.state = JobState::Stopped;
            }
            Err(e) => {
                warn!(job = %name, fault = %e, scope = ?self.fail_scope, "replication job failed");
                self.persisted.state = JobState::Error {
                    fault: e.to_string(),
                    scope: self.fail_scope.clone(),
                };
            }
        }
        self.publish_status();
        if let Err(e) = self.store.save(&self.persisted).await {
            warn!(job = %name, error = %e, "failed to persist terminal job state");
        }
    }

    async fn drive(&mut self) -> Result<()> {
        if self.persisted.state == JobState::Initializing {
            self.publish_status();
            self.initialize().await?;
            self.persisted.state = JobState::Running;
            self.persist().await?;
        }
        loop {
            self.checkpoint().await?;
            match self.persisted.phase.clone() {
                JobPhase::FullSync { .. } => self.full_sync().await?,
                JobPhase::IncrementalSync => self.incremental_sync().await?,
                JobPhase::PartialSync { .. } => self.partial_sync().await?,
            }
        }
    }

    // ---- Initializing ------------------------------------------------------

    async fn initialize(&mut self) -> Result<()> {
        self.source_call(|s| async move { s.valid().await }).await?;
        self.dest_call(|d| async move { d.valid().await }).await?;

        let db = self.persisted.config.scope.database().to_string();
        if !self.source_call(|s| async move { s.database_exists().await }).await? {
            return Err(SyncError::Internal { msg: format!("source database {db} does not exist") });
        }
        if let Some(table) = self.persisted.config.scope.table().map(String::from) {
            let t = table.clone();
            if !self
                .source_call(move |s| {
                    let t = t.clone();
                    async move { s.table_exists(&t).await }
                })
                .await?
            {
                return Err(SyncError::Internal {
                    msg: format!("source table {table} does not exist"),
                });
            }
        }

        if !self
            .source_call(|s| async move { s.database_enables_binlog().await })
            .await?
        {
            return Err(SyncError::BinlogDisabled { scope: db });
        }
        for table in self.scope_tables().await? {
            let t = table.clone();
            let enabled = self
                .source_call(move |s| {
                    let t = t.clone();
                    async move { s.table_enables_binlog(&t).await }
                })
                .await?;
            if !enabled {
                return Err(SyncError::BinlogDisabled { scope: table });
            }
        }
        info!(job = %self.persisted.config.name, "preconditions validated");
        Ok(())
    }

    // ---- FullSync ----------------------------------------------------------

    async fn full_sync(&mut self) -> Result<()> {
        let job_name = self.persisted.config.name.clone();
        let mut attempt = 0u32;
        loop {
            self.checkpoint().await?;
            attempt += 1;
            match self.full_sync_attempt().await {
                Ok(snapshot_seq) => {
                    self.persisted.watermark = Watermark::at(CommitSeq(snapshot_seq));
                    self.persisted.phase = JobPhase::IncrementalSync;
                    self.persist().await?;
                    self.budget.record_success();
                    info!(
                        job = %job_name,
                        watermark = snapshot_seq,
                        "full sync complete, entering incremental sync"
                    );
                    return Ok(());
                }
                Err(e) => {
                    self.abandon_snapshot().await;
                    match e.fault_class() {
                        FaultClass::SnapshotLifecycle | FaultClass::Transient
                            if attempt < self.retry.snapshot_attempts =>
                        {
                            warn!(
                                job = %job_name,
                                attempt,
                                fault = %e,
                                "full sync attempt failed, retrying with a fresh snapshot"
                            );
                            let backoff = self.retry.compute_backoff(attempt - 1);
                            tokio::time::sleep(backoff).await;
                        }
                        _ => return Err(e),
                    }
                }
            }
        }
    }

    /// One snapshot/restore round. Returns the snapshot's commit sequence.
    async fn full_sync_attempt(&mut self) -> Result<u64> {
        let tables = self.scope_tables().await?;
        let job_name = self.persisted.config.name.clone();

        let name = {
            let snap = self
                .snapshots
                .begin(&job_name, SnapshotScope::Full { tables: tables.clone() })?;
            snap.name.clone()
        };
        self.persisted.phase = JobPhase::FullSync { snapshot: Some(name.clone()) };
        self.persist().await?;

        let n = name.clone();
        let t = tables.clone();
        self.source_call(move |s| {
            let n = n.clone();
            let t = t.clone();
            async move { s.create_snapshot(&n, &t).await }
        })
        .await?;

        self.poll_backup(&name).await?;
        if let Some(snap) = self.snapshots.current_mut() {
            snap.status = SnapshotStatus::BackedUp;
        }

        let n = name.clone();
        let snapshot_seq = self
            .source_call(move |s| {
                let n = n.clone();
                async move { s.snapshot_commit_seq(&n).await }
            })
            .await?;
        if let Some(snap) = self.snapshots.current_mut() {
            snap.commit_seq = Some(snapshot_seq);
        }

        self.prepare_destination(&tables).await?;
        self.restore_with_mismatch_retry(&name, None).await?;
        if let Some(snap) = self.snapshots.current_mut() {
            snap.status = SnapshotStatus::Restored;
        }
        self.retire_snapshot().await;
        Ok(snapshot_seq)
    }

    /// Ensure the destination database and table definitions exist.
    async fn prepare_destination(&mut self, tables: &[String]) -> Result<()> {
        if !self.dest_call(|d| async move { d.database_exists().await }).await? {
            info!(job = %self.persisted.config.name, "creating destination database");
            self.dest_call(|d| async move { d.create_database().await }).await?;
        }
        let t = tables.to_vec();
        let defs = self
            .source_call(move |s| {
                let t = t.clone();
                async move { s.object_defs(&t).await }
            })
            .await?;
        for def in defs {
            let name = def.name.clone();
            let n = name.clone();
            let exists = self
                .dest_call(move |d| {
                    let n = n.clone();
                    async move { d.table_exists(&n).await }
                })
                .await?;
            if exists {
                // Possibly divergent; restore signature checking decides.
                debug!(table = %name, "destination object already exists");
                continue;
            }
            let d2 = def.clone();
            self.dest_call(move |d| {
                let d2 = d2.clone();
                async move { d.create_table_or_view(&d2).await }
            })
            .await?;
        }
        Ok(())
    }

    /// Issue a restore and poll it, retrying exactly once after dropping
    /// signature-mismatched destination objects.
    async fn restore_with_mismatch_retry(
        &mut self,
        name: &str,
        rename_to: Option<String>,
    ) -> Result<()> {
        let mut mismatch_retried = false;
        loop {
            let n = name.to_string();
            let found = self
                .dest_call(move |d| {
                    let n = n.clone();
                    async move { d.find_backup(&n).await }
                })
                .await?
                .ok_or_else(|| SyncError::SnapshotNotFound { name: name.to_string() })?;

            let f = found.clone();
            let rename = rename_to.clone();
            self.dest_call(move |d| {
                let f = f.clone();
                let rename = rename.clone();
                async move { d.issue_restore(&f, rename.as_deref()).await }
            })
            .await?;

            match self.poll_restore(name).await {
                Ok(()) => return Ok(()),
                Err(SyncError::RestoreSignatureMismatch { objects }) if !mismatch_retried => {
                    warn!(
                        job = %self.persisted.config.name,
                        ?objects,
                        "restore signature mismatch, dropping objects and retrying once"
                    );
                    self.drop_mismatched(&objects).await?;
                    mismatch_retried = true;
                }
                Err(SyncError::RestoreSignatureMismatch { objects }) => {
                    // Retry exhausted: the error scope names the objects.
                    self.fail_scope = objects.clone();
                    return Err(SyncError::RestoreSignatureMismatch { objects });
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn drop_mismatched(&mut self, objects: &[String]) -> Result<()> {
        for object in objects {
            let o = object.clone();
            self.dest_call(move |d| {
                let o = o.clone();
                async move {
                    // Views and tables share the namespace; try table first.
                    match d.drop_table(&o, true).await {
                        Ok(()) => Ok(()),
                        Err(_) => d.drop_view(&o).await,
                    }
                }
            })
            .await?;
        }
        Ok(())
    }

    async fn poll_backup(&mut self, name: &str) -> Result<()> {
        let deadline = Instant::now() + self.syncer.backup_timeout();
        let mut poll = 0u32;
        loop {
            self.checkpoint().await?;
            let n = name.to_string();
            let progress = self
                .source_call(move |s| {
                    let n = n.clone();
                    async move { s.backup_progress(&n).await }
                })
                .await?;
            match progress {
                JobProgress::Finished => return Ok(()),
                JobProgress::Failed => {
                    return Err(SyncError::SnapshotExpired { name: name.to_string() })
                }
                JobProgress::InProgress => {
                    if Instant::now() >= deadline {
                        return Err(SyncError::Timeout { op: format!("backup {name}") });
                    }
                    tokio::time::sleep(poll_delay(&self.retry, poll)).await;
                    poll += 1;
                }
            }
        }
    }

    async fn poll_restore(&mut self, name: &str) -> Result<()> {
        let deadline = Instant::now() + self.syncer.restore_timeout();
        let mut poll = 0u32;
        loop {
            self.checkpoint().await?;
            let n = name.to_string();
            let progress = self
                .dest_call(move |d| {
                    let n = n.clone();
                    async move { d.restore_progress(&n).await }
                })
                .await?;
            match progress {
                JobProgress::Finished => return Ok(()),
                JobProgress::Failed => {
                    let n = name.to_string();
                    let mismatched = self
                        .dest_call(move |d| {
                            let n = n.clone();
                            async move { d.signature_mismatched_objects(&n).await }
                        })
                        .await?;
                    if mismatched.is_empty() {
                        return Err(SyncError::SnapshotExpired { name: name.to_string() });
                    }
                    return Err(SyncError::RestoreSignatureMismatch { objects: mismatched });
                }
                JobProgress::InProgress => {
                    if Instant::now() >= deadline {
                        return Err(SyncError::Timeout { op: format!("restore {name}") });
                    }
                    tokio::time::sleep(poll_delay(&self.retry, poll)).await;
                    poll += 1;
                }
            }
        }
    }

    // ---- IncrementalSync ---------------------------------------------------

    async fn incremental_sync(&mut self) -> Result<()> {
        let start = self.persisted.watermark.committed();
        let mut pipeline = FetchPipeline::spawn(
            self.feed.clone(),
            start,
            PipelineConfig {
                batch_size: self.syncer.fetch_batch_size,
                queue_depth: self.syncer.fetch_queue_depth,
                ..Default::default()
            },
        );
        let mut order_guard: HashMap<String, CommitSeq> = HashMap::new();
        debug!(job = %self.persisted.config.name, after = %start, "incremental sync resumed");

        loop {
            self.checkpoint().await?;

            // Bounded wait so stop and pause stay responsive while the
            // feed is caught up.
            let received =
                tokio::time::timeout(Duration::from_millis(200), pipeline.next_batch()).await;
            let batch = match received {
                Err(_) => continue,
                Ok(Some(Ok(batch))) => batch,
                Ok(Some(Err(e))) => match e.fault_class() {
                    FaultClass::BinlogWindow => {
                        warn!(
                            job = %self.persisted.config.name,
                            fault = %e,
                            "watermark outside the retained binlog window, re-snapshotting"
                        );
                        self.persisted.phase = JobPhase::FullSync { snapshot: None };
                        self.persist().await?;
                        return Ok(());
                    }
                    FaultClass::Transient
                        if self.budget.within_budget(FaultClass::Transient, &self.retry) =>
                    {
                        let attempt = self.budget.record_failure(FaultClass::Transient);
                        tokio::time::sleep(self.retry.compute_backoff(attempt - 1)).await;
                        pipeline = FetchPipeline::spawn(
                            self.feed.clone(),
                            self.persisted.watermark.committed(),
                            PipelineConfig {
                                batch_size: self.syncer.fetch_batch_size,
                                queue_depth: self.syncer.fetch_queue_depth,
                                ..Default::default()
                            },
                        );
                        continue;
                    }
                    _ => return Err(e),
                },
                Ok(None) => {
                    return Err(SyncError::Internal { msg: "binlog feed closed".to_string() })
                }
            };
            self.budget.record_success();
            check_batch_order(&mut order_guard, &batch)?;

            for record in batch {
                self.checkpoint().await?;
                self.apply_record(&record).await?;
            }

            if !self.persisted.desynced.is_empty() {
                let tables: Vec<String> = self.persisted.desynced.iter().cloned().collect();
                self.persisted.phase = JobPhase::PartialSync { tables };
                self.persist().await?;
                return Ok(());
            }
        }
    }

    /// Apply one record and persist the advanced watermark before returning.
    async fn apply_record(&mut self, record: &ChangeRecord) -> Result<()> {
        let seq = record.commit_seq;
        if !self.persisted.watermark.applies(&record.table, seq) {
            debug!(table = %record.table, seq = %seq, "skipping idempotent replay");
            return Ok(());
        }
        if !record.table.is_empty() && self.persisted.desynced.contains(&record.table) {
            debug!(table = %record.table, seq = %seq, "table desynced, holding record");
            return Ok(());
        }

        match &record.kind {
            RecordKind::DesyncTables { tables } => {
                warn!(job = %self.persisted.config.name, ?tables, "source desynced tables");
                for table in tables {
                    self.persisted.desynced.insert(table.clone());
                }
                let t = tables.clone();
                self.dest_call(move |d| {
                    let t = t.clone();
                    async move { d.desync_tables(&t).await }
                })
                .await?;
            }
            RecordKind::DataChange { txn_id } => {
                let txn = *txn_id;
                let sink = self.sink.clone();
                let timeout = self.syncer.txn_wait_timeout();
                self.retrying(move || {
                    let sink = sink.clone();
                    async move {
                        sink.begin(txn).await?;
                        sink.commit(txn).await?;
                        sink.wait_done(txn, timeout).await
                    }
                })
                .await?;
            }
            kind if kind.is_schema_change() => {
                let table = record.table.clone();
                let applied = {
                    let k = kind.clone();
                    let t = table.clone();
                    self.dest_call(move |d| {
                        let k = k.clone();
                        let t = t.clone();
                        async move { d.apply_schema_change(&t, &k).await }
                    })
                    .await
                };
                match applied {
                    Ok(()) => {}
                    Err(e)
                        if e.fault_class() == FaultClass::Unrecoverable && !table.is_empty() =>
                    {
                        // A DDL shape this destination cannot replay: the
                        // table diverges and needs a partial resync.
                        warn!(table = %table, seq = %seq, fault = %e, "unsupported DDL, desyncing table");
                        self.persisted.desynced.insert(table);
                    }
                    Err(e) => return Err(e),
                }
            }
            _ => {}
        }

        // Durable apply before any further record; crash here redoes this
        // record, and replay is idempotent.
        self.persisted.watermark.advance(seq);
        self.persist().await?;
        Ok(())
    }

    // ---- PartialSync -------------------------------------------------------

    async fn partial_sync(&mut self) -> Result<()> {
        let tables: Vec<String> = self.persisted.desynced.iter().cloned().collect();
        info!(job = %self.persisted.config.name, ?tables, "partial sync starting");

        for table in tables {
            match self.partial_sync_table(&table).await {
                Ok(()) => {
                    self.persisted.desynced.remove(&table);
                    self.persist().await?;
                    self.budget.record_success();
                }
                Err(e) => {
                    self.fail_scope = vec![table];
                    return Err(e);
                }
            }
        }

        self.persisted.phase = JobPhase::IncrementalSync;
        self.persist().await?;
        Ok(())
    }

    /// Re-snapshot one table into a staging object and swap it in place.
    async fn partial_sync_table(&mut self, table: &str) -> Result<()> {
        let job_name = self.persisted.config.name.clone();
        let mut attempt = 0u32;
        loop {
            self.checkpoint().await?;
            attempt += 1;
            match self.partial_sync_attempt(table).await {
                Ok(seq) => {
                    self.persisted.watermark.set_override(table, CommitSeq(seq));
                    info!(job = %job_name, table, resume = seq, "partial sync complete");
                    return Ok(());
                }
                Err(e) => {
                    self.abandon_snapshot().await;
                    match e.fault_class() {
                        FaultClass::SnapshotLifecycle | FaultClass::Transient
                            if attempt < self.retry.snapshot_attempts =>
                        {
                            warn!(job = %job_name, table, attempt, fault = %e, "partial sync attempt failed");
                            tokio::time::sleep(self.retry.compute_backoff(attempt - 1)).await;
                        }
                        _ => return Err(e),
                    }
                }
            }
        }
    }

    async fn partial_sync_attempt(&mut self, table: &str) -> Result<u64> {
        let job_name = self.persisted.config.name.clone();
        let name = {
            let snap = self.snapshots.begin(
                &job_name,
                SnapshotScope::Partial { table: table.to_string(), partitions: Vec::new() },
            )?;
            snap.name.clone()
        };

        let n = name.clone();
        let t = table.to_string();
        self.source_call(move |s| {
            let n = n.clone();
            let t = t.clone();
            async move { s.create_partial_snapshot(&n, &t, &[]).await }
        })
        .await?;
        self.poll_backup(&name).await?;

        let n = name.clone();
        let seq = self
            .source_call(move |s| {
                let n = n.clone();
                async move { s.snapshot_commit_seq(&n).await }
            })
            .await?;

        let staging = staging_name(table);
        let s = staging.clone();
        let staging_exists = self
            .dest_call(move |d| {
                let s = s.clone();
                async move { d.table_exists(&s).await }
            })
            .await?;
        if staging_exists {
            let s = staging.clone();
            self.dest_call(move |d| {
                let s = s.clone();
                async move { d.drop_table(&s, true).await }
            })
            .await?;
        }

        self.restore_with_mismatch_retry(&name, Some(staging.clone())).await?;

        // Atomic cutover: the staging table replaces the live one.
        let t = table.to_string();
        let s = staging;
        self.dest_call(move |d| {
            let t = t.clone();
            let s = s.clone();
            async move {
                d.apply_schema_change(&t, &RecordKind::ReplaceTable { with: s.clone(), swap: false })
                    .await
            }
        })
        .await?;

        if let Some(snap) = self.snapshots.current_mut() {
            snap.status = SnapshotStatus::Restored;
            snap.commit_seq = Some(seq);
        }
        self.retire_snapshot().await;
        Ok(seq)
    }

    // ---- Shared machinery --------------------------------------------------

    /// The job's table set: the scoped table, or every source table.
    async fn scope_tables(&mut self) -> Result<Vec<String>> {
        if let Some(table) = self.persisted.config.scope.table() {
            return Ok(vec![table.to_string()]);
        }
        self.source_call(|s| async move { s.all_tables().await }).await
    }

    /// Retry wrapper for source-adapter calls.
    async fn source_call<T, F, Fut>(&mut self, op: F) -> Result<T>
    where
        F: Fn(Arc<dyn ClusterAdapter>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let adapter = self.source.clone();
        self.retrying(move || op(adapter.clone())).await
    }

    /// Retry wrapper for destination-adapter calls.
    async fn dest_call<T, F, Fut>(&mut self, op: F) -> Result<T>
    where
        F: Fn(Arc<dyn ClusterAdapter>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let adapter = self.dest.clone();
        self.retrying(move || op(adapter.clone())).await
    }

    /// Run a fallible operation under the fault policy: drain pending
    /// re-resolution signals first, retry transient and lock faults with
    /// bounded backoff, and propagate everything else.
    async fn retrying<T, F, Fut>(&mut self, op: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        loop {
            self.checkpoint().await?;
            self.reresolve_pending().await;

            match op().await {
                Ok(value) => {
                    self.budget.record_success();
                    return Ok(value);
                }
                Err(e) => {
                    if e.wants_reresolve() {
                        // The event may not have been routed yet; refresh
                        // both ends before the retry decision.
                        let _ = self.source.refresh_leader().await;
                        let _ = self.dest.refresh_leader().await;
                    }
                    let class = e.fault_class();
                    match class {
                        FaultClass::Transient | FaultClass::Lock => {
                            if !self.budget.within_budget(class, &self.retry) {
                                return Err(e);
                            }
                            let attempt = self.budget.record_failure(class);
                            debug!(fault = %e, attempt, "retrying after transient fault");
                            tokio::time::sleep(self.retry.compute_backoff(attempt - 1)).await;
                        }
                        _ => return Err(e),
                    }
                }
            }
        }
    }

    async fn reresolve_pending(&mut self) {
        for side in self.bridge.drain_pending() {
            let adapter = match side {
                ClusterSide::Source => &self.source,
                ClusterSide::Dest => &self.dest,
            };
            debug!(?side, "re-resolving adapter leader");
            if let Err(e) = adapter.refresh_leader().await {
                warn!(?side, error = %e, "leader re-resolution failed");
            }
        }
    }

    /// Safe checkpoint: observes stop and pause before the next mutation.
    async fn checkpoint(&mut self) -> Result<()> {
        if self.control.is_stopped() {
            return Err(SyncError::Cancelled);
        }
        if self.control.is_paused() {
            self.set_state(JobState::Paused);
            while self.control.is_paused() {
                if self.control.is_stopped() {
                    return Err(SyncError::Cancelled);
                }
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
            self.set_state(JobState::Running);
        }
        Ok(())
    }

    /// Drop the in-flight snapshot after a failed attempt, best-effort.
    async fn abandon_snapshot(&mut self) {
        if let Some(mut snap) = self.snapshots.finish() {
            snap.status = SnapshotStatus::Failed;
            let _ = self.source.drop_snapshot(&snap.name).await;
        }
    }

    /// Drop the retired snapshot after a confirmed restore, best-effort.
    async fn retire_snapshot(&mut self) {
        if let Some(snap) = self.snapshots.finish() {
            if let Err(e) = self.source.drop_snapshot(&snap.name).await {
                debug!(snapshot = %snap.name, error = %e, "retired snapshot cleanup failed");
            }
        }
    }

    fn set_state(&mut self, state: JobState) {
        self.persisted.state = state;
        self.publish_status();
    }

    async fn persist(&mut self) -> Result<()> {
        self.store.save(&self.persisted).await?;
        self.publish_status();
        Ok(())
    }

    fn publish_status(&self) {
        let phase_kind = if self.persisted.state == JobState::Initializing {
            SyncPhaseKind::Init
        } else {
            self.persisted.phase.kind()
        };
        let detail = match &self.persisted.phase {
            JobPhase::PartialSync { tables } => Some(tables.join(",")),
            _ => None,
        };
        let progress = format_progress(
            self.persisted.config.scope.kind(),
            phase_kind,
            detail.as_deref(),
        );
        if let Ok(mut status) = self.status.write() {
            status.state = self.persisted.state.clone();
            status.progress = progress;
        }
    }
}

/// Staging object name used for partial-sync cutover.
pub fn staging_name(table: &str) -> String {
    format!("__ccr_stage_{table}")
}

/// Delay between completion polls: bounded exponential, no jitter, capped
/// well below the retry backoff ceiling.
fn poll_delay(retry: &RetryConfig, poll: u32) -> Duration {
    let base = retry.initial_backoff.as_millis() as u64;
    let capped = (base << poll.min(5)).min(5_000);
    Duration::from_millis(capped)
}
