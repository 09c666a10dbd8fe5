#![allow(dead_code)]

use raft_log_syncer::{
    BackupLocator, BackupQuery, BackupSource, ClusterInfo, ClusterInfoError, CommittedBatch, InMemoryRemoteCluster,
    LogSyncerConfig, LogSyncerOptions, MachineConfig, RemoteLogSender, RemoteSendError, SnapshotDescriptor,
    SnapshotSyncSource, StateMachine, StateMachineConfig, StopSignal, SyncedState,
};
use slog::Drain;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::time::Duration;

pub const NAMESPACE: &str = "ns-0";
pub const LOCAL_ID: u64 = 1;
pub const CLUSTER_NAME: &str = "cluster-a";

/// ScriptedRemote wraps the in-memory remote with failure injection, a gate that holds sends, and
/// call accounting.
pub struct ScriptedRemote {
    inner: InMemoryRemoteCluster,
    send_failures: AtomicUsize,
    ack_failures: AtomicUsize,
    send_calls: AtomicUsize,
    notify_calls: AtomicUsize,
    calls_after_stop: AtomicUsize,
    stopped: AtomicBool,
    // Origin indexes of every successful send, in call order, before the remote dedups them.
    delivered: Mutex<Vec<u64>>,
    hold_tx: watch::Sender<bool>,
    hold_rx: watch::Receiver<bool>,
}

impl ScriptedRemote {
    pub fn new() -> Self {
        Self::wrap(InMemoryRemoteCluster::new())
    }

    pub fn with_synced_state(synced: SyncedState) -> Self {
        Self::wrap(InMemoryRemoteCluster::with_synced_state(synced))
    }

    fn wrap(inner: InMemoryRemoteCluster) -> Self {
        let (hold_tx, hold_rx) = watch::channel(false);
        ScriptedRemote {
            inner,
            send_failures: AtomicUsize::new(0),
            ack_failures: AtomicUsize::new(0),
            send_calls: AtomicUsize::new(0),
            notify_calls: AtomicUsize::new(0),
            calls_after_stop: AtomicUsize::new(0),
            stopped: AtomicBool::new(false),
            delivered: Mutex::new(Vec::new()),
            hold_tx,
            hold_rx,
        }
    }

    pub fn fail_next_sends(&self, count: usize) {
        self.send_failures.store(count, Ordering::SeqCst);
    }

    pub fn fail_next_acks(&self, count: usize) {
        self.ack_failures.store(count, Ordering::SeqCst);
    }

    /// While held, sends block until released or the caller's stop signal fires.
    pub fn hold_sends(&self, hold: bool) {
        let _ = self.hold_tx.send(hold);
    }

    pub fn send_calls(&self) -> usize {
        self.send_calls.load(Ordering::SeqCst)
    }

    pub fn notify_calls(&self) -> usize {
        self.notify_calls.load(Ordering::SeqCst)
    }

    pub fn calls_after_stop(&self) -> usize {
        self.calls_after_stop.load(Ordering::SeqCst)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub fn applied_indexes(&self) -> Vec<u64> {
        self.inner
            .applied_batches()
            .iter()
            .map(|batch| batch.origin_index.as_u64())
            .collect()
    }

    pub fn delivered_indexes(&self) -> Vec<u64> {
        self.delivered.lock().unwrap().clone()
    }

    pub fn applied_batches(&self) -> Vec<CommittedBatch> {
        self.inner.applied_batches()
    }

    pub fn installed_snapshots(&self) -> Vec<(SnapshotDescriptor, BackupSource)> {
        self.inner.installed_snapshots()
    }

    fn record_call(&self) {
        if self.is_stopped() {
            self.calls_after_stop.fetch_add(1, Ordering::SeqCst);
        }
    }

    async fn wait_released(&self, stop: &StopSignal) -> Result<(), RemoteSendError> {
        let mut hold_rx = self.hold_rx.clone();
        while *hold_rx.borrow() {
            tokio::select! {
                _ = stop.stopped() => return Err(RemoteSendError::Stopped),
                changed = hold_rx.changed() => {
                    if changed.is_err() {
                        return Ok(());
                    }
                }
            }
        }
        Ok(())
    }
}

fn take_failure(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait::async_trait]
impl RemoteLogSender for ScriptedRemote {
    async fn remote_synced_state(&self, stop: &StopSignal) -> Result<SyncedState, RemoteSendError> {
        self.record_call();
        self.inner.remote_synced_state(stop).await
    }

    async fn send_batches(&self, batches: &[CommittedBatch], stop: &StopSignal) -> Result<(), RemoteSendError> {
        self.record_call();
        self.send_calls.fetch_add(1, Ordering::SeqCst);
        self.wait_released(stop).await?;

        if take_failure(&self.send_failures) {
            return Err(RemoteSendError::Unreachable("injected send failure".into()));
        }
        self.inner.send_batches(batches, stop).await?;

        self.delivered
            .lock()
            .unwrap()
            .extend(batches.iter().map(|batch| batch.origin_index.as_u64()));
        Ok(())
    }

    async fn notify_transfer_snapshot(
        &self,
        snapshot: &SnapshotDescriptor,
        source: &BackupSource,
    ) -> Result<(), RemoteSendError> {
        self.record_call();
        self.notify_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.notify_transfer_snapshot(snapshot, source).await
    }

    async fn wait_apply_snapshot(&self, snapshot: &SnapshotDescriptor, stop: &StopSignal) -> Result<(), RemoteSendError> {
        self.record_call();
        if take_failure(&self.ack_failures) {
            return Err(RemoteSendError::Rejected("injected ack failure".into()));
        }
        self.inner.wait_apply_snapshot(snapshot, stop).await
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.inner.stop();
    }
}

/// CountingLocator hands out a fixed answer and records the attempt numbers it was asked for.
pub struct CountingLocator {
    source: Option<BackupSource>,
    attempts: Mutex<Vec<u32>>,
}

impl CountingLocator {
    pub fn returning(source: Option<BackupSource>) -> Self {
        CountingLocator {
            source,
            attempts: Mutex::new(Vec::new()),
        }
    }

    pub fn attempts(&self) -> Vec<u32> {
        self.attempts.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl BackupLocator for CountingLocator {
    async fn select_source(&self, query: BackupQuery<'_>, _stop: &StopSignal) -> Option<BackupSource> {
        self.attempts.lock().unwrap().push(query.attempt);
        self.source.clone()
    }
}

pub struct StaticClusterInfo;

impl ClusterInfo for StaticClusterInfo {
    fn cluster_name(&self) -> String {
        CLUSTER_NAME.into()
    }

    fn snapshot_sync_sources(&self, _namespace: &str) -> Result<Vec<SnapshotSyncSource>, ClusterInfoError> {
        Ok(vec![SnapshotSyncSource {
            replica_id: 2,
            remote_addr: "10.0.0.2".into(),
            http_api_port: 8080,
            data_root: "/data".into(),
        }])
    }
}

pub fn peer_backup_source() -> BackupSource {
    BackupSource {
        addr: "10.0.0.2:8080".into(),
        dir: "/data/ns-0".into(),
    }
}

pub fn test_options() -> LogSyncerOptions {
    LogSyncerOptions {
        snapshot_drain_timeout: Some(Duration::from_millis(300)),
        restore_retry_backoff: Some(Duration::from_millis(10)),
        send_retry_interval: Some(Duration::from_millis(5)),
        ..LogSyncerOptions::default()
    }
}

pub struct Harness {
    pub remote: Arc<ScriptedRemote>,
    pub locator: Arc<CountingLocator>,
    pub cluster_info: Option<Arc<dyn ClusterInfo>>,
    pub options: LogSyncerOptions,
}

impl Harness {
    pub fn new(remote: ScriptedRemote) -> Self {
        Harness {
            remote: Arc::new(remote),
            locator: Arc::new(CountingLocator::returning(Some(peer_backup_source()))),
            cluster_info: Some(Arc::new(StaticClusterInfo)),
            options: test_options(),
        }
    }

    pub fn config(&self) -> StateMachineConfig {
        StateMachineConfig::LogSyncer(LogSyncerConfig {
            namespace: NAMESPACE.into(),
            local_id: LOCAL_ID,
            machine_config: MachineConfig {
                data_root_dir: "/data".into(),
                remote_sync_cluster: "10.1.0.1:8080".into(),
            },
            cluster_info: self.cluster_info.clone(),
            remote_sender: self.remote.clone(),
            backup_locator: self.locator.clone(),
            info_logger: create_root_logger_for_stdout(LOCAL_ID.to_string()),
            options: self.options.clone(),
        })
    }

    pub fn create(&self) -> Arc<dyn StateMachine> {
        let state_machine = raft_log_syncer::try_create_state_machine(self.config()).unwrap();
        Arc::from(state_machine)
    }
}

pub fn create_root_logger_for_stdout(replica_id: String) -> slog::Logger {
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).use_file_location().build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();

    slog::Logger::root(drain, slog::o!("ReplicaId" => replica_id))
}
