use crate::api::{
    stop_signal, ApplyOutput, BackupLocator, ClusterInfo, CommittedBatch, Index, LearnerRole, LogSyncerOptionsValidated,
    MachineConfig, RemoteLogSender, SnapshotDescriptor, StateMachine, StateMachineError, StateMachineStats,
    StopHandle, StopSignal, Term,
};
use crate::syncer::force_backup;
use crate::syncer::outbound_queue::OutboundQueue;
use crate::syncer::progress::SyncProgress;
use crate::syncer::restore::SnapshotInstaller;
use crate::syncer::send_loop::SendLoop;
use std::{future, mem};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};

pub(crate) struct LogSyncerParts {
    pub logger: slog::Logger,
    pub namespace: String,
    pub local_id: u64,
    pub machine_config: MachineConfig,
    pub cluster_info: Option<Arc<dyn ClusterInfo>>,
    pub remote: Arc<dyn RemoteLogSender>,
    pub backup_locator: Arc<dyn BackupLocator>,
    pub options: LogSyncerOptionsValidated,
}

/// LogSyncer is the state machine of a log syncer learner. Instead of materializing committed
/// batches, it relays them in commit order to a remote cluster.
///
/// Applying only enqueues; a single background send loop owns the remote link. Snapshots are a
/// drain barrier over that queue, and restoring a snapshot means having the remote cluster install
/// it unless the remote is already past it.
pub(crate) struct LogSyncer {
    logger: slog::Logger,
    namespace: String,
    local_id: u64,
    machine_config: MachineConfig,
    cluster_info: Option<Arc<dyn ClusterInfo>>,
    remote: Arc<dyn RemoteLogSender>,
    backup_locator: Arc<dyn BackupLocator>,
    options: LogSyncerOptionsValidated,

    queue: Arc<OutboundQueue>,
    progress: Arc<SyncProgress>,

    stopping: AtomicBool,
    shutdown_handle: StopHandle,
    shutdown: StopSignal,
    send_task: Mutex<SendTask>,
}

enum SendTask {
    NotStarted,
    Running(JoinHandle<()>),
    Exited,
}

impl LogSyncer {
    pub(crate) fn new(parts: LogSyncerParts) -> Self {
        let (shutdown_handle, shutdown) = stop_signal();
        let logger = parts.logger.new(slog::o!(
            "namespace" => parts.namespace.clone(),
            "local_id" => parts.local_id,
        ));

        LogSyncer {
            logger,
            namespace: parts.namespace,
            local_id: parts.local_id,
            machine_config: parts.machine_config,
            cluster_info: parts.cluster_info,
            remote: parts.remote,
            backup_locator: parts.backup_locator,
            queue: Arc::new(OutboundQueue::new(parts.options.send_buffer_len)),
            options: parts.options,
            progress: Arc::new(SyncProgress::new()),
            stopping: AtomicBool::new(false),
            shutdown_handle,
            shutdown,
            send_task: Mutex::new(SendTask::NotStarted),
        }
    }

    /// Wait until every batch accepted so far has been delivered to (or skipped as already held by)
    /// the remote cluster. `None` waits without a deadline. `stop` lets the caller abort the wait.
    async fn wait_buffered_logs_drained(
        &self,
        timeout: Option<Duration>,
        stop: Option<&StopSignal>,
    ) -> Result<(), StateMachineError> {
        slog::info!(
            self.logger,
            "Waiting for {} buffered send logs, timeout: {:?}",
            self.queue.len(),
            timeout
        );
        let deadline = timeout.map(|t| Instant::now() + t);
        let timed_out = || StateMachineError::Timeout(timeout.unwrap_or_default());

        let slot = tokio::select! {
            biased;
            _ = self.shutdown.stopped() => return Err(StateMachineError::Stopped),
            _ = stopped(stop) => return Err(StateMachineError::Stopped),
            _ = sleep_until(deadline) => return Err(timed_out()),
            slot = self.queue.reserve_drain_slot() => slot.map_err(|_| StateMachineError::Stopped)?,
        };
        let drained = self.queue.submit_drain_request(slot);

        tokio::select! {
            biased;
            _ = self.shutdown.stopped() => Err(StateMachineError::Stopped),
            _ = stopped(stop) => Err(StateMachineError::Stopped),
            _ = sleep_until(deadline) => Err(timed_out()),
            result = drained => result.map_err(|_| StateMachineError::Stopped),
        }
    }

    fn origin_cluster(&self) -> String {
        self.cluster_info
            .as_ref()
            .map(|c| c.cluster_name())
            .unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl StateMachine for LogSyncer {
    async fn apply_committed_batch(
        &self,
        batch: CommittedBatch,
        term: Term,
        index: Index,
        stop: &StopSignal,
    ) -> Result<ApplyOutput, StateMachineError> {
        slog::debug!(
            self.logger,
            "Applying in log syncer: {} requests at ({:?}, {:?})",
            batch.requests.len(),
            term,
            index
        );

        let batch = batch.stamp_for_forwarding(term, index, self.origin_cluster());
        if batch.timestamp.is_none() {
            slog::error!(
                self.logger,
                "Missing timestamp in raft request {} at ({:?}, {:?})",
                batch.request_id,
                term,
                index
            );
        }

        let force_backup = force_backup::contains_force_backup(&self.logger, &batch);

        // Aborting is benign. The consensus engine replays this entry after restart.
        tokio::select! {
            biased;
            _ = stop.stopped() => return Ok(ApplyOutput::default()),
            _ = self.shutdown.stopped() => return Ok(ApplyOutput::default()),
            pushed = self.queue.push(batch) => {
                if pushed.is_err() {
                    return Ok(ApplyOutput::default());
                }
            }
        }

        Ok(ApplyOutput { force_backup })
    }

    async fn get_snapshot(&self, term: Term, index: Index) -> Result<SnapshotDescriptor, StateMachineError> {
        // Nothing to materialize. The cut is consistent once everything before it has left the queue.
        self.wait_buffered_logs_drained(Some(self.options.snapshot_drain_timeout), None)
            .await?;

        Ok(SnapshotDescriptor::new(term, index))
    }

    async fn restore_from_snapshot(
        &self,
        startup: bool,
        snapshot: &SnapshotDescriptor,
        stop: &StopSignal,
    ) -> Result<(), StateMachineError> {
        slog::info!(
            self.logger,
            "Restore snapshot ({:?}, {:?}), startup: {}",
            snapshot.term,
            snapshot.index,
            startup
        );

        let remote_state = tokio::select! {
            biased;
            _ = stop.stopped() => return Err(StateMachineError::Stopped),
            _ = self.shutdown.stopped() => return Err(StateMachineError::Stopped),
            remote_state = self.remote.remote_synced_state(stop) => remote_state?,
        };
        if remote_state.is_strictly_newer_than(snapshot.term, snapshot.index) {
            slog::info!(
                self.logger,
                "Ignored restore snapshot since remote has newer raft {:?} than ({:?}, {:?})",
                remote_state,
                snapshot.term,
                snapshot.index
            );
            return Ok(());
        }

        let cluster_info = match &self.cluster_info {
            Some(cluster_info) => cluster_info,
            None => {
                // No coordinator means an isolated deployment; there is nobody to pull a backup from.
                slog::info!(
                    self.logger,
                    "No cluster info, skipping restore of ({:?}, {:?})",
                    snapshot.term,
                    snapshot.index
                );
                return Ok(());
            }
        };

        slog::info!(self.logger, "Waiting for buffered send logs before restoring snapshot");
        self.wait_buffered_logs_drained(None, Some(stop)).await?;

        let installer = SnapshotInstaller {
            logger: &self.logger,
            remote: self.remote.as_ref(),
            locator: self.backup_locator.as_ref(),
            machine_config: &self.machine_config,
            cluster_info: cluster_info.as_ref(),
            namespace: &self.namespace,
            local_id: self.local_id,
            force_remote: self.options.force_remote_backup,
            max_attempts: self.options.restore_max_attempts,
            retry_backoff: self.options.restore_retry_backoff,
            shutdown: &self.shutdown,
        };
        installer.install(snapshot, stop).await?;

        // Bulk install, so the watermark jumps rather than stepping through each entry.
        self.progress.advance_to(snapshot.term, snapshot.index);
        slog::info!(
            self.logger,
            "Apply snapshot ({:?}, {:?}) done",
            snapshot.term,
            snapshot.index
        );

        Ok(())
    }

    async fn start(&self) -> Result<(), StateMachineError> {
        let mut send_task = self.send_task.lock().await;
        match *send_task {
            SendTask::NotStarted => {}
            SendTask::Running(_) => return Err(StateMachineError::AlreadyStarted),
            SendTask::Exited => return Err(StateMachineError::Stopped),
        }
        // Checked under the lock so a concurrent close() either sees the task or prevents it.
        if self.stopping.load(Ordering::Acquire) {
            return Err(StateMachineError::Stopped);
        }

        let send_loop = SendLoop {
            logger: self.logger.clone(),
            queue: self.queue.clone(),
            progress: self.progress.clone(),
            remote: self.remote.clone(),
            shutdown: self.shutdown.clone(),
            max_batch_len: self.options.max_batch_len,
            retry_interval: self.options.send_retry_interval,
        };
        *send_task = SendTask::Running(tokio::spawn(send_loop.run()));

        Ok(())
    }

    async fn close(&self) {
        if self
            .stopping
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            slog::info!(self.logger, "Closing log syncer");
            self.shutdown_handle.stop();
        }

        // Every caller waits here, so the send loop has exited by the time any close() returns.
        let mut send_task = self.send_task.lock().await;
        if let SendTask::Running(task) = mem::replace(&mut *send_task, SendTask::Exited) {
            if let Err(e) = task.await {
                slog::error!(self.logger, "Send loop task failed: {}", e);
            }
        }
    }

    fn stats(&self) -> StateMachineStats {
        let synced = self.progress.synced_state();

        StateMachineStats {
            role: LearnerRole::LogSyncer,
            synced_count: self.progress.synced_count(),
            synced_term: synced.term.as_u64(),
            synced_index: synced.index.as_u64(),
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => future::pending().await,
    }
}

async fn stopped(stop: Option<&StopSignal>) {
    match stop {
        Some(stop) => stop.stopped().await,
        None => future::pending().await,
    }
}
