use crate::api::{
    BackupLocator, BackupQuery, BackupSource, ClusterInfo, MachineConfig, RemoteLogSender, RemoteSendError,
    SnapshotDescriptor, StateMachineError, StopSignal,
};
use std::future::Future;
use tokio::time::Duration;

/// SnapshotInstaller has the remote cluster install a snapshot pulled from a backup source picked
/// by the locator. Each attempt selects a fresh source; attempts are strictly bounded.
pub(super) struct SnapshotInstaller<'a> {
    pub(super) logger: &'a slog::Logger,
    pub(super) remote: &'a dyn RemoteLogSender,
    pub(super) locator: &'a dyn BackupLocator,
    pub(super) machine_config: &'a MachineConfig,
    pub(super) cluster_info: &'a dyn ClusterInfo,
    pub(super) namespace: &'a str,
    pub(super) local_id: u64,
    pub(super) force_remote: bool,
    pub(super) max_attempts: u32,
    pub(super) retry_backoff: Duration,
    pub(super) shutdown: &'a StopSignal,
}

#[derive(Debug, thiserror::Error)]
enum AttemptError {
    #[error("no backup available from other replicas")]
    NoSource,
    #[error("notify transfer from {0:?} failed: {1}")]
    Notify(BackupSource, RemoteSendError),
    #[error("wait apply from {0:?} failed: {1}")]
    WaitApply(BackupSource, RemoteSendError),
    #[error("stopped")]
    Stopped,
}

impl SnapshotInstaller<'_> {
    pub(super) async fn install(&self, snapshot: &SnapshotDescriptor, stop: &StopSignal) -> Result<(), StateMachineError> {
        let mut last_error = AttemptError::NoSource;
        for attempt in 0..self.max_attempts {
            match self.try_install(snapshot, attempt, stop).await {
                Ok(source) => {
                    slog::info!(
                        self.logger,
                        "Remote applied snapshot ({:?}, {:?}) from {:?}",
                        snapshot.term,
                        snapshot.index,
                        source
                    );
                    return Ok(());
                }
                Err(AttemptError::Stopped) => return Err(StateMachineError::Stopped),
                Err(e) => {
                    slog::info!(
                        self.logger,
                        "Snapshot ({:?}, {:?}) attempt {} failed: {}",
                        snapshot.term,
                        snapshot.index,
                        attempt,
                        e
                    );
                    last_error = e;
                }
            }

            if attempt + 1 < self.max_attempts {
                self.race_stop(stop, tokio::time::sleep(self.retry_backoff))
                    .await
                    .map_err(|_| StateMachineError::Stopped)?;
            }
        }

        Err(StateMachineError::Unavailable(format!(
            "gave up after {} attempts, last error: {}",
            self.max_attempts, last_error
        )))
    }

    async fn try_install(
        &self,
        snapshot: &SnapshotDescriptor,
        attempt: u32,
        stop: &StopSignal,
    ) -> Result<BackupSource, AttemptError> {
        let query = BackupQuery {
            machine_config: self.machine_config,
            cluster_info: self.cluster_info,
            namespace: self.namespace,
            local_id: self.local_id,
            snapshot,
            attempt,
            force_remote: self.force_remote,
        };
        let source = self
            .race_stop(stop, self.locator.select_source(query, stop))
            .await?
            .ok_or(AttemptError::NoSource)?;

        self.race_stop(stop, self.remote.notify_transfer_snapshot(snapshot, &source))
            .await?
            .map_err(|e| AttemptError::Notify(source.clone(), e))?;

        self.race_stop(stop, self.remote.wait_apply_snapshot(snapshot, stop))
            .await?
            .map_err(|e| AttemptError::WaitApply(source.clone(), e))?;

        Ok(source)
    }

    /// Run `fut` unless the caller's `stop` or the syncer's shutdown fires first.
    async fn race_stop<F: Future>(&self, stop: &StopSignal, fut: F) -> Result<F::Output, AttemptError> {
        tokio::select! {
            biased;
            _ = stop.stopped() => Err(AttemptError::Stopped),
            _ = self.shutdown.stopped() => Err(AttemptError::Stopped),
            output = fut => Ok(output),
        }
    }
}
