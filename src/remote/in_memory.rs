use crate::api::{
    BackupSource, CommittedBatch, RemoteLogSender, RemoteSendError, SnapshotDescriptor, StopSignal, SyncedState,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

/// InMemoryRemoteCluster is a loopback remote for local runs and tests. It replays forwarded
/// batches into a list, ignoring anything its watermark already covers, and installs snapshots
/// through the same notify-then-acknowledge handshake a real remote cluster uses.
pub struct InMemoryRemoteCluster {
    state: Mutex<RemoteState>,
    stopped: AtomicBool,
}

#[derive(Default)]
struct RemoteState {
    synced: SyncedState,
    applied: Vec<CommittedBatch>,
    pending_transfer: Option<(SnapshotDescriptor, BackupSource)>,
    installed: Vec<(SnapshotDescriptor, BackupSource)>,
}

impl InMemoryRemoteCluster {
    pub fn new() -> Self {
        InMemoryRemoteCluster {
            state: Mutex::new(RemoteState::default()),
            stopped: AtomicBool::new(false),
        }
    }

    /// A remote that has already replayed everything up to `synced`.
    pub fn with_synced_state(synced: SyncedState) -> Self {
        let remote = Self::new();
        remote.lock_state().synced = synced;
        remote
    }

    pub fn synced_state(&self) -> SyncedState {
        self.lock_state().synced
    }

    pub fn applied_batches(&self) -> Vec<CommittedBatch> {
        self.lock_state().applied.clone()
    }

    pub fn installed_snapshots(&self) -> Vec<(SnapshotDescriptor, BackupSource)> {
        self.lock_state().installed.clone()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    fn check_running(&self) -> Result<(), RemoteSendError> {
        if self.is_stopped() {
            return Err(RemoteSendError::Stopped);
        }
        Ok(())
    }

    fn lock_state(&self) -> MutexGuard<RemoteState> {
        self.state.lock().expect("InMemoryRemoteCluster mutex guard poison")
    }
}

impl Default for InMemoryRemoteCluster {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl RemoteLogSender for InMemoryRemoteCluster {
    async fn remote_synced_state(&self, _stop: &StopSignal) -> Result<SyncedState, RemoteSendError> {
        self.check_running()?;
        Ok(self.synced_state())
    }

    async fn send_batches(&self, batches: &[CommittedBatch], _stop: &StopSignal) -> Result<(), RemoteSendError> {
        self.check_running()?;

        let mut state = self.lock_state();
        for batch in batches {
            let (term, index) = batch.origin();
            if state.synced.covers(term, index) {
                continue;
            }
            state.applied.push(batch.clone());
            state.synced = SyncedState::new(term, index);
        }

        Ok(())
    }

    async fn notify_transfer_snapshot(
        &self,
        snapshot: &SnapshotDescriptor,
        source: &BackupSource,
    ) -> Result<(), RemoteSendError> {
        self.check_running()?;

        self.lock_state()
            .pending_transfer
            .replace((snapshot.clone(), source.clone()));
        Ok(())
    }

    async fn wait_apply_snapshot(&self, snapshot: &SnapshotDescriptor, _stop: &StopSignal) -> Result<(), RemoteSendError> {
        self.check_running()?;

        let mut state = self.lock_state();
        let matches = match &state.pending_transfer {
            Some((pending, _)) => pending.term == snapshot.term && pending.index == snapshot.index,
            None => false,
        };
        if !matches {
            return Err(RemoteSendError::Rejected(format!(
                "no transfer requested for snapshot ({:?}, {:?})",
                snapshot.term, snapshot.index
            )));
        }

        if let Some(transfer) = state.pending_transfer.take() {
            state.synced = SyncedState::new(snapshot.term, snapshot.index);
            state.installed.push(transfer);
        }
        Ok(())
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{stop_signal, Index, InternalRequest, Term};
    use bytes::Bytes;

    fn batch_at(term: u64, index: u64) -> CommittedBatch {
        CommittedBatch::new(vec![InternalRequest::key_value(index, Bytes::from_static(b"v"))], None)
            .stamp_for_forwarding(Term::new(term), Index::new(index), "local".into())
    }

    fn snapshot(term: u64, index: u64) -> SnapshotDescriptor {
        SnapshotDescriptor::new(Term::new(term), Index::new(index))
    }

    fn backup_source() -> BackupSource {
        BackupSource {
            addr: "10.0.0.2:8080".into(),
            dir: "/data/ns-0".into(),
        }
    }

    #[tokio::test]
    async fn redelivery_is_ignored() {
        let remote = InMemoryRemoteCluster::new();
        let (_stop_handle, stop) = stop_signal();

        remote.send_batches(&[batch_at(1, 1), batch_at(1, 2)], &stop).await.unwrap();
        remote.send_batches(&[batch_at(1, 2), batch_at(1, 3)], &stop).await.unwrap();

        let indexes: Vec<u64> = remote
            .applied_batches()
            .iter()
            .map(|b| b.origin_index.as_u64())
            .collect();
        assert_eq!(indexes, vec![1, 2, 3]);
        assert_eq!(remote.synced_state(), SyncedState::new(Term::new(1), Index::new(3)));
    }

    #[tokio::test]
    async fn snapshot_handshake() {
        let remote = InMemoryRemoteCluster::new();
        let (_stop_handle, stop) = stop_signal();

        let unrequested = remote.wait_apply_snapshot(&snapshot(2, 20), &stop).await;
        assert!(matches!(unrequested, Err(RemoteSendError::Rejected(_))));

        remote
            .notify_transfer_snapshot(&snapshot(2, 20), &backup_source())
            .await
            .unwrap();
        remote.wait_apply_snapshot(&snapshot(2, 20), &stop).await.unwrap();

        assert_eq!(remote.synced_state(), SyncedState::new(Term::new(2), Index::new(20)));
        assert_eq!(remote.installed_snapshots(), vec![(snapshot(2, 20), backup_source())]);
    }

    #[tokio::test]
    async fn stopped_remote_refuses_calls() {
        let remote = InMemoryRemoteCluster::new();
        let (_stop_handle, stop) = stop_signal();

        remote.stop();

        assert!(remote.is_stopped());
        assert!(matches!(
            remote.send_batches(&[batch_at(1, 1)], &stop).await,
            Err(RemoteSendError::Stopped)
        ));
        assert!(matches!(
            remote.remote_synced_state(&stop).await,
            Err(RemoteSendError::Stopped)
        ));
    }
}
