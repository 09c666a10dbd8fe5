//! Capabilities the log syncer consumes but does not implement: the link to the remote cluster,
//! the local cluster coordinator, and the policy for picking a snapshot source.

use crate::api::configuration::MachineConfig;
use crate::api::state_machine::SnapshotDescriptor;
use crate::api::stop_signal::StopSignal;
use crate::api::types::{CommittedBatch, SyncedState};

/// RemoteLogSender is the network boundary to the remote cluster. Implementations own their retry
/// backoff; every waiting call should give up when `stop` fires.
#[async_trait::async_trait]
pub trait RemoteLogSender: Send + Sync {
    /// The highest local `(term, index)` the remote cluster has replayed.
    async fn remote_synced_state(&self, stop: &StopSignal) -> Result<SyncedState, RemoteSendError>;

    /// Deliver `batches` in order. Re-delivering a batch the remote already holds must be harmless.
    async fn send_batches(&self, batches: &[CommittedBatch], stop: &StopSignal) -> Result<(), RemoteSendError>;

    /// Ask the remote cluster to install `snapshot` by pulling it from `source`.
    async fn notify_transfer_snapshot(
        &self,
        snapshot: &SnapshotDescriptor,
        source: &BackupSource,
    ) -> Result<(), RemoteSendError>;

    /// Wait until the remote cluster reports `snapshot` as applied.
    async fn wait_apply_snapshot(&self, snapshot: &SnapshotDescriptor, stop: &StopSignal)
        -> Result<(), RemoteSendError>;

    fn stop(&self);
}

#[derive(Debug, thiserror::Error)]
pub enum RemoteSendError {
    #[error("Remote cluster unreachable: {0}")]
    Unreachable(String),

    #[error("Remote cluster rejected request: {0}")]
    Rejected(String),

    #[error("Remote sender is stopped")]
    Stopped,
}

/// ClusterInfo is the local view of the cluster coordination service.
pub trait ClusterInfo: Send + Sync {
    fn cluster_name(&self) -> String;

    /// Replicas of `namespace` that may serve snapshot data.
    fn snapshot_sync_sources(&self, namespace: &str) -> Result<Vec<SnapshotSyncSource>, ClusterInfoError>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SnapshotSyncSource {
    pub replica_id: u64,
    pub remote_addr: String,
    pub http_api_port: u16,
    pub data_root: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ClusterInfoError {
    #[error("Cluster coordinator unavailable: {0}")]
    Unavailable(String),
}

/// BackupLocator picks where the remote cluster should pull snapshot data from.
#[async_trait::async_trait]
pub trait BackupLocator: Send + Sync {
    /// `None` means no viable source for this attempt.
    async fn select_source(&self, query: BackupQuery<'_>, stop: &StopSignal) -> Option<BackupSource>;
}

pub struct BackupQuery<'a> {
    pub machine_config: &'a MachineConfig,
    pub cluster_info: &'a dyn ClusterInfo,
    pub namespace: &'a str,
    pub local_id: u64,
    pub snapshot: &'a SnapshotDescriptor,
    /// Zero based.
    pub attempt: u32,
    /// Never pick the local replica.
    pub force_remote: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackupSource {
    pub addr: String,
    pub dir: String,
}
