use crate::api::remote::RemoteSendError;
use crate::api::stop_signal::StopSignal;
use crate::api::types::{CommittedBatch, Index, Term};
use bytes::Bytes;
use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// StateMachine is the namespace-specific view of applying the replicated log in sequential
/// consistent order. The consensus engine drives every method from its own apply stream; the
/// apply, snapshot and restore methods are never called concurrently with each other for the same
/// instance.
///
/// Which implementation backs a namespace (a storage engine, or a log syncer relaying to another
/// cluster) is decided once at construction time, see `try_create_state_machine`.
#[async_trait::async_trait]
pub trait StateMachine: Send + Sync {
    /// apply_committed_batch is called only when its guaranteed that the provided batch has been
    /// committed at `(term, index)`. Implementations must not do network I/O on this path. They
    /// may wait for local resources, but must give up when `stop` fires; giving up is not an
    /// error since the consensus engine replays the log after restart.
    async fn apply_committed_batch(
        &self,
        batch: CommittedBatch,
        term: Term,
        index: Index,
        stop: &StopSignal,
    ) -> Result<ApplyOutput, StateMachineError>;

    /// Produce a point-in-time cut at `(term, index)`.
    async fn get_snapshot(&self, term: Term, index: Index) -> Result<SnapshotDescriptor, StateMachineError>;

    /// Bring the state machine up to `snapshot`. `startup` is true when restoring a local snapshot
    /// while the node boots, rather than installing a leader's snapshot at runtime.
    async fn restore_from_snapshot(
        &self,
        startup: bool,
        snapshot: &SnapshotDescriptor,
        stop: &StopSignal,
    ) -> Result<(), StateMachineError>;

    async fn start(&self) -> Result<(), StateMachineError>;

    /// Idempotent. Once any call returns, the state machine does no more background work.
    async fn close(&self);

    fn stats(&self) -> StateMachineStats;
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ApplyOutput {
    /// The batch carried an administrative backup request. The caller owns the backup side effect.
    pub force_backup: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SnapshotDescriptor {
    pub term: Term,
    pub index: Index,
    pub data: Bytes,
}

impl SnapshotDescriptor {
    /// A cut with no materialized data.
    pub fn new(term: Term, index: Index) -> Self {
        SnapshotDescriptor {
            term,
            index,
            data: Bytes::new(),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
pub enum LearnerRole {
    #[serde(rename = "")]
    None,
    #[serde(rename = "role_log_syncer")]
    LogSyncer,
}

impl fmt::Display for LearnerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LearnerRole::None => write!(f, ""),
            LearnerRole::LogSyncer => write!(f, "role_log_syncer"),
        }
    }
}

/// Point-in-time counters. Safe to sample while the state machine is running.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StateMachineStats {
    pub role: LearnerRole,
    #[serde(rename = "synced")]
    pub synced_count: u64,
    pub synced_term: u64,
    pub synced_index: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum StateMachineError {
    #[error("Timed out after {0:?} waiting for buffered logs to be sent")]
    Timeout(Duration),

    // Benign: the state machine or the caller is shutting down.
    #[error("State machine is stopped")]
    Stopped,

    #[error("No snapshot source available: {0}")]
    Unavailable(String),

    #[error("Remote cluster failure: {0}")]
    Remote(#[from] RemoteSendError),

    #[error("State machine already started")]
    AlreadyStarted,
}
