mod api;
mod backup;
mod remote;
mod syncer;

pub use api::stop_signal;
pub use api::try_create_state_machine;
pub use api::ApplyOutput;
pub use api::BackupLocator;
pub use api::BackupQuery;
pub use api::BackupSource;
pub use api::BatchSource;
pub use api::ClusterInfo;
pub use api::ClusterInfoError;
pub use api::CommittedBatch;
pub use api::CustomProposeData;
pub use api::Index;
pub use api::InternalRequest;
pub use api::LearnerRole;
pub use api::LogSyncerConfig;
pub use api::LogSyncerOptions;
pub use api::MachineConfig;
pub use api::ProposeOp;
pub use api::RemoteLogSender;
pub use api::RemoteSendError;
pub use api::RequestDataType;
pub use api::RequestHeader;
pub use api::SnapshotDescriptor;
pub use api::SnapshotSyncSource;
pub use api::StateMachine;
pub use api::StateMachineConfig;
pub use api::StateMachineCreationError;
pub use api::StateMachineError;
pub use api::StateMachineStats;
pub use api::StopHandle;
pub use api::StopSignal;
pub use api::SyncedState;
pub use api::Term;
pub use backup::ClusterBackupLocator;
pub use remote::InMemoryRemoteCluster;

