//! This mod is meant to hold most of the code for the library's client-facing API.
mod configuration;
mod options;
mod propose;
mod remote;
mod state_machine;
mod stop_signal;
mod types;
mod wiring;

pub use configuration::MachineConfig;
pub use options::LogSyncerOptions;
pub use propose::CustomProposeData;
pub use propose::ProposeOp;
pub use remote::BackupLocator;
pub use remote::BackupQuery;
pub use remote::BackupSource;
pub use remote::ClusterInfo;
pub use remote::ClusterInfoError;
pub use remote::RemoteLogSender;
pub use remote::RemoteSendError;
pub use remote::SnapshotSyncSource;
pub use state_machine::ApplyOutput;
pub use state_machine::LearnerRole;
pub use state_machine::SnapshotDescriptor;
pub use state_machine::StateMachine;
pub use state_machine::StateMachineError;
pub use state_machine::StateMachineStats;
pub use stop_signal::stop_signal;
pub use stop_signal::StopHandle;
pub use stop_signal::StopSignal;
pub use types::BatchSource;
pub use types::CommittedBatch;
pub use types::Index;
pub use types::InternalRequest;
pub use types::RequestDataType;
pub use types::RequestHeader;
pub use types::SyncedState;
pub use types::Term;
pub use wiring::try_create_state_machine;
pub use wiring::LogSyncerConfig;
pub use wiring::StateMachineConfig;
pub use wiring::StateMachineCreationError;

// So the syncer can read validated options.
pub(crate) use options::LogSyncerOptionsValidated;
