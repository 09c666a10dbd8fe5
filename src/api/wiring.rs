use crate::api::configuration::MachineConfig;
use crate::api::options::{LogSyncerOptions, LogSyncerOptionsValidated};
use crate::api::remote::{BackupLocator, ClusterInfo, RemoteLogSender};
use crate::api::state_machine::StateMachine;
use crate::syncer::{LogSyncer, LogSyncerParts};
use std::convert::TryFrom;
use std::sync::Arc;

pub struct LogSyncerConfig {
    pub namespace: String,
    pub local_id: u64,
    pub machine_config: MachineConfig,
    // `None` for isolated deployments without a cluster coordinator.
    pub cluster_info: Option<Arc<dyn ClusterInfo>>,
    pub remote_sender: Arc<dyn RemoteLogSender>,
    pub backup_locator: Arc<dyn BackupLocator>,
    pub info_logger: slog::Logger,
    pub options: LogSyncerOptions,
}

/// Which state machine backs a namespace. Chosen once, when the namespace is created.
pub enum StateMachineConfig {
    /// An already constructed storage-backed state machine; passed through as is.
    Storage(Box<dyn StateMachine>),
    LogSyncer(LogSyncerConfig),
}

#[derive(Debug, thiserror::Error)]
pub enum StateMachineCreationError {
    #[error("Illegal options for configuring log syncer: {0}")]
    IllegalOptions(String),
    #[error("Log syncer requires a remote sync cluster address")]
    MissingRemoteCluster,
}

pub fn try_create_state_machine(
    config: StateMachineConfig,
) -> Result<Box<dyn StateMachine>, StateMachineCreationError> {
    match config {
        StateMachineConfig::Storage(state_machine) => Ok(state_machine),
        StateMachineConfig::LogSyncer(config) => {
            let log_syncer = create_log_syncer(config)?;
            Ok(Box::new(log_syncer))
        }
    }
}

fn create_log_syncer(config: LogSyncerConfig) -> Result<LogSyncer, StateMachineCreationError> {
    if config.machine_config.remote_sync_cluster.is_empty() {
        return Err(StateMachineCreationError::MissingRemoteCluster);
    }

    let options = LogSyncerOptionsValidated::try_from(config.options)
        .map_err(|e| StateMachineCreationError::IllegalOptions(e.to_string()))?;

    slog::info!(
        config.info_logger,
        "Creating log syncer for namespace {} replica {}, remote cluster {}",
        config.namespace,
        config.local_id,
        config.machine_config.remote_sync_cluster
    );

    Ok(LogSyncer::new(LogSyncerParts {
        logger: config.info_logger,
        namespace: config.namespace,
        local_id: config.local_id,
        machine_config: config.machine_config,
        cluster_info: config.cluster_info,
        remote: config.remote_sender,
        backup_locator: config.backup_locator,
        options,
    }))
}
