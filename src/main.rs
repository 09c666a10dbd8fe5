use bytes::Bytes;
use chrono::Utc;
use raft_log_syncer::{
    stop_signal, ClusterBackupLocator, ClusterInfo, ClusterInfoError, CommittedBatch, CustomProposeData, Index,
    InMemoryRemoteCluster, InternalRequest, LogSyncerConfig, LogSyncerOptions, MachineConfig, ProposeOp,
    SnapshotDescriptor, SnapshotSyncSource, StateMachineConfig, Term,
};
use slog::Drain;
use std::error::Error;
use std::sync::Arc;

const NAMESPACE: &str = "demo-0";
const LOCAL_ID: u64 = 1;

struct DemoCluster;

impl ClusterInfo for DemoCluster {
    fn cluster_name(&self) -> String {
        "demo-cluster".into()
    }

    fn snapshot_sync_sources(&self, _namespace: &str) -> Result<Vec<SnapshotSyncSource>, ClusterInfoError> {
        Ok((1..=3)
            .map(|replica_id| SnapshotSyncSource {
                replica_id,
                remote_addr: format!("127.0.0.{}", replica_id),
                http_api_port: 18001,
                data_root: "/tmp/raft-log-syncer".into(),
            })
            .collect())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let logger = create_root_logger_for_stdout();
    let remote = Arc::new(InMemoryRemoteCluster::new());

    let state_machine = raft_log_syncer::try_create_state_machine(StateMachineConfig::LogSyncer(LogSyncerConfig {
        namespace: NAMESPACE.into(),
        local_id: LOCAL_ID,
        machine_config: MachineConfig {
            data_root_dir: "/tmp/raft-log-syncer".into(),
            remote_sync_cluster: "127.0.0.1:28001".into(),
        },
        cluster_info: Some(Arc::new(DemoCluster)),
        remote_sender: remote.clone(),
        backup_locator: Arc::new(ClusterBackupLocator::new(logger.clone())),
        info_logger: logger.clone(),
        options: LogSyncerOptions::default(),
    }))?;
    state_machine.start().await?;

    let (_stop_handle, stop) = stop_signal();
    for index in 1..=5u64 {
        let request = InternalRequest::key_value(index, Bytes::from(format!("set k{} v{}", index, index)));
        let batch = CommittedBatch::new(vec![request], Some(Utc::now()));
        state_machine
            .apply_committed_batch(batch, Term::new(1), Index::new(index), &stop)
            .await?;
    }

    let backup = InternalRequest::custom(6, CustomProposeData::new(ProposeOp::Backup).encode()?);
    let output = state_machine
        .apply_committed_batch(
            CommittedBatch::new(vec![backup], Some(Utc::now())),
            Term::new(1),
            Index::new(6),
            &stop,
        )
        .await?;
    slog::info!(logger, "Backup requested by log: {}", output.force_backup);

    let snapshot = state_machine.get_snapshot(Term::new(1), Index::new(6)).await?;
    slog::info!(logger, "Snapshot cut at ({:?}, {:?})", snapshot.term, snapshot.index);

    // A leader snapshot further ahead than anything forwarded so far.
    state_machine
        .restore_from_snapshot(false, &SnapshotDescriptor::new(Term::new(2), Index::new(40)), &stop)
        .await?;

    println!("{}", serde_json::to_string_pretty(&state_machine.stats())?);
    println!(
        "remote applied {} batches, installed {} snapshots",
        remote.applied_batches().len(),
        remote.installed_snapshots().len()
    );

    state_machine.close().await;
    Ok(())
}

fn create_root_logger_for_stdout() -> slog::Logger {
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).use_file_location().build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();

    slog::Logger::root(drain, slog::o!("Node" => "demo"))
}
