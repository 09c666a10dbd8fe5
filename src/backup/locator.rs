use crate::api::{BackupLocator, BackupQuery, BackupSource, SnapshotSyncSource, StopSignal};
use std::path::Path;

/// ClusterBackupLocator asks the cluster coordinator which replicas of the namespace can serve
/// snapshot data, and rotates through them across attempts so a bad replica is not retried in a
/// row.
pub struct ClusterBackupLocator {
    logger: slog::Logger,
}

impl ClusterBackupLocator {
    pub fn new(logger: slog::Logger) -> Self {
        ClusterBackupLocator { logger }
    }

    fn candidates(&self, query: &BackupQuery<'_>) -> Vec<SnapshotSyncSource> {
        let sources = match query.cluster_info.snapshot_sync_sources(query.namespace) {
            Ok(sources) => sources,
            Err(e) => {
                slog::info!(self.logger, "Failed to list snapshot sync sources for {}: {}", query.namespace, e);
                return Vec::new();
            }
        };

        let (local, mut peers): (Vec<_>, Vec<_>) = sources
            .into_iter()
            .filter(|source| !source.remote_addr.is_empty())
            .partition(|source| source.replica_id == query.local_id);

        if query.force_remote {
            return peers;
        }

        let mut candidates = local;
        candidates.append(&mut peers);
        candidates
    }
}

#[async_trait::async_trait]
impl BackupLocator for ClusterBackupLocator {
    async fn select_source(&self, query: BackupQuery<'_>, _stop: &StopSignal) -> Option<BackupSource> {
        let candidates = self.candidates(&query);
        if candidates.is_empty() {
            slog::info!(
                self.logger,
                "No backup source for {} snapshot ({:?}, {:?})",
                query.namespace,
                query.snapshot.term,
                query.snapshot.index
            );
            return None;
        }

        let picked = &candidates[query.attempt as usize % candidates.len()];
        let dir = Path::new(&picked.data_root).join(query.namespace);
        let source = BackupSource {
            addr: format!("{}:{}", picked.remote_addr, picked.http_api_port),
            dir: dir.to_string_lossy().into_owned(),
        };
        slog::debug!(
            self.logger,
            "Attempt {} picked replica {} as backup source: {:?}",
            query.attempt,
            picked.replica_id,
            source
        );

        Some(source)
    }
}
