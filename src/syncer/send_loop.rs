use crate::api::{CommittedBatch, RemoteLogSender, StopSignal, SyncedState};
use crate::syncer::outbound_queue::{IdleCheck, OutboundQueue};
use crate::syncer::progress::SyncProgress;
use std::sync::Arc;
use tokio::time::Duration;

/// SendLoop is the only consumer of the outbound queue. It batches whatever is immediately
/// available, forwards the batch to the remote cluster, and keeps retrying a failed batch until it
/// is delivered or the syncer shuts down.
pub(super) struct SendLoop {
    pub(super) logger: slog::Logger,
    pub(super) queue: Arc<OutboundQueue>,
    pub(super) progress: Arc<SyncProgress>,
    pub(super) remote: Arc<dyn RemoteLogSender>,
    pub(super) shutdown: StopSignal,
    pub(super) max_batch_len: usize,
    pub(super) retry_interval: Duration,
}

impl SendLoop {
    pub(super) async fn run(self) {
        let remote_state = self.fetch_remote_state().await;
        let mut pending: Vec<CommittedBatch> = Vec::with_capacity(self.max_batch_len);

        loop {
            // Batching window: keep absorbing until nothing more is immediately available.
            let room = self.max_batch_len.saturating_sub(pending.len());
            if room > 0 && self.queue.take_into(&mut pending, room) > 0 {
                continue;
            }

            if pending.is_empty() {
                match self.queue.complete_drain_if_idle() {
                    IdleCheck::HasEntries => continue,
                    IdleCheck::EmptyAndDrained => {
                        slog::info!(self.logger, "Woke up drain waiter since no more buffered logs");
                    }
                    IdleCheck::Empty => {}
                }

                if self.shutdown.is_stopped() {
                    break;
                }

                tokio::select! {
                    _ = self.queue.wait_for_work() => {}
                    _ = self.shutdown.stopped() => {}
                }
                continue;
            }

            if self.deliver(&pending, &remote_state).await {
                pending.clear();
                continue;
            }

            if self.shutdown.is_stopped() {
                break;
            }

            // Keep the batch; order and at-least-once delivery depend on resending it first.
            tokio::select! {
                _ = tokio::time::sleep(self.retry_interval) => {}
                _ = self.shutdown.stopped() => {}
            }
        }

        self.queue.abandon_drain_request();
        self.remote.stop();
        slog::info!(self.logger, "Raft log syncer send loop exit");
    }

    async fn fetch_remote_state(&self) -> SyncedState {
        match self.remote.remote_synced_state(&self.shutdown).await {
            Ok(state) => {
                slog::info!(self.logger, "Remote synced state on start: {:?}", state);
                state
            }
            Err(e) => {
                slog::error!(self.logger, "Failed to get the synced state from remote: {}", e);
                SyncedState::default()
            }
        }
    }

    /// Returns true if the batch is now accounted for at the remote.
    async fn deliver(&self, pending: &[CommittedBatch], remote_state: &SyncedState) -> bool {
        let (last_term, last_index) = match pending.last() {
            Some(last) => last.origin(),
            None => return true,
        };

        if remote_state.covers(last_term, last_index) {
            slog::debug!(
                self.logger,
                "Remote already replayed up to ({:?}, {:?}), skipping {} batches",
                last_term,
                last_index,
                pending.len()
            );
        } else {
            slog::debug!(
                self.logger,
                "Sending {} batches up to ({:?}, {:?})",
                pending.len(),
                last_term,
                last_index
            );
            if let Err(e) = self.remote.send_batches(pending, &self.shutdown).await {
                if !self.shutdown.is_stopped() {
                    slog::error!(
                        self.logger,
                        "Failed to send {} raft logs up to ({:?}, {:?}) to remote: {}",
                        pending.len(),
                        last_term,
                        last_index,
                        e
                    );
                }
                return false;
            }
        }

        self.progress
            .record_forwarded(pending.len() as u64, last_term, last_index);
        true
    }
}
