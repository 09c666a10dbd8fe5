mod force_backup;
mod log_syncer;
mod outbound_queue;
mod progress;
mod restore;
mod send_loop;

pub(crate) use log_syncer::LogSyncer;
pub(crate) use log_syncer::LogSyncerParts;
