use std::convert::TryFrom;
use tokio::time::Duration;

// Both bounds size up-front allocations and the queue's slot semaphore.
const MAX_SEND_BUFFER_LEN: usize = 1 << 16;

#[derive(Clone, Default)]
pub struct LogSyncerOptions {
    pub send_buffer_len: Option<usize>,
    pub max_batch_len: Option<usize>,
    pub snapshot_drain_timeout: Option<Duration>,
    pub restore_max_attempts: Option<u32>,
    pub restore_retry_backoff: Option<Duration>,
    pub send_retry_interval: Option<Duration>,
    // Integration setups without peers may set this to false so the local replica can serve snapshots.
    pub force_remote_backup: Option<bool>,
}

#[derive(Clone, Debug)]
pub(crate) struct LogSyncerOptionsValidated {
    pub send_buffer_len: usize,
    pub max_batch_len: usize,
    pub snapshot_drain_timeout: Duration,
    pub restore_max_attempts: u32,
    pub restore_retry_backoff: Duration,
    pub send_retry_interval: Duration,
    pub force_remote_backup: bool,
}

impl LogSyncerOptionsValidated {
    fn validate(&self) -> Result<(), &'static str> {
        if self.send_buffer_len == 0 {
            return Err("Send buffer length must be greater than 0");
        }
        if self.send_buffer_len > MAX_SEND_BUFFER_LEN {
            return Err("Send buffer length must be at most 65536");
        }
        if self.max_batch_len == 0 {
            return Err("Max batch length must be greater than 0");
        }
        if self.max_batch_len > MAX_SEND_BUFFER_LEN {
            return Err("Max batch length must be at most 65536");
        }
        if self.snapshot_drain_timeout == Duration::from_secs(0) {
            return Err("Snapshot drain timeout must be greater than 0");
        }
        if self.restore_max_attempts == 0 {
            return Err("Restore must be attempted at least once");
        }

        Ok(())
    }
}

impl TryFrom<LogSyncerOptions> for LogSyncerOptionsValidated {
    type Error = &'static str;

    fn try_from(options: LogSyncerOptions) -> Result<Self, Self::Error> {
        let send_buffer_len = options.send_buffer_len.unwrap_or(100);
        let values = LogSyncerOptionsValidated {
            send_buffer_len,
            max_batch_len: options.max_batch_len.unwrap_or(send_buffer_len),
            snapshot_drain_timeout: options.snapshot_drain_timeout.unwrap_or(Duration::from_secs(10)),
            restore_max_attempts: options.restore_max_attempts.unwrap_or(3),
            restore_retry_backoff: options.restore_retry_backoff.unwrap_or(Duration::from_secs(1)),
            send_retry_interval: options.send_retry_interval.unwrap_or(Duration::from_millis(50)),
            force_remote_backup: options.force_remote_backup.unwrap_or(true),
        };

        values.validate()?;
        Ok(values)
    }
}
