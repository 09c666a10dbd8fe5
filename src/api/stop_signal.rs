use tokio::sync::watch;

/// Create a linked pair. The handle stops the signal explicitly via `stop()`, or implicitly when
/// it is dropped.
pub fn stop_signal() -> (StopHandle, StopSignal) {
    let (snd, rcv) = watch::channel(false);

    (StopHandle { snd }, StopSignal { rcv })
}

pub struct StopHandle {
    snd: watch::Sender<bool>,
}

impl StopHandle {
    pub fn stop(&self) {
        // Nobody listening is fine.
        let _ = self.snd.send(true);
    }
}

impl Drop for StopHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

#[derive(Clone)]
pub struct StopSignal {
    rcv: watch::Receiver<bool>,
}

impl StopSignal {
    pub fn is_stopped(&self) -> bool {
        *self.rcv.borrow()
    }

    /// Resolves once the paired handle has stopped or been dropped.
    pub async fn stopped(&self) {
        let mut rcv = self.rcv.clone();
        loop {
            if *rcv.borrow() {
                return;
            }

            // We don't care if the handle sent a value or dropped.
            if rcv.changed().await.is_err() {
                return;
            }
        }
    }
}
