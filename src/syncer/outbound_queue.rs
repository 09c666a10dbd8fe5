use crate::api::CommittedBatch;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::{cmp, mem};
use tokio::sync::{oneshot, Notify, OwnedSemaphorePermit, Semaphore};

/// OutboundQueue is the bounded hand-off between the apply path (many producers) and the send
/// loop (single consumer). It is the only backpressure point in front of the remote link.
///
/// It also holds the drain barrier slot. Keeping the pending drain request under the same lock as
/// the entries lets the consumer observe "queue empty" and complete the request atomically.
pub(super) struct OutboundQueue {
    state: Mutex<QueueState>,
    // One permit per free slot in `entries`.
    free_slots: Semaphore,
    // Single permit; held by whichever drain request is pending.
    drain_slot: Arc<Semaphore>,
    // Wakes the consumer on a new entry or a new drain request.
    work_available: Notify,
}

struct QueueState {
    entries: VecDeque<CommittedBatch>,
    drain: DrainState,
}

enum DrainState {
    Idle,
    Pending(DrainRequest),
}

struct DrainRequest {
    done: oneshot::Sender<()>,
    // Released when the request completes or is abandoned, letting the next requester in.
    _slot: OwnedSemaphorePermit,
}

#[derive(Debug, Eq, PartialEq)]
pub(super) struct QueueClosed;

#[derive(Debug, Eq, PartialEq)]
pub(super) enum IdleCheck {
    /// Entries arrived; any drain request stays pending.
    HasEntries,
    Empty,
    /// Queue was empty and a pending drain request was completed.
    EmptyAndDrained,
}

impl OutboundQueue {
    pub(super) fn new(capacity: usize) -> Self {
        OutboundQueue {
            state: Mutex::new(QueueState {
                entries: VecDeque::with_capacity(capacity),
                drain: DrainState::Idle,
            }),
            free_slots: Semaphore::new(capacity),
            drain_slot: Arc::new(Semaphore::new(1)),
            work_available: Notify::new(),
        }
    }

    /// Append `batch`, waiting for a free slot if the queue is full. Cancel safe: dropping the
    /// future before it resolves leaves the queue untouched.
    pub(super) async fn push(&self, batch: CommittedBatch) -> Result<(), QueueClosed> {
        let permit = self.free_slots.acquire().await.map_err(|_| QueueClosed)?;
        // The slot is handed back via `add_permits()` when the consumer takes the entry.
        permit.forget();

        self.lock_state().entries.push_back(batch);
        self.work_available.notify_one();

        Ok(())
    }

    /// Move up to `max` entries, oldest first, onto the end of `batch`. Returns the number moved.
    pub(super) fn take_into(&self, batch: &mut Vec<CommittedBatch>, max: usize) -> usize {
        let taken = {
            let mut state = self.lock_state();
            let taken = cmp::min(max, state.entries.len());
            batch.extend(state.entries.drain(..taken));
            taken
        };

        if taken > 0 {
            self.free_slots.add_permits(taken);
        }

        taken
    }

    /// Called by the consumer when it has nothing in flight.
    pub(super) fn complete_drain_if_idle(&self) -> IdleCheck {
        let mut state = self.lock_state();
        if !state.entries.is_empty() {
            return IdleCheck::HasEntries;
        }

        match mem::replace(&mut state.drain, DrainState::Idle) {
            DrainState::Pending(request) => {
                // The requester may have given up already.
                let _ = request.done.send(());
                IdleCheck::EmptyAndDrained
            }
            DrainState::Idle => IdleCheck::Empty,
        }
    }

    /// Wait until no other drain request is pending.
    pub(super) async fn reserve_drain_slot(&self) -> Result<OwnedSemaphorePermit, QueueClosed> {
        self.drain_slot.clone().acquire_owned().await.map_err(|_| QueueClosed)
    }

    /// Register a drain request. The returned receiver resolves once the consumer observes an empty
    /// queue with nothing in flight; it errors if the request is abandoned.
    pub(super) fn submit_drain_request(&self, slot: OwnedSemaphorePermit) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        let previous = mem::replace(
            &mut self.lock_state().drain,
            DrainState::Pending(DrainRequest { done: tx, _slot: slot }),
        );
        debug_assert!(
            matches!(previous, DrainState::Idle),
            "Drain slot permit must guarantee a single pending request"
        );
        self.work_available.notify_one();

        rx
    }

    /// Drop a pending drain request without completing it.
    pub(super) fn abandon_drain_request(&self) {
        self.lock_state().drain = DrainState::Idle;
    }

    pub(super) async fn wait_for_work(&self) {
        self.work_available.notified().await;
    }

    pub(super) fn len(&self) -> usize {
        self.lock_state().entries.len()
    }

    fn lock_state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().expect("OutboundQueue mutex guard poison")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{Index, InternalRequest, Term};
    use bytes::Bytes;
    use std::time::Duration;

    fn batch(index: u64) -> CommittedBatch {
        CommittedBatch::new(vec![InternalRequest::key_value(index, Bytes::new())], None).stamp_for_forwarding(
            Term::new(1),
            Index::new(index),
            String::new(),
        )
    }

    fn indexes(batches: &[CommittedBatch]) -> Vec<u64> {
        batches.iter().map(|b| b.origin_index.as_u64()).collect()
    }

    #[tokio::test]
    async fn take_preserves_order_and_respects_max() {
        let queue = OutboundQueue::new(10);
        for i in 1..=5 {
            queue.push(batch(i)).await.unwrap();
        }

        let mut taken = Vec::new();
        assert_eq!(queue.take_into(&mut taken, 3), 3);
        assert_eq!(indexes(&taken), vec![1, 2, 3]);

        assert_eq!(queue.take_into(&mut taken, 10), 2);
        assert_eq!(indexes(&taken), vec![1, 2, 3, 4, 5]);
        assert_eq!(queue.take_into(&mut taken, 10), 0);
    }

    #[tokio::test]
    async fn full_queue_blocks_until_consumer_takes() {
        let queue = Arc::new(OutboundQueue::new(2));
        queue.push(batch(1)).await.unwrap();
        queue.push(batch(2)).await.unwrap();

        let producer_queue = queue.clone();
        let mut producer = tokio::spawn(async move { producer_queue.push(batch(3)).await });

        tokio::time::timeout(Duration::from_millis(20), &mut producer)
            .await
            .expect_err("Expected producer to block on a full queue");

        let mut taken = Vec::new();
        queue.take_into(&mut taken, 1);

        tokio::time::timeout(Duration::from_secs(5), producer)
            .await
            .expect("Unexpected timeout")
            .unwrap()
            .unwrap();
        assert_eq!(queue.len(), 2);
    }

    #[tokio::test]
    async fn drain_request_waits_for_empty_queue() {
        let queue = OutboundQueue::new(10);
        queue.push(batch(1)).await.unwrap();

        let slot = queue.reserve_drain_slot().await.unwrap();
        let mut drained = queue.submit_drain_request(slot);

        assert_eq!(queue.complete_drain_if_idle(), IdleCheck::HasEntries);
        assert!(drained.try_recv().is_err());

        let mut taken = Vec::new();
        queue.take_into(&mut taken, 10);
        assert_eq!(queue.complete_drain_if_idle(), IdleCheck::EmptyAndDrained);
        assert!(drained.try_recv().is_ok());

        assert_eq!(queue.complete_drain_if_idle(), IdleCheck::Empty);
    }

    #[tokio::test]
    async fn single_drain_request_at_a_time() {
        let queue = OutboundQueue::new(10);
        queue.push(batch(1)).await.unwrap();

        let slot = queue.reserve_drain_slot().await.unwrap();
        let _first = queue.submit_drain_request(slot);

        tokio::time::timeout(Duration::from_millis(20), queue.reserve_drain_slot())
            .await
            .expect_err("Expected second requester to wait for the slot");

        let mut taken = Vec::new();
        queue.take_into(&mut taken, 10);
        queue.complete_drain_if_idle();

        let _slot = tokio::time::timeout(Duration::from_secs(5), queue.reserve_drain_slot())
            .await
            .expect("Unexpected timeout")
            .unwrap();
    }

    #[tokio::test]
    async fn abandoned_drain_request_errors_the_waiter() {
        let queue = OutboundQueue::new(10);
        let slot = queue.reserve_drain_slot().await.unwrap();
        let drained = queue.submit_drain_request(slot);

        queue.abandon_drain_request();

        assert!(drained.await.is_err());
        let _slot = queue.reserve_drain_slot().await.unwrap();
    }
}
