use embassy_sync::{
    blocking_mutex::raw::RawMutex,
    channel::{Channel, TrySendError},
};
use portable_atomic::{AtomicU32, Ordering};

use crate::{
    completion::TxDoneEvent,
    scheduler::Scheduler,
    transport::{FrameSink, TxTransport},
};

/// Hands completion events from the interrupt handler to the task processing them.
///
/// At most one event per busy token can be outstanding, so a capacity of at least the number of
/// tokens never overflows.
pub struct TxDoneQueue<M: RawMutex, const N: usize> {
    channel: Channel<M, TxDoneEvent, N>,
    overflows: AtomicU32,
}
impl<M: RawMutex, const N: usize> TxDoneQueue<M, N> {
    pub const fn new() -> Self {
        Self {
            channel: Channel::new(),
            overflows: AtomicU32::new(0),
        }
    }
    /// Queue an event. This never blocks and can be called from interrupt context.
    ///
    /// Returns `false` if the queue was full and the event was lost.
    pub fn signal(&self, event: TxDoneEvent) -> bool {
        match self.channel.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                self.overflows.fetch_add(1, Ordering::Relaxed);
                error!(
                    "TX done queue full, lost completion for token {}.",
                    event.token.0
                );
                false
            }
        }
    }
    /// Asynchronously wait for the next event.
    pub async fn receive(&self) -> TxDoneEvent {
        self.channel.receive().await
    }
    pub fn try_receive(&self) -> Option<TxDoneEvent> {
        self.channel.try_receive().ok()
    }
    /// The amount of events lost, because the queue was full.
    pub fn overflows(&self) -> u32 {
        self.overflows.load(Ordering::Relaxed)
    }
    /// Wait for the next event and hand it to the scheduler.
    pub async fn process_next<T: TxTransport, S: FrameSink, SM: RawMutex>(
        &self,
        scheduler: &Scheduler<T, S, SM>,
    ) {
        let event = self.receive().await;
        scheduler.on_tx_done(&event);
    }
    /// Hand all queued events to the scheduler without waiting.
    ///
    /// Returns the amount of events processed.
    pub fn process_pending<T: TxTransport, S: FrameSink, SM: RawMutex>(
        &self,
        scheduler: &Scheduler<T, S, SM>,
    ) -> usize {
        let mut processed = 0;
        while let Some(event) = self.try_receive() {
            scheduler.on_tx_done(&event);
            processed += 1;
        }
        processed
    }
}
impl<M: RawMutex, const N: usize> Default for TxDoneQueue<M, N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;

    use super::*;
    use crate::{completion::TxDoneStatus, types::{AccessCategory, TokenId}};

    fn event(token: usize) -> TxDoneEvent {
        TxDoneEvent::new(TokenId(token), AccessCategory::BestEffort, TxDoneStatus::Success)
    }

    #[test]
    fn events_keep_their_order() {
        let queue = TxDoneQueue::<NoopRawMutex, 4>::new();
        assert!(queue.signal(event(1)));
        assert!(queue.signal(event(5)));
        assert_eq!(queue.try_receive().map(|event| event.token), Some(TokenId(1)));
        assert_eq!(
            embassy_futures::block_on(queue.receive()).token,
            TokenId(5)
        );
        assert!(queue.try_receive().is_none());
    }

    #[test]
    fn full_queue_counts_overflows() {
        let queue = TxDoneQueue::<NoopRawMutex, 2>::new();
        assert!(queue.signal(event(0)));
        assert!(queue.signal(event(1)));
        assert!(!queue.signal(event(2)));
        assert_eq!(queue.overflows(), 1);
        assert_eq!(queue.try_receive().map(|event| event.token), Some(TokenId(0)));
    }
}
