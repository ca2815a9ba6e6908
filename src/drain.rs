use alloc::vec::Vec;
use core::future::Future;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_time::Ticker;

use crate::{
    error::DrainError,
    frame::Frame,
    opportunity::OpportunityCursors,
    pending::PendingKey,
    scheduler::{Outbox, Scheduler, SinkEvent, TxState},
    stats::TxStats,
    topology::Topology,
    transport::{FrameSink, TxTransport},
    types::{AcMask, ChanCtxType, PeerSlot},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// The frames a drain operation applies to.
pub struct DrainTarget {
    pub vif: usize,
    /// Only frames for this peer slot. `None` matches all slots of the VIF.
    pub peer: Option<PeerSlot>,
    pub queues: AcMask,
}
impl DrainTarget {
    /// All frames of a VIF.
    pub const fn vif(vif: usize) -> Self {
        Self {
            vif,
            peer: None,
            queues: AcMask::ALL,
        }
    }
    /// All frames of one peer of a VIF.
    pub const fn peer(vif: usize, peer: PeerSlot) -> Self {
        Self {
            vif,
            peer: Some(peer),
            queues: AcMask::ALL,
        }
    }
    pub const fn with_queues(self, queues: AcMask) -> Self {
        Self { queues, ..self }
    }
    fn matches_key(&self, key: PendingKey) -> bool {
        self.queues.contains(key.ac) && self.peer.is_none_or(|peer| peer == key.peer)
    }
}

/// The tick source a flush waits on between polls.
pub trait DrainTicker {
    fn tick(&mut self) -> impl Future<Output = ()>;
}
impl DrainTicker for Ticker {
    fn tick(&mut self) -> impl Future<Output = ()> {
        self.next()
    }
}

impl<T: TxTransport> TxState<T> {
    /// The keys of all non-empty pending queues, that hold frames for the target.
    ///
    /// Queues are matched by the VIF of their frames, so this still works after the VIF or peer
    /// was removed from the topology.
    fn matching_keys(&self, target: &DrainTarget) -> Vec<PendingKey> {
        self.pending
            .keys()
            .filter(|key| target.matches_key(*key))
            .filter(|key| {
                self.pending
                    .queue(*key)
                    .and_then(|queue| queue.front())
                    .is_some_and(|frame| frame.info().vif_index == target.vif)
            })
            .collect()
    }
    pub(crate) fn pending_matching(&self, target: &DrainTarget) -> usize {
        self.matching_keys(target)
            .into_iter()
            .map(|key| self.pending.len(key))
            .sum()
    }
    /// The busy tokens holding frames for the target, as a bitmask.
    pub(crate) fn busy_matching(&self, target: &DrainTarget) -> u64 {
        self.descriptors
            .iter()
            .filter(|(token, descriptor)| {
                self.pool.is_busy(*token)
                    && descriptor.matches(target.vif, target.peer, target.queues)
            })
            .fold(0, |mask, (token, _)| mask | (1 << token.0))
    }
    fn account_dropped(&mut self, chan_type: ChanCtxType, frames: usize, outbox: &mut Outbox) {
        if chan_type != ChanCtxType::OffChannel {
            return;
        }
        for _ in 0..frames {
            if self.topology.off_channel_frame_done() {
                outbox.push(SinkEvent::OffChannelTxDone);
            }
        }
    }
    /// Resume every stopped category, whose longest queue is now below the low watermark.
    fn resume_drained_flows(&mut self, queues: AcMask, outbox: &mut Outbox) {
        for ac in queues.iter() {
            let longest = self
                .pending
                .keys()
                .filter(|key| key.ac == ac)
                .map(|key| self.pending.len(key))
                .max()
                .unwrap_or_default();
            if self.flow.check_resume(ac, longest) {
                outbox.push(SinkEvent::ResumeFlow(ac));
            }
        }
    }
    pub(crate) fn discard(
        &mut self,
        target: &DrainTarget,
        stats: &TxStats,
        outbox: &mut Outbox,
    ) -> usize {
        self.topology.block(target.vif, target.peer);
        let mut dropped = Vec::new();
        for key in self.matching_keys(target) {
            let drained = self.pending.drain_into(key, &mut dropped);
            self.account_dropped(key.chan_type, drained, outbox);
        }
        self.resume_drained_flows(target.queues, outbox);
        let count = dropped.len();
        dropped
            .into_iter()
            .for_each(|frame| outbox.drop_frame(frame, stats));
        count
    }
    pub(crate) fn force_clear_in_flight(
        &mut self,
        target: &DrainTarget,
        stats: &TxStats,
        outbox: &mut Outbox,
    ) -> usize {
        let busy = self.busy_matching(target);
        let mut count = 0;
        for token in self.pool.tokens().filter(|token| busy & (1 << token.0) != 0) {
            let Some(descriptor) = self.descriptors.get_mut(token) else {
                continue;
            };
            let (ac, chan_type) = (descriptor.ac, descriptor.chan_type);
            let frames = descriptor.take_batch();
            descriptor.clear();
            self.pool.release(token, ac);
            self.account_dropped(chan_type, frames.len(), outbox);
            debug!("Force cleared token {} holding {} frames.", token.0, frames.len());
            count += frames.len();
            frames
                .into_iter()
                .for_each(|frame| outbox.drop_frame(frame, stats));
        }
        count
    }
    /// Drop every queued and bound frame and return to the initial state.
    pub(crate) fn reinit(&mut self, stats: &TxStats, outbox: &mut Outbox) {
        let mut dropped: Vec<Frame> = Vec::new();
        for token in self.pool.tokens() {
            if let Some(descriptor) = self.descriptors.get_mut(token) {
                dropped.extend(descriptor.take_batch());
            }
        }
        for key in self.pending.keys().collect::<Vec<_>>() {
            self.pending.drain_into(key, &mut dropped);
        }
        let config = self.config;
        self.descriptors.clear();
        self.pool.reset();
        self.flow.reset();
        self.cursors = OpportunityCursors::new(config.max_chanctx, self.pending.pend_q_per_ac());
        self.topology = Topology::new(&config);
        self.current_chanctx = None;
        self.last_beacon_sent = false;
        dropped
            .into_iter()
            .for_each(|frame| outbox.drop_frame(frame, stats));
    }
}

impl<T: TxTransport, S: FrameSink, M: RawMutex> Scheduler<T, S, M> {
    /// Drop every pending frame for the target and refuse new frames for it.
    ///
    /// Admission stays blocked until the VIF or peer is added again. Frames already bound to a
    /// token aren't touched. Returns the amount of frames dropped.
    pub fn discard(&self, target: DrainTarget) -> usize {
        let dropped = self.with_state(|state, stats, outbox| state.discard(&target, stats, outbox));
        debug!(
            "Discarded {} pending frames of VIF {}.",
            dropped,
            target.vif
        );
        dropped
    }
    /// Release every busy token holding frames for the target and drop those frames.
    ///
    /// This is only safe, once the firmware won't complete those tokens anymore. A completion
    /// arriving later is treated as a protocol error.
    pub fn force_clear_in_flight(&self, target: DrainTarget) -> usize {
        self.with_state(|state, stats, outbox| state.force_clear_in_flight(&target, stats, outbox))
    }
    /// Wait for all frames of the target to leave the scheduler.
    ///
    /// First the pending queues have to empty, then the tokens holding frames for the target
    /// have to complete. Each phase may take up to `flush_timeout_ticks` ticks.
    pub async fn flush(
        &self,
        target: DrainTarget,
        ticker: &mut impl DrainTicker,
    ) -> Result<(), DrainError> {
        let max_ticks = self.read_state(|state| state.config.flush_timeout_ticks);

        let mut ticks = 0;
        loop {
            let remaining = self.read_state(|state| state.pending_matching(&target));
            if remaining == 0 {
                break;
            }
            if ticks >= max_ticks {
                warn!(
                    "Flushing VIF {} timed out with {} frames pending.",
                    target.vif,
                    remaining
                );
                return Err(DrainError::PendingTimeout { remaining });
            }
            ticker.tick().await;
            ticks += 1;
        }

        let mut ticks = 0;
        loop {
            let busy_tokens = self.read_state(|state| state.busy_matching(&target));
            if busy_tokens == 0 {
                break;
            }
            if ticks >= max_ticks {
                warn!(
                    "Flushing VIF {} timed out with tokens {:x} in flight.",
                    target.vif,
                    busy_tokens
                );
                return Err(DrainError::InFlightTimeout { busy_tokens });
            }
            ticker.tick().await;
            ticks += 1;
        }
        trace!("Flushed VIF {}.", target.vif);
        Ok(())
    }
    /// Flush the target, and discard everything left on timeout.
    ///
    /// If the flush timed out, the error is still returned after the frames were dropped.
    pub async fn flush_or_discard(
        &self,
        target: DrainTarget,
        ticker: &mut impl DrainTicker,
    ) -> Result<(), DrainError> {
        let result = self.flush(target, ticker).await;
        if result.is_err() {
            self.discard(target);
            self.force_clear_in_flight(target);
        }
        result
    }
    /// Wait for every token to complete.
    pub async fn drain_all(&self, ticker: &mut impl DrainTicker) -> Result<(), DrainError> {
        let max_ticks = self.read_state(|state| state.config.flush_timeout_ticks);
        let mut ticks = 0;
        loop {
            let busy_tokens = self.read_state(|state| state.pool.busy_mask());
            if busy_tokens == 0 {
                return Ok(());
            }
            if ticks >= max_ticks {
                warn!("Waiting for TX completion timed out, tokens {:x} busy.", busy_tokens);
                return Err(DrainError::InFlightTimeout { busy_tokens });
            }
            ticker.tick().await;
            ticks += 1;
        }
    }
    /// Drop every frame upward and reset the scheduler to its initial state.
    ///
    /// VIFs, peers and the channel context have to be configured again afterwards.
    pub fn deinit(&self) {
        self.with_state(|state, stats, outbox| state.reinit(stats, outbox));
        info!("TX scheduler deinitialized.");
    }
}
