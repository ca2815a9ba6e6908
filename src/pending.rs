use alloc::{collections::VecDeque, vec::Vec};

use crate::{
    config::SchedulerConfig,
    frame::Frame,
    types::{AcMask, AccessCategory, ChanCtxType, PeerSlot, NUM_ACS},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Identifies one pending queue.
pub struct PendingKey {
    pub chan_type: ChanCtxType,
    pub peer: PeerSlot,
    pub ac: AccessCategory,
}
impl PendingKey {
    pub const fn new(chan_type: ChanCtxType, peer: PeerSlot, ac: AccessCategory) -> Self {
        Self {
            chan_type,
            peer,
            ac,
        }
    }
    /// A key for the operational channel context.
    pub const fn operational(peer: PeerSlot, ac: AccessCategory) -> Self {
        Self::new(ChanCtxType::Operational, peer, ac)
    }
}

/// The FIFOs of frames waiting for a transmit descriptor.
///
/// There's one queue for every combination of channel context type, peer slot and access
/// category. Without multi channel support, the channel context type dimension has a single
/// element and every key maps to the operational queue.
pub struct PendingQueueSet {
    queues: Vec<VecDeque<Frame>>,
    chanctx_types: usize,
    pend_q_per_ac: usize,
}
impl PendingQueueSet {
    pub fn new(config: &SchedulerConfig) -> Self {
        let chanctx_types = config.chanctx_types();
        let pend_q_per_ac = config.pend_q_per_ac();
        Self {
            queues: (0..chanctx_types * pend_q_per_ac * NUM_ACS)
                .map(|_| VecDeque::new())
                .collect(),
            chanctx_types,
            pend_q_per_ac,
        }
    }
    /// The number of queues per access category and channel context type.
    pub const fn pend_q_per_ac(&self) -> usize {
        self.pend_q_per_ac
    }
    fn slot(&self, key: PendingKey) -> Option<usize> {
        if key.peer.0 >= self.pend_q_per_ac {
            return None;
        }
        let chan_type = key.chan_type.index().min(self.chanctx_types - 1);
        Some((chan_type * self.pend_q_per_ac + key.peer.0) * NUM_ACS + key.ac.index())
    }
    /// Collapse the key onto the queue it actually addresses.
    pub fn normalize(&self, key: PendingKey) -> PendingKey {
        if self.chanctx_types == 1 {
            PendingKey {
                chan_type: ChanCtxType::Operational,
                ..key
            }
        } else {
            key
        }
    }
    pub fn queue(&self, key: PendingKey) -> Option<&VecDeque<Frame>> {
        self.slot(key).map(|slot| &self.queues[slot])
    }
    pub fn queue_mut(&mut self, key: PendingKey) -> Option<&mut VecDeque<Frame>> {
        self.slot(key).map(|slot| &mut self.queues[slot])
    }
    /// Append a frame to the tail of its queue.
    ///
    /// If the key is out of range, the frame is handed back.
    pub fn push(&mut self, key: PendingKey, frame: Frame) -> Result<usize, Frame> {
        match self.queue_mut(key) {
            Some(queue) => {
                queue.push_back(frame);
                Ok(queue.len())
            }
            None => Err(frame),
        }
    }
    pub fn len(&self, key: PendingKey) -> usize {
        self.queue(key).map(VecDeque::len).unwrap_or_default()
    }
    pub fn is_empty(&self, key: PendingKey) -> bool {
        self.len(key) == 0
    }
    /// The amount of frames in all queues.
    pub fn total_len(&self) -> usize {
        self.queues.iter().map(VecDeque::len).sum()
    }
    /// All valid keys.
    pub fn keys(&self) -> impl Iterator<Item = PendingKey> + '_ {
        let chan_types = [ChanCtxType::Operational, ChanCtxType::OffChannel];
        chan_types
            .into_iter()
            .take(self.chanctx_types)
            .flat_map(move |chan_type| {
                (0..self.pend_q_per_ac).flat_map(move |peer| {
                    AccessCategory::ALL
                        .into_iter()
                        .map(move |ac| PendingKey::new(chan_type, PeerSlot(peer), ac))
                })
            })
    }
    /// Move every frame of the queue into `out`, keeping the order.
    pub fn drain_into(&mut self, key: PendingKey, out: &mut Vec<Frame>) -> usize {
        match self.queue_mut(key) {
            Some(queue) => {
                let drained = queue.len();
                out.extend(queue.drain(..));
                drained
            }
            None => 0,
        }
    }
    /// Drop every queued frame.
    pub fn clear(&mut self) {
        self.queues.iter_mut().for_each(VecDeque::clear);
    }
}

/// The back pressure state towards the frame source.
///
/// One bit per access category is set, while that category's flow is stopped.
pub struct FlowControl {
    stopped: AcMask,
    high_watermark: usize,
}
impl FlowControl {
    pub const fn new(high_watermark: usize) -> Self {
        Self {
            stopped: AcMask::EMPTY,
            high_watermark,
        }
    }
    pub const fn stopped(&self) -> AcMask {
        self.stopped
    }
    pub const fn is_stopped(&self, ac: AccessCategory) -> bool {
        self.stopped.contains(ac)
    }
    /// Stop the flow for `ac`, if a queue of it reached the high watermark.
    ///
    /// Returns `true`, if the flow was newly stopped. The beacon category has no upstream flow and
    /// is never stopped.
    pub fn check_stop(&mut self, ac: AccessCategory, queue_len: usize) -> bool {
        if ac.is_beacon() || queue_len < self.high_watermark || self.is_stopped(ac) {
            return false;
        }
        self.stopped.insert(ac);
        true
    }
    /// Resume the flow for `ac`, if the serviced queue drained below half the high watermark.
    ///
    /// Returns `true`, if the flow was stopped before.
    pub fn check_resume(&mut self, ac: AccessCategory, queue_len: usize) -> bool {
        if ac.is_beacon() || !self.is_stopped(ac) || queue_len >= self.high_watermark / 2 {
            return false;
        }
        self.stopped.remove(ac);
        true
    }
    /// Clear all stopped flows, returning the ones that were stopped.
    pub fn reset(&mut self) -> AcMask {
        core::mem::replace(&mut self.stopped, AcMask::EMPTY)
    }
}
