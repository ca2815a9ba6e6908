use alloc::{vec, vec::Vec};

use crate::{
    config::SchedulerConfig,
    error::{SchedulerError, SchedulerResult},
    frame::Frame,
    types::{AccessCategory, ChanCtxId, ChanCtxType, PeerSlot},
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// The kind of a remain on channel excursion.
pub enum RocKind {
    #[default]
    Normal,
    /// The excursion only exists to transmit off-channel frames.
    OffChannelTx,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// The remain on channel state, as set by the channel context manager.
pub struct RocState {
    pub in_progress: bool,
    pub kind: RocKind,
    /// The channel context used for the excursion.
    pub off_chanctx: Option<ChanCtxId>,
    /// The excursion needs a separate off-channel context. If it doesn't, frames for the
    /// operating channel are routed to the off-channel queues while it's in progress.
    pub need_offchan: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Per VIF state.
pub struct VifState {
    pub chanctx: Option<ChanCtxId>,
    pub off_chanctx: Option<ChanCtxId>,
    pub beacon_enabled: bool,
    /// Beacon interval in TU.
    pub beacon_interval: u16,
    /// Admission is blocked by a discard, until the VIF is added again.
    pub blocked: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
struct PeerState {
    vif: usize,
    blocked: bool,
}

/// The VIFs, peers and remain on channel state the scheduler routes frames by.
pub struct Topology {
    vifs: Vec<Option<VifState>>,
    peers: Vec<Option<PeerState>>,
    max_chanctx: u8,
    multi_channel: bool,
    pub roc: RocState,
    /// Off-channel frames, that weren't completed yet.
    pub off_channel_frames: usize,
}
impl Topology {
    pub fn new(config: &SchedulerConfig) -> Self {
        Self {
            vifs: vec![None; config.max_vifs],
            peers: vec![None; config.max_peers],
            max_chanctx: config.max_chanctx,
            multi_channel: config.multi_channel,
            roc: RocState::default(),
            off_channel_frames: 0,
        }
    }
    fn check_chanctx(&self, chanctx: Option<ChanCtxId>) -> SchedulerResult<()> {
        match chanctx {
            Some(ChanCtxId(id)) if id >= self.max_chanctx => {
                Err(SchedulerError::InvalidChannelContext)
            }
            _ => Ok(()),
        }
    }
    pub fn add_vif(&mut self, vif: usize) -> SchedulerResult<()> {
        let slot = self
            .vifs
            .get_mut(vif)
            .ok_or(SchedulerError::VifOutOfBounds)?;
        // Re-adding a VIF lifts a discard block, but keeps the channel assignment.
        let state = slot.get_or_insert_with(VifState::default);
        state.blocked = false;
        Ok(())
    }
    pub fn remove_vif(&mut self, vif: usize) -> SchedulerResult<()> {
        *self
            .vifs
            .get_mut(vif)
            .ok_or(SchedulerError::VifOutOfBounds)? = None;
        self.peers
            .iter_mut()
            .filter(|peer| matches!(peer, Some(state) if state.vif == vif))
            .for_each(|peer| *peer = None);
        Ok(())
    }
    pub fn vif(&self, vif: usize) -> Option<&VifState> {
        self.vifs.get(vif).and_then(Option::as_ref)
    }
    fn vif_mut(&mut self, vif: usize) -> SchedulerResult<&mut VifState> {
        match self.vifs.get_mut(vif) {
            Some(Some(state)) => Ok(state),
            _ => Err(SchedulerError::VifOutOfBounds),
        }
    }
    pub fn set_vif_chanctx(
        &mut self,
        vif: usize,
        chanctx: Option<ChanCtxId>,
        off_chanctx: Option<ChanCtxId>,
    ) -> SchedulerResult<()> {
        self.check_chanctx(chanctx)?;
        self.check_chanctx(off_chanctx)?;
        let state = self.vif_mut(vif)?;
        state.chanctx = chanctx;
        state.off_chanctx = off_chanctx;
        Ok(())
    }
    pub fn set_beacon(&mut self, vif: usize, enabled: bool, interval: u16) -> SchedulerResult<()> {
        let state = self.vif_mut(vif)?;
        state.beacon_enabled = enabled;
        state.beacon_interval = interval;
        Ok(())
    }
    pub fn set_roc(&mut self, roc: RocState) -> SchedulerResult<()> {
        self.check_chanctx(roc.off_chanctx)?;
        self.roc = roc;
        Ok(())
    }
    pub fn add_peer(&mut self, peer: PeerSlot, vif: usize) -> SchedulerResult<()> {
        if self.vif(vif).is_none() {
            return Err(SchedulerError::VifOutOfBounds);
        }
        *self
            .peers
            .get_mut(peer.0)
            .ok_or(SchedulerError::PeerOutOfBounds)? = Some(PeerState {
            vif,
            blocked: false,
        });
        Ok(())
    }
    pub fn remove_peer(&mut self, peer: PeerSlot) -> SchedulerResult<()> {
        *self
            .peers
            .get_mut(peer.0)
            .ok_or(SchedulerError::PeerOutOfBounds)? = None;
        Ok(())
    }
    /// The broadcast slot of a VIF.
    pub fn broadcast_slot(&self, vif: usize) -> PeerSlot {
        PeerSlot(self.peers.len() + vif)
    }
    pub fn is_broadcast_slot(&self, peer: PeerSlot) -> bool {
        peer.0 >= self.peers.len()
    }
    /// The VIF a pending queue slot belongs to, if both are registered.
    pub fn owning_vif(&self, peer: PeerSlot) -> Option<usize> {
        let vif = if self.is_broadcast_slot(peer) {
            peer.0 - self.peers.len()
        } else {
            self.peers.get(peer.0).copied().flatten()?.vif
        };
        self.vif(vif).map(|_| vif)
    }
    /// Check if frames for the slot are currently refused.
    pub fn is_blocked(&self, peer: PeerSlot) -> bool {
        let Some(vif) = self.owning_vif(peer) else {
            return true;
        };
        let peer_blocked = !self.is_broadcast_slot(peer)
            && self.peers[peer.0].is_some_and(|state| state.blocked);
        peer_blocked || self.vif(vif).is_some_and(|state| state.blocked)
    }
    /// Block admission for a VIF, or for a single peer.
    ///
    /// The broadcast slot of a VIF has no state of its own, so passing it as `peer` blocks the
    /// whole VIF.
    pub fn block(&mut self, vif: usize, peer: Option<PeerSlot>) {
        match peer {
            Some(peer) if !self.is_broadcast_slot(peer) => {
                if let Some(Some(state)) = self.peers.get_mut(peer.0) {
                    state.blocked = true;
                }
            }
            _ => {
                if let Some(Some(state)) = self.vifs.get_mut(vif) {
                    state.blocked = true;
                }
            }
        }
    }
    /// The channel context type a new frame is queued for.
    ///
    /// A frame is off-channel, if it's flagged as such, or if its VIF operates on the context
    /// used by the remain on channel excursion.
    pub fn classify_submission(&self, frame: &Frame) -> ChanCtxType {
        if !self.multi_channel {
            return ChanCtxType::Operational;
        }
        let on_roc_chanctx = self.roc.off_chanctx.is_some()
            && self
                .vif(frame.info().vif_index)
                .is_some_and(|state| state.chanctx == self.roc.off_chanctx);
        if frame.info().off_channel || on_roc_chanctx {
            ChanCtxType::OffChannel
        } else {
            ChanCtxType::Operational
        }
    }
    /// The pending queue type a slot may be serviced from on `chanctx`.
    ///
    /// Returns `None`, if the slot's VIF isn't associated with `chanctx`. The beacon category
    /// isn't filtered, since the firmware schedules beacons on the right channel itself.
    pub fn service_type(
        &self,
        chanctx: ChanCtxId,
        peer: PeerSlot,
        ac: AccessCategory,
    ) -> Option<ChanCtxType> {
        if !self.multi_channel {
            return Some(ChanCtxType::Operational);
        }
        let vif = self.vif(self.owning_vif(peer)?)?;
        if vif.chanctx.is_none() && vif.off_chanctx.is_none() {
            return None;
        }
        let bypass = ac.is_beacon() && self.is_broadcast_slot(peer);
        if bypass || vif.chanctx == Some(chanctx) {
            Some(if self.roc.in_progress && !self.roc.need_offchan {
                ChanCtxType::OffChannel
            } else {
                ChanCtxType::Operational
            })
        } else if vif.off_chanctx == Some(chanctx) {
            Some(ChanCtxType::OffChannel)
        } else {
            None
        }
    }
    /// Account for a completed or dropped off-channel frame.
    ///
    /// Returns `true`, if this was the last one and an off-channel transmit excursion is waiting
    /// for it.
    pub fn off_channel_frame_done(&mut self) -> bool {
        let Some(remaining) = self.off_channel_frames.checked_sub(1) else {
            error!("Off-channel frame counter would underflow.");
            return false;
        };
        self.off_channel_frames = remaining;
        remaining == 0 && self.roc.in_progress && self.roc.kind == RocKind::OffChannelTx
    }
    /// Check if a beacon timer for the VIF should be rearmed.
    pub fn beacon_rearm_interval(&self, vif: usize) -> Option<u16> {
        self.vif(vif)
            .filter(|state| state.beacon_enabled && !state.blocked)
            .map(|state| state.beacon_interval.saturating_sub(10))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{frame::tests::qos_data, types::MacAddress};

    fn multi_channel() -> Topology {
        let mut topology = Topology::new(&SchedulerConfig {
            multi_channel: true,
            ..Default::default()
        });
        topology.add_vif(0).unwrap();
        topology.add_vif(1).unwrap();
        topology
            .set_vif_chanctx(0, Some(ChanCtxId(0)), None)
            .unwrap();
        topology
            .set_vif_chanctx(1, Some(ChanCtxId(1)), Some(ChanCtxId(0)))
            .unwrap();
        topology.add_peer(PeerSlot(0), 0).unwrap();
        topology.add_peer(PeerSlot(1), 1).unwrap();
        topology
    }

    #[test]
    fn blocking_the_broadcast_slot_blocks_the_vif() {
        let mut topology = multi_channel();
        let broadcast = topology.broadcast_slot(0);
        topology.block(0, Some(broadcast));
        assert!(topology.is_blocked(broadcast));
        assert!(topology.is_blocked(PeerSlot(0)));
        assert!(!topology.is_blocked(PeerSlot(1)));
        assert!(!topology.is_blocked(topology.broadcast_slot(1)));
    }
    #[test]
    fn service_type_follows_vif_chanctx() {
        let topology = multi_channel();
        let be = AccessCategory::BestEffort;
        assert_eq!(
            topology.service_type(ChanCtxId(0), PeerSlot(0), be),
            Some(ChanCtxType::Operational)
        );
        assert_eq!(
            topology.service_type(ChanCtxId(0), PeerSlot(1), be),
            Some(ChanCtxType::OffChannel)
        );
        assert_eq!(topology.service_type(ChanCtxId(1), PeerSlot(0), be), None);
        // Unregistered peer.
        assert_eq!(topology.service_type(ChanCtxId(0), PeerSlot(2), be), None);
    }

    #[test]
    fn beacons_bypass_chanctx_filter() {
        let topology = multi_channel();
        let slot = topology.broadcast_slot(0);
        assert_eq!(
            topology.service_type(ChanCtxId(1), slot, AccessCategory::Beacon),
            Some(ChanCtxType::Operational)
        );
        assert_eq!(
            topology.service_type(ChanCtxId(1), slot, AccessCategory::Voice),
            None
        );
    }

    #[test]
    fn roc_without_offchan_context_reroutes() {
        let mut topology = multi_channel();
        topology
            .set_roc(RocState {
                in_progress: true,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(
            topology.service_type(ChanCtxId(0), PeerSlot(0), AccessCategory::Voice),
            Some(ChanCtxType::OffChannel)
        );
    }

    #[test]
    fn submission_classification() {
        let mut topology = multi_channel();
        let mut frame = qos_data([MacAddress::BROADCAST; 3], false);
        assert_eq!(
            topology.classify_submission(&frame),
            ChanCtxType::Operational
        );
        frame.info_mut().off_channel = true;
        assert_eq!(topology.classify_submission(&frame), ChanCtxType::OffChannel);
        frame.info_mut().off_channel = false;
        topology
            .set_roc(RocState {
                in_progress: true,
                off_chanctx: Some(ChanCtxId(0)),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(topology.classify_submission(&frame), ChanCtxType::OffChannel);
    }

    #[test]
    fn discard_block_is_lifted_by_re_adding() {
        let mut topology = multi_channel();
        topology.block(0, None);
        assert!(topology.is_blocked(PeerSlot(0)));
        assert!(topology.is_blocked(topology.broadcast_slot(0)));
        assert!(!topology.is_blocked(PeerSlot(1)));
        topology.add_vif(0).unwrap();
        assert!(!topology.is_blocked(PeerSlot(0)));

        topology.block(1, Some(PeerSlot(1)));
        assert!(topology.is_blocked(PeerSlot(1)));
        assert!(!topology.is_blocked(topology.broadcast_slot(1)));
        topology.add_peer(PeerSlot(1), 1).unwrap();
        assert!(!topology.is_blocked(PeerSlot(1)));
    }

    #[test]
    fn removing_a_vif_removes_its_peers() {
        let mut topology = multi_channel();
        topology.remove_vif(1).unwrap();
        assert_eq!(topology.owning_vif(PeerSlot(1)), None);
        assert_eq!(topology.owning_vif(PeerSlot(0)), Some(0));
        assert_eq!(
            topology.set_vif_chanctx(0, Some(ChanCtxId(5)), None),
            Err(SchedulerError::InvalidChannelContext)
        );
    }

    #[test]
    fn off_channel_tx_completion() {
        let mut topology = multi_channel();
        topology.roc = RocState {
            in_progress: true,
            kind: RocKind::OffChannelTx,
            ..Default::default()
        };
        topology.off_channel_frames = 2;
        assert!(!topology.off_channel_frame_done());
        assert!(topology.off_channel_frame_done());
        assert!(!topology.off_channel_frame_done());
    }
}
