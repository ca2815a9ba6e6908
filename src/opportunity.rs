use alloc::{vec, vec::Vec};

use crate::types::{AccessCategory, ChanCtxId, ChanCtxType, PeerSlot, NUM_ACS};

/// Round robin cursors, one per channel context and access category.
///
/// A cursor holds the first pending queue slot examined at the next opportunity. It's only moved
/// past a slot, once that slot was actually serviced.
pub struct OpportunityCursors {
    cursors: Vec<usize>,
    pend_q_per_ac: usize,
}
impl OpportunityCursors {
    pub fn new(max_chanctx: u8, pend_q_per_ac: usize) -> Self {
        Self {
            cursors: vec![0; max_chanctx.max(1) as usize * NUM_ACS],
            pend_q_per_ac,
        }
    }
    fn index(&self, chanctx: ChanCtxId, ac: AccessCategory) -> Option<usize> {
        let index = chanctx.0 as usize * NUM_ACS + ac.index();
        (index < self.cursors.len()).then_some(index)
    }
    pub fn cursor(&self, chanctx: ChanCtxId, ac: AccessCategory) -> Option<usize> {
        self.index(chanctx, ac).map(|index| self.cursors[index])
    }
    /// Select the next slot with pending frames for `ac` on `chanctx`.
    ///
    /// `ready` is asked for every candidate slot in round robin order, starting at the cursor,
    /// and returns the queue type to service, if the slot is eligible and has pending frames.
    /// The cursor moves to the slot after the selected one. If nothing is selected, the cursor
    /// stays where it is.
    pub fn next_ready_peer(
        &mut self,
        chanctx: ChanCtxId,
        ac: AccessCategory,
        mut ready: impl FnMut(PeerSlot) -> Option<ChanCtxType>,
    ) -> Option<(PeerSlot, ChanCtxType)> {
        let index = self.index(chanctx, ac)?;
        let start = self.cursors[index];
        let (peer, chan_type) = (0..self.pend_q_per_ac)
            .map(|offset| PeerSlot((start + offset) % self.pend_q_per_ac))
            .find_map(|peer| ready(peer).map(|chan_type| (peer, chan_type)))?;
        self.cursors[index] = (peer.0 + 1) % self.pend_q_per_ac;
        trace!(
            "Peer {} got the opportunity for AC {} on chanctx {}.",
            peer.0,
            ac.index(),
            chanctx.0
        );
        Some((peer, chan_type))
    }
    pub fn reset(&mut self) {
        self.cursors.iter_mut().for_each(|cursor| *cursor = 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready_if(pending: &[usize]) -> impl FnMut(PeerSlot) -> Option<ChanCtxType> + '_ {
        |peer| {
            pending
                .contains(&peer.0)
                .then_some(ChanCtxType::Operational)
        }
    }

    #[test]
    fn cursor_moves_past_selected_slot() {
        let mut cursors = OpportunityCursors::new(1, 5);
        let ac = AccessCategory::BestEffort;
        let ctx = ChanCtxId(0);
        assert_eq!(
            cursors.next_ready_peer(ctx, ac, ready_if(&[1, 3])),
            Some((PeerSlot(1), ChanCtxType::Operational))
        );
        assert_eq!(cursors.cursor(ctx, ac), Some(2));
        assert_eq!(
            cursors.next_ready_peer(ctx, ac, ready_if(&[1, 3])),
            Some((PeerSlot(3), ChanCtxType::Operational))
        );
        // Wraps around.
        assert_eq!(
            cursors.next_ready_peer(ctx, ac, ready_if(&[1, 3])),
            Some((PeerSlot(1), ChanCtxType::Operational))
        );
    }

    #[test]
    fn cursor_is_kept_without_pending_frames() {
        let mut cursors = OpportunityCursors::new(2, 5);
        let ac = AccessCategory::Voice;
        cursors.next_ready_peer(ChanCtxId(1), ac, ready_if(&[2]));
        assert_eq!(cursors.cursor(ChanCtxId(1), ac), Some(3));
        assert_eq!(cursors.next_ready_peer(ChanCtxId(1), ac, ready_if(&[])), None);
        assert_eq!(cursors.cursor(ChanCtxId(1), ac), Some(3));
        // Cursors are independent per channel context.
        assert_eq!(cursors.cursor(ChanCtxId(0), ac), Some(0));
        assert_eq!(cursors.next_ready_peer(ChanCtxId(2), ac, ready_if(&[2])), None);
    }

    #[test]
    fn every_busy_peer_is_served_within_one_round() {
        let mut cursors = OpportunityCursors::new(1, 4);
        let busy = [0, 1, 2, 3];
        let mut served = [0usize; 4];
        for _ in 0..4 {
            let (peer, _) = cursors
                .next_ready_peer(ChanCtxId(0), AccessCategory::Video, ready_if(&busy))
                .unwrap();
            served[peer.0] += 1;
        }
        assert_eq!(served, [1; 4]);
    }
}
