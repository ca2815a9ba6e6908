use alloc::vec::Vec;

use crate::{
    completion::TxDoneEvent,
    config::MAX_SUBFRAMES,
    frame::Frame,
    rate::total_tries,
    transport::{AdjustedRates, SubmitRequest},
    types::{AcMask, AccessCategory, ChanCtxId, ChanCtxType, PeerSlot, TokenId},
};

/// The bookkeeping for one transmit descriptor.
///
/// The batch is only non-empty, while the token is busy.
#[derive(Debug)]
pub struct InFlightDescriptor {
    /// The channel context the batch was submitted on. `None` while the token is unmapped.
    pub chanctx: Option<ChanCtxId>,
    /// The type of pending queue the batch was taken from.
    pub chan_type: ChanCtxType,
    pub ac: AccessCategory,
    pub peer: PeerSlot,
    pub vif: usize,
    /// The header length detached from the first frame.
    pub hdr_len: usize,
    pub batch: Vec<Frame>,
    /// Retries already used up by channel switch discards.
    pub curr_retries: u32,
    pub max_retries: u32,
    pub subframe_rates: [u8; MAX_SUBFRAMES],
    pub subframe_retries: [u8; MAX_SUBFRAMES],
    /// The subframe arrays hold the state of a channel switch discard.
    pub adjusted_rates: bool,
    /// The batch waits for its channel context to become current again.
    pub withheld: bool,
    pub more_frames: bool,
}
impl InFlightDescriptor {
    const fn new() -> Self {
        Self {
            chanctx: None,
            chan_type: ChanCtxType::Operational,
            ac: AccessCategory::Background,
            peer: PeerSlot(0),
            vif: 0,
            hdr_len: 0,
            batch: Vec::new(),
            curr_retries: 0,
            max_retries: 0,
            subframe_rates: [0; MAX_SUBFRAMES],
            subframe_retries: [0; MAX_SUBFRAMES],
            adjusted_rates: false,
            withheld: false,
            more_frames: false,
        }
    }
    pub fn is_idle(&self) -> bool {
        self.batch.is_empty()
    }
    /// Stamp the routing information after a batch was built, and detach the headers.
    pub fn bind(
        &mut self,
        chanctx: ChanCtxId,
        chan_type: ChanCtxType,
        ac: AccessCategory,
        peer: PeerSlot,
        default_max_retries: u32,
    ) {
        let Some(first) = self.batch.first() else {
            return;
        };
        let hdr_len = first.header_len();
        let vif = first.info().vif_index;
        let more_frames = ac.is_beacon() && first.info().more_frames;
        let max_retries = match total_tries(&first.info().rates) {
            0 => default_max_retries,
            tries => tries,
        };
        for frame in self.batch.iter_mut() {
            let len = frame.header_len();
            frame.detach_header(len);
        }
        *self = Self {
            chanctx: Some(chanctx),
            chan_type,
            ac,
            peer,
            vif,
            hdr_len,
            batch: core::mem::take(&mut self.batch),
            max_retries,
            more_frames,
            ..Self::new()
        };
    }
    /// Record the channel switch discard reported in `event`.
    ///
    /// Returns `true`, if the batch still has retries left. In that case, the retries are added to
    /// the budget already used up.
    pub fn record_channel_switch(&mut self, event: &TxDoneEvent) -> bool {
        let reported = event.retries(0) as u32;
        self.adjusted_rates = true;
        let len = self.batch.len().min(MAX_SUBFRAMES);
        self.subframe_rates[..len].copy_from_slice(&event.rates[..len]);
        self.subframe_retries[..len].copy_from_slice(&event.retries[..len]);
        if self.curr_retries + reported > self.max_retries {
            return false;
        }
        self.curr_retries += reported;
        self.batch.iter_mut().for_each(Frame::set_retry);
        true
    }
    /// Take the batch, with the headers reattached.
    pub fn take_batch(&mut self) -> Vec<Frame> {
        core::mem::take(&mut self.batch)
            .into_iter()
            .map(Frame::restore_header)
            .collect()
    }
    /// Reset the descriptor to the unmapped state.
    pub fn clear(&mut self) {
        *self = Self::new();
    }
    /// Check if the descriptor belongs to the VIF, and optionally peer and queues.
    pub fn matches(&self, vif: usize, peer: Option<PeerSlot>, queues: AcMask) -> bool {
        self.vif == vif && peer.is_none_or(|peer| peer == self.peer) && queues.contains(self.ac)
    }
    pub fn submit_request(&self, token: TokenId, chanctx: ChanCtxId, retry: bool) -> SubmitRequest<'_> {
        let len = self.batch.len().min(MAX_SUBFRAMES);
        SubmitRequest {
            queue: self.ac,
            token,
            chanctx,
            frames: &self.batch,
            header_len: self.hdr_len,
            more_frames: self.more_frames,
            retry,
            adjusted_rates: self.adjusted_rates.then(|| AdjustedRates {
                rates: &self.subframe_rates[..len],
                retries: &self.subframe_retries[..len],
            }),
        }
    }
}

/// One [InFlightDescriptor] per token.
pub struct DescriptorTable {
    descriptors: Vec<InFlightDescriptor>,
}
impl DescriptorTable {
    pub fn new(num_tokens: usize) -> Self {
        Self {
            descriptors: (0..num_tokens).map(|_| InFlightDescriptor::new()).collect(),
        }
    }
    pub fn get(&self, token: TokenId) -> Option<&InFlightDescriptor> {
        self.descriptors.get(token.0)
    }
    pub fn get_mut(&mut self, token: TokenId) -> Option<&mut InFlightDescriptor> {
        self.descriptors.get_mut(token.0)
    }
    pub fn iter(&self) -> impl Iterator<Item = (TokenId, &InFlightDescriptor)> {
        self.descriptors
            .iter()
            .enumerate()
            .map(|(token, descriptor)| (TokenId(token), descriptor))
    }
    /// The amount of frames bound to descriptors.
    pub fn frames_in_flight(&self) -> usize {
        self.descriptors
            .iter()
            .map(|descriptor| descriptor.batch.len())
            .sum()
    }
    pub fn clear(&mut self) {
        self.descriptors
            .iter_mut()
            .for_each(InFlightDescriptor::clear);
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec;

    use super::*;
    use crate::{
        completion::TxDoneStatus,
        frame::tests::qos_data,
        rate::{CandidateRate, TxRate},
        types::MacAddress,
    };

    fn bound(retry_tries: u8) -> InFlightDescriptor {
        let mut descriptor = InFlightDescriptor::new();
        let mut first = qos_data([MacAddress([2, 0, 0, 0, 0, 1]); 3], true);
        first.info_mut().rates[0] = Some(CandidateRate {
            rate: TxRate::default(),
            tries: retry_tries,
        });
        descriptor.batch = vec![first, qos_data([MacAddress([2, 0, 0, 0, 0, 1]); 3], true)];
        descriptor.bind(
            ChanCtxId(1),
            ChanCtxType::Operational,
            AccessCategory::BestEffort,
            PeerSlot(3),
            4,
        );
        descriptor
    }

    #[test]
    fn bind_detaches_headers_and_stamps_fields() {
        let mut descriptor = bound(6);
        assert_eq!(descriptor.chanctx, Some(ChanCtxId(1)));
        assert_eq!(descriptor.hdr_len, 26);
        assert_eq!(descriptor.max_retries, 6);
        assert!(descriptor.batch.iter().all(Frame::is_header_detached));
        assert!(descriptor.matches(0, Some(PeerSlot(3)), AcMask::ALL));
        assert!(!descriptor.matches(0, None, AcMask::EMPTY.with(AccessCategory::Voice)));

        let request = descriptor.submit_request(TokenId(1), ChanCtxId(1), false);
        assert_eq!(request.frames.len(), 2);
        assert!(request.adjusted_rates.is_none());

        let frames = descriptor.take_batch();
        assert!(frames.iter().all(|frame| !frame.is_header_detached()));
        assert!(descriptor.is_idle());
    }

    #[test]
    fn missing_rate_tries_use_default_budget() {
        assert_eq!(bound(0).max_retries, 4);
    }

    #[test]
    fn channel_switch_budget() {
        let mut descriptor = bound(5);
        let mut event = TxDoneEvent::new(
            TokenId(1),
            AccessCategory::BestEffort,
            TxDoneStatus::DiscardChannelSwitch,
        );
        event.retries[0] = 3;
        event.rates[0] = 22;
        assert!(descriptor.record_channel_switch(&event));
        assert_eq!(descriptor.curr_retries, 3);
        assert!(descriptor
            .batch
            .iter()
            .all(|frame| frame.frame_control().retry()));
        event.retries[0] = 2;
        assert!(descriptor.record_channel_switch(&event));
        event.retries[0] = 1;
        assert!(!descriptor.record_channel_switch(&event));
        assert_eq!(descriptor.curr_retries, 5);

        let request = descriptor.submit_request(TokenId(1), ChanCtxId(1), true);
        let adjusted = request.adjusted_rates.unwrap();
        assert_eq!(adjusted.rates, &[22, 0]);
        assert_eq!(adjusted.retries, &[1, 0]);
    }
}
