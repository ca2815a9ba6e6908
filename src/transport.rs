use crate::{
    completion::{BeaconReport, TxOutcome},
    error::TransportError,
    frame::Frame,
    types::{AccessCategory, ChanCtxId, TokenId},
};

#[derive(Clone, Copy, Debug)]
/// Rate and retry information recorded from a channel switch discard.
///
/// These are passed along, when the batch is resubmitted, so the firmware can continue where it
/// left off.
pub struct AdjustedRates<'a> {
    pub rates: &'a [u8],
    pub retries: &'a [u8],
}

#[derive(Clone, Copy, Debug)]
/// A batch of frames bound to a descriptor.
pub struct SubmitRequest<'a> {
    pub queue: AccessCategory,
    pub token: TokenId,
    pub chanctx: ChanCtxId,
    /// The frames with their MAC headers detached.
    pub frames: &'a [Frame],
    /// The length of the header detached from the first frame.
    pub header_len: usize,
    /// More broadcast frames follow this batch.
    pub more_frames: bool,
    /// This is a retransmission after a channel switch discard.
    pub retry: bool,
    pub adjusted_rates: Option<AdjustedRates<'a>>,
}

/// The command channel to the firmware.
///
/// The transport is called with the scheduler lock held, so it must neither block nor call back
/// into the scheduler.
pub trait TxTransport {
    fn submit_batch(&mut self, request: SubmitRequest<'_>) -> Result<(), TransportError>;
}

/// The upper layer, that frames are handed back to.
///
/// All methods are called after the scheduler lock was released.
pub trait FrameSink {
    /// A frame left the scheduler, either transmitted or dropped.
    fn tx_done(&self, frame: Frame, outcome: TxOutcome);
    /// Stop handing frames of this category to the scheduler.
    fn stop_flow(&self, ac: AccessCategory);
    fn resume_flow(&self, ac: AccessCategory);
    /// A beacon of the VIF completed.
    fn beacon_done(&self, _vif: usize, _beacon: Frame, _report: BeaconReport) {}
    /// At least one frame of the VIF completed, which may end a power save absence.
    fn vif_tx_done(&self, _vif: usize) {}
    /// The last off-channel frame of an off-channel transmit excursion completed.
    fn off_channel_tx_done(&self) {}
}
