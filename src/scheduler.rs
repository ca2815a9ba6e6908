use alloc::vec::Vec;
use core::cell::RefCell;

use embassy_sync::blocking_mutex::{raw::RawMutex, Mutex};
use embassy_time::Ticker;
use macro_bits::{bit, check_bit};

use crate::{
    aggregation::{build_batch, check_aggregation_counted, BatchLimits},
    completion::{BeaconReport, TxDoneEvent, TxOutcome},
    config::SchedulerConfig,
    descriptor::DescriptorTable,
    error::{SchedulerError, SchedulerResult},
    fmt::RateLimit,
    frame::Frame,
    opportunity::OpportunityCursors,
    pending::{FlowControl, PendingKey, PendingQueueSet},
    stats::TxStats,
    token::TokenPool,
    topology::{RocState, Topology},
    transport::{FrameSink, TxTransport},
    types::{AcMask, AccessCategory, ChanCtxId, ChanCtxType, PeerSlot, TokenId},
    DefaultRawMutex,
};

/// The category remain on channel frames are sent on. It's never stopped during an excursion.
const ROC_AC: AccessCategory = AccessCategory::Voice;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// What happened to a submitted frame.
pub enum SubmitOutcome {
    /// The frame was queued, and possibly already handed to the transport.
    Admitted,
    /// The frame was queued, but its queue reached the high watermark and the flow was stopped.
    QueueStopped,
    /// The VIF or peer isn't accepting frames. The frame was completed as dropped.
    Refused,
}

/// Everything, that has to be told to the [FrameSink], once the lock is released.
pub(crate) enum SinkEvent {
    TxDone(Frame, TxOutcome),
    StopFlow(AccessCategory),
    ResumeFlow(AccessCategory),
    BeaconDone(usize, Frame, BeaconReport),
    VifTxDone(usize),
    OffChannelTxDone,
}
pub(crate) struct Outbox {
    events: Vec<SinkEvent>,
}
impl Outbox {
    pub const fn new() -> Self {
        Self { events: Vec::new() }
    }
    pub fn push(&mut self, event: SinkEvent) {
        self.events.push(event);
    }
    /// Hand a frame back as dropped.
    ///
    /// Beacons go back to their VIF unsent and without rearming the beacon timer.
    pub fn drop_frame(&mut self, frame: Frame, stats: &TxStats) {
        if frame.is_beacon() {
            let vif = frame.info().vif_index;
            self.push(SinkEvent::BeaconDone(vif, frame, BeaconReport::DROPPED));
        } else {
            stats.count_tx_done();
            self.push(SinkEvent::TxDone(frame, TxOutcome::dropped()));
        }
    }
    pub fn deliver(self, sink: &impl FrameSink) {
        for event in self.events {
            match event {
                SinkEvent::TxDone(frame, outcome) => sink.tx_done(frame, outcome),
                SinkEvent::StopFlow(ac) => sink.stop_flow(ac),
                SinkEvent::ResumeFlow(ac) => sink.resume_flow(ac),
                SinkEvent::BeaconDone(vif, beacon, report) => sink.beacon_done(vif, beacon, report),
                SinkEvent::VifTxDone(vif) => sink.vif_tx_done(vif),
                SinkEvent::OffChannelTxDone => sink.off_channel_tx_done(),
            }
        }
    }
}

/// A batch ready to be handed to the transport.
#[derive(Clone, Copy)]
pub(crate) struct Transmit {
    token: TokenId,
    retry: bool,
}

/// The state guarded by the scheduler lock.
pub(crate) struct TxState<T> {
    pub(crate) config: SchedulerConfig,
    pub(crate) transport: T,
    pub(crate) pool: TokenPool,
    pub(crate) descriptors: DescriptorTable,
    pub(crate) pending: PendingQueueSet,
    pub(crate) cursors: OpportunityCursors,
    pub(crate) flow: FlowControl,
    pub(crate) topology: Topology,
    pub(crate) current_chanctx: Option<ChanCtxId>,
    pub(crate) last_beacon_sent: bool,
    protocol_errors: RateLimit,
}
impl<T: TxTransport> TxState<T> {
    fn new(config: SchedulerConfig, transport: T) -> Self {
        let pending = PendingQueueSet::new(&config);
        Self {
            transport,
            pool: TokenPool::new(config.layout),
            descriptors: DescriptorTable::new(config.layout.num_tokens),
            cursors: OpportunityCursors::new(config.max_chanctx, pending.pend_q_per_ac()),
            pending,
            flow: FlowControl::new(config.queue_high_watermark),
            topology: Topology::new(&config),
            current_chanctx: None,
            last_beacon_sent: false,
            protocol_errors: RateLimit::new(),
            config,
        }
    }
    /// The channel context, for which transmit opportunities are currently handed out.
    ///
    /// Without multi channel support, there's only context zero.
    pub(crate) fn service_chanctx(&self) -> Option<ChanCtxId> {
        if self.config.multi_channel {
            self.current_chanctx
        } else {
            Some(ChanCtxId(0))
        }
    }
    fn batch_limits(&self) -> BatchLimits {
        BatchLimits {
            max_batch: self.config.max_batch,
            max_batch_ht: self.config.max_batch_ht,
            vht_support: self.config.vht_support,
        }
    }
    /// Fill the idle descriptor of `token` from the next peer, that has frames for `ac`.
    ///
    /// Returns `true`, if at least one frame was bound to the descriptor.
    fn fill(
        &mut self,
        token: TokenId,
        ac: AccessCategory,
        chanctx: ChanCtxId,
        stats: &TxStats,
        outbox: &mut Outbox,
    ) -> bool {
        let limits = self.batch_limits();
        let default_max_retries = self.config.default_max_retries;
        let Self {
            cursors,
            topology,
            pending,
            descriptors,
            flow,
            ..
        } = self;
        let Some((peer, chan_type)) = cursors.next_ready_peer(chanctx, ac, |peer| {
            let chan_type = topology.service_type(chanctx, peer, ac)?;
            let key = pending.normalize(PendingKey::new(chan_type, peer, ac));
            (!pending.is_empty(key)).then_some(key.chan_type)
        }) else {
            return false;
        };
        let key = PendingKey::new(chan_type, peer, ac);
        let (Some(queue), Some(descriptor)) = (pending.queue_mut(key), descriptors.get_mut(token))
        else {
            return false;
        };
        if !descriptor.is_idle() {
            error!("Attempted to fill token {}, which still holds frames.", token.0);
            return false;
        }
        let moved = build_batch(queue, &mut descriptor.batch, &limits, stats);
        if moved == 0 {
            return false;
        }
        if flow.check_resume(ac, queue.len()) {
            outbox.push(SinkEvent::ResumeFlow(ac));
        }
        descriptor.bind(chanctx, chan_type, ac, peer, default_max_retries);
        trace!(
            "Bound {} frames of peer {} to token {} for AC {}.",
            moved,
            peer.0,
            token.0,
            ac.index()
        );
        true
    }
    /// Refill a token, whose batch just completed, from the current channel context.
    ///
    /// A reserved token is only offered to its own category, a spare one to all data categories
    /// from highest to lowest priority. If the token ends up serving another category, the
    /// outstanding token credit moves with it.
    fn refill(
        &mut self,
        token: TokenId,
        completed_ac: AccessCategory,
        stats: &TxStats,
        outbox: &mut Outbox,
    ) -> Option<AccessCategory> {
        let chanctx = self.service_chanctx()?;
        let layout = *self.pool.layout();
        for ac in layout.candidates(token) {
            if self.fill(token, ac, chanctx, stats, outbox) {
                if ac != completed_ac {
                    self.pool.transfer(token, completed_ac, ac);
                }
                return Some(ac);
            }
        }
        None
    }
    /// Return an idle token to the pool.
    fn release(&mut self, token: TokenId, ac: AccessCategory) {
        self.pool.release(token, ac);
        if let Some(descriptor) = self.descriptors.get_mut(token) {
            descriptor.clear();
        }
    }
    /// Hand the batch bound to `token` to the transport.
    ///
    /// If the transport rejects it, the batch is completed as failed, which may in turn refill the
    /// token with another batch.
    pub(crate) fn transmit(
        &mut self,
        token: TokenId,
        retry: bool,
        stats: &TxStats,
        outbox: &mut Outbox,
    ) {
        let mut next = Some(Transmit { token, retry });
        while let Some(Transmit { token, retry }) = next.take() {
            let Some(descriptor) = self.descriptors.get(token) else {
                return;
            };
            let (Some(chanctx), false) = (descriptor.chanctx, descriptor.is_idle()) else {
                return;
            };
            let queue = descriptor.ac;
            let frames = descriptor.batch.len();
            let result = self
                .transport
                .submit_batch(descriptor.submit_request(token, chanctx, retry));
            match result {
                Ok(()) => trace!(
                    "Submitted {} frames on token {}, retry: {}",
                    frames,
                    token.0,
                    retry
                ),
                Err(err) => {
                    error!(
                        "Transport rejected token {} with {}, dropping {} frames.",
                        token.0,
                        err.0,
                        frames
                    );
                    stats.count_transport_error();
                    next = self.reconcile(
                        &TxDoneEvent::synthetic_failure(token, queue),
                        stats,
                        outbox,
                    );
                }
            }
        }
    }
    fn protocol_error(&mut self, event: &TxDoneEvent, reason: &str, stats: &TxStats) {
        stats.count_protocol_error();
        if self.protocol_errors.check() {
            error!(
                "Dropping completion for token {} on queue {}: {}",
                event.token.0,
                event.queue.index(),
                reason
            );
        }
    }
    /// Process a completion event.
    ///
    /// Returns the token, if it was refilled or rearmed and has to be submitted again.
    pub(crate) fn reconcile(
        &mut self,
        event: &TxDoneEvent,
        stats: &TxStats,
        outbox: &mut Outbox,
    ) -> Option<Transmit> {
        let token = event.token;
        let Some((mapped, idle)) = self
            .descriptors
            .get(token)
            .map(|descriptor| (descriptor.chanctx.is_some(), descriptor.is_idle()))
        else {
            self.protocol_error(event, "token out of range", stats);
            return None;
        };
        if !mapped {
            self.protocol_error(event, "unexpected channel context", stats);
            return None;
        }
        if idle || !self.pool.is_busy(token) {
            self.protocol_error(event, "no frames in flight", stats);
            return None;
        }
        if event.is_channel_switch_discard() {
            return self.channel_switch_discard(event, stats, outbox);
        }
        trace!(
            "TX done for token {}, queue {}, status {}",
            token.0,
            event.queue.index(),
            event.status(0).into_bits()
        );
        self.finish_batch(event, stats, outbox)
    }
    /// Complete the batch of the token in `event` and refill or release the token.
    fn finish_batch(
        &mut self,
        event: &TxDoneEvent,
        stats: &TxStats,
        outbox: &mut Outbox,
    ) -> Option<Transmit> {
        let token = event.token;
        let descriptor = self.descriptors.get_mut(token)?;
        let ac = descriptor.ac;
        let chan_type = descriptor.chan_type;
        let frames = descriptor.take_batch();
        descriptor.clear();

        let refilled = self.refill(token, ac, stats, outbox);
        if refilled.is_none() {
            self.release(token, ac);
        }
        self.complete_frames(frames, event, chan_type, stats, outbox);
        refilled.map(|_| Transmit {
            token,
            retry: false,
        })
    }
    /// The firmware dropped the batch, because it left the channel context.
    ///
    /// The batch stays on its token and is resubmitted with the retry bit set, once its context
    /// is current. Only if the retry budget is used up, the frames are completed.
    fn channel_switch_discard(
        &mut self,
        event: &TxDoneEvent,
        stats: &TxStats,
        outbox: &mut Outbox,
    ) -> Option<Transmit> {
        let token = event.token;
        let current = self.service_chanctx();
        let descriptor = self.descriptors.get_mut(token)?;
        if !descriptor.record_channel_switch(event) {
            debug!(
                "Retries exceeded for token {} after channel switch: {} of {}.",
                token.0,
                descriptor.curr_retries + event.retries(0) as u32,
                descriptor.max_retries
            );
            return self.finish_batch(event, stats, outbox);
        }
        if current.is_some() && descriptor.chanctx == current {
            descriptor.withheld = false;
            debug!("Resubmitting token {} with retry bit set.", token.0);
            Some(Transmit { token, retry: true })
        } else {
            descriptor.withheld = true;
            debug!(
                "Withholding token {} until its channel context is current again.",
                token.0
            );
            None
        }
    }
    /// Hand completed frames back to the frame source.
    fn complete_frames(
        &mut self,
        frames: Vec<Frame>,
        event: &TxDoneEvent,
        chan_type: ChanCtxType,
        stats: &TxStats,
        outbox: &mut Outbox,
    ) {
        let Some(first_rates) = frames.first().map(|frame| frame.info().rates) else {
            return;
        };
        let mut vif_bitmap = 0u32;
        for (subframe, frame) in frames.into_iter().enumerate() {
            if chan_type == ChanCtxType::OffChannel && self.topology.off_channel_frame_done() {
                outbox.push(SinkEvent::OffChannelTxDone);
            }
            let status = event.status(subframe);
            let vif = frame.info().vif_index;
            if frame.is_beacon() {
                let sent = BeaconReport::sent_from_status(status);
                if let Some(sent) = sent {
                    self.last_beacon_sent = sent;
                }
                let report = BeaconReport {
                    sent,
                    rearm_after: self.topology.beacon_rearm_interval(vif),
                };
                outbox.push(SinkEvent::BeaconDone(vif, frame, report));
                continue;
            }
            if vif < 32 {
                vif_bitmap |= bit!(vif);
            }
            let outcome = TxOutcome::from_status(
                status,
                frame.info().ampdu,
                &first_rates,
                event.rate(subframe),
                event.retries(subframe),
            );
            stats.count_tx_done();
            outbox.push(SinkEvent::TxDone(frame, outcome));
        }
        (0..self.config.max_vifs.min(32))
            .filter(|vif| check_bit!(vif_bitmap, bit!(*vif)))
            .for_each(|vif| outbox.push(SinkEvent::VifTxDone(vif)));
    }
    fn submit(
        &mut self,
        frame: Frame,
        peer: Option<PeerSlot>,
        ac: AccessCategory,
        stats: &TxStats,
        outbox: &mut Outbox,
    ) -> SubmitOutcome {
        if !frame.is_beacon() {
            stats.count_tx_cmd();
        }
        let slot = peer.unwrap_or(self.topology.broadcast_slot(frame.info().vif_index));
        if self.topology.is_blocked(slot) {
            debug!("Refusing frame for peer slot {}.", slot.0);
            outbox.drop_frame(frame, stats);
            return SubmitOutcome::Refused;
        }
        let chan_type = self.topology.classify_submission(&frame);
        let key = self.pending.normalize(PendingKey::new(chan_type, slot, ac));

        // Frames are only held back, while a batch of the category is in flight to pick them up.
        let outstanding = self.pool.outstanding(ac);
        let hold_back = outstanding > 0 && outstanding >= self.config.layout.reserved_per_ac && {
            let first = self.pending.queue(key).and_then(|queue| queue.front());
            let aggregable = check_aggregation_counted(first, &frame, stats);
            // Wait for the queue to fill up, so the next batch is as large as possible.
            (aggregable || !self.config.early_agg_checks)
                && self.pending.len(key) + 1 < self.config.max_batch
        };
        let queue_len = match self.pending.push(key, frame) {
            Ok(queue_len) => queue_len,
            Err(frame) => {
                outbox.drop_frame(frame, stats);
                return SubmitOutcome::Refused;
            }
        };
        if key.chan_type == ChanCtxType::OffChannel {
            self.topology.off_channel_frames += 1;
        }

        let mut outcome = SubmitOutcome::Admitted;
        let roc_exempt = self.topology.roc.in_progress && ac == ROC_AC;
        if !roc_exempt && self.flow.check_stop(ac, queue_len) {
            debug!("Stopping flow for AC {}, queue length: {}", ac.index(), queue_len);
            outbox.push(SinkEvent::StopFlow(ac));
            outcome = SubmitOutcome::QueueStopped;
        }
        if hold_back {
            trace!("Holding back frame for aggregation, outstanding: {}", outstanding);
            return outcome;
        }

        let Some(chanctx) = self.service_chanctx() else {
            return outcome;
        };
        let Some(token) = self.pool.acquire(ac) else {
            trace!("No token available for AC {}, frame queued.", ac.index());
            return outcome;
        };
        if self.fill(token, ac, chanctx, stats, outbox) {
            self.transmit(token, false, stats, outbox);
        } else {
            // The frame was queued for a channel context, that isn't current.
            self.release(token, ac);
        }
        outcome
    }
    fn has_pending(&self, ac: AccessCategory) -> bool {
        self.pending
            .keys()
            .any(|key| key.ac == ac && !self.pending.is_empty(key))
    }
    /// Acquire a token for every category, that has frames pending, but no token in flight.
    ///
    /// Frames held back for aggregation rely on a token of their category completing. If the
    /// last such token was handed to another category, nothing would pick them up otherwise.
    fn restart_idle_categories(&mut self, stats: &TxStats, outbox: &mut Outbox) {
        let Some(chanctx) = self.service_chanctx() else {
            return;
        };
        for ac in AccessCategory::ALL {
            if self.pool.outstanding(ac) != 0 || !self.has_pending(ac) {
                continue;
            }
            let Some(token) = self.pool.acquire(ac) else {
                continue;
            };
            if self.fill(token, ac, chanctx, stats, outbox) {
                trace!("Restarted AC {} on token {}.", ac.index(), token.0);
                self.transmit(token, false, stats, outbox);
            } else {
                self.release(token, ac);
            }
        }
    }
    /// Resubmit withheld batches of the new context and hand idle tokens to its pending frames.
    fn sweep(&mut self, chanctx: ChanCtxId, stats: &TxStats, outbox: &mut Outbox) {
        let layout = *self.pool.layout();
        for token in self.pool.tokens() {
            if self.pool.is_busy(token) {
                let Some(descriptor) = self.descriptors.get_mut(token) else {
                    continue;
                };
                if descriptor.withheld && descriptor.chanctx == Some(chanctx) {
                    descriptor.withheld = false;
                    self.transmit(token, true, stats, outbox);
                }
                continue;
            }
            for ac in layout.candidates(token) {
                if !self.pool.acquire_exact(token, ac) {
                    continue;
                }
                if self.fill(token, ac, chanctx, stats, outbox) {
                    self.transmit(token, false, stats, outbox);
                    break;
                }
                self.release(token, ac);
            }
        }
    }
    /// Check the token invariants.
    fn is_consistent(&self) -> bool {
        self.pool.is_consistent()
            && self
                .descriptors
                .iter()
                .all(|(token, descriptor)| self.pool.is_busy(token) != descriptor.is_idle())
    }
}

/// The transmit scheduler.
///
/// All state lives behind a single blocking mutex, which is only ever held for bounded,
/// non-blocking sections. The [FrameSink] is only called after that lock was released, so it may
/// submit frames again right away.
pub struct Scheduler<T, S, M: RawMutex = DefaultRawMutex> {
    pub(crate) state: Mutex<M, RefCell<TxState<T>>>,
    pub(crate) sink: S,
    pub(crate) stats: TxStats,
}
impl<T: TxTransport, S: FrameSink, M: RawMutex> Scheduler<T, S, M> {
    /// Create a new scheduler.
    ///
    /// All tokens are free, all queues empty and the current channel context is unresolved.
    pub fn new(config: SchedulerConfig, transport: T, sink: S) -> SchedulerResult<Self> {
        config.validate()?;
        debug!(
            "Initializing TX scheduler with {} tokens, {} reserved per AC.",
            config.layout.num_tokens,
            config.layout.reserved_per_ac
        );
        Ok(Self {
            state: Mutex::new(RefCell::new(TxState::new(config, transport))),
            sink,
            stats: TxStats::new(),
        })
    }
    /// Run `f` with the state locked and deliver everything it produced to the sink afterwards.
    pub(crate) fn with_state<R>(
        &self,
        f: impl FnOnce(&mut TxState<T>, &TxStats, &mut Outbox) -> R,
    ) -> R {
        let mut outbox = Outbox::new();
        let result = self
            .state
            .lock(|state| f(&mut state.borrow_mut(), &self.stats, &mut outbox));
        outbox.deliver(&self.sink);
        result
    }
    pub(crate) fn read_state<R>(&self, f: impl FnOnce(&TxState<T>) -> R) -> R {
        self.state.lock(|state| f(&state.borrow()))
    }
    pub fn config(&self) -> SchedulerConfig {
        self.read_state(|state| state.config)
    }
    pub fn stats(&self) -> &TxStats {
        &self.stats
    }
    pub fn sink(&self) -> &S {
        &self.sink
    }
    /// Access the transport with the lock held.
    pub fn with_transport<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        self.state.lock(|state| f(&mut state.borrow_mut().transport))
    }
    /// A ticker with the configured drain period, for use with the flush operations.
    pub fn drain_ticker(&self) -> Ticker {
        Ticker::every(self.read_state(|state| state.config.drain_tick))
    }

    pub fn add_vif(&self, vif: usize) -> SchedulerResult<()> {
        self.with_state(|state, _, _| state.topology.add_vif(vif))
    }
    /// Remove a VIF and all peers associated with it.
    ///
    /// Frames still queued for it should be flushed or discarded beforehand.
    pub fn remove_vif(&self, vif: usize) -> SchedulerResult<()> {
        self.with_state(|state, _, _| state.topology.remove_vif(vif))
    }
    pub fn set_vif_chanctx(
        &self,
        vif: usize,
        chanctx: Option<ChanCtxId>,
        off_chanctx: Option<ChanCtxId>,
    ) -> SchedulerResult<()> {
        self.with_state(|state, _, _| state.topology.set_vif_chanctx(vif, chanctx, off_chanctx))
    }
    /// Configure beaconing for a VIF. The interval is in TU.
    pub fn set_beacon(&self, vif: usize, enabled: bool, interval: u16) -> SchedulerResult<()> {
        self.with_state(|state, _, _| state.topology.set_beacon(vif, enabled, interval))
    }
    pub fn add_peer(&self, peer: PeerSlot, vif: usize) -> SchedulerResult<()> {
        self.with_state(|state, _, _| state.topology.add_peer(peer, vif))
    }
    pub fn remove_peer(&self, peer: PeerSlot) -> SchedulerResult<()> {
        self.with_state(|state, _, _| state.topology.remove_peer(peer))
    }
    pub fn set_roc(&self, roc: RocState) -> SchedulerResult<()> {
        self.with_state(|state, _, _| state.topology.set_roc(roc))
    }

    /// Queue a frame for transmission.
    ///
    /// Frames for an associated station pass its peer slot. Frames without one are queued on the
    /// broadcast slot of their VIF. Buffered broadcast frames are sent on
    /// [AccessCategory::Beacon] and may set [TxInfo::more_frames](crate::TxInfo::more_frames).
    /// If a token is available, a batch is built and submitted right away.
    pub fn submit(&self, frame: Frame, peer: Option<PeerSlot>, ac: AccessCategory) -> SubmitOutcome {
        self.with_state(|state, stats, outbox| state.submit(frame, peer, ac, stats, outbox))
    }
    /// Process a completion event reported by the firmware.
    pub fn on_tx_done(&self, event: &TxDoneEvent) {
        self.stats.count_tx_done_recv();
        self.stats.record_pdout(event.pdout);
        self.with_state(|state, stats, outbox| {
            if let Some(Transmit { token, retry }) = state.reconcile(event, stats, outbox) {
                state.transmit(token, retry, stats, outbox);
            }
            state.restart_idle_categories(stats, outbox);
        })
    }
    /// The firmware switched to another channel context.
    ///
    /// Batches withheld for this context are resubmitted and idle tokens are filled with frames
    /// pending for it.
    pub fn on_channel_switched(&self, chanctx: ChanCtxId) -> SchedulerResult<()> {
        self.with_state(|state, stats, outbox| {
            if chanctx.0 >= state.config.max_chanctx {
                return Err(SchedulerError::InvalidChannelContext);
            }
            debug!("Switched to channel context {}.", chanctx.0);
            state.current_chanctx = Some(chanctx);
            state.sweep(chanctx, stats, outbox);
            Ok(())
        })
    }

    /// The amount of tokens accounted to `ac`.
    pub fn outstanding_tokens(&self, ac: AccessCategory) -> usize {
        self.read_state(|state| state.pool.outstanding(ac))
    }
    /// Busy tokens as a bitmask.
    pub fn busy_tokens(&self) -> u64 {
        self.read_state(|state| state.pool.busy_mask())
    }
    pub fn pending_len(&self, key: PendingKey) -> usize {
        self.read_state(|state| state.pending.len(key))
    }
    pub fn total_pending(&self) -> usize {
        self.read_state(|state| state.pending.total_len())
    }
    pub fn stopped_flows(&self) -> AcMask {
        self.read_state(|state| state.flow.stopped())
    }
    /// The amount of frames bound to a token.
    pub fn in_flight_len(&self, token: TokenId) -> usize {
        self.read_state(|state| {
            state
                .descriptors
                .get(token)
                .map(|descriptor| descriptor.batch.len())
                .unwrap_or_default()
        })
    }
    /// The amount of frames bound to all tokens.
    pub fn frames_in_flight(&self) -> usize {
        self.read_state(|state| state.descriptors.frames_in_flight())
    }
    /// The category a busy token is accounted to.
    pub fn token_owner(&self, token: TokenId) -> Option<AccessCategory> {
        self.read_state(|state| state.pool.owner(token))
    }
    /// Check if a token holds a batch waiting for its channel context.
    pub fn is_withheld(&self, token: TokenId) -> bool {
        self.read_state(|state| {
            state
                .descriptors
                .get(token)
                .is_some_and(|descriptor| descriptor.withheld)
        })
    }
    pub fn current_chanctx(&self) -> Option<ChanCtxId> {
        self.read_state(|state| state.current_chanctx)
    }
    /// Whether the last completed beacon was actually sent.
    pub fn last_beacon_sent(&self) -> bool {
        self.read_state(|state| state.last_beacon_sent)
    }
    /// Check, that the outstanding counters match the token bitmap and that exactly the busy
    /// tokens hold frames.
    pub fn is_consistent(&self) -> bool {
        self.read_state(TxState::is_consistent)
    }
}
