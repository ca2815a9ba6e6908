//! # `wlan-tx-sched`
//! This is the host side transmit scheduler for Wi-Fi MACs, that offload transmission to firmware
//! and expose only a small, fixed number of transmit descriptors over a command channel.
//! It multiplexes the traffic of many peers and access categories onto those descriptors, which we
//! call tokens.
//! ## Overview
//! This chapter will give a short overview of how a frame travels through the scheduler.
//!
//! ### Admission
//! A frame is handed to [Scheduler::submit] together with the peer slot and access category it's
//! for. Frames without a peer slot, like broadcast and multicast frames, are queued on the
//! broadcast slot of their VIF. Every combination of channel context type, peer slot and access
//! category has its own FIFO, which we call a pending queue. If a pending queue reaches the high
//! watermark, the frame source is told to stop handing us frames for that category, until the
//! queue drained below half of the watermark.
//!
//! ### Tokens
//! The tokens are partitioned into reserved and spare tokens. Each category owns a few reserved
//! tokens, which are laid out with a stride of the amount of categories, so for the default
//! layout token 0 belongs to background, token 1 to best effort and so on. The tokens after the
//! reserved area are shared between all data categories. Once a category already has its reserved
//! tokens in flight, and the new frame could be aggregated with the frames already queued, we
//! don't allocate another token, but wait for one to complete, so the next batch gets larger.
//!
//! ### Transmit opportunities
//! When a token was acquired, or just completed, a round robin cursor per channel context and
//! category selects the next peer with pending frames. The cursor only moves past a peer, once
//! that peer was actually serviced. From that peer's queue, we build a batch of frames, that can
//! be sent as one A-MPDU. The firmware expects all MPDUs of an A-MPDU to have the same addresses,
//! so the batch ends at the first frame with different addresses. The headers of the frames are
//! detached and the batch is handed to the [TxTransport].
//!
//! ### Completion
//! The firmware reports a completion event per token, which can be queued from interrupt context
//! through a [TxDoneQueue]. Processing an event hands every frame back to the [FrameSink] with a
//! [TxOutcome], and immediately tries to refill the token. A reserved token is only refilled for
//! its own category, while a spare token is offered to all categories from voice down to
//! background. If nothing is pending, the token is released.
//!
//! If the firmware dropped a batch, because it switched to another channel context, the batch
//! stays on its token. It's resubmitted with the retry bit set, once its channel context is
//! current again, unless the retry budget of the batch is used up.
//!
//! ### Draining
//! For teardown, [Scheduler::flush] waits for all frames of a VIF or peer to leave the scheduler,
//! polling at a fixed tick and giving up after a bounded amount of ticks. If that fails,
//! [Scheduler::discard] and [Scheduler::force_clear_in_flight] drop everything left.
//!
//! ## Locking
//! All state is guarded by a single [embassy_sync::blocking_mutex::Mutex]. The lock is never held
//! across an await point, and the [FrameSink] is only called after it was released.

#![cfg_attr(not(test), no_std)]
extern crate alloc;

#[macro_use]
pub(crate) mod fmt;

mod aggregation;
mod completion;
mod config;
mod descriptor;
mod drain;
mod error;
mod frame;
mod opportunity;
mod pending;
mod rate;
mod scheduler;
mod stats;
mod sync;
mod token;
mod topology;
mod transport;
mod types;

pub use aggregation::{build_batch, check_aggregation, BatchLimits, NoAggReason};
pub use completion::*;
pub use config::*;
pub use descriptor::{DescriptorTable, InFlightDescriptor};
pub use drain::{DrainTarget, DrainTicker};
pub use error::*;
pub use frame::*;
pub use opportunity::OpportunityCursors;
pub use pending::*;
pub use rate::*;
pub use scheduler::{Scheduler, SubmitOutcome};
pub use stats::*;
pub use sync::TxDoneQueue;
pub use token::TokenPool;
pub use topology::*;
pub use transport::*;
pub use types::*;

cfg_if::cfg_if! {
    if #[cfg(feature = "critical_section")] {
        /// The raw mutex used, if none is specified.
        pub type DefaultRawMutex = embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
    } else {
        /// The raw mutex used, if none is specified.
        pub type DefaultRawMutex = embassy_sync::blocking_mutex::raw::NoopRawMutex;
    }
}
