use alloc::{collections::VecDeque, vec::Vec};

use crate::{frame::Frame, stats::TxStats};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Why a frame can't join an aggregate.
pub enum NoAggReason {
    NotQos,
    NotAmpdu,
    /// The firmware expects A1, A2 and A3 to be identical for all MPDUs of an A-MPDU.
    AddressMismatch,
}

/// Check if `frame` can be aggregated with `first`.
///
/// Without a first frame, only the frame itself is checked.
pub fn check_aggregation(first: Option<&Frame>, frame: &Frame) -> Result<(), NoAggReason> {
    if !frame.is_qos_data() {
        return Err(NoAggReason::NotQos);
    }
    if !frame.info().ampdu {
        return Err(NoAggReason::NotAmpdu);
    }
    if first.is_some_and(|first| first.addresses() != frame.addresses()) {
        return Err(NoAggReason::AddressMismatch);
    }
    Ok(())
}

/// Like [check_aggregation], but counts the reason a frame was rejected.
pub(crate) fn check_aggregation_counted(
    first: Option<&Frame>,
    frame: &Frame,
    stats: &TxStats,
) -> bool {
    match check_aggregation(first, frame) {
        Ok(()) => true,
        Err(reason) => {
            match reason {
                NoAggReason::NotQos => stats.count_noagg_not_qos(),
                NoAggReason::NotAmpdu => stats.count_noagg_not_ampdu(),
                NoAggReason::AddressMismatch => stats.count_noagg_not_addr(),
            }
            trace!("Frame not aggregated: {:?}", reason);
            false
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// Limits for a single batch.
pub struct BatchLimits {
    pub max_batch: usize,
    pub max_batch_ht: usize,
    pub vht_support: bool,
}
impl BatchLimits {
    /// The batch limit for an aggregate starting with `first`.
    ///
    /// Aggregates sent at an HT MCS are capped, if the hardware also supports VHT.
    pub fn for_first_frame(&self, first: &Frame) -> usize {
        let first_rate_is_ht = first.info().rates[0].is_some_and(|rate| rate.rate.is_ht());
        if self.vht_support && first_rate_is_ht {
            self.max_batch.min(self.max_batch_ht)
        } else {
            self.max_batch
        }
    }
}

/// Move frames from the head of `queue` into `batch`.
///
/// Frames are moved in order, as long as they can be aggregated with the first frame of the batch
/// and the batch limit isn't reached. If no frame qualifies, the head of the queue is moved anyway.
/// Returns the amount of frames moved.
pub fn build_batch(
    queue: &mut VecDeque<Frame>,
    batch: &mut Vec<Frame>,
    limits: &BatchLimits,
    stats: &TxStats,
) -> usize {
    let Some(head) = queue.front() else {
        return 0;
    };
    let max_batch = limits.for_first_frame(batch.first().unwrap_or(head));
    let mut moved = 0;
    while batch.len() < max_batch {
        let Some(frame) = queue.front() else {
            break;
        };
        if !check_aggregation_counted(batch.first(), frame, stats) {
            break;
        }
        if let Some(frame) = queue.pop_front() {
            batch.push(frame);
            moved += 1;
        }
    }
    if moved == 0 {
        if let Some(frame) = queue.pop_front() {
            batch.push(frame);
            moved = 1;
        }
    }
    moved
}
