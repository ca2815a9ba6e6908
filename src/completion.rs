use macro_bits::serializable_enum;

use crate::{
    config::MAX_SUBFRAMES,
    rate::{RateTable, TxRate, MAX_RATES, RATE_CODE_MCS_FLAG},
    types::{AccessCategory, TokenId},
};

serializable_enum! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    /// The per sub-frame status reported by the firmware.
    pub enum TxDoneStatus: u8 {
        #[default]
        Success => 0,
        RetryLimit => 1,
        /// The frame was discarded and never transmitted.
        Discard => 2,
        /// The beacon wasn't transmitted.
        DiscardBeacon => 3,
        /// The frame wasn't transmitted, because the firmware switched to another channel context.
        DiscardChannelSwitch => 4
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// A completion event for one descriptor.
///
/// This is a fixed size value, so it can be created in interrupt context without allocating.
pub struct TxDoneEvent {
    pub token: TokenId,
    /// The queue the descriptor was submitted on.
    pub queue: AccessCategory,
    pub statuses: [TxDoneStatus; MAX_SUBFRAMES],
    /// The rate code the sub-frame was last transmitted at.
    pub rates: [u8; MAX_SUBFRAMES],
    /// Retries per sub-frame.
    pub retries: [u8; MAX_SUBFRAMES],
    /// Power detector output, sampled by the aux ADC.
    pub pdout: u8,
}
impl TxDoneEvent {
    /// Create an event with the same status for all sub-frames.
    pub const fn new(token: TokenId, queue: AccessCategory, status: TxDoneStatus) -> Self {
        Self {
            token,
            queue,
            statuses: [status; MAX_SUBFRAMES],
            rates: [0; MAX_SUBFRAMES],
            retries: [0; MAX_SUBFRAMES],
            pdout: 0,
        }
    }
    /// The event used in place of a firmware completion, if the transport rejected a batch.
    pub const fn synthetic_failure(token: TokenId, queue: AccessCategory) -> Self {
        Self::new(token, queue, TxDoneStatus::RetryLimit)
    }
    pub fn status(&self, subframe: usize) -> TxDoneStatus {
        self.statuses
            .get(subframe)
            .copied()
            .unwrap_or(TxDoneStatus::Discard)
    }
    pub fn rate(&self, subframe: usize) -> u8 {
        self.rates.get(subframe).copied().unwrap_or_default()
    }
    pub fn retries(&self, subframe: usize) -> u8 {
        self.retries.get(subframe).copied().unwrap_or_default()
    }
    /// Check if the firmware dropped the batch because of a channel context switch.
    pub fn is_channel_switch_discard(&self) -> bool {
        self.statuses[0] == TxDoneStatus::DiscardChannelSwitch
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TxResult {
    Acked,
    NotAcked,
    /// The frame was never transmitted.
    Dropped,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// How often a candidate rate was tried.
pub struct RateAttempt {
    pub rate: TxRate,
    pub count: u8,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// The status attached to a frame, when it's handed back to the frame source.
pub struct TxOutcome {
    pub result: TxResult,
    /// The frame was part of an A-MPDU, for which no block ack was received.
    pub ampdu_no_ba: bool,
    /// The candidate rates up to, and including, the one the frame was finally sent at.
    pub attempts: [Option<RateAttempt>; MAX_RATES],
}
impl TxOutcome {
    pub const fn dropped() -> Self {
        Self {
            result: TxResult::Dropped,
            ampdu_no_ba: false,
            attempts: [None; MAX_RATES],
        }
    }
    /// Derive the outcome of a sub-frame.
    ///
    /// All sub-frames of a batch share the candidate rates of the first frame.
    pub fn from_status(
        status: TxDoneStatus,
        ampdu: bool,
        first_rates: &RateTable,
        rate_code: u8,
        retries: u8,
    ) -> Self {
        if status == TxDoneStatus::Discard {
            return Self::dropped();
        }
        let acked = status == TxDoneStatus::Success;
        Self {
            result: if acked {
                TxResult::Acked
            } else {
                TxResult::NotAcked
            },
            ampdu_no_ba: !acked && ampdu,
            attempts: match_rate_attempts(first_rates, rate_code, retries),
        }
    }
    pub const fn is_acked(&self) -> bool {
        matches!(self.result, TxResult::Acked)
    }
}

/// Attribute the reported transmissions to the candidate rate they happened at.
///
/// The candidates are walked in order until the reported rate code is found. An MCS rate code
/// stops the walk at the first candidate, even if it doesn't match. All candidates after the one
/// the walk stopped at are invalidated.
pub fn match_rate_attempts(
    first_rates: &RateTable,
    rate_code: u8,
    retries: u8,
) -> [Option<RateAttempt>; MAX_RATES] {
    let mut attempts = [None; MAX_RATES];
    let is_mcs_code = rate_code & RATE_CODE_MCS_FLAG != 0;
    for (attempt, candidate) in attempts.iter_mut().zip(first_rates.iter()) {
        let Some(candidate) = candidate else {
            break;
        };
        let matched = candidate.rate.matches_code(rate_code);
        *attempt = Some(RateAttempt {
            rate: candidate.rate,
            count: if matched {
                retries.saturating_add(1)
            } else {
                0
            },
        });
        if matched || is_mcs_code {
            break;
        }
    }
    attempts
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// The result of a beacon transmission.
pub struct BeaconReport {
    /// `Some(true)` if the beacon was sent, `Some(false)` if the firmware skipped it.
    pub sent: Option<bool>,
    /// Rearm the beacon timer after this many TU. `None` if the VIF is gone or stopped beaconing.
    pub rearm_after: Option<u16>,
}
impl BeaconReport {
    /// The beacon was dropped before the firmware reported on it.
    pub const DROPPED: Self = Self {
        sent: None,
        rearm_after: None,
    };
    pub fn sent_from_status(status: TxDoneStatus) -> Option<bool> {
        match status {
            TxDoneStatus::Success => Some(true),
            TxDoneStatus::DiscardBeacon => Some(false),
            _ => None,
        }
    }
}
