use portable_atomic::{AtomicU32, AtomicU8, AtomicUsize, Ordering};

/// The amount of aux ADC samples kept.
pub const AUX_ADC_SAMPLES: usize = 8;

/// Transmit path counters.
///
/// All counters are atomics, so they can be read without taking the scheduler lock.
pub struct TxStats {
    tx_cmds_from_stack: AtomicU32,
    tx_dones_to_stack: AtomicU32,
    tx_done_recv_count: AtomicU32,
    noagg_not_qos: AtomicU32,
    noagg_not_ampdu: AtomicU32,
    noagg_not_addr: AtomicU32,
    transport_errors: AtomicU32,
    protocol_errors: AtomicU32,
    pdout_samples: [AtomicU8; AUX_ADC_SAMPLES],
    pdout_index: AtomicUsize,
}
macro_rules! counter {
    ($name:ident, $increment:ident) => {
        pub fn $increment(&self) {
            self.$name.fetch_add(1, Ordering::Relaxed);
        }
    };
}
impl TxStats {
    pub const fn new() -> Self {
        Self {
            tx_cmds_from_stack: AtomicU32::new(0),
            tx_dones_to_stack: AtomicU32::new(0),
            tx_done_recv_count: AtomicU32::new(0),
            noagg_not_qos: AtomicU32::new(0),
            noagg_not_ampdu: AtomicU32::new(0),
            noagg_not_addr: AtomicU32::new(0),
            transport_errors: AtomicU32::new(0),
            protocol_errors: AtomicU32::new(0),
            pdout_samples: [const { AtomicU8::new(0) }; AUX_ADC_SAMPLES],
            pdout_index: AtomicUsize::new(0),
        }
    }
    counter!(tx_cmds_from_stack, count_tx_cmd);
    counter!(tx_dones_to_stack, count_tx_done);
    counter!(tx_done_recv_count, count_tx_done_recv);
    counter!(noagg_not_qos, count_noagg_not_qos);
    counter!(noagg_not_ampdu, count_noagg_not_ampdu);
    counter!(noagg_not_addr, count_noagg_not_addr);
    counter!(transport_errors, count_transport_error);
    counter!(protocol_errors, count_protocol_error);

    /// Record the power detector output reported with a completion.
    pub fn record_pdout(&self, pdout: u8) {
        let index = self.pdout_index.fetch_add(1, Ordering::Relaxed) % AUX_ADC_SAMPLES;
        self.pdout_samples[index].store(pdout, Ordering::Relaxed);
    }
    /// The aux ADC samples, oldest first.
    pub fn pdout_samples(&self) -> [u8; AUX_ADC_SAMPLES] {
        let next = self.pdout_index.load(Ordering::Relaxed);
        core::array::from_fn(|i| {
            self.pdout_samples[(next + i) % AUX_ADC_SAMPLES].load(Ordering::Relaxed)
        })
    }
    pub fn snapshot(&self) -> TxStatsSnapshot {
        TxStatsSnapshot {
            tx_cmds_from_stack: self.tx_cmds_from_stack.load(Ordering::Relaxed),
            tx_dones_to_stack: self.tx_dones_to_stack.load(Ordering::Relaxed),
            tx_done_recv_count: self.tx_done_recv_count.load(Ordering::Relaxed),
            noagg_not_qos: self.noagg_not_qos.load(Ordering::Relaxed),
            noagg_not_ampdu: self.noagg_not_ampdu.load(Ordering::Relaxed),
            noagg_not_addr: self.noagg_not_addr.load(Ordering::Relaxed),
            transport_errors: self.transport_errors.load(Ordering::Relaxed),
            protocol_errors: self.protocol_errors.load(Ordering::Relaxed),
            pdout_samples: self.pdout_samples(),
        }
    }
}
impl Default for TxStats {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// A copy of the [TxStats] counters.
pub struct TxStatsSnapshot {
    /// Non-beacon frames submitted by the frame source.
    pub tx_cmds_from_stack: u32,
    /// Frames completed towards the frame source.
    pub tx_dones_to_stack: u32,
    pub tx_done_recv_count: u32,
    pub noagg_not_qos: u32,
    pub noagg_not_ampdu: u32,
    pub noagg_not_addr: u32,
    pub transport_errors: u32,
    /// Completion events, that didn't match the descriptor state.
    pub protocol_errors: u32,
    pub pdout_samples: [u8; AUX_ADC_SAMPLES],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pdout_ring_wraps() {
        let stats = TxStats::new();
        for sample in 0..10 {
            stats.record_pdout(sample);
        }
        assert_eq!(stats.pdout_samples(), [2, 3, 4, 5, 6, 7, 8, 9]);
    }

    #[test]
    fn counters_show_up_in_snapshot() {
        let stats = TxStats::new();
        stats.count_tx_cmd();
        stats.count_tx_cmd();
        stats.count_noagg_not_addr();
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.tx_cmds_from_stack, 2);
        assert_eq!(snapshot.noagg_not_addr, 1);
        assert_eq!(snapshot.tx_dones_to_stack, 0);
    }
}
