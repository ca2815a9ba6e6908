use macro_bits::serializable_enum;

serializable_enum! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    /// A non-HT rate, encoded in units of 500 kbit/s the way the firmware reports it.
    pub enum LegacyRate: u8 {
        #[default]
        Rate1M => 2,
        Rate2M => 4,
        Rate5_5M => 11,
        Rate11M => 22,
        Rate6M => 12,
        Rate9M => 18,
        Rate12M => 24,
        Rate18M => 36,
        Rate24M => 48,
        Rate36M => 72,
        Rate48M => 96,
        Rate54M => 108
    }
}
impl LegacyRate {
    /// Check if the rate uses the DSSS/CCK PHY.
    pub const fn is_dsss(&self) -> bool {
        matches!(self.into_bits(), 2 | 4 | 11 | 22)
    }
}

/// Rate codes with this bit set carry an MCS index instead of a legacy rate.
pub const RATE_CODE_MCS_FLAG: u8 = 0x80;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// The PHY rate a frame is transmitted at.
pub enum TxRate {
    Legacy(LegacyRate),
    /// HT MCS index 0-31.
    Ht { mcs: u8, short_gi: bool },
    /// VHT MCS index 0-9 with the number of spatial streams.
    Vht { mcs: u8, nss: u8, short_gi: bool },
}
impl TxRate {
    /// Check if the rate is using the HT PHY.
    pub const fn is_ht(&self) -> bool {
        matches!(self, Self::Ht { .. })
    }
    pub const fn is_vht(&self) -> bool {
        matches!(self, Self::Vht { .. })
    }
    /// Check if the rate uses a short guard interval.
    pub const fn is_short_gi(&self) -> bool {
        match self {
            Self::Legacy(_) => false,
            Self::Ht { short_gi, .. } | Self::Vht { short_gi, .. } => *short_gi,
        }
    }
    /// Check if a rate code reported by the firmware describes this rate.
    ///
    /// For MCS rates only the MCS index is compared, since the firmware doesn't report the
    /// guard interval.
    pub const fn matches_code(&self, code: u8) -> bool {
        let is_mcs_code = code & RATE_CODE_MCS_FLAG != 0;
        match self {
            Self::Legacy(rate) => !is_mcs_code && rate.into_bits() == code,
            Self::Ht { mcs, .. } => is_mcs_code && (code & 0x7f) == (*mcs & 0x7f),
            Self::Vht { mcs, .. } => is_mcs_code && (code & 0x0f) == (*mcs & 0x0f),
        }
    }
}
impl Default for TxRate {
    fn default() -> Self {
        Self::Legacy(LegacyRate::default())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// One entry of the rate table chosen by rate control.
pub struct CandidateRate {
    pub rate: TxRate,
    /// How often the firmware may try this rate.
    pub tries: u8,
}

/// The maximum amount of candidate rates per frame.
pub const MAX_RATES: usize = 4;

/// The candidate rate table of a frame, in the order the firmware tries them.
pub type RateTable = [Option<CandidateRate>; MAX_RATES];

/// The total amount of transmissions the rate table allows.
pub fn total_tries(rates: &RateTable) -> u32 {
    rates.iter().flatten().map(|rate| rate.tries as u32).sum()
}
