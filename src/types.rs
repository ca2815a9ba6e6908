use core::fmt;

use macro_bits::{bit, check_bit};

/// The number of access categories including the beacon category.
pub const NUM_ACS: usize = 5;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// A traffic priority class.
///
/// The discriminant is the hardware queue index. Higher values have higher priority, except for
/// [AccessCategory::Beacon], which is scheduled by the firmware independently.
pub enum AccessCategory {
    Background = 0,
    BestEffort = 1,
    Video = 2,
    Voice = 3,
    Beacon = 4,
}
impl AccessCategory {
    /// All categories in queue index order.
    pub const ALL: [AccessCategory; NUM_ACS] = [
        Self::Background,
        Self::BestEffort,
        Self::Video,
        Self::Voice,
        Self::Beacon,
    ];
    /// The data categories, from highest to lowest priority.
    ///
    /// This is the order in which a spare token is offered to the categories.
    pub const BY_PRIORITY: [AccessCategory; 4] = [
        Self::Voice,
        Self::Video,
        Self::BestEffort,
        Self::Background,
    ];
    /// The hardware queue index.
    pub const fn index(self) -> usize {
        self as usize
    }
    /// Returns the category for a hardware queue index.
    pub const fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Self::Background),
            1 => Some(Self::BestEffort),
            2 => Some(Self::Video),
            3 => Some(Self::Voice),
            4 => Some(Self::Beacon),
            _ => None,
        }
    }
    /// Maps an upper layer queue number (0 = voice ... 3 = background) to a category.
    ///
    /// Out of range queue numbers are treated as voice.
    pub const fn from_stack_queue(queue: usize) -> Self {
        match queue {
            1 => Self::Video,
            2 => Self::BestEffort,
            3 => Self::Background,
            _ => Self::Voice,
        }
    }
    /// The upper layer queue number for this category.
    ///
    /// The beacon category has no upper layer queue and maps to `None`.
    pub const fn stack_queue(self) -> Option<usize> {
        match self {
            Self::Voice => Some(0),
            Self::Video => Some(1),
            Self::BestEffort => Some(2),
            Self::Background => Some(3),
            Self::Beacon => None,
        }
    }
    pub const fn is_beacon(self) -> bool {
        matches!(self, Self::Beacon)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// A set of access categories, with one bit per hardware queue index.
pub struct AcMask(u8);
impl AcMask {
    pub const EMPTY: Self = Self(0);
    pub const ALL: Self = Self(0b11111);

    pub const fn from_bits(bits: u8) -> Self {
        Self(bits & Self::ALL.0)
    }
    pub const fn bits(self) -> u8 {
        self.0
    }
    pub const fn contains(self, ac: AccessCategory) -> bool {
        check_bit!(self.0, bit!(ac.index()))
    }
    pub fn insert(&mut self, ac: AccessCategory) {
        self.0 |= bit!(ac.index());
    }
    pub fn remove(&mut self, ac: AccessCategory) {
        self.0 &= !bit!(ac.index());
    }
    pub const fn with(self, ac: AccessCategory) -> Self {
        Self(self.0 | bit!(ac.index()))
    }
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
    pub fn iter(self) -> impl Iterator<Item = AccessCategory> {
        AccessCategory::ALL
            .into_iter()
            .filter(move |ac| self.contains(*ac))
    }
}
impl FromIterator<AccessCategory> for AcMask {
    fn from_iter<I: IntoIterator<Item = AccessCategory>>(iter: I) -> Self {
        let mut mask = Self::EMPTY;
        for ac in iter {
            mask.insert(ac);
        }
        mask
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// The index of a hardware transmit descriptor.
pub struct TokenId(pub usize);
impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Identifies a pending queue slot within one access category.
///
/// Slots `0..max_peers` belong to associated stations. The slots after that are the
/// broadcast/multicast queues, one per VIF.
pub struct PeerSlot(pub usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// A channel context identifier, as handed out by the channel context manager.
pub struct ChanCtxId(pub u8);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Whether a frame is meant for the operating channel of its VIF or for an off-channel
/// excursion.
pub enum ChanCtxType {
    #[default]
    Operational = 0,
    OffChannel = 1,
}
impl ChanCtxType {
    pub const COUNT: usize = 2;
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// A 48-bit IEEE 802 MAC address.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MacAddress(pub [u8; 6]);
impl MacAddress {
    pub const BROADCAST: Self = Self([0xff; 6]);
    pub const fn is_multicast(&self) -> bool {
        check_bit!(self.0[0], bit!(0))
    }
}
impl fmt::Debug for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stack_queue_mapping_round_trips_for_data_categories() {
        for ac in AccessCategory::BY_PRIORITY {
            let queue = ac.stack_queue().unwrap();
            assert_eq!(AccessCategory::from_stack_queue(queue), ac);
        }
        assert_eq!(AccessCategory::Beacon.stack_queue(), None);
        assert_eq!(AccessCategory::from_stack_queue(9), AccessCategory::Voice);
    }

    #[test]
    fn ac_mask_membership() {
        let mask: AcMask = [AccessCategory::Voice, AccessCategory::Background]
            .into_iter()
            .collect();
        assert!(mask.contains(AccessCategory::Voice));
        assert!(!mask.contains(AccessCategory::BestEffort));
        assert_eq!(mask.iter().count(), 2);
        assert_eq!(AcMask::from_bits(0xff), AcMask::ALL);
    }

    #[test]
    fn multicast_bit() {
        assert!(MacAddress::BROADCAST.is_multicast());
        assert!(!MacAddress([0x02, 0, 0, 0, 0, 1]).is_multicast());
    }
}
