use alloc::vec::Vec;

use bitfield_struct::bitfield;

use crate::{
    error::{SchedulerError, SchedulerResult},
    rate::RateTable,
    types::MacAddress,
};

#[bitfield(u16)]
#[derive(PartialEq, Eq)]
/// The frame control field of an 802.11 MAC header.
pub struct FrameControl {
    #[bits(2)]
    pub protocol_version: u8,
    #[bits(2)]
    pub frame_type: u8,
    #[bits(4)]
    pub subtype: u8,
    pub to_ds: bool,
    pub from_ds: bool,
    pub more_fragments: bool,
    pub retry: bool,
    pub power_management: bool,
    pub more_data: bool,
    pub protected: bool,
    pub order: bool,
}
impl FrameControl {
    const TYPE_MANAGEMENT: u8 = 0;
    const TYPE_DATA: u8 = 2;
    const SUBTYPE_BEACON: u8 = 8;
    /// Data subtypes with this bit set carry a QoS control field.
    const SUBTYPE_QOS_BIT: u8 = 0b1000;

    pub const fn is_data(&self) -> bool {
        self.frame_type() == Self::TYPE_DATA
    }
    pub const fn is_qos_data(&self) -> bool {
        self.is_data() && self.subtype() & Self::SUBTYPE_QOS_BIT != 0
    }
    pub const fn is_beacon(&self) -> bool {
        self.frame_type() == Self::TYPE_MANAGEMENT && self.subtype() == Self::SUBTYPE_BEACON
    }
    /// The length of the MAC header described by this frame control field.
    pub const fn header_len(&self) -> usize {
        let mut len = 24;
        if self.is_data() && self.to_ds() && self.from_ds() {
            len += 6;
        }
        if self.is_qos_data() {
            len += 2;
            if self.order() {
                len += 4;
            }
        }
        len
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Transmit parameters handed down with a frame by the upper layer.
pub struct TxInfo {
    /// The VIF the frame is sent from.
    pub vif_index: usize,
    /// The frame may be part of an A-MPDU.
    pub ampdu: bool,
    /// The frame is meant for an off-channel (remain on channel) excursion.
    pub off_channel: bool,
    /// More broadcast frames follow this one.
    pub more_frames: bool,
    /// The rates chosen by rate control.
    pub rates: RateTable,
}

/// The minimum length of a frame we can schedule: frame control, duration and three addresses.
const MIN_FRAME_LEN: usize = 22;

/// An MPDU waiting for, or bound to, a transmit descriptor.
///
/// The buffer starts with the 802.11 MAC header. While the frame is in flight the header may be
/// detached, in which case [Frame::payload] no longer includes it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    buffer: Vec<u8>,
    detached: usize,
    info: TxInfo,
}
impl Frame {
    pub fn new(buffer: Vec<u8>, info: TxInfo) -> SchedulerResult<Self> {
        if buffer.len() < MIN_FRAME_LEN {
            return Err(SchedulerError::FrameTooShort);
        }
        Ok(Self {
            buffer,
            detached: 0,
            info,
        })
    }
    pub fn frame_control(&self) -> FrameControl {
        FrameControl::from_bits(u16::from_le_bytes([self.buffer[0], self.buffer[1]]))
    }
    fn address(&self, offset: usize) -> MacAddress {
        let mut address = [0u8; 6];
        address.copy_from_slice(&self.buffer[offset..offset + 6]);
        MacAddress(address)
    }
    /// Receiver address.
    pub fn addr1(&self) -> MacAddress {
        self.address(4)
    }
    /// Transmitter address.
    pub fn addr2(&self) -> MacAddress {
        self.address(10)
    }
    /// Usually the BSSID.
    pub fn addr3(&self) -> MacAddress {
        self.address(16)
    }
    /// The address triad used to decide, whether two frames can share an A-MPDU.
    pub fn addresses(&self) -> [MacAddress; 3] {
        [self.addr1(), self.addr2(), self.addr3()]
    }
    pub fn is_qos_data(&self) -> bool {
        self.frame_control().is_qos_data()
    }
    pub fn is_beacon(&self) -> bool {
        self.frame_control().is_beacon()
    }
    /// The length of the MAC header, clamped to the buffer.
    pub fn header_len(&self) -> usize {
        self.frame_control().header_len().min(self.buffer.len())
    }
    pub fn info(&self) -> &TxInfo {
        &self.info
    }
    pub fn info_mut(&mut self) -> &mut TxInfo {
        &mut self.info
    }
    /// The complete MPDU, independent of whether the header is detached.
    pub fn mpdu(&self) -> &[u8] {
        &self.buffer
    }
    /// The part of the buffer handed to the transport as frame body.
    pub fn payload(&self) -> &[u8] {
        &self.buffer[self.detached..]
    }
    /// The header bytes currently detached from the payload.
    pub fn detached_header(&self) -> &[u8] {
        &self.buffer[..self.detached]
    }
    pub fn is_header_detached(&self) -> bool {
        self.detached != 0
    }
    /// Detach `len` bytes of header from the payload.
    ///
    /// This has no effect, if a header is already detached.
    pub fn detach_header(&mut self, len: usize) {
        if self.detached == 0 {
            self.detached = len.min(self.buffer.len());
        }
    }
    /// Reattach the header detached by [Frame::detach_header].
    pub fn restore_header(mut self) -> Self {
        self.detached = 0;
        self
    }
    /// Set the retry bit in the frame control field.
    pub fn set_retry(&mut self) {
        let frame_control = self.frame_control().with_retry(true).into_bits();
        self.buffer[..2].copy_from_slice(frame_control.to_le_bytes().as_slice());
    }
    pub fn len(&self) -> usize {
        self.buffer.len()
    }
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
    pub fn into_buffer(self) -> Vec<u8> {
        self.buffer
    }
}
