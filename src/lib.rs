//! # ECSS PUS C packet stack core
//!
//! This crate contains the packet-level mechanics of a telemetry and telecommand stack according
//! to the [ECSS-E-ST-70-41C standard](https://ecss.nl/standard/ecss-e-st-70-41c-space-engineering-telemetry-and-telecommand-packet-utilization-15-april-2016/),
//! which is the Packet Utilisation Standard (PUS) used by spacecraft on-board software.
//!
//! It includes the following components:
//!
//!  - Space Packet primary header according to
//!    [CCSDS Blue Book 133.0-B-2](https://public.ccsds.org/Pubs/133x0b2e1.pdf) in this module.
//!  - The CRC-16 CCITT engine in [crc].
//!  - UTC and CUC time representation as well as a tick scheduler in [time].
//!  - A cursor based packet codec in [message].
//!  - The PUS primitives in [ecss]: message factory, request verification, parameter pool and
//!    statistics, parameter monitoring, packet store, sequence store, event-action and function
//!    tables.
//!  - Thin per-service glue in [services] and the [stack::PusStack] composition root which ties
//!    everything together.
//!
//! ## Features
//!
//! `pus-core` is a `no_std` crate which requires an allocator.
//!
//! Default features:
//!
//!  - [`std`](https://doc.rust-lang.org/std/): Enables the thread based periodic ticker and the
//!    system clock helpers.
//!  - `stddev`: Adds the standard deviation to parameter statistics reports.
//!
//! Optional features:
//!
//!  - [`serde`](https://serde.rs/): Serialization support for configuration and value types.
//!  - [`defmt`](https://defmt.ferrous-systems.com/): `defmt::Format` support for plain enums.
//!
//! ## Example
//!
//! ```rust
//! use pus_core::SpHeader;
//! let sp_header = SpHeader::tc(0x42, 12, 0).expect("Error creating SP header");
//! println!("{:?}", sp_header);
//! ```
#![no_std]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]
extern crate alloc;
#[cfg(any(feature = "std", test))]
extern crate std;

use delegate::delegate;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

pub mod config;
pub mod crc;
pub mod ecss;
pub mod message;
pub mod seq_count;
pub mod services;
pub mod stack;
pub mod time;

pub const CCSDS_HEADER_LEN: usize = core::mem::size_of::<crate::zc::SpHeader>();
pub const MAX_APID: u16 = 2u16.pow(11) - 1;
pub const MAX_SEQ_COUNT: u16 = 2u16.pow(14) - 1;

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ByteConversionError {
    /// The passed slice is too small. Returns the passed slice length and expected minimum size
    #[error("target slice with size {found} is too small, expected size of at least {expected}")]
    ToSliceTooSmall { found: usize, expected: usize },
    /// The provider buffer is too small. Returns the passed slice length and expected minimum size
    #[error("source slice with size {found} too small, expected at least {expected} bytes")]
    FromSliceTooSmall { found: usize, expected: usize },
}

#[derive(Debug, PartialEq, Eq, Copy, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PacketType {
    Tm = 0,
    Tc = 1,
}

impl From<bool> for PacketType {
    #[inline]
    fn from(is_tc: bool) -> Self {
        if is_tc {
            PacketType::Tc
        } else {
            PacketType::Tm
        }
    }
}

#[inline]
pub fn packet_type_in_raw_packet_id(packet_id: u16) -> PacketType {
    PacketType::from(((packet_id >> 12) & 0b1) == 1)
}

#[derive(Debug, PartialEq, Eq, Copy, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SequenceFlags {
    ContinuationSegment = 0b00,
    FirstSegment = 0b01,
    LastSegment = 0b10,
    Unsegmented = 0b11,
}

impl SequenceFlags {
    /// Only the two lowest bits of the passed value are considered, so this can not fail.
    #[inline]
    pub const fn from_raw(value: u8) -> Self {
        match value & 0b11 {
            0b00 => SequenceFlags::ContinuationSegment,
            0b01 => SequenceFlags::FirstSegment,
            0b10 => SequenceFlags::LastSegment,
            _ => SequenceFlags::Unsegmented,
        }
    }
}

/// Packet identification field of the CCSDS primary header, excluding the version bits.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PacketId {
    pub ptype: PacketType,
    pub sec_header_flag: bool,
    apid: u16,
}

impl PacketId {
    pub fn new(ptype: PacketType, sec_header_flag: bool, apid: u16) -> Option<PacketId> {
        let mut pid = PacketId {
            ptype,
            sec_header_flag,
            apid: 0,
        };
        pid.set_apid(apid).then_some(pid)
    }

    /// Set a new Application Process ID (APID). If the passed number is invalid, the APID will
    /// not be set and false will be returned. The maximum allowed value for the 11-bit field is
    /// 2047
    pub fn set_apid(&mut self, apid: u16) -> bool {
        if apid > MAX_APID {
            return false;
        }
        self.apid = apid;
        true
    }

    #[inline]
    pub fn apid(&self) -> u16 {
        self.apid
    }

    #[inline]
    pub fn raw(&self) -> u16 {
        ((self.ptype as u16) << 12) | ((self.sec_header_flag as u16) << 11) | self.apid
    }
}

impl From<u16> for PacketId {
    fn from(raw_id: u16) -> Self {
        PacketId {
            ptype: packet_type_in_raw_packet_id(raw_id),
            sec_header_flag: ((raw_id >> 11) & 0b1) != 0,
            apid: raw_id & MAX_APID,
        }
    }
}

#[derive(Debug, PartialEq, Eq, Copy, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PacketSequenceCtrl {
    pub seq_flags: SequenceFlags,
    seq_count: u16,
}

impl PacketSequenceCtrl {
    /// Returns [None] if the passed sequence count exceeds [MAX_SEQ_COUNT]
    pub fn new(seq_flags: SequenceFlags, seq_count: u16) -> Option<PacketSequenceCtrl> {
        let mut psc = PacketSequenceCtrl {
            seq_flags,
            seq_count: 0,
        };
        psc.set_seq_count(seq_count).then_some(psc)
    }

    #[inline]
    pub fn raw(&self) -> u16 {
        ((self.seq_flags as u16) << 14) | self.seq_count
    }

    /// Set a new sequence count. If the passed number is invalid, the sequence count will not be
    /// set and false will be returned. The maximum allowed value for the 14-bit field is 16383
    pub fn set_seq_count(&mut self, ssc: u16) -> bool {
        if ssc > MAX_SEQ_COUNT {
            return false;
        }
        self.seq_count = ssc;
        true
    }

    #[inline]
    pub fn seq_count(&self) -> u16 {
        self.seq_count
    }
}

impl From<u16> for PacketSequenceCtrl {
    fn from(raw: u16) -> Self {
        PacketSequenceCtrl {
            seq_flags: SequenceFlags::from_raw((raw >> 14) as u8),
            seq_count: raw & MAX_SEQ_COUNT,
        }
    }
}

/// Generic trait to access fields of a CCSDS space packet header according to CCSDS 133.0-B-2
pub trait CcsdsPacket {
    fn ccsds_version(&self) -> u8;
    fn packet_id(&self) -> PacketId;
    fn psc(&self) -> PacketSequenceCtrl;

    /// Retrieve data length field
    fn data_len(&self) -> u16;

    /// Retrieve the total packet size based on the data length field
    #[inline]
    fn total_len(&self) -> usize {
        usize::from(self.data_len()) + CCSDS_HEADER_LEN + 1
    }

    /// Retrieve 13 bit Packet Identification field. Can usually be retrieved with a bitwise AND
    /// of the first 2 bytes with 0x1FFF
    #[inline]
    fn packet_id_raw(&self) -> u16 {
        self.packet_id().raw()
    }

    /// Retrieve Packet Sequence Count
    #[inline]
    fn psc_raw(&self) -> u16 {
        self.psc().raw()
    }

    /// Retrieve Packet Type (TM: 0, TC: 1)
    #[inline]
    fn ptype(&self) -> PacketType {
        self.packet_id().ptype
    }

    #[inline]
    fn is_tm(&self) -> bool {
        self.ptype() == PacketType::Tm
    }

    #[inline]
    fn is_tc(&self) -> bool {
        self.ptype() == PacketType::Tc
    }

    /// Retrieve the secondary header flag. Returns true if a secondary header is present
    /// and false if it is not
    #[inline]
    fn sec_header_flag(&self) -> bool {
        self.packet_id().sec_header_flag
    }

    /// Retrieve Application Process ID
    #[inline]
    fn apid(&self) -> u16 {
        self.packet_id().apid
    }

    #[inline]
    fn seq_count(&self) -> u16 {
        self.psc().seq_count
    }

    #[inline]
    fn sequence_flags(&self) -> SequenceFlags {
        self.psc().seq_flags
    }
}

/// Space Packet Primary Header according to CCSDS 133.0-B-2
///
/// # Arguments
///
/// * `version` - CCSDS version field, occupies the first 3 bits of the raw header
/// * `packet_id` - Packet Identifier, which can also be used as a start marker. Occupies the last
///   13 bits of the first two bytes of the raw header
/// * `psc` - Packet Sequence Control, occupies the third and fourth byte of the raw header
/// * `data_len` - Data length field occupies the fifth and the sixth byte of the raw header
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SpHeader {
    pub version: u8,
    pub packet_id: PacketId,
    pub psc: PacketSequenceCtrl,
    pub data_len: u16,
}

impl Default for SpHeader {
    fn default() -> Self {
        SpHeader {
            version: 0,
            packet_id: PacketId {
                ptype: PacketType::Tm,
                apid: 0,
                sec_header_flag: true,
            },
            psc: PacketSequenceCtrl {
                seq_flags: SequenceFlags::Unsegmented,
                seq_count: 0,
            },
            data_len: 0,
        }
    }
}

impl SpHeader {
    /// Create a new Space Packet Header instance. This will return [None] if the APID or sequence
    /// count argument exceed [MAX_APID] or [MAX_SEQ_COUNT] respectively.
    pub fn new(
        ptype: PacketType,
        sec_header: bool,
        apid: u16,
        seq_count: u16,
        data_len: u16,
    ) -> Option<Self> {
        if seq_count > MAX_SEQ_COUNT || apid > MAX_APID {
            return None;
        }
        let mut header = SpHeader::default();
        header.packet_id.sec_header_flag = sec_header;
        header.packet_id.apid = apid;
        header.packet_id.ptype = ptype;
        header.psc.seq_count = seq_count;
        header.data_len = data_len;
        Some(header)
    }

    /// Helper function for PUS telemetry headers. The packet type and the secondary header
    /// flag are set accordingly.
    pub fn tm(apid: u16, seq_count: u16, data_len: u16) -> Option<Self> {
        Self::new(PacketType::Tm, true, apid, seq_count, data_len)
    }

    /// Helper function for PUS telecommand headers. The packet type and the secondary header
    /// flag are set accordingly.
    pub fn tc(apid: u16, seq_count: u16, data_len: u16) -> Option<Self> {
        Self::new(PacketType::Tc, true, apid, seq_count, data_len)
    }

    delegate!(to self.packet_id {
        pub fn set_apid(&mut self, apid: u16) -> bool;
    });

    delegate!(to self.psc {
        pub fn set_seq_count(&mut self, seq_count: u16) -> bool;
    });

    #[inline]
    pub fn set_seq_flags(&mut self, seq_flags: SequenceFlags) {
        self.psc.seq_flags = seq_flags;
    }

    #[inline]
    pub fn set_packet_type(&mut self, packet_type: PacketType) {
        self.packet_id.ptype = packet_type;
    }

    pub fn from_be_bytes(buf: &[u8]) -> Result<Self, ByteConversionError> {
        if buf.len() < CCSDS_HEADER_LEN {
            return Err(ByteConversionError::FromSliceTooSmall {
                found: buf.len(),
                expected: CCSDS_HEADER_LEN,
            });
        }
        // Can not fail, the length was checked.
        let zc_header = zc::SpHeader::from_bytes(&buf[0..CCSDS_HEADER_LEN]).ok_or(
            ByteConversionError::FromSliceTooSmall {
                found: buf.len(),
                expected: CCSDS_HEADER_LEN,
            },
        )?;
        Ok(Self::from(&zc_header))
    }

    pub fn write_to_be_bytes(&self, buf: &mut [u8]) -> Result<usize, ByteConversionError> {
        if buf.len() < CCSDS_HEADER_LEN {
            return Err(ByteConversionError::ToSliceTooSmall {
                found: buf.len(),
                expected: CCSDS_HEADER_LEN,
            });
        }
        let zc_header = zc::SpHeader::from(self);
        zc_header
            .to_bytes(&mut buf[0..CCSDS_HEADER_LEN])
            .ok_or(ByteConversionError::ToSliceTooSmall {
                found: buf.len(),
                expected: CCSDS_HEADER_LEN,
            })?;
        Ok(CCSDS_HEADER_LEN)
    }
}

impl CcsdsPacket for SpHeader {
    #[inline]
    fn ccsds_version(&self) -> u8 {
        self.version
    }

    #[inline]
    fn packet_id(&self) -> PacketId {
        self.packet_id
    }

    #[inline]
    fn psc(&self) -> PacketSequenceCtrl {
        self.psc
    }

    #[inline]
    fn data_len(&self) -> u16 {
        self.data_len
    }
}

impl From<&zc::SpHeader> for SpHeader {
    fn from(zc_header: &zc::SpHeader) -> Self {
        SpHeader {
            version: zc_header.ccsds_version(),
            packet_id: zc_header.packet_id(),
            psc: zc_header.psc(),
            data_len: zc_header.data_len(),
        }
    }
}

pub mod zc {
    use crate::{CcsdsPacket, PacketId, PacketSequenceCtrl};
    use zerocopy::byteorder::NetworkEndian;
    use zerocopy::{AsBytes, FromBytes, FromZeroes, Unaligned, U16};

    const VERSION_MASK: u16 = 0xE000;

    #[derive(FromZeroes, FromBytes, AsBytes, Unaligned, Debug)]
    #[repr(C)]
    pub struct SpHeader {
        version_packet_id: U16<NetworkEndian>,
        psc: U16<NetworkEndian>,
        data_len: U16<NetworkEndian>,
    }

    impl SpHeader {
        pub fn new(
            packet_id: PacketId,
            psc: PacketSequenceCtrl,
            data_len: u16,
            version: u8,
        ) -> Self {
            SpHeader {
                version_packet_id: U16::new(((version as u16 & 0b111) << 13) | packet_id.raw()),
                psc: U16::new(psc.raw()),
                data_len: U16::new(data_len),
            }
        }

        pub fn from_bytes(slice: &[u8]) -> Option<Self> {
            SpHeader::read_from(slice)
        }

        pub fn to_bytes(&self, slice: &mut [u8]) -> Option<()> {
            self.write_to(slice)
        }
    }

    impl From<&crate::SpHeader> for SpHeader {
        fn from(header: &crate::SpHeader) -> Self {
            SpHeader::new(header.packet_id, header.psc, header.data_len, header.version)
        }
    }

    impl CcsdsPacket for SpHeader {
        #[inline]
        fn ccsds_version(&self) -> u8 {
            ((self.version_packet_id.get() >> 13) as u8) & 0b111
        }

        #[inline]
        fn packet_id(&self) -> PacketId {
            PacketId::from(self.packet_id_raw())
        }

        #[inline]
        fn psc(&self) -> PacketSequenceCtrl {
            PacketSequenceCtrl::from(self.psc_raw())
        }

        #[inline]
        fn data_len(&self) -> u16 {
            self.data_len.get()
        }

        #[inline]
        fn packet_id_raw(&self) -> u16 {
            self.version_packet_id.get() & (!VERSION_MASK)
        }

        #[inline]
        fn psc_raw(&self) -> u16 {
            self.psc.get()
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        packet_type_in_raw_packet_id, zc, ByteConversionError, CcsdsPacket, PacketId,
        PacketSequenceCtrl, PacketType, SequenceFlags, SpHeader,
    };
    use zerocopy::AsBytes;

    #[test]
    fn test_seq_flag_helpers() {
        assert_eq!(
            SequenceFlags::from_raw(0b00),
            SequenceFlags::ContinuationSegment
        );
        assert_eq!(SequenceFlags::from_raw(0b01), SequenceFlags::FirstSegment);
        assert_eq!(SequenceFlags::from_raw(0b10), SequenceFlags::LastSegment);
        assert_eq!(SequenceFlags::from_raw(0b11), SequenceFlags::Unsegmented);
    }

    #[test]
    fn test_packet_id() {
        let packet_id =
            PacketId::new(PacketType::Tm, false, 0x42).expect("Packet ID creation failed");
        assert_eq!(packet_id.raw(), 0x0042);
        let packet_id_from_raw = PacketId::from(packet_id.raw());
        assert_eq!(
            packet_type_in_raw_packet_id(packet_id.raw()),
            PacketType::Tm
        );
        assert_eq!(packet_id_from_raw, packet_id);
    }

    #[test]
    fn test_invalid_packet_id() {
        let packet_id_invalid = PacketId::new(PacketType::Tc, true, 0xFFFF);
        assert!(packet_id_invalid.is_none());
    }

    #[test]
    fn test_packet_seq_ctrl() {
        let mut psc = PacketSequenceCtrl::new(SequenceFlags::ContinuationSegment, 77)
            .expect("PSC creation failed");
        assert_eq!(psc.raw(), 77);
        let psc_from_raw = PacketSequenceCtrl::from(psc.raw());
        assert_eq!(psc_from_raw, psc);
        // Fails because SSC is limited to 14 bits
        assert!(!psc.set_seq_count(2u16.pow(15)));
        assert_eq!(psc.raw(), 77);
        assert!(PacketSequenceCtrl::new(SequenceFlags::FirstSegment, 0xFFFF).is_none());
    }

    #[test]
    fn test_tc_header() {
        let sp_header = SpHeader::tc(0x42, 12, 0).expect("Error creating SP header");
        assert_eq!(sp_header.ccsds_version(), 0b000);
        assert!(sp_header.is_tc());
        assert!(sp_header.sec_header_flag());
        assert_eq!(sp_header.seq_count(), 12);
        assert_eq!(sp_header.apid(), 0x42);
        assert_eq!(sp_header.sequence_flags(), SequenceFlags::Unsegmented);
        assert_eq!(sp_header.packet_id_raw(), 0x1842);
        assert_eq!(sp_header.psc_raw(), 0xC00C);
        assert_eq!(sp_header.total_len(), 7);
    }

    #[test]
    fn test_sp_header_setters() {
        let mut sp_header = SpHeader::tc(0x42, 12, 0).expect("Error creating SP header");
        assert!(sp_header.set_apid(0x12));
        assert_eq!(sp_header.apid(), 0x12);
        assert!(!sp_header.set_apid(0xFFFF));
        assert!(sp_header.set_seq_count(0x45));
        assert_eq!(sp_header.seq_count(), 0x45);
        sp_header.set_packet_type(PacketType::Tm);
        assert_eq!(sp_header.ptype(), PacketType::Tm);
        sp_header.set_seq_flags(SequenceFlags::FirstSegment);
        assert_eq!(sp_header.sequence_flags(), SequenceFlags::FirstSegment);
    }

    #[test]
    fn test_zc_sph() {
        let sp_header = SpHeader::tc(0x7FF, 2u16.pow(14) - 1, 0).expect("Error creating SP header");
        let sp_header_zc = zc::SpHeader::from(&sp_header);
        let slice = sp_header_zc.as_bytes();
        assert_eq!(slice, &[0x1F, 0xFF, 0xFF, 0xFF, 0x00, 0x00]);

        let mut buf = [0; 6];
        assert_eq!(sp_header.write_to_be_bytes(&mut buf).unwrap(), 6);
        let read_back = SpHeader::from_be_bytes(&buf).unwrap();
        assert_eq!(read_back, sp_header);
        assert_eq!(read_back.apid(), 0x7FF);
    }

    #[test]
    fn test_header_too_short() {
        let res = SpHeader::from_be_bytes(&[0; 4]);
        assert_eq!(
            res.unwrap_err(),
            ByteConversionError::FromSliceTooSmall {
                found: 4,
                expected: 6
            }
        );
    }
}
