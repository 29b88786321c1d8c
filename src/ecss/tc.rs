//! PUS C telecommand definitions.
//!
//! # Examples
//!
//! ```rust
//! use pus_core::SpHeader;
//! use pus_core::ecss::tc::{PusTcCreator, PusTcSecondaryHeader};
//! use pus_core::message::Message;
//!
//! // Create a ping telecommand with no user application data
//! let sp_header = SpHeader::tc(0x02, 0x34, 0).unwrap();
//! let pus_tc = PusTcCreator::new(sp_header, PusTcSecondaryHeader::new_simple(17, 1), &[], true);
//! assert_eq!(pus_tc.len_written(), 13);
//!
//! let raw = pus_tc.to_vec().unwrap();
//! let msg = Message::from_bytes(&raw, 1024).unwrap();
//! assert_eq!(msg.service_type(), 17);
//! assert_eq!(msg.message_type(), 1);
//! assert!(msg.has_valid_crc());
//! ```
use crate::crc::{CRC_CCITT_FALSE, CRC_LEN};
use crate::ecss::{PusError, PusVersion};
use crate::message::Message;
use crate::{CcsdsPacket, PacketType, SpHeader, CCSDS_HEADER_LEN};
use alloc::vec::Vec;
use core::mem::size_of;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use zerocopy::AsBytes;

/// PUS C secondary header length is fixed
pub const TC_SECONDARY_HEADER_LEN: usize = size_of::<zc::PusTcSecondaryHeader>();
pub const TC_HEADER_LEN: usize = CCSDS_HEADER_LEN + TC_SECONDARY_HEADER_LEN;

/// Acknowledgement flags of a telecommand. The requester sets one flag for each verification
/// stage which should be reported on success. Failures are always reported.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AckFlags(u8);

impl AckFlags {
    pub const NONE: Self = AckFlags(0);
    pub const ACCEPTANCE: Self = AckFlags(0b1000);
    pub const START: Self = AckFlags(0b0100);
    pub const PROGRESS: Self = AckFlags(0b0010);
    pub const COMPLETION: Self = AckFlags(0b0001);
    pub const ALL: Self = AckFlags(0b1111);

    /// Only the lowest four bits are considered.
    #[inline]
    pub const fn from_raw(raw: u8) -> Self {
        AckFlags(raw & 0b1111)
    }

    #[inline]
    pub const fn raw(&self) -> u8 {
        self.0
    }

    #[inline]
    pub const fn union(self, other: Self) -> Self {
        AckFlags(self.0 | other.0)
    }

    #[inline]
    pub const fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub const fn acceptance(&self) -> bool {
        self.contains(Self::ACCEPTANCE)
    }

    #[inline]
    pub const fn start(&self) -> bool {
        self.contains(Self::START)
    }

    #[inline]
    pub const fn progress(&self) -> bool {
        self.contains(Self::PROGRESS)
    }

    #[inline]
    pub const fn completion(&self) -> bool {
        self.contains(Self::COMPLETION)
    }
}

pub mod zc {
    use crate::ecss::tc::AckFlags;
    use zerocopy::{AsBytes, FromBytes, FromZeroes, NetworkEndian, Unaligned, U16};

    #[derive(FromZeroes, FromBytes, AsBytes, Unaligned)]
    #[repr(C)]
    pub struct PusTcSecondaryHeader {
        version_ack: u8,
        service: u8,
        message_type: u8,
        source_id: U16<NetworkEndian>,
    }

    impl From<&crate::ecss::tc::PusTcSecondaryHeader> for PusTcSecondaryHeader {
        fn from(value: &crate::ecss::tc::PusTcSecondaryHeader) -> Self {
            PusTcSecondaryHeader {
                version_ack: ((value.version as u8) << 4) | value.ack_flags.raw(),
                service: value.service,
                message_type: value.message_type,
                source_id: U16::new(value.source_id),
            }
        }
    }

    impl PusTcSecondaryHeader {
        pub fn from_bytes(slice: &[u8]) -> Option<Self> {
            Self::read_from_prefix(slice)
        }

        #[inline]
        pub fn pus_version_raw(&self) -> u8 {
            self.version_ack >> 4
        }

        #[inline]
        pub fn ack_flags(&self) -> AckFlags {
            AckFlags::from_raw(self.version_ack)
        }

        #[inline]
        pub fn service(&self) -> u8 {
            self.service
        }

        #[inline]
        pub fn message_type(&self) -> u8 {
            self.message_type
        }

        #[inline]
        pub fn source_id(&self) -> u16 {
            self.source_id.get()
        }
    }
}

#[derive(PartialEq, Eq, Copy, Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PusTcSecondaryHeader {
    pub service: u8,
    pub message_type: u8,
    pub source_id: u16,
    pub ack_flags: AckFlags,
    pub version: PusVersion,
}

impl PusTcSecondaryHeader {
    pub const HEADER_LEN: usize = TC_SECONDARY_HEADER_LEN;

    /// All acknowledgement flags set and source ID 0.
    #[inline]
    pub fn new_simple(service: u8, message_type: u8) -> Self {
        Self::new(service, message_type, AckFlags::ALL, 0)
    }

    #[inline]
    pub fn new(service: u8, message_type: u8, ack_flags: AckFlags, source_id: u16) -> Self {
        PusTcSecondaryHeader {
            service,
            message_type,
            source_id,
            ack_flags,
            version: PusVersion::PusC,
        }
    }
}

impl TryFrom<&zc::PusTcSecondaryHeader> for PusTcSecondaryHeader {
    type Error = PusError;

    fn try_from(value: &zc::PusTcSecondaryHeader) -> Result<Self, Self::Error> {
        if value.pus_version_raw() != PusVersion::PusC as u8 {
            return Err(PusError::VersionNotSupported(value.pus_version_raw()));
        }
        Ok(PusTcSecondaryHeader::new(
            value.service(),
            value.message_type(),
            value.ack_flags(),
            value.source_id(),
        ))
    }
}

/// Creates the raw byte representation of a PUS C telecommand.
///
/// This is used by ground side tooling and tests, and to build the stored requests of the
/// sequence store and the event-action table.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PusTcCreator<'app_data> {
    sp_header: SpHeader,
    pub sec_header: PusTcSecondaryHeader,
    app_data: &'app_data [u8],
    has_checksum: bool,
}

impl<'app_data> PusTcCreator<'app_data> {
    /// The packet type and the secondary header flag of the passed space packet header are set
    /// by the constructor. The data length field is calculated.
    pub fn new(
        mut sp_header: SpHeader,
        sec_header: PusTcSecondaryHeader,
        app_data: &'app_data [u8],
        has_checksum: bool,
    ) -> Self {
        sp_header.set_packet_type(PacketType::Tc);
        sp_header.packet_id.sec_header_flag = true;
        let mut pus_tc = Self {
            sp_header,
            sec_header,
            app_data,
            has_checksum,
        };
        pus_tc.update_ccsds_data_len();
        pus_tc
    }

    /// Simplified version of [Self::new] which only requires the service and message type.
    pub fn new_simple(
        sp_header: SpHeader,
        service: u8,
        message_type: u8,
        app_data: &'app_data [u8],
    ) -> Self {
        Self::new(
            sp_header,
            PusTcSecondaryHeader::new_simple(service, message_type),
            app_data,
            true,
        )
    }

    #[inline]
    pub fn sp_header(&self) -> &SpHeader {
        &self.sp_header
    }

    #[inline]
    pub fn app_data(&self) -> &[u8] {
        self.app_data
    }

    #[inline]
    pub fn set_ack_flags(&mut self, ack_flags: AckFlags) {
        self.sec_header.ack_flags = ack_flags;
    }

    #[inline]
    pub fn set_source_id(&mut self, source_id: u16) {
        self.sec_header.source_id = source_id;
    }

    delegate::delegate!(to self.sp_header {
        pub fn set_apid(&mut self, apid: u16) -> bool;
        pub fn set_seq_count(&mut self, seq_count: u16) -> bool;
    });

    #[inline]
    pub fn update_ccsds_data_len(&mut self) {
        self.sp_header.data_len = (self.len_written() - CCSDS_HEADER_LEN - 1) as u16;
    }

    pub fn len_written(&self) -> usize {
        let mut len = TC_HEADER_LEN + self.app_data.len();
        if self.has_checksum {
            len += CRC_LEN;
        }
        len
    }

    /// Write the raw packet to the passed buffer and return the number of written bytes.
    pub fn write_to_bytes(&self, slice: &mut [u8]) -> Result<usize, PusError> {
        let len = self.len_written();
        if slice.len() < len {
            return Err(crate::ByteConversionError::ToSliceTooSmall {
                found: slice.len(),
                expected: len,
            }
            .into());
        }
        self.sp_header.write_to_be_bytes(&mut slice[0..CCSDS_HEADER_LEN])?;
        let sec_header = zc::PusTcSecondaryHeader::from(&self.sec_header);
        slice[CCSDS_HEADER_LEN..TC_HEADER_LEN].copy_from_slice(sec_header.as_bytes());
        let data_end = TC_HEADER_LEN + self.app_data.len();
        slice[TC_HEADER_LEN..data_end].copy_from_slice(self.app_data);
        if self.has_checksum {
            let mut digest = CRC_CCITT_FALSE.digest();
            digest.update(&slice[0..data_end]);
            slice[data_end..len].copy_from_slice(&digest.finalize().to_be_bytes());
        }
        Ok(len)
    }

    pub fn to_vec(&self) -> Result<Vec<u8>, PusError> {
        let mut vec = alloc::vec![0; self.len_written()];
        self.write_to_bytes(&mut vec)?;
        Ok(vec)
    }
}

/// Identifies a telecommand in verification reports. It consists of the CCSDS version, the
/// packet identification and the packet sequence control field of the telecommand.
#[derive(Debug, Eq, Copy, Clone, Hash, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RequestId {
    version_number: u8,
    packet_id_raw: u16,
    psc_raw: u16,
}

pub const REQUEST_ID_LEN: usize = 4;

impl RequestId {
    pub fn new(tc: &impl CcsdsPacket) -> Self {
        RequestId {
            version_number: tc.ccsds_version(),
            packet_id_raw: tc.packet_id_raw(),
            psc_raw: tc.psc_raw(),
        }
    }

    #[inline]
    pub fn raw(&self) -> u32 {
        ((self.version_number as u32) << 29)
            | ((self.packet_id_raw as u32) << 16)
            | self.psc_raw as u32
    }

    #[inline]
    pub fn apid(&self) -> u16 {
        self.packet_id_raw & crate::MAX_APID
    }

    #[inline]
    pub fn seq_count(&self) -> u16 {
        self.psc_raw & crate::MAX_SEQ_COUNT
    }

    pub fn append_to(&self, msg: &mut Message) -> Result<(), crate::ByteConversionError> {
        msg.append_u32(self.raw())
    }

    pub fn read_from(msg: &mut Message) -> Result<Self, crate::ByteConversionError> {
        Ok(Self::from(msg.read_u32()?))
    }
}

impl From<u32> for RequestId {
    fn from(raw: u32) -> Self {
        RequestId {
            version_number: ((raw >> 29) & 0b111) as u8,
            packet_id_raw: ((raw >> 16) & 0x1FFF) as u16,
            psc_raw: (raw & 0xFFFF) as u16,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SequenceFlags;
    use zerocopy::AsBytes;

    fn ping_tc() -> PusTcCreator<'static> {
        PusTcCreator::new_simple(SpHeader::tc(0x02, 0x34, 0).unwrap(), 17, 1, &[])
    }

    #[test]
    fn test_ack_flags() {
        let flags = AckFlags::ACCEPTANCE.union(AckFlags::COMPLETION);
        assert_eq!(flags.raw(), 0b1001);
        assert!(flags.acceptance());
        assert!(!flags.start());
        assert!(!flags.progress());
        assert!(flags.completion());
        assert_eq!(AckFlags::from_raw(0xFF), AckFlags::ALL);
    }

    #[test]
    fn test_ping_tc() {
        let tc = ping_tc();
        assert_eq!(tc.len_written(), 13);
        assert_eq!(tc.sp_header().data_len, 6);
        let raw = tc.to_vec().unwrap();
        assert_eq!(
            &raw[0..11],
            &[0x18, 0x02, 0xC0, 0x34, 0x00, 0x06, 0x2F, 17, 1, 0x00, 0x00]
        );
        assert!(crate::crc::validate(&raw));
    }

    #[test]
    fn test_tc_with_app_data_no_crc() {
        let sec_header = PusTcSecondaryHeader::new(8, 1, AckFlags::START, 0x0102);
        let tc = PusTcCreator::new(SpHeader::tc(0x7FF, 1, 0).unwrap(), sec_header, &[1, 2, 3], false);
        let raw = tc.to_vec().unwrap();
        assert_eq!(raw.len(), 14);
        assert_eq!(tc.sp_header().data_len, 7);
        assert_eq!(raw[6], 0x24);
        assert_eq!(&raw[9..11], &[0x01, 0x02]);
        assert_eq!(&raw[11..], &[1, 2, 3]);
    }

    #[test]
    fn test_buffer_too_small() {
        let tc = ping_tc();
        let mut buf = [0; 12];
        assert_eq!(
            tc.write_to_bytes(&mut buf).unwrap_err(),
            PusError::ByteConversion(crate::ByteConversionError::ToSliceTooSmall {
                found: 12,
                expected: 13
            })
        );
    }

    #[test]
    fn test_zc_sec_header() {
        let sec_header = PusTcSecondaryHeader::new(20, 3, AckFlags::ALL, 5);
        let zc_header = zc::PusTcSecondaryHeader::from(&sec_header);
        assert_eq!(zc_header.as_bytes(), &[0x2F, 20, 3, 0, 5]);
        let read_back = zc::PusTcSecondaryHeader::from_bytes(zc_header.as_bytes()).unwrap();
        assert_eq!(PusTcSecondaryHeader::try_from(&read_back).unwrap(), sec_header);
        let pus_a = zc::PusTcSecondaryHeader::from_bytes(&[0x1F, 20, 3, 0, 5]).unwrap();
        assert_eq!(
            PusTcSecondaryHeader::try_from(&pus_a).unwrap_err(),
            PusError::VersionNotSupported(1)
        );
    }

    #[test]
    fn test_request_id() {
        let tc = ping_tc();
        let request_id = RequestId::new(tc.sp_header());
        assert_eq!(request_id.raw(), 0x1802_C034);
        assert_eq!(request_id.apid(), 0x02);
        assert_eq!(request_id.seq_count(), 0x34);
        assert_eq!(RequestId::from(request_id.raw()), request_id);
        let mut sp_header = *tc.sp_header();
        sp_header.set_seq_flags(SequenceFlags::FirstSegment);
        assert_ne!(RequestId::new(&sp_header), request_id);
    }
}
