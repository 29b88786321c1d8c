//! Cursor based packet codec.
//!
//! A [Message] owns the raw bytes of exactly one PUS packet together with a read/write cursor.
//! All header fields are derived from fixed bit offsets of the raw bytes, so the header is always
//! in sync with what goes onto the wire. Multi-byte values are big endian.
//!
//! Writes at the cursor overwrite existing bytes in place and grow the buffer once the cursor
//! reaches the end. Reads past the end are reported as
//! [ByteConversionError::FromSliceTooSmall] instead of producing default values.
//!
//! # Example
//!
//! ```rust
//! use pus_core::message::Message;
//! use pus_core::PacketType;
//!
//! let mut msg = Message::new(PacketType::Tm, 64);
//! msg.set_service_type(3);
//! msg.set_message_type(25);
//! msg.append_u16(0x1234).unwrap();
//! msg.append_octet_string(b"hk").unwrap();
//!
//! msg.set_cursor(msg.header_len());
//! assert_eq!(msg.read_u16().unwrap(), 0x1234);
//! assert_eq!(msg.read_octet_string().unwrap(), b"hk");
//! assert!(msg.read_u8().is_err());
//! assert!(msg.assert_type(PacketType::Tm, 3, 25));
//! ```
use crate::crc::{self, CRC_LEN};
use crate::ecss::tc::{AckFlags, TC_HEADER_LEN};
use crate::ecss::tm::TM_HEADER_LEN;
use crate::ecss::PusVersion;
use crate::{
    ByteConversionError, CcsdsPacket, PacketId, PacketSequenceCtrl, PacketType, SequenceFlags,
    CCSDS_HEADER_LEN, MAX_APID, MAX_SEQ_COUNT,
};
use alloc::vec::Vec;
use paste::paste;

/// Default maximum size of a single packet.
pub const DEFAULT_MAX_PACKET_SIZE: usize = 1024;

/// Header length of a packet of the given type, primary and secondary header included. For
/// telemetry, this includes the timestamp following the secondary header.
#[inline]
pub const fn header_len(packet_type: PacketType) -> usize {
    match packet_type {
        PacketType::Tc => TC_HEADER_LEN,
        PacketType::Tm => TM_HEADER_LEN,
    }
}

/// One PUS packet with a read/write cursor.
///
/// The raw buffer always contains at least the primary and the secondary header of its packet
/// type, which is why the header accessors are infallible. The cursor never exceeds the buffer
/// length and the buffer never exceeds its capacity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    data: Vec<u8>,
    capacity: usize,
    cursor: usize,
}

macro_rules! numeric_accessors {
    ($($ty: ident,)+) => {
        $(
            paste! {
                #[doc = "Write a big endian `" $ty "` at the cursor and advance it."]
                #[inline]
                pub fn [<append_ $ty>](&mut self, value: $ty) -> Result<(), ByteConversionError> {
                    self.append_bytes(&value.to_be_bytes())
                }

                #[doc = "Read a big endian `" $ty "` at the cursor and advance it."]
                pub fn [<read_ $ty>](&mut self) -> Result<$ty, ByteConversionError> {
                    let mut raw = [0; core::mem::size_of::<$ty>()];
                    raw.copy_from_slice(self.read_bytes(core::mem::size_of::<$ty>())?);
                    Ok($ty::from_be_bytes(raw))
                }
            }
        )+
    }
}

impl Message {
    /// Create a packet which only consists of a zeroed header of the given packet type. Version
    /// 0, the secondary header flag, unsegmented sequence flags and PUS version C are set. The
    /// timestamp of telemetry is zero.
    /// The cursor is positioned right after the header.
    pub fn new(packet_type: PacketType, capacity: usize) -> Self {
        let header_len = header_len(packet_type);
        let mut data = alloc::vec![0; header_len];
        data[0] = ((packet_type as u8) << 4) | (1 << 3);
        data[2] = (SequenceFlags::Unsegmented as u8) << 6;
        data[6] = (PusVersion::PusC as u8) << 4;
        Self {
            data,
            capacity: capacity.max(header_len),
            cursor: header_len,
        }
    }

    /// Wrap raw bytes. The bytes must at least contain the primary and secondary header of the
    /// packet type encoded in the primary header and may not exceed the capacity. The cursor is
    /// positioned right after the header.
    pub fn from_bytes(raw: &[u8], capacity: usize) -> Result<Self, ByteConversionError> {
        if raw.len() < CCSDS_HEADER_LEN {
            return Err(ByteConversionError::FromSliceTooSmall {
                found: raw.len(),
                expected: CCSDS_HEADER_LEN,
            });
        }
        let header_len = header_len(crate::packet_type_in_raw_packet_id(u16::from_be_bytes([
            raw[0], raw[1],
        ])));
        if raw.len() < header_len {
            return Err(ByteConversionError::FromSliceTooSmall {
                found: raw.len(),
                expected: header_len,
            });
        }
        if raw.len() > capacity {
            return Err(ByteConversionError::ToSliceTooSmall {
                found: capacity,
                expected: raw.len(),
            });
        }
        Ok(Self {
            data: raw.to_vec(),
            capacity,
            cursor: header_len,
        })
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Always false, a message contains at least its header.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn header_len(&self) -> usize {
        header_len(self.ptype())
    }

    #[inline]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Position the cursor. The position is clamped to the current length.
    #[inline]
    pub fn set_cursor(&mut self, position: usize) {
        self.cursor = position.min(self.data.len());
    }

    /// Number of bytes between the cursor and the end of the buffer.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.cursor
    }

    /// Bytes between the cursor and the end of the buffer. Does not move the cursor.
    #[inline]
    pub fn remaining_bytes(&self) -> &[u8] {
        &self.data[self.cursor..]
    }

    /// Shorten the buffer. It is never truncated below the header length.
    pub fn truncate(&mut self, len: usize) {
        self.data.truncate(len.max(self.header_len()));
        self.cursor = self.cursor.min(self.data.len());
    }

    // Write primitives

    /// Write raw bytes at the cursor. Existing bytes are overwritten, the buffer grows if the
    /// cursor reaches the end.
    pub fn append_bytes(&mut self, bytes: &[u8]) -> Result<(), ByteConversionError> {
        let end = self.cursor + bytes.len();
        if end > self.capacity {
            return Err(ByteConversionError::ToSliceTooSmall {
                found: self.capacity,
                expected: end,
            });
        }
        let overlap = (self.data.len() - self.cursor).min(bytes.len());
        self.data[self.cursor..self.cursor + overlap].copy_from_slice(&bytes[..overlap]);
        self.data.extend_from_slice(&bytes[overlap..]);
        self.cursor = end;
        Ok(())
    }

    numeric_accessors!(u8, u16, u32, u64, i8, i16, i32, i64, f32, f64,);

    #[inline]
    pub fn append_bool(&mut self, value: bool) -> Result<(), ByteConversionError> {
        self.append_u8(value as u8)
    }

    /// Write bytes without any length prefix. The reader has to know the width.
    #[inline]
    pub fn append_fixed_string(&mut self, bytes: &[u8]) -> Result<(), ByteConversionError> {
        self.append_bytes(bytes)
    }

    /// Write bytes padded with zeros or cut to exactly `width` bytes.
    pub fn append_padded_string(
        &mut self,
        bytes: &[u8],
        width: usize,
    ) -> Result<(), ByteConversionError> {
        let used = bytes.len().min(width);
        self.append_bytes(&bytes[..used])?;
        for _ in used..width {
            self.append_u8(0)?;
        }
        Ok(())
    }

    /// Write a 2 byte length prefix followed by the bytes.
    pub fn append_octet_string(&mut self, bytes: &[u8]) -> Result<(), ByteConversionError> {
        let len = u16::try_from(bytes.len()).map_err(|_| ByteConversionError::ToSliceTooSmall {
            found: u16::MAX as usize,
            expected: bytes.len(),
        })?;
        if self.cursor + 2 + bytes.len() > self.capacity {
            return Err(ByteConversionError::ToSliceTooSmall {
                found: self.capacity,
                expected: self.cursor + 2 + bytes.len(),
            });
        }
        self.append_u16(len)?;
        self.append_bytes(bytes)
    }

    // Read primitives

    /// Read raw bytes at the cursor and advance it.
    pub fn read_bytes(&mut self, len: usize) -> Result<&[u8], ByteConversionError> {
        let end = self.cursor + len;
        if end > self.data.len() {
            return Err(ByteConversionError::FromSliceTooSmall {
                found: self.data.len() - self.cursor,
                expected: len,
            });
        }
        let start = self.cursor;
        self.cursor = end;
        Ok(&self.data[start..end])
    }

    #[inline]
    pub fn read_bool(&mut self) -> Result<bool, ByteConversionError> {
        Ok(self.read_u8()? != 0)
    }

    /// Read a string of known width without length prefix.
    #[inline]
    pub fn read_fixed_string(&mut self, width: usize) -> Result<&[u8], ByteConversionError> {
        self.read_bytes(width)
    }

    /// Read a string with a 2 byte length prefix. The cursor is not moved if the string is
    /// incomplete.
    pub fn read_octet_string(&mut self) -> Result<&[u8], ByteConversionError> {
        let start = self.cursor;
        let len = self.read_u16()? as usize;
        if self.remaining() < len {
            let found = self.remaining();
            self.cursor = start;
            return Err(ByteConversionError::FromSliceTooSmall {
                found,
                expected: len,
            });
        }
        self.read_bytes(len)
    }

    /// Copy the range `start..end`, relative to the start of the packet, into a new buffer. The
    /// end is clamped to the buffer length and the cursor is left at the clamped end.
    pub fn read_sub_range(&mut self, start: usize, end: usize) -> Vec<u8> {
        let end = end.min(self.data.len());
        let start = start.min(end);
        self.cursor = end;
        self.data[start..end].to_vec()
    }

    // Header accessors

    #[inline]
    fn raw_u16(&self, idx: usize) -> u16 {
        u16::from_be_bytes([self.data[idx], self.data[idx + 1]])
    }

    #[inline]
    fn set_raw_u16(&mut self, idx: usize, value: u16) {
        self.data[idx..idx + 2].copy_from_slice(&value.to_be_bytes());
    }

    #[inline]
    pub fn packet_type(&self) -> PacketType {
        self.ptype()
    }

    #[inline]
    pub fn sequence_count(&self) -> u16 {
        self.seq_count()
    }

    #[inline]
    pub fn data_length(&self) -> u16 {
        self.data_len()
    }

    /// Raw value of the 4 bit PUS version field.
    #[inline]
    pub fn pus_version_raw(&self) -> u8 {
        self.data[6] >> 4
    }

    #[inline]
    pub fn pus_version(&self) -> Result<PusVersion, u8> {
        PusVersion::try_from(self.pus_version_raw()).map_err(|_| self.pus_version_raw())
    }

    /// Acknowledgement flags of a telecommand. The field holds the spacecraft time reference
    /// status for telemetry, see [Self::time_reference_status].
    #[inline]
    pub fn ack_flags(&self) -> AckFlags {
        AckFlags::from_raw(self.data[6] & 0b1111)
    }

    #[inline]
    pub fn time_reference_status(&self) -> u8 {
        self.data[6] & 0b1111
    }

    #[inline]
    pub fn service_type(&self) -> u8 {
        self.data[7]
    }

    #[inline]
    pub fn message_type(&self) -> u8 {
        self.data[8]
    }

    /// Source ID of a telecommand. This field shares its offset with the message type counter
    /// of telemetry.
    #[inline]
    pub fn source_id(&self) -> u16 {
        self.raw_u16(9)
    }

    #[inline]
    pub fn message_type_counter(&self) -> u16 {
        self.raw_u16(9)
    }

    /// Destination ID of telemetry. Returns 0 for telecommands which do not have this field.
    #[inline]
    pub fn destination_id(&self) -> u16 {
        if self.is_tc() {
            return 0;
        }
        self.raw_u16(11)
    }

    /// Trailing two bytes of the packet, interpreted as the CRC field.
    #[inline]
    pub fn crc(&self) -> u16 {
        self.raw_u16(self.data.len() - CRC_LEN)
    }

    /// True if the CRC calculated over the whole packet including the trailing CRC field is 0.
    #[inline]
    pub fn has_valid_crc(&self) -> bool {
        crc::validate(&self.data)
    }

    /// Strict equality check of packet type, service type and message type.
    pub fn assert_type(
        &self,
        packet_type: PacketType,
        service_type: u8,
        message_type: u8,
    ) -> bool {
        self.ptype() == packet_type
            && self.service_type() == service_type
            && self.message_type() == message_type
    }

    // Header setters

    pub fn set_version(&mut self, version: u8) {
        self.data[0] = (self.data[0] & 0b0001_1111) | ((version & 0b111) << 5);
    }

    /// Returns false and leaves the field untouched if the APID exceeds [MAX_APID].
    pub fn set_apid(&mut self, apid: u16) -> bool {
        if apid > MAX_APID {
            return false;
        }
        let packet_id = (self.raw_u16(0) & !MAX_APID) | apid;
        self.set_raw_u16(0, packet_id);
        true
    }

    pub fn set_sec_header_flag(&mut self, flag: bool) {
        if flag {
            self.data[0] |= 1 << 3;
        } else {
            self.data[0] &= !(1 << 3);
        }
    }

    pub fn set_sequence_flags(&mut self, flags: SequenceFlags) {
        self.data[2] = (self.data[2] & 0b0011_1111) | ((flags as u8) << 6);
    }

    /// Returns false and leaves the field untouched if the count exceeds [MAX_SEQ_COUNT].
    pub fn set_sequence_count(&mut self, seq_count: u16) -> bool {
        if seq_count > MAX_SEQ_COUNT {
            return false;
        }
        let psc = (self.raw_u16(2) & !MAX_SEQ_COUNT) | seq_count;
        self.set_raw_u16(2, psc);
        true
    }

    #[inline]
    pub fn set_data_length(&mut self, data_len: u16) {
        self.set_raw_u16(4, data_len);
    }

    pub fn set_pus_version(&mut self, version: u8) {
        self.data[6] = (self.data[6] & 0b1111) | (version << 4);
    }

    pub fn set_ack_flags(&mut self, flags: AckFlags) {
        self.data[6] = (self.data[6] & 0b1111_0000) | flags.raw();
    }

    pub fn set_time_reference_status(&mut self, status: u8) {
        self.data[6] = (self.data[6] & 0b1111_0000) | (status & 0b1111);
    }

    #[inline]
    pub fn set_service_type(&mut self, service_type: u8) {
        self.data[7] = service_type;
    }

    #[inline]
    pub fn set_message_type(&mut self, message_type: u8) {
        self.data[8] = message_type;
    }

    #[inline]
    pub fn set_source_id(&mut self, source_id: u16) {
        self.set_raw_u16(9, source_id);
    }

    #[inline]
    pub fn set_message_type_counter(&mut self, counter: u16) {
        self.set_raw_u16(9, counter);
    }

    /// Has no effect on telecommands, which do not have a destination ID field.
    pub fn set_destination_id(&mut self, destination_id: u16) {
        if self.is_tm() {
            self.set_raw_u16(11, destination_id);
        }
    }

    /// Calculate the CRC over the whole packet and append it at the end of the buffer. The
    /// cursor is left at the end.
    pub fn append_crc(&mut self) -> Result<(), ByteConversionError> {
        let crc = crc::crc16(&self.data);
        self.cursor = self.data.len();
        self.append_u16(crc)
    }
}

impl CcsdsPacket for Message {
    #[inline]
    fn ccsds_version(&self) -> u8 {
        self.data[0] >> 5
    }

    #[inline]
    fn packet_id(&self) -> PacketId {
        PacketId::from(self.raw_u16(0))
    }

    #[inline]
    fn psc(&self) -> PacketSequenceCtrl {
        PacketSequenceCtrl::from(self.raw_u16(2))
    }

    #[inline]
    fn data_len(&self) -> u16 {
        self.raw_u16(4)
    }
}

impl AsRef<[u8]> for Message {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    fn tc_message() -> Message {
        let mut msg = Message::new(PacketType::Tc, 64);
        msg.set_apid(0x02);
        msg.set_sequence_count(0x34);
        msg.set_service_type(17);
        msg.set_message_type(1);
        msg.set_ack_flags(AckFlags::ALL);
        msg.set_source_id(0x0A0B);
        msg
    }

    #[test]
    fn test_new_tc_header() {
        let msg = tc_message();
        assert_eq!(msg.len(), 11);
        assert_eq!(msg.cursor(), 11);
        assert_eq!(msg.ccsds_version(), 0);
        assert_eq!(msg.packet_type(), PacketType::Tc);
        assert!(msg.sec_header_flag());
        assert_eq!(msg.apid(), 0x02);
        assert_eq!(msg.sequence_flags(), SequenceFlags::Unsegmented);
        assert_eq!(msg.sequence_count(), 0x34);
        assert_eq!(msg.pus_version(), Ok(PusVersion::PusC));
        assert_eq!(msg.ack_flags(), AckFlags::ALL);
        assert_eq!(msg.service_type(), 17);
        assert_eq!(msg.message_type(), 1);
        assert_eq!(msg.source_id(), 0x0A0B);
        assert_eq!(msg.destination_id(), 0);
        assert_eq!(
            msg.as_bytes(),
            &[0x18, 0x02, 0xC0, 0x34, 0x00, 0x00, 0x2F, 17, 1, 0x0A, 0x0B]
        );
    }

    #[test]
    fn test_new_tm_header() {
        let mut msg = Message::new(PacketType::Tm, 64);
        assert_eq!(msg.len(), 17);
        msg.set_apid(0x7FF);
        msg.set_message_type_counter(5);
        msg.set_destination_id(0x0102);
        msg.set_time_reference_status(0b1010);
        assert!(msg.is_tm());
        assert_eq!(msg.apid(), 0x7FF);
        assert_eq!(msg.message_type_counter(), 5);
        assert_eq!(msg.destination_id(), 0x0102);
        assert_eq!(msg.time_reference_status(), 0b1010);
        assert_eq!(msg.pus_version_raw(), 2);
    }

    #[test]
    fn test_invalid_setters_rejected() {
        let mut msg = tc_message();
        assert!(!msg.set_apid(0x800));
        assert_eq!(msg.apid(), 0x02);
        assert!(!msg.set_sequence_count(0x4000));
        assert_eq!(msg.sequence_count(), 0x34);
        msg.set_version(0b111);
        assert_eq!(msg.ccsds_version(), 0b111);
        assert_eq!(msg.apid(), 0x02);
        msg.set_sec_header_flag(false);
        assert!(!msg.sec_header_flag());
        msg.set_sequence_flags(SequenceFlags::FirstSegment);
        assert_eq!(msg.sequence_flags(), SequenceFlags::FirstSegment);
        assert_eq!(msg.sequence_count(), 0x34);
    }

    #[test]
    fn test_numeric_roundtrip() {
        let mut msg = Message::new(PacketType::Tm, 128);
        msg.append_u8(0xAB).unwrap();
        msg.append_u16(0xBEEF).unwrap();
        msg.append_u32(0xDEADBEEF).unwrap();
        msg.append_i16(-2).unwrap();
        msg.append_f64(1.5).unwrap();
        msg.append_bool(true).unwrap();
        assert_eq!(msg.len(), 17 + 1 + 2 + 4 + 2 + 8 + 1);
        assert_eq!(&msg.as_bytes()[17..20], &[0xAB, 0xBE, 0xEF]);

        msg.set_cursor(17);
        assert_eq!(msg.read_u8().unwrap(), 0xAB);
        assert_eq!(msg.read_u16().unwrap(), 0xBEEF);
        assert_eq!(msg.read_u32().unwrap(), 0xDEADBEEF);
        assert_eq!(msg.read_i16().unwrap(), -2);
        assert_eq!(msg.read_f64().unwrap(), 1.5);
        assert!(msg.read_bool().unwrap());
        assert_eq!(msg.remaining(), 0);
    }

    #[test]
    fn test_read_past_end_fails() {
        let mut msg = Message::new(PacketType::Tm, 64);
        msg.append_u8(1).unwrap();
        msg.set_cursor(17);
        assert_eq!(
            msg.read_u16().unwrap_err(),
            ByteConversionError::FromSliceTooSmall {
                found: 1,
                expected: 2
            }
        );
        // The cursor is not moved by a failed read.
        assert_eq!(msg.cursor(), 17);
        assert_eq!(msg.read_u8().unwrap(), 1);
    }

    #[test]
    fn test_overwrite_in_place() {
        let mut msg = Message::new(PacketType::Tm, 64);
        msg.append_u32(0x01020304).unwrap();
        msg.set_cursor(18);
        msg.append_u8(0xFF).unwrap();
        assert_eq!(msg.len(), 21);
        assert_eq!(&msg.as_bytes()[17..21], &[1, 0xFF, 3, 4]);
        // Partially overlapping write grows the buffer.
        msg.set_cursor(20);
        msg.append_u16(0xAABB).unwrap();
        assert_eq!(&msg.as_bytes()[17..], &[1, 0xFF, 3, 0xAA, 0xBB]);
    }

    #[test]
    fn test_capacity_enforced() {
        let mut msg = Message::new(PacketType::Tc, 12);
        msg.append_u8(1).unwrap();
        assert_eq!(
            msg.append_u8(2).unwrap_err(),
            ByteConversionError::ToSliceTooSmall {
                found: 12,
                expected: 13
            }
        );
        assert_eq!(msg.len(), 12);
    }

    #[test]
    fn test_strings() {
        let mut msg = Message::new(PacketType::Tc, 64);
        msg.append_fixed_string(b"abc").unwrap();
        msg.append_octet_string(b"hello").unwrap();
        msg.append_padded_string(b"fn", 4).unwrap();
        assert_eq!(&msg.as_bytes()[14..16], &[0, 5]);
        msg.set_cursor(11);
        assert_eq!(msg.read_fixed_string(3).unwrap(), b"abc");
        assert_eq!(msg.read_octet_string().unwrap(), b"hello");
        assert_eq!(msg.read_fixed_string(4).unwrap(), b"fn\0\0");
    }

    #[test]
    fn test_truncated_octet_string() {
        let mut msg = Message::new(PacketType::Tc, 64);
        msg.append_u16(10).unwrap();
        msg.append_u8(1).unwrap();
        msg.set_cursor(11);
        assert!(msg.read_octet_string().is_err());
        assert_eq!(msg.cursor(), 11);
    }

    #[test]
    fn test_read_sub_range() {
        let mut msg = Message::new(PacketType::Tc, 64);
        msg.append_bytes(&[1, 2, 3, 4, 5]).unwrap();
        assert_eq!(msg.read_sub_range(12, 14), vec![2, 3]);
        assert_eq!(msg.cursor(), 14);
        assert_eq!(msg.read_sub_range(13, 100), vec![3, 4, 5]);
        assert_eq!(msg.cursor(), 16);
        assert!(msg.read_sub_range(40, 100).is_empty());
    }

    #[test]
    fn test_from_bytes() {
        let msg = tc_message();
        let copy = Message::from_bytes(msg.as_bytes(), 64).unwrap();
        assert_eq!(copy.cursor(), 11);
        assert_eq!(copy.as_bytes(), msg.as_bytes());
        assert!(Message::from_bytes(&msg.as_bytes()[0..10], 64).is_err());
        assert!(Message::from_bytes(&[0; 3], 64).is_err());
        assert!(Message::from_bytes(msg.as_bytes(), 8).is_err());
        // Telemetry needs the longer secondary header.
        assert!(Message::from_bytes(&[0x08, 0, 0xC0, 0, 0, 0, 0x20, 1, 2, 0, 0, 0], 64).is_err());
    }

    #[test]
    fn test_crc() {
        let mut msg = tc_message();
        msg.append_crc().unwrap();
        assert_eq!(msg.len(), 13);
        assert!(msg.has_valid_crc());
        assert_eq!(msg.crc(), crate::crc::crc16(&msg.as_bytes()[0..11]));
    }

    #[test]
    fn test_assert_type() {
        let msg = tc_message();
        assert!(msg.assert_type(PacketType::Tc, 17, 1));
        assert!(!msg.assert_type(PacketType::Tm, 17, 1));
        assert!(!msg.assert_type(PacketType::Tc, 17, 2));
        assert!(!msg.assert_type(PacketType::Tc, 3, 1));
    }
}
