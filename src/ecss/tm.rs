//! PUS C telemetry definitions.
//!
//! The secondary header consists of the PUS version and time reference status byte, the
//! service and message type, the message type counter and the destination ID, followed by the
//! [CUC timestamp](crate::time::cuc).
use crate::ecss::PusVersion;
use crate::message::Message;
use crate::time::cuc::{CucTime, CUC_TIMESTAMP_LEN};
use crate::{ByteConversionError, CCSDS_HEADER_LEN};
use core::mem::size_of;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Length of the secondary header without the timestamp.
pub const TM_SECONDARY_HEADER_LEN: usize = size_of::<zc::PusTmSecHeaderWithoutTimestamp>();
/// Primary and secondary header including the timestamp.
pub const TM_HEADER_LEN: usize = CCSDS_HEADER_LEN + TM_SECONDARY_HEADER_LEN + CUC_TIMESTAMP_LEN;

pub mod zc {
    use zerocopy::{AsBytes, FromBytes, FromZeroes, NetworkEndian, Unaligned, U16};

    #[derive(FromZeroes, FromBytes, AsBytes, Unaligned)]
    #[repr(C)]
    pub struct PusTmSecHeaderWithoutTimestamp {
        pus_version_and_sc_time_ref_status: u8,
        service: u8,
        message_type: u8,
        msg_counter: U16<NetworkEndian>,
        dest_id: U16<NetworkEndian>,
    }

    impl From<&crate::ecss::tm::PusTmSecondaryHeader> for PusTmSecHeaderWithoutTimestamp {
        fn from(header: &crate::ecss::tm::PusTmSecondaryHeader) -> Self {
            PusTmSecHeaderWithoutTimestamp {
                pus_version_and_sc_time_ref_status: ((header.pus_version as u8) << 4)
                    | (header.sc_time_ref_status & 0b1111),
                service: header.service,
                message_type: header.message_type,
                msg_counter: U16::new(header.msg_counter),
                dest_id: U16::new(header.dest_id),
            }
        }
    }
}

/// Telemetry secondary header.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PusTmSecondaryHeader {
    pub pus_version: PusVersion,
    pub sc_time_ref_status: u8,
    pub service: u8,
    pub message_type: u8,
    pub msg_counter: u16,
    pub dest_id: u16,
    pub timestamp: CucTime,
}

impl PusTmSecondaryHeader {
    pub fn new(
        service: u8,
        message_type: u8,
        msg_counter: u16,
        dest_id: u16,
        timestamp: CucTime,
    ) -> Self {
        PusTmSecondaryHeader {
            pus_version: PusVersion::PusC,
            sc_time_ref_status: 0,
            service,
            message_type,
            msg_counter,
            dest_id,
            timestamp,
        }
    }

    /// Overwrite the secondary header and timestamp of the passed message. The cursor is left
    /// right behind the timestamp.
    pub fn write_to(&self, msg: &mut Message) -> Result<(), ByteConversionError> {
        let zc_header = zc::PusTmSecHeaderWithoutTimestamp::from(self);
        msg.set_cursor(CCSDS_HEADER_LEN);
        msg.append_bytes(zerocopy::AsBytes::as_bytes(&zc_header))?;
        msg.append_bytes(&self.timestamp.to_be_bytes())
    }

    /// Read the secondary header including the timestamp from a telemetry message.
    pub fn read_from(msg: &Message) -> Result<Self, ByteConversionError> {
        let raw = msg.as_bytes();
        if raw.len() < TM_HEADER_LEN {
            return Err(ByteConversionError::FromSliceTooSmall {
                found: raw.len(),
                expected: TM_HEADER_LEN,
            });
        }
        Ok(PusTmSecondaryHeader {
            pus_version: PusVersion::try_from(msg.pus_version_raw())
                .unwrap_or(PusVersion::Invalid),
            sc_time_ref_status: msg.time_reference_status(),
            service: msg.service_type(),
            message_type: msg.message_type(),
            msg_counter: msg.message_type_counter(),
            dest_id: msg.destination_id(),
            timestamp: CucTime::from_be_bytes(
                &raw[CCSDS_HEADER_LEN + TM_SECONDARY_HEADER_LEN..TM_HEADER_LEN],
            )?,
        })
    }
}
