//! Telecommand acceptance parsing and telemetry report creation.
//!
//! # Example
//!
//! ```rust
//! use pus_core::ecss::factory::{FactoryConfig, MessageFactory};
//! use pus_core::time::cuc::CucTime;
//!
//! let factory = MessageFactory::new(FactoryConfig::default());
//! let report = factory
//!     .create_report(CucTime(10), 17, 2, 0, 0, &[])
//!     .expect("creating report failed");
//! assert_eq!(report.len(), 19);
//! assert!(report.has_valid_crc());
//!
//! let parsed = factory.parse_command(report.as_bytes()).unwrap();
//! assert_eq!(parsed.service_type(), 17);
//! assert_eq!(parsed.message_type(), 2);
//! ```
use crate::crc::CRC_LEN;
use crate::ecss::tc::TC_HEADER_LEN;
use crate::ecss::tm::{PusTmSecondaryHeader, TM_HEADER_LEN};
use crate::ecss::{PusError, PusVersion};
use crate::message::{Message, DEFAULT_MAX_PACKET_SIZE};
use crate::seq_count::{CcsdsSimpleSeqCountProvider, SequenceCountProvider};
use crate::time::cuc::CucTime;
use crate::{ByteConversionError, CcsdsPacket, PacketType, SequenceFlags, CCSDS_HEADER_LEN};
use alloc::vec::Vec;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::trace;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FactoryConfig {
    /// APID of all created reports.
    pub apid: u16,
    /// Whether telecommands carry and reports get a trailing CRC.
    pub has_crc: bool,
    pub max_packet_size: usize,
}

impl Default for FactoryConfig {
    fn default() -> Self {
        Self {
            apid: 0,
            has_crc: true,
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
        }
    }
}

/// Parses telecommands and creates telemetry reports.
///
/// The factory holds the packet sequence counter of all reports it creates. The counter is
/// incremented for every created report and wraps around at
/// [MAX_SEQ_COUNT](crate::MAX_SEQ_COUNT).
#[derive(Debug, Clone, Default)]
pub struct MessageFactory {
    config: FactoryConfig,
    seq_counter: CcsdsSimpleSeqCountProvider,
}

impl MessageFactory {
    pub fn new(config: FactoryConfig) -> Self {
        Self {
            config,
            seq_counter: CcsdsSimpleSeqCountProvider::default(),
        }
    }

    #[inline]
    pub fn config(&self) -> &FactoryConfig {
        &self.config
    }

    /// Sequence count which will be assigned to the next report.
    #[inline]
    pub fn next_seq_count(&self) -> u16 {
        self.seq_counter.get()
    }

    #[inline]
    fn crc_len(&self) -> usize {
        if self.config.has_crc {
            CRC_LEN
        } else {
            0
        }
    }

    /// Wrap raw telecommand bytes. The bytes have to be longer than the telecommand header.
    /// The cursor of the returned message is positioned right after the secondary header.
    ///
    /// This only checks the length. Use [Self::accept_command] to also apply the acceptance
    /// checks.
    pub fn parse_command(&self, raw: &[u8]) -> Result<Message, PusError> {
        if raw.len() <= TC_HEADER_LEN {
            return Err(ByteConversionError::FromSliceTooSmall {
                found: raw.len(),
                expected: TC_HEADER_LEN + 1,
            }
            .into());
        }
        if raw.len() > self.config.max_packet_size {
            return Err(PusError::PacketTooLarge {
                len: raw.len(),
                max: self.config.max_packet_size,
            });
        }
        Ok(Message::from_bytes(raw, self.config.max_packet_size)?)
    }

    /// Acceptance checks of a parsed telecommand: CCSDS version 0, telecommand packet type, the
    /// secondary header flag, unsegmented sequence flags, a data length field which matches the
    /// actual length, PUS version C and a valid CRC if CRCs are enabled.
    pub fn validate_command(&self, tc: &Message) -> Result<(), PusError> {
        if tc.ccsds_version() != 0 || !tc.sec_header_flag() {
            return Err(PusError::InvalidHeader);
        }
        if !tc.is_tc() {
            return Err(PusError::IllegalPacketType);
        }
        if tc.sequence_flags() != SequenceFlags::Unsegmented {
            return Err(PusError::InvalidHeader);
        }
        if tc.total_len() != tc.len() {
            return Err(PusError::LengthMismatch {
                found: tc.total_len(),
                expected: tc.len(),
            });
        }
        if tc.pus_version_raw() != PusVersion::PusC as u8 {
            return Err(PusError::VersionNotSupported(tc.pus_version_raw()));
        }
        if self.config.has_crc && !tc.has_valid_crc() {
            return Err(PusError::ChecksumFailure);
        }
        Ok(())
    }

    /// [Self::parse_command] followed by [Self::validate_command].
    pub fn accept_command(&self, raw: &[u8]) -> Result<Message, PusError> {
        let tc = self.parse_command(raw)?;
        self.validate_command(&tc)?;
        trace!(
            apid = tc.apid(),
            service = tc.service_type(),
            message_type = tc.message_type(),
            seq_count = tc.sequence_count(),
            "accepted telecommand"
        );
        Ok(tc)
    }

    /// Create a complete report with the passed payload. The report is rejected if it would
    /// exceed the maximum packet size, in which case the sequence counter is not incremented.
    pub fn create_report(
        &self,
        time: CucTime,
        service_type: u8,
        message_type: u8,
        message_type_counter: u16,
        destination_id: u16,
        payload: &[u8],
    ) -> Result<Message, PusError> {
        let total_len = TM_HEADER_LEN + payload.len() + self.crc_len();
        if total_len > self.config.max_packet_size {
            return Err(PusError::PacketTooLarge {
                len: total_len,
                max: self.config.max_packet_size,
            });
        }
        let mut report = self.start_report(
            time,
            service_type,
            message_type,
            message_type_counter,
            destination_id,
        )?;
        report.append_bytes(payload)?;
        self.close_message(&mut report)?;
        Ok(report)
    }

    /// Create a report which only consists of its header, so that the payload can be appended
    /// field by field. [Self::close_message] has to be called once the payload is complete.
    pub fn start_report(
        &self,
        time: CucTime,
        service_type: u8,
        message_type: u8,
        message_type_counter: u16,
        destination_id: u16,
    ) -> Result<Message, PusError> {
        let mut report = Message::new(PacketType::Tm, self.config.max_packet_size);
        if !report.set_apid(self.config.apid) {
            return Err(PusError::InvalidHeader);
        }
        report.set_sequence_count(self.seq_counter.get_and_increment());
        PusTmSecondaryHeader::new(
            service_type,
            message_type,
            message_type_counter,
            destination_id,
            time,
        )
        .write_to(&mut report)?;
        Ok(report)
    }

    /// Set the data length field of a report whose payload was appended incrementally and
    /// append the CRC if enabled. Bytes behind the cursor are discarded.
    pub fn close_message(&self, report: &mut Message) -> Result<(), PusError> {
        report.truncate(report.cursor());
        let total_len = report.len() + self.crc_len();
        if total_len > self.config.max_packet_size {
            return Err(PusError::PacketTooLarge {
                len: total_len,
                max: self.config.max_packet_size,
            });
        }
        report.set_data_length((total_len - CCSDS_HEADER_LEN - 1) as u16);
        if self.config.has_crc {
            report.append_crc()?;
        }
        Ok(())
    }

    /// Extract a complete packet which is embedded at the cursor position, for example one
    /// of several concatenated telecommands. The cursor is moved behind the embedded packet.
    pub fn parse_tc_from(&self, msg: &mut Message) -> Result<Message, PusError> {
        let header = crate::SpHeader::from_be_bytes(msg.remaining_bytes())?;
        let raw = msg.read_bytes(header.total_len())?;
        Ok(Message::from_bytes(raw, self.config.max_packet_size)?)
    }

    /// Bytes from the cursor up to, but excluding, the CRC field if CRCs are enabled.
    pub fn parse_up_to_end_from(&self, msg: &mut Message) -> Vec<u8> {
        let end = msg.len().saturating_sub(self.crc_len());
        msg.read_sub_range(msg.cursor(), end)
    }

    /// Payload region of a packet, which is everything between the header and the CRC field.
    /// Does not move the cursor.
    pub fn user_data<'msg>(&self, msg: &'msg Message) -> &'msg [u8] {
        let end = msg.len().saturating_sub(self.crc_len());
        let start = msg.header_len().min(end);
        &msg.as_bytes()[start..end]
    }
}
