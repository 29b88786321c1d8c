//! Common definitions of the PUS layer according to
//! [ECSS-E-ST-70-41C](https://ecss.nl/standard/ecss-e-st-70-41c-space-engineering-telemetry-and-telecommand-packet-utilization-15-april-2016/)
//!
//! The telecommand and telemetry header definitions live in the [tc] and [tm] modules, the
//! [factory] parses telecommands and creates telemetry reports and [verification] emits the
//! service 1 request verification reports. The remaining modules contain the passive data
//! structures which are driven by the per-service glue code.
use crate::ByteConversionError;
use num_enum::{IntoPrimitive, TryFromPrimitive};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

pub mod error_log;
pub mod event_action;
pub mod factory;
pub mod function;
pub mod monitoring;
pub mod packet_store;
pub mod parameter;
pub mod sequence;
pub mod statistics;
pub mod tc;
pub mod tm;
pub mod verification;

#[derive(Debug, Copy, Clone, Eq, PartialEq, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
#[non_exhaustive]
pub enum PusServiceId {
    /// Service 1
    Verification = 1,
    /// Service 3
    Housekeeping = 3,
    /// Service 4
    ParameterStatistics = 4,
    /// Service 5
    Event = 5,
    /// Service 8
    FunctionManagement = 8,
    /// Service 12
    OnBoardMonitoring = 12,
    /// Service 15
    StorageAndRetrieval = 15,
    /// Service 17
    Test = 17,
    /// Service 19
    EventAction = 19,
    /// Service 20
    Parameter = 20,
    /// Service 21
    RequestSequencing = 21,
}

/// All PUS versions. Only PUS C is supported by this library.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub enum PusVersion {
    EsaPus = 0,
    PusA = 1,
    PusC = 2,
    Invalid = 0b1111,
}

impl TryFrom<u8> for PusVersion {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            x if x == PusVersion::EsaPus as u8 => Ok(PusVersion::EsaPus),
            x if x == PusVersion::PusA as u8 => Ok(PusVersion::PusA),
            x if x == PusVersion::PusC as u8 => Ok(PusVersion::PusC),
            _ => Err(()),
        }
    }
}

/// Failure code carried by failed verification reports.
///
/// The upper byte groups the codes by the verification stage which usually reports them.
#[derive(Debug, Copy, Clone, Eq, PartialEq, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u16)]
#[non_exhaustive]
pub enum ErrorCode {
    // Acceptance
    UnacceptablePacket = 0x0001,
    InvalidChecksum = 0x0002,
    InvalidLength = 0x0003,
    IllegalPacketType = 0x0004,
    IllegalServiceType = 0x0005,
    IllegalMessageType = 0x0006,
    InvalidPusVersion = 0x0007,
    // Start of execution
    UnknownFunction = 0x0100,
    InvalidParameters = 0x0101,
    UnknownParameter = 0x0102,
    ParameterTypeMismatch = 0x0103,
    UnknownSequence = 0x0104,
    SequenceExists = 0x0105,
    SequenceActive = 0x0106,
    SequenceStoreFull = 0x0107,
    UnknownEventActionDefinition = 0x0108,
    EventActionDefinitionExists = 0x0109,
    EventActionDefinitionEnabled = 0x010A,
    UnknownMonitoringDefinition = 0x010B,
    UnknownPacketStore = 0x010C,
    // Progress and completion of execution
    ExecutionFailed = 0x0200,
    // Routing
    NoHandler = 0x0300,
    // Internal errors which are only logged
    TableFull = 0x0400,
    ReportTooLarge = 0x0401,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum PusError {
    #[error("PUS version {0:?} not supported")]
    VersionNotSupported(u8),
    #[error("checksum verification failed")]
    ChecksumFailure,
    #[error("packet data length field {found} does not match expected value {expected}")]
    LengthMismatch { found: usize, expected: usize },
    #[error("packet larger than the maximum packet size {max}: {len}")]
    PacketTooLarge { len: usize, max: usize },
    #[error("invalid primary header field")]
    InvalidHeader,
    #[error("expected a telecommand")]
    IllegalPacketType,
    #[error("pus error: {0}")]
    ByteConversion(#[from] ByteConversionError),
}

impl PusError {
    /// Error code to put into an acceptance failure report.
    pub fn acceptance_code(&self) -> ErrorCode {
        match self {
            PusError::VersionNotSupported(_) => ErrorCode::InvalidPusVersion,
            PusError::ChecksumFailure => ErrorCode::InvalidChecksum,
            PusError::LengthMismatch { .. }
            | PusError::PacketTooLarge { .. }
            | PusError::ByteConversion(_) => ErrorCode::InvalidLength,
            PusError::InvalidHeader => ErrorCode::UnacceptablePacket,
            PusError::IllegalPacketType => ErrorCode::IllegalPacketType,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn test_pus_error_display() {
        let unsupported_version = PusError::VersionNotSupported(1);
        assert_eq!(
            unsupported_version.to_string(),
            "PUS version 1 not supported"
        );
    }

    #[test]
    fn test_service_id_from_u8() {
        let verification_id = PusServiceId::try_from(1).unwrap();
        assert_eq!(verification_id, PusServiceId::Verification);
        assert!(PusServiceId::try_from(2).is_err());
    }

    #[test]
    fn test_error_code_conversion() {
        let raw: u16 = ErrorCode::InvalidChecksum.into();
        assert_eq!(raw, 2);
        assert_eq!(ErrorCode::try_from(0x0300).unwrap(), ErrorCode::NoHandler);
        assert!(ErrorCode::try_from(0xFFFF).is_err());
    }

    #[test]
    fn test_acceptance_codes() {
        assert_eq!(
            PusError::ChecksumFailure.acceptance_code(),
            ErrorCode::InvalidChecksum
        );
        assert_eq!(
            PusError::from(ByteConversionError::FromSliceTooSmall {
                found: 1,
                expected: 2
            })
            .acceptance_code(),
            ErrorCode::InvalidLength
        );
        assert_eq!(
            PusError::VersionNotSupported(0).acceptance_code(),
            ErrorCode::InvalidPusVersion
        );
    }
}
