//! PUS Service 1 Request Verification
//!
//! A request passes through up to four verification stages: acceptance, start of execution,
//! progress of execution (possibly multiple steps) and completion of execution. Each stage can
//! succeed or fail, and a request which can not be routed to any service produces a routing
//! failure. The [VerificationReporter] turns a [VerificationOutcome] into a TM\[1,x\] report.
//!
//! Success reports are only generated if the requester set the matching acknowledgement flag in
//! the telecommand. Failure reports are always generated and are also logged to the
//! [ErrorLog](super::error_log::ErrorLog).
//!
//! The source data of every report starts with the 4 byte [RequestId] of the telecommand,
//! followed by the step ID for progress reports and the [ErrorCode] for failure reports.
use super::error_log::{ErrorKind, ErrorLog, LoggedError};
use super::factory::MessageFactory;
use super::tc::{AckFlags, RequestId};
use super::{ErrorCode, PusError, PusServiceId};
use crate::message::Message;
use crate::seq_count::MessageTypeCounters;
use crate::time::cuc::CucTime;
use crate::{CcsdsPacket, SpHeader};
use num_enum::{IntoPrimitive, TryFromPrimitive};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::trace;

#[derive(Debug, Eq, PartialEq, Copy, Clone, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Subservice {
    TmAcceptanceSuccess = 1,
    TmAcceptanceFailure = 2,
    TmStartSuccess = 3,
    TmStartFailure = 4,
    TmStepSuccess = 5,
    TmStepFailure = 6,
    TmCompletionSuccess = 7,
    TmCompletionFailure = 8,
    TmRoutingFailure = 10,
}

/// One of the nine verification report kinds.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum VerificationOutcome {
    AcceptanceSuccess,
    AcceptanceFailure(ErrorCode),
    StartSuccess,
    StartFailure(ErrorCode),
    ProgressSuccess { step: u16 },
    ProgressFailure { step: u16, code: ErrorCode },
    CompletionSuccess,
    CompletionFailure(ErrorCode),
    RoutingFailure(ErrorCode),
}

impl VerificationOutcome {
    pub fn subservice(&self) -> Subservice {
        match self {
            VerificationOutcome::AcceptanceSuccess => Subservice::TmAcceptanceSuccess,
            VerificationOutcome::AcceptanceFailure(_) => Subservice::TmAcceptanceFailure,
            VerificationOutcome::StartSuccess => Subservice::TmStartSuccess,
            VerificationOutcome::StartFailure(_) => Subservice::TmStartFailure,
            VerificationOutcome::ProgressSuccess { .. } => Subservice::TmStepSuccess,
            VerificationOutcome::ProgressFailure { .. } => Subservice::TmStepFailure,
            VerificationOutcome::CompletionSuccess => Subservice::TmCompletionSuccess,
            VerificationOutcome::CompletionFailure(_) => Subservice::TmCompletionFailure,
            VerificationOutcome::RoutingFailure(_) => Subservice::TmRoutingFailure,
        }
    }

    /// Acknowledgement flag which gates a success report. Failures are not gated.
    pub fn ack_flag(&self) -> Option<AckFlags> {
        match self {
            VerificationOutcome::AcceptanceSuccess => Some(AckFlags::ACCEPTANCE),
            VerificationOutcome::StartSuccess => Some(AckFlags::START),
            VerificationOutcome::ProgressSuccess { .. } => Some(AckFlags::PROGRESS),
            VerificationOutcome::CompletionSuccess => Some(AckFlags::COMPLETION),
            _ => None,
        }
    }

    pub fn error_code(&self) -> Option<ErrorCode> {
        match self {
            VerificationOutcome::AcceptanceFailure(code)
            | VerificationOutcome::StartFailure(code)
            | VerificationOutcome::ProgressFailure { code, .. }
            | VerificationOutcome::CompletionFailure(code)
            | VerificationOutcome::RoutingFailure(code) => Some(*code),
            _ => None,
        }
    }

    pub fn step(&self) -> Option<u16> {
        match self {
            VerificationOutcome::ProgressSuccess { step }
            | VerificationOutcome::ProgressFailure { step, .. } => Some(*step),
            _ => None,
        }
    }

    #[inline]
    pub fn is_failure(&self) -> bool {
        self.error_code().is_some()
    }

    pub fn error_kind(&self) -> ErrorKind {
        match self {
            VerificationOutcome::AcceptanceSuccess | VerificationOutcome::AcceptanceFailure(_) => {
                ErrorKind::Acceptance
            }
            VerificationOutcome::StartSuccess | VerificationOutcome::StartFailure(_) => {
                ErrorKind::Start
            }
            VerificationOutcome::ProgressSuccess { .. }
            | VerificationOutcome::ProgressFailure { .. } => ErrorKind::Progress,
            VerificationOutcome::CompletionSuccess
            | VerificationOutcome::CompletionFailure(_) => ErrorKind::Completion,
            VerificationOutcome::RoutingFailure(_) => ErrorKind::Routing,
        }
    }
}

/// Identity of the request a verification report refers to.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct VerifiedRequest {
    pub request_id: RequestId,
    pub ack_flags: AckFlags,
    pub service_type: u8,
    pub message_type: u8,
}

impl VerifiedRequest {
    pub fn from_tc(tc: &Message) -> Self {
        VerifiedRequest {
            request_id: RequestId::new(tc),
            ack_flags: tc.ack_flags(),
            service_type: tc.service_type(),
            message_type: tc.message_type(),
        }
    }

    /// Best effort identification of raw bytes which could not be parsed. Requires at least
    /// the primary header. Missing secondary header fields are zero and all acknowledgement
    /// flags are assumed to be set.
    pub fn from_raw(raw: &[u8]) -> Option<Self> {
        let sp_header = SpHeader::from_be_bytes(raw).ok()?;
        Some(VerifiedRequest {
            request_id: RequestId::new(&sp_header),
            ack_flags: raw
                .get(6)
                .map(|byte| AckFlags::from_raw(*byte))
                .unwrap_or(AckFlags::ALL),
            service_type: raw.get(7).copied().unwrap_or(0),
            message_type: raw.get(8).copied().unwrap_or(0),
        })
    }

    #[inline]
    pub fn apid(&self) -> u16 {
        self.request_id.apid()
    }

    #[inline]
    pub fn seq_count(&self) -> u16 {
        self.request_id.seq_count()
    }
}

/// Side channel notification which accompanies every emitted verification report.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct VerificationNotice {
    pub outcome: VerificationOutcome,
    pub request: VerifiedRequest,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationReport {
    pub tm: Message,
    pub notice: VerificationNotice,
}

/// Generates the service 1 verification reports of one service instance.
#[derive(Debug, Default, Clone)]
pub struct VerificationReporter {
    counters: MessageTypeCounters,
    destination_id: u16,
}

impl VerificationReporter {
    pub fn new(destination_id: u16) -> Self {
        Self {
            counters: MessageTypeCounters::default(),
            destination_id,
        }
    }

    #[inline]
    pub fn counters(&self) -> &MessageTypeCounters {
        &self.counters
    }

    /// Report the outcome for a parsed telecommand. See [Self::report_for].
    pub fn report(
        &mut self,
        factory: &MessageFactory,
        errors: &mut ErrorLog,
        tc: &Message,
        outcome: VerificationOutcome,
        time: CucTime,
    ) -> Result<Option<VerificationReport>, PusError> {
        self.report_for(factory, errors, &VerifiedRequest::from_tc(tc), outcome, time)
    }

    /// Returns [None] for a success outcome whose acknowledgement flag is not set in the
    /// request. Failures are always reported and logged.
    pub fn report_for(
        &mut self,
        factory: &MessageFactory,
        errors: &mut ErrorLog,
        request: &VerifiedRequest,
        outcome: VerificationOutcome,
        time: CucTime,
    ) -> Result<Option<VerificationReport>, PusError> {
        if let Some(flag) = outcome.ack_flag() {
            if !request.ack_flags.contains(flag) {
                trace!(
                    apid = request.apid(),
                    seq_count = request.seq_count(),
                    ?outcome,
                    "success report not requested"
                );
                return Ok(None);
            }
        }
        if let Some(code) = outcome.error_code() {
            errors.log(LoggedError {
                kind: outcome.error_kind(),
                code,
                request: Some(request.request_id),
                step: outcome.step(),
            });
        }
        let subservice: u8 = outcome.subservice().into();
        let mut tm = factory.start_report(
            time,
            PusServiceId::Verification as u8,
            subservice,
            self.counters.get_and_increment(subservice),
            self.destination_id,
        )?;
        request.request_id.append_to(&mut tm)?;
        if let Some(step) = outcome.step() {
            tm.append_u16(step)?;
        }
        if let Some(code) = outcome.error_code() {
            tm.append_u16(code.into())?;
        }
        factory.close_message(&mut tm)?;
        Ok(Some(VerificationReport {
            tm,
            notice: VerificationNotice {
                outcome,
                request: *request,
            },
        }))
    }
}
