//! Service 21: request sequencing.
//!
//! A direct load request carries the sequence ID, the number of activities and for every
//! activity its delay in ticks as `u32` followed by the request as octet string. All other
//! requests carry the sequence ID only.
use super::{ExecutionFailure, Outbox, PusContext, PusService};
use crate::ecss::sequence::{Activity, Sequence, SequenceError};
use crate::ecss::{ErrorCode, PusServiceId};
use crate::message::Message;
use crate::seq_count::MessageTypeCounters;
use alloc::vec::Vec;
use tracing::debug;

pub const MSG_TYPE_LOAD: u8 = 1;
pub const MSG_TYPE_UNLOAD: u8 = 2;
pub const MSG_TYPE_ACTIVATE: u8 = 3;
pub const MSG_TYPE_ABORT: u8 = 4;
pub const MSG_TYPE_REPORT_STATUS: u8 = 5;
pub const MSG_TYPE_STATUS_REPORT: u8 = 6;
pub const MSG_TYPE_CHECKSUM: u8 = 8;
pub const MSG_TYPE_CHECKSUM_REPORT: u8 = 9;

#[derive(Debug, Default)]
pub struct SequencingService {
    counters: MessageTypeCounters,
}

impl SequencingService {
    fn load(&mut self, tc: &mut Message, ctx: &mut PusContext) -> Result<(), ExecutionFailure> {
        let id = tc.read_u16()?;
        let num_activities = tc.read_u16()?;
        let mut activities = Vec::with_capacity(num_activities as usize);
        for _ in 0..num_activities {
            let delay = tc.read_u32()?;
            activities.push(Activity::new(tc.read_octet_string()?.to_vec(), delay));
        }
        ctx.sequences.load(id, Sequence::new(activities))?;
        Ok(())
    }

    fn report_status(
        &mut self,
        ctx: &mut PusContext,
        out: &mut Outbox,
    ) -> Result<(), ExecutionFailure> {
        let mut report = out.start_report(
            ctx.now(),
            self.service_type(),
            MSG_TYPE_STATUS_REPORT,
            self.counters.get_and_increment(MSG_TYPE_STATUS_REPORT),
        )?;
        report.append_u16(ctx.sequences.len() as u16)?;
        for (id, sequence) in ctx.sequences.iter() {
            report.append_u16(id)?;
            report.append_u8(sequence.status() as u8)?;
        }
        out.send(report)?;
        Ok(())
    }

    fn report_checksum(
        &mut self,
        tc: &mut Message,
        ctx: &mut PusContext,
        out: &mut Outbox,
    ) -> Result<(), ExecutionFailure> {
        let id = tc.read_u16()?;
        let sequence = ctx
            .sequences
            .get(id)
            .ok_or(SequenceError::UnknownSequence(id))?;
        let mut report = out.start_report(
            ctx.now(),
            self.service_type(),
            MSG_TYPE_CHECKSUM_REPORT,
            self.counters.get_and_increment(MSG_TYPE_CHECKSUM_REPORT),
        )?;
        report.append_u16(id)?;
        report.append_u16(sequence.activities().len() as u16)?;
        report.append_u16(sequence.checksum())?;
        out.send(report)?;
        Ok(())
    }
}

impl PusService for SequencingService {
    fn service_type(&self) -> u8 {
        PusServiceId::RequestSequencing as u8
    }

    fn message_types(&self) -> &'static [u8] {
        &[
            MSG_TYPE_LOAD,
            MSG_TYPE_UNLOAD,
            MSG_TYPE_ACTIVATE,
            MSG_TYPE_ABORT,
            MSG_TYPE_REPORT_STATUS,
            MSG_TYPE_CHECKSUM,
        ]
    }

    fn handle(
        &mut self,
        tc: &mut Message,
        ctx: &mut PusContext,
        out: &mut Outbox,
    ) -> Result<(), ExecutionFailure> {
        match tc.message_type() {
            MSG_TYPE_LOAD => self.load(tc, ctx),
            MSG_TYPE_UNLOAD => {
                ctx.sequences.unload(tc.read_u16()?)?;
                Ok(())
            }
            MSG_TYPE_ACTIVATE => Ok(ctx.sequences.activate(tc.read_u16()?)?),
            MSG_TYPE_ABORT => Ok(ctx.sequences.abort(tc.read_u16()?)?),
            MSG_TYPE_REPORT_STATUS => self.report_status(ctx, out),
            MSG_TYPE_CHECKSUM => self.report_checksum(tc, ctx, out),
            _ => Err(ExecutionFailure::Start(ErrorCode::IllegalMessageType)),
        }
    }

    /// Release the requests of all executing sequences which are due.
    fn tick(&mut self, ctx: &mut PusContext, out: &mut Outbox) {
        for (id, request) in ctx.sequences.step_all() {
            debug!(id, len = request.len(), "releasing sequence activity");
            out.release_request(request);
        }
    }
}
