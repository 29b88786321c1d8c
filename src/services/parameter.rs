//! Service 20: on-board parameter management.
//!
//! TC[20,1] carries a count followed by parameter IDs and is answered with TM[20,2], which
//! contains the count followed by ID and value of every requested parameter. TC[20,3] carries a
//! count followed by pairs of ID and new value, encoded with the registered type of the
//! parameter.
//!
//! All instructions of a request are validated before any of them is executed, so a request
//! with an unknown parameter does not change the pool.
use super::{ExecutionFailure, Outbox, PusContext, PusService};
use crate::ecss::parameter::{ParameterError, ParameterId, ParameterValue};
use crate::ecss::{ErrorCode, PusServiceId};
use crate::message::Message;
use crate::seq_count::MessageTypeCounters;
use alloc::vec::Vec;

pub const MSG_TYPE_REPORT_VALUES: u8 = 1;
pub const MSG_TYPE_VALUES_REPORT: u8 = 2;
pub const MSG_TYPE_SET_VALUES: u8 = 3;

#[derive(Debug, Default)]
pub struct ParameterService {
    counters: MessageTypeCounters,
}

impl ParameterService {
    fn report_values(
        &mut self,
        tc: &mut Message,
        ctx: &mut PusContext,
        out: &mut Outbox,
    ) -> Result<(), ExecutionFailure> {
        let num_ids = tc.read_u16()?;
        let mut values = Vec::with_capacity(num_ids as usize);
        for _ in 0..num_ids {
            let id: ParameterId = tc.read_u16()?;
            let value = ctx
                .parameters
                .get(id)
                .ok_or(ParameterError::UnknownParameter(id))?;
            values.push((id, value));
        }
        let mut report = out.start_report(
            ctx.now(),
            self.service_type(),
            MSG_TYPE_VALUES_REPORT,
            self.counters.get_and_increment(MSG_TYPE_VALUES_REPORT),
        )?;
        report.append_u16(num_ids)?;
        for (id, value) in values {
            report.append_u16(id)?;
            value.append_to(&mut report)?;
        }
        out.send(report)?;
        Ok(())
    }

    fn set_values(&mut self, tc: &mut Message, ctx: &mut PusContext) -> Result<(), ExecutionFailure> {
        let num_values = tc.read_u16()?;
        let mut values = Vec::with_capacity(num_values as usize);
        for _ in 0..num_values {
            let id: ParameterId = tc.read_u16()?;
            let current = ctx
                .parameters
                .get(id)
                .ok_or(ParameterError::UnknownParameter(id))?;
            values.push((id, ParameterValue::read_from(current.ptype(), tc)?));
        }
        for (id, value) in values {
            ctx.parameters.set(id, value)?;
        }
        Ok(())
    }
}

impl PusService for ParameterService {
    fn service_type(&self) -> u8 {
        PusServiceId::Parameter as u8
    }

    fn message_types(&self) -> &'static [u8] {
        &[MSG_TYPE_REPORT_VALUES, MSG_TYPE_SET_VALUES]
    }

    fn handle(
        &mut self,
        tc: &mut Message,
        ctx: &mut PusContext,
        out: &mut Outbox,
    ) -> Result<(), ExecutionFailure> {
        match tc.message_type() {
            MSG_TYPE_REPORT_VALUES => self.report_values(tc, ctx, out),
            MSG_TYPE_SET_VALUES => self.set_values(tc, ctx),
            _ => Err(ExecutionFailure::Start(ErrorCode::IllegalMessageType)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecss::tm::TM_HEADER_LEN;
    use crate::ecss::verification::VerificationOutcome;
    use crate::services::tests::{dispatcher, tc, types};
    use alloc::vec;

    fn ctx() -> PusContext {
        let mut ctx = PusContext::default();
        ctx.parameters.add(1, ParameterValue::U16(0x0102)).unwrap();
        ctx.parameters.add(2, ParameterValue::F32(1.5)).unwrap();
        ctx
    }

    #[test]
    fn test_report_values() {
        let mut dispatcher = dispatcher();
        let mut ctx = ctx();
        let output = dispatcher.dispatch(&tc(20, 1, &[0, 2, 0, 1, 0, 2]), &mut ctx);
        assert_eq!(types(&output), vec![(1, 1), (1, 3), (20, 2), (1, 7)]);
        let report = &output.tm[2];
        let data = &report[TM_HEADER_LEN..];
        assert_eq!(&data[..6], &[0, 2, 0, 1, 0x01, 0x02]);
        assert_eq!(&data[6..8], &[0, 2]);
        assert_eq!(&data[8..12], &1.5f32.to_be_bytes());
    }

    #[test]
    fn test_set_values() {
        let mut dispatcher = dispatcher();
        let mut ctx = ctx();
        let mut app_data = vec![0, 2, 0, 1, 0xAB, 0xCD, 0, 2];
        app_data.extend_from_slice(&(-2.0f32).to_be_bytes());
        let output = dispatcher.dispatch(&tc(20, 3, &app_data), &mut ctx);
        assert_eq!(types(&output), vec![(1, 1), (1, 3), (1, 7)]);
        assert_eq!(ctx.parameters.get(1), Some(ParameterValue::U16(0xABCD)));
        assert_eq!(ctx.parameters.get(2), Some(ParameterValue::F32(-2.0)));
        assert_eq!(ctx.parameters.drain_changes().len(), 2);
    }

    #[test]
    fn test_unknown_parameter_changes_nothing() {
        let mut dispatcher = dispatcher();
        let mut ctx = ctx();
        let output = dispatcher.dispatch(&tc(20, 3, &[0, 2, 0, 1, 0, 5, 0, 9, 0, 0]), &mut ctx);
        assert_eq!(
            output.notices.last().unwrap().outcome,
            VerificationOutcome::StartFailure(ErrorCode::UnknownParameter)
        );
        assert_eq!(ctx.parameters.get(1), Some(ParameterValue::U16(0x0102)));
    }

    #[test]
    fn test_truncated_request() {
        let mut dispatcher = dispatcher();
        let mut ctx = ctx();
        let output = dispatcher.dispatch(&tc(20, 1, &[0, 2, 0, 1]), &mut ctx);
        assert_eq!(
            output.notices.last().unwrap().outcome,
            VerificationOutcome::StartFailure(ErrorCode::InvalidLength)
        );
    }
}
