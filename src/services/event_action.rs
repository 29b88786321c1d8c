//! Service 19: event-action.
//!
//! Definitions are identified by application ID and event ID, both encoded as `u16`. Add
//! requests carry the action request as octet string after the identification.
use super::{ExecutionFailure, Outbox, PusContext, PusService};
use crate::ecss::event_action::EventActionDefinition;
use crate::ecss::monitoring::EventId;
use crate::ecss::{ErrorCode, PusServiceId};
use crate::message::Message;
use crate::seq_count::MessageTypeCounters;
use alloc::vec::Vec;

pub const MSG_TYPE_ADD: u8 = 1;
pub const MSG_TYPE_DELETE: u8 = 2;
pub const MSG_TYPE_DELETE_ALL: u8 = 3;
pub const MSG_TYPE_ENABLE: u8 = 4;
pub const MSG_TYPE_DISABLE: u8 = 5;
pub const MSG_TYPE_REPORT_STATUS: u8 = 6;
pub const MSG_TYPE_STATUS_REPORT: u8 = 7;
pub const MSG_TYPE_ENABLE_FUNCTION: u8 = 8;
pub const MSG_TYPE_DISABLE_FUNCTION: u8 = 9;

#[derive(Debug, Default)]
pub struct EventActionService {
    counters: MessageTypeCounters,
}

fn read_identifiers(tc: &mut Message) -> Result<Vec<(u16, EventId)>, ExecutionFailure> {
    let num = tc.read_u16()?;
    let mut ids = Vec::with_capacity(num as usize);
    for _ in 0..num {
        ids.push((tc.read_u16()?, tc.read_u16()?));
    }
    Ok(ids)
}

impl EventActionService {
    fn add(&mut self, tc: &mut Message, ctx: &mut PusContext) -> Result<(), ExecutionFailure> {
        let num = tc.read_u16()?;
        let mut definitions = Vec::with_capacity(num as usize);
        for _ in 0..num {
            let application_id = tc.read_u16()?;
            let event_id = tc.read_u16()?;
            let request = tc.read_octet_string()?.to_vec();
            definitions.push(EventActionDefinition::new(application_id, event_id, request));
        }
        for definition in definitions {
            ctx.event_actions.add(definition)?;
        }
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
        report.append_u16(ctx.event_actions.len() as u16)?;
        for definition in ctx.event_actions.iter() {
            report.append_u16(definition.application_id)?;
            report.append_u16(definition.event_id)?;
            report.append_bool(definition.enabled)?;
        }
        out.send(report)?;
        Ok(())
    }
}

impl PusService for EventActionService {
    fn service_type(&self) -> u8 {
        PusServiceId::EventAction as u8
    }

    fn message_types(&self) -> &'static [u8] {
        &[
            MSG_TYPE_ADD,
            MSG_TYPE_DELETE,
            MSG_TYPE_DELETE_ALL,
            MSG_TYPE_ENABLE,
            MSG_TYPE_DISABLE,
            MSG_TYPE_REPORT_STATUS,
            MSG_TYPE_ENABLE_FUNCTION,
            MSG_TYPE_DISABLE_FUNCTION,
        ]
    }

    fn handle(
        &mut self,
        tc: &mut Message,
        ctx: &mut PusContext,
        out: &mut Outbox,
    ) -> Result<(), ExecutionFailure> {
        match tc.message_type() {
            MSG_TYPE_ADD => self.add(tc, ctx),
            MSG_TYPE_DELETE => {
                for (application_id, event_id) in read_identifiers(tc)? {
                    ctx.event_actions.delete(application_id, event_id)?;
                }
                Ok(())
            }
            MSG_TYPE_DELETE_ALL => {
                ctx.event_actions.delete_all();
                Ok(())
            }
            MSG_TYPE_ENABLE => {
                for (application_id, event_id) in read_identifiers(tc)? {
                    ctx.event_actions.enable(application_id, event_id)?;
                }
                Ok(())
            }
            MSG_TYPE_DISABLE => {
                for (application_id, event_id) in read_identifiers(tc)? {
                    ctx.event_actions.disable(application_id, event_id)?;
                }
                Ok(())
            }
            MSG_TYPE_REPORT_STATUS => self.report_status(ctx, out),
            MSG_TYPE_ENABLE_FUNCTION => {
                ctx.event_actions.enable_function();
                Ok(())
            }
            MSG_TYPE_DISABLE_FUNCTION => {
                ctx.event_actions.disable_function();
                Ok(())
            }
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

    #[test]
    fn test_add_enable_execute() {
        let mut dispatcher = dispatcher();
        let mut ctx = PusContext::default();
        let output = dispatcher.dispatch(
            &tc(19, 1, &[0, 1, 0, 3, 0, 9, 0, 2, 0xAA, 0xBB]),
            &mut ctx,
        );
        assert_eq!(types(&output), vec![(1, 1), (1, 3), (1, 7)]);
        assert_eq!(ctx.event_actions.execute(9), None);
        dispatcher.dispatch(&tc(19, 4, &[0, 1, 0, 3, 0, 9]), &mut ctx);
        assert_eq!(ctx.event_actions.execute(9), Some(vec![0xAA, 0xBB]));
        dispatcher.dispatch(&tc(19, 9, &[]), &mut ctx);
        assert_eq!(ctx.event_actions.execute(9), None);
        dispatcher.dispatch(&tc(19, 8, &[]), &mut ctx);
        assert!(ctx.event_actions.is_function_enabled());
    }

    #[test]
    fn test_delete_enabled_definition_fails() {
        let mut dispatcher = dispatcher();
        let mut ctx = PusContext::default();
        let mut definition = EventActionDefinition::new(3, 9, vec![]);
        definition.enabled = true;
        ctx.event_actions.add(definition).unwrap();
        let output = dispatcher.dispatch(&tc(19, 2, &[0, 1, 0, 3, 0, 9]), &mut ctx);
        assert_eq!(
            output.notices.last().unwrap().outcome,
            VerificationOutcome::StartFailure(ErrorCode::EventActionDefinitionEnabled)
        );
        assert_eq!(ctx.event_actions.len(), 1);
        dispatcher.dispatch(&tc(19, 3, &[]), &mut ctx);
        assert!(ctx.event_actions.is_empty());
    }

    #[test]
    fn test_status_report() {
        let mut dispatcher = dispatcher();
        let mut ctx = PusContext::default();
        ctx.event_actions
            .add(EventActionDefinition::new(3, 9, vec![]))
            .unwrap();
        let output = dispatcher.dispatch(&tc(19, 6, &[]), &mut ctx);
        assert_eq!(types(&output), vec![(1, 1), (1, 3), (19, 7), (1, 7)]);
        assert_eq!(
            &output.tm[2][TM_HEADER_LEN..TM_HEADER_LEN + 7],
            &[0, 1, 0, 3, 0, 9, 0]
        );
    }
}
