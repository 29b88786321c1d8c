//! Service 12: on-board monitoring.
//!
//! Definition related requests carry a count followed by monitoring definition IDs. Once per
//! tick, the service evaluates all definitions and reports the latched status changes with a
//! check transition report TM[12,12]. The events of the transitions are raised for the
//! event-action service.
use super::{log_report_error, ExecutionFailure, Outbox, PusContext, PusService};
use crate::ecss::monitoring::{CheckTransition, PmonId};
use crate::ecss::{ErrorCode, PusError, PusServiceId};
use crate::message::Message;
use crate::seq_count::MessageTypeCounters;
use alloc::vec::Vec;
use tracing::warn;

pub const MSG_TYPE_ENABLE_DEFINITIONS: u8 = 1;
pub const MSG_TYPE_DISABLE_DEFINITIONS: u8 = 2;
pub const MSG_TYPE_DELETE_ALL: u8 = 4;
pub const MSG_TYPE_DELETE_DEFINITIONS: u8 = 6;
pub const MSG_TYPE_CHECK_TRANSITION_REPORT: u8 = 12;
pub const MSG_TYPE_ENABLE_FUNCTION: u8 = 15;
pub const MSG_TYPE_DISABLE_FUNCTION: u8 = 16;

#[derive(Debug, Default)]
pub struct MonitoringService {
    counters: MessageTypeCounters,
}

/// Read the definition IDs of a request. Fails if any of them is unknown, so that a rejected
/// request leaves all definitions untouched.
fn read_known_ids(
    tc: &mut Message,
    ctx: &PusContext,
) -> Result<Vec<PmonId>, ExecutionFailure> {
    let num = tc.read_u16()?;
    let mut ids = Vec::with_capacity(num as usize);
    for _ in 0..num {
        let id = tc.read_u16()?;
        if ctx.monitoring.get(id).is_none() {
            warn!(
                pmon_id = id,
                message_type = tc.message_type(),
                "unknown monitoring definition"
            );
            return Err(ExecutionFailure::Start(
                ErrorCode::UnknownMonitoringDefinition,
            ));
        }
        ids.push(id);
    }
    Ok(ids)
}

impl MonitoringService {
    fn report_transitions(
        &mut self,
        ctx: &PusContext,
        out: &mut Outbox,
        transitions: &[CheckTransition],
    ) -> Result<(), PusError> {
        let mut report = out.start_report(
            ctx.now(),
            self.service_type(),
            MSG_TYPE_CHECK_TRANSITION_REPORT,
            self.counters
                .get_and_increment(MSG_TYPE_CHECK_TRANSITION_REPORT),
        )?;
        report.append_u16(transitions.len() as u16)?;
        for transition in transitions {
            transition.append_to(&mut report)?;
        }
        out.send(report)
    }
}

impl PusService for MonitoringService {
    fn service_type(&self) -> u8 {
        PusServiceId::OnBoardMonitoring as u8
    }

    fn message_types(&self) -> &'static [u8] {
        &[
            MSG_TYPE_ENABLE_DEFINITIONS,
            MSG_TYPE_DISABLE_DEFINITIONS,
            MSG_TYPE_DELETE_ALL,
            MSG_TYPE_DELETE_DEFINITIONS,
            MSG_TYPE_ENABLE_FUNCTION,
            MSG_TYPE_DISABLE_FUNCTION,
        ]
    }

    fn handle(
        &mut self,
        tc: &mut Message,
        ctx: &mut PusContext,
        _out: &mut Outbox,
    ) -> Result<(), ExecutionFailure> {
        match tc.message_type() {
            MSG_TYPE_ENABLE_DEFINITIONS => {
                for id in read_known_ids(tc, ctx)? {
                    ctx.monitoring.enable(id)?;
                }
            }
            MSG_TYPE_DISABLE_DEFINITIONS => {
                for id in read_known_ids(tc, ctx)? {
                    ctx.monitoring.disable(id)?;
                }
            }
            MSG_TYPE_DELETE_ALL => ctx.monitoring.delete_all(),
            MSG_TYPE_DELETE_DEFINITIONS => {
                for id in read_known_ids(tc, ctx)? {
                    ctx.monitoring.delete(id)?;
                }
            }
            MSG_TYPE_ENABLE_FUNCTION => ctx.monitoring.enable_function(),
            MSG_TYPE_DISABLE_FUNCTION => ctx.monitoring.disable_function(),
            _ => return Err(ExecutionFailure::Start(ErrorCode::IllegalMessageType)),
        }
        Ok(())
    }

    fn tick(&mut self, ctx: &mut PusContext, out: &mut Outbox) {
        let transitions = ctx.monitoring.tick(&ctx.parameters);
        if transitions.is_empty() {
            return;
        }
        if let Err(e) = self.report_transitions(ctx, out, &transitions) {
            log_report_error(&mut ctx.errors, self.service_type(), e);
        }
        for event_id in transitions.iter().filter_map(|t| t.event_id) {
            out.raise_event(event_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecss::monitoring::{CheckingStatus, PmonCheck, PmonDefinition};
    use crate::ecss::parameter::ParameterValue;
    use crate::ecss::tm::TM_HEADER_LEN;
    use crate::ecss::verification::VerificationOutcome;
    use crate::services::tests::{dispatcher, tc, types};
    use alloc::vec;

    fn ctx() -> PusContext {
        let mut ctx = PusContext::default();
        ctx.parameters.add(1, ParameterValue::F32(20.0)).unwrap();
        ctx.monitoring
            .add(
                5,
                PmonDefinition::new(1, 1, 1, PmonCheck::limit(0.0, 100, 50.0, 101)),
            )
            .unwrap();
        ctx
    }

    #[test]
    fn test_transition_report_and_event() {
        let mut dispatcher = dispatcher();
        let mut ctx = ctx();
        let output = dispatcher.tick(&mut ctx);
        assert_eq!(types(&output), vec![(12, 12)]);
        assert!(output.events.is_empty());
        let data = &output.tm[0][TM_HEADER_LEN..];
        assert_eq!(&data[..7], &[0, 1, 0, 5, 0, 1, 1]);

        ctx.parameters.set(1, ParameterValue::F32(60.0)).unwrap();
        let output = dispatcher.tick(&mut ctx);
        assert_eq!(output.events, vec![101]);
        assert_eq!(
            ctx.monitoring.get(5).unwrap().checking_status(),
            CheckingStatus::AboveHighLimit
        );
        // No new transition while the status stays the same.
        assert!(dispatcher.tick(&mut ctx).tm.is_empty());
    }

    #[test]
    fn test_disable_function_and_definitions() {
        let mut dispatcher = dispatcher();
        let mut ctx = ctx();
        dispatcher.dispatch(&tc(12, 16, &[]), &mut ctx);
        assert!(dispatcher.tick(&mut ctx).tm.is_empty());
        dispatcher.dispatch(&tc(12, 15, &[]), &mut ctx);
        dispatcher.dispatch(&tc(12, 2, &[0, 1, 0, 5]), &mut ctx);
        assert!(!ctx.monitoring.get(5).unwrap().is_enabled());
        assert!(dispatcher.tick(&mut ctx).tm.is_empty());
        dispatcher.dispatch(&tc(12, 1, &[0, 1, 0, 5]), &mut ctx);
        assert_eq!(types(&dispatcher.tick(&mut ctx)), vec![(12, 12)]);
    }

    #[test]
    fn test_rejected_switch_changes_nothing() {
        let mut dispatcher = dispatcher();
        let mut ctx = ctx();
        ctx.monitoring
            .add(
                6,
                PmonDefinition::new(1, 1, 1, PmonCheck::expected_value(1, 1, 3)),
            )
            .unwrap();
        let output = dispatcher.dispatch(&tc(12, 2, &[0, 3, 0, 5, 0, 6, 0, 7]), &mut ctx);
        assert_eq!(
            output.notices.last().unwrap().outcome,
            VerificationOutcome::StartFailure(ErrorCode::UnknownMonitoringDefinition)
        );
        assert!(ctx.monitoring.get(5).unwrap().is_enabled());
        assert!(ctx.monitoring.get(6).unwrap().is_enabled());

        dispatcher.dispatch(&tc(12, 2, &[0, 2, 0, 5, 0, 6]), &mut ctx);
        let output = dispatcher.dispatch(&tc(12, 1, &[0, 2, 0, 5, 0, 9]), &mut ctx);
        assert_eq!(
            output.notices.last().unwrap().outcome,
            VerificationOutcome::StartFailure(ErrorCode::UnknownMonitoringDefinition)
        );
        assert!(!ctx.monitoring.get(5).unwrap().is_enabled());
    }

    #[test]
    fn test_delete_definitions() {
        let mut dispatcher = dispatcher();
        let mut ctx = ctx();
        let output = dispatcher.dispatch(&tc(12, 6, &[0, 2, 0, 5, 0, 6]), &mut ctx);
        assert_eq!(
            output.notices.last().unwrap().outcome,
            VerificationOutcome::StartFailure(ErrorCode::UnknownMonitoringDefinition)
        );
        assert_eq!(ctx.monitoring.len(), 1);
        dispatcher.dispatch(&tc(12, 6, &[0, 1, 0, 5]), &mut ctx);
        assert!(ctx.monitoring.is_empty());
        ctx.monitoring
            .add(
                6,
                PmonDefinition::new(1, 1, 1, PmonCheck::expected_value(1, 1, 3)),
            )
            .unwrap();
        dispatcher.dispatch(&tc(12, 4, &[]), &mut ctx);
        assert!(ctx.monitoring.is_empty());
    }
}
