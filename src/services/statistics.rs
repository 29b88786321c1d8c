//! Service 4: parameter statistics reporting.
use super::{log_report_error, ExecutionFailure, Outbox, PusContext, PusService};
use crate::ecss::{ErrorCode, PusError, PusServiceId};
use crate::message::Message;
use crate::seq_count::MessageTypeCounters;
use tracing::debug;

pub const MSG_TYPE_REPORT: u8 = 1;
pub const MSG_TYPE_STATISTICS_REPORT: u8 = 2;
pub const MSG_TYPE_RESET: u8 = 3;
pub const MSG_TYPE_ENABLE_PERIODIC: u8 = 4;
pub const MSG_TYPE_DISABLE_PERIODIC: u8 = 5;

#[derive(Debug, Default)]
pub struct StatisticsService {
    counters: MessageTypeCounters,
}

impl StatisticsService {
    fn send_report(&mut self, ctx: &mut PusContext, out: &mut Outbox) -> Result<(), PusError> {
        let now = ctx.now();
        let mut report = out.start_report(
            now,
            self.service_type(),
            MSG_TYPE_STATISTICS_REPORT,
            self.counters.get_and_increment(MSG_TYPE_STATISTICS_REPORT),
        )?;
        ctx.statistics.append_report(&mut report, now)?;
        out.send(report)
    }
}

impl PusService for StatisticsService {
    fn service_type(&self) -> u8 {
        PusServiceId::ParameterStatistics as u8
    }

    fn message_types(&self) -> &'static [u8] {
        &[
            MSG_TYPE_REPORT,
            MSG_TYPE_RESET,
            MSG_TYPE_ENABLE_PERIODIC,
            MSG_TYPE_DISABLE_PERIODIC,
        ]
    }

    fn handle(
        &mut self,
        tc: &mut Message,
        ctx: &mut PusContext,
        out: &mut Outbox,
    ) -> Result<(), ExecutionFailure> {
        match tc.message_type() {
            MSG_TYPE_REPORT => Ok(self.send_report(ctx, out)?),
            MSG_TYPE_RESET => {
                ctx.statistics.reset_all(ctx.clock.now());
                Ok(())
            }
            MSG_TYPE_ENABLE_PERIODIC => {
                // The reporting interval in ticks is optional.
                let interval = if tc.remaining() >= 4 {
                    Some(tc.read_u32()?)
                } else {
                    None
                };
                debug!(?interval, "enabling periodic statistics reporting");
                ctx.statistics.enable_periodic_reporting(interval);
                Ok(())
            }
            MSG_TYPE_DISABLE_PERIODIC => {
                ctx.statistics.disable_periodic_reporting();
                Ok(())
            }
            _ => Err(ExecutionFailure::Start(ErrorCode::IllegalMessageType)),
        }
    }

    fn tick(&mut self, ctx: &mut PusContext, out: &mut Outbox) {
        if ctx.statistics.report_due() {
            if let Err(e) = self.send_report(ctx, out) {
                log_report_error(&mut ctx.errors, self.service_type(), e);
            }
        }
    }
}
