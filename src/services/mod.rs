//! Per-service request handling.
//!
//! Every PUS service is a thin [PusService] implementation which decodes the application data
//! of its telecommands, drives the passive data structures inside the shared [PusContext] and
//! creates its reports through the [Outbox]. The [PusDispatcher] accepts raw telecommands,
//! routes them to the service registered for their service type and emits the request
//! verification reports of service 1 based on the [ExecutionFailure] returned by the service.
use crate::config::{ConfigError, StackConfig};
use crate::crc::CRC_LEN;
use crate::ecss::error_log::{ErrorKind, ErrorLog, LoggedError};
use crate::ecss::event_action::{EventActionError, EventActionTable};
use crate::ecss::factory::MessageFactory;
use crate::ecss::function::{FunctionError, FunctionPool};
use crate::ecss::monitoring::{EventId, MonitoringEngine, MonitoringError};
use crate::ecss::packet_store::{PacketStore, PacketStoreError, PacketStoreRegistry};
use crate::ecss::parameter::{ParameterError, ParameterPool};
use crate::ecss::sequence::{SequenceError, SequenceStore};
use crate::ecss::statistics::{StatisticsError, StatisticsRegistry};
use crate::ecss::verification::{
    VerificationNotice, VerificationOutcome, VerificationReporter, VerifiedRequest,
};
use crate::ecss::{ErrorCode, PusError};
use crate::message::Message;
use crate::time::cuc::{CucTime, MissionClock};
use crate::ByteConversionError;
use alloc::boxed::Box;
use alloc::vec::Vec;
use tracing::{error, trace, warn};

pub mod event_action;
pub mod function;
pub mod monitoring;
pub mod parameter;
pub mod sequencing;
pub mod statistics;
pub mod storage;

pub use event_action::EventActionService;
pub use function::FunctionService;
pub use monitoring::MonitoringService;
pub use parameter::ParameterService;
pub use sequencing::SequencingService;
pub use statistics::StatisticsService;
pub use storage::StorageService;
pub use test::TestService;

/// Shared state of all services.
#[derive(Debug, Default)]
pub struct PusContext {
    pub clock: MissionClock,
    pub parameters: ParameterPool,
    pub statistics: StatisticsRegistry,
    pub monitoring: MonitoringEngine,
    pub packet_stores: PacketStoreRegistry,
    pub sequences: SequenceStore,
    pub event_actions: EventActionTable,
    pub functions: FunctionPool,
    pub errors: ErrorLog,
}

impl PusContext {
    /// Create all tables with the configured capacities and load the configured parameters,
    /// monitoring definitions, event-action definitions and packet stores.
    pub fn new(config: &StackConfig) -> Result<Self, ConfigError> {
        let mut ctx = Self {
            clock: MissionClock::new(config.time),
            parameters: ParameterPool::new(config.parameter_capacity),
            statistics: StatisticsRegistry::new(
                config.statistics_capacity,
                config.statistics_sampling_interval,
                config.statistics_reporting_interval,
            ),
            monitoring: MonitoringEngine::new(config.monitoring_capacity),
            packet_stores: PacketStoreRegistry::default(),
            sequences: SequenceStore::new(config.sequence_capacity, config.sequence_batch_size),
            event_actions: EventActionTable::new(config.event_action_capacity),
            functions: FunctionPool::new(config.function_capacity),
            errors: ErrorLog::new(config.error_log_capacity),
        };
        for def in config.parameters.iter() {
            ctx.parameters.add(def.id, def.initial_value()?)?;
        }
        for cfg in config.monitoring.iter() {
            ctx.monitoring.add(cfg.id, cfg.to_definition())?;
        }
        for cfg in config.event_actions.iter() {
            ctx.event_actions.add(cfg.to_definition()?)?;
        }
        for cfg in config.packet_stores.iter() {
            ctx.packet_stores.add(
                cfg.id,
                PacketStore::new(cfg.virtual_channel, cfg.policy, cfg.capacity_bytes),
            )?;
        }
        Ok(ctx)
    }

    #[inline]
    pub fn now(&self) -> CucTime {
        self.clock.now()
    }
}

/// Reason why a request could not be executed. Determines which failure verification report
/// is emitted.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecutionFailure {
    #[error("start of execution failed: {0:?}")]
    Start(ErrorCode),
    #[error("execution step {step} failed: {code:?}")]
    Progress { step: u16, code: ErrorCode },
    #[error("completion of execution failed: {0:?}")]
    Completion(ErrorCode),
}

impl From<ByteConversionError> for ExecutionFailure {
    /// Truncated application data fails the start of execution, a report which does not fit
    /// into a packet fails the completion.
    fn from(value: ByteConversionError) -> Self {
        match value {
            ByteConversionError::FromSliceTooSmall { .. } => {
                ExecutionFailure::Start(ErrorCode::InvalidLength)
            }
            ByteConversionError::ToSliceTooSmall { .. } => {
                ExecutionFailure::Completion(ErrorCode::ReportTooLarge)
            }
        }
    }
}

impl From<PusError> for ExecutionFailure {
    fn from(value: PusError) -> Self {
        match value {
            PusError::ByteConversion(e) => e.into(),
            PusError::PacketTooLarge { .. } => {
                ExecutionFailure::Completion(ErrorCode::ReportTooLarge)
            }
            _ => ExecutionFailure::Completion(ErrorCode::ExecutionFailed),
        }
    }
}

impl From<FunctionError> for ExecutionFailure {
    fn from(value: FunctionError) -> Self {
        match value {
            FunctionError::Failed(code) => ExecutionFailure::Completion(code),
            e => ExecutionFailure::Start(e.error_code()),
        }
    }
}

macro_rules! start_failure_from {
    ($($error: ty),+ $(,)?) => {
        $(
            impl From<$error> for ExecutionFailure {
                fn from(value: $error) -> Self {
                    ExecutionFailure::Start(value.error_code())
                }
            }
        )+
    };
}

start_failure_from!(
    ParameterError,
    StatisticsError,
    MonitoringError,
    PacketStoreError,
    SequenceError,
    EventActionError,
);

/// Everything produced while handling one request or one tick.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ServiceOutput {
    /// Generated telemetry, including verification reports.
    pub tm: Vec<Vec<u8>>,
    /// Packets retrieved from packet stores.
    pub downlink: Vec<Vec<u8>>,
    pub notices: Vec<VerificationNotice>,
    /// Events raised by the on-board monitoring.
    pub events: Vec<EventId>,
    /// Requests released for execution, for example by a request sequence.
    pub requests: Vec<Vec<u8>>,
}

/// Report sink handed to the services.
#[derive(Debug)]
pub struct Outbox<'factory> {
    factory: &'factory MessageFactory,
    destination_id: u16,
    output: ServiceOutput,
    /// Successfully executed steps together with the number of reports queued at that time.
    steps: Vec<(u16, usize)>,
}

impl<'factory> Outbox<'factory> {
    pub fn new(factory: &'factory MessageFactory, destination_id: u16) -> Self {
        Self {
            factory,
            destination_id,
            output: ServiceOutput::default(),
            steps: Vec::new(),
        }
    }

    #[inline]
    pub fn factory(&self) -> &MessageFactory {
        self.factory
    }

    /// Report header for incremental payload creation. Finish the report with [Self::send].
    pub fn start_report(
        &self,
        time: CucTime,
        service_type: u8,
        message_type: u8,
        message_type_counter: u16,
    ) -> Result<Message, PusError> {
        self.factory.start_report(
            time,
            service_type,
            message_type,
            message_type_counter,
            self.destination_id,
        )
    }

    /// Close the report and queue it for sending.
    pub fn send(&mut self, mut report: Message) -> Result<(), PusError> {
        self.factory.close_message(&mut report)?;
        trace!(
            service = report.service_type(),
            message_type = report.message_type(),
            len = report.len(),
            "queueing report"
        );
        self.output.tm.push(report.into_vec());
        Ok(())
    }

    pub fn downlink(&mut self, packet: Vec<u8>) {
        self.output.downlink.push(packet);
    }

    pub fn raise_event(&mut self, event_id: EventId) {
        self.output.events.push(event_id);
    }

    pub fn release_request(&mut self, request: Vec<u8>) {
        self.output.requests.push(request);
    }

    /// Report the successful execution of a step of the telecommand being handled. The progress
    /// report follows all reports queued so far. Ignored outside of [PusService::handle].
    pub fn report_progress(&mut self, step: u16) {
        trace!(step, "execution step completed");
        self.steps.push((step, self.output.tm.len()));
    }

    #[inline]
    pub fn num_tm(&self) -> usize {
        self.output.tm.len()
    }

    #[inline]
    pub fn output(&self) -> &ServiceOutput {
        &self.output
    }

    pub fn into_output(self) -> ServiceOutput {
        self.output
    }

    fn insert_tm(&mut self, at: Option<usize>, tm: Vec<u8>) {
        match at {
            Some(idx) if idx <= self.output.tm.len() => self.output.tm.insert(idx, tm),
            _ => self.output.tm.push(tm),
        }
    }
}

/// A PUS service. Services are registered with the [PusDispatcher].
pub trait PusService {
    fn service_type(&self) -> u8;

    /// All message types of telecommands handled by this service.
    fn message_types(&self) -> &'static [u8];

    /// Execute an accepted telecommand of one of the [Self::message_types]. The cursor of the
    /// telecommand is positioned at the start of the application data and the CRC field is
    /// already stripped.
    fn handle(
        &mut self,
        tc: &mut Message,
        ctx: &mut PusContext,
        out: &mut Outbox,
    ) -> Result<(), ExecutionFailure>;

    /// Called once per tick for periodic work.
    fn tick(&mut self, _ctx: &mut PusContext, _out: &mut Outbox) {}
}

/// Log a report which could not be created.
pub(crate) fn log_report_error(errors: &mut ErrorLog, service: u8, err: PusError) {
    error!(service, %err, "failed to create report");
    errors.log_internal(ErrorCode::ReportTooLarge);
}

/// Accepts telecommands, routes them to their service and reports their verification.
pub struct PusDispatcher {
    factory: MessageFactory,
    verification: VerificationReporter,
    destination_id: u16,
    services: Vec<Box<dyn PusService + Send>>,
}

impl core::fmt::Debug for PusDispatcher {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PusDispatcher")
            .field("factory", &self.factory)
            .field("destination_id", &self.destination_id)
            .field(
                "services",
                &self.services.iter().map(|s| s.service_type()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl PusDispatcher {
    pub fn new(factory: MessageFactory, destination_id: u16) -> Self {
        Self {
            factory,
            verification: VerificationReporter::new(destination_id),
            destination_id,
            services: Vec::new(),
        }
    }

    /// Dispatcher with all services of this crate registered.
    pub fn with_standard_services(factory: MessageFactory, destination_id: u16) -> Self {
        let mut dispatcher = Self::new(factory, destination_id);
        dispatcher.register(TestService::default());
        dispatcher.register(ParameterService::default());
        dispatcher.register(FunctionService::default());
        dispatcher.register(EventActionService::default());
        dispatcher.register(SequencingService::default());
        dispatcher.register(StatisticsService::default());
        dispatcher.register(MonitoringService::default());
        dispatcher.register(StorageService::default());
        dispatcher
    }

    #[inline]
    pub fn factory(&self) -> &MessageFactory {
        &self.factory
    }

    #[inline]
    pub fn verification(&self) -> &VerificationReporter {
        &self.verification
    }

    /// Register a service. A previously registered service with the same service type is
    /// replaced, in which case true is returned.
    pub fn register(&mut self, service: impl PusService + Send + 'static) -> bool {
        let service_type = service.service_type();
        if let Some(existing) = self
            .services
            .iter_mut()
            .find(|s| s.service_type() == service_type)
        {
            *existing = Box::new(service);
            return true;
        }
        self.services.push(Box::new(service));
        false
    }

    pub fn service_types(&self) -> impl Iterator<Item = u8> + '_ {
        self.services.iter().map(|s| s.service_type())
    }

    fn verify(
        verification: &mut VerificationReporter,
        out: &mut Outbox,
        errors: &mut ErrorLog,
        request: &VerifiedRequest,
        outcome: VerificationOutcome,
        now: CucTime,
        at: Option<usize>,
    ) -> bool {
        match verification.report_for(out.factory, errors, request, outcome, now) {
            Ok(Some(report)) => {
                out.insert_tm(at, report.tm.into_vec());
                out.output.notices.push(report.notice);
                true
            }
            Ok(None) => false,
            Err(e) => {
                log_report_error(errors, 1, e);
                false
            }
        }
    }

    /// Handle one raw telecommand.
    pub fn dispatch(&mut self, raw: &[u8], ctx: &mut PusContext) -> ServiceOutput {
        let now = ctx.now();
        let mut out = Outbox::new(&self.factory, self.destination_id);
        let mut tc = match self.factory.accept_command(raw) {
            Ok(tc) => tc,
            Err(e) => {
                let code = e.acceptance_code();
                warn!(%e, ?code, "telecommand rejected");
                match VerifiedRequest::from_raw(raw) {
                    Some(request) => {
                        Self::verify(
                            &mut self.verification,
                            &mut out,
                            &mut ctx.errors,
                            &request,
                            VerificationOutcome::AcceptanceFailure(code),
                            now,
                            None,
                        );
                    }
                    None => ctx.errors.log(LoggedError {
                        kind: ErrorKind::Acceptance,
                        code,
                        request: None,
                        step: None,
                    }),
                }
                return out.into_output();
            }
        };
        let request = VerifiedRequest::from_tc(&tc);
        let Some(idx) = self
            .services
            .iter()
            .position(|s| s.service_type() == request.service_type)
        else {
            warn!(service = request.service_type, "no handler for service");
            Self::verify(
                &mut self.verification,
                &mut out,
                &mut ctx.errors,
                &request,
                VerificationOutcome::RoutingFailure(ErrorCode::NoHandler),
                now,
                None,
            );
            return out.into_output();
        };
        if !self.services[idx]
            .message_types()
            .contains(&request.message_type)
        {
            warn!(
                service = request.service_type,
                message_type = request.message_type,
                "illegal message type"
            );
            Self::verify(
                &mut self.verification,
                &mut out,
                &mut ctx.errors,
                &request,
                VerificationOutcome::AcceptanceFailure(ErrorCode::IllegalMessageType),
                now,
                None,
            );
            return out.into_output();
        }
        Self::verify(
            &mut self.verification,
            &mut out,
            &mut ctx.errors,
            &request,
            VerificationOutcome::AcceptanceSuccess,
            now,
            None,
        );
        if self.factory.config().has_crc {
            tc.truncate(tc.len() - CRC_LEN);
        }
        let execution_start = out.num_tm();
        let result = self.services[idx].handle(&mut tc, ctx, &mut out);
        let mut report = |out: &mut Outbox, outcome, at| {
            Self::verify(
                &mut self.verification,
                out,
                &mut ctx.errors,
                &request,
                outcome,
                now,
                at,
            )
        };
        let (started, outcome) = match result {
            Err(ExecutionFailure::Start(code)) => (false, VerificationOutcome::StartFailure(code)),
            Err(ExecutionFailure::Progress { step, code }) => {
                (true, VerificationOutcome::ProgressFailure { step, code })
            }
            Err(ExecutionFailure::Completion(code)) => {
                (true, VerificationOutcome::CompletionFailure(code))
            }
            Ok(()) => (true, VerificationOutcome::CompletionSuccess),
        };
        let steps = core::mem::take(&mut out.steps);
        if started {
            // Every inserted report shifts the positions of the later ones.
            let mut inserted = usize::from(report(
                &mut out,
                VerificationOutcome::StartSuccess,
                Some(execution_start),
            ));
            for (step, at) in steps {
                if report(
                    &mut out,
                    VerificationOutcome::ProgressSuccess { step },
                    Some(at + inserted),
                ) {
                    inserted += 1;
                }
            }
        }
        report(&mut out, outcome, None);
        out.into_output()
    }

    /// Give every service the chance to do its periodic work.
    pub fn tick(&mut self, ctx: &mut PusContext) -> ServiceOutput {
        let mut out = Outbox::new(&self.factory, self.destination_id);
        for service in self.services.iter_mut() {
            service.tick(ctx, &mut out);
        }
        out.into_output()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::ecss::factory::FactoryConfig;
    use crate::ecss::tc::{AckFlags, PusTcCreator, PusTcSecondaryHeader};
    use crate::ecss::verification::Subservice;
    use crate::SpHeader;
    use alloc::vec;

    pub fn tc(service: u8, message_type: u8, app_data: &[u8]) -> Vec<u8> {
        let sp_header = SpHeader::tc(0x10, 5, 0).unwrap();
        let sec_header =
            PusTcSecondaryHeader::new(service, message_type, AckFlags::ALL, 0);
        PusTcCreator::new(sp_header, sec_header, app_data, true)
            .to_vec()
            .unwrap()
    }

    pub fn service_and_type(tm: &[u8]) -> (u8, u8) {
        (tm[7], tm[8])
    }

    pub fn types(output: &ServiceOutput) -> Vec<(u8, u8)> {
        output.tm.iter().map(|tm| service_and_type(tm)).collect()
    }

    pub fn dispatcher() -> PusDispatcher {
        PusDispatcher::with_standard_services(MessageFactory::new(FactoryConfig::default()), 0)
    }

    struct Failing(ExecutionFailure);

    impl PusService for Failing {
        fn service_type(&self) -> u8 {
            128
        }

        fn message_types(&self) -> &'static [u8] {
            &[1]
        }

        fn handle(
            &mut self,
            _tc: &mut Message,
            _ctx: &mut PusContext,
            _out: &mut Outbox,
        ) -> Result<(), ExecutionFailure> {
            Err(self.0)
        }
    }

    struct Stepping(Result<(), ExecutionFailure>);

    impl PusService for Stepping {
        fn service_type(&self) -> u8 {
            129
        }

        fn message_types(&self) -> &'static [u8] {
            &[1]
        }

        fn handle(
            &mut self,
            _tc: &mut Message,
            ctx: &mut PusContext,
            out: &mut Outbox,
        ) -> Result<(), ExecutionFailure> {
            out.report_progress(1);
            let report = out.start_report(ctx.now(), 129, 2, 0)?;
            out.send(report)?;
            out.report_progress(2);
            self.0
        }
    }

    #[test]
    fn test_full_verification_sequence() {
        let mut dispatcher = dispatcher();
        let mut ctx = PusContext::default();
        let output = dispatcher.dispatch(&tc(17, 1, &[]), &mut ctx);
        assert_eq!(
            types(&output),
            vec![(1, 1), (1, 3), (17, 2), (1, 7)]
        );
        assert_eq!(output.notices.len(), 3);
        assert!(ctx.errors.is_empty());
    }

    #[test]
    fn test_success_reports_follow_ack_flags() {
        let mut dispatcher = dispatcher();
        let mut ctx = PusContext::default();
        let sp_header = SpHeader::tc(0x10, 5, 0).unwrap();
        let sec_header = PusTcSecondaryHeader::new(17, 1, AckFlags::COMPLETION, 0);
        let raw = PusTcCreator::new(sp_header, sec_header, &[], true)
            .to_vec()
            .unwrap();
        let output = dispatcher.dispatch(&raw, &mut ctx);
        assert_eq!(types(&output), vec![(17, 2), (1, 7)]);
    }

    #[test]
    fn test_acceptance_failure() {
        let mut dispatcher = dispatcher();
        let mut ctx = PusContext::default();
        let mut raw = tc(17, 1, &[]);
        let last = raw.len() - 1;
        raw[last] ^= 0xff;
        let output = dispatcher.dispatch(&raw, &mut ctx);
        assert_eq!(types(&output), vec![(1, 2)]);
        assert_eq!(
            output.notices[0].outcome,
            VerificationOutcome::AcceptanceFailure(ErrorCode::InvalidChecksum)
        );
        assert_eq!(ctx.errors.last().unwrap().kind, ErrorKind::Acceptance);
    }

    #[test]
    fn test_illegal_message_type() {
        let mut dispatcher = dispatcher();
        let mut ctx = PusContext::default();
        let output = dispatcher.dispatch(&tc(17, 3, &[]), &mut ctx);
        assert_eq!(types(&output), vec![(1, 2)]);
        assert_eq!(
            output.notices[0].outcome.error_code(),
            Some(ErrorCode::IllegalMessageType)
        );
    }

    #[test]
    fn test_routing_failure() {
        let mut dispatcher = dispatcher();
        let mut ctx = PusContext::default();
        let output = dispatcher.dispatch(&tc(200, 1, &[]), &mut ctx);
        assert_eq!(types(&output), vec![(1, Subservice::TmRoutingFailure as u8)]);
        assert_eq!(ctx.errors.last().unwrap().kind, ErrorKind::Routing);
    }

    #[test]
    fn test_execution_failures() {
        let mut dispatcher = dispatcher();
        let mut ctx = PusContext::default();
        dispatcher.register(Failing(ExecutionFailure::Start(ErrorCode::InvalidParameters)));
        let output = dispatcher.dispatch(&tc(128, 1, &[]), &mut ctx);
        assert_eq!(types(&output), vec![(1, 1), (1, 4)]);

        assert!(dispatcher.register(Failing(ExecutionFailure::Progress {
            step: 2,
            code: ErrorCode::ExecutionFailed
        })));
        let output = dispatcher.dispatch(&tc(128, 1, &[]), &mut ctx);
        assert_eq!(types(&output), vec![(1, 1), (1, 3), (1, 6)]);
        assert_eq!(output.notices[2].outcome.step(), Some(2));

        dispatcher.register(Failing(ExecutionFailure::Completion(
            ErrorCode::ExecutionFailed,
        )));
        let output = dispatcher.dispatch(&tc(128, 1, &[]), &mut ctx);
        assert_eq!(types(&output), vec![(1, 1), (1, 3), (1, 8)]);
        assert_eq!(ctx.errors.total_count(), 3);
    }

    #[test]
    fn test_progress_reports() {
        let mut dispatcher = dispatcher();
        let mut ctx = PusContext::default();
        dispatcher.register(Stepping(Ok(())));
        let output = dispatcher.dispatch(&tc(129, 1, &[]), &mut ctx);
        assert_eq!(
            types(&output),
            vec![(1, 1), (1, 3), (1, 5), (129, 2), (1, 5), (1, 7)]
        );
        assert_eq!(output.notices[2].outcome.step(), Some(1));
        assert_eq!(output.notices[3].outcome.step(), Some(2));

        dispatcher.register(Stepping(Err(ExecutionFailure::Progress {
            step: 3,
            code: ErrorCode::ExecutionFailed,
        })));
        let output = dispatcher.dispatch(&tc(129, 1, &[]), &mut ctx);
        assert_eq!(
            types(&output),
            vec![(1, 1), (1, 3), (1, 5), (129, 2), (1, 5), (1, 6)]
        );

        // No step reports without a successful start.
        dispatcher.register(Stepping(Err(ExecutionFailure::Start(
            ErrorCode::InvalidParameters,
        ))));
        let output = dispatcher.dispatch(&tc(129, 1, &[]), &mut ctx);
        assert_eq!(types(&output), vec![(1, 1), (129, 2), (1, 4)]);
    }

    #[test]
    fn test_progress_reports_follow_ack_flags() {
        let mut dispatcher = dispatcher();
        let mut ctx = PusContext::default();
        dispatcher.register(Stepping(Ok(())));
        let sp_header = SpHeader::tc(0x10, 5, 0).unwrap();
        let sec_header = PusTcSecondaryHeader::new(
            129,
            1,
            AckFlags::PROGRESS.union(AckFlags::COMPLETION),
            0,
        );
        let raw = PusTcCreator::new(sp_header, sec_header, &[], true)
            .to_vec()
            .unwrap();
        let output = dispatcher.dispatch(&raw, &mut ctx);
        assert_eq!(types(&output), vec![(1, 5), (129, 2), (1, 5), (1, 7)]);
    }

    #[test]
    fn test_truncated_application_data_fails_start() {
        assert_eq!(
            ExecutionFailure::from(ByteConversionError::FromSliceTooSmall {
                found: 1,
                expected: 2
            }),
            ExecutionFailure::Start(ErrorCode::InvalidLength)
        );
    }
}
