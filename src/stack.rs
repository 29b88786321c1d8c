//! Composition root of the PUS services.
//!
//! The [PusStack] owns the shared [PusContext], the [PusDispatcher] with all standard services
//! and a [TickScheduler] for application tick handlers. Raw telecommands enter through
//! [PusStack::handle_tc], time advances through [PusStack::tick]. Both return the packets to
//! send to ground.
//!
//! Requests released internally, either by an executing request sequence or by an event-action
//! definition triggered by an on-board monitoring event, are dispatched like telecommands
//! received from ground within the same call.
use crate::config::{ConfigError, ForwardingTable, StackConfig};
use crate::ecss::factory::MessageFactory;
use crate::ecss::verification::VerificationNotice;
use crate::ecss::ErrorCode;
use crate::services::{PusContext, PusDispatcher, ServiceOutput};
use crate::time::scheduler::{TickHandler, TickHandlerId, TickScheduler};
use crate::MAX_APID;
use alloc::collections::VecDeque;
use alloc::vec::Vec;
use tracing::{debug, trace, warn};

/// Maximum number of internally released requests dispatched by one call of
/// [PusStack::handle_tc] or [PusStack::tick]. Bounds request chains of event-action
/// definitions which trigger each other.
pub const MAX_INTERNAL_REQUESTS: usize = 64;

/// Maximum number of verification notices kept until [PusStack::drain_notices] is called. The
/// oldest notices are dropped first.
pub const MAX_RETAINED_NOTICES: usize = 256;

#[derive(Debug)]
pub struct PusStack {
    ctx: PusContext,
    dispatcher: PusDispatcher,
    scheduler: TickScheduler<PusContext>,
    forwarding: Option<ForwardingTable>,
    tm_virtual_channel: u8,
    notices: VecDeque<VerificationNotice>,
    dropped_notices: u64,
}

impl PusStack {
    pub fn new(config: &StackConfig) -> Result<Self, ConfigError> {
        let ctx = PusContext::new(config)?;
        debug!(
            apid = config.factory.apid,
            num_parameters = ctx.parameters.len(),
            num_event_actions = ctx.event_actions.len(),
            "PUS stack created"
        );
        Ok(Self {
            ctx,
            dispatcher: PusDispatcher::with_standard_services(
                MessageFactory::new(config.factory),
                config.destination_id,
            ),
            scheduler: TickScheduler::default(),
            forwarding: config.forwarding.clone(),
            tm_virtual_channel: config.tm_virtual_channel,
            notices: VecDeque::new(),
            dropped_notices: 0,
        })
    }

    #[inline]
    pub fn ctx(&self) -> &PusContext {
        &self.ctx
    }

    #[inline]
    pub fn ctx_mut(&mut self) -> &mut PusContext {
        &mut self.ctx
    }

    /// Can be used to register additional services.
    #[inline]
    pub fn dispatcher_mut(&mut self) -> &mut PusDispatcher {
        &mut self.dispatcher
    }

    #[inline]
    pub fn forwarding(&self) -> Option<&ForwardingTable> {
        self.forwarding.as_ref()
    }

    pub fn set_forwarding(&mut self, forwarding: Option<ForwardingTable>) {
        self.forwarding = forwarding;
    }

    /// Register an application handler which runs at the end of every [Self::tick]. Returns
    /// true if a handler with the same ID was replaced.
    pub fn register_tick_handler(
        &mut self,
        id: TickHandlerId,
        handler: impl TickHandler<PusContext> + Send + 'static,
    ) -> bool {
        self.scheduler.register(id, handler)
    }

    pub fn unregister_tick_handler(&mut self, id: TickHandlerId) -> bool {
        self.scheduler.unregister(id)
    }

    /// Handle one raw telecommand and return the telemetry to send.
    pub fn handle_tc(&mut self, raw: &[u8]) -> Vec<Vec<u8>> {
        trace!(len = raw.len(), "handling telecommand");
        let output = self.dispatcher.dispatch(raw, &mut self.ctx);
        self.process(output)
    }

    /// Advance the mission clock by one tick and run the periodic work of all services followed
    /// by the registered tick handlers. Returns the telemetry to send, including packets of
    /// open retrievals.
    pub fn tick(&mut self) -> Vec<Vec<u8>> {
        self.ctx.clock.advance(1);
        let now = self.ctx.now();
        self.ctx.statistics.sample(&self.ctx.parameters, now);
        let output = self.dispatcher.tick(&mut self.ctx);
        let outgoing = self.process(output);
        self.scheduler.tick(&mut self.ctx, now);
        outgoing
    }

    /// Verification notices of the requests handled since the last call, at most
    /// [MAX_RETAINED_NOTICES] of them.
    pub fn drain_notices(&mut self) -> Vec<VerificationNotice> {
        self.notices.drain(..).collect()
    }

    /// Number of notices dropped because they were not drained in time.
    #[inline]
    pub fn dropped_notices(&self) -> u64 {
        self.dropped_notices
    }

    fn retain_notice(&mut self, notice: VerificationNotice) {
        if self.notices.len() == MAX_RETAINED_NOTICES {
            self.notices.pop_front();
            if self.dropped_notices == 0 {
                warn!("verification notices are not drained, dropping the oldest");
            }
            self.dropped_notices += 1;
        }
        self.notices.push_back(notice);
    }

    fn process(&mut self, output: ServiceOutput) -> Vec<Vec<u8>> {
        let mut outgoing = Vec::new();
        let mut pending = VecDeque::new();
        self.collect(output, &mut outgoing, &mut pending);
        let mut dispatched = 0;
        while let Some(request) = pending.pop_front() {
            if dispatched == MAX_INTERNAL_REQUESTS {
                warn!(
                    dropped = pending.len() + 1,
                    "too many internally released requests"
                );
                self.ctx.errors.log_internal(ErrorCode::TableFull);
                break;
            }
            dispatched += 1;
            let output = self.dispatcher.dispatch(&request, &mut self.ctx);
            self.collect(output, &mut outgoing, &mut pending);
        }
        outgoing
    }

    fn collect(
        &mut self,
        output: ServiceOutput,
        outgoing: &mut Vec<Vec<u8>>,
        pending: &mut VecDeque<Vec<u8>>,
    ) {
        let now = self.ctx.now();
        for tm in output.tm {
            for id in self
                .ctx
                .packet_stores
                .store(self.tm_virtual_channel, now, &tm)
            {
                warn!(store = id, "telemetry rejected by packet store");
                self.ctx.errors.log_internal(ErrorCode::TableFull);
            }
            if self.is_forwarded(&tm) {
                outgoing.push(tm);
            } else {
                trace!(service = tm[7], message_type = tm[8], "telemetry not forwarded");
            }
        }
        // Retrieved packets were stored already and are not filtered again.
        outgoing.extend(output.downlink);
        for notice in output.notices {
            self.retain_notice(notice);
        }
        for event_id in output.events {
            match self.ctx.event_actions.execute(event_id) {
                Some(request) => {
                    debug!(event_id, "executing event action");
                    pending.push_back(request);
                }
                None => trace!(event_id, "no enabled event action"),
            }
        }
        pending.extend(output.requests);
    }

    fn is_forwarded(&self, tm: &[u8]) -> bool {
        let Some(forwarding) = &self.forwarding else {
            return true;
        };
        if tm.len() < 9 {
            return true;
        }
        let apid = u16::from_be_bytes([tm[0], tm[1]]) & MAX_APID;
        forwarding.is_forwarded(apid, tm[7], tm[8])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EventActionConfig, ForwardingRule, PacketStoreConfig};
    use crate::ecss::factory::FactoryConfig;
    use crate::ecss::monitoring::{PmonCheck, PmonDefinition};
    use crate::ecss::packet_store::OverflowPolicy;
    use crate::ecss::parameter::ParameterValue;
    use crate::ecss::verification::VerificationOutcome;
    use crate::services::tests::{service_and_type, tc};
    use crate::time::cuc::CucTime;
    use alloc::sync::Arc;
    use alloc::vec;
    use core::sync::atomic::{AtomicU32, Ordering};

    fn types(tm: &[Vec<u8>]) -> Vec<(u8, u8)> {
        tm.iter().map(|tm| service_and_type(tm)).collect()
    }

    fn config() -> StackConfig {
        StackConfig {
            factory: FactoryConfig {
                apid: 0x22,
                ..Default::default()
            },
            packet_stores: vec![PacketStoreConfig {
                id: 1,
                virtual_channel: 0,
                policy: OverflowPolicy::Circular,
                capacity_bytes: 4096,
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_handle_tc_stores_telemetry() {
        let mut stack = PusStack::new(&config()).unwrap();
        let tm = stack.handle_tc(&tc(17, 1, &[]));
        assert_eq!(types(&tm), vec![(1, 1), (1, 3), (17, 2), (1, 7)]);
        assert_eq!(stack.ctx().packet_stores.get(1).unwrap().len(), 4);
        let notices = stack.drain_notices();
        assert_eq!(notices.len(), 3);
        assert_eq!(notices[2].outcome, VerificationOutcome::CompletionSuccess);
        assert!(stack.drain_notices().is_empty());
    }

    #[test]
    fn test_undrained_notices_are_bounded() {
        let mut stack = PusStack::new(&config()).unwrap();
        for _ in 0..100 {
            stack.handle_tc(&tc(17, 1, &[]));
        }
        assert_eq!(stack.dropped_notices(), 300 - MAX_RETAINED_NOTICES as u64);
        let notices = stack.drain_notices();
        assert_eq!(notices.len(), MAX_RETAINED_NOTICES);
        assert_eq!(
            notices.last().unwrap().outcome,
            VerificationOutcome::CompletionSuccess
        );
        assert!(stack.drain_notices().is_empty());
    }

    #[test]
    fn test_forwarding_filters_but_still_stores() {
        let mut cfg = config();
        cfg.forwarding = Some(ForwardingTable::new(vec![ForwardingRule {
            application_id: 0x22,
            service_type: 1,
            report_types: vec![1, 7],
        }]));
        let mut stack = PusStack::new(&cfg).unwrap();
        let tm = stack.handle_tc(&tc(17, 1, &[]));
        assert_eq!(types(&tm), vec![(1, 1), (17, 2), (1, 7)]);
        assert_eq!(stack.ctx().packet_stores.get(1).unwrap().len(), 4);
        stack.set_forwarding(None);
        assert_eq!(stack.handle_tc(&tc(17, 1, &[])).len(), 4);
    }

    #[test]
    fn test_monitoring_event_triggers_action() {
        let mut cfg = config();
        cfg.event_actions.push(EventActionConfig {
            application_id: 0x22,
            event_id: 300,
            enabled: true,
            action_hex: hex::encode(tc(17, 1, &[])),
        });
        let mut stack = PusStack::new(&cfg).unwrap();
        let ctx = stack.ctx_mut();
        ctx.parameters.add(1, ParameterValue::U8(3)).unwrap();
        ctx.monitoring
            .add(
                1,
                PmonDefinition::new(1, 1, 1, PmonCheck::expected_value(0xFF, 4, 300)),
            )
            .unwrap();
        let tm = stack.tick();
        assert_eq!(
            types(&tm),
            vec![(12, 12), (1, 1), (1, 3), (17, 2), (1, 7)]
        );
        // The status stays unexpected, so the event is not raised again.
        assert!(stack.tick().is_empty());
    }

    #[test]
    fn test_sequence_requests_are_dispatched() {
        let mut stack = PusStack::new(&config()).unwrap();
        let ping = tc(17, 1, &[]);
        let mut load = vec![0, 1, 0, 2];
        for delay in [1u32, 0] {
            load.extend_from_slice(&delay.to_be_bytes());
            load.extend_from_slice(&(ping.len() as u16).to_be_bytes());
            load.extend_from_slice(&ping);
        }
        stack.handle_tc(&tc(21, 1, &load));
        stack.handle_tc(&tc(21, 3, &[0, 1]));
        assert_eq!(stack.tick().len(), 4);
        assert!(stack.tick().is_empty());
        assert_eq!(stack.tick().len(), 4);
        assert!(stack.tick().is_empty());
    }

    #[test]
    fn test_open_retrieval_downlinks_stored_telemetry() {
        let mut stack = PusStack::new(&config()).unwrap();
        stack.handle_tc(&tc(17, 1, &[]));
        stack.handle_tc(&tc(15, 15, &[0, 1]));
        // Four reports of the ping and three verification reports of the resume request.
        let downlink = stack.tick();
        assert_eq!(downlink.len(), 7);
        assert_eq!(service_and_type(&downlink[2]), (17, 2));
        assert!(stack.tick().is_empty());
    }

    #[test]
    fn test_tick_handlers() {
        let mut stack = PusStack::new(&config()).unwrap();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        stack.register_tick_handler(1, move |ctx: &mut PusContext, now: CucTime| {
            assert_eq!(ctx.now(), now);
            counter.fetch_add(1, Ordering::Relaxed);
        });
        stack.tick();
        stack.tick();
        assert_eq!(calls.load(Ordering::Relaxed), 2);
        assert_eq!(stack.ctx().now(), CucTime(2));
        assert!(stack.unregister_tick_handler(1));
        stack.tick();
        assert_eq!(calls.load(Ordering::Relaxed), 2);
    }
}
