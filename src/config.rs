//! Already parsed configuration of a [PusStack](crate::stack::PusStack).
//!
//! Loading the configuration from its text representation is left to the application. With the
//! `serde` feature, all structures in this module can be deserialized from any serde data format.
use crate::ecss::error_log::DEFAULT_ERROR_LOG_CAPACITY;
use crate::ecss::event_action::{
    EventActionDefinition, EventActionError, DEFAULT_EVENT_ACTION_CAPACITY,
};
use crate::ecss::factory::FactoryConfig;
use crate::ecss::function::DEFAULT_FUNCTION_CAPACITY;
use crate::ecss::monitoring::{
    EventId, MonitoringError, PmonCheck, PmonDefinition, PmonId, DEFAULT_MONITORING_CAPACITY,
};
use crate::ecss::packet_store::{OverflowPolicy, PacketStoreError, PacketStoreId};
use crate::ecss::parameter::{
    ParameterError, ParameterId, ParameterType, ParameterValue, DEFAULT_POOL_CAPACITY,
};
use crate::ecss::sequence::{DEFAULT_MAX_BATCH, DEFAULT_SEQUENCE_CAPACITY};
use crate::ecss::statistics::DEFAULT_STATISTICS_CAPACITY;
use crate::time::cuc::CucTimeProvider;
use alloc::string::String;
use alloc::vec::Vec;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid parameter definition: {0}")]
    Parameter(#[from] ParameterError),
    #[error("invalid event-action definition: {0}")]
    EventAction(#[from] EventActionError),
    #[error("invalid packet store definition: {0}")]
    PacketStore(#[from] PacketStoreError),
    #[error("invalid monitoring definition: {0}")]
    Monitoring(#[from] MonitoringError),
    #[error("invalid hex encoded action of event {event_id}: {error}")]
    InvalidAction {
        event_id: EventId,
        error: hex::FromHexError,
    },
}

/// Registers a parameter with its default value.
#[derive(Debug, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ParameterDefinition {
    pub id: ParameterId,
    pub ptype: ParameterType,
    pub default: ParameterValue,
}

impl ParameterDefinition {
    /// Initial value of the parameter, which has to match the declared type.
    pub fn initial_value(&self) -> Result<ParameterValue, ParameterError> {
        if self.default.ptype() != self.ptype {
            return Err(ParameterError::TypeMismatch {
                id: self.id,
                expected: self.ptype,
                found: self.default.ptype(),
            });
        }
        Ok(self.default)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EventActionConfig {
    pub application_id: u16,
    pub event_id: EventId,
    pub enabled: bool,
    /// Hex encoded raw telecommand.
    pub action_hex: String,
}

impl EventActionConfig {
    pub fn to_definition(&self) -> Result<EventActionDefinition, ConfigError> {
        let request = hex::decode(&self.action_hex).map_err(|error| ConfigError::InvalidAction {
            event_id: self.event_id,
            error,
        })?;
        let mut definition =
            EventActionDefinition::new(self.application_id, self.event_id, request);
        definition.enabled = self.enabled;
        Ok(definition)
    }
}

/// Check of a configured monitoring definition, without any runtime state.
#[derive(Debug, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum PmonCheckConfig {
    ExpectedValue {
        mask: u64,
        expected: u64,
        event_id: EventId,
    },
    Limit {
        low: f64,
        low_event: EventId,
        high: f64,
        high_event: EventId,
    },
    Delta {
        low: f64,
        low_event: EventId,
        high: f64,
        high_event: EventId,
        consecutive_deltas: u16,
    },
}

impl From<PmonCheckConfig> for PmonCheck {
    fn from(value: PmonCheckConfig) -> Self {
        match value {
            PmonCheckConfig::ExpectedValue {
                mask,
                expected,
                event_id,
            } => PmonCheck::expected_value(mask, expected, event_id),
            PmonCheckConfig::Limit {
                low,
                low_event,
                high,
                high_event,
            } => PmonCheck::limit(low, low_event, high, high_event),
            PmonCheckConfig::Delta {
                low,
                low_event,
                high,
                high_event,
                consecutive_deltas,
            } => PmonCheck::delta(low, low_event, high, high_event, consecutive_deltas),
        }
    }
}

/// Monitoring definition created enabled when the stack is built.
#[derive(Debug, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PmonDefinitionConfig {
    pub id: PmonId,
    pub parameter_id: ParameterId,
    /// Ticks between two evaluations.
    pub monitoring_interval: u32,
    /// Number of consecutive identical results before a new status is latched.
    pub repetition_number: u16,
    pub check: PmonCheckConfig,
}

impl PmonDefinitionConfig {
    pub fn to_definition(&self) -> PmonDefinition {
        PmonDefinition::new(
            self.parameter_id,
            self.monitoring_interval,
            self.repetition_number,
            self.check.into(),
        )
    }
}

/// Report types of a service which are forwarded for one application process.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ForwardingRule {
    pub application_id: u16,
    pub service_type: u8,
    pub report_types: Vec<u8>,
}

/// Filter for outgoing telemetry. Reports of a service without a rule for their APID are
/// forwarded. Once a rule exists, only its report types are forwarded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ForwardingTable {
    rules: Vec<ForwardingRule>,
}

impl ForwardingTable {
    pub fn new(rules: Vec<ForwardingRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[ForwardingRule] {
        &self.rules
    }

    pub fn add_rule(&mut self, rule: ForwardingRule) {
        self.rules.push(rule);
    }

    pub fn is_forwarded(&self, application_id: u16, service_type: u8, report_type: u8) -> bool {
        let mut matching = self
            .rules
            .iter()
            .filter(|r| r.application_id == application_id && r.service_type == service_type)
            .peekable();
        if matching.peek().is_none() {
            return true;
        }
        matching.any(|r| r.report_types.contains(&report_type))
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PacketStoreConfig {
    pub id: PacketStoreId,
    pub virtual_channel: u8,
    pub policy: OverflowPolicy,
    pub capacity_bytes: usize,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct StackConfig {
    pub factory: FactoryConfig,
    /// Destination ID of all reports.
    pub destination_id: u16,
    pub time: CucTimeProvider,
    pub parameter_capacity: usize,
    pub statistics_capacity: usize,
    /// Ticks between two statistics samples.
    pub statistics_sampling_interval: u32,
    /// Ticks between two periodic statistics reports.
    pub statistics_reporting_interval: u32,
    pub monitoring_capacity: usize,
    pub event_action_capacity: usize,
    pub function_capacity: usize,
    pub sequence_capacity: usize,
    /// Maximum number of requests a sequence releases per tick.
    pub sequence_batch_size: usize,
    pub error_log_capacity: usize,
    /// Virtual channel of all generated telemetry.
    pub tm_virtual_channel: u8,
    pub parameters: Vec<ParameterDefinition>,
    pub event_actions: Vec<EventActionConfig>,
    pub monitoring: Vec<PmonDefinitionConfig>,
    pub forwarding: Option<ForwardingTable>,
    pub packet_stores: Vec<PacketStoreConfig>,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            factory: FactoryConfig::default(),
            destination_id: 0,
            time: CucTimeProvider::default(),
            parameter_capacity: DEFAULT_POOL_CAPACITY,
            statistics_capacity: DEFAULT_STATISTICS_CAPACITY,
            statistics_sampling_interval: 1,
            statistics_reporting_interval: 10,
            monitoring_capacity: DEFAULT_MONITORING_CAPACITY,
            event_action_capacity: DEFAULT_EVENT_ACTION_CAPACITY,
            function_capacity: DEFAULT_FUNCTION_CAPACITY,
            sequence_capacity: DEFAULT_SEQUENCE_CAPACITY,
            sequence_batch_size: DEFAULT_MAX_BATCH,
            error_log_capacity: DEFAULT_ERROR_LOG_CAPACITY,
            tm_virtual_channel: 0,
            parameters: Vec::new(),
            event_actions: Vec::new(),
            monitoring: Vec::new(),
            forwarding: None,
            packet_stores: Vec::new(),
        }
    }
}
