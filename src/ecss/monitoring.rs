//! On-board parameter monitoring.
//!
//! A [PmonDefinition] watches one parameter of the [ParameterPool] with one of the three check
//! kinds of [PmonCheck]. Every monitoring interval, the check produces a raw [CheckingStatus].
//! A raw status only becomes the checking status of the definition once it was produced
//! `repetition_number` times in a row. A [CheckTransition] is reported whenever the latched
//! checking status differs from the previous one.
//!
//! # Example
//!
//! ```rust
//! use pus_core::ecss::monitoring::{CheckingStatus, PmonCheck, PmonDefinition};
//! use pus_core::ecss::parameter::{ParameterPool, ParameterValue};
//!
//! let mut pool = ParameterPool::default();
//! pool.add(1, ParameterValue::F32(50.0)).unwrap();
//! let mut pmon = PmonDefinition::new(1, 1, 2, PmonCheck::limit(0.0, 10, 40.0, 11));
//!
//! assert!(pmon.tick(1, &pool).is_none());
//! let transition = pmon.tick(1, &pool).unwrap();
//! assert_eq!(transition.current, CheckingStatus::AboveHighLimit);
//! assert_eq!(transition.event_id, Some(11));
//! ```
use super::parameter::{ParameterId, ParameterPool, ParameterValue};
use super::ErrorCode;
use crate::message::Message;
use crate::ByteConversionError;
use alloc::collections::BTreeMap;
use alloc::vec::Vec;
use num_enum::{IntoPrimitive, TryFromPrimitive};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::debug;

pub type PmonId = u16;
pub type EventId = u16;

pub const DEFAULT_MONITORING_CAPACITY: usize = 64;

#[derive(Debug, Copy, Clone, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum CheckingStatus {
    Unchecked = 0,
    Invalid = 1,
    ExpectedValue = 2,
    UnexpectedValue = 3,
    WithinLimits = 4,
    BelowLowLimit = 5,
    AboveHighLimit = 6,
    WithinThreshold = 7,
    BelowLowThreshold = 8,
    AboveHighThreshold = 9,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[repr(u8)]
pub enum CheckType {
    ExpectedValue = 0,
    Limit = 1,
    Delta = 2,
}

/// Running state of a delta check.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DeltaState {
    previous: Option<f64>,
    accumulator: f64,
    samples: u16,
}

#[derive(Debug, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum PmonCheck {
    /// The masked raw value has to equal the expected value.
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
    /// Checks the difference between consecutive samples. With more than one consecutive delta,
    /// the deltas are accumulated and the sum is checked once the window is filled.
    Delta {
        low: f64,
        low_event: EventId,
        high: f64,
        high_event: EventId,
        consecutive_deltas: u16,
        state: DeltaState,
    },
}

fn classify(
    value: f64,
    low: f64,
    low_event: EventId,
    high: f64,
    high_event: EventId,
    statuses: [CheckingStatus; 3],
) -> (CheckingStatus, Option<EventId>) {
    if value < low {
        (statuses[0], Some(low_event))
    } else if value > high {
        (statuses[1], Some(high_event))
    } else {
        (statuses[2], None)
    }
}

impl PmonCheck {
    pub fn expected_value(mask: u64, expected: u64, event_id: EventId) -> Self {
        PmonCheck::ExpectedValue {
            mask,
            expected,
            event_id,
        }
    }

    pub fn limit(low: f64, low_event: EventId, high: f64, high_event: EventId) -> Self {
        PmonCheck::Limit {
            low,
            low_event,
            high,
            high_event,
        }
    }

    pub fn delta(
        low: f64,
        low_event: EventId,
        high: f64,
        high_event: EventId,
        consecutive_deltas: u16,
    ) -> Self {
        PmonCheck::Delta {
            low,
            low_event,
            high,
            high_event,
            consecutive_deltas,
            state: DeltaState::default(),
        }
    }

    pub fn check_type(&self) -> CheckType {
        match self {
            PmonCheck::ExpectedValue { .. } => CheckType::ExpectedValue,
            PmonCheck::Limit { .. } => CheckType::Limit,
            PmonCheck::Delta { .. } => CheckType::Delta,
        }
    }

    /// Evaluate one sample. Returns the raw status and the event ID to raise, or [None] if the
    /// sample did not complete an evaluation, which happens for the first sample of a delta
    /// check and while a delta window is filling up.
    pub fn evaluate(&mut self, value: ParameterValue) -> Option<(CheckingStatus, Option<EventId>)> {
        match self {
            PmonCheck::ExpectedValue {
                mask,
                expected,
                event_id,
            } => {
                if value.as_u64_bits() & *mask == *expected {
                    Some((CheckingStatus::ExpectedValue, None))
                } else {
                    Some((CheckingStatus::UnexpectedValue, Some(*event_id)))
                }
            }
            PmonCheck::Limit {
                low,
                low_event,
                high,
                high_event,
            } => Some(classify(
                value.as_f64(),
                *low,
                *low_event,
                *high,
                *high_event,
                [
                    CheckingStatus::BelowLowLimit,
                    CheckingStatus::AboveHighLimit,
                    CheckingStatus::WithinLimits,
                ],
            )),
            PmonCheck::Delta {
                low,
                low_event,
                high,
                high_event,
                consecutive_deltas,
                state,
            } => {
                let current = value.as_f64();
                let previous = state.previous.replace(current)?;
                let mut delta = current - previous;
                if *consecutive_deltas > 1 {
                    state.accumulator += delta;
                    state.samples += 1;
                    if state.samples < *consecutive_deltas {
                        return None;
                    }
                    delta = state.accumulator;
                    state.accumulator = 0.0;
                    state.samples = 0;
                }
                Some(classify(
                    delta,
                    *low,
                    *low_event,
                    *high,
                    *high_event,
                    [
                        CheckingStatus::BelowLowThreshold,
                        CheckingStatus::AboveHighThreshold,
                        CheckingStatus::WithinThreshold,
                    ],
                ))
            }
        }
    }

    /// Forget all samples of a delta check.
    pub fn reset(&mut self) {
        if let PmonCheck::Delta { state, .. } = self {
            *state = DeltaState::default();
        }
    }
}

/// Latched change of the checking status of a definition.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct CheckTransition {
    pub pmon_id: PmonId,
    pub parameter_id: ParameterId,
    pub check_type: CheckType,
    pub value: Option<ParameterValue>,
    pub previous: CheckingStatus,
    pub current: CheckingStatus,
    pub event_id: Option<EventId>,
}

impl CheckTransition {
    /// Append one entry of a check transition report. A missing value is written as NaN.
    pub fn append_to(&self, report: &mut Message) -> Result<(), ByteConversionError> {
        report.append_u16(self.pmon_id)?;
        report.append_u16(self.parameter_id)?;
        report.append_u8(self.check_type.into())?;
        report.append_f64(self.value.map(|v| v.as_f64()).unwrap_or(f64::NAN))?;
        report.append_u8(self.previous.into())?;
        report.append_u8(self.current.into())
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PmonDefinition {
    parameter_id: ParameterId,
    monitoring_interval: u32,
    interval_counter: u32,
    repetition_number: u16,
    repetition_counter: u16,
    candidate: Option<CheckingStatus>,
    checking_status: CheckingStatus,
    last_checking_status: CheckingStatus,
    enabled: bool,
    check: PmonCheck,
}

impl PmonDefinition {
    /// Monitoring interval in ticks. Interval and repetition number are at least 1. The
    /// definition is created enabled.
    pub fn new(
        parameter_id: ParameterId,
        monitoring_interval: u32,
        repetition_number: u16,
        check: PmonCheck,
    ) -> Self {
        Self {
            parameter_id,
            monitoring_interval: monitoring_interval.max(1),
            interval_counter: 0,
            repetition_number: repetition_number.max(1),
            repetition_counter: 0,
            candidate: None,
            checking_status: CheckingStatus::Unchecked,
            last_checking_status: CheckingStatus::Unchecked,
            enabled: true,
            check,
        }
    }

    #[inline]
    pub fn parameter_id(&self) -> ParameterId {
        self.parameter_id
    }

    #[inline]
    pub fn checking_status(&self) -> CheckingStatus {
        self.checking_status
    }

    #[inline]
    pub fn last_checking_status(&self) -> CheckingStatus {
        self.last_checking_status
    }

    #[inline]
    pub fn repetition_counter(&self) -> u16 {
        self.repetition_counter
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    #[inline]
    pub fn check(&self) -> &PmonCheck {
        &self.check
    }

    pub fn enable(&mut self) {
        if !self.enabled {
            self.restart();
            self.enabled = true;
        }
    }

    /// A disabled definition is not evaluated and its checking status returns to unchecked.
    pub fn disable(&mut self) {
        self.enabled = false;
        self.restart();
        self.last_checking_status = self.checking_status;
        self.checking_status = CheckingStatus::Unchecked;
    }

    fn restart(&mut self) {
        self.interval_counter = 0;
        self.repetition_counter = 0;
        self.candidate = None;
        self.check.reset();
    }

    /// Advance the monitoring interval counter by one tick and evaluate the check once the
    /// interval elapsed. A parameter missing from the pool yields [CheckingStatus::Invalid].
    /// Returns the transition if the checking status changed.
    pub fn tick(&mut self, pmon_id: PmonId, pool: &ParameterPool) -> Option<CheckTransition> {
        if !self.enabled {
            return None;
        }
        self.interval_counter += 1;
        if self.interval_counter < self.monitoring_interval {
            return None;
        }
        self.interval_counter = 0;
        let value = pool.get(self.parameter_id);
        let (raw_status, event_id) = match value {
            Some(value) => self.check.evaluate(value)?,
            None => (CheckingStatus::Invalid, None),
        };
        if self.candidate == Some(raw_status) {
            self.repetition_counter = self.repetition_counter.saturating_add(1);
        } else {
            self.candidate = Some(raw_status);
            self.repetition_counter = 1;
        }
        if self.repetition_counter < self.repetition_number || raw_status == self.checking_status
        {
            return None;
        }
        self.last_checking_status = self.checking_status;
        self.checking_status = raw_status;
        Some(CheckTransition {
            pmon_id,
            parameter_id: self.parameter_id,
            check_type: self.check.check_type(),
            value,
            previous: self.last_checking_status,
            current: raw_status,
            event_id,
        })
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum MonitoringError {
    #[error("unknown monitoring definition {0}")]
    UnknownDefinition(PmonId),
    #[error("monitoring definition {0} already exists")]
    DefinitionExists(PmonId),
    #[error("monitoring definition table full")]
    TableFull,
}

impl MonitoringError {
    pub fn error_code(&self) -> ErrorCode {
        match self {
            MonitoringError::UnknownDefinition(_) => ErrorCode::UnknownMonitoringDefinition,
            MonitoringError::DefinitionExists(_) => ErrorCode::InvalidParameters,
            MonitoringError::TableFull => ErrorCode::TableFull,
        }
    }
}

/// All monitoring definitions together with the global monitoring function switch.
#[derive(Debug, Clone)]
pub struct MonitoringEngine {
    definitions: BTreeMap<PmonId, PmonDefinition>,
    capacity: usize,
    function_enabled: bool,
}

impl Default for MonitoringEngine {
    fn default() -> Self {
        Self::new(DEFAULT_MONITORING_CAPACITY)
    }
}

impl MonitoringEngine {
    /// The monitoring function is enabled after creation.
    pub fn new(capacity: usize) -> Self {
        Self {
            definitions: BTreeMap::new(),
            capacity,
            function_enabled: true,
        }
    }

    pub fn add(&mut self, id: PmonId, definition: PmonDefinition) -> Result<(), MonitoringError> {
        if self.definitions.contains_key(&id) {
            return Err(MonitoringError::DefinitionExists(id));
        }
        if self.definitions.len() >= self.capacity {
            return Err(MonitoringError::TableFull);
        }
        debug!(
            pmon_id = id,
            parameter_id = definition.parameter_id,
            check = ?definition.check.check_type(),
            "adding monitoring definition"
        );
        self.definitions.insert(id, definition);
        Ok(())
    }

    pub fn delete(&mut self, id: PmonId) -> Result<PmonDefinition, MonitoringError> {
        self.definitions
            .remove(&id)
            .ok_or(MonitoringError::UnknownDefinition(id))
    }

    pub fn delete_all(&mut self) {
        self.definitions.clear();
    }

    #[inline]
    pub fn get(&self, id: PmonId) -> Option<&PmonDefinition> {
        self.definitions.get(&id)
    }

    pub fn enable(&mut self, id: PmonId) -> Result<(), MonitoringError> {
        self.definitions
            .get_mut(&id)
            .ok_or(MonitoringError::UnknownDefinition(id))?
            .enable();
        Ok(())
    }

    pub fn disable(&mut self, id: PmonId) -> Result<(), MonitoringError> {
        self.definitions
            .get_mut(&id)
            .ok_or(MonitoringError::UnknownDefinition(id))?
            .disable();
        Ok(())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    #[inline]
    pub fn is_function_enabled(&self) -> bool {
        self.function_enabled
    }

    pub fn enable_function(&mut self) {
        self.function_enabled = true;
    }

    pub fn disable_function(&mut self) {
        self.function_enabled = false;
    }

    /// Advance all enabled definitions by one tick. Does nothing while the monitoring function
    /// is disabled.
    pub fn tick(&mut self, pool: &ParameterPool) -> Vec<CheckTransition> {
        let mut transitions = Vec::new();
        if !self.function_enabled {
            return transitions;
        }
        for (id, definition) in self.definitions.iter_mut() {
            if let Some(transition) = definition.tick(*id, pool) {
                debug!(
                    pmon_id = *id,
                    parameter_id = transition.parameter_id,
                    previous = ?transition.previous,
                    current = ?transition.current,
                    "monitoring transition"
                );
                transitions.push(transition);
            }
        }
        transitions
    }
}
