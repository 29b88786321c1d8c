//! Parameter statistics.
//!
//! A [Statistic] accumulates the minimum and maximum together with their observation times,
//! the running mean and the sum of squares of one parameter. The [StatisticsRegistry] samples
//! all registered parameters from the [ParameterPool] once per sampling interval and decides
//! when a periodic report is due.
use super::parameter::{ParameterId, ParameterPool};
use super::ErrorCode;
use crate::message::Message;
use crate::time::cuc::CucTime;
use crate::ByteConversionError;
use alloc::collections::BTreeMap;
#[allow(unused_imports)]
#[cfg(not(feature = "std"))]
use num_traits::float::FloatCore;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Statistic {
    max: f64,
    max_time: CucTime,
    min: f64,
    min_time: CucTime,
    mean: f64,
    sum_of_squares: f64,
    count: u32,
}

impl Default for Statistic {
    fn default() -> Self {
        Self {
            max: f64::NEG_INFINITY,
            max_time: CucTime(0),
            min: f64::INFINITY,
            min_time: CucTime(0),
            mean: 0.0,
            sum_of_squares: 0.0,
            count: 0,
        }
    }
}

impl Statistic {
    pub fn update(&mut self, value: f64, now: CucTime) {
        if value > self.max {
            self.max = value;
            self.max_time = now;
        }
        if value < self.min {
            self.min = value;
            self.min_time = now;
        }
        let n = self.count as f64;
        self.mean = (self.mean * n + value) / (n + 1.0);
        self.sum_of_squares += value * value;
        self.count += 1;
    }

    /// Restore the uninitialized state.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    #[inline]
    pub fn is_uninitialized(&self) -> bool {
        *self == Self::default()
    }

    #[inline]
    pub fn count(&self) -> u32 {
        self.count
    }

    #[inline]
    pub fn max(&self) -> (f64, CucTime) {
        (self.max, self.max_time)
    }

    #[inline]
    pub fn min(&self) -> (f64, CucTime) {
        (self.min, self.min_time)
    }

    #[inline]
    pub fn mean(&self) -> f64 {
        self.mean
    }

    #[inline]
    pub fn sum_of_squares(&self) -> f64 {
        self.sum_of_squares
    }

    /// The absolute value guards against small negative rounding artifacts.
    #[cfg(feature = "stddev")]
    pub fn standard_deviation(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        (self.sum_of_squares / self.count as f64 - self.mean * self.mean)
            .abs()
            .sqrt()
    }

    /// Append parameter ID, sample count, maximum and its time, minimum and its time, the mean
    /// and, with the `stddev` feature, the standard deviation.
    pub fn append_to_report(
        &self,
        report: &mut Message,
        parameter_id: ParameterId,
    ) -> Result<(), ByteConversionError> {
        report.append_u16(parameter_id)?;
        report.append_u32(self.count)?;
        report.append_f64(self.max)?;
        report.append_u32(self.max_time.ticks())?;
        report.append_f64(self.min)?;
        report.append_u32(self.min_time.ticks())?;
        report.append_f64(self.mean)?;
        #[cfg(feature = "stddev")]
        report.append_f64(self.standard_deviation())?;
        Ok(())
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum StatisticsError {
    #[error("statistics for parameter {0} already exist")]
    AlreadyRegistered(ParameterId),
    #[error("no statistics for parameter {0}")]
    NotRegistered(ParameterId),
    #[error("statistics table full")]
    TableFull,
}

impl StatisticsError {
    pub fn error_code(&self) -> ErrorCode {
        match self {
            StatisticsError::AlreadyRegistered(_) => ErrorCode::InvalidParameters,
            StatisticsError::NotRegistered(_) => ErrorCode::UnknownParameter,
            StatisticsError::TableFull => ErrorCode::TableFull,
        }
    }
}

pub const DEFAULT_STATISTICS_CAPACITY: usize = 64;

/// Statistics of all monitored parameters.
#[derive(Debug, Clone)]
pub struct StatisticsRegistry {
    stats: BTreeMap<ParameterId, Statistic>,
    capacity: usize,
    sampling_interval: u32,
    sampling_counter: u32,
    reporting_interval: u32,
    reporting_counter: u32,
    periodic_reporting: bool,
    reset_after_report: bool,
    evaluation_start: CucTime,
}

impl Default for StatisticsRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_STATISTICS_CAPACITY, 1, 10)
    }
}

impl StatisticsRegistry {
    /// Intervals are given in ticks and are at least 1.
    pub fn new(capacity: usize, sampling_interval: u32, reporting_interval: u32) -> Self {
        Self {
            stats: BTreeMap::new(),
            capacity,
            sampling_interval: sampling_interval.max(1),
            sampling_counter: 0,
            reporting_interval: reporting_interval.max(1),
            reporting_counter: 0,
            periodic_reporting: false,
            reset_after_report: true,
            evaluation_start: CucTime(0),
        }
    }

    pub fn add(&mut self, id: ParameterId) -> Result<(), StatisticsError> {
        if self.stats.contains_key(&id) {
            return Err(StatisticsError::AlreadyRegistered(id));
        }
        if self.stats.len() >= self.capacity {
            return Err(StatisticsError::TableFull);
        }
        self.stats.insert(id, Statistic::default());
        Ok(())
    }

    pub fn remove(&mut self, id: ParameterId) -> Result<(), StatisticsError> {
        self.stats
            .remove(&id)
            .map(|_| ())
            .ok_or(StatisticsError::NotRegistered(id))
    }

    #[inline]
    pub fn get(&self, id: ParameterId) -> Option<&Statistic> {
        self.stats.get(&id)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.stats.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ParameterId, &Statistic)> {
        self.stats.iter().map(|(id, stat)| (*id, stat))
    }

    #[inline]
    pub fn evaluation_start(&self) -> CucTime {
        self.evaluation_start
    }

    #[inline]
    pub fn reset_after_report(&self) -> bool {
        self.reset_after_report
    }

    pub fn set_reset_after_report(&mut self, reset: bool) {
        self.reset_after_report = reset;
    }

    #[inline]
    pub fn periodic_reporting(&self) -> bool {
        self.periodic_reporting
    }

    /// Enable periodic reporting, optionally with a new reporting interval in ticks.
    pub fn enable_periodic_reporting(&mut self, interval: Option<u32>) {
        if let Some(interval) = interval {
            self.reporting_interval = interval.max(1);
        }
        self.reporting_counter = 0;
        self.periodic_reporting = true;
    }

    pub fn disable_periodic_reporting(&mut self) {
        self.periodic_reporting = false;
    }

    #[inline]
    pub fn reporting_interval(&self) -> u32 {
        self.reporting_interval
    }

    /// Advance the sampling counter by one tick and sample all parameters once the sampling
    /// interval elapsed. Parameters which are missing from the pool are skipped.
    pub fn sample(&mut self, pool: &ParameterPool, now: CucTime) {
        self.sampling_counter += 1;
        if self.sampling_counter < self.sampling_interval {
            return;
        }
        self.sampling_counter = 0;
        for (id, stat) in self.stats.iter_mut() {
            if let Some(value) = pool.get(*id) {
                stat.update(value.as_f64(), now);
            }
        }
    }

    /// Advance the reporting counter by one tick. Returns true if a periodic report is due.
    pub fn report_due(&mut self) -> bool {
        if !self.periodic_reporting {
            return false;
        }
        self.reporting_counter += 1;
        if self.reporting_counter < self.reporting_interval {
            return false;
        }
        self.reporting_counter = 0;
        true
    }

    /// Reset all statistics and start a new evaluation period.
    pub fn reset_all(&mut self, now: CucTime) {
        debug!(num_params = self.stats.len(), "resetting parameter statistics");
        for stat in self.stats.values_mut() {
            stat.reset();
        }
        self.evaluation_start = now;
    }

    /// Append the evaluation period, the number of parameters and the statistics of every
    /// parameter. All statistics are reset afterwards if reset after report is enabled.
    pub fn append_report(
        &mut self,
        report: &mut Message,
        now: CucTime,
    ) -> Result<(), ByteConversionError> {
        report.append_u32(self.evaluation_start.ticks())?;
        report.append_u32(now.ticks())?;
        report.append_u16(self.stats.len() as u16)?;
        for (id, stat) in self.stats.iter() {
            stat.append_to_report(report, *id)?;
        }
        if self.reset_after_report {
            self.reset_all(now);
        }
        Ok(())
    }
}
