//! Time representation for the PUS stack.
//!
//! [UtcTimestamp] is the human readable calendar representation. It is converted into the compact
//! CUC tick counter format by the [cuc::CucTimeProvider]. The [scheduler] module contains the tick
//! scheduler which drives all periodic activities of the stack.
use core::fmt::{Display, Formatter};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

pub mod cuc;
pub mod scheduler;

pub const SECONDS_PER_MINUTE: u32 = 60;
pub const SECONDS_PER_HOUR: u32 = 3600;
pub const SECONDS_PER_DAY: u32 = 86400;
pub const MS_PER_SECOND: u32 = 1000;

/// CCSDS epoch 1958-01-01T00:00:00Z, the default epoch of the CUC time format.
pub const CCSDS_EPOCH: UtcTimestamp = UtcTimestamp {
    year: 1958,
    month: 1,
    day: 1,
    hour: 0,
    minute: 0,
    second: 0,
};

/// Unix epoch 1970-01-01T00:00:00Z.
pub const UNIX_EPOCH: UtcTimestamp = UtcTimestamp {
    year: 1970,
    month: 1,
    day: 1,
    hour: 0,
    minute: 0,
    second: 0,
};

#[derive(Debug, PartialEq, Eq, Copy, Clone, thiserror::Error)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub enum TimeError {
    #[error("invalid calendar date {year}-{month}-{day}")]
    InvalidDate { year: u16, month: u8, day: u8 },
    #[error("invalid time of day {hour}:{minute}:{second}")]
    InvalidTimeOfDay { hour: u8, minute: u8, second: u8 },
    #[error("timestamp lies before the configured epoch")]
    DateBeforeEpoch,
    #[error("time resolution of 0 ms is invalid")]
    InvalidResolution,
    #[error("timestamp out of the representable range")]
    OutOfRange,
}

#[inline]
pub const fn is_leap_year(year: u32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

/// Number of days of the given month. The month is expected to be in the range 1 to 12.
pub const fn days_in_month(year: u32, month: u32) -> u32 {
    match month {
        2 => {
            if is_leap_year(year) {
                29
            } else {
                28
            }
        }
        4 | 6 | 9 | 11 => 30,
        _ => 31,
    }
}

/// Days since 1970-01-01 for a proleptic gregorian calendar date.
pub(crate) const fn days_from_civil(year: i64, month: i64, day: i64) -> i64 {
    let y = if month <= 2 { year - 1 } else { year };
    let era = (if y >= 0 { y } else { y - 399 }) / 400;
    let yoe = y - era * 400;
    let mp = (month + 9) % 12;
    let doy = (153 * mp + 2) / 5 + day - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146097 + doe - 719468
}

/// Inverse of [days_from_civil]. Returns a (year, month, day) tuple.
pub(crate) const fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719468;
    let era = (if z >= 0 { z } else { z - 146096 }) / 146097;
    let doe = z - era * 146097;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    let year = yoe + era * 400 + if month <= 2 { 1 } else { 0 };
    (year, month, day)
}

/// UTC calendar timestamp with second granularity.
///
/// The derived ordering is lexicographic over (year, month, day, hour, minute, second), which is
/// the chronological order for valid timestamps.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct UtcTimestamp {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl Default for UtcTimestamp {
    fn default() -> Self {
        CCSDS_EPOCH
    }
}

impl UtcTimestamp {
    /// Create a validated timestamp. Use [Self::new_repaired] to normalize over-range fields
    /// instead of rejecting them.
    pub fn new(
        year: u16,
        month: u8,
        day: u8,
        hour: u8,
        minute: u8,
        second: u8,
    ) -> Result<Self, TimeError> {
        if !(1..=12).contains(&month)
            || day == 0
            || day as u32 > days_in_month(year as u32, month as u32)
        {
            return Err(TimeError::InvalidDate { year, month, day });
        }
        if hour >= 24 || minute >= 60 || second >= 60 {
            return Err(TimeError::InvalidTimeOfDay {
                hour,
                minute,
                second,
            });
        }
        Ok(Self {
            year,
            month,
            day,
            hour,
            minute,
            second,
        })
    }

    pub fn new_repaired(year: u16, month: u8, day: u8, hour: u8, minute: u8, second: u8) -> Self {
        let mut stamp = Self {
            year,
            month,
            day,
            hour,
            minute,
            second,
        };
        stamp.repair();
        stamp
    }

    /// Normalize over-range fields by cascading the carries up to the year.
    ///
    /// Seconds carry into minutes, minutes into hours, hours into days and days into months,
    /// honoring the number of days of each month. A month or day of 0 is treated as 1. The year
    /// saturates at [u16::MAX].
    pub fn repair(&mut self) {
        let mut second = self.second as u32;
        let mut minute = self.minute as u32;
        let mut hour = self.hour as u32;
        let mut day = self.day.max(1) as u32;
        let mut month = self.month.max(1) as u32;
        let mut year = self.year as u32;

        minute += second / 60;
        second %= 60;
        hour += minute / 60;
        minute %= 60;
        day += hour / 24;
        hour %= 24;
        year += (month - 1) / 12;
        month = (month - 1) % 12 + 1;
        loop {
            let days_of_month = days_in_month(year, month);
            if day <= days_of_month {
                break;
            }
            day -= days_of_month;
            month += 1;
            if month > 12 {
                month = 1;
                year += 1;
            }
        }

        self.year = year.min(u16::MAX as u32) as u16;
        self.month = month as u8;
        self.day = day as u8;
        self.hour = hour as u8;
        self.minute = minute as u8;
        self.second = second as u8;
    }

    /// Seconds since the Unix epoch. Negative for timestamps before 1970.
    pub fn unix_seconds(&self) -> i64 {
        let days = days_from_civil(self.year as i64, self.month as i64, self.day as i64);
        days * SECONDS_PER_DAY as i64
            + self.hour as i64 * SECONDS_PER_HOUR as i64
            + self.minute as i64 * SECONDS_PER_MINUTE as i64
            + self.second as i64
    }

    pub fn from_unix_seconds(unix_seconds: i64) -> Result<Self, TimeError> {
        let days = unix_seconds.div_euclid(SECONDS_PER_DAY as i64);
        let secs_of_day = unix_seconds.rem_euclid(SECONDS_PER_DAY as i64) as u32;
        let (year, month, day) = civil_from_days(days);
        if !(0..=u16::MAX as i64).contains(&year) {
            return Err(TimeError::OutOfRange);
        }
        Ok(Self {
            year: year as u16,
            month: month as u8,
            day: day as u8,
            hour: (secs_of_day / SECONDS_PER_HOUR) as u8,
            minute: ((secs_of_day % SECONDS_PER_HOUR) / SECONDS_PER_MINUTE) as u8,
            second: (secs_of_day % SECONDS_PER_MINUTE) as u8,
        })
    }

    /// Seconds elapsed since the passed epoch.
    pub fn seconds_since(&self, epoch: &UtcTimestamp) -> Result<u64, TimeError> {
        let diff = self.unix_seconds() - epoch.unix_seconds();
        if diff < 0 {
            return Err(TimeError::DateBeforeEpoch);
        }
        Ok(diff as u64)
    }

    pub fn add_seconds(&self, seconds: u64) -> Result<Self, TimeError> {
        let seconds = i64::try_from(seconds).map_err(|_| TimeError::OutOfRange)?;
        Self::from_unix_seconds(
            self.unix_seconds()
                .checked_add(seconds)
                .ok_or(TimeError::OutOfRange)?,
        )
    }
}

impl Display for UtcTimestamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}Z",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        )
    }
}

#[cfg(feature = "chrono")]
impl TryFrom<chrono::DateTime<chrono::Utc>> for UtcTimestamp {
    type Error = TimeError;

    fn try_from(date_time: chrono::DateTime<chrono::Utc>) -> Result<Self, Self::Error> {
        Self::from_unix_seconds(date_time.timestamp())
    }
}

#[cfg(feature = "chrono")]
impl TryFrom<UtcTimestamp> for chrono::DateTime<chrono::Utc> {
    type Error = TimeError;

    fn try_from(stamp: UtcTimestamp) -> Result<Self, Self::Error> {
        chrono::DateTime::from_timestamp(stamp.unix_seconds(), 0).ok_or(TimeError::OutOfRange)
    }
}

#[cfg(feature = "std")]
impl UtcTimestamp {
    /// Current system time, truncated to full seconds.
    pub fn now() -> Result<Self, TimeError> {
        Self::try_from(chrono::Utc::now())
    }
}
