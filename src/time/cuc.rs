//! Compact CUC style time representation.
//!
//! A CUC timestamp is a binary tick counter relative to a configurable epoch. The width of one
//! tick is the configured resolution in milliseconds. In the default profile the epoch is the
//! [CCSDS epoch](super::CCSDS_EPOCH), the resolution is 1000 ms and the counter is serialized as a
//! 4 byte big endian field. The counter wraps around when it overflows.
use super::{TimeError, UtcTimestamp, CCSDS_EPOCH, MS_PER_SECOND};
use crate::ByteConversionError;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Width of a serialized timestamp in the default profile.
pub const CUC_TIMESTAMP_LEN: usize = 4;
pub const DEFAULT_RESOLUTION_MS: u32 = 1000;

/// CUC tick counter value.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CucTime(pub u32);

impl CucTime {
    #[inline]
    pub const fn ticks(&self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn wrapping_add(&self, ticks: u32) -> Self {
        CucTime(self.0.wrapping_add(ticks))
    }

    #[inline]
    pub const fn to_be_bytes(&self) -> [u8; CUC_TIMESTAMP_LEN] {
        self.0.to_be_bytes()
    }

    pub fn from_be_bytes(buf: &[u8]) -> Result<Self, ByteConversionError> {
        if buf.len() < CUC_TIMESTAMP_LEN {
            return Err(ByteConversionError::FromSliceTooSmall {
                found: buf.len(),
                expected: CUC_TIMESTAMP_LEN,
            });
        }
        Ok(CucTime(u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]])))
    }

    pub fn write_to_be_bytes(&self, buf: &mut [u8]) -> Result<usize, ByteConversionError> {
        if buf.len() < CUC_TIMESTAMP_LEN {
            return Err(ByteConversionError::ToSliceTooSmall {
                found: buf.len(),
                expected: CUC_TIMESTAMP_LEN,
            });
        }
        buf[0..CUC_TIMESTAMP_LEN].copy_from_slice(&self.to_be_bytes());
        Ok(CUC_TIMESTAMP_LEN)
    }
}

impl From<u32> for CucTime {
    fn from(ticks: u32) -> Self {
        CucTime(ticks)
    }
}

/// Converts between [UtcTimestamp]s and [CucTime] tick counters for a given epoch and resolution.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CucTimeProvider {
    epoch: UtcTimestamp,
    resolution_ms: u32,
}

impl Default for CucTimeProvider {
    fn default() -> Self {
        Self {
            epoch: CCSDS_EPOCH,
            resolution_ms: DEFAULT_RESOLUTION_MS,
        }
    }
}

impl CucTimeProvider {
    pub fn new(epoch: UtcTimestamp, resolution_ms: u32) -> Result<Self, TimeError> {
        if resolution_ms == 0 {
            return Err(TimeError::InvalidResolution);
        }
        Ok(Self {
            epoch,
            resolution_ms,
        })
    }

    #[inline]
    pub fn epoch(&self) -> UtcTimestamp {
        self.epoch
    }

    #[inline]
    pub fn resolution_ms(&self) -> u32 {
        self.resolution_ms
    }

    /// Convert a calendar timestamp into a tick counter. The counter wraps around if the elapsed
    /// time does not fit into 32 bits.
    pub fn cuc_from_utc(&self, utc: &UtcTimestamp) -> Result<CucTime, TimeError> {
        let elapsed_ms = utc.seconds_since(&self.epoch)? * MS_PER_SECOND as u64;
        Ok(CucTime((elapsed_ms / self.resolution_ms as u64) as u32))
    }

    /// Convert a tick counter back into a calendar timestamp. Sub-second parts are truncated.
    pub fn utc_from_cuc(&self, cuc: CucTime) -> Result<UtcTimestamp, TimeError> {
        let elapsed_ms = cuc.ticks() as u64 * self.resolution_ms as u64;
        self.epoch.add_seconds(elapsed_ms / MS_PER_SECOND as u64)
    }

    /// Number of ticks covering the passed duration, rounded up so that a non-zero duration is
    /// never shorter than requested.
    #[inline]
    pub fn ticks_from_ms(&self, duration_ms: u32) -> u32 {
        duration_ms.div_ceil(self.resolution_ms)
    }
}

/// On-board time source of the stack. The clock is advanced explicitly, usually once per
/// scheduler tick, which keeps all time dependent behaviour deterministic.
#[derive(Debug, Default, Copy, Clone)]
pub struct MissionClock {
    provider: CucTimeProvider,
    now: CucTime,
}

impl MissionClock {
    pub fn new(provider: CucTimeProvider) -> Self {
        Self {
            provider,
            now: CucTime::default(),
        }
    }

    #[inline]
    pub fn now(&self) -> CucTime {
        self.now
    }

    #[inline]
    pub fn provider(&self) -> &CucTimeProvider {
        &self.provider
    }

    /// Advance the clock by the given number of ticks, wrapping around on overflow.
    pub fn advance(&mut self, ticks: u32) {
        self.now = self.now.wrapping_add(ticks);
    }

    pub fn set_ticks(&mut self, now: CucTime) {
        self.now = now;
    }

    /// Synchronize the clock to a calendar time.
    pub fn set_utc(&mut self, utc: &UtcTimestamp) -> Result<(), TimeError> {
        self.now = self.provider.cuc_from_utc(utc)?;
        Ok(())
    }

    pub fn now_utc(&self) -> Result<UtcTimestamp, TimeError> {
        self.provider.utc_from_cuc(self.now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_profile() {
        let provider = CucTimeProvider::default();
        assert_eq!(provider.epoch(), CCSDS_EPOCH);
        assert_eq!(provider.resolution_ms(), 1000);
        assert_eq!(provider.cuc_from_utc(&CCSDS_EPOCH).unwrap(), CucTime(0));
        let one_day_later = UtcTimestamp::new(1958, 1, 2, 0, 0, 0).unwrap();
        assert_eq!(
            provider.cuc_from_utc(&one_day_later).unwrap(),
            CucTime(86400)
        );
    }

    #[test]
    fn test_roundtrip_custom_resolution() {
        let epoch = UtcTimestamp::new(2020, 1, 1, 0, 0, 0).unwrap();
        let provider = CucTimeProvider::new(epoch, 100).unwrap();
        let stamp = UtcTimestamp::new(2020, 1, 1, 0, 1, 0).unwrap();
        let cuc = provider.cuc_from_utc(&stamp).unwrap();
        assert_eq!(cuc, CucTime(600));
        assert_eq!(provider.utc_from_cuc(cuc).unwrap(), stamp);
    }

    #[test]
    fn test_before_epoch() {
        let epoch = UtcTimestamp::new(2020, 1, 1, 0, 0, 0).unwrap();
        let provider = CucTimeProvider::new(epoch, 1000).unwrap();
        let stamp = UtcTimestamp::new(2019, 12, 31, 23, 59, 59).unwrap();
        assert_eq!(
            provider.cuc_from_utc(&stamp).unwrap_err(),
            TimeError::DateBeforeEpoch
        );
    }

    #[test]
    fn test_invalid_resolution() {
        assert_eq!(
            CucTimeProvider::new(CCSDS_EPOCH, 0).unwrap_err(),
            TimeError::InvalidResolution
        );
    }

    #[test]
    fn test_counter_wraps() {
        // 2^32 seconds after the epoch wraps the counter back to 0.
        let provider = CucTimeProvider::default();
        let wrapped = CCSDS_EPOCH.add_seconds(1 << 32).unwrap();
        assert_eq!(provider.cuc_from_utc(&wrapped).unwrap(), CucTime(0));
        assert_eq!(CucTime(u32::MAX).wrapping_add(2), CucTime(1));
    }

    #[test]
    fn test_serialization() {
        let cuc = CucTime(0x01020304);
        assert_eq!(cuc.to_be_bytes(), [1, 2, 3, 4]);
        let mut buf = [0; 6];
        assert_eq!(cuc.write_to_be_bytes(&mut buf).unwrap(), 4);
        assert_eq!(CucTime::from_be_bytes(&buf).unwrap(), cuc);
        assert!(CucTime::from_be_bytes(&buf[0..3]).is_err());
        assert!(cuc.write_to_be_bytes(&mut buf[0..2]).is_err());
    }

    #[test]
    fn test_ticks_from_ms() {
        let provider = CucTimeProvider::new(CCSDS_EPOCH, 250).unwrap();
        assert_eq!(provider.ticks_from_ms(0), 0);
        assert_eq!(provider.ticks_from_ms(250), 1);
        assert_eq!(provider.ticks_from_ms(251), 2);
    }

    #[test]
    fn test_mission_clock() {
        let mut clock = MissionClock::default();
        assert_eq!(clock.now(), CucTime(0));
        clock.advance(5);
        assert_eq!(clock.now(), CucTime(5));
        let stamp = UtcTimestamp::new(1958, 1, 1, 0, 1, 0).unwrap();
        clock.set_utc(&stamp).unwrap();
        assert_eq!(clock.now(), CucTime(60));
        assert_eq!(clock.now_utc().unwrap(), stamp);
    }
}
