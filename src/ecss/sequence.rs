//! On-board request sequences.
//!
//! A [Sequence] is an ordered list of [Activity]s. Each activity holds a raw telecommand and the
//! number of ticks to wait after releasing it before the next activity becomes due. Sequences are
//! driven by calling [Sequence::step] once per tick, which returns the requests released in that
//! tick.
use super::ErrorCode;
use crate::crc::{crc16_with_initial, CRC_INITIAL};
use alloc::collections::BTreeMap;
use alloc::vec::Vec;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::debug;

pub type SequenceId = u16;

pub const DEFAULT_SEQUENCE_CAPACITY: usize = 16;
/// Maximum number of requests a single sequence releases per tick.
pub const DEFAULT_MAX_BATCH: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Activity {
    pub request: Vec<u8>,
    /// Ticks to wait after this activity was released.
    pub delay: u32,
}

impl Activity {
    pub fn new(request: Vec<u8>, delay: u32) -> Self {
        Self { request, delay }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SequenceStatus {
    Inactive = 0,
    Execution = 1,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sequence {
    activities: Vec<Activity>,
    cursor: usize,
    countdown: u32,
    status: SequenceStatus,
}

impl Sequence {
    pub fn new(activities: Vec<Activity>) -> Self {
        let cursor = activities.len();
        Self {
            activities,
            cursor,
            countdown: 0,
            status: SequenceStatus::Inactive,
        }
    }

    #[inline]
    pub fn activities(&self) -> &[Activity] {
        &self.activities
    }

    #[inline]
    pub fn status(&self) -> SequenceStatus {
        self.status
    }

    /// Index of the next activity to release.
    #[inline]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    #[inline]
    pub fn countdown(&self) -> u32 {
        self.countdown
    }

    pub fn activate(&mut self) {
        self.cursor = 0;
        self.countdown = 0;
        self.status = SequenceStatus::Execution;
    }

    pub fn abort(&mut self) {
        self.cursor = self.activities.len();
        self.countdown = 0;
        self.status = SequenceStatus::Inactive;
    }

    /// Advance the sequence by one tick and return the released requests in list order.
    ///
    /// While a delay is pending the countdown is decremented and nothing is released. Otherwise
    /// activities are released until one of them loads a non-zero delay, `max_batch` requests
    /// were released or the list is exhausted. An exhausted sequence becomes inactive.
    pub fn step(&mut self, max_batch: usize) -> Vec<Vec<u8>> {
        let mut released = Vec::new();
        if self.status != SequenceStatus::Execution {
            return released;
        }
        if self.countdown > 0 {
            self.countdown -= 1;
            return released;
        }
        while self.countdown == 0 && released.len() < max_batch {
            let Some(activity) = self.activities.get(self.cursor) else {
                break;
            };
            released.push(activity.request.clone());
            self.countdown = activity.delay;
            self.cursor += 1;
        }
        if self.cursor >= self.activities.len() {
            self.abort();
        }
        released
    }

    /// CRC over all requests and their delays in list order. Each delay is folded in as four
    /// big endian bytes.
    pub fn checksum(&self) -> u16 {
        self.activities.iter().fold(CRC_INITIAL, |crc, activity| {
            let crc = crc16_with_initial(&activity.request, crc);
            crc16_with_initial(&activity.delay.to_be_bytes(), crc)
        })
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SequenceError {
    #[error("unknown sequence {0}")]
    UnknownSequence(SequenceId),
    #[error("sequence {0} already loaded")]
    SequenceExists(SequenceId),
    #[error("sequence {0} is executing")]
    SequenceActive(SequenceId),
    #[error("sequence store full")]
    StoreFull,
}

impl SequenceError {
    pub fn error_code(&self) -> ErrorCode {
        match self {
            SequenceError::UnknownSequence(_) => ErrorCode::UnknownSequence,
            SequenceError::SequenceExists(_) => ErrorCode::SequenceExists,
            SequenceError::SequenceActive(_) => ErrorCode::SequenceActive,
            SequenceError::StoreFull => ErrorCode::SequenceStoreFull,
        }
    }
}

/// All loaded sequences by ID.
#[derive(Debug, Clone)]
pub struct SequenceStore {
    sequences: BTreeMap<SequenceId, Sequence>,
    capacity: usize,
    max_batch: usize,
}

impl Default for SequenceStore {
    fn default() -> Self {
        Self::new(DEFAULT_SEQUENCE_CAPACITY, DEFAULT_MAX_BATCH)
    }
}

impl SequenceStore {
    pub fn new(capacity: usize, max_batch: usize) -> Self {
        Self {
            sequences: BTreeMap::new(),
            capacity,
            max_batch,
        }
    }

    #[inline]
    pub fn max_batch(&self) -> usize {
        self.max_batch
    }

    pub fn load(&mut self, id: SequenceId, sequence: Sequence) -> Result<(), SequenceError> {
        if self.sequences.contains_key(&id) {
            return Err(SequenceError::SequenceExists(id));
        }
        if self.sequences.len() >= self.capacity {
            return Err(SequenceError::StoreFull);
        }
        debug!(id, activities = sequence.activities().len(), "loading sequence");
        self.sequences.insert(id, sequence);
        Ok(())
    }

    /// Executing sequences can not be unloaded.
    pub fn unload(&mut self, id: SequenceId) -> Result<Sequence, SequenceError> {
        match self.sequences.get(&id) {
            None => Err(SequenceError::UnknownSequence(id)),
            Some(seq) if seq.status() == SequenceStatus::Execution => {
                Err(SequenceError::SequenceActive(id))
            }
            Some(_) => self
                .sequences
                .remove(&id)
                .ok_or(SequenceError::UnknownSequence(id)),
        }
    }

    pub fn activate(&mut self, id: SequenceId) -> Result<(), SequenceError> {
        let seq = self.get_mut(id)?;
        if seq.status() == SequenceStatus::Execution {
            return Err(SequenceError::SequenceActive(id));
        }
        debug!(id, "activating sequence");
        seq.activate();
        Ok(())
    }

    pub fn abort(&mut self, id: SequenceId) -> Result<(), SequenceError> {
        debug!(id, "aborting sequence");
        self.get_mut(id)?.abort();
        Ok(())
    }

    #[inline]
    pub fn get(&self, id: SequenceId) -> Option<&Sequence> {
        self.sequences.get(&id)
    }

    pub fn get_mut(&mut self, id: SequenceId) -> Result<&mut Sequence, SequenceError> {
        self.sequences
            .get_mut(&id)
            .ok_or(SequenceError::UnknownSequence(id))
    }

    pub fn iter(&self) -> impl Iterator<Item = (SequenceId, &Sequence)> {
        self.sequences.iter().map(|(id, seq)| (*id, seq))
    }

    /// Step all executing sequences by one tick, in ascending ID order.
    pub fn step_all(&mut self) -> Vec<(SequenceId, Vec<u8>)> {
        let max_batch = self.max_batch;
        let mut released = Vec::new();
        for (id, seq) in self.sequences.iter_mut() {
            for request in seq.step(max_batch) {
                released.push((*id, request));
            }
        }
        released
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crc::crc16;
    use alloc::vec;

    fn sequence(delays: &[u32]) -> Sequence {
        Sequence::new(
            delays
                .iter()
                .enumerate()
                .map(|(i, delay)| Activity::new(vec![i as u8], *delay))
                .collect(),
        )
    }

    #[test]
    fn test_release_order_with_delays() {
        let mut seq = sequence(&[0, 0, 3, 0]);
        assert_eq!(seq.status(), SequenceStatus::Inactive);
        seq.activate();
        assert_eq!(seq.step(8), vec![vec![0], vec![1], vec![2]]);
        assert_eq!(seq.countdown(), 3);
        for remaining in [2, 1, 0] {
            assert!(seq.step(8).is_empty());
            assert_eq!(seq.countdown(), remaining);
            assert_eq!(seq.status(), SequenceStatus::Execution);
        }
        assert_eq!(seq.step(8), vec![vec![3]]);
        assert_eq!(seq.status(), SequenceStatus::Inactive);
        assert!(seq.step(8).is_empty());
    }

    #[test]
    fn test_batch_limit() {
        let mut seq = sequence(&[0, 0, 0, 0, 0]);
        seq.activate();
        assert_eq!(seq.step(2), vec![vec![0], vec![1]]);
        assert_eq!(seq.step(2), vec![vec![2], vec![3]]);
        assert_eq!(seq.status(), SequenceStatus::Execution);
        assert_eq!(seq.step(2), vec![vec![4]]);
        assert_eq!(seq.status(), SequenceStatus::Inactive);
    }

    #[test]
    fn test_abort_and_reactivate() {
        let mut seq = sequence(&[1, 0]);
        seq.activate();
        assert_eq!(seq.step(8), vec![vec![0]]);
        seq.abort();
        assert_eq!(seq.status(), SequenceStatus::Inactive);
        assert_eq!(seq.countdown(), 0);
        assert!(seq.step(8).is_empty());
        seq.activate();
        assert_eq!(seq.step(8), vec![vec![0]]);
    }

    #[test]
    fn test_checksum_chains_requests_and_delays() {
        let seq = Sequence::new(vec![
            Activity::new(vec![1, 2], 5),
            Activity::new(vec![3], 0x01020304),
        ]);
        let flat = [1, 2, 0, 0, 0, 5, 3, 1, 2, 3, 4];
        assert_eq!(seq.checksum(), crc16(&flat));
        assert_eq!(Sequence::new(vec![]).checksum(), CRC_INITIAL);
    }

    #[test]
    fn test_store_lifecycle() {
        let mut store = SequenceStore::new(1, 8);
        store.load(1, sequence(&[2, 0])).unwrap();
        assert_eq!(
            store.load(1, sequence(&[0])).unwrap_err(),
            SequenceError::SequenceExists(1)
        );
        assert_eq!(
            store.load(2, sequence(&[0])).unwrap_err(),
            SequenceError::StoreFull
        );
        store.activate(1).unwrap();
        assert_eq!(
            store.activate(1).unwrap_err(),
            SequenceError::SequenceActive(1)
        );
        assert_eq!(
            store.unload(1).unwrap_err(),
            SequenceError::SequenceActive(1)
        );
        // The second activity waits for the delay loaded by the first one.
        assert_eq!(store.step_all(), vec![(1, vec![0])]);
        assert_eq!(store.get(1).unwrap().status(), SequenceStatus::Execution);
        store.abort(1).unwrap();
        assert_eq!(store.get(1).unwrap().status(), SequenceStatus::Inactive);
        assert!(store.unload(1).is_ok());
        assert_eq!(
            store.activate(1).unwrap_err(),
            SequenceError::UnknownSequence(1)
        );
    }
}
