//! Time ordered telemetry storage.
//!
//! A [PacketStore] keeps telemetry packets of one virtual channel in insertion order, which is
//! also chronological order. The total size of all stored packets is bounded. A circular store
//! evicts the oldest packets to make room, a bounded store rejects new packets once it is full.
//!
//! Stored packets can be retrieved by time range, or incrementally with the open retrieval
//! which remembers how far it got.
use super::ErrorCode;
use crate::time::cuc::CucTime;
use alloc::collections::{BTreeMap, VecDeque};
use alloc::vec::Vec;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

pub type PacketStoreId = u16;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OverflowPolicy {
    /// Evict the oldest packets.
    Circular,
    /// Reject new packets.
    Bounded,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OpenRetrievalStatus {
    Suspended,
    InProgress,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredPacket {
    pub timestamp: CucTime,
    pub virtual_channel: u8,
    pub data: Vec<u8>,
    seq: u64,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum PacketStoreError {
    #[error("packet store full")]
    StoreFull,
    #[error("packet of {len} bytes exceeds the store capacity of {capacity} bytes")]
    PacketTooLarge { len: usize, capacity: usize },
    #[error("packet for virtual channel {found} offered to store of virtual channel {expected}")]
    WrongVirtualChannel { found: u8, expected: u8 },
    #[error("unknown packet store {0}")]
    UnknownStore(PacketStoreId),
    #[error("packet store {0} already exists")]
    StoreExists(PacketStoreId),
}

impl PacketStoreError {
    pub fn error_code(&self) -> ErrorCode {
        match self {
            PacketStoreError::UnknownStore(_) => ErrorCode::UnknownPacketStore,
            PacketStoreError::StoreExists(_) => ErrorCode::InvalidParameters,
            _ => ErrorCode::TableFull,
        }
    }
}

/// Summary of a store as reported by the storage and retrieval service.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PacketStoreSummary {
    pub oldest: Option<CucTime>,
    pub newest: Option<CucTime>,
    pub open_retrieval_tag: CucTime,
    /// Fill level in percent.
    pub fill_percentage: u8,
    pub num_packets: usize,
}

#[derive(Debug, Clone)]
pub struct PacketStore {
    virtual_channel: u8,
    policy: OverflowPolicy,
    capacity_bytes: usize,
    storage_enabled: bool,
    packets: VecDeque<StoredPacket>,
    size_bytes: usize,
    next_seq: u64,
    open_retrieval_tag: CucTime,
    open_retrieval_seq: u64,
    open_retrieval_status: OpenRetrievalStatus,
}

impl PacketStore {
    /// Storage is enabled and open retrieval suspended after creation.
    pub fn new(virtual_channel: u8, policy: OverflowPolicy, capacity_bytes: usize) -> Self {
        Self {
            virtual_channel,
            policy,
            capacity_bytes,
            storage_enabled: true,
            packets: VecDeque::new(),
            size_bytes: 0,
            next_seq: 0,
            open_retrieval_tag: CucTime(0),
            open_retrieval_seq: 0,
            open_retrieval_status: OpenRetrievalStatus::Suspended,
        }
    }

    #[inline]
    pub fn virtual_channel(&self) -> u8 {
        self.virtual_channel
    }

    #[inline]
    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    #[inline]
    pub fn capacity_bytes(&self) -> usize {
        self.capacity_bytes
    }

    #[inline]
    pub fn storage_enabled(&self) -> bool {
        self.storage_enabled
    }

    pub fn set_storage_enabled(&mut self, enabled: bool) {
        self.storage_enabled = enabled;
    }

    /// Sum of the sizes of all stored packets.
    #[inline]
    pub fn size_in_bytes(&self) -> usize {
        self.size_bytes
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.packets.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    pub fn packets(&self) -> impl Iterator<Item = &StoredPacket> {
        self.packets.iter()
    }

    /// Store a packet with the passed timestamp. This is a no-op while storage is disabled.
    /// A rejected packet leaves the store unchanged.
    pub fn insert(
        &mut self,
        virtual_channel: u8,
        now: CucTime,
        packet: &[u8],
    ) -> Result<(), PacketStoreError> {
        if !self.storage_enabled {
            return Ok(());
        }
        if virtual_channel != self.virtual_channel {
            return Err(PacketStoreError::WrongVirtualChannel {
                found: virtual_channel,
                expected: self.virtual_channel,
            });
        }
        if packet.len() > self.capacity_bytes {
            return Err(PacketStoreError::PacketTooLarge {
                len: packet.len(),
                capacity: self.capacity_bytes,
            });
        }
        if self.size_bytes + packet.len() > self.capacity_bytes {
            match self.policy {
                OverflowPolicy::Bounded => {
                    warn!(vc = self.virtual_channel, "bounded packet store full");
                    return Err(PacketStoreError::StoreFull);
                }
                OverflowPolicy::Circular => {
                    while self.size_bytes + packet.len() > self.capacity_bytes {
                        match self.packets.pop_front() {
                            Some(evicted) => {
                                debug!(
                                    vc = self.virtual_channel,
                                    timestamp = evicted.timestamp.ticks(),
                                    "evicting oldest packet"
                                );
                                self.size_bytes -= evicted.data.len();
                            }
                            None => break,
                        }
                    }
                }
            }
        }
        trace!(vc = virtual_channel, len = packet.len(), "storing packet");
        self.packets.push_back(StoredPacket {
            timestamp: now,
            virtual_channel,
            data: packet.to_vec(),
            seq: self.next_seq,
        });
        self.next_seq += 1;
        self.size_bytes += packet.len();
        Ok(())
    }

    #[inline]
    pub fn open_retrieval_status(&self) -> OpenRetrievalStatus {
        self.open_retrieval_status
    }

    pub fn set_open_retrieval_status(&mut self, status: OpenRetrievalStatus) {
        self.open_retrieval_status = status;
    }

    #[inline]
    pub fn open_retrieval_tag(&self) -> CucTime {
        self.open_retrieval_tag
    }

    /// Move the open retrieval start to the passed time tag.
    pub fn set_open_retrieval_tag(&mut self, tag: CucTime) {
        self.open_retrieval_tag = tag;
        self.open_retrieval_seq = 0;
    }

    /// All packets with a timestamp at or after the open retrieval tag which were not
    /// retrieved yet, oldest first. Passing a tag restarts the retrieval at that tag. The
    /// retrieval position advances past the returned packets, so repeated calls only return
    /// newly stored packets.
    pub fn retrieve_open(&mut self, from_tag: Option<CucTime>) -> Vec<StoredPacket> {
        if let Some(tag) = from_tag {
            self.set_open_retrieval_tag(tag);
        }
        let retrieved: Vec<StoredPacket> = self
            .packets
            .iter()
            .filter(|p| p.timestamp >= self.open_retrieval_tag && p.seq >= self.open_retrieval_seq)
            .cloned()
            .collect();
        if let Some(last) = retrieved.last() {
            self.open_retrieval_tag = last.timestamp;
            self.open_retrieval_seq = last.seq + 1;
        }
        retrieved
    }

    /// All packets with `start <= timestamp <= end`, oldest first. Does not affect the open
    /// retrieval.
    pub fn retrieve_range(&self, start: CucTime, end: CucTime) -> Vec<StoredPacket> {
        self.packets
            .iter()
            .filter(|p| p.timestamp >= start && p.timestamp <= end)
            .cloned()
            .collect()
    }

    /// Delete all packets with a timestamp at or before the passed tag and return how many
    /// were deleted.
    pub fn delete_up_to(&mut self, tag: CucTime) -> usize {
        let mut deleted = 0;
        while let Some(front) = self.packets.front() {
            if front.timestamp > tag {
                break;
            }
            self.size_bytes -= front.data.len();
            self.packets.pop_front();
            deleted += 1;
        }
        deleted
    }

    pub fn summary(&self) -> PacketStoreSummary {
        let fill_percentage = if self.capacity_bytes == 0 {
            100
        } else {
            (self.size_bytes * 100 / self.capacity_bytes) as u8
        };
        PacketStoreSummary {
            oldest: self.packets.front().map(|p| p.timestamp),
            newest: self.packets.back().map(|p| p.timestamp),
            open_retrieval_tag: self.open_retrieval_tag,
            fill_percentage,
            num_packets: self.packets.len(),
        }
    }
}

/// All packet stores by ID.
#[derive(Debug, Clone, Default)]
pub struct PacketStoreRegistry {
    stores: BTreeMap<PacketStoreId, PacketStore>,
}

impl PacketStoreRegistry {
    pub fn add(&mut self, id: PacketStoreId, store: PacketStore) -> Result<(), PacketStoreError> {
        if self.stores.contains_key(&id) {
            return Err(PacketStoreError::StoreExists(id));
        }
        self.stores.insert(id, store);
        Ok(())
    }

    #[inline]
    pub fn get(&self, id: PacketStoreId) -> Option<&PacketStore> {
        self.stores.get(&id)
    }

    pub fn get_mut(&mut self, id: PacketStoreId) -> Result<&mut PacketStore, PacketStoreError> {
        self.stores
            .get_mut(&id)
            .ok_or(PacketStoreError::UnknownStore(id))
    }

    pub fn ids(&self) -> impl Iterator<Item = PacketStoreId> + '_ {
        self.stores.keys().copied()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (PacketStoreId, &mut PacketStore)> {
        self.stores.iter_mut().map(|(id, store)| (*id, store))
    }

    /// Insert the packet into every store of the virtual channel. Returns the IDs of the stores
    /// which rejected the packet.
    pub fn store(&mut self, virtual_channel: u8, now: CucTime, packet: &[u8]) -> Vec<PacketStoreId> {
        let mut rejected = Vec::new();
        for (id, store) in self.stores.iter_mut() {
            if store.virtual_channel() == virtual_channel
                && store.insert(virtual_channel, now, packet).is_err()
            {
                rejected.push(*id);
            }
        }
        rejected
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.stores.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }
}
