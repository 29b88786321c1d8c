//! Parameter pool.
//!
//! The pool maps 16 bit parameter IDs to typed value cells. Writes through [ParameterPool::set]
//! are type checked, and every change of a value is published into a bounded change queue
//! which interested parties drain with [ParameterPool::drain_changes].
use super::ErrorCode;
use crate::message::Message;
use crate::ByteConversionError;
use alloc::collections::{BTreeMap, VecDeque};
use alloc::vec::Vec;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use num_traits::AsPrimitive;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub type ParameterId = u16;

pub const DEFAULT_POOL_CAPACITY: usize = 256;
pub const CHANGE_QUEUE_CAPACITY: usize = 64;

#[derive(Debug, Copy, Clone, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ParameterType {
    U8 = 0,
    U16 = 1,
    U32 = 2,
    U64 = 3,
    I8 = 4,
    I16 = 5,
    I32 = 6,
    I64 = 7,
    Bool = 8,
    F32 = 9,
    F64 = 10,
}

impl ParameterType {
    /// Width of the serialized value.
    pub const fn size(&self) -> usize {
        match self {
            ParameterType::U8 | ParameterType::I8 | ParameterType::Bool => 1,
            ParameterType::U16 | ParameterType::I16 => 2,
            ParameterType::U32 | ParameterType::I32 | ParameterType::F32 => 4,
            ParameterType::U64 | ParameterType::I64 | ParameterType::F64 => 8,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ParameterValue {
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    Bool(bool),
    F32(f32),
    F64(f64),
}

impl ParameterValue {
    /// Zero value of the given type.
    pub fn default_for(ptype: ParameterType) -> Self {
        match ptype {
            ParameterType::U8 => ParameterValue::U8(0),
            ParameterType::U16 => ParameterValue::U16(0),
            ParameterType::U32 => ParameterValue::U32(0),
            ParameterType::U64 => ParameterValue::U64(0),
            ParameterType::I8 => ParameterValue::I8(0),
            ParameterType::I16 => ParameterValue::I16(0),
            ParameterType::I32 => ParameterValue::I32(0),
            ParameterType::I64 => ParameterValue::I64(0),
            ParameterType::Bool => ParameterValue::Bool(false),
            ParameterType::F32 => ParameterValue::F32(0.0),
            ParameterType::F64 => ParameterValue::F64(0.0),
        }
    }

    pub fn ptype(&self) -> ParameterType {
        match self {
            ParameterValue::U8(_) => ParameterType::U8,
            ParameterValue::U16(_) => ParameterType::U16,
            ParameterValue::U32(_) => ParameterType::U32,
            ParameterValue::U64(_) => ParameterType::U64,
            ParameterValue::I8(_) => ParameterType::I8,
            ParameterValue::I16(_) => ParameterType::I16,
            ParameterValue::I32(_) => ParameterType::I32,
            ParameterValue::I64(_) => ParameterType::I64,
            ParameterValue::Bool(_) => ParameterType::Bool,
            ParameterValue::F32(_) => ParameterType::F32,
            ParameterValue::F64(_) => ParameterType::F64,
        }
    }

    /// Numeric value used by statistics and limit checks. Booleans map to 0 and 1.
    pub fn as_f64(&self) -> f64 {
        match *self {
            ParameterValue::U8(v) => v.as_(),
            ParameterValue::U16(v) => v.as_(),
            ParameterValue::U32(v) => v.as_(),
            ParameterValue::U64(v) => v.as_(),
            ParameterValue::I8(v) => v.as_(),
            ParameterValue::I16(v) => v.as_(),
            ParameterValue::I32(v) => v.as_(),
            ParameterValue::I64(v) => v.as_(),
            ParameterValue::Bool(v) => v as u8 as f64,
            ParameterValue::F32(v) => v.as_(),
            ParameterValue::F64(v) => v,
        }
    }

    /// Raw bit pattern used by expected value checks. Signed values are sign extended, floating
    /// point values are represented by their IEEE 754 bits.
    pub fn as_u64_bits(&self) -> u64 {
        match *self {
            ParameterValue::U8(v) => v as u64,
            ParameterValue::U16(v) => v as u64,
            ParameterValue::U32(v) => v as u64,
            ParameterValue::U64(v) => v,
            ParameterValue::I8(v) => v as i64 as u64,
            ParameterValue::I16(v) => v as i64 as u64,
            ParameterValue::I32(v) => v as i64 as u64,
            ParameterValue::I64(v) => v as u64,
            ParameterValue::Bool(v) => v as u64,
            ParameterValue::F32(v) => v.to_bits() as u64,
            ParameterValue::F64(v) => v.to_bits(),
        }
    }

    /// Write the big endian value at the cursor.
    pub fn append_to(&self, msg: &mut Message) -> Result<(), ByteConversionError> {
        match *self {
            ParameterValue::U8(v) => msg.append_u8(v),
            ParameterValue::U16(v) => msg.append_u16(v),
            ParameterValue::U32(v) => msg.append_u32(v),
            ParameterValue::U64(v) => msg.append_u64(v),
            ParameterValue::I8(v) => msg.append_i8(v),
            ParameterValue::I16(v) => msg.append_i16(v),
            ParameterValue::I32(v) => msg.append_i32(v),
            ParameterValue::I64(v) => msg.append_i64(v),
            ParameterValue::Bool(v) => msg.append_bool(v),
            ParameterValue::F32(v) => msg.append_f32(v),
            ParameterValue::F64(v) => msg.append_f64(v),
        }
    }

    /// Read a value of the given type at the cursor.
    pub fn read_from(ptype: ParameterType, msg: &mut Message) -> Result<Self, ByteConversionError> {
        Ok(match ptype {
            ParameterType::U8 => ParameterValue::U8(msg.read_u8()?),
            ParameterType::U16 => ParameterValue::U16(msg.read_u16()?),
            ParameterType::U32 => ParameterValue::U32(msg.read_u32()?),
            ParameterType::U64 => ParameterValue::U64(msg.read_u64()?),
            ParameterType::I8 => ParameterValue::I8(msg.read_i8()?),
            ParameterType::I16 => ParameterValue::I16(msg.read_i16()?),
            ParameterType::I32 => ParameterValue::I32(msg.read_i32()?),
            ParameterType::I64 => ParameterValue::I64(msg.read_i64()?),
            ParameterType::Bool => ParameterValue::Bool(msg.read_bool()?),
            ParameterType::F32 => ParameterValue::F32(msg.read_f32()?),
            ParameterType::F64 => ParameterValue::F64(msg.read_f64()?),
        })
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ParameterError {
    #[error("unknown parameter {0}")]
    UnknownParameter(ParameterId),
    #[error("parameter {id} has type {expected:?}, got {found:?}")]
    TypeMismatch {
        id: ParameterId,
        expected: ParameterType,
        found: ParameterType,
    },
    #[error("parameter {0} already exists")]
    AlreadyExists(ParameterId),
    #[error("parameter pool full")]
    PoolFull,
}

impl ParameterError {
    pub fn error_code(&self) -> ErrorCode {
        match self {
            ParameterError::UnknownParameter(_) => ErrorCode::UnknownParameter,
            ParameterError::TypeMismatch { .. } => ErrorCode::ParameterTypeMismatch,
            ParameterError::AlreadyExists(_) => ErrorCode::InvalidParameters,
            ParameterError::PoolFull => ErrorCode::TableFull,
        }
    }
}

/// Published for every write which changed the value of a parameter.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ParameterChange {
    pub id: ParameterId,
    pub old: ParameterValue,
    pub new: ParameterValue,
}

#[derive(Debug, Clone)]
pub struct ParameterPool {
    params: BTreeMap<ParameterId, ParameterValue>,
    capacity: usize,
    changes: VecDeque<ParameterChange>,
}

impl Default for ParameterPool {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_CAPACITY)
    }
}

impl ParameterPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            params: BTreeMap::new(),
            capacity,
            changes: VecDeque::new(),
        }
    }

    /// Register a new parameter with its initial value.
    pub fn add(&mut self, id: ParameterId, value: ParameterValue) -> Result<(), ParameterError> {
        if self.params.contains_key(&id) {
            return Err(ParameterError::AlreadyExists(id));
        }
        if self.params.len() >= self.capacity {
            return Err(ParameterError::PoolFull);
        }
        debug!(id, ptype = ?value.ptype(), "adding parameter");
        self.params.insert(id, value);
        Ok(())
    }

    #[inline]
    pub fn get(&self, id: ParameterId) -> Option<ParameterValue> {
        self.params.get(&id).copied()
    }

    #[inline]
    pub fn exists(&self, id: ParameterId) -> bool {
        self.params.contains_key(&id)
    }

    /// Overwrite the value of an existing parameter. The type of the new value has to match the
    /// registered type.
    pub fn set(&mut self, id: ParameterId, value: ParameterValue) -> Result<(), ParameterError> {
        let cell = self
            .params
            .get_mut(&id)
            .ok_or(ParameterError::UnknownParameter(id))?;
        if cell.ptype() != value.ptype() {
            return Err(ParameterError::TypeMismatch {
                id,
                expected: cell.ptype(),
                found: value.ptype(),
            });
        }
        let old = *cell;
        *cell = value;
        if old != value {
            if self.changes.len() == CHANGE_QUEUE_CAPACITY {
                warn!(id, "parameter change queue overflow, dropping oldest change");
                self.changes.pop_front();
            }
            self.changes.push_back(ParameterChange { id, old, new: value });
        }
        Ok(())
    }

    /// Take all changes published since the last call, oldest first.
    pub fn drain_changes(&mut self) -> Vec<ParameterChange> {
        self.changes.drain(..).collect()
    }

    pub fn ids(&self) -> impl Iterator<Item = ParameterId> + '_ {
        self.params.keys().copied()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.params.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}
