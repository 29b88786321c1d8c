use crate::MAX_SEQ_COUNT;
use alloc::collections::BTreeMap;
use core::cell::Cell;
use paste::paste;

/// Core trait for objects which can provide a sequence count.
///
/// The core functions are not mutable on purpose to allow easier usage with
/// static structs when using the interior mutability pattern. This can be achieved by using
/// [Cell], [core::cell::RefCell] or atomic types.
pub trait SequenceCountProvider {
    type Raw: Into<u64>;
    const MAX_BIT_WIDTH: usize;

    fn get(&self) -> Self::Raw;

    fn increment(&self);

    fn get_and_increment(&self) -> Self::Raw {
        let val = self.get();
        self.increment();
        val
    }
}

#[derive(Debug, Clone)]
pub struct SeqCountProviderSimple<T: Copy> {
    seq_count: Cell<T>,
    max_val: T,
}

macro_rules! impl_for_primitives {
    ($($ty: ident,)+) => {
        $(
            paste! {
                impl SeqCountProviderSimple<$ty> {
                    pub fn [<new_custom_max_val_ $ty>](max_val: $ty) -> Self {
                        Self {
                            seq_count: Cell::new(0),
                            max_val,
                        }
                    }
                    pub fn [<new_ $ty>]() -> Self {
                        Self {
                            seq_count: Cell::new(0),
                            max_val: $ty::MAX
                        }
                    }
                }

                impl Default for SeqCountProviderSimple<$ty> {
                    fn default() -> Self {
                        Self::[<new_ $ty>]()
                    }
                }

                impl SequenceCountProvider for SeqCountProviderSimple<$ty> {
                    type Raw = $ty;
                    const MAX_BIT_WIDTH: usize = core::mem::size_of::<Self::Raw>() * 8;

                    fn get(&self) -> Self::Raw {
                        self.seq_count.get()
                    }

                    fn increment(&self) {
                        self.get_and_increment();
                    }

                    fn get_and_increment(&self) -> Self::Raw {
                        let curr_count = self.seq_count.get();

                        if curr_count == self.max_val {
                            self.seq_count.set(0);
                        } else {
                            self.seq_count.set(curr_count + 1);
                        }
                        curr_count
                    }
                }
            }
        )+
    }
}

impl_for_primitives!(u8, u16, u32,);

/// This is a sequence count provider which wraps around at [MAX_SEQ_COUNT], so 16384 increments
/// return the counter to 0.
#[derive(Debug, Clone)]
pub struct CcsdsSimpleSeqCountProvider {
    provider: SeqCountProviderSimple<u16>,
}

impl Default for CcsdsSimpleSeqCountProvider {
    fn default() -> Self {
        Self {
            provider: SeqCountProviderSimple::new_custom_max_val_u16(MAX_SEQ_COUNT),
        }
    }
}

impl SequenceCountProvider for CcsdsSimpleSeqCountProvider {
    type Raw = u16;
    const MAX_BIT_WIDTH: usize = core::mem::size_of::<Self::Raw>() * 8;
    delegate::delegate! {
        to self.provider {
            fn get(&self) -> u16;
            fn increment(&self);
            fn get_and_increment(&self) -> u16;
        }
    }
}

/// Message type counters of one service, one 16 bit counter for each message (sub)type.
///
/// The counters are created lazily on first use and wrap around at [u16::MAX].
#[derive(Debug, Default, Clone)]
pub struct MessageTypeCounters {
    counters: BTreeMap<u8, SeqCountProviderSimple<u16>>,
}

impl MessageTypeCounters {
    /// Current counter value for the given message type without incrementing it.
    pub fn get(&self, message_type: u8) -> u16 {
        self.counters
            .get(&message_type)
            .map(|counter| counter.get())
            .unwrap_or(0)
    }

    /// Returns the counter value to put into the next report and increments the counter.
    pub fn get_and_increment(&mut self, message_type: u8) -> u16 {
        self.counters
            .entry(message_type)
            .or_default()
            .get_and_increment()
    }

    pub fn reset(&mut self) {
        self.counters.clear();
    }
}

#[cfg(test)]
mod tests {
    use crate::seq_count::{
        CcsdsSimpleSeqCountProvider, MessageTypeCounters, SeqCountProviderSimple,
        SequenceCountProvider,
    };
    use crate::MAX_SEQ_COUNT;

    #[test]
    fn test_u8_counter() {
        let u8_counter = SeqCountProviderSimple::<u8>::default();
        assert_eq!(u8_counter.get(), 0);
        assert_eq!(u8_counter.get_and_increment(), 0);
        assert_eq!(u8_counter.get_and_increment(), 1);
        assert_eq!(u8_counter.get(), 2);
    }

    #[test]
    fn test_u8_counter_overflow() {
        let u8_counter = SeqCountProviderSimple::new_u8();
        for _ in 0..256 {
            u8_counter.increment();
        }
        assert_eq!(u8_counter.get(), 0);
    }

    #[test]
    fn test_ccsds_counter() {
        let ccsds_counter = CcsdsSimpleSeqCountProvider::default();
        assert_eq!(ccsds_counter.get(), 0);
        assert_eq!(ccsds_counter.get_and_increment(), 0);
        assert_eq!(ccsds_counter.get_and_increment(), 1);
        assert_eq!(ccsds_counter.get(), 2);
    }

    #[test]
    fn test_ccsds_counter_overflow() {
        let ccsds_counter = CcsdsSimpleSeqCountProvider::default();
        for _ in 0..MAX_SEQ_COUNT + 1 {
            ccsds_counter.increment();
        }
        assert_eq!(ccsds_counter.get(), 0);
    }

    #[test]
    fn test_message_type_counters() {
        let mut counters = MessageTypeCounters::default();
        assert_eq!(counters.get(2), 0);
        assert_eq!(counters.get_and_increment(2), 0);
        assert_eq!(counters.get_and_increment(2), 1);
        assert_eq!(counters.get_and_increment(7), 0);
        assert_eq!(counters.get(2), 2);
        counters.reset();
        assert_eq!(counters.get(2), 0);
    }
}
