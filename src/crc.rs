//! CRC-16 CCITT engine used by the PUS standard.
//!
//! The algorithm is the one commonly called CRC-16/CCITT-FALSE (catalogued as CRC-16/IBM-3740):
//! polynomial 0x1021, MSB first, initial register 0xFFFF, no final XOR. Appending the big endian
//! checksum to a buffer and running the algorithm over the extended buffer yields 0.
//!
//! Since the register is not post-processed, a checksum can be resumed from any intermediate
//! register value. This allows checksumming logically chained buffers without concatenating them.
//!
//! # Example
//!
//! ```rust
//! use pus_core::crc::{crc16, crc16_with_initial, validate, CRC_INITIAL};
//!
//! let data = [0x17, 0x01, 0x02, 0x03];
//! let crc = crc16(&data);
//! let mut with_crc = data.to_vec();
//! with_crc.extend_from_slice(&crc.to_be_bytes());
//! assert!(validate(&with_crc));
//!
//! // Checksum the same data in two segments.
//! let partial = crc16_with_initial(&data[0..2], CRC_INITIAL);
//! assert_eq!(crc16_with_initial(&data[2..], partial), crc);
//! ```

/// Initial value of the CRC register.
pub const CRC_INITIAL: u16 = 0xFFFF;
/// Generator polynomial.
pub const CRC_POLYNOMIAL: u16 = 0x1021;

/// CRC algorithm used by the PUS standard, using [crc::Table<1>] as the CRC implementation.
pub const CRC_CCITT_FALSE: crc::Crc<u16> = crc::Crc::<u16>::new(&crc::CRC_16_IBM_3740);

pub type CrcType = u16;
pub const CRC_LEN: usize = core::mem::size_of::<CrcType>();

/// Calculate the CRC16 over the passed bytes, starting with the default register value.
#[inline]
pub fn crc16(bytes: &[u8]) -> u16 {
    crc16_with_initial(bytes, CRC_INITIAL)
}

/// Calculate the CRC16 over the passed bytes, resuming from the passed register value.
pub fn crc16_with_initial(bytes: &[u8], initial_register: u16) -> u16 {
    let mut digest = CRC_CCITT_FALSE.digest_with_initial(initial_register);
    digest.update(bytes);
    digest.finalize()
}

/// Bitwise implementation of the same algorithm. Slower than the table driven [crc16], but it
/// documents the shift register and does not need any lookup table.
pub fn crc16_bitwise(bytes: &[u8], initial_register: u16) -> u16 {
    let mut register = initial_register;
    for byte in bytes {
        register ^= (*byte as u16) << 8;
        for _ in 0..8 {
            if register & 0x8000 != 0 {
                register = (register << 1) ^ CRC_POLYNOMIAL;
            } else {
                register <<= 1;
            }
        }
    }
    register
}

/// Runs the algorithm over a buffer which has its checksum appended and returns the resulting
/// register. A correct buffer always yields 0.
#[inline]
pub fn residue(bytes_with_crc: &[u8]) -> u16 {
    crc16(bytes_with_crc)
}

/// Returns true if the passed buffer, which has its checksum appended, is correct.
#[inline]
pub fn validate(bytes_with_crc: &[u8]) -> bool {
    residue(bytes_with_crc) == 0
}
