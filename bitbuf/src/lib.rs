//! Low-level bit packing primitives for the varstream codec.
//!
//! This crate provides [`BitWriter`] and [`BitReader`] for bit-level encoding
//! and decoding, plus the width-growing [`IdWriter`]/[`IdReader`] pair used by
//! the codec's interning streams.
//!
//! Bits fill each byte starting at the least significant position, so the
//! first bit written lands in bit 0 of the first byte and a byte-aligned
//! 32-bit write appears on the wire as the value's little-endian bytes.
//!
//! # Design Principles
//!
//! - **No unsafe code** - Safety is paramount.
//! - **Bounded operations** - All reads are bounds-checked.
//! - **No domain knowledge** - This crate knows nothing about values, types,
//!   or schemas.
//! - **Explicit errors** - All failures return structured errors, never panic.
//!
//! # Example
//!
//! ```
//! use bitbuf::{BitReader, BitWriter};
//!
//! let mut writer = BitWriter::new();
//! writer.write_bit(true);
//! writer.write_bits(42, 7).unwrap();
//!
//! let bytes = writer.finish();
//!
//! let mut reader = BitReader::new(&bytes);
//! assert!(reader.read_bit().unwrap());
//! assert_eq!(reader.read_bits(7).unwrap(), 42);
//! ```

mod error;
mod ids;
mod reader;
mod writer;

pub use error::{BitError, BitResult};
pub use ids::{bits_for_highest, IdReader, IdWriter};
pub use reader::BitReader;
pub use writer::BitWriter;
