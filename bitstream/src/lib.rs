//! Low-level bit packing primitives for the tickline replication engine.
//!
//! This crate provides [`BitBuffer`], a growable bit-addressable FIFO, plus the
//! encoders layered on top of it: varints, zigzag signed integers, range
//! compressors, reserve-and-backfill bookmarks and size-bounded batch packing.
//!
//! # Design Principles
//!
//! - **No unsafe code** - Safety is paramount.
//! - **Bounded operations** - All reads are bounds-checked; reading past the written data is an error.
//! - **No domain knowledge** - This crate knows nothing about entities, ticks, or game state.
//! - **Explicit errors** - All failures return structured errors, never panic.
//!
//! # Example
//!
//! ```
//! use bitstream::{BitBuffer, FloatCompressor};
//!
//! let coord = FloatCompressor::new(-512.0, 512.0, 0.01).unwrap();
//!
//! let mut buffer = BitBuffer::new();
//! buffer.write_bool(true);
//! buffer.write(7, 42).unwrap();
//! buffer.write_var_int(-300);
//! coord.write(&mut buffer, 12.5).unwrap();
//!
//! assert_eq!(buffer.read_bool().unwrap(), true);
//! assert_eq!(buffer.read(7).unwrap(), 42);
//! assert_eq!(buffer.read_var_int().unwrap(), -300);
//! assert!((coord.read(&mut buffer).unwrap() - 12.5).abs() <= 0.01);
//! assert!(buffer.read_bool().is_err());
//! ```

mod buffer;
mod compressor;
mod error;
mod pack;

pub use buffer::{zigzag_decode, zigzag_encode, BitBuffer, Bookmark};
pub use compressor::{required_bits, FloatCompressor, IntCompressor, VARINT_FALLBACK_BITS};
pub use error::{BitError, BitResult};
pub use pack::{
    pack_counted, pack_to_size, unpack_counted, PackLimits, PackOutcome, Packable, COUNT_BITS,
    MAX_COUNT,
};
