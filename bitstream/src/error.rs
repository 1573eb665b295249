//! Error types for bitstream operations.

use thiserror::Error;

/// Result type for bitstream operations.
pub type BitResult<T> = Result<T, BitError>;

/// Errors that can occur during bit-level encoding/decoding.
///
/// Every variant indicates a schema mismatch between writer and reader or a
/// programming error; none of them is retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BitError {
    /// Attempted to read past the end of the written data.
    #[error("buffer underrun: attempted to read {requested} bits but only {available} bits available")]
    Underrun {
        /// Number of bits requested.
        requested: usize,
        /// Number of bits available.
        available: usize,
    },

    /// Invalid bit count for the operation.
    #[error("invalid bit count {bits}, maximum allowed is {max_bits}")]
    InvalidBitCount {
        /// The invalid bit count provided.
        bits: u8,
        /// Maximum allowed bits for this operation.
        max_bits: u8,
    },

    /// Value exceeds the range representable by the specified number of bits.
    #[error("value {value} cannot be represented in {bits} bits")]
    ValueOutOfRange {
        /// The value that was out of range.
        value: u32,
        /// Number of bits available.
        bits: u8,
    },

    /// A varint ran longer than five bytes or overflowed 32 bits.
    #[error("varint does not fit in 32 bits")]
    InvalidVarint,

    /// A compressor was configured with an unusable range.
    #[error("invalid compressor range: {reason}")]
    InvalidRange {
        /// What was wrong with the range.
        reason: &'static str,
    },

    /// A bookmark points outside of the written region.
    #[error("bookmark at bit {position} ({bits} bits) lies outside the {written} bits written")]
    InvalidBookmark {
        /// Bit position of the bookmark.
        position: usize,
        /// Width of the reserved region.
        bits: u8,
        /// Bits written so far.
        written: usize,
    },

    /// A size budget cannot even hold the count prefix.
    #[error("budget of {budget} bits is smaller than the {needed}-bit count prefix")]
    BudgetTooSmall {
        /// Total bits allowed.
        budget: usize,
        /// Bits the prefix needs.
        needed: u8,
    },
}
