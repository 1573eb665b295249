//! Error types for wire format operations.

use bitstream::BitError;
use thiserror::Error;

/// Result type for wire format operations.
pub type WireResult<T> = Result<T, WireError>;

/// Structural errors in packet framing.
///
/// Any of these means the rest of the packet cannot be trusted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum WireError {
    /// Bit-level failure (underrun, bad varint, out-of-range value).
    #[error(transparent)]
    Bit(#[from] BitError),

    /// A limit from [`PacketLimits`](crate::PacketLimits) was exceeded.
    #[error("{kind:?} limit exceeded: {actual} > {limit}")]
    LimitsExceeded {
        kind: LimitKind,
        limit: usize,
        actual: usize,
    },

    /// The packet carried bits after its last frame.
    #[error("{remaining} unread bits after the last frame")]
    TrailingBits { remaining: usize },
}

/// Specific wire limits that can be exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitKind {
    PacketBits,
    RecordBits,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bit_errors_convert() {
        let err: WireError = BitError::InvalidVarint.into();
        assert_eq!(err, WireError::Bit(BitError::InvalidVarint));
        assert_eq!(err.to_string(), BitError::InvalidVarint.to_string());
    }

    #[test]
    fn limit_display() {
        let err = WireError::LimitsExceeded {
            kind: LimitKind::RecordBits,
            limit: 64,
            actual: 100,
        };
        let msg = err.to_string();
        assert!(msg.contains("RecordBits"));
        assert!(msg.contains("100"));
        assert!(msg.contains("64"));
    }
}
