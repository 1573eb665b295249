//! Configurable limits for bounded encoding and decoding.

/// Size caps for snapshot packets.
///
/// The encoder packs frames until `max_packet_bits` is reached and never
/// emits a record larger than `max_record_bits`; the decoder rejects input
/// that violates either cap before allocating for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PacketLimits {
    /// Maximum packet size in bits.
    pub max_packet_bits: usize,

    /// Maximum size of one record payload in bits.
    pub max_record_bits: usize,
}

impl Default for PacketLimits {
    fn default() -> Self {
        Self {
            // a 1200 byte datagram stays under common MTUs
            max_packet_bits: 1200 * 8,
            max_record_bits: 256 * 8,
        }
    }
}

impl PacketLimits {
    #[must_use]
    pub const fn new(max_packet_bits: usize, max_record_bits: usize) -> Self {
        Self {
            max_packet_bits,
            max_record_bits,
        }
    }

    /// Creates limits suitable for testing with smaller values.
    #[must_use]
    pub const fn for_testing() -> Self {
        Self {
            max_packet_bits: 512 * 8,
            max_record_bits: 64 * 8,
        }
    }

    /// Creates limits with no restrictions (use with caution).
    #[must_use]
    pub const fn unlimited() -> Self {
        Self {
            max_packet_bits: usize::MAX,
            max_record_bits: usize::MAX,
        }
    }
}
