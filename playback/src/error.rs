//! Error types for playback.

use codec::{CodecError, EntityId};
use thiserror::Error;
use wire::WireError;

/// Result type for playback operations.
pub type PlaybackResult<T> = Result<T, PlaybackError>;

/// Errors surfaced by the peer-side playback engine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlaybackError {
    /// Decoding or bookkeeping error from the codec.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Command envelope encoding error.
    #[error(transparent)]
    Wire(#[from] WireError),

    /// Clock delay bounds are inverted.
    #[error("delay_min {min} is greater than delay_max {max}")]
    InvalidDelayBounds { min: u32, max: u32 },

    /// The remote send rate must be at least one tick.
    #[error("remote send rate must be non-zero")]
    ZeroSendRate,

    /// The prediction lead would overwrite commands still needed for replay.
    #[error("prediction lead of {lead} ticks needs more than {capacity} command slots")]
    LeadExceedsCapacity { lead: u32, capacity: usize },

    /// No synchronized object with this ID exists.
    #[error("unknown entity {entity}")]
    UnknownEntity { entity: EntityId },
}
