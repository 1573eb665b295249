//! Error types for codec operations.

use bitstream::BitError;
use schema::{FieldKind, SchemaError};
use thiserror::Error;
use wire::WireError;

use crate::types::{EntityId, Tick};

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur during state encoding, decoding and bookkeeping.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CodecError {
    /// Wire framing error.
    #[error(transparent)]
    Wire(#[from] WireError),

    /// Schema construction error.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// A record names a type tag the registry does not have.
    #[error("unknown type tag {tag}")]
    UnknownType { tag: u16 },

    /// A record or lookup names a field the schema does not have.
    #[error("state type {state:?} has no field {field:?}")]
    UnknownField {
        state: &'static str,
        field: String,
    },

    /// A value does not match its field's codec.
    #[error("field {field:?} expects {expected:?}, got {actual:?}")]
    InvalidValue {
        field: &'static str,
        expected: FieldKind,
        actual: FieldKind,
    },

    /// A delta was decoded against the basis of a different entity.
    #[error("record for entity {found} decoded against basis of {expected}")]
    EntityMismatch { expected: EntityId, found: EntityId },

    /// A record left unread bits behind, so writer and reader disagree on the schema.
    #[error("record for entity {entity} has {remaining} unread bits")]
    TrailingRecordBits { entity: EntityId, remaining: usize },

    /// The basis a delta was encoded against is not held locally.
    ///
    /// Recoverable: the delta is dropped and a later one will carry a usable basis.
    #[error("no basis at tick {basis_tick} for entity {entity}")]
    MissingBasis { entity: EntityId, basis_tick: Tick },

    /// No entity with this ID exists.
    #[error("unknown entity {entity}")]
    UnknownEntity { entity: EntityId },

    /// The host has no history record for the requested tick.
    #[error("no record at tick {tick} for entity {entity}")]
    NoRecord { entity: EntityId, tick: Tick },

    /// A tick that must be valid was not.
    #[error("invalid tick")]
    InvalidTick,

    /// Too many reliable events are unacknowledged for sequence ordering to hold.
    #[error("{pending} events pending, maximum is {max}")]
    EventWindowFull { pending: usize, max: usize },
}

impl From<BitError> for CodecError {
    fn from(err: BitError) -> Self {
        Self::Wire(WireError::Bit(err))
    }
}

impl CodecError {
    /// Returns `true` for errors confined to a single object.
    ///
    /// Packet ingestion records these and moves on to the next object; every
    /// other error aborts the packet.
    #[must_use]
    pub const fn is_per_object(&self) -> bool {
        matches!(self, Self::MissingBasis { .. })
    }
}
