//! Schema validation errors.

use thiserror::Error;

use crate::FieldKind;

/// Result type for schema operations.
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Errors that can occur when building or validating a schema or registry.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchemaError {
    /// Two fields of one state type share a name.
    #[error("duplicate field name {field:?} in state type {state:?}")]
    DuplicateFieldName {
        state: &'static str,
        field: &'static str,
    },

    /// Two registered state types share a name.
    #[error("duplicate state type name {name:?}")]
    DuplicateTypeName { name: &'static str },

    /// The dirty mask has one bit per mutable field and is at most 32 bits.
    #[error("state type {state:?} has {count} mutable fields, maximum is {max}")]
    TooManyMutableFields {
        state: &'static str,
        count: usize,
        max: usize,
    },

    /// Invalid bit width for fixed-width integers.
    #[error("invalid bit width {bits} for field {field:?}")]
    InvalidBitWidth { field: &'static str, bits: u8 },

    /// A field's default does not match the codec's value kind.
    #[error("default for field {field:?} is {actual:?}, codec expects {expected:?}")]
    DefaultKindMismatch {
        field: &'static str,
        expected: FieldKind,
        actual: FieldKind,
    },

    /// Epsilon must be finite and non-negative.
    #[error("invalid epsilon {epsilon} for field {field:?}")]
    InvalidEpsilon { field: &'static str, epsilon: f32 },

    /// A registry must contain at least one state type.
    #[error("registry has no state types")]
    EmptyRegistry,

    /// Type tags are 16 bits.
    #[error("registry has {count} state types, maximum is {max}")]
    TooManyTypes { count: usize, max: usize },
}
