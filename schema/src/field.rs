//! Field values, codecs and per-field policies.

use bitstream::{FloatCompressor, IntCompressor};

/// A single replicated field value.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FieldValue {
    Bool(bool),
    UInt(u32),
    Int(i32),
    Float(f32),
}

impl FieldValue {
    /// Returns the kind of this value.
    #[must_use]
    pub const fn kind(&self) -> FieldKind {
        match self {
            Self::Bool(_) => FieldKind::Bool,
            Self::UInt(_) => FieldKind::UInt,
            Self::Int(_) => FieldKind::Int,
            Self::Float(_) => FieldKind::Float,
        }
    }

    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_uint(&self) -> Option<u32> {
        match self {
            Self::UInt(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_int(&self) -> Option<i32> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_float(&self) -> Option<f32> {
        match self {
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }
}

/// The value shape a codec produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FieldKind {
    Bool,
    UInt,
    Int,
    Float,
}

/// The encoding for a field (representation only).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldCodec {
    /// Boolean (1 bit).
    Bool,

    /// Unsigned integer with fixed bit width (1..=32).
    UInt { bits: u8 },

    /// Variable-length unsigned integer.
    VarUInt,

    /// Variable-length signed integer (zigzag encoded).
    VarInt,

    /// Range-compressed signed integer.
    Int(IntCompressor),

    /// Range-compressed float.
    Float(FloatCompressor),
}

impl FieldCodec {
    #[must_use]
    pub const fn bool() -> Self {
        Self::Bool
    }

    #[must_use]
    pub const fn uint(bits: u8) -> Self {
        Self::UInt { bits }
    }

    #[must_use]
    pub const fn var_uint() -> Self {
        Self::VarUInt
    }

    #[must_use]
    pub const fn var_int() -> Self {
        Self::VarInt
    }

    /// Creates a range-compressed integer codec.
    pub fn int(min: i32, max: i32) -> bitstream::BitResult<Self> {
        Ok(Self::Int(IntCompressor::new(min, max)?))
    }

    /// Creates a range-compressed float codec.
    pub fn float(min: f32, max: f32, precision: f32) -> bitstream::BitResult<Self> {
        Ok(Self::Float(FloatCompressor::new(min, max, precision)?))
    }

    /// Returns the kind of value this codec carries.
    #[must_use]
    pub const fn kind(&self) -> FieldKind {
        match self {
            Self::Bool => FieldKind::Bool,
            Self::UInt { .. } | Self::VarUInt => FieldKind::UInt,
            Self::VarInt | Self::Int(_) => FieldKind::Int,
            Self::Float(_) => FieldKind::Float,
        }
    }

    /// The zero value of this codec, clamped into its range.
    #[must_use]
    pub fn zero(&self) -> FieldValue {
        match self {
            Self::Bool => FieldValue::Bool(false),
            Self::UInt { .. } | Self::VarUInt => FieldValue::UInt(0),
            Self::VarInt => FieldValue::Int(0),
            Self::Int(c) => FieldValue::Int(0.clamp(c.min(), c.max())),
            Self::Float(c) => FieldValue::Float(0.0f32.clamp(c.min(), c.max())),
        }
    }
}

/// Change detection policy for a field.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ChangePolicy {
    /// Any difference marks the field dirty.
    Exact,
    /// Float fields closer than `epsilon` compare equal.
    Epsilon { epsilon: f32 },
}

/// How a field is blended between two records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Interpolation {
    /// Hold the older value until the newer one is reached.
    Snap,
    /// Blend linearly; integers are rounded.
    Linear,
}

/// Field definition within a state schema.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldDef {
    pub name: &'static str,
    pub codec: FieldCodec,
    pub change: ChangePolicy,
    pub interpolation: Interpolation,
    pub default: FieldValue,
}

impl FieldDef {
    /// Creates a field definition with the codec's defaults.
    ///
    /// Float fields compare with an epsilon of half their precision, so two
    /// quantized values are equal exactly when they share a step, and
    /// interpolate linearly. Everything else compares exactly and snaps.
    #[must_use]
    pub fn new(name: &'static str, codec: FieldCodec) -> Self {
        let (change, interpolation) = match codec {
            FieldCodec::Float(c) => (
                ChangePolicy::Epsilon {
                    epsilon: c.precision() * 0.5,
                },
                Interpolation::Linear,
            ),
            _ => (ChangePolicy::Exact, Interpolation::Snap),
        };
        Self {
            name,
            codec,
            change,
            interpolation,
            default: codec.zero(),
        }
    }

    /// Sets an epsilon change policy.
    #[must_use]
    pub const fn epsilon(mut self, epsilon: f32) -> Self {
        self.change = ChangePolicy::Epsilon { epsilon };
        self
    }

    /// Sets an exact change policy.
    #[must_use]
    pub const fn exact(mut self) -> Self {
        self.change = ChangePolicy::Exact;
        self
    }

    #[must_use]
    pub const fn interpolated(mut self) -> Self {
        self.interpolation = Interpolation::Linear;
        self
    }

    #[must_use]
    pub const fn snapped(mut self) -> Self {
        self.interpolation = Interpolation::Snap;
        self
    }

    /// Overrides the value a freshly created state starts with.
    #[must_use]
    pub const fn with_default(mut self, default: FieldValue) -> Self {
        self.default = default;
        self
    }

    /// Returns `true` if `a` and `b` are equal under this field's change policy.
    #[must_use]
    pub fn same(&self, a: FieldValue, b: FieldValue) -> bool {
        if a == b {
            return true;
        }
        match (self.change, a, b) {
            (ChangePolicy::Epsilon { epsilon }, FieldValue::Float(x), FieldValue::Float(y)) => {
                (x - y).abs() < epsilon
            }
            (ChangePolicy::Epsilon { epsilon }, FieldValue::Int(x), FieldValue::Int(y)) => {
                ((i64::from(x) - i64::from(y)).abs() as f64) < f64::from(epsilon)
            }
            _ => false,
        }
    }
}
