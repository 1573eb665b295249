//! Range compressors for integers and floats.

use crate::buffer::BitBuffer;
use crate::error::{BitError, BitResult};

/// Compressors wider than this write their offset as a varint instead.
pub const VARINT_FALLBACK_BITS: u8 = 24;

/// Returns the number of bits needed to represent `value`.
#[must_use]
pub const fn required_bits(value: u32) -> u8 {
    (u32::BITS - value.leading_zeros()) as u8
}

/// Packs integers in `[min, max]` as an unsigned offset from `min`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntCompressor {
    min: i32,
    max: i32,
    bits: u8,
}

impl IntCompressor {
    /// Creates a compressor for the inclusive range `[min, max]`.
    ///
    /// # Errors
    ///
    /// Returns [`BitError::InvalidRange`] if `min > max`.
    pub fn new(min: i32, max: i32) -> BitResult<Self> {
        if min > max {
            return Err(BitError::InvalidRange {
                reason: "min must not exceed max",
            });
        }
        let span = (i64::from(max) - i64::from(min)) as u32;
        Ok(Self {
            min,
            max,
            bits: required_bits(span),
        })
    }

    #[must_use]
    pub const fn min(&self) -> i32 {
        self.min
    }

    #[must_use]
    pub const fn max(&self) -> i32 {
        self.max
    }

    /// Fixed bit width of a packed value.
    #[must_use]
    pub const fn bits(&self) -> u8 {
        self.bits
    }

    /// Returns `true` if values are written as varints.
    #[must_use]
    pub const fn uses_varint(&self) -> bool {
        self.bits > VARINT_FALLBACK_BITS
    }

    /// Clamps `value` into range and returns its offset from `min`.
    #[must_use]
    pub fn pack(&self, value: i32) -> u32 {
        let clamped = value.clamp(self.min, self.max);
        (i64::from(clamped) - i64::from(self.min)) as u32
    }

    /// Maps an offset back into range, clamping offsets past `max`.
    #[must_use]
    pub fn unpack(&self, raw: u32) -> i32 {
        let value = i64::from(self.min) + i64::from(raw);
        value.min(i64::from(self.max)) as i32
    }

    pub fn write(&self, buffer: &mut BitBuffer, value: i32) -> BitResult<()> {
        write_raw(buffer, self.bits, self.pack(value))
    }

    pub fn read(&self, buffer: &mut BitBuffer) -> BitResult<i32> {
        Ok(self.unpack(read_raw(buffer, self.bits)?))
    }
}

/// Quantizes floats in `[min, max]` to steps of `precision`.
///
/// The step count is `ceil((max - min) / precision)` and the bit width is the
/// smallest that covers it. Packing clamps out-of-range input; unpacking
/// clamps too, so a corrupt offset never yields a value outside the range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FloatCompressor {
    min: f32,
    max: f32,
    precision: f32,
    max_raw: u32,
    bits: u8,
}

impl FloatCompressor {
    /// Creates a compressor for `[min, max]` with the given precision.
    ///
    /// # Errors
    ///
    /// Returns [`BitError::InvalidRange`] if any bound is not finite, if
    /// `min > max`, if `precision <= 0`, or if the step count overflows `u32`.
    pub fn new(min: f32, max: f32, precision: f32) -> BitResult<Self> {
        if !(min.is_finite() && max.is_finite() && precision.is_finite()) {
            return Err(BitError::InvalidRange {
                reason: "bounds and precision must be finite",
            });
        }
        if min > max {
            return Err(BitError::InvalidRange {
                reason: "min must not exceed max",
            });
        }
        if precision <= 0.0 {
            return Err(BitError::InvalidRange {
                reason: "precision must be positive",
            });
        }
        let steps = ((f64::from(max) - f64::from(min)) / f64::from(precision)).ceil();
        if steps > f64::from(u32::MAX) {
            return Err(BitError::InvalidRange {
                reason: "too many quantization steps",
            });
        }
        let max_raw = steps as u32;
        Ok(Self {
            min,
            max,
            precision,
            max_raw,
            bits: required_bits(max_raw),
        })
    }

    #[must_use]
    pub const fn min(&self) -> f32 {
        self.min
    }

    #[must_use]
    pub const fn max(&self) -> f32 {
        self.max
    }

    #[must_use]
    pub const fn precision(&self) -> f32 {
        self.precision
    }

    /// Fixed bit width of a packed value.
    #[must_use]
    pub const fn bits(&self) -> u8 {
        self.bits
    }

    /// Returns `true` if values are written as varints.
    #[must_use]
    pub const fn uses_varint(&self) -> bool {
        self.bits > VARINT_FALLBACK_BITS
    }

    /// Quantizes `value`. NaN packs as `min`.
    #[must_use]
    pub fn pack(&self, value: f32) -> u32 {
        if value.is_nan() {
            return 0;
        }
        let clamped = f64::from(value.clamp(self.min, self.max));
        let steps = ((clamped - f64::from(self.min)) / f64::from(self.precision)).round();
        (steps as u32).min(self.max_raw)
    }

    #[must_use]
    pub fn unpack(&self, raw: u32) -> f32 {
        let steps = f64::from(raw.min(self.max_raw));
        let value = f64::from(self.min) + steps * f64::from(self.precision);
        (value as f32).clamp(self.min, self.max)
    }

    pub fn write(&self, buffer: &mut BitBuffer, value: f32) -> BitResult<()> {
        write_raw(buffer, self.bits, self.pack(value))
    }

    pub fn read(&self, buffer: &mut BitBuffer) -> BitResult<f32> {
        Ok(self.unpack(read_raw(buffer, self.bits)?))
    }
}

fn write_raw(buffer: &mut BitBuffer, bits: u8, raw: u32) -> BitResult<()> {
    if bits > VARINT_FALLBACK_BITS {
        buffer.write_var_uint(raw);
        Ok(())
    } else {
        buffer.write(bits, raw)
    }
}

fn read_raw(buffer: &mut BitBuffer, bits: u8) -> BitResult<u32> {
    if bits > VARINT_FALLBACK_BITS {
        buffer.read_var_uint()
    } else {
        buffer.read(bits)
    }
}
