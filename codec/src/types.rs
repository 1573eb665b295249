//! Core types for the codec.

use std::fmt;
use std::ops::{Add, Sub};

use bitstream::{BitBuffer, BitResult};

/// A simulation tick.
///
/// Stored offset by one so that the raw value `0` means "invalid/unset".
/// [`Tick::START`] is the first simulated tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Tick(u32);

impl Tick {
    /// The unset tick. Sorts before every valid tick.
    pub const INVALID: Self = Self(0);

    /// The first simulated tick.
    pub const START: Self = Self(1);

    /// Creates a tick from its raw, offset encoding.
    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Creates a tick from the number of steps since [`Tick::START`].
    #[must_use]
    pub const fn from_index(index: u32) -> Self {
        Self(index.saturating_add(1))
    }

    /// Returns the raw, offset encoding used on the wire.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Returns the number of steps since [`Tick::START`] (0 for invalid).
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0.saturating_sub(1)
    }

    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }

    /// Returns the following tick.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// Steps back `ticks`, never going below [`Tick::START`].
    #[must_use]
    pub const fn saturating_back(self, ticks: u32) -> Self {
        let raw = self.0.saturating_sub(ticks);
        if raw == 0 {
            Self::START
        } else {
            Self(raw)
        }
    }

    /// Returns `true` on ticks where a sender with the given rate emits.
    ///
    /// A rate of zero never sends.
    #[must_use]
    pub const fn is_send_tick(self, send_rate: u32) -> bool {
        self.is_valid() && send_rate != 0 && self.index() % send_rate == 0
    }

    /// Returns `Some(self)` for valid ticks.
    #[must_use]
    pub const fn valid(self) -> Option<Self> {
        if self.is_valid() {
            Some(self)
        } else {
            None
        }
    }

    pub fn write(self, buffer: &mut BitBuffer) {
        buffer.write_var_uint(self.0);
    }

    pub fn read(buffer: &mut BitBuffer) -> BitResult<Self> {
        Ok(Self(buffer.read_var_uint()?))
    }
}

impl Add<u32> for Tick {
    type Output = Self;

    fn add(self, rhs: u32) -> Self {
        Self(self.0.saturating_add(rhs))
    }
}

impl Sub for Tick {
    type Output = i32;

    /// Signed distance in ticks.
    fn sub(self, rhs: Self) -> i32 {
        let diff = i64::from(self.0) - i64::from(rhs.0);
        diff.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
    }
}

impl fmt::Display for Tick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "{}", self.index())
        } else {
            f.write_str("invalid")
        }
    }
}

/// A 10-bit wraparound sequence number for reliable events.
///
/// `0` is invalid; valid values `1..=1023` wrap modulo 1023. Ordering uses
/// the half-range rule, so this type deliberately does not implement `Ord`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SequenceId(u16);

impl SequenceId {
    /// Bits used on the wire.
    pub const BITS: u8 = 10;

    /// Number of valid values.
    const MODULUS: i32 = (1 << Self::BITS) - 1;

    pub const INVALID: Self = Self(0);

    pub const START: Self = Self(1);

    /// Creates a sequence id from its raw value; returns `None` if the raw
    /// value does not fit in [`SequenceId::BITS`].
    #[must_use]
    pub const fn from_raw(raw: u16) -> Option<Self> {
        if raw as i32 > Self::MODULUS {
            None
        } else {
            Some(Self(raw))
        }
    }

    #[must_use]
    pub const fn raw(self) -> u16 {
        self.0
    }

    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }

    /// Returns the following id, wrapping from 1023 to 1.
    #[must_use]
    pub fn next(self) -> Self {
        self + 1
    }

    /// Signed wraparound distance from `other` to `self`.
    ///
    /// The result is in `-511..=511`. Invalid ids yield 0.
    #[must_use]
    pub fn diff(self, other: Self) -> i16 {
        if !self.is_valid() || !other.is_valid() {
            return 0;
        }
        let mut d = (i32::from(self.0) - i32::from(other.0)).rem_euclid(Self::MODULUS);
        if d > Self::MODULUS / 2 {
            d -= Self::MODULUS;
        }
        d as i16
    }

    /// Returns `true` if `self` comes after `other`. Any valid id is newer
    /// than an invalid one.
    #[must_use]
    pub fn is_newer_than(self, other: Self) -> bool {
        if !other.is_valid() {
            return self.is_valid();
        }
        self.diff(other) > 0
    }

    pub fn write(self, buffer: &mut BitBuffer) -> BitResult<()> {
        buffer.write(Self::BITS, u32::from(self.0))
    }

    pub fn read(buffer: &mut BitBuffer) -> BitResult<Self> {
        // 10-bit reads are always <= 1023
        Ok(Self(buffer.read(Self::BITS)? as u16))
    }
}

impl Add<u16> for SequenceId {
    type Output = Self;

    /// Wrapping add. Adding to the invalid id starts from [`SequenceId::START`].
    fn add(self, rhs: u16) -> Self {
        let base = if self.is_valid() { i32::from(self.0) - 1 } else { -1 };
        let index = (base + i32::from(rhs)).rem_euclid(Self::MODULUS);
        Self((index + 1) as u16)
    }
}

/// A stable entity identifier.
///
/// Entity IDs are assigned by the host and remain stable for the lifetime of
/// an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EntityId(u32);

impl EntityId {
    /// Creates a new entity ID.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw entity ID value.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl From<u32> for EntityId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl From<EntityId> for u32 {
    fn from(id: EntityId) -> Self {
        id.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identifies a connected peer on the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PeerId(u32);

impl PeerId {
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }
}
