//! Count-prefixed batches and size-bounded packing.

use crate::buffer::BitBuffer;
use crate::error::{BitError, BitResult};

/// Width of the count prefix written before every batch.
pub const COUNT_BITS: u8 = 8;

/// Maximum number of elements in one batch.
pub const MAX_COUNT: usize = (1 << COUNT_BITS) - 1;

/// Size caps applied by [`pack_to_size`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackLimits {
    /// Cap on the bits written by the whole call, count prefix included.
    pub max_total_bits: usize,
    /// Cap on the bits a single element may occupy.
    pub max_item_bits: usize,
}

impl PackLimits {
    #[must_use]
    pub const fn new(max_total_bits: usize, max_item_bits: usize) -> Self {
        Self {
            max_total_bits,
            max_item_bits,
        }
    }

    /// Limits that never reject an element.
    #[must_use]
    pub const fn unbounded() -> Self {
        Self::new(usize::MAX, usize::MAX)
    }
}

/// Which elements made it into a packed batch.
///
/// Indices refer to positions in the sequence handed to [`pack_to_size`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackOutcome {
    /// Indices of committed elements, in write order.
    pub packed: Vec<usize>,
    /// Indices of elements that were rolled back or never attempted.
    pub skipped: Vec<usize>,
}

/// Encodes elements one at a time behind an 8-bit count prefix.
///
/// An element whose own encoding exceeds `max_item_bits`, or that would push
/// the call past `max_total_bits`, is rolled back and the next element is
/// tried. At most [`MAX_COUNT`] elements are committed; the rest are reported
/// as skipped.
///
/// # Errors
///
/// Returns [`BitError::BudgetTooSmall`] without writing anything if
/// `max_total_bits` cannot hold the count prefix. Propagates the first error
/// returned by `encode`; the buffer is truncated back to where it was before
/// the call.
pub fn pack_to_size<T, I, F>(
    buffer: &mut BitBuffer,
    items: I,
    limits: PackLimits,
    mut encode: F,
) -> BitResult<PackOutcome>
where
    I: IntoIterator<Item = T>,
    F: FnMut(&mut BitBuffer, T) -> BitResult<()>,
{
    if limits.max_total_bits < usize::from(COUNT_BITS) {
        return Err(BitError::BudgetTooSmall {
            budget: limits.max_total_bits,
            needed: COUNT_BITS,
        });
    }
    let start = buffer.bits_written();
    let count_mark = buffer.reserve(COUNT_BITS)?;
    let mut outcome = PackOutcome::default();

    for (index, item) in items.into_iter().enumerate() {
        if outcome.packed.len() >= MAX_COUNT {
            outcome.skipped.push(index);
            continue;
        }
        let before = buffer.bits_written();
        if let Err(err) = encode(buffer, item) {
            buffer.truncate(start);
            return Err(err);
        }
        let item_bits = buffer.bits_written() - before;
        let total_bits = buffer.bits_written() - start;
        if item_bits > limits.max_item_bits || total_bits > limits.max_total_bits {
            buffer.truncate(before);
            outcome.skipped.push(index);
        } else {
            outcome.packed.push(index);
        }
    }

    // packed.len() <= MAX_COUNT, so this always fits the reserved width
    buffer.backfill(count_mark, outcome.packed.len() as u32)?;
    Ok(outcome)
}

/// Reads a count prefix and decodes that many elements.
pub fn unpack_counted<T, F>(buffer: &mut BitBuffer, mut decode: F) -> BitResult<Vec<T>>
where
    F: FnMut(&mut BitBuffer) -> BitResult<T>,
{
    let count = buffer.read(COUNT_BITS)? as usize;
    let mut items = Vec::with_capacity(count);
    for _ in 0..count {
        items.push(decode(buffer)?);
    }
    Ok(items)
}

/// Writes a count prefix followed by every element.
///
/// # Errors
///
/// Returns [`BitError::ValueOutOfRange`] if there are more than [`MAX_COUNT`]
/// elements.
pub fn pack_counted<T: Packable>(buffer: &mut BitBuffer, items: &[T]) -> BitResult<()> {
    if items.len() > MAX_COUNT {
        return Err(BitError::ValueOutOfRange {
            value: u32::try_from(items.len()).unwrap_or(u32::MAX),
            bits: COUNT_BITS,
        });
    }
    buffer.write(COUNT_BITS, items.len() as u32)?;
    for item in items {
        item.pack(buffer)?;
    }
    Ok(())
}

/// A value with a self-contained bit encoding.
///
/// Implemented by command and event payloads so the generic envelopes can
/// carry them.
pub trait Packable: Sized {
    fn pack(&self, buffer: &mut BitBuffer) -> BitResult<()>;

    fn unpack(buffer: &mut BitBuffer) -> BitResult<Self>;
}

impl Packable for u32 {
    fn pack(&self, buffer: &mut BitBuffer) -> BitResult<()> {
        buffer.write_var_uint(*self);
        Ok(())
    }

    fn unpack(buffer: &mut BitBuffer) -> BitResult<Self> {
        buffer.read_var_uint()
    }
}

impl Packable for i32 {
    fn pack(&self, buffer: &mut BitBuffer) -> BitResult<()> {
        buffer.write_var_int(*self);
        Ok(())
    }

    fn unpack(buffer: &mut BitBuffer) -> BitResult<Self> {
        buffer.read_var_int()
    }
}

impl Packable for bool {
    fn pack(&self, buffer: &mut BitBuffer) -> BitResult<()> {
        buffer.write_bool(*self);
        Ok(())
    }

    fn unpack(buffer: &mut BitBuffer) -> BitResult<Self> {
        buffer.read_bool()
    }
}
