//! Growable bit buffer with independent read and write cursors.

use crate::error::{BitError, BitResult};

const WORD_BITS: usize = 32;
const MIN_WORDS: usize = 4;
const MAX_BITS: u8 = 32;
const VARINT_MAX_BYTES: u32 = 5;

/// A reserved region of a [`BitBuffer`] that is filled in later.
///
/// Returned by [`BitBuffer::reserve`]; pass it to [`BitBuffer::backfill`]
/// once the value is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bookmark {
    position: usize,
    bits: u8,
}

impl Bookmark {
    /// Bit position of the reserved region.
    #[must_use]
    pub const fn position(self) -> usize {
        self.position
    }

    /// Width of the reserved region.
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.bits
    }
}

/// A growable, bit-addressable FIFO buffer.
///
/// Writes append at the write cursor; reads consume from the read cursor in
/// the order the data was written. Bits are packed least-significant first
/// into 32-bit words.
#[derive(Debug, Clone, Default)]
pub struct BitBuffer {
    words: Vec<u32>,
    write_pos: usize,
    read_pos: usize,
}

impl BitBuffer {
    /// Creates a new empty `BitBuffer`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new `BitBuffer` with pre-allocated capacity.
    #[must_use]
    pub fn with_capacity(bytes: usize) -> Self {
        Self {
            words: vec![0; bytes.div_ceil(4)],
            write_pos: 0,
            read_pos: 0,
        }
    }

    /// Creates a buffer whose written region is exactly `bytes`.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let words = bytes
            .chunks(4)
            .map(|chunk| {
                let mut word = [0u8; 4];
                word[..chunk.len()].copy_from_slice(chunk);
                u32::from_le_bytes(word)
            })
            .collect();
        Self {
            words,
            write_pos: bytes.len() * 8,
            read_pos: 0,
        }
    }

    /// Returns the written region as bytes, zero-padding the final byte.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let len = self.write_pos.div_ceil(8);
        let mut bytes: Vec<u8> = self.words.iter().flat_map(|w| w.to_le_bytes()).collect();
        bytes.truncate(len);
        // bits past the write cursor may be stale after a truncate
        let tail = self.write_pos % 8;
        if let (Some(last), true) = (bytes.last_mut(), tail != 0) {
            *last &= (1u8 << tail) - 1;
        }
        bytes
    }

    /// Returns the number of bits written so far.
    #[must_use]
    pub const fn bits_written(&self) -> usize {
        self.write_pos
    }

    /// Returns the current read position in bits.
    #[must_use]
    pub const fn read_position(&self) -> usize {
        self.read_pos
    }

    /// Returns the number of bits remaining to read.
    #[must_use]
    pub const fn bits_remaining(&self) -> usize {
        self.write_pos - self.read_pos
    }

    /// Returns `true` if there are no more bits to read.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.bits_remaining() == 0
    }

    /// Discards all data and resets both cursors.
    pub fn clear(&mut self) {
        self.words.iter_mut().for_each(|w| *w = 0);
        self.write_pos = 0;
        self.read_pos = 0;
    }

    /// Moves the read cursor back to the start of the buffer.
    pub fn rewind(&mut self) {
        self.read_pos = 0;
    }

    /// Writes the low `bits` bits of `value`.
    ///
    /// # Errors
    ///
    /// Returns [`BitError::InvalidBitCount`] if `bits > 32`.
    /// Returns [`BitError::ValueOutOfRange`] if `value` doesn't fit in `bits`.
    pub fn write(&mut self, bits: u8, value: u32) -> BitResult<()> {
        check_value(bits, value)?;
        self.push(bits, value);
        Ok(())
    }

    /// Reads `bits` bits.
    ///
    /// # Errors
    ///
    /// Returns [`BitError::Underrun`] if fewer than `bits` bits remain.
    pub fn read(&mut self, bits: u8) -> BitResult<u32> {
        let value = self.peek(bits)?;
        self.read_pos += bits as usize;
        Ok(value)
    }

    /// Reads `bits` bits without advancing the read cursor.
    pub fn peek(&self, bits: u8) -> BitResult<u32> {
        check_bit_count(bits)?;
        if bits as usize > self.bits_remaining() {
            return Err(BitError::Underrun {
                requested: bits as usize,
                available: self.bits_remaining(),
            });
        }
        if bits == 0 {
            return Ok(0);
        }
        Ok(self.get(self.read_pos, bits as usize))
    }

    /// Skips `bits` bits of unread data.
    pub fn skip(&mut self, bits: usize) -> BitResult<()> {
        if bits > self.bits_remaining() {
            return Err(BitError::Underrun {
                requested: bits,
                available: self.bits_remaining(),
            });
        }
        self.read_pos += bits;
        Ok(())
    }

    /// Writes a single bit.
    pub fn write_bool(&mut self, value: bool) {
        self.push(1, u32::from(value));
    }

    /// Reads a single bit as a boolean.
    pub fn read_bool(&mut self) -> BitResult<bool> {
        Ok(self.read(1)? == 1)
    }

    /// Writes a varint: 7 payload bits per byte, continuation bit on all but the last.
    pub fn write_var_uint(&mut self, mut value: u32) {
        loop {
            let mut byte = value & 0x7F;
            value >>= 7;
            if value != 0 {
                byte |= 0x80;
            }
            self.push(8, byte);
            if value == 0 {
                break;
            }
        }
    }

    /// Reads a varint written by [`write_var_uint`](Self::write_var_uint).
    pub fn read_var_uint(&mut self) -> BitResult<u32> {
        let mut result = 0u32;
        for index in 0..VARINT_MAX_BYTES {
            let byte = self.read(8)?;
            // the fifth byte may only carry the top four bits
            if index == VARINT_MAX_BYTES - 1 && byte & 0xF0 != 0 {
                return Err(BitError::InvalidVarint);
            }
            result |= (byte & 0x7F) << (7 * index);
            if byte & 0x80 == 0 {
                return Ok(result);
            }
        }
        Err(BitError::InvalidVarint)
    }

    /// Writes a zigzag-encoded signed varint.
    pub fn write_var_int(&mut self, value: i32) {
        self.write_var_uint(zigzag_encode(value));
    }

    /// Reads a zigzag-encoded signed varint.
    pub fn read_var_int(&mut self) -> BitResult<i32> {
        Ok(zigzag_decode(self.read_var_uint()?))
    }

    /// Reserves `bits` zeroed bits at the write cursor to be filled in later.
    pub fn reserve(&mut self, bits: u8) -> BitResult<Bookmark> {
        check_bit_count(bits)?;
        let bookmark = Bookmark {
            position: self.write_pos,
            bits,
        };
        self.push(bits, 0);
        Ok(bookmark)
    }

    /// Overwrites a reserved region in place without moving any cursor.
    pub fn backfill(&mut self, bookmark: Bookmark, value: u32) -> BitResult<()> {
        check_value(bookmark.bits, value)?;
        if bookmark.position + bookmark.bits as usize > self.write_pos {
            return Err(BitError::InvalidBookmark {
                position: bookmark.position,
                bits: bookmark.bits,
                written: self.write_pos,
            });
        }
        if bookmark.bits > 0 {
            self.put(bookmark.position, bookmark.bits as usize, value);
        }
        Ok(())
    }

    /// Discards everything written after bit `position`.
    ///
    /// Used to roll back a partially encoded element.
    pub fn truncate(&mut self, position: usize) {
        if position < self.write_pos {
            self.write_pos = position;
            self.read_pos = self.read_pos.min(position);
        }
    }

    /// Appends all written bits of `other`, regardless of its read cursor.
    pub fn append(&mut self, other: &Self) {
        let mut offset = 0;
        while offset < other.write_pos {
            let bits = (other.write_pos - offset).min(WORD_BITS);
            self.push(bits as u8, other.get(offset, bits));
            offset += bits;
        }
    }

    /// Reads the next `bits` bits into a new buffer.
    pub fn take(&mut self, bits: usize) -> BitResult<Self> {
        if bits > self.bits_remaining() {
            return Err(BitError::Underrun {
                requested: bits,
                available: self.bits_remaining(),
            });
        }
        let mut out = Self::with_capacity(bits.div_ceil(8));
        let mut remaining = bits;
        while remaining > 0 {
            let chunk = remaining.min(WORD_BITS);
            out.push(chunk as u8, self.get(self.read_pos, chunk));
            self.read_pos += chunk;
            remaining -= chunk;
        }
        Ok(out)
    }

    fn push(&mut self, bits: u8, value: u32) {
        if bits == 0 {
            return;
        }
        self.ensure_capacity(self.write_pos + bits as usize);
        self.put(self.write_pos, bits as usize, value);
        self.write_pos += bits as usize;
    }

    fn ensure_capacity(&mut self, total_bits: usize) {
        let needed = total_bits.div_ceil(WORD_BITS);
        if needed > self.words.len() {
            let grown = needed.max(self.words.len() * 2).max(MIN_WORDS);
            self.words.resize(grown, 0);
        }
    }

    fn put(&mut self, position: usize, bits: usize, value: u32) {
        let word = position / WORD_BITS;
        let offset = position % WORD_BITS;
        let first = bits.min(WORD_BITS - offset);
        let mask = low_mask(first) << offset;
        self.words[word] = (self.words[word] & !mask) | ((value << offset) & mask);
        if first < bits {
            let rest = low_mask(bits - first);
            self.words[word + 1] = (self.words[word + 1] & !rest) | ((value >> first) & rest);
        }
    }

    fn get(&self, position: usize, bits: usize) -> u32 {
        let word = position / WORD_BITS;
        let offset = position % WORD_BITS;
        let first = bits.min(WORD_BITS - offset);
        let mut value = (self.words[word] >> offset) & low_mask(first);
        if first < bits {
            value |= (self.words[word + 1] & low_mask(bits - first)) << first;
        }
        value
    }
}

impl PartialEq for BitBuffer {
    /// Buffers are equal when their cursors and written bits match.
    fn eq(&self, other: &Self) -> bool {
        self.write_pos == other.write_pos
            && self.read_pos == other.read_pos
            && self.to_bytes() == other.to_bytes()
    }
}

impl Eq for BitBuffer {}

const fn low_mask(bits: usize) -> u32 {
    if bits >= WORD_BITS {
        u32::MAX
    } else {
        (1u32 << bits) - 1
    }
}

const fn check_bit_count(bits: u8) -> BitResult<()> {
    if bits > MAX_BITS {
        return Err(BitError::InvalidBitCount {
            bits,
            max_bits: MAX_BITS,
        });
    }
    Ok(())
}

const fn check_value(bits: u8, value: u32) -> BitResult<()> {
    if let Err(err) = check_bit_count(bits) {
        return Err(err);
    }
    if bits < MAX_BITS && value >> bits != 0 {
        return Err(BitError::ValueOutOfRange { value, bits });
    }
    Ok(())
}

/// Maps a signed integer onto an unsigned one so small magnitudes stay small.
#[must_use]
pub const fn zigzag_encode(value: i32) -> u32 {
    ((value << 1) ^ (value >> 31)) as u32
}

/// Inverse of [`zigzag_encode`].
#[must_use]
pub const fn zigzag_decode(value: u32) -> i32 {
    ((value >> 1) as i32) ^ -((value & 1) as i32)
}
