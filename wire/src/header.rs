//! Per-record header.

use bitstream::BitBuffer;

use crate::error::WireResult;

/// Header preceding every record in a delta frame.
///
/// Layout:
/// `[entity varint][type tag, only without basis][destroyed:1][destroyed tick varint, if set][controller:1][first:1]`
///
/// Ticks are carried as their raw, offset encoding; `0` never appears for a
/// valid destroyed tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub entity: u32,
    /// Present exactly when the record has no basis.
    pub type_tag: Option<u16>,
    pub destroyed_tick: Option<u32>,
    /// A controller section follows the mutable section.
    pub is_controller: bool,
    /// An immutable section follows the mutable/controller sections.
    pub is_first: bool,
}

impl RecordHeader {
    /// Writes the header. `tag_bits` is the registry's type tag width.
    ///
    /// The type tag is written only when `self.type_tag` is set, so it must be
    /// `Some` exactly when the record is encoded without a basis.
    pub fn encode(&self, buffer: &mut BitBuffer, tag_bits: u8) -> WireResult<()> {
        buffer.write_var_uint(self.entity);
        if let Some(tag) = self.type_tag {
            buffer.write(tag_bits, u32::from(tag))?;
        }
        buffer.write_bool(self.destroyed_tick.is_some());
        if let Some(tick) = self.destroyed_tick {
            buffer.write_var_uint(tick);
        }
        buffer.write_bool(self.is_controller);
        buffer.write_bool(self.is_first);
        Ok(())
    }

    /// Reads a header written by [`encode`](Self::encode).
    pub fn decode(buffer: &mut BitBuffer, has_basis: bool, tag_bits: u8) -> WireResult<Self> {
        let entity = buffer.read_var_uint()?;
        let type_tag = if has_basis {
            None
        } else {
            // tag_bits <= 16 for any valid registry
            Some(buffer.read(tag_bits)? as u16)
        };
        let destroyed_tick = if buffer.read_bool()? {
            Some(buffer.read_var_uint()?)
        } else {
            None
        };
        let is_controller = buffer.read_bool()?;
        let is_first = buffer.read_bool()?;
        Ok(Self {
            entity,
            type_tag,
            destroyed_tick,
            is_controller,
            is_first,
        })
    }
}
