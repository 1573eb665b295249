//! Per-object delta encoding and decoding.
//!
//! A record is a [`RecordHeader`] followed by the mutable section and the
//! optional controller and immutable sections:
//!
//! - without a basis, every mutable field at full width (no mask on the wire)
//! - with a basis, a dirty mask of one bit per mutable field, then only the
//!   dirty fields in schema order
//! - the full controller group when the header's controller bit is set
//! - the full immutable group when the header's first bit is set

use bitstream::BitBuffer;
use schema::{FieldGroup, Registry, StateSchema};
use wire::RecordHeader;

use crate::error::{CodecError, CodecResult};
use crate::field::{read_field_value, write_field_value};
use crate::record::EntityState;
use crate::types::{EntityId, Tick};

/// One bit per mutable field, bit `i` for field `i`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DirtyMask(u32);

impl DirtyMask {
    pub const EMPTY: Self = Self(0);

    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// A mask with the low `fields` bits set.
    #[must_use]
    pub const fn all(fields: usize) -> Self {
        if fields >= 32 {
            Self(u32::MAX)
        } else {
            Self((1 << fields) - 1)
        }
    }

    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    #[must_use]
    pub const fn is_set(self, index: usize) -> bool {
        index < 32 && self.0 & (1 << index) != 0
    }

    pub fn set(&mut self, index: usize) {
        if index < 32 {
            self.0 |= 1 << index;
        }
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[must_use]
    pub const fn count(self) -> u32 {
        self.0.count_ones()
    }
}

/// Which optional sections to include, chosen per destination peer.
///
/// These are independent of the dirty mask: an object with no dirty mutable
/// fields may still need its controller or immutable data sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeltaFlags {
    /// Destination controls the object; append the controller group.
    pub include_controller: bool,
    /// First contact with the destination; append the immutable group.
    pub include_immutable: bool,
}

/// Computes which mutable fields differ between `current` and `basis`.
///
/// Each field uses its own change policy, so floats within epsilon are clean.
#[must_use]
pub fn dirty_flags(schema: &StateSchema, current: &EntityState, basis: &EntityState) -> DirtyMask {
    let mut mask = DirtyMask::EMPTY;
    let fields = schema
        .mutable
        .iter()
        .zip(current.fields(FieldGroup::Mutable))
        .zip(basis.fields(FieldGroup::Mutable));
    for (index, ((field, now), then)) in fields.enumerate() {
        if !field.same(*now, *then) {
            mask.set(index);
        }
    }
    mask
}

/// Encodes `current` against an optional basis and returns the mask written.
///
/// Without a basis the returned mask has every field set.
pub fn encode_delta(
    registry: &Registry,
    current: &EntityState,
    basis: Option<&EntityState>,
    flags: DeltaFlags,
    buffer: &mut BitBuffer,
) -> CodecResult<DirtyMask> {
    let schema = schema_for(registry, current)?;
    if let Some(basis) = basis {
        if basis.entity() != current.entity() {
            return Err(CodecError::EntityMismatch {
                expected: current.entity(),
                found: basis.entity(),
            });
        }
    }

    let header = RecordHeader {
        entity: current.entity().raw(),
        type_tag: basis.is_none().then(|| current.type_tag().get()),
        destroyed_tick: current.destroyed_at().map(Tick::raw),
        is_controller: flags.include_controller,
        is_first: flags.include_immutable,
    };
    header.encode(buffer, registry.type_tag_bits())?;

    let mutable = current.fields(FieldGroup::Mutable);
    let mask = match basis {
        Some(basis) => {
            let mask = dirty_flags(schema, current, basis);
            buffer.write(schema.dirty_bits(), mask.bits())?;
            for (index, field) in schema.mutable.iter().enumerate() {
                if mask.is_set(index) {
                    write_field_value(field, mutable[index], buffer)?;
                }
            }
            mask
        }
        None => {
            for (field, value) in schema.mutable.iter().zip(mutable) {
                write_field_value(field, *value, buffer)?;
            }
            DirtyMask::all(schema.mutable.len())
        }
    };

    if flags.include_controller {
        write_group(schema, current, FieldGroup::Controller, buffer)?;
    }
    if flags.include_immutable {
        write_group(schema, current, FieldGroup::Immutable, buffer)?;
    }
    Ok(mask)
}

/// A decoded record.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedDelta {
    pub header: RecordHeader,
    pub mask: DirtyMask,
    pub state: EntityState,
}

/// Decodes a record written by [`encode_delta`] against the same basis.
///
/// Consumes the whole buffer; leftover bits mean the peers disagree on the
/// schema and are reported as an error.
pub fn decode_delta(
    registry: &Registry,
    basis: Option<&EntityState>,
    buffer: &mut BitBuffer,
) -> CodecResult<DecodedDelta> {
    let header = RecordHeader::decode(buffer, basis.is_some(), registry.type_tag_bits())?;
    decode_record_body(registry, header, basis, buffer)
}

/// Decodes the sections following an already-read header.
///
/// Lets a receiver read the header first to find the entity, then look up
/// the basis.
pub fn decode_record_body(
    registry: &Registry,
    header: RecordHeader,
    basis: Option<&EntityState>,
    buffer: &mut BitBuffer,
) -> CodecResult<DecodedDelta> {
    let entity = EntityId::new(header.entity);
    let mut state = match (basis, header.type_tag) {
        (Some(basis), _) => {
            if basis.entity() != entity {
                return Err(CodecError::EntityMismatch {
                    expected: basis.entity(),
                    found: entity,
                });
            }
            basis.clone()
        }
        (None, Some(tag)) => {
            let tag = schema::TypeTag::new(tag);
            let schema = registry
                .get(tag)
                .ok_or(CodecError::UnknownType { tag: tag.get() })?;
            EntityState::new(schema, tag, entity)
        }
        (None, None) => return Err(CodecError::UnknownType { tag: 0 }),
    };
    let schema = schema_for(registry, &state)?;
    state.set_destroyed_at(header.destroyed_tick.map(Tick::from_raw));

    let mask = if basis.is_some() {
        let mask = DirtyMask::from_bits(buffer.read(schema.dirty_bits())?);
        let values = state.fields_mut(FieldGroup::Mutable);
        for (index, field) in schema.mutable.iter().enumerate() {
            if mask.is_set(index) {
                values[index] = read_field_value(field, buffer)?;
            }
        }
        mask
    } else {
        read_group(schema, &mut state, FieldGroup::Mutable, buffer)?;
        DirtyMask::all(schema.mutable.len())
    };

    if header.is_controller {
        read_group(schema, &mut state, FieldGroup::Controller, buffer)?;
    }
    if header.is_first {
        read_group(schema, &mut state, FieldGroup::Immutable, buffer)?;
    }

    if !buffer.is_empty() {
        return Err(CodecError::TrailingRecordBits {
            entity,
            remaining: buffer.bits_remaining(),
        });
    }
    Ok(DecodedDelta {
        header,
        mask,
        state,
    })
}

fn schema_for<'a>(registry: &'a Registry, state: &EntityState) -> CodecResult<&'a StateSchema> {
    registry
        .get(state.type_tag())
        .ok_or(CodecError::UnknownType {
            tag: state.type_tag().get(),
        })
}

fn write_group(
    schema: &StateSchema,
    state: &EntityState,
    group: FieldGroup,
    buffer: &mut BitBuffer,
) -> CodecResult<()> {
    for (field, value) in schema.fields(group).iter().zip(state.fields(group)) {
        write_field_value(field, *value, buffer)?;
    }
    Ok(())
}

fn read_group(
    schema: &StateSchema,
    state: &mut EntityState,
    group: FieldGroup,
    buffer: &mut BitBuffer,
) -> CodecResult<()> {
    let values = state.fields_mut(group);
    for (field, value) in schema.fields(group).iter().zip(values.iter_mut()) {
        *value = read_field_value(field, buffer)?;
    }
    Ok(())
}
