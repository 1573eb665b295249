//! Entity state records.

use schema::{FieldGroup, FieldValue, StateSchema, TypeTag};

use crate::error::{CodecError, CodecResult};
use crate::field::{check_kind, quantize};
use crate::types::{EntityId, Tick};

/// The replicated payload of one simulated object.
///
/// Field values are stored per group in schema order. The entity ID and type
/// never change after creation.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityState {
    entity: EntityId,
    type_tag: TypeTag,
    destroyed_at: Option<Tick>,
    immutable: Vec<FieldValue>,
    mutable: Vec<FieldValue>,
    controller: Vec<FieldValue>,
}

impl EntityState {
    /// Creates a state with every field at its schema default.
    #[must_use]
    pub fn new(schema: &StateSchema, type_tag: TypeTag, entity: EntityId) -> Self {
        let defaults = |group: FieldGroup| -> Vec<FieldValue> {
            schema.fields(group).iter().map(|f| f.default).collect()
        };
        Self {
            entity,
            type_tag,
            destroyed_at: None,
            immutable: defaults(FieldGroup::Immutable),
            mutable: defaults(FieldGroup::Mutable),
            controller: defaults(FieldGroup::Controller),
        }
    }

    #[must_use]
    pub const fn entity(&self) -> EntityId {
        self.entity
    }

    #[must_use]
    pub const fn type_tag(&self) -> TypeTag {
        self.type_tag
    }

    /// Tick at which the object was destroyed, if it has been.
    #[must_use]
    pub const fn destroyed_at(&self) -> Option<Tick> {
        self.destroyed_at
    }

    #[must_use]
    pub const fn is_destroyed(&self) -> bool {
        self.destroyed_at.is_some()
    }

    pub fn set_destroyed_at(&mut self, tick: Option<Tick>) {
        self.destroyed_at = tick;
    }

    /// Returns the values of one field group.
    #[must_use]
    pub fn fields(&self, group: FieldGroup) -> &[FieldValue] {
        match group {
            FieldGroup::Immutable => &self.immutable,
            FieldGroup::Mutable => &self.mutable,
            FieldGroup::Controller => &self.controller,
        }
    }

    pub(crate) fn fields_mut(&mut self, group: FieldGroup) -> &mut [FieldValue] {
        match group {
            FieldGroup::Immutable => &mut self.immutable,
            FieldGroup::Mutable => &mut self.mutable,
            FieldGroup::Controller => &mut self.controller,
        }
    }

    /// Rewrites every value of a group in place.
    ///
    /// `f` receives the field index and current value. A returned value of a
    /// different kind is discarded and the current value kept.
    pub fn update_fields<F>(&mut self, group: FieldGroup, mut f: F)
    where
        F: FnMut(usize, FieldValue) -> FieldValue,
    {
        for (index, slot) in self.fields_mut(group).iter_mut().enumerate() {
            let value = f(index, *slot);
            if value.kind() == slot.kind() {
                *slot = value;
            }
        }
    }

    /// Reads a field by name.
    #[must_use]
    pub fn get(&self, schema: &StateSchema, name: &str) -> Option<FieldValue> {
        let (group, index) = schema.find(name)?;
        self.fields(group).get(index).copied()
    }

    /// Writes a field by name, checking the value against the field's codec.
    pub fn set(&mut self, schema: &StateSchema, name: &str, value: FieldValue) -> CodecResult<()> {
        let (group, index) = schema.find(name).ok_or_else(|| CodecError::UnknownField {
            state: schema.name,
            field: name.to_owned(),
        })?;
        check_kind(&schema.fields(group)[index], value)?;
        if let Some(slot) = self.fields_mut(group).get_mut(index) {
            *slot = value;
        }
        Ok(())
    }

    /// Returns a copy with every field rounded the way the wire would round it.
    #[must_use]
    pub fn quantized(&self, schema: &StateSchema) -> Self {
        let mut out = self.clone();
        for group in [FieldGroup::Immutable, FieldGroup::Mutable, FieldGroup::Controller] {
            for (value, field) in out.fields_mut(group).iter_mut().zip(schema.fields(group)) {
                *value = quantize(field, *value);
            }
        }
        out
    }
}

/// A value stamped with the tick it belongs to.
pub trait Timed {
    fn tick(&self) -> Tick;
}

impl Timed for Tick {
    fn tick(&self) -> Tick {
        *self
    }
}

/// An entity state at a tick.
#[derive(Debug, Clone, PartialEq)]
pub struct StateRecord {
    pub tick: Tick,
    /// Local tick the record arrived at, for records received from a host.
    pub arrival: Option<Tick>,
    pub state: EntityState,
}

impl StateRecord {
    #[must_use]
    pub const fn new(tick: Tick, state: EntityState) -> Self {
        Self {
            tick,
            arrival: None,
            state,
        }
    }
}

impl Timed for StateRecord {
    fn tick(&self) -> Tick {
        self.tick
    }
}
