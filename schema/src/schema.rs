//! State schemas and the type registry.

use std::collections::HashSet;

use bitstream::required_bits;

use crate::error::{SchemaError, SchemaResult};
use crate::{ChangePolicy, FieldCodec, FieldDef};

/// Maximum number of mutable fields (one dirty bit each).
pub const MAX_MUTABLE_FIELDS: usize = 32;

/// Index of a state type within a [`Registry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TypeTag(u16);

impl TypeTag {
    #[must_use]
    pub const fn new(value: u16) -> Self {
        Self(value)
    }

    #[must_use]
    pub const fn get(self) -> u16 {
        self.0
    }
}

/// The three field groups of a state record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FieldGroup {
    /// Sent once, on first contact with a peer.
    Immutable,
    /// Delta encoded against a basis with a dirty mask.
    Mutable,
    /// Sent only to the peer controlling the object.
    Controller,
}

/// Field layout of one replicated state type.
///
/// Field order inside each group is the wire order.
#[derive(Debug, Clone, PartialEq)]
pub struct StateSchema {
    pub name: &'static str,
    pub immutable: Vec<FieldDef>,
    pub mutable: Vec<FieldDef>,
    pub controller: Vec<FieldDef>,
}

impl StateSchema {
    /// Creates a schema builder.
    #[must_use]
    pub fn builder(name: &'static str) -> StateSchemaBuilder {
        StateSchemaBuilder {
            schema: Self {
                name,
                immutable: Vec::new(),
                mutable: Vec::new(),
                controller: Vec::new(),
            },
        }
    }

    /// Returns the fields of one group.
    #[must_use]
    pub fn fields(&self, group: FieldGroup) -> &[FieldDef] {
        match group {
            FieldGroup::Immutable => &self.immutable,
            FieldGroup::Mutable => &self.mutable,
            FieldGroup::Controller => &self.controller,
        }
    }

    /// Width of the dirty mask for this type.
    #[must_use]
    pub fn dirty_bits(&self) -> u8 {
        self.mutable.len() as u8
    }

    /// Finds a field by name, returning its group and index.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<(FieldGroup, usize)> {
        [FieldGroup::Immutable, FieldGroup::Mutable, FieldGroup::Controller]
            .into_iter()
            .find_map(|group| {
                self.fields(group)
                    .iter()
                    .position(|f| f.name == name)
                    .map(|index| (group, index))
            })
    }

    /// Validates schema invariants.
    pub fn validate(&self) -> SchemaResult<()> {
        if self.mutable.len() > MAX_MUTABLE_FIELDS {
            return Err(SchemaError::TooManyMutableFields {
                state: self.name,
                count: self.mutable.len(),
                max: MAX_MUTABLE_FIELDS,
            });
        }
        let mut names = HashSet::new();
        for field in self
            .immutable
            .iter()
            .chain(&self.mutable)
            .chain(&self.controller)
        {
            if !names.insert(field.name) {
                return Err(SchemaError::DuplicateFieldName {
                    state: self.name,
                    field: field.name,
                });
            }
            validate_field(field)?;
        }
        Ok(())
    }
}

/// Builder for [`StateSchema`].
#[derive(Debug)]
pub struct StateSchemaBuilder {
    schema: StateSchema,
}

impl StateSchemaBuilder {
    #[must_use]
    pub fn immutable(mut self, field: FieldDef) -> Self {
        self.schema.immutable.push(field);
        self
    }

    #[must_use]
    pub fn mutable(mut self, field: FieldDef) -> Self {
        self.schema.mutable.push(field);
        self
    }

    #[must_use]
    pub fn controller(mut self, field: FieldDef) -> Self {
        self.schema.controller.push(field);
        self
    }

    /// Builds the schema after validation.
    pub fn build(self) -> SchemaResult<StateSchema> {
        self.schema.validate()?;
        Ok(self.schema)
    }
}

fn validate_field(field: &FieldDef) -> SchemaResult<()> {
    if let FieldCodec::UInt { bits } = field.codec {
        if bits == 0 || bits > 32 {
            return Err(SchemaError::InvalidBitWidth {
                field: field.name,
                bits,
            });
        }
    }
    if field.default.kind() != field.codec.kind() {
        return Err(SchemaError::DefaultKindMismatch {
            field: field.name,
            expected: field.codec.kind(),
            actual: field.default.kind(),
        });
    }
    if let ChangePolicy::Epsilon { epsilon } = field.change {
        if !epsilon.is_finite() || epsilon < 0.0 {
            return Err(SchemaError::InvalidEpsilon {
                field: field.name,
                epsilon,
            });
        }
    }
    Ok(())
}

/// Explicit table of every replicated state type.
///
/// Type tags are assigned in registration order, so peers must register the
/// same types in the same order. [`schema_hash`](crate::schema_hash) detects
/// mismatches.
#[derive(Debug, Clone, PartialEq)]
pub struct Registry {
    types: Vec<StateSchema>,
}

impl Registry {
    #[must_use]
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Looks up a state type by tag.
    #[must_use]
    pub fn get(&self, tag: TypeTag) -> Option<&StateSchema> {
        self.types.get(tag.0 as usize)
    }

    /// Looks up a tag by state type name.
    #[must_use]
    pub fn tag_of(&self, name: &str) -> Option<TypeTag> {
        self.types
            .iter()
            .position(|s| s.name == name)
            .map(|index| TypeTag(index as u16))
    }

    /// Iterates over all state types with their tags.
    pub fn iter(&self) -> impl Iterator<Item = (TypeTag, &StateSchema)> {
        self.types
            .iter()
            .enumerate()
            .map(|(index, schema)| (TypeTag(index as u16), schema))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Number of bits needed to write any type tag.
    #[must_use]
    pub fn type_tag_bits(&self) -> u8 {
        required_bits(self.types.len().saturating_sub(1) as u32)
    }
}

/// Builder for [`Registry`].
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    types: Vec<StateSchema>,
}

impl RegistryBuilder {
    /// Registers a state type under the next free tag.
    #[must_use]
    pub fn register(mut self, schema: StateSchema) -> Self {
        self.types.push(schema);
        self
    }

    /// Builds the registry after validation.
    pub fn build(self) -> SchemaResult<Registry> {
        if self.types.is_empty() {
            return Err(SchemaError::EmptyRegistry);
        }
        let max = u16::MAX as usize + 1;
        if self.types.len() > max {
            return Err(SchemaError::TooManyTypes {
                count: self.types.len(),
                max,
            });
        }
        let mut names = HashSet::new();
        for schema in &self.types {
            if !names.insert(schema.name) {
                return Err(SchemaError::DuplicateTypeName { name: schema.name });
            }
            schema.validate()?;
        }
        Ok(Registry { types: self.types })
    }
}
