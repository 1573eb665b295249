//! Replication schema definitions for the tickline replication engine.
//!
//! This crate defines how simulated object state is laid out for replication:
//! - Field values, codecs and change/interpolation policies
//! - State schemas split into immutable, mutable and controller groups
//! - An explicit [`Registry`] of state types addressed by [`TypeTag`]
//! - Deterministic schema hashing
//!
//! # Design Principles
//!
//! - **Explicit registration** - Types are listed up front; no reflection.
//! - **Fixed wire order** - Field order inside a group is the encode and decode order.
//! - **Deterministic hashing** - Schema hash is stable given the same definition.

mod error;
mod field;
mod hash;
mod schema;

pub use error::{SchemaError, SchemaResult};
pub use field::{ChangePolicy, FieldCodec, FieldDef, FieldKind, FieldValue, Interpolation};
pub use hash::schema_hash;
pub use schema::{
    FieldGroup, Registry, RegistryBuilder, StateSchema, StateSchemaBuilder, TypeTag,
    MAX_MUTABLE_FIELDS,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_api_exports() {
        let schema = StateSchema::builder("probe")
            .mutable(FieldDef::new("alive", FieldCodec::bool()))
            .build()
            .unwrap();
        let registry = Registry::builder().register(schema).build().unwrap();
        let _ = schema_hash(&registry);
        let _ = FieldGroup::Mutable;
        let _ = Interpolation::Snap;
        let _: SchemaResult<()> = Ok(());
    }
}
