//! Deterministic schema hashing.

use blake3::Hasher;

use crate::{ChangePolicy, FieldCodec, FieldDef, FieldValue, Interpolation, Registry};

/// Computes a deterministic hash of every registered type.
///
/// Two peers must agree on this value before exchanging state; any change to
/// type order, field order, codecs or policies changes it.
#[must_use]
pub fn schema_hash(registry: &Registry) -> u64 {
    let mut hasher = Hasher::new();
    write_u32(&mut hasher, registry.len() as u32);

    for (tag, schema) in registry.iter() {
        write_u16(&mut hasher, tag.get());
        write_str(&mut hasher, schema.name);
        for group in [&schema.immutable, &schema.mutable, &schema.controller] {
            write_u32(&mut hasher, group.len() as u32);
            for field in group {
                write_field(&mut hasher, field);
            }
        }
    }

    let hash = hasher.finalize();
    let mut out = [0u8; 8];
    out.copy_from_slice(&hash.as_bytes()[..8]);
    u64::from_le_bytes(out)
}

fn write_field(hasher: &mut Hasher, field: &FieldDef) {
    write_str(hasher, field.name);
    write_codec(hasher, field.codec);
    write_change_policy(hasher, field.change);
    write_u8(
        hasher,
        match field.interpolation {
            Interpolation::Snap => 0,
            Interpolation::Linear => 1,
        },
    );
    write_value(hasher, field.default);
}

fn write_codec(hasher: &mut Hasher, codec: FieldCodec) {
    match codec {
        FieldCodec::Bool => {
            write_u8(hasher, 0);
        }
        FieldCodec::UInt { bits } => {
            write_u8(hasher, 1);
            write_u8(hasher, bits);
        }
        FieldCodec::VarUInt => {
            write_u8(hasher, 2);
        }
        FieldCodec::VarInt => {
            write_u8(hasher, 3);
        }
        FieldCodec::Int(c) => {
            write_u8(hasher, 4);
            write_u32(hasher, c.min() as u32);
            write_u32(hasher, c.max() as u32);
        }
        FieldCodec::Float(c) => {
            write_u8(hasher, 5);
            write_u32(hasher, c.min().to_bits());
            write_u32(hasher, c.max().to_bits());
            write_u32(hasher, c.precision().to_bits());
        }
    }
}

fn write_change_policy(hasher: &mut Hasher, policy: ChangePolicy) {
    match policy {
        ChangePolicy::Exact => {
            write_u8(hasher, 0);
        }
        ChangePolicy::Epsilon { epsilon } => {
            write_u8(hasher, 1);
            write_u32(hasher, epsilon.to_bits());
        }
    }
}

fn write_value(hasher: &mut Hasher, value: FieldValue) {
    match value {
        FieldValue::Bool(v) => {
            write_u8(hasher, 0);
            write_u8(hasher, u8::from(v));
        }
        FieldValue::UInt(v) => {
            write_u8(hasher, 1);
            write_u32(hasher, v);
        }
        FieldValue::Int(v) => {
            write_u8(hasher, 2);
            write_u32(hasher, v as u32);
        }
        FieldValue::Float(v) => {
            write_u8(hasher, 3);
            write_u32(hasher, v.to_bits());
        }
    }
}

fn write_str(hasher: &mut Hasher, value: &str) {
    write_u32(hasher, value.len() as u32);
    hasher.update(value.as_bytes());
}

fn write_u8(hasher: &mut Hasher, value: u8) {
    hasher.update(&[value]);
}

fn write_u16(hasher: &mut Hasher, value: u16) {
    hasher.update(&value.to_le_bytes());
}

fn write_u32(hasher: &mut Hasher, value: u32) {
    hasher.update(&value.to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StateSchema;

    fn registry(schemas: Vec<StateSchema>) -> Registry {
        schemas
            .into_iter()
            .fold(Registry::builder(), |b, s| b.register(s))
            .build()
            .unwrap()
    }

    fn pawn() -> StateSchema {
        StateSchema::builder("pawn")
            .mutable(FieldDef::new("x", FieldCodec::float(-10.0, 10.0, 0.01).unwrap()))
            .mutable(FieldDef::new("status", FieldCodec::uint(4)))
            .build()
            .unwrap()
    }

    fn door() -> StateSchema {
        StateSchema::builder("door")
            .mutable(FieldDef::new("open", FieldCodec::bool()))
            .build()
            .unwrap()
    }

    #[test]
    fn schema_hash_is_stable() {
        let reg = registry(vec![pawn(), door()]);
        assert_eq!(schema_hash(&reg), schema_hash(&reg.clone()));
        assert_eq!(schema_hash(&reg), schema_hash(&registry(vec![pawn(), door()])));
    }

    #[test]
    fn schema_hash_changes_with_type_order() {
        let a = registry(vec![pawn(), door()]);
        let b = registry(vec![door(), pawn()]);
        assert_ne!(schema_hash(&a), schema_hash(&b));
    }

    #[test]
    fn schema_hash_changes_with_field_order() {
        let swapped = StateSchema::builder("pawn")
            .mutable(FieldDef::new("status", FieldCodec::uint(4)))
            .mutable(FieldDef::new("x", FieldCodec::float(-10.0, 10.0, 0.01).unwrap()))
            .build()
            .unwrap();
        assert_ne!(
            schema_hash(&registry(vec![pawn()])),
            schema_hash(&registry(vec![swapped]))
        );
    }

    #[test]
    fn schema_hash_changes_with_policy() {
        let exact = StateSchema::builder("pawn")
            .mutable(FieldDef::new("x", FieldCodec::float(-10.0, 10.0, 0.01).unwrap()).exact())
            .mutable(FieldDef::new("status", FieldCodec::uint(4)))
            .build()
            .unwrap();
        assert_ne!(
            schema_hash(&registry(vec![pawn()])),
            schema_hash(&registry(vec![exact]))
        );
    }

    #[test]
    fn schema_hash_changes_with_group() {
        let moved = StateSchema::builder("pawn")
            .mutable(FieldDef::new("x", FieldCodec::float(-10.0, 10.0, 0.01).unwrap()))
            .controller(FieldDef::new("status", FieldCodec::uint(4)))
            .build()
            .unwrap();
        assert_ne!(
            schema_hash(&registry(vec![pawn()])),
            schema_hash(&registry(vec![moved]))
        );
    }
}
