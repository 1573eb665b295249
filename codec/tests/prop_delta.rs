use std::num::{NonZeroU32, NonZeroUsize};

use bitstream::BitBuffer;
use codec::{
    decode_delta, encode_delta, DejitterBuffer, DeltaFlags, DirtyMask, EntityId, EntityState,
    Tick, Timed,
};
use proptest::prelude::*;
use schema::{FieldCodec, FieldDef, FieldGroup, FieldValue, Registry, StateSchema, TypeTag};

fn registry() -> Registry {
    let schema = StateSchema::builder("mixed")
        .immutable(FieldDef::new("team", FieldCodec::uint(2)))
        .mutable(FieldDef::new("x", FieldCodec::float(-100.0, 100.0, 0.01).unwrap()))
        .mutable(FieldDef::new("hp", FieldCodec::int(0, 200).unwrap()))
        .mutable(FieldDef::new("status", FieldCodec::uint(4)))
        .mutable(FieldDef::new("alive", FieldCodec::bool()))
        .mutable(FieldDef::new("score", FieldCodec::var_int()))
        .controller(FieldDef::new("ammo", FieldCodec::var_uint()))
        .build()
        .unwrap();
    Registry::builder().register(schema).build().unwrap()
}

type Values = (f32, i32, u32, bool, i32);

fn values() -> impl Strategy<Value = Values> {
    (-100.0f32..100.0, 0i32..=200, 0u32..16, any::<bool>(), any::<i32>())
}

fn state(registry: &Registry, (x, hp, status, alive, score): Values) -> EntityState {
    let schema = registry.get(TypeTag::new(0)).unwrap();
    let mut state = EntityState::new(schema, TypeTag::new(0), EntityId::new(77));
    state.set(schema, "x", FieldValue::Float(x)).unwrap();
    state.set(schema, "hp", FieldValue::Int(hp)).unwrap();
    state.set(schema, "status", FieldValue::UInt(status)).unwrap();
    state.set(schema, "alive", FieldValue::Bool(alive)).unwrap();
    state.set(schema, "score", FieldValue::Int(score)).unwrap();
    state.quantized(schema)
}

/// Takes each field from `current` when its bit is set, otherwise from `basis`.
fn mix(basis: Values, current: Values, subset: u8) -> Values {
    (
        if subset & 1 != 0 { current.0 } else { basis.0 },
        if subset & 2 != 0 { current.1 } else { basis.1 },
        if subset & 4 != 0 { current.2 } else { basis.2 },
        if subset & 8 != 0 { current.3 } else { basis.3 },
        if subset & 16 != 0 { current.4 } else { basis.4 },
    )
}

proptest! {
    #[test]
    fn prop_delta_roundtrip(
        basis in values(),
        changed in values(),
        subset in 0u8..32,
        controller in any::<bool>(),
        first in any::<bool>(),
    ) {
        let registry = registry();
        let basis = state(&registry, basis);
        let current = state(&registry, mix(changed_basis(&basis), changed, subset));
        let flags = DeltaFlags { include_controller: controller, include_immutable: first };

        let mut buffer = BitBuffer::new();
        encode_delta(&registry, &current, Some(&basis), flags, &mut buffer).unwrap();
        let mut received = BitBuffer::from_bytes(&buffer.to_bytes());
        received.truncate(buffer.bits_written());
        let decoded = decode_delta(&registry, Some(&basis), &mut received).unwrap();

        prop_assert_eq!(
            decoded.state.fields(FieldGroup::Mutable),
            current.fields(FieldGroup::Mutable)
        );
    }

    #[test]
    fn prop_full_matches_delta_when_everything_changed(
        basis in values(),
        current in values(),
    ) {
        let registry = registry();
        let basis = state(&registry, basis);
        let current = state(&registry, current);

        let mut with_basis = BitBuffer::new();
        let mask = encode_delta(&registry, &current, Some(&basis), DeltaFlags::default(), &mut with_basis).unwrap();
        prop_assume!(mask == DirtyMask::all(5));

        let mut full = BitBuffer::new();
        encode_delta(&registry, &current, None, DeltaFlags::default(), &mut full).unwrap();

        let from_full = decode_delta(&registry, None, &mut full).unwrap();
        let from_delta = decode_delta(&registry, Some(&basis), &mut with_basis).unwrap();
        prop_assert_eq!(
            from_full.state.fields(FieldGroup::Mutable),
            from_delta.state.fields(FieldGroup::Mutable)
        );
    }

    #[test]
    fn prop_dejitter_latest_is_max(
        ticks in prop::collection::vec(0u32..500, 1..64),
        capacity in 1usize..16,
        divisor in 1u32..4,
        bound in 0u32..500,
        cutoff in 0u32..500,
    ) {
        let mut buffer: DejitterBuffer<Tick> = DejitterBuffer::new(
            NonZeroUsize::new(capacity).unwrap(),
            NonZeroU32::new(divisor).unwrap(),
        );
        for index in &ticks {
            buffer.store(Tick::from_index(*index));
        }
        let max = ticks.iter().copied().max().map(Tick::from_index);
        prop_assert_eq!(buffer.latest_tick(), max);
        prop_assert_eq!(buffer.latest().copied(), max);

        let bound = Tick::from_index(bound);
        if let Some(found) = buffer.latest_at(bound) {
            prop_assert!(found.tick() <= bound);
        }
        prop_assert!(buffer.len() <= capacity);

        buffer.retain_from(Tick::from_index(cutoff));
        let remaining = buffer.iter().copied().max();
        prop_assert_eq!(buffer.latest_tick(), remaining);
        prop_assert_eq!(buffer.latest().copied(), remaining);
    }
}

/// The basis values as a tuple, so unchanged fields are bit-identical.
fn changed_basis(basis: &EntityState) -> Values {
    let fields = basis.fields(FieldGroup::Mutable);
    (
        fields[0].as_float().unwrap(),
        fields[1].as_int().unwrap(),
        fields[2].as_uint().unwrap(),
        fields[3].as_bool().unwrap(),
        fields[4].as_int().unwrap(),
    )
}

#[test]
fn epsilon_change_emits_no_field_bits() {
    let schema = StateSchema::builder("unit")
        .mutable(FieldDef::new("x", FieldCodec::float(-1000.0, 1000.0, 0.0001).unwrap()).epsilon(0.001))
        .mutable(FieldDef::new("status", FieldCodec::uint(3)))
        .build()
        .unwrap();
    let registry = Registry::builder().register(schema.clone()).build().unwrap();

    let mut basis = EntityState::new(&schema, TypeTag::new(0), EntityId::new(1));
    basis.set(&schema, "x", FieldValue::Float(10.0)).unwrap();
    basis.set(&schema, "status", FieldValue::UInt(3)).unwrap();
    let mut current = basis.clone();
    current.set(&schema, "x", FieldValue::Float(10.0005)).unwrap();

    let mut buffer = BitBuffer::new();
    let mask = encode_delta(&registry, &current, Some(&basis), DeltaFlags::default(), &mut buffer).unwrap();
    assert!(mask.is_empty());

    let mut header_only = BitBuffer::new();
    wire::RecordHeader {
        entity: 1,
        type_tag: None,
        destroyed_tick: None,
        is_controller: false,
        is_first: false,
    }
    .encode(&mut header_only, registry.type_tag_bits())
    .unwrap();
    assert_eq!(buffer.bits_written(), header_only.bits_written() + 2);
}
