//! Delta record encode/decode throughput.

use std::hint::black_box;

use bitstream::BitBuffer;
use codec::{decode_delta, encode_delta, DeltaFlags, EntityId, EntityState};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use schema::{FieldCodec, FieldDef, FieldValue, Registry, StateSchema, TypeTag};

criterion_group!(delta_benches, encode_records, decode_records);
criterion_main!(delta_benches);

const DIRTY_FIELDS: &[usize] = &[0, 2, 8];

fn registry() -> Registry {
    let mut builder = StateSchema::builder("bench");
    for name in ["f0", "f1", "f2", "f3", "f4", "f5", "f6", "f7"] {
        builder = builder.mutable(FieldDef::new(
            name,
            FieldCodec::float(-1000.0, 1000.0, 0.01).unwrap(),
        ));
    }
    Registry::builder()
        .register(builder.build().unwrap())
        .build()
        .unwrap()
}

fn states(registry: &Registry, dirty: usize) -> (EntityState, EntityState) {
    let schema = registry.get(TypeTag::new(0)).unwrap();
    let basis = EntityState::new(schema, TypeTag::new(0), EntityId::new(1));
    let mut current = basis.clone();
    for field in schema.mutable.iter().take(dirty) {
        current
            .set(schema, field.name, FieldValue::Float(12.5))
            .unwrap();
    }
    (basis, current)
}

fn encode_records(criterion: &mut Criterion) {
    let registry = registry();
    let mut group = criterion.benchmark_group("delta/encode");
    for dirty in DIRTY_FIELDS {
        let (basis, current) = states(&registry, *dirty);
        group.bench_with_input(BenchmarkId::new("dirty_fields", dirty), dirty, |bencher, _| {
            let mut buffer = BitBuffer::with_capacity(64);
            bencher.iter(|| {
                buffer.clear();
                encode_delta(
                    &registry,
                    black_box(&current),
                    Some(&basis),
                    DeltaFlags::default(),
                    &mut buffer,
                )
                .unwrap()
            });
        });
    }
    group.finish();
}

fn decode_records(criterion: &mut Criterion) {
    let registry = registry();
    let mut group = criterion.benchmark_group("delta/decode");
    for dirty in DIRTY_FIELDS {
        let (basis, current) = states(&registry, *dirty);
        let mut encoded = BitBuffer::new();
        encode_delta(&registry, &current, Some(&basis), DeltaFlags::default(), &mut encoded).unwrap();
        group.bench_with_input(BenchmarkId::new("dirty_fields", dirty), dirty, |bencher, _| {
            bencher.iter(|| {
                let mut buffer = encoded.clone();
                decode_delta(&registry, Some(&basis), black_box(&mut buffer)).unwrap()
            });
        });
    }
    group.finish();
}
