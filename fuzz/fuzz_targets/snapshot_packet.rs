#![no_main]

use std::num::{NonZeroU32, NonZeroUsize};
use std::sync::Arc;

use bitstream::BitBuffer;
use codec::{DejitterConfig, RemoteWorld, Tick};
use libfuzzer_sys::fuzz_target;
use schema::{FieldCodec, FieldDef, Registry, StateSchema};
use wire::PacketLimits;

fn registry() -> Registry {
    let ball = StateSchema::builder("ball")
        .immutable(FieldDef::new("team", FieldCodec::uint(2)))
        .mutable(FieldDef::new("x", FieldCodec::float(-64.0, 64.0, 0.1).unwrap()))
        .mutable(FieldDef::new("live", FieldCodec::bool()))
        .controller(FieldDef::new("spin", FieldCodec::var_int()))
        .build()
        .unwrap();
    let flag = StateSchema::builder("flag")
        .mutable(FieldDef::new("owner", FieldCodec::var_uint()))
        .build()
        .unwrap();
    Registry::builder().register(ball).register(flag).build().unwrap()
}

fuzz_target!(|data: &[u8]| {
    let config = DejitterConfig::new(NonZeroUsize::new(16).unwrap(), NonZeroU32::MIN);
    let mut world = RemoteWorld::new(Arc::new(registry()), config, PacketLimits::default());

    // Split the input into frames so later packets can delta against earlier ones.
    let mut idx = 0usize;
    let mut arrival = Tick::START;
    while idx < data.len() && idx < 4096 {
        let len = (data[idx] as usize % 120).saturating_add(1);
        idx += 1;
        let end = (idx + len).min(data.len());
        let mut buffer = BitBuffer::from_bytes(&data[idx..end]);
        idx = end;
        let _ = world.ingest_packet(&mut buffer, arrival);
        arrival = arrival.next();
    }
    if let Some(latest) = world.latest_tick() {
        let _ = world.prune_destroyed(latest);
    }
});
