use std::num::{NonZeroU32, NonZeroUsize};
use std::sync::Arc;

use bitstream::BitBuffer;
use codec::{DejitterConfig, EntityId, HostWorld, PeerId, PeerScope, RemoteWorld, Tick};
use schema::{FieldCodec, FieldDef, FieldValue, Registry, StateSchema, TypeTag};
use wire::PacketLimits;

fn registry() -> Arc<Registry> {
    let mover = StateSchema::builder("mover")
        .immutable(FieldDef::new("color", FieldCodec::uint(3)))
        .mutable(FieldDef::new("x", FieldCodec::float(-64.0, 64.0, 0.01).unwrap()))
        .mutable(FieldDef::new("y", FieldCodec::float(-64.0, 64.0, 0.01).unwrap()))
        .controller(FieldDef::new("boost", FieldCodec::uint(4)))
        .build()
        .unwrap();
    let marker = StateSchema::builder("marker")
        .mutable(FieldDef::new("label", FieldCodec::var_uint()))
        .build()
        .unwrap();
    Arc::new(
        Registry::builder()
            .register(mover)
            .register(marker)
            .build()
            .unwrap(),
    )
}

fn host(registry: Arc<Registry>) -> HostWorld {
    HostWorld::new(
        registry,
        NonZeroU32::new(1).unwrap(),
        NonZeroUsize::new(16).unwrap(),
    )
}

fn remote(registry: Arc<Registry>) -> RemoteWorld {
    let config = DejitterConfig::new(NonZeroUsize::new(32).unwrap(), NonZeroU32::new(1).unwrap());
    RemoteWorld::new(registry, config, PacketLimits::default())
}

fn deliver(remote: &mut RemoteWorld, scope: &mut PeerScope, tick: Tick, bytes: &[u8], arrival: Tick) {
    let mut buffer = BitBuffer::from_bytes(bytes);
    let report = remote.ingest_packet(&mut buffer, arrival).unwrap();
    assert!(report.dropped.is_empty(), "dropped: {:?}", report.dropped);
    scope.ack(tick);
}

fn move_to(host: &mut HostWorld, entity: EntityId, step: u32, phase: f32) {
    let t = step as f32 * 0.37 + phase;
    host.set(entity, "x", FieldValue::Float(t.sin() * 20.0)).unwrap();
    host.set(entity, "y", FieldValue::Float(t.cos() * 20.0)).unwrap();
}

#[test]
fn lossy_reordered_stream_converges() {
    let registry = registry();
    let mut host = host(registry.clone());
    let mut remote = remote(registry);
    let peer = PeerId::new(1);
    let mut scope = PeerScope::new(peer);
    let limits = PacketLimits::default();

    let a = host.spawn(TypeTag::new(0)).unwrap();
    let b = host.spawn(TypeTag::new(0)).unwrap();
    let c = host.spawn(TypeTag::new(0)).unwrap();
    let marker = host.spawn(TypeTag::new(1)).unwrap();
    host.set(a, "color", FieldValue::UInt(5)).unwrap();
    host.set(marker, "label", FieldValue::UInt(900)).unwrap();
    host.set_controller(a, Some(peer)).unwrap();

    let mut held: Option<(Tick, Vec<u8>)> = None;
    for step in 0..60u32 {
        move_to(&mut host, a, step, 0.0);
        move_to(&mut host, b, step, 1.0);
        if host.contains(c) {
            move_to(&mut host, c, step, 2.0);
        }
        host.set(a, "boost", FieldValue::UInt(step % 16)).unwrap();
        if step == 30 {
            host.destroy(c).unwrap();
        }

        assert!(host.commit());
        let packet = host.build_packet(&mut scope, &limits).unwrap();
        assert!(packet.deferred.is_empty());
        let bytes = packet.buffer.to_bytes();
        let arrival = host.tick();

        if step % 5 == 3 {
            // lost
        } else if step % 7 == 2 {
            held = Some((packet.tick, bytes));
            continue;
        } else {
            deliver(&mut remote, &mut scope, packet.tick, &bytes, arrival);
        }
        if let Some((tick, late)) = held.take() {
            deliver(&mut remote, &mut scope, tick, &late, arrival);
        }

        for entity in host.advance() {
            scope.forget(entity);
        }
    }

    let world = remote.world();
    assert!(!world.contains(c));
    for entity in [a, b, marker] {
        let expected = &host.history(entity).unwrap().latest().unwrap().state;
        assert_eq!(world.get(entity), Some(expected), "entity {entity}");
    }
}

#[test]
fn controller_data_reaches_controlling_peer_only() {
    let registry = registry();
    let mut host = host(registry.clone());
    let owner = PeerId::new(1);
    let other = PeerId::new(2);
    let a = host.spawn(TypeTag::new(0)).unwrap();
    host.set_controller(a, Some(owner)).unwrap();
    host.set(a, "boost", FieldValue::UInt(9)).unwrap();
    host.commit();

    let schema = registry.get(TypeTag::new(0)).unwrap();
    for (peer, expected) in [(owner, 9), (other, 0)] {
        let mut scope = PeerScope::new(peer);
        let mut remote = remote(registry.clone());
        let packet = host.build_packet(&mut scope, &PacketLimits::default()).unwrap();
        let mut buffer = BitBuffer::from_bytes(&packet.buffer.to_bytes());
        remote.ingest_packet(&mut buffer, Tick::START).unwrap();
        let state = remote.world().get(a).unwrap();
        assert_eq!(state.get(schema, "boost"), Some(FieldValue::UInt(expected)));
    }
}

#[test]
fn tight_limits_defer_objects() {
    let registry = registry();
    let mut host = host(registry.clone());
    for _ in 0..40 {
        host.spawn(TypeTag::new(0)).unwrap();
    }
    host.commit();

    let mut scope = PeerScope::new(PeerId::new(1));
    let limits = PacketLimits::new(400, 200);
    let packet = host.build_packet(&mut scope, &limits).unwrap();
    assert!(!packet.entities.is_empty());
    assert!(!packet.deferred.is_empty());
    assert_eq!(packet.entities.len() + packet.deferred.len(), 40);
    assert!(packet.buffer.bits_written() <= 400);

    let mut remote = remote(registry);
    let mut buffer = BitBuffer::from_bytes(&packet.buffer.to_bytes());
    let report = remote.ingest_packet(&mut buffer, Tick::START).unwrap();
    assert_eq!(report.applied, packet.entities);
}
