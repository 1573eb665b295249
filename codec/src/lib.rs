//! State records, delta encoding and tick-indexed history for tickline.
//!
//! This is the main codec crate that ties together bitstream, wire, and schema.
//! It turns per-object state into delta records against an acknowledged basis
//! and back, and keeps the tick-indexed history both sides need to do so.
//!
//! # Features
//!
//! - Delta records with per-field dirty masks and epsilon change detection
//! - Dejitter buffers keyed by tick with a monotonic latest value
//! - Authoritative [`HostWorld`] with per-peer scope and packet assembly
//! - [`RemoteWorld`] ingestion with per-object error isolation
//! - World snapshots that carry unchanged objects forward
//! - Reliable, ordered event envelopes
//!
//! # Design Principles
//!
//! - **Correctness first** - Decoders never guess a basis or a default.
//! - **Explicit context** - The type registry is passed in, never global.
//! - **Deterministic** - Same inputs produce same outputs.
//!
//! # Example
//!
//! ```
//! use std::num::{NonZeroU32, NonZeroUsize};
//! use std::sync::Arc;
//!
//! use codec::{DejitterConfig, HostWorld, PeerId, PeerScope, RemoteWorld, Tick};
//! use schema::{FieldCodec, FieldDef, FieldValue, Registry, StateSchema, TypeTag};
//! use wire::PacketLimits;
//!
//! let schema = StateSchema::builder("dot")
//!     .mutable(FieldDef::new("x", FieldCodec::float(-10.0, 10.0, 0.01).unwrap()))
//!     .build()
//!     .unwrap();
//! let registry = Arc::new(Registry::builder().register(schema).build().unwrap());
//!
//! let mut host = HostWorld::new(registry.clone(), NonZeroU32::MIN, NonZeroUsize::new(16).unwrap());
//! let dot = host.spawn(TypeTag::new(0)).unwrap();
//! host.set(dot, "x", FieldValue::Float(2.5)).unwrap();
//! host.commit();
//!
//! let mut scope = PeerScope::new(PeerId::new(1));
//! let packet = host.build_packet(&mut scope, &PacketLimits::default()).unwrap();
//!
//! let mut remote = RemoteWorld::new(registry, DejitterConfig::default(), PacketLimits::default());
//! let mut bytes = bitstream::BitBuffer::from_bytes(&packet.buffer.to_bytes());
//! let report = remote.ingest_packet(&mut bytes, Tick::START).unwrap();
//! assert_eq!(report.applied, vec![dot]);
//! ```

mod dejitter;
mod delta;
mod error;
mod field;
mod host;
mod inbound;
mod record;
mod reliable;
mod types;
mod world;

pub use dejitter::{DejitterBuffer, DejitterConfig, Stored};
pub use delta::{
    decode_delta, decode_record_body, dirty_flags, encode_delta, DecodedDelta, DeltaFlags,
    DirtyMask,
};
pub use error::{CodecError, CodecResult};
pub use host::{EncodedDelta, HostWorld, OutgoingPacket, PeerScope};
pub use inbound::{IngestReport, Ingested, RemoteWorld};
pub use record::{EntityState, StateRecord, Timed};
pub use reliable::{EventReceiver, EventSender, MAX_PENDING_EVENTS};
pub use types::{EntityId, PeerId, SequenceId, Tick};
pub use world::WorldSnapshot;
