//! Peer-side playback for tickline: clock estimation, smoothing and prediction.
//!
//! A [`PeerSession`] owns everything one connection needs. Snapshot packets
//! go into [`PeerSession::receive`], which buffers records per object and
//! feeds the [`ClockEstimator`]. Each local tick [`PeerSession::step`] moves
//! the playback tick, smooths remote objects around it and predicts the
//! objects this peer controls ahead of the host.
//!
//! # Features
//!
//! - Playback clock with normal, catch-up, stall and hard reset regimes
//! - Interpolation with bounded extrapolation for remote objects
//! - Deterministic prediction with replay on every authoritative update
//! - One [`blend`] function driven by each field's interpolation policy
//!
//! # Example
//!
//! ```
//! use std::num::{NonZeroU32, NonZeroUsize};
//! use std::sync::Arc;
//!
//! use codec::{EntityState, HostWorld, PeerId, PeerScope};
//! use playback::{PeerSession, Simulation, SyncConfig};
//! use schema::{FieldCodec, FieldDef, FieldValue, Registry, StateSchema, TypeTag};
//! use wire::PacketLimits;
//!
//! struct Idle;
//!
//! impl Simulation for Idle {
//!     type Command = u32;
//!     fn step(&self, _state: &mut EntityState, _command: Option<&u32>) {}
//! }
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
//! let mut scope = PeerScope::new(PeerId::new(1));
//! let packet = host.build_packet(&mut scope, &PacketLimits::default()).unwrap();
//!
//! let mut session = PeerSession::new(registry, Idle, SyncConfig::default()).unwrap();
//! session.receive(&packet.buffer.to_bytes()).unwrap();
//! session.step(None);
//! assert!(session.present(dot, 0.0).unwrap().is_ready());
//! ```

mod blend;
mod clock;
mod config;
mod error;
mod object;
mod prediction;
mod session;
mod smoothing;

pub use blend::{blend, blend_field};
pub use clock::{ClockEstimator, ClockRegime, ClockStats};
pub use config::{ClockConfig, PredictionConfig, SmoothingConfig, SyncConfig};
pub use error::{PlaybackError, PlaybackResult};
pub use object::{ObjectMode, SyncedObject};
pub use prediction::{
    command_buffer, CommandBuffer, Predictor, Reconciliation, Simulation, TimedCommand,
};
pub use session::{PeerSession, SessionStats};
pub use smoothing::{Presentation, Smoother};
