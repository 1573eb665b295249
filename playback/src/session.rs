//! Per-connection driver on the peer side.

use std::collections::BTreeMap;
use std::sync::Arc;

use bitstream::{BitBuffer, PackLimits, PackOutcome};
use codec::{EntityId, IngestReport, RemoteWorld, Tick};
use schema::Registry;
use tracing::{debug, trace};
use wire::{encode_commands, TickedCommand};

use crate::clock::ClockEstimator;
use crate::config::SyncConfig;
use crate::error::{PlaybackError, PlaybackResult};
use crate::object::SyncedObject;
use crate::prediction::{command_buffer, CommandBuffer, Simulation, TimedCommand};
use crate::smoothing::Presentation;

/// Counters since the session was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SessionStats {
    pub packets: u64,
    /// Records dropped for a missing basis.
    pub dropped_records: u64,
    pub reconciliations: u64,
    pub mispredictions: u64,
    pub replayed_ticks: u64,
}

/// Everything one peer needs to play back a host's snapshot stream.
///
/// The application calls [`receive`](Self::receive) for every snapshot
/// packet, [`step`](Self::step) once per local tick with the local input,
/// and [`present`](Self::present) when rendering. All work happens inside
/// these calls on the caller's thread.
pub struct PeerSession<S: Simulation> {
    config: SyncConfig,
    simulation: S,
    clock: ClockEstimator,
    remote: RemoteWorld,
    objects: BTreeMap<EntityId, SyncedObject>,
    commands: CommandBuffer<S::Command>,
    local_tick: Tick,
    playback: Option<Tick>,
    prediction: Option<Tick>,
    stats: SessionStats,
}

impl<S: Simulation> PeerSession<S> {
    pub fn new(registry: Arc<Registry>, simulation: S, config: SyncConfig) -> PlaybackResult<Self> {
        config.validate()?;
        Ok(Self {
            clock: ClockEstimator::new(config.clock),
            remote: RemoteWorld::new(registry, config.dejitter, config.limits),
            objects: BTreeMap::new(),
            commands: command_buffer(config.prediction.command_capacity),
            local_tick: Tick::INVALID,
            playback: None,
            prediction: None,
            stats: SessionStats::default(),
            config,
            simulation,
        })
    }

    #[must_use]
    pub const fn config(&self) -> &SyncConfig {
        &self.config
    }

    #[must_use]
    pub const fn simulation(&self) -> &S {
        &self.simulation
    }

    #[must_use]
    pub const fn clock(&self) -> &ClockEstimator {
        &self.clock
    }

    #[must_use]
    pub const fn remote(&self) -> &RemoteWorld {
        &self.remote
    }

    #[must_use]
    pub const fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Number of [`step`](Self::step) calls so far, as a tick.
    #[must_use]
    pub const fn local_tick(&self) -> Tick {
        self.local_tick
    }

    /// Remote tick being played out for uncontrolled objects.
    #[must_use]
    pub const fn playback_tick(&self) -> Option<Tick> {
        self.playback
    }

    /// Tick local commands are currently stamped with.
    #[must_use]
    pub const fn prediction_tick(&self) -> Option<Tick> {
        self.prediction
    }

    /// Newest snapshot tick received, to acknowledge to the host.
    #[must_use]
    pub const fn ack_tick(&self) -> Option<Tick> {
        self.remote.latest_tick()
    }

    #[must_use]
    pub fn object(&self, entity: EntityId) -> Option<&SyncedObject> {
        self.objects.get(&entity)
    }

    pub fn objects(&self) -> impl Iterator<Item = &SyncedObject> {
        self.objects.values()
    }

    /// Ingests one snapshot packet and feeds its tick to the clock.
    pub fn receive(&mut self, bytes: &[u8]) -> PlaybackResult<IngestReport> {
        let mut buffer = BitBuffer::from_bytes(bytes);
        let report = self.remote.ingest_packet(&mut buffer, self.local_tick)?;
        self.clock.observe(report.tick);
        self.stats.packets += 1;
        self.stats.dropped_records += report.dropped.len() as u64;

        for entity in &report.applied {
            if self.objects.contains_key(entity) {
                continue;
            }
            let Some(record) = self.remote.records(*entity).and_then(|records| records.latest()) else {
                continue;
            };
            debug!(%entity, tick = %record.tick, "object visible");
            let object = SyncedObject::new(
                *entity,
                record.state.type_tag(),
                self.config.smoothing,
                self.config.prediction,
            );
            self.objects.insert(*entity, object);
        }
        Ok(report)
    }

    /// Advances one local tick.
    ///
    /// `command` is the local input for the new prediction tick. Returns the
    /// playback tick, or `None` before the first packet arrived.
    pub fn step(&mut self, command: Option<S::Command>) -> Option<Tick> {
        self.local_tick = self.local_tick.next();
        let playback = self.clock.step();
        self.playback = playback;

        if let Some(latest) = self.clock.latest() {
            let floor = latest + self.config.prediction.lead_ticks;
            let next = self.prediction.map_or(floor, |tick| tick.next().max(floor));
            self.prediction = Some(next);
            if let Some(command) = command {
                self.commands.store(TimedCommand::new(next, command));
            }
        }

        let registry = self.remote.registry().clone();
        for (entity, object) in &mut self.objects {
            let Some(records) = self.remote.records(*entity) else {
                continue;
            };
            let Some(schema) = registry.get(object.type_tag()) else {
                continue;
            };
            match (self.remote.is_controlled(*entity), self.prediction, playback) {
                (true, Some(target), _) => {
                    let outcome = object.predict(schema, records, target, &self.commands, &self.simulation);
                    if let Some(outcome) = outcome {
                        self.stats.reconciliations += 1;
                        self.stats.replayed_ticks += u64::from(outcome.replayed);
                        self.stats.mispredictions += u64::from(outcome.mispredicted);
                    }
                }
                (false, _, Some(playback)) => object.smooth(records, playback),
                _ => {}
            }
        }

        if let Some(playback) = playback {
            for entity in self.remote.prune_destroyed(playback) {
                self.objects.remove(&entity);
                debug!(%entity, %playback, "object removed");
            }
        }
        trace!(local = %self.local_tick, playback = ?playback, prediction = ?self.prediction, "session step");
        playback
    }

    /// What to render for `entity`.
    ///
    /// `alpha` is the fraction of the current local tick that has elapsed.
    pub fn present(&self, entity: EntityId, alpha: f32) -> PlaybackResult<Presentation> {
        let object = self
            .objects
            .get(&entity)
            .ok_or(PlaybackError::UnknownEntity { entity })?;
        let Some(schema) = self.remote.registry().get(object.type_tag()) else {
            return Ok(Presentation::NotReady);
        };
        let now = self
            .playback
            .map_or(0.0, |tick| f64::from(tick.index()) + f64::from(alpha));
        Ok(object.present(schema, now, alpha))
    }

    /// Commands the host has not simulated yet, newest first.
    #[must_use]
    pub fn pending_commands(&self) -> Vec<TickedCommand<S::Command>> {
        let acked = self.remote.latest_tick().unwrap_or(Tick::INVALID);
        let mut pending: Vec<&TimedCommand<S::Command>> = self
            .commands
            .iter()
            .filter(|entry| entry.tick > acked)
            .collect();
        pending.sort_by(|a, b| b.tick.cmp(&a.tick));
        pending
            .into_iter()
            .map(|entry| TickedCommand::new(entry.tick.raw(), entry.command.clone()))
            .collect()
    }

    /// Encodes [`pending_commands`](Self::pending_commands) into a command envelope.
    pub fn outgoing_commands(&self, limits: PackLimits) -> PlaybackResult<(BitBuffer, PackOutcome)> {
        let mut buffer = BitBuffer::new();
        let outcome = encode_commands(&mut buffer, &self.pending_commands(), limits)?;
        Ok((buffer, outcome))
    }
}
