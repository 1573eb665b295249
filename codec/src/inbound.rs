//! Receiving side: per-object record buffers fed from snapshot packets.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use bitstream::BitBuffer;
use schema::Registry;
use tracing::{debug, trace, warn};
use wire::{decode_packet, DeltaFrame, PacketLimits, RecordHeader};

use crate::dejitter::{DejitterBuffer, DejitterConfig, Stored};
use crate::delta::decode_record_body;
use crate::error::{CodecError, CodecResult};
use crate::record::{EntityState, StateRecord};
use crate::types::{EntityId, Tick};
use crate::world::WorldSnapshot;

/// Result of ingesting one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ingested {
    pub entity: EntityId,
    /// `false` when a newer record already occupies the slot.
    pub stored: bool,
    pub destroyed: bool,
    /// The record carried controller data for this peer.
    pub controlled: bool,
}

/// Summary of one ingested packet.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct IngestReport {
    pub tick: Tick,
    /// Objects whose record was stored.
    pub applied: Vec<EntityId>,
    /// Objects whose record arrived after a newer one.
    pub stale: Vec<EntityId>,
    /// Objects reported destroyed in this packet.
    pub destroyed: Vec<EntityId>,
    /// Records dropped without aborting the packet.
    pub dropped: Vec<CodecError>,
    /// Objects the packet left out, stored unchanged at its tick.
    pub carried: Vec<EntityId>,
}

/// A peer's copy of the host world.
///
/// Holds a dejitter buffer of decoded records per object, which doubles as
/// the pool of bases for decoding later deltas, and the newest complete
/// world snapshot.
#[derive(Debug, Clone)]
pub struct RemoteWorld {
    registry: Arc<Registry>,
    config: DejitterConfig,
    limits: PacketLimits,
    objects: BTreeMap<EntityId, DejitterBuffer<StateRecord>>,
    control: BTreeMap<EntityId, (Tick, bool)>,
    world: WorldSnapshot,
    latest_tick: Option<Tick>,
}

impl RemoteWorld {
    #[must_use]
    pub fn new(registry: Arc<Registry>, config: DejitterConfig, limits: PacketLimits) -> Self {
        Self {
            registry,
            config,
            limits,
            objects: BTreeMap::new(),
            control: BTreeMap::new(),
            world: WorldSnapshot::default(),
            latest_tick: None,
        }
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Newest packet tick received.
    #[must_use]
    pub const fn latest_tick(&self) -> Option<Tick> {
        self.latest_tick
    }

    /// The newest complete world view.
    #[must_use]
    pub const fn world(&self) -> &WorldSnapshot {
        &self.world
    }

    /// Records buffered for one object.
    #[must_use]
    pub fn records(&self, entity: EntityId) -> Option<&DejitterBuffer<StateRecord>> {
        self.objects.get(&entity)
    }

    pub fn entities(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.objects.keys().copied()
    }

    /// Whether the newest record of `entity` said this peer controls it.
    #[must_use]
    pub fn is_controlled(&self, entity: EntityId) -> bool {
        self.control.get(&entity).is_some_and(|(_, controlled)| *controlled)
    }

    /// Decodes one frame of the packet produced at `tick` and buffers it.
    ///
    /// The header is read first to find the entity, then the basis is looked
    /// up in that entity's buffer. A basis that is not held is reported as
    /// [`CodecError::MissingBasis`]; nothing is guessed.
    pub fn ingest_delta(
        &mut self,
        frame: &DeltaFrame,
        tick: Tick,
        arrival: Tick,
    ) -> CodecResult<Ingested> {
        let mut payload = frame.payload.clone();
        let header = RecordHeader::decode(&mut payload, frame.has_basis(), self.registry.type_tag_bits())?;
        let entity = EntityId::new(header.entity);

        let basis = if frame.has_basis() {
            let basis_tick = Tick::from_raw(frame.basis_tick);
            let found = self
                .objects
                .get(&entity)
                .and_then(|records| records.get(basis_tick));
            match found {
                Some(record) => Some(&record.state),
                None => {
                    warn!(%entity, basis = %basis_tick, %tick, "dropping delta with missing basis");
                    return Err(CodecError::MissingBasis { entity, basis_tick });
                }
            }
        } else {
            None
        };

        let decoded = decode_record_body(&self.registry, header, basis, &mut payload)?;
        let destroyed = decoded.state.is_destroyed();
        let controlled = header.is_controller;
        let control = self.control.entry(entity).or_insert((tick, controlled));
        if control.0 <= tick {
            *control = (tick, controlled);
        }
        let record = StateRecord {
            tick,
            arrival: Some(arrival),
            state: decoded.state,
        };

        let config = self.config;
        let records = self
            .objects
            .entry(entity)
            .or_insert_with(|| DejitterBuffer::with_config(config));
        let stored = match records.store(record) {
            Stored::Rejected(_) => {
                debug!(%entity, %tick, "stale record rejected");
                false
            }
            Stored::Inserted | Stored::Replaced(_) => true,
        };
        trace!(%entity, %tick, mask = decoded.mask.bits(), stored, "ingested");
        Ok(Ingested {
            entity,
            stored,
            destroyed,
            controlled,
        })
    }

    /// Decodes a snapshot packet and ingests every frame.
    ///
    /// Structural errors abort the packet and are returned. Per-object errors
    /// are collected in the report and the remaining frames are still applied.
    pub fn ingest_packet(&mut self, buffer: &mut BitBuffer, arrival: Tick) -> CodecResult<IngestReport> {
        let packet = decode_packet(buffer, &self.limits)?;
        let tick = Tick::from_raw(packet.tick).valid().ok_or(CodecError::InvalidTick)?;

        let mut report = IngestReport {
            tick,
            ..IngestReport::default()
        };
        let mut sent = BTreeSet::new();
        for frame in &packet.frames {
            match self.ingest_delta(frame, tick, arrival) {
                Ok(ingested) => {
                    sent.insert(ingested.entity);
                    if ingested.stored {
                        report.applied.push(ingested.entity);
                    } else {
                        report.stale.push(ingested.entity);
                    }
                    if ingested.destroyed {
                        report.destroyed.push(ingested.entity);
                    }
                }
                Err(err) if err.is_per_object() => {
                    if let CodecError::MissingBasis { entity, .. } = err {
                        sent.insert(entity);
                    }
                    report.dropped.push(err);
                }
                Err(err) => return Err(err),
            }
        }
        report.carried = self.carry_forward(tick, arrival, &sent);

        if self.latest_tick.map_or(true, |latest| tick > latest) {
            self.latest_tick = Some(tick);
        }
        if tick > self.world.tick {
            let updates: Vec<EntityState> = report
                .applied
                .iter()
                .filter_map(|entity| self.objects.get(entity)?.get(tick))
                .map(|record| record.state.clone())
                .collect();
            self.world = self.world.advance(tick, updates);
        }
        Ok(report)
    }

    /// Stores an unchanged copy at `tick` of every live object the packet
    /// left out.
    ///
    /// The host omits objects that did not change since the basis this peer
    /// acknowledged, so each buffer gets a record at every packet tick. Only
    /// objects whose newest record is older than `tick` are carried.
    fn carry_forward(&mut self, tick: Tick, arrival: Tick, sent: &BTreeSet<EntityId>) -> Vec<EntityId> {
        let mut carried = Vec::new();
        for (entity, records) in &mut self.objects {
            if sent.contains(entity) {
                continue;
            }
            let state = match records.latest() {
                Some(latest) if latest.tick < tick && !latest.state.is_destroyed() => latest.state.clone(),
                _ => continue,
            };
            records.store(StateRecord {
                tick,
                arrival: Some(arrival),
                state,
            });
            carried.push(*entity);
        }
        if !carried.is_empty() {
            trace!(%tick, carried = carried.len(), "carried unchanged objects forward");
        }
        carried
    }

    /// Removes objects destroyed before `tick` and returns them.
    pub fn prune_destroyed(&mut self, tick: Tick) -> Vec<EntityId> {
        let expired: Vec<EntityId> = self
            .objects
            .iter()
            .filter(|(_, records)| {
                records
                    .latest()
                    .and_then(|record| record.state.destroyed_at())
                    .is_some_and(|at| at < tick)
            })
            .map(|(entity, _)| *entity)
            .collect();
        for entity in &expired {
            self.objects.remove(entity);
            self.control.remove(entity);
            self.world.remove(*entity);
        }
        expired
    }
}
