//! Authoritative host state, history and per-peer packet assembly.

use std::collections::BTreeMap;
use std::num::{NonZeroU32, NonZeroUsize};
use std::sync::Arc;

use bitstream::BitBuffer;
use schema::{FieldGroup, Registry, StateSchema, TypeTag};
use tracing::{debug, trace};
use wire::{encode_packet, DeltaFrame, PacketLimits};

use crate::dejitter::{DejitterBuffer, DejitterConfig};
use crate::delta::{dirty_flags, encode_delta, DeltaFlags, DirtyMask};
use crate::error::{CodecError, CodecResult};
use crate::record::{EntityState, StateRecord};
use crate::types::{EntityId, PeerId, Tick};

/// One object's record encoded for one peer.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedDelta {
    pub entity: EntityId,
    /// Tick of the encoded state.
    pub tick: Tick,
    /// Basis the record was encoded against; `None` for a full record.
    pub basis_tick: Option<Tick>,
    pub mask: DirtyMask,
    pub payload: BitBuffer,
}

impl EncodedDelta {
    #[must_use]
    pub fn to_frame(&self) -> DeltaFrame {
        DeltaFrame::new(
            self.basis_tick.map_or(Tick::INVALID, |tick| tick).raw(),
            self.payload.clone(),
        )
    }

    #[must_use]
    pub fn into_frame(self) -> DeltaFrame {
        DeltaFrame::new(
            self.basis_tick.map_or(Tick::INVALID, |tick| tick).raw(),
            self.payload,
        )
    }
}

/// What the host knows about one peer's view of the world.
///
/// The transport calls [`ack`](Self::ack) when a packet is confirmed
/// delivered. Records acknowledged by the peer become the basis for the next
/// delta of that object.
#[derive(Debug, Clone)]
pub struct PeerScope {
    peer: PeerId,
    acked: BTreeMap<EntityId, Tick>,
    sent: BTreeMap<Tick, Vec<EntityId>>,
}

impl PeerScope {
    #[must_use]
    pub fn new(peer: PeerId) -> Self {
        Self {
            peer,
            acked: BTreeMap::new(),
            sent: BTreeMap::new(),
        }
    }

    #[must_use]
    pub const fn peer(&self) -> PeerId {
        self.peer
    }

    /// Newest tick of `entity` the peer is known to hold.
    #[must_use]
    pub fn acked(&self, entity: EntityId) -> Option<Tick> {
        self.acked.get(&entity).copied()
    }

    /// Number of sent packets awaiting acknowledgement.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.sent.len()
    }

    fn record_sent(&mut self, tick: Tick, entities: Vec<EntityId>) {
        if !entities.is_empty() {
            self.sent.insert(tick, entities);
        }
    }

    /// Marks the packet sent at `tick` as delivered.
    ///
    /// Older unacknowledged packets are forgotten; their objects are covered
    /// by the newer acknowledgement or resent against an older basis.
    pub fn ack(&mut self, tick: Tick) {
        let Some(entities) = self.sent.remove(&tick) else {
            trace!(peer = self.peer.raw(), %tick, "ack for unknown packet");
            return;
        };
        for entity in entities {
            let acked = self.acked.entry(entity).or_insert(tick);
            if *acked < tick {
                *acked = tick;
            }
        }
        self.sent.retain(|sent, _| *sent > tick);
    }

    /// Drops everything known about `entity`.
    pub fn forget(&mut self, entity: EntityId) {
        self.acked.remove(&entity);
        for entities in self.sent.values_mut() {
            entities.retain(|e| *e != entity);
        }
    }
}

/// A packet assembled for one peer.
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingPacket {
    pub tick: Tick,
    pub buffer: BitBuffer,
    /// Objects included in the packet.
    pub entities: Vec<EntityId>,
    /// Objects that needed sending but did not fit.
    pub deferred: Vec<EntityId>,
}

#[derive(Debug, Clone)]
struct HostObject {
    state: EntityState,
    controller: Option<PeerId>,
    history: DejitterBuffer<StateRecord>,
}

/// The authoritative side of replication.
///
/// Owns every object's live state, snapshots it into per-object history on
/// send ticks and encodes deltas against whatever basis each peer has
/// acknowledged.
#[derive(Debug, Clone)]
pub struct HostWorld {
    registry: Arc<Registry>,
    tick: Tick,
    send_rate: NonZeroU32,
    history: DejitterConfig,
    last_commit: Option<Tick>,
    next_entity: u32,
    objects: BTreeMap<EntityId, HostObject>,
}

impl HostWorld {
    /// Creates an empty world at [`Tick::START`].
    ///
    /// History keeps `history_capacity` send ticks per object.
    #[must_use]
    pub fn new(registry: Arc<Registry>, send_rate: NonZeroU32, history_capacity: NonZeroUsize) -> Self {
        Self {
            registry,
            tick: Tick::START,
            send_rate,
            history: DejitterConfig::new(history_capacity, send_rate),
            last_commit: None,
            next_entity: 1,
            objects: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    #[must_use]
    pub const fn tick(&self) -> Tick {
        self.tick
    }

    #[must_use]
    pub const fn send_rate(&self) -> NonZeroU32 {
        self.send_rate
    }

    /// Ticks covered by each object's history.
    #[must_use]
    pub const fn history_window(&self) -> u64 {
        self.history.window_ticks()
    }

    /// Tick of the most recent [`commit`](Self::commit) that recorded history.
    #[must_use]
    pub const fn last_commit(&self) -> Option<Tick> {
        self.last_commit
    }

    /// Creates an object of the given type with default field values.
    pub fn spawn(&mut self, type_tag: TypeTag) -> CodecResult<EntityId> {
        let schema = self
            .registry
            .get(type_tag)
            .ok_or(CodecError::UnknownType { tag: type_tag.get() })?;
        let entity = EntityId::new(self.next_entity);
        self.next_entity += 1;
        self.objects.insert(
            entity,
            HostObject {
                state: EntityState::new(schema, type_tag, entity),
                controller: None,
                history: DejitterBuffer::with_config(self.history),
            },
        );
        debug!(%entity, kind = schema.name, "spawned");
        Ok(entity)
    }

    #[must_use]
    pub fn contains(&self, entity: EntityId) -> bool {
        self.objects.contains_key(&entity)
    }

    pub fn entities(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.objects.keys().copied()
    }

    #[must_use]
    pub fn state(&self, entity: EntityId) -> Option<&EntityState> {
        self.objects.get(&entity).map(|object| &object.state)
    }

    /// Mutable access to an object's live state.
    pub fn state_mut(&mut self, entity: EntityId) -> Option<&mut EntityState> {
        self.objects.get_mut(&entity).map(|object| &mut object.state)
    }

    /// Schema of an object.
    #[must_use]
    pub fn schema_of(&self, entity: EntityId) -> Option<&StateSchema> {
        let object = self.objects.get(&entity)?;
        self.registry.get(object.state.type_tag())
    }

    /// Writes one field of an object's live state.
    pub fn set(&mut self, entity: EntityId, field: &str, value: schema::FieldValue) -> CodecResult<()> {
        let object = self
            .objects
            .get_mut(&entity)
            .ok_or(CodecError::UnknownEntity { entity })?;
        let schema = self
            .registry
            .get(object.state.type_tag())
            .ok_or(CodecError::UnknownType {
                tag: object.state.type_tag().get(),
            })?;
        object.state.set(schema, field, value)
    }

    /// Assigns the peer that controls an object, or clears it.
    pub fn set_controller(&mut self, entity: EntityId, peer: Option<PeerId>) -> CodecResult<()> {
        let object = self
            .objects
            .get_mut(&entity)
            .ok_or(CodecError::UnknownEntity { entity })?;
        object.controller = peer;
        Ok(())
    }

    #[must_use]
    pub fn controller(&self, entity: EntityId) -> Option<PeerId> {
        self.objects.get(&entity).and_then(|object| object.controller)
    }

    /// Marks an object destroyed at the current tick.
    ///
    /// The object keeps replicating its destroyed state until it ages out of
    /// history, so peers that miss the first notice still learn about it.
    pub fn destroy(&mut self, entity: EntityId) -> CodecResult<()> {
        let tick = self.tick;
        let object = self
            .objects
            .get_mut(&entity)
            .ok_or(CodecError::UnknownEntity { entity })?;
        if !object.state.is_destroyed() {
            object.state.set_destroyed_at(Some(tick));
            debug!(%entity, %tick, "destroyed");
        }
        Ok(())
    }

    /// Records every object's state into history if this is a send tick.
    ///
    /// States are stored as the peer will decode them, so later deltas are
    /// computed against exactly what the peer holds.
    pub fn commit(&mut self) -> bool {
        if !self.tick.is_send_tick(self.send_rate.get()) {
            return false;
        }
        for object in self.objects.values_mut() {
            let Some(schema) = self.registry.get(object.state.type_tag()) else {
                continue;
            };
            let record = StateRecord::new(self.tick, object.state.quantized(schema));
            object.history.store(record);
        }
        self.last_commit = Some(self.tick);
        true
    }

    /// Moves to the next tick and removes destroyed objects whose history
    /// window has passed. Returns the removed objects.
    pub fn advance(&mut self) -> Vec<EntityId> {
        self.tick = self.tick.next();
        let window = self.history.window_ticks();
        let now = self.tick;
        let expired: Vec<EntityId> = self
            .objects
            .iter()
            .filter(|(_, object)| {
                object
                    .state
                    .destroyed_at()
                    .is_some_and(|at| u64::from(now.index() - at.index().min(now.index())) >= window)
            })
            .map(|(entity, _)| *entity)
            .collect();
        for entity in &expired {
            self.objects.remove(entity);
            trace!(%entity, "pruned");
        }
        expired
    }

    /// History of an object.
    #[must_use]
    pub fn history(&self, entity: EntityId) -> Option<&DejitterBuffer<StateRecord>> {
        self.objects.get(&entity).map(|object| &object.history)
    }

    /// Encodes the newest committed record of `entity` for `peer`.
    ///
    /// When `basis_tick` is no longer in history the record is sent in full
    /// with immutable data, as on first contact.
    pub fn produce_delta(
        &self,
        entity: EntityId,
        peer: PeerId,
        basis_tick: Option<Tick>,
    ) -> CodecResult<EncodedDelta> {
        let object = self
            .objects
            .get(&entity)
            .ok_or(CodecError::UnknownEntity { entity })?;
        let current = object.history.latest().ok_or(CodecError::NoRecord {
            entity,
            tick: self.tick,
        })?;

        let basis = basis_tick.and_then(|tick| {
            let found = object.history.get(tick).filter(|_| tick < current.tick);
            if found.is_none() {
                debug!(%entity, basis = %tick, "basis left history, sending full record");
            }
            found
        });
        let flags = DeltaFlags {
            include_controller: object.controller == Some(peer),
            include_immutable: basis.is_none(),
        };

        let mut payload = BitBuffer::new();
        let mask = encode_delta(
            &self.registry,
            &current.state,
            basis.map(|record| &record.state),
            flags,
            &mut payload,
        )?;
        Ok(EncodedDelta {
            entity,
            tick: current.tick,
            basis_tick: basis.map(|record| record.tick),
            mask,
            payload,
        })
    }

    /// Assembles the packet for `scope` at the last committed tick.
    ///
    /// Objects the peer has never acknowledged go first, then objects in order
    /// of how stale their acknowledged basis is. Objects unchanged since the
    /// basis are skipped until the basis reaches half the history window,
    /// after which a refresh is sent so the basis never ages out.
    pub fn build_packet(
        &self,
        scope: &mut PeerScope,
        limits: &PacketLimits,
    ) -> CodecResult<OutgoingPacket> {
        let tick = self.last_commit.ok_or(CodecError::InvalidTick)?;
        let keepalive = self.history.window_ticks() / 2;

        let mut candidates: Vec<(Tick, EntityId)> = Vec::new();
        for (entity, object) in &self.objects {
            let Some(current) = object.history.get(tick) else {
                continue;
            };
            let basis = scope
                .acked(*entity)
                .and_then(|acked| object.history.get(acked));
            let needs_send = match basis {
                None => true,
                Some(basis) => {
                    u64::from(tick.index().saturating_sub(basis.tick.index())) >= keepalive
                        || self.changed(&current.state, &basis.state)
                }
            };
            if needs_send {
                candidates.push((basis.map_or(Tick::INVALID, |b| b.tick), *entity));
            }
        }
        candidates.sort_unstable();

        let mut frames = Vec::with_capacity(candidates.len());
        for (basis, entity) in &candidates {
            let delta = self.produce_delta(*entity, scope.peer(), basis.valid())?;
            frames.push(delta.into_frame());
        }
        let (buffer, outcome) = encode_packet(tick.raw(), &frames, limits)?;

        let entities: Vec<EntityId> = outcome.packed.iter().map(|&i| candidates[i].1).collect();
        let deferred: Vec<EntityId> = outcome.skipped.iter().map(|&i| candidates[i].1).collect();
        if !deferred.is_empty() {
            debug!(
                peer = scope.peer().raw(),
                sent = entities.len(),
                deferred = deferred.len(),
                "packet full"
            );
        }
        scope.record_sent(tick, entities.clone());
        Ok(OutgoingPacket {
            tick,
            buffer,
            entities,
            deferred,
        })
    }

    fn changed(&self, current: &EntityState, basis: &EntityState) -> bool {
        if current.destroyed_at() != basis.destroyed_at()
            || current.fields(FieldGroup::Controller) != basis.fields(FieldGroup::Controller)
        {
            return true;
        }
        self.registry
            .get(current.type_tag())
            .map_or(true, |schema| !dirty_flags(schema, current, basis).is_empty())
    }
}
