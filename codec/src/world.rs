//! Whole-world snapshots rebuilt from per-object deltas.

use std::collections::BTreeMap;

use schema::Registry;

use crate::delta::dirty_flags;
use crate::record::{EntityState, Timed};
use crate::types::{EntityId, Tick};

/// Every live object's state at one tick.
///
/// Entities are kept sorted by ID so iteration order is deterministic.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WorldSnapshot {
    pub tick: Tick,
    entities: BTreeMap<EntityId, EntityState>,
}

impl WorldSnapshot {
    #[must_use]
    pub fn new(tick: Tick) -> Self {
        Self {
            tick,
            entities: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn get(&self, entity: EntityId) -> Option<&EntityState> {
        self.entities.get(&entity)
    }

    #[must_use]
    pub fn contains(&self, entity: EntityId) -> bool {
        self.entities.contains_key(&entity)
    }

    pub fn insert(&mut self, state: EntityState) -> Option<EntityState> {
        self.entities.insert(state.entity(), state)
    }

    pub fn remove(&mut self, entity: EntityId) -> Option<EntityState> {
        self.entities.remove(&entity)
    }

    pub fn iter(&self) -> impl Iterator<Item = &EntityState> {
        self.entities.values()
    }

    pub fn entity_ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.entities.keys().copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Builds the snapshot at `tick` from this one and the objects that changed.
    ///
    /// Objects absent from `updates` had nothing to send and are carried
    /// forward unchanged. Objects whose update marks them destroyed at or
    /// before `tick` are dropped.
    #[must_use]
    pub fn advance<I>(&self, tick: Tick, updates: I) -> Self
    where
        I: IntoIterator<Item = EntityState>,
    {
        let mut next = Self {
            tick,
            entities: self.entities.clone(),
        };
        for state in updates {
            if state.destroyed_at().is_some_and(|at| at <= tick) {
                next.entities.remove(&state.entity());
            } else {
                next.entities.insert(state.entity(), state);
            }
        }
        next
    }

    /// Entities whose state differs from `other` under each field's change
    /// policy, plus entities present in only one of the two snapshots.
    #[must_use]
    pub fn changed_since(&self, other: &Self, registry: &Registry) -> Vec<EntityId> {
        let mut changed: Vec<EntityId> = self
            .entities
            .iter()
            .filter(|(id, state)| match other.entities.get(id) {
                Some(before) => differs(registry, state, before),
                None => true,
            })
            .map(|(id, _)| *id)
            .collect();
        changed.extend(
            other
                .entities
                .keys()
                .filter(|id| !self.entities.contains_key(id)),
        );
        changed.sort_unstable();
        changed
    }
}

fn differs(registry: &Registry, current: &EntityState, before: &EntityState) -> bool {
    if current.type_tag() != before.type_tag() || current.destroyed_at() != before.destroyed_at() {
        return true;
    }
    registry
        .get(current.type_tag())
        .map_or(true, |schema| !dirty_flags(schema, current, before).is_empty())
}

impl Timed for WorldSnapshot {
    fn tick(&self) -> Tick {
        self.tick
    }
}
