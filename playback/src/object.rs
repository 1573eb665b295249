//! Per-object playback state.

use codec::{DejitterBuffer, EntityId, StateRecord, Tick};
use schema::{StateSchema, TypeTag};
use tracing::debug;

use crate::config::{PredictionConfig, SmoothingConfig};
use crate::prediction::{CommandBuffer, Predictor, Reconciliation, Simulation};
use crate::smoothing::{Presentation, Smoother};

/// Whether an object is replayed from the host or simulated locally.
#[derive(Debug, Clone)]
pub enum ObjectMode {
    Smoothing(Smoother),
    Predicting(Predictor),
}

/// One replicated object as seen by a peer.
///
/// Remote objects are smoothed between authoritative records around the
/// playback tick. Objects the peer controls are predicted ahead of the host
/// and rebased whenever a newer authoritative record arrives.
#[derive(Debug, Clone)]
pub struct SyncedObject {
    entity: EntityId,
    type_tag: TypeTag,
    smoothing: SmoothingConfig,
    prediction: PredictionConfig,
    mode: ObjectMode,
}

impl SyncedObject {
    #[must_use]
    pub const fn new(
        entity: EntityId,
        type_tag: TypeTag,
        smoothing: SmoothingConfig,
        prediction: PredictionConfig,
    ) -> Self {
        Self {
            entity,
            type_tag,
            smoothing,
            prediction,
            mode: ObjectMode::Smoothing(Smoother::new(smoothing)),
        }
    }

    #[must_use]
    pub const fn entity(&self) -> EntityId {
        self.entity
    }

    #[must_use]
    pub const fn type_tag(&self) -> TypeTag {
        self.type_tag
    }

    #[must_use]
    pub const fn mode(&self) -> &ObjectMode {
        &self.mode
    }

    #[must_use]
    pub const fn is_predicted(&self) -> bool {
        matches!(self.mode, ObjectMode::Predicting(_))
    }

    /// Advances a remote object to `playback`.
    pub fn smooth(&mut self, records: &DejitterBuffer<StateRecord>, playback: Tick) {
        if self.is_predicted() {
            debug!(entity = %self.entity, "leaving prediction");
            self.mode = ObjectMode::Smoothing(Smoother::new(self.smoothing));
        }
        if let ObjectMode::Smoothing(smoother) = &mut self.mode {
            smoother.update(records, playback);
        }
    }

    /// Advances a controlled object to the prediction tick `target`.
    ///
    /// On entering prediction the newest authoritative record is simulated
    /// forward to `target`. Afterwards each newer authoritative record is
    /// reconciled before stepping on. Does nothing until a record exists.
    pub fn predict<S: Simulation>(
        &mut self,
        schema: &StateSchema,
        records: &DejitterBuffer<StateRecord>,
        target: Tick,
        commands: &CommandBuffer<S::Command>,
        simulation: &S,
    ) -> Option<Reconciliation> {
        let auth = records.latest()?;
        match &mut self.mode {
            ObjectMode::Predicting(predictor) => {
                let outcome = predictor.reconcile(schema, auth, commands, simulation);
                predictor.advance_to(target, commands, simulation);
                outcome
            }
            ObjectMode::Smoothing(_) => {
                debug!(entity = %self.entity, auth = %auth.tick, %target, "entering prediction");
                let mut predictor = Predictor::new(self.prediction.command_capacity);
                predictor.enter(auth, target, commands, simulation);
                self.mode = ObjectMode::Predicting(predictor);
                None
            }
        }
    }

    /// What to render.
    ///
    /// `now` is the playback time in ticks and places remote objects;
    /// `alpha` is the fraction of the current local step and blends
    /// predicted objects.
    #[must_use]
    pub fn present(&self, schema: &StateSchema, now: f64, alpha: f32) -> Presentation {
        match &self.mode {
            ObjectMode::Smoothing(smoother) => smoother.sample(schema, now),
            ObjectMode::Predicting(predictor) => predictor.sample(schema, alpha),
        }
    }
}
