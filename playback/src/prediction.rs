//! Client-side prediction with replay on authoritative updates.

use std::num::{NonZeroU32, NonZeroUsize};

use bitstream::Packable;
use codec::{DejitterBuffer, EntityState, StateRecord, Tick, Timed};
use schema::StateSchema;
use tracing::trace;

use crate::blend::blend;
use crate::smoothing::Presentation;

/// The deterministic step function shared by host and peers.
///
/// Called once per tick for every simulated object. Ticks without a command
/// step with `None`. Two calls with equal inputs must produce bit-identical
/// states or replayed predictions will never converge.
pub trait Simulation {
    type Command: Clone + Packable;

    fn step(&self, state: &mut EntityState, command: Option<&Self::Command>);
}

/// A local command stamped with the tick it applies to.
#[derive(Debug, Clone, PartialEq)]
pub struct TimedCommand<C> {
    pub tick: Tick,
    pub command: C,
}

impl<C> TimedCommand<C> {
    pub const fn new(tick: Tick, command: C) -> Self {
        Self { tick, command }
    }
}

impl<C> Timed for TimedCommand<C> {
    fn tick(&self) -> Tick {
        self.tick
    }
}

/// Local commands indexed by tick.
pub type CommandBuffer<C> = DejitterBuffer<TimedCommand<C>>;

/// Creates a command buffer holding `capacity` ticks.
#[must_use]
pub fn command_buffer<C>(capacity: NonZeroUsize) -> CommandBuffer<C> {
    DejitterBuffer::new(capacity, NonZeroU32::MIN)
}

/// Outcome of [`Predictor::reconcile`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reconciliation {
    /// Ticks simulated again on top of the authoritative record.
    pub replayed: u32,
    /// The prediction at the authoritative tick differed from it.
    pub mispredicted: bool,
}

/// Forward simulation of one locally controlled object.
///
/// Keeps the predicted record of every recent tick. The newest is the
/// prediction anchor; the one before it is what presentation blends from.
#[derive(Debug, Clone)]
pub struct Predictor {
    history: DejitterBuffer<StateRecord>,
    authoritative: Tick,
}

impl Predictor {
    #[must_use]
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            history: DejitterBuffer::new(capacity, NonZeroU32::MIN),
            authoritative: Tick::INVALID,
        }
    }

    /// Tick of the authoritative record the prediction is based on.
    #[must_use]
    pub const fn authoritative_tick(&self) -> Tick {
        self.authoritative
    }

    /// The newest predicted record.
    #[must_use]
    pub fn anchor(&self) -> Option<&StateRecord> {
        self.history.latest()
    }

    /// The predicted record one tick before the anchor.
    #[must_use]
    pub fn previous(&self) -> Option<&StateRecord> {
        let anchor = self.history.latest_tick()?;
        self.history
            .get(anchor.saturating_back(1))
            .filter(|record| record.tick < anchor)
    }

    /// The predicted record at `tick`, if still held.
    #[must_use]
    pub fn predicted_at(&self, tick: Tick) -> Option<&StateRecord> {
        self.history.get(tick)
    }

    /// Starts predicting from `auth`, simulating forward to `target`.
    ///
    /// Returns the number of ticks simulated.
    pub fn enter<S: Simulation>(
        &mut self,
        auth: &StateRecord,
        target: Tick,
        commands: &CommandBuffer<S::Command>,
        simulation: &S,
    ) -> u32 {
        self.history.clear();
        self.authoritative = auth.tick;
        let replayed = self.replay(auth, target.max(auth.tick), commands, simulation);
        trace!(entity = %auth.state.entity(), auth = %auth.tick, %target, replayed, "entered prediction");
        replayed
    }

    /// Rebases the prediction on a newer authoritative record.
    ///
    /// Every tick after `auth` up to the current anchor is simulated again
    /// with the buffered commands. An authoritative tick beyond the anchor
    /// moves the anchor up to it. Returns `None` if `auth` is not newer than
    /// the last one applied.
    pub fn reconcile<S: Simulation>(
        &mut self,
        schema: &StateSchema,
        auth: &StateRecord,
        commands: &CommandBuffer<S::Command>,
        simulation: &S,
    ) -> Option<Reconciliation> {
        if auth.tick <= self.authoritative {
            return None;
        }
        let mispredicted = self
            .history
            .get(auth.tick)
            .is_some_and(|predicted| predicted.state.quantized(schema) != auth.state);
        let target = self
            .history
            .latest_tick()
            .map_or(auth.tick, |anchor| anchor.max(auth.tick));

        self.authoritative = auth.tick;
        let replayed = self.replay(auth, target, commands, simulation);
        trace!(entity = %auth.state.entity(), auth = %auth.tick, replayed, mispredicted, "reconciled");
        Some(Reconciliation {
            replayed,
            mispredicted,
        })
    }

    /// Simulates the anchor forward until it reaches `target`.
    pub fn advance_to<S: Simulation>(
        &mut self,
        target: Tick,
        commands: &CommandBuffer<S::Command>,
        simulation: &S,
    ) -> u32 {
        let Some(anchor) = self.history.latest().cloned() else {
            return 0;
        };
        if target <= anchor.tick {
            return 0;
        }
        self.step_from(anchor, target, commands, simulation)
    }

    /// Blends the previous predicted record into the anchor by `alpha`.
    #[must_use]
    pub fn sample(&self, schema: &StateSchema, alpha: f32) -> Presentation {
        let Some(anchor) = self.anchor() else {
            return Presentation::NotReady;
        };
        match self.previous() {
            Some(previous) => {
                let t = alpha.clamp(0.0, 1.0);
                Presentation::Interpolated {
                    state: blend(schema, &previous.state, &anchor.state, t),
                    t,
                }
            }
            None => Presentation::Snapped(anchor.state.clone()),
        }
    }

    fn replay<S: Simulation>(
        &mut self,
        auth: &StateRecord,
        target: Tick,
        commands: &CommandBuffer<S::Command>,
        simulation: &S,
    ) -> u32 {
        let base = StateRecord::new(auth.tick, auth.state.clone());
        self.history.store(base.clone());
        self.step_from(base, target, commands, simulation)
    }

    fn step_from<S: Simulation>(
        &mut self,
        from: StateRecord,
        target: Tick,
        commands: &CommandBuffer<S::Command>,
        simulation: &S,
    ) -> u32 {
        let mut tick = from.tick;
        let mut state = from.state;
        let mut steps = 0;
        while tick < target {
            tick = tick.next();
            let command = commands.get(tick).map(|entry| &entry.command);
            simulation.step(&mut state, command);
            self.history.store(StateRecord::new(tick, state.clone()));
            steps += 1;
        }
        steps
    }
}
