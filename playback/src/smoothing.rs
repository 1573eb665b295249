//! Interpolation and bounded extrapolation of remote objects.

use codec::{DejitterBuffer, EntityState, StateRecord, Tick};
use schema::StateSchema;

use crate::blend::blend;
use crate::config::SmoothingConfig;

/// What a renderer should show for an object this frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Presentation {
    /// No authoritative record has been received yet.
    NotReady,
    /// A single record shown as is.
    Snapped(EntityState),
    /// Blended between two known records, `t` in `[0, 1]`.
    Interpolated { state: EntityState, t: f32 },
    /// Projected past the newest record, `t > 1`.
    Extrapolated { state: EntityState, t: f32 },
}

impl Presentation {
    #[must_use]
    pub const fn state(&self) -> Option<&EntityState> {
        match self {
            Self::NotReady => None,
            Self::Snapped(state)
            | Self::Interpolated { state, .. }
            | Self::Extrapolated { state, .. } => Some(state),
        }
    }

    #[must_use]
    pub const fn is_ready(&self) -> bool {
        !matches!(self, Self::NotReady)
    }
}

/// Seconds-free time axis: one unit per tick.
fn time_of(tick: Tick) -> f64 {
    f64::from(tick.index())
}

/// Tracks the records bracketing the playback tick for one remote object.
///
/// `cur` is the newest record at or before the playback tick, `prev` the one
/// it replaced and `next` the oldest record already received after it.
#[derive(Debug, Clone)]
pub struct Smoother {
    config: SmoothingConfig,
    prev: Option<StateRecord>,
    cur: Option<StateRecord>,
    next: Option<StateRecord>,
}

impl Smoother {
    #[must_use]
    pub const fn new(config: SmoothingConfig) -> Self {
        Self {
            config,
            prev: None,
            cur: None,
            next: None,
        }
    }

    #[must_use]
    pub const fn current(&self) -> Option<&StateRecord> {
        self.cur.as_ref()
    }

    #[must_use]
    pub const fn previous(&self) -> Option<&StateRecord> {
        self.prev.as_ref()
    }

    #[must_use]
    pub const fn upcoming(&self) -> Option<&StateRecord> {
        self.next.as_ref()
    }

    /// Pulls the records bracketing `playback` out of `records`.
    ///
    /// When nothing at or before `playback` is buffered any more, the newest
    /// record is adopted alone so sampling snaps to it.
    pub fn update(&mut self, records: &DejitterBuffer<StateRecord>, playback: Tick) {
        match records.latest_at(playback) {
            Some(found) => {
                // a snapped fallback ahead of playback is never rolled into prev
                let ahead = self.cur.as_ref().is_some_and(|cur| cur.tick > playback);
                if ahead || self.cur.as_ref().map_or(true, |cur| found.tick > cur.tick) {
                    let rolled = if ahead { None } else { self.cur.take() };
                    self.prev = rolled.or_else(|| preceding(records, found.tick).cloned());
                    self.cur = Some(found.clone());
                }
            }
            None => {
                if let Some(latest) = records.latest() {
                    if self.cur.as_ref().map_or(true, |cur| cur.tick != latest.tick) {
                        self.prev = None;
                        self.cur = Some(latest.clone());
                    }
                }
            }
        }
        self.next = self
            .cur
            .as_ref()
            .and_then(|cur| records.next_after(cur.tick))
            .cloned();
    }

    /// Samples the object at `now`, measured in ticks.
    #[must_use]
    pub fn sample(&self, schema: &StateSchema, now: f64) -> Presentation {
        let Some(cur) = &self.cur else {
            return Presentation::NotReady;
        };
        let cur_time = time_of(cur.tick);

        if let Some(next) = &self.next {
            let span = time_of(next.tick) - cur_time;
            let t = ((now - cur_time) / span).clamp(0.0, 1.0) as f32;
            return Presentation::Interpolated {
                state: blend(schema, &cur.state, &next.state, t),
                t,
            };
        }

        let Some(prev) = &self.prev else {
            return Presentation::Snapped(cur.state.clone());
        };
        let now = now.min(cur_time + f64::from(self.config.max_extrapolation_ticks));
        if now <= cur_time {
            return Presentation::Snapped(cur.state.clone());
        }
        let prev_time = time_of(prev.tick);
        let t = ((now - prev_time) / (cur_time - prev_time)) as f32;
        Presentation::Extrapolated {
            state: blend(schema, &prev.state, &cur.state, t),
            t,
        }
    }

    /// Drops every held record.
    pub fn clear(&mut self) {
        self.prev = None;
        self.cur = None;
        self.next = None;
    }
}

fn preceding(records: &DejitterBuffer<StateRecord>, tick: Tick) -> Option<&StateRecord> {
    records
        .latest_at(tick.saturating_back(1))
        .filter(|record| record.tick < tick)
}
