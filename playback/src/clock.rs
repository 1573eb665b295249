//! Playback clock driven by received remote ticks.

use codec::Tick;
use tracing::{trace, warn};

use crate::config::ClockConfig;

/// How the last [`ClockEstimator::step`] moved the playback tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ClockRegime {
    /// Advanced by one tick.
    Normal,
    /// Advanced by two ticks to shrink the backlog.
    CatchUp,
    /// Held in place to rebuild buffer margin.
    Stall,
    /// Snapped to the desired delay behind the newest tick.
    Reset,
}

/// Counters since the estimator was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ClockStats {
    pub steps: u64,
    pub catch_ups: u64,
    pub stalls: u64,
    pub resets: u64,
}

/// Converts an irregular stream of received remote ticks into a playback tick
/// that advances by one per local step.
///
/// Each step first assumes a normal advance and measures how far the
/// resulting tick trails the newest remote tick, so the delay bounds apply
/// to the lag after the step (`latest - (estimated + 1)`). A lag of exactly
/// `delay_min` before a step therefore holds rather than advances. Within
/// `[delay_min, delay_max]` the advance stands. Slightly behind, the step
/// skips a tick; slightly ahead, it holds. Outside the band widened by the
/// remote send rate the estimate snaps to `latest - delay_desired`, which is
/// the only way it ever moves backwards.
#[derive(Debug, Clone)]
pub struct ClockEstimator {
    config: ClockConfig,
    latest: Option<Tick>,
    estimated: Option<Tick>,
    regime: ClockRegime,
    stats: ClockStats,
}

impl ClockEstimator {
    #[must_use]
    pub const fn new(config: ClockConfig) -> Self {
        Self {
            config,
            latest: None,
            estimated: None,
            regime: ClockRegime::Normal,
            stats: ClockStats {
                steps: 0,
                catch_ups: 0,
                stalls: 0,
                resets: 0,
            },
        }
    }

    #[must_use]
    pub const fn config(&self) -> &ClockConfig {
        &self.config
    }

    /// Highest remote tick observed.
    #[must_use]
    pub const fn latest(&self) -> Option<Tick> {
        self.latest
    }

    /// Tick currently being played out.
    #[must_use]
    pub const fn estimated(&self) -> Option<Tick> {
        self.estimated
    }

    #[must_use]
    pub const fn regime(&self) -> ClockRegime {
        self.regime
    }

    #[must_use]
    pub const fn stats(&self) -> ClockStats {
        self.stats
    }

    /// Records a received remote tick. Returns `true` if it was the newest so far.
    pub fn observe(&mut self, remote: Tick) -> bool {
        if !remote.is_valid() || self.latest.is_some_and(|latest| remote <= latest) {
            return false;
        }
        self.latest = Some(remote);
        true
    }

    /// Advances the playback tick by one local step.
    ///
    /// Returns `None` until a remote tick has been observed. The first step
    /// places the estimate at the desired delay without counting a reset.
    pub fn step(&mut self) -> Option<Tick> {
        let latest = self.latest?;
        self.stats.steps += 1;
        let desired = self.config.delay_desired();

        let Some(estimated) = self.estimated else {
            let start = latest.saturating_back(desired);
            trace!(%latest, %start, "clock started");
            self.estimated = Some(start);
            self.regime = ClockRegime::Normal;
            return Some(start);
        };

        let candidate = estimated.next();
        let gap = i64::from(latest - candidate);
        let min = i64::from(self.config.delay_min);
        let max = i64::from(self.config.delay_max);
        let rate = i64::from(self.config.remote_send_rate);

        let (next, regime) = if gap < min - rate || gap > max + rate {
            let target = latest.saturating_back(desired);
            // pinned at the first tick early in a stream
            if target == estimated {
                (estimated, ClockRegime::Stall)
            } else {
                (target, ClockRegime::Reset)
            }
        } else if gap > max {
            (candidate.next(), ClockRegime::CatchUp)
        } else if gap < min {
            (estimated, ClockRegime::Stall)
        } else {
            (candidate, ClockRegime::Normal)
        };

        match regime {
            ClockRegime::Reset => {
                self.stats.resets += 1;
                warn!(from = %estimated, to = %next, %latest, gap, "clock reset");
            }
            ClockRegime::CatchUp => self.stats.catch_ups += 1,
            ClockRegime::Stall => self.stats.stalls += 1,
            ClockRegime::Normal => {}
        }
        trace!(?regime, %latest, estimated = %next, gap, "clock step");

        self.estimated = Some(next);
        self.regime = regime;
        Some(next)
    }

    /// Forgets all observations, for example after a reconnect.
    pub fn clear(&mut self) {
        self.latest = None;
        self.estimated = None;
        self.regime = ClockRegime::Normal;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn estimator() -> ClockEstimator {
        ClockEstimator::new(ClockConfig::new(1, 2, 6).unwrap())
    }

    #[test]
    fn nothing_observed_nothing_played() {
        let mut clock = estimator();
        assert_eq!(clock.step(), None);
        assert!(!clock.observe(Tick::INVALID));
        assert_eq!(clock.step(), None);
        assert_eq!(clock.stats().steps, 0);
    }

    #[test]
    fn first_step_lands_on_desired_delay() {
        let mut clock = estimator();
        clock.observe(Tick::from_raw(10));
        assert_eq!(clock.step(), Some(Tick::from_raw(6)));
        assert_eq!(clock.stats().resets, 0);
    }

    #[test]
    fn older_ticks_do_not_lower_latest() {
        let mut clock = estimator();
        assert!(clock.observe(Tick::from_raw(10)));
        assert!(!clock.observe(Tick::from_raw(8)));
        assert!(!clock.observe(Tick::from_raw(10)));
        assert_eq!(clock.latest(), Some(Tick::from_raw(10)));
    }

    #[test]
    fn regimes() {
        let mut clock = estimator();
        clock.observe(Tick::from_raw(10));
        clock.step();

        // the advance to 7 would trail by 3
        assert_eq!(clock.step(), Some(Tick::from_raw(7)));
        assert_eq!(clock.regime(), ClockRegime::Normal);
        assert_eq!(clock.step(), Some(Tick::from_raw(8)));
        assert_eq!(clock.step(), Some(Tick::from_raw(8)));
        assert_eq!(clock.regime(), ClockRegime::Stall);

        clock.observe(Tick::from_raw(16));
        assert_eq!(clock.step(), Some(Tick::from_raw(10)));
        assert_eq!(clock.regime(), ClockRegime::CatchUp);

        clock.observe(Tick::from_raw(40));
        assert_eq!(clock.step(), Some(Tick::from_raw(36)));
        assert_eq!(clock.regime(), ClockRegime::Reset);

        let stats = clock.stats();
        assert_eq!((stats.stalls, stats.catch_ups, stats.resets), (1, 1, 1));
    }

    #[test]
    fn bounds_apply_to_lag_after_step() {
        let mut clock = estimator();
        clock.observe(Tick::from_raw(10));
        clock.step();
        clock.step();
        assert_eq!(clock.step(), Some(Tick::from_raw(8)));

        // trailing by exactly delay_min: advancing would leave a lag of 1
        assert_eq!(clock.step(), Some(Tick::from_raw(8)));
        assert_eq!(clock.regime(), ClockRegime::Stall);

        // an advance that leaves a lag of exactly delay_max is normal
        clock.observe(Tick::from_raw(15));
        assert_eq!(clock.step(), Some(Tick::from_raw(9)));
        assert_eq!(clock.regime(), ClockRegime::Normal);
        clock.observe(Tick::from_raw(17));
        assert_eq!(clock.step(), Some(Tick::from_raw(11)));
        assert_eq!(clock.regime(), ClockRegime::CatchUp);
    }

    #[test]
    fn outage_stalls_without_reset() {
        let mut clock = estimator();
        clock.observe(Tick::from_raw(50));
        clock.step();
        for _ in 0..20 {
            clock.step();
        }
        assert_eq!(clock.estimated(), Some(Tick::from_raw(48)));
        assert_eq!(clock.regime(), ClockRegime::Stall);
        assert_eq!(clock.stats().resets, 0);
    }

    #[test]
    fn early_stream_holds_at_start() {
        let mut clock = estimator();
        clock.observe(Tick::START);
        assert_eq!(clock.step(), Some(Tick::START));
        clock.observe(Tick::from_raw(2));
        assert_eq!(clock.step(), Some(Tick::START));
        assert_eq!(clock.regime(), ClockRegime::Stall);
        assert_eq!(clock.stats().resets, 0);
    }

    #[test]
    fn clear_restarts() {
        let mut clock = estimator();
        clock.observe(Tick::from_raw(10));
        clock.step();
        clock.clear();
        assert_eq!(clock.step(), None);
        clock.observe(Tick::from_raw(3));
        assert_eq!(clock.step(), Some(Tick::START));
    }
}
