//! Tick-indexed dejitter buffer.

use std::num::{NonZeroU32, NonZeroUsize};

use crate::record::Timed;
use crate::types::Tick;

/// Sizing for a [`DejitterBuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DejitterConfig {
    /// Number of slots.
    pub capacity: NonZeroUsize,
    /// Ticks per slot. Set to the send rate when values only exist on send ticks.
    pub divisor: NonZeroU32,
}

impl DejitterConfig {
    #[must_use]
    pub const fn new(capacity: NonZeroUsize, divisor: NonZeroU32) -> Self {
        Self { capacity, divisor }
    }

    /// Number of ticks the buffer spans when every slot is filled.
    #[must_use]
    pub const fn window_ticks(&self) -> u64 {
        self.capacity.get() as u64 * self.divisor.get() as u64
    }
}

impl Default for DejitterConfig {
    fn default() -> Self {
        Self {
            capacity: NonZeroUsize::MIN.saturating_add(31),
            divisor: NonZeroU32::MIN,
        }
    }
}

/// Outcome of [`DejitterBuffer::store`].
#[derive(Debug, Clone, PartialEq)]
pub enum Stored<T> {
    /// The slot was empty.
    Inserted,
    /// An older (or same-tick) value was evicted and is returned.
    Replaced(T),
    /// The slot holds a newer value; the offered value is handed back.
    Rejected(T),
}

impl<T> Stored<T> {
    #[must_use]
    pub const fn is_accepted(&self) -> bool {
        !matches!(self, Self::Rejected(_))
    }
}

/// A fixed-capacity store of timed values, one per tick bucket.
///
/// A value lands in bucket `(tick.index() / divisor) % capacity`. A bucket's
/// occupant is only ever replaced by a value at the same or a later tick, so
/// a late arrival can fill a free slot but never evicts newer data.
#[derive(Debug, Clone)]
pub struct DejitterBuffer<T> {
    slots: Vec<Option<T>>,
    divisor: u32,
    latest: Option<Tick>,
    len: usize,
}

impl<T: Timed> DejitterBuffer<T> {
    #[must_use]
    pub fn new(capacity: NonZeroUsize, divisor: NonZeroU32) -> Self {
        let mut slots = Vec::with_capacity(capacity.get());
        slots.resize_with(capacity.get(), || None);
        Self {
            slots,
            divisor: divisor.get(),
            latest: None,
            len: 0,
        }
    }

    #[must_use]
    pub fn with_config(config: DejitterConfig) -> Self {
        Self::new(config.capacity, config.divisor)
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn bucket(&self, tick: Tick) -> usize {
        (tick.index() / self.divisor) as usize % self.slots.len()
    }

    /// Stores `value` in its tick's bucket.
    ///
    /// Invalid ticks are rejected.
    pub fn store(&mut self, value: T) -> Stored<T> {
        let tick = value.tick();
        if !tick.is_valid() {
            return Stored::Rejected(value);
        }
        let bucket = self.bucket(tick);
        let slot = &mut self.slots[bucket];
        if slot.as_ref().is_some_and(|occupant| occupant.tick() > tick) {
            return Stored::Rejected(value);
        }
        let outcome = match slot.replace(value) {
            Some(evicted) => Stored::Replaced(evicted),
            None => {
                self.len += 1;
                Stored::Inserted
            }
        };
        if self.latest.map_or(true, |latest| tick > latest) {
            self.latest = Some(tick);
        }
        outcome
    }

    /// Returns the value stored for exactly `tick`.
    #[must_use]
    pub fn get(&self, tick: Tick) -> Option<&T> {
        if !tick.is_valid() {
            return None;
        }
        self.slots[self.bucket(tick)]
            .as_ref()
            .filter(|value| value.tick() == tick)
    }

    /// Tick of the newest stored value.
    #[must_use]
    pub const fn latest_tick(&self) -> Option<Tick> {
        self.latest
    }

    /// The newest stored value.
    #[must_use]
    pub fn latest(&self) -> Option<&T> {
        self.latest.and_then(|tick| self.get(tick))
    }

    /// The newest stored value with a tick at or before `tick`.
    #[must_use]
    pub fn latest_at(&self, tick: Tick) -> Option<&T> {
        self.iter()
            .filter(|value| value.tick() <= tick)
            .max_by_key(|value| value.tick())
    }

    /// The oldest stored value with a tick strictly after `tick`.
    #[must_use]
    pub fn next_after(&self, tick: Tick) -> Option<&T> {
        self.iter()
            .filter(|value| value.tick() > tick)
            .min_by_key(|value| value.tick())
    }

    /// Values with ticks in `[start, end]` sorted by tick, plus the first
    /// value after `end`.
    #[must_use]
    pub fn range_and_next(&self, start: Tick, end: Tick) -> (Vec<&T>, Option<&T>) {
        let mut range: Vec<&T> = self
            .iter()
            .filter(|value| (start..=end).contains(&value.tick()))
            .collect();
        range.sort_by_key(|value| value.tick());
        (range, self.next_after(end))
    }

    /// Occupied slots in bucket order, not tick order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.slots.iter().filter_map(Option::as_ref)
    }

    /// Removes every value with a tick before `tick`.
    ///
    /// The latest tick falls back to the newest value left, if any.
    pub fn retain_from(&mut self, tick: Tick) {
        for slot in &mut self.slots {
            if slot.as_ref().is_some_and(|value| value.tick() < tick) {
                *slot = None;
                self.len -= 1;
            }
        }
        self.latest = self.iter().map(Timed::tick).max();
    }

    /// Releases every slot and forgets the latest tick.
    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
        self.len = 0;
        self.latest = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Sample(Tick, &'static str);

    impl Timed for Sample {
        fn tick(&self) -> Tick {
            self.0
        }
    }

    fn at(index: u32, tag: &'static str) -> Sample {
        Sample(Tick::from_index(index), tag)
    }

    fn buffer(capacity: usize, divisor: u32) -> DejitterBuffer<Sample> {
        DejitterBuffer::new(
            NonZeroUsize::new(capacity).unwrap(),
            NonZeroU32::new(divisor).unwrap(),
        )
    }

    #[test]
    fn store_and_get_exact() {
        let mut buf = buffer(4, 1);
        assert_eq!(buf.store(at(3, "a")), Stored::Inserted);
        assert_eq!(buf.get(Tick::from_index(3)), Some(&at(3, "a")));
        assert_eq!(buf.get(Tick::from_index(7)), None);
        assert_eq!(buf.len(), 1);
    }

    #[test]
    fn newer_tick_evicts_older_in_same_bucket() {
        let mut buf = buffer(4, 1);
        buf.store(at(1, "old"));
        assert_eq!(buf.store(at(5, "new")), Stored::Replaced(at(1, "old")));
        assert_eq!(buf.get(Tick::from_index(1)), None);
        assert_eq!(buf.len(), 1);
    }

    #[test]
    fn older_tick_cannot_evict_newer() {
        let mut buf = buffer(4, 1);
        buf.store(at(5, "new"));
        assert_eq!(buf.store(at(1, "late")), Stored::Rejected(at(1, "late")));
        assert_eq!(buf.latest(), Some(&at(5, "new")));
    }

    #[test]
    fn late_value_fills_free_slot() {
        let mut buf = buffer(8, 1);
        buf.store(at(6, "b"));
        assert!(buf.store(at(4, "a")).is_accepted());
        assert_eq!(buf.latest_tick(), Some(Tick::from_index(6)));
        assert_eq!(buf.get(Tick::from_index(4)), Some(&at(4, "a")));
    }

    #[test]
    fn same_tick_replaces() {
        let mut buf = buffer(4, 1);
        buf.store(at(2, "first"));
        assert_eq!(buf.store(at(2, "second")), Stored::Replaced(at(2, "first")));
    }

    #[test]
    fn invalid_tick_is_rejected() {
        let mut buf = buffer(4, 1);
        let value = Sample(Tick::INVALID, "x");
        assert_eq!(buf.store(value.clone()), Stored::Rejected(value));
        assert!(buf.is_empty());
    }

    #[test]
    fn divisor_spreads_window() {
        let mut buf = buffer(4, 3);
        for index in [0, 3, 6, 9] {
            buf.store(at(index, "s"));
        }
        assert_eq!(buf.len(), 4);
        // 12 / 3 = 4, wraps onto bucket 0
        buf.store(at(12, "s"));
        assert_eq!(buf.get(Tick::from_index(0)), None);
        assert_eq!(buf.len(), 4);
    }

    #[test]
    fn latest_at_respects_bound() {
        let mut buf = buffer(8, 1);
        for index in [2, 4, 7] {
            buf.store(at(index, "s"));
        }
        assert_eq!(buf.latest_at(Tick::from_index(5)).map(Timed::tick), Some(Tick::from_index(4)));
        assert_eq!(buf.latest_at(Tick::from_index(7)).map(Timed::tick), Some(Tick::from_index(7)));
        assert_eq!(buf.latest_at(Tick::from_index(1)), None);
    }

    #[test]
    fn range_and_next_sorted() {
        let mut buf = buffer(8, 1);
        for index in [9, 3, 5, 4, 12] {
            buf.store(at(index, "s"));
        }
        let (range, next) = buf.range_and_next(Tick::from_index(3), Tick::from_index(5));
        let ticks: Vec<u32> = range.iter().map(|v| v.tick().index()).collect();
        assert_eq!(ticks, vec![3, 4, 5]);
        assert_eq!(next.map(|v| v.tick().index()), Some(9));
    }

    #[test]
    fn retain_and_clear() {
        let mut buf = buffer(8, 1);
        for index in 0..6 {
            buf.store(at(index, "s"));
        }
        buf.retain_from(Tick::from_index(4));
        assert_eq!(buf.len(), 2);
        assert_eq!(buf.latest_tick(), Some(Tick::from_index(5)));
        buf.clear();
        assert!(buf.is_empty());
        assert_eq!(buf.latest_tick(), None);
    }

    #[test]
    fn retain_past_everything_resets_latest() {
        let mut buf = buffer(8, 1);
        for index in 0..5 {
            buf.store(at(index, "s"));
        }
        buf.retain_from(Tick::from_index(9));
        assert!(buf.is_empty());
        assert_eq!(buf.latest_tick(), None);
        assert_eq!(buf.latest(), None);

        buf.store(at(3, "late"));
        assert_eq!(buf.latest_tick(), Some(Tick::from_index(3)));
        assert_eq!(buf.latest(), Some(&at(3, "late")));
    }

    #[test]
    fn default_config_window() {
        let config = DejitterConfig::default();
        assert_eq!(config.capacity.get(), 32);
        assert_eq!(config.window_ticks(), 32);
    }
}
