//! Reliable, ordered event delivery over an unreliable packet stream.
//!
//! Envelope layout: `[count:8]{[sequence:10][payload]}`. The sender keeps
//! every event until the receiver acknowledges it and re-packs the pending
//! events, oldest first, into every outgoing packet. The receiver accepts an
//! event only when its id is newer than the last one it accepted.

use std::collections::VecDeque;

use bitstream::{pack_to_size, unpack_counted, BitBuffer, PackLimits, Packable, MAX_COUNT};
use tracing::trace;

use crate::error::{CodecError, CodecResult};
use crate::types::SequenceId;

/// Most events that may be unacknowledged at once.
///
/// Beyond half the sequence space the receiver can no longer tell new ids
/// from old ones.
pub const MAX_PENDING_EVENTS: usize = 511;

#[derive(Debug, Clone)]
pub struct EventSender<T> {
    next: SequenceId,
    pending: VecDeque<(SequenceId, T)>,
}

impl<T: Packable> EventSender<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            next: SequenceId::START,
            pending: VecDeque::new(),
        }
    }

    /// Queues an event and returns its sequence id.
    pub fn push(&mut self, event: T) -> CodecResult<SequenceId> {
        if self.pending.len() >= MAX_PENDING_EVENTS {
            return Err(CodecError::EventWindowFull {
                pending: self.pending.len(),
                max: MAX_PENDING_EVENTS,
            });
        }
        let id = self.next;
        self.next = self.next.next();
        self.pending.push_back((id, event));
        Ok(id)
    }

    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Writes as many pending events as fit, oldest first, and returns
    /// their ids.
    ///
    /// Stops at the first event that does not fit so the receiver never sees
    /// a gap.
    pub fn write(&self, buffer: &mut BitBuffer, limits: PackLimits) -> CodecResult<Vec<SequenceId>> {
        let mut budget = limits.max_total_bits.saturating_sub(bitstream::COUNT_BITS as usize);
        let mut fitting = 0;
        let mut scratch = BitBuffer::new();
        for (id, event) in self.pending.iter().take(MAX_COUNT) {
            scratch.clear();
            id.write(&mut scratch)?;
            event.pack(&mut scratch)?;
            let bits = scratch.bits_written();
            if bits > limits.max_item_bits || bits > budget {
                break;
            }
            budget -= bits;
            fitting += 1;
        }

        let outcome = pack_to_size(
            buffer,
            self.pending.iter().take(fitting),
            PackLimits::unbounded(),
            |b, (id, event)| {
                id.write(b)?;
                event.pack(b)
            },
        )?;
        Ok(outcome
            .packed
            .into_iter()
            .map(|index| self.pending[index].0)
            .collect())
    }

    /// Drops every pending event up to and including `id`.
    pub fn ack(&mut self, id: SequenceId) {
        if !id.is_valid() {
            return;
        }
        while let Some((front, _)) = self.pending.front() {
            if front.is_newer_than(id) {
                break;
            }
            self.pending.pop_front();
        }
    }
}

impl<T: Packable> Default for EventSender<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Default)]
pub struct EventReceiver {
    last_accepted: SequenceId,
}

impl EventReceiver {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            last_accepted: SequenceId::INVALID,
        }
    }

    /// Id to acknowledge back to the sender.
    #[must_use]
    pub const fn last_accepted(&self) -> SequenceId {
        self.last_accepted
    }

    /// Reads an envelope and returns the events not seen before, in order.
    pub fn read<T: Packable>(&mut self, buffer: &mut BitBuffer) -> CodecResult<Vec<T>> {
        let entries = unpack_counted(buffer, |b| {
            let id = SequenceId::read(b)?;
            let event = T::unpack(b)?;
            Ok((id, event))
        })?;
        let mut accepted = Vec::new();
        for (id, event) in entries {
            if id.is_valid() && id.is_newer_than(self.last_accepted) {
                self.last_accepted = id;
                accepted.push(event);
            } else {
                trace!(id = id.raw(), "duplicate event");
            }
        }
        Ok(accepted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delivers_in_order_once() {
        let mut sender = EventSender::new();
        let mut receiver = EventReceiver::new();
        for value in [10u32, 20, 30] {
            sender.push(value).unwrap();
        }

        let mut packet = BitBuffer::new();
        let ids = sender.write(&mut packet, PackLimits::unbounded()).unwrap();
        assert_eq!(ids.len(), 3);
        let mut copy = packet.clone();

        assert_eq!(receiver.read::<u32>(&mut packet).unwrap(), vec![10, 20, 30]);
        // resent packet yields nothing new
        assert!(receiver.read::<u32>(&mut copy).unwrap().is_empty());

        sender.ack(receiver.last_accepted());
        assert_eq!(sender.pending(), 0);
    }

    #[test]
    fn ack_is_cumulative() {
        let mut sender = EventSender::new();
        let ids: Vec<SequenceId> = (0..5u32).map(|v| sender.push(v).unwrap()).collect();
        sender.ack(ids[2]);
        assert_eq!(sender.pending(), 2);
        sender.ack(ids[1]);
        assert_eq!(sender.pending(), 2);
    }

    #[test]
    fn stops_at_first_event_that_does_not_fit() {
        let mut sender = EventSender::new();
        sender.push(1u32).unwrap();
        sender.push(u32::MAX).unwrap();
        sender.push(2u32).unwrap();

        // count + one 18-bit entry fits, the 50-bit one does not
        let mut packet = BitBuffer::new();
        let ids = sender.write(&mut packet, PackLimits::new(8 + 20, usize::MAX)).unwrap();
        assert_eq!(ids, vec![SequenceId::START]);

        let mut receiver = EventReceiver::new();
        assert_eq!(receiver.read::<u32>(&mut packet).unwrap(), vec![1]);
    }

    #[test]
    fn window_is_bounded() {
        let mut sender = EventSender::new();
        for _ in 0..MAX_PENDING_EVENTS {
            sender.push(true).unwrap();
        }
        assert!(matches!(
            sender.push(true),
            Err(CodecError::EventWindowFull { pending: 511, max: 511 })
        ));
    }

    #[test]
    fn ids_wrap_without_losing_order() {
        let mut sender = EventSender::new();
        let mut receiver = EventReceiver::new();
        let mut received = Vec::new();
        for round in 0..300u32 {
            for k in 0..4 {
                sender.push(round * 4 + k).unwrap();
            }
            let mut packet = BitBuffer::new();
            sender.write(&mut packet, PackLimits::unbounded()).unwrap();
            received.extend(receiver.read::<u32>(&mut packet).unwrap());
            sender.ack(receiver.last_accepted());
        }
        assert_eq!(received, (0..1200).collect::<Vec<_>>());
    }
}
