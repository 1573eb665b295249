//! Delta frames and snapshot packets.

use bitstream::{pack_to_size, BitBuffer, PackLimits, PackOutcome, COUNT_BITS};

use crate::error::{LimitKind, WireError, WireResult};
use crate::limits::PacketLimits;

/// One object's encoded record plus the basis it was encoded against.
///
/// Layout: `[basis tick varint, 0 = none][payload bits varint][payload]`.
/// The explicit length lets a receiver skip a record it cannot decode (for
/// example because the basis is gone) without losing its place in the packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeltaFrame {
    /// Raw basis tick, `0` when the record is encoded from scratch.
    pub basis_tick: u32,
    pub payload: BitBuffer,
}

impl DeltaFrame {
    #[must_use]
    pub const fn new(basis_tick: u32, payload: BitBuffer) -> Self {
        Self {
            basis_tick,
            payload,
        }
    }

    /// Returns `true` if the record was encoded against a basis.
    #[must_use]
    pub const fn has_basis(&self) -> bool {
        self.basis_tick != 0
    }

    /// Writes the frame.
    pub fn encode(&self, buffer: &mut BitBuffer) {
        buffer.write_var_uint(self.basis_tick);
        buffer.write_var_uint(self.payload.bits_written() as u32);
        buffer.append(&self.payload);
    }

    /// Reads one frame, rejecting payloads over `max_record_bits`.
    pub fn decode(buffer: &mut BitBuffer, limits: &PacketLimits) -> WireResult<Self> {
        let basis_tick = buffer.read_var_uint()?;
        let bits = buffer.read_var_uint()? as usize;
        if bits > limits.max_record_bits {
            return Err(WireError::LimitsExceeded {
                kind: LimitKind::RecordBits,
                limit: limits.max_record_bits,
                actual: bits,
            });
        }
        let payload = buffer.take(bits)?;
        Ok(Self {
            basis_tick,
            payload,
        })
    }
}

/// A decoded snapshot packet.
///
/// Layout: `[tick varint][count:8][frames...]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotPacket {
    /// Raw tick the packet was produced at.
    pub tick: u32,
    pub frames: Vec<DeltaFrame>,
}

/// Encodes as many frames as fit within `limits`.
///
/// Frames whose payload exceeds `max_record_bits`, or that would push the
/// packet past `max_packet_bits`, are reported in [`PackOutcome::skipped`]
/// so the caller can retry them next packet. Indices refer to `frames`.
pub fn encode_packet(
    tick: u32,
    frames: &[DeltaFrame],
    limits: &PacketLimits,
) -> WireResult<(BitBuffer, PackOutcome)> {
    let mut buffer = BitBuffer::new();
    buffer.write_var_uint(tick);

    let mut oversized = Vec::new();
    let mut candidates = Vec::with_capacity(frames.len());
    for (index, frame) in frames.iter().enumerate() {
        if frame.payload.bits_written() > limits.max_record_bits {
            oversized.push(index);
        } else {
            candidates.push(index);
        }
    }

    let budget = PackLimits::new(
        limits
            .max_packet_bits
            .saturating_sub(buffer.bits_written()),
        usize::MAX,
    );
    let outcome = pack_to_size(&mut buffer, candidates.iter().copied(), budget, |b, index| {
        frames[index].encode(b);
        Ok(())
    })?;

    let mut skipped: Vec<usize> = outcome
        .skipped
        .iter()
        .map(|&i| candidates[i])
        .chain(oversized)
        .collect();
    skipped.sort_unstable();
    let packed = outcome.packed.iter().map(|&i| candidates[i]).collect();
    Ok((buffer, PackOutcome { packed, skipped }))
}

/// Decodes a snapshot packet.
pub fn decode_packet(buffer: &mut BitBuffer, limits: &PacketLimits) -> WireResult<SnapshotPacket> {
    // byte transport pads the final byte
    let padded_limit = limits.max_packet_bits.saturating_add(7) / 8 * 8;
    if buffer.bits_remaining() > padded_limit {
        return Err(WireError::LimitsExceeded {
            kind: LimitKind::PacketBits,
            limit: limits.max_packet_bits,
            actual: buffer.bits_remaining(),
        });
    }

    let tick = buffer.read_var_uint()?;
    let count = buffer.read(COUNT_BITS)? as usize;
    let mut frames = Vec::with_capacity(count);
    for _ in 0..count {
        frames.push(DeltaFrame::decode(buffer, limits)?);
    }

    if buffer.bits_remaining() >= 8 {
        return Err(WireError::TrailingBits {
            remaining: buffer.bits_remaining(),
        });
    }
    Ok(SnapshotPacket { tick, frames })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(bits: usize) -> BitBuffer {
        let mut buffer = BitBuffer::new();
        for i in 0..bits {
            buffer.write_bool(i % 3 == 0);
        }
        buffer
    }

    #[test]
    fn packet_roundtrip_through_bytes() {
        let frames = vec![
            DeltaFrame::new(0, payload(21)),
            DeltaFrame::new(17, payload(5)),
            DeltaFrame::new(40, payload(0)),
        ];
        let (buffer, outcome) = encode_packet(42, &frames, &PacketLimits::default()).unwrap();
        assert_eq!(outcome.packed, vec![0, 1, 2]);

        let mut received = BitBuffer::from_bytes(&buffer.to_bytes());
        let packet = decode_packet(&mut received, &PacketLimits::default()).unwrap();
        assert_eq!(packet.tick, 42);
        assert_eq!(packet.frames.len(), 3);
        for (decoded, original) in packet.frames.iter().zip(&frames) {
            assert_eq!(decoded.basis_tick, original.basis_tick);
            assert_eq!(decoded.payload.to_bytes(), original.payload.to_bytes());
            assert_eq!(
                decoded.payload.bits_written(),
                original.payload.bits_written()
            );
        }
        assert!(!packet.frames[0].has_basis());
        assert!(packet.frames[1].has_basis());
    }

    #[test]
    fn oversized_records_are_skipped() {
        let limits = PacketLimits::new(4096, 32);
        let frames = vec![
            DeltaFrame::new(0, payload(10)),
            DeltaFrame::new(0, payload(33)),
            DeltaFrame::new(0, payload(32)),
        ];
        let (_, outcome) = encode_packet(1, &frames, &limits).unwrap();
        assert_eq!(outcome.packed, vec![0, 2]);
        assert_eq!(outcome.skipped, vec![1]);
    }

    #[test]
    fn packet_budget_is_respected() {
        let limits = PacketLimits::new(200, 100);
        let frames: Vec<_> = (0..10).map(|_| DeltaFrame::new(1, payload(40))).collect();
        let (buffer, outcome) = encode_packet(9, &frames, &limits).unwrap();
        assert!(buffer.bits_written() <= 200);
        // each frame costs 8 + 8 + 40 bits
        assert_eq!(outcome.packed.len(), 3);
        assert_eq!(outcome.skipped.len(), 7);
    }

    #[test]
    fn decode_rejects_oversized_record() {
        let frames = vec![DeltaFrame::new(0, payload(100))];
        let (buffer, _) = encode_packet(1, &frames, &PacketLimits::unlimited()).unwrap();
        let mut received = BitBuffer::from_bytes(&buffer.to_bytes());
        let err = decode_packet(&mut received, &PacketLimits::new(4096, 64)).unwrap_err();
        assert!(matches!(
            err,
            WireError::LimitsExceeded {
                kind: LimitKind::RecordBits,
                ..
            }
        ));
    }

    #[test]
    fn decode_rejects_oversized_packet() {
        let frames = vec![DeltaFrame::new(0, payload(300))];
        let (buffer, _) = encode_packet(1, &frames, &PacketLimits::unlimited()).unwrap();
        let mut received = BitBuffer::from_bytes(&buffer.to_bytes());
        let err = decode_packet(&mut received, &PacketLimits::new(128, 1024)).unwrap_err();
        assert!(matches!(
            err,
            WireError::LimitsExceeded {
                kind: LimitKind::PacketBits,
                ..
            }
        ));
    }

    #[test]
    fn decode_rejects_truncated_packet() {
        let frames = vec![DeltaFrame::new(3, payload(64))];
        let (buffer, _) = encode_packet(1, &frames, &PacketLimits::default()).unwrap();
        let mut bytes = buffer.to_bytes();
        bytes.truncate(bytes.len() - 2);
        let mut received = BitBuffer::from_bytes(&bytes);
        assert!(matches!(
            decode_packet(&mut received, &PacketLimits::default()),
            Err(WireError::Bit(_))
        ));
    }

    #[test]
    fn decode_rejects_trailing_bytes() {
        let (buffer, _) = encode_packet(1, &[], &PacketLimits::default()).unwrap();
        let mut bytes = buffer.to_bytes();
        bytes.push(0);
        let mut received = BitBuffer::from_bytes(&bytes);
        assert!(matches!(
            decode_packet(&mut received, &PacketLimits::default()),
            Err(WireError::TrailingBits { .. })
        ));
    }
}
