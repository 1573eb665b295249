//! Command envelope for peer-to-host input.

use bitstream::{pack_to_size, BitBuffer, PackLimits, PackOutcome, Packable, COUNT_BITS};

use crate::error::WireResult;

/// A command stamped with the raw tick it applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickedCommand<T> {
    pub tick: u32,
    pub command: T,
}

impl<T> TickedCommand<T> {
    pub const fn new(tick: u32, command: T) -> Self {
        Self { tick, command }
    }
}

/// Writes `[count:8]{[tick varint][payload]}` for as many commands as fit.
///
/// Commands are usually re-sent until the host's snapshot tick passes them,
/// so the caller orders them newest first when the budget is tight.
pub fn encode_commands<T: Packable>(
    buffer: &mut BitBuffer,
    commands: &[TickedCommand<T>],
    limits: PackLimits,
) -> WireResult<PackOutcome> {
    let outcome = pack_to_size(buffer, commands, limits, |b, entry| {
        b.write_var_uint(entry.tick);
        entry.command.pack(b)
    })?;
    Ok(outcome)
}

/// Reads a command envelope.
pub fn decode_commands<T: Packable>(buffer: &mut BitBuffer) -> WireResult<Vec<TickedCommand<T>>> {
    let count = buffer.read(COUNT_BITS)? as usize;
    let mut commands = Vec::with_capacity(count);
    for _ in 0..count {
        let tick = buffer.read_var_uint()?;
        let command = T::unpack(buffer)?;
        commands.push(TickedCommand { tick, command });
    }
    Ok(commands)
}
