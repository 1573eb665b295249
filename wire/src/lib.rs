//! Wire framing and record layout for the tickline replication engine.
//!
//! This crate handles the bit-level structure of packets: record headers,
//! delta frames, count-prefixed batches and the command envelope. It does not
//! know about state schemas or tick arithmetic; ticks appear here in their raw
//! encoded form.
//!
//! # Design Principles
//!
//! - **Bounded decoding** - All length fields are validated against limits before allocation.
//! - **Skippable records** - Every record is length-prefixed so one bad object does not poison the packet.
//! - **No domain knowledge** - This crate handles framing, not game logic.

mod command;
mod error;
mod header;
mod limits;
mod packet;

pub use command::{decode_commands, encode_commands, TickedCommand};
pub use error::{LimitKind, WireError, WireResult};
pub use header::RecordHeader;
pub use limits::PacketLimits;
pub use packet::{decode_packet, encode_packet, DeltaFrame, SnapshotPacket};
