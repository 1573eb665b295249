//! Reference pawn schema, input command and step function for the demo.

use bitstream::{BitBuffer, BitResult, Packable};
use codec::{CodecResult, EntityState};
use playback::Simulation;
use schema::{FieldCodec, FieldDef, FieldValue, Registry, StateSchema, TypeTag};

pub const ARENA: f32 = 500.0;
pub const MAX_SPEED: f32 = 40.0;
pub const POS_PRECISION: f32 = 0.01;
pub const ACCEL: f32 = 4.0;
pub const BOOST_ACCEL: f32 = 10.0;
pub const FRICTION: f32 = 0.8;
/// Speeds below this snap to rest.
pub const STOP_SPEED: f32 = 0.05;

/// Type tag of the pawn in [`registry`].
pub const PAWN: TypeTag = TypeTag::new(0);

pub fn pawn_schema() -> CodecResult<StateSchema> {
    let schema = StateSchema::builder("pawn")
        .immutable(FieldDef::new("color", FieldCodec::uint(3)))
        .mutable(FieldDef::new("x", FieldCodec::float(-ARENA, ARENA, POS_PRECISION)?))
        .mutable(FieldDef::new("y", FieldCodec::float(-ARENA, ARENA, POS_PRECISION)?))
        .mutable(FieldDef::new("hp", FieldCodec::int(0, 100)?).with_default(FieldValue::Int(100)))
        .mutable(FieldDef::new("bumps", FieldCodec::var_uint()))
        .controller(FieldDef::new("vx", FieldCodec::float(-MAX_SPEED, MAX_SPEED, 0.01)?))
        .controller(FieldDef::new("vy", FieldCodec::float(-MAX_SPEED, MAX_SPEED, 0.01)?))
        .build()?;
    Ok(schema)
}

pub fn registry() -> CodecResult<Registry> {
    Ok(Registry::builder().register(pawn_schema()?).build()?)
}

/// Typed view of a pawn state.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Pawn {
    pub color: u32,
    pub x: f32,
    pub y: f32,
    pub hp: i32,
    pub bumps: u32,
    pub vx: f32,
    pub vy: f32,
}

impl Pawn {
    /// Reads a pawn out of `state`; `None` if a field is missing.
    pub fn read(schema: &StateSchema, state: &EntityState) -> Option<Self> {
        let float = |name| state.get(schema, name)?.as_float();
        Some(Self {
            color: state.get(schema, "color")?.as_uint()?,
            x: float("x")?,
            y: float("y")?,
            hp: state.get(schema, "hp")?.as_int()?,
            bumps: state.get(schema, "bumps")?.as_uint()?,
            vx: float("vx")?,
            vy: float("vy")?,
        })
    }

    /// Writes the mutable and controller fields into `state`.
    pub fn write(&self, schema: &StateSchema, state: &mut EntityState) -> CodecResult<()> {
        state.set(schema, "x", FieldValue::Float(self.x))?;
        state.set(schema, "y", FieldValue::Float(self.y))?;
        state.set(schema, "hp", FieldValue::Int(self.hp))?;
        state.set(schema, "bumps", FieldValue::UInt(self.bumps))?;
        state.set(schema, "vx", FieldValue::Float(self.vx))?;
        state.set(schema, "vy", FieldValue::Float(self.vy))
    }

    /// Distance between the positions of two pawns.
    pub fn distance(&self, other: &Self) -> f32 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// One tick of player input: a direction on each axis and a boost flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PawnCommand {
    pub dx: i8,
    pub dy: i8,
    pub boost: bool,
}

impl PawnCommand {
    pub fn new(dx: i8, dy: i8, boost: bool) -> Self {
        Self {
            dx: dx.signum(),
            dy: dy.signum(),
            boost,
        }
    }
}

fn pack_axis(buffer: &mut BitBuffer, value: i8) -> BitResult<()> {
    buffer.write(2, (i32::from(value.signum()) + 1) as u32)
}

fn unpack_axis(buffer: &mut BitBuffer) -> BitResult<i8> {
    // 3 is never written and reads as +1
    Ok((buffer.read(2)?.min(2) as i8) - 1)
}

impl Packable for PawnCommand {
    fn pack(&self, buffer: &mut BitBuffer) -> BitResult<()> {
        pack_axis(buffer, self.dx)?;
        pack_axis(buffer, self.dy)?;
        buffer.write_bool(self.boost);
        Ok(())
    }

    fn unpack(buffer: &mut BitBuffer) -> BitResult<Self> {
        Ok(Self {
            dx: unpack_axis(buffer)?,
            dy: unpack_axis(buffer)?,
            boost: buffer.read_bool()?,
        })
    }
}

/// Deterministic pawn movement shared by the host and predicting peers.
///
/// Input accelerates the pawn, friction slows it, and walls bounce it back
/// at the cost of one hit point. The result is rounded to wire precision so
/// a peer replaying from a received record reproduces the host exactly.
#[derive(Debug, Clone)]
pub struct PawnSim {
    schema: StateSchema,
}

impl PawnSim {
    pub fn new(schema: StateSchema) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &StateSchema {
        &self.schema
    }

    fn accelerate(speed: f32, direction: i8, accel: f32) -> f32 {
        let speed = (speed * FRICTION + f32::from(direction) * accel).clamp(-MAX_SPEED, MAX_SPEED);
        if speed.abs() < STOP_SPEED {
            0.0
        } else {
            speed
        }
    }

    fn advance(mut pawn: Pawn, command: Option<&PawnCommand>) -> Pawn {
        let command = command.copied().unwrap_or_default();
        let accel = if command.boost { BOOST_ACCEL } else { ACCEL };
        pawn.vx = Self::accelerate(pawn.vx, command.dx, accel);
        pawn.vy = Self::accelerate(pawn.vy, command.dy, accel);
        pawn.x += pawn.vx;
        pawn.y += pawn.vy;

        let mut bumped = false;
        if pawn.x.abs() > ARENA {
            pawn.x = pawn.x.clamp(-ARENA, ARENA);
            pawn.vx = -pawn.vx;
            bumped = true;
        }
        if pawn.y.abs() > ARENA {
            pawn.y = pawn.y.clamp(-ARENA, ARENA);
            pawn.vy = -pawn.vy;
            bumped = true;
        }
        if bumped {
            pawn.bumps += 1;
            pawn.hp = (pawn.hp - 1).max(0);
        }
        pawn
    }
}

impl Simulation for PawnSim {
    type Command = PawnCommand;

    fn step(&self, state: &mut EntityState, command: Option<&PawnCommand>) {
        let Some(pawn) = Pawn::read(&self.schema, state) else {
            return;
        };
        let next = Self::advance(pawn, command);
        if next.write(&self.schema, state).is_ok() {
            *state = state.quantized(&self.schema);
        }
    }
}
