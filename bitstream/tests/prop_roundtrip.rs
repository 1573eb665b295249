use bitstream::{BitBuffer, FloatCompressor, IntCompressor};
use proptest::prelude::*;

#[derive(Clone, Debug)]
enum Op {
    Bit(bool),
    Bits { bits: u8, value: u32 },
    VarU32(u32),
    VarS32(i32),
}

fn mask_value(bits: u8, value: u32) -> u32 {
    if bits >= 32 {
        value
    } else {
        value & ((1u32 << bits) - 1)
    }
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        any::<bool>().prop_map(Op::Bit),
        (0u8..=32, any::<u32>()).prop_map(|(bits, value)| Op::Bits {
            bits,
            value: mask_value(bits, value),
        }),
        // full-width values exercise word straddling
        any::<u32>().prop_map(|value| Op::Bits { bits: 32, value }),
        any::<u32>().prop_map(Op::VarU32),
        any::<i32>().prop_map(Op::VarS32),
    ]
}

fn write_op(buffer: &mut BitBuffer, op: &Op) {
    match op {
        Op::Bit(b) => buffer.write_bool(*b),
        Op::Bits { bits, value } => buffer.write(*bits, *value).unwrap(),
        Op::VarU32(v) => buffer.write_var_uint(*v),
        Op::VarS32(v) => buffer.write_var_int(*v),
    }
}

fn check_op(buffer: &mut BitBuffer, op: &Op) -> Result<(), TestCaseError> {
    match op {
        Op::Bit(b) => prop_assert_eq!(buffer.read_bool().unwrap(), *b),
        Op::Bits { bits, value } => prop_assert_eq!(buffer.read(*bits).unwrap(), *value),
        Op::VarU32(v) => prop_assert_eq!(buffer.read_var_uint().unwrap(), *v),
        Op::VarS32(v) => prop_assert_eq!(buffer.read_var_int().unwrap(), *v),
    }
    Ok(())
}

proptest! {
    #[test]
    fn prop_roundtrip_ops(ops in prop::collection::vec(op_strategy(), 1..256)) {
        // start small so the sequence crosses several growth boundaries
        let mut buffer = BitBuffer::with_capacity(1);
        for op in &ops {
            write_op(&mut buffer, op);
        }

        for op in &ops {
            check_op(&mut buffer, op)?;
        }
        prop_assert!(buffer.is_empty());
        prop_assert!(buffer.read_bool().is_err());
    }

    #[test]
    fn prop_roundtrip_through_bytes(ops in prop::collection::vec(op_strategy(), 1..64)) {
        let mut buffer = BitBuffer::new();
        for op in &ops {
            write_op(&mut buffer, op);
        }
        let written = buffer.bits_written();

        let mut decoded = BitBuffer::from_bytes(&buffer.to_bytes());
        for op in &ops {
            check_op(&mut decoded, op)?;
        }
        // only zero padding remains
        prop_assert!(decoded.bits_remaining() < 8);
        prop_assert_eq!(decoded.read_position(), written);
    }

    #[test]
    fn prop_underrun_never_yields_value(ops in prop::collection::vec(op_strategy(), 0..32), extra in 1u8..=32) {
        let mut buffer = BitBuffer::new();
        for op in &ops {
            write_op(&mut buffer, op);
        }
        let written = buffer.bits_written();
        buffer.skip(written).unwrap();
        prop_assert!(buffer.read(extra).is_err());
        prop_assert_eq!(buffer.read_position(), written);
    }

    #[test]
    fn prop_float_compressor_bounds(
        min in -1000.0f32..1000.0,
        span in 0.0f32..1000.0,
        precision in 0.001f32..10.0,
        value in -5000.0f32..5000.0,
    ) {
        let max = min + span;
        let compressor = FloatCompressor::new(min, max, precision).unwrap();
        let mut buffer = BitBuffer::new();
        compressor.write(&mut buffer, value).unwrap();
        prop_assert_eq!(buffer.bits_written(), compressor.bits() as usize);

        let decoded = compressor.read(&mut buffer).unwrap();
        let expected = value.clamp(min, max);
        prop_assert!(
            (decoded - expected).abs() <= precision,
            "decoded {} expected {} precision {}",
            decoded,
            expected,
            precision
        );
        prop_assert!(decoded >= min && decoded <= max);
    }

    #[test]
    fn prop_int_compressor_bounds(a in any::<i32>(), b in any::<i32>(), value in any::<i32>()) {
        let (min, max) = if a <= b { (a, b) } else { (b, a) };
        let compressor = IntCompressor::new(min, max).unwrap();
        let mut buffer = BitBuffer::new();
        compressor.write(&mut buffer, value).unwrap();
        prop_assert_eq!(compressor.read(&mut buffer).unwrap(), value.clamp(min, max));
    }
}
