//! Reading and writing single field values.

use bitstream::BitBuffer;
use schema::{FieldCodec, FieldDef, FieldValue};

use crate::error::{CodecError, CodecResult};

/// Writes one value with its field's codec.
///
/// Range-compressed codecs clamp out-of-range input; fixed-width integers
/// that do not fit their width are an error.
pub(crate) fn write_field_value(
    field: &FieldDef,
    value: FieldValue,
    buffer: &mut BitBuffer,
) -> CodecResult<()> {
    match (field.codec, value) {
        (FieldCodec::Bool, FieldValue::Bool(v)) => buffer.write_bool(v),
        (FieldCodec::UInt { bits }, FieldValue::UInt(v)) => buffer.write(bits, v)?,
        (FieldCodec::VarUInt, FieldValue::UInt(v)) => buffer.write_var_uint(v),
        (FieldCodec::VarInt, FieldValue::Int(v)) => buffer.write_var_int(v),
        (FieldCodec::Int(c), FieldValue::Int(v)) => c.write(buffer, v)?,
        (FieldCodec::Float(c), FieldValue::Float(v)) => c.write(buffer, v)?,
        _ => return Err(kind_mismatch(field, value)),
    }
    Ok(())
}

/// Reads one value with its field's codec.
pub(crate) fn read_field_value(field: &FieldDef, buffer: &mut BitBuffer) -> CodecResult<FieldValue> {
    let value = match field.codec {
        FieldCodec::Bool => FieldValue::Bool(buffer.read_bool()?),
        FieldCodec::UInt { bits } => FieldValue::UInt(buffer.read(bits)?),
        FieldCodec::VarUInt => FieldValue::UInt(buffer.read_var_uint()?),
        FieldCodec::VarInt => FieldValue::Int(buffer.read_var_int()?),
        FieldCodec::Int(c) => FieldValue::Int(c.read(buffer)?),
        FieldCodec::Float(c) => FieldValue::Float(c.read(buffer)?),
    };
    Ok(value)
}

/// Returns the value a receiver decodes after `value` goes over the wire.
pub(crate) fn quantize(field: &FieldDef, value: FieldValue) -> FieldValue {
    match (field.codec, value) {
        (FieldCodec::Int(c), FieldValue::Int(v)) => FieldValue::Int(c.unpack(c.pack(v))),
        (FieldCodec::Float(c), FieldValue::Float(v)) => FieldValue::Float(c.unpack(c.pack(v))),
        _ => value,
    }
}

/// Checks that a value can be stored in a field.
pub(crate) fn check_kind(field: &FieldDef, value: FieldValue) -> CodecResult<()> {
    if field.codec.kind() == value.kind() {
        Ok(())
    } else {
        Err(kind_mismatch(field, value))
    }
}

fn kind_mismatch(field: &FieldDef, value: FieldValue) -> CodecError {
    CodecError::InvalidValue {
        field: field.name,
        expected: field.codec.kind(),
        actual: value.kind(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitstream::BitError;
    use schema::FieldKind;
    use wire::WireError;

    #[test]
    fn every_codec_roundtrips() {
        let fields = [
            (FieldDef::new("b", FieldCodec::bool()), FieldValue::Bool(true)),
            (FieldDef::new("u", FieldCodec::uint(6)), FieldValue::UInt(63)),
            (FieldDef::new("vu", FieldCodec::var_uint()), FieldValue::UInt(1 << 30)),
            (FieldDef::new("vi", FieldCodec::var_int()), FieldValue::Int(-70_000)),
            (FieldDef::new("i", FieldCodec::int(-50, 50).unwrap()), FieldValue::Int(-17)),
            (
                FieldDef::new("f", FieldCodec::float(-8.0, 8.0, 0.5).unwrap()),
                FieldValue::Float(2.5),
            ),
        ];
        let mut buffer = BitBuffer::new();
        for (field, value) in &fields {
            write_field_value(field, *value, &mut buffer).unwrap();
        }
        for (field, value) in &fields {
            assert_eq!(read_field_value(field, &mut buffer).unwrap(), *value);
        }
    }

    #[test]
    fn kind_mismatch_is_rejected() {
        let field = FieldDef::new("u", FieldCodec::uint(4));
        let mut buffer = BitBuffer::new();
        let err = write_field_value(&field, FieldValue::Bool(true), &mut buffer).unwrap_err();
        assert_eq!(
            err,
            CodecError::InvalidValue {
                field: "u",
                expected: FieldKind::UInt,
                actual: FieldKind::Bool,
            }
        );
        assert_eq!(buffer.bits_written(), 0);
    }

    #[test]
    fn fixed_width_overflow_is_an_error() {
        let field = FieldDef::new("u", FieldCodec::uint(4));
        let mut buffer = BitBuffer::new();
        let err = write_field_value(&field, FieldValue::UInt(16), &mut buffer).unwrap_err();
        assert!(matches!(
            err,
            CodecError::Wire(WireError::Bit(BitError::ValueOutOfRange { .. }))
        ));
    }

    #[test]
    fn quantize_matches_wire_result() {
        let field = FieldDef::new("f", FieldCodec::float(0.0, 10.0, 0.25).unwrap());
        let value = FieldValue::Float(3.3);
        let mut buffer = BitBuffer::new();
        write_field_value(&field, value, &mut buffer).unwrap();
        assert_eq!(
            read_field_value(&field, &mut buffer).unwrap(),
            quantize(&field, value)
        );
        assert_eq!(quantize(&field, FieldValue::Float(99.0)), FieldValue::Float(10.0));
    }
}
