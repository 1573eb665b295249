//! The single interpolation function shared by smoothing and prediction.

use codec::EntityState;
use schema::{FieldDef, FieldGroup, FieldValue, Interpolation, StateSchema};

/// Blends two states of the same object field by field.
///
/// Linear float fields lerp with `t` unclamped, so `t > 1` extrapolates.
/// Linear integer fields lerp and round. Every other field, the immutable
/// group and the destroy marker take `from` while `t < 1` and `to` after.
#[must_use]
pub fn blend(schema: &StateSchema, from: &EntityState, to: &EntityState, t: f32) -> EntityState {
    let mut out = if t < 1.0 { from.clone() } else { to.clone() };
    for group in [FieldGroup::Mutable, FieldGroup::Controller] {
        let defs = schema.fields(group);
        let a = from.fields(group);
        let b = to.fields(group);
        out.update_fields(group, |index, current| {
            match (defs.get(index), a.get(index), b.get(index)) {
                (Some(def), Some(a), Some(b)) => blend_field(def, *a, *b, t),
                _ => current,
            }
        });
    }
    out
}

/// Blends one value according to its field's interpolation policy.
#[must_use]
pub fn blend_field(def: &FieldDef, from: FieldValue, to: FieldValue, t: f32) -> FieldValue {
    let snapped = if t < 1.0 { from } else { to };
    if def.interpolation != Interpolation::Linear {
        return snapped;
    }
    let t = f64::from(t);
    match (from, to) {
        (FieldValue::Float(a), FieldValue::Float(b)) => {
            FieldValue::Float(a + (b - a) * t as f32)
        }
        (FieldValue::Int(a), FieldValue::Int(b)) => {
            let value = lerp(f64::from(a), f64::from(b), t).round();
            FieldValue::Int(value.clamp(f64::from(i32::MIN), f64::from(i32::MAX)) as i32)
        }
        (FieldValue::UInt(a), FieldValue::UInt(b)) => {
            let value = lerp(f64::from(a), f64::from(b), t).round();
            FieldValue::UInt(value.clamp(0.0, f64::from(u32::MAX)) as u32)
        }
        _ => snapped,
    }
}

fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use codec::{EntityId, Tick};
    use schema::{FieldCodec, TypeTag};

    fn schema() -> StateSchema {
        StateSchema::builder("unit")
            .immutable(FieldDef::new("team", FieldCodec::uint(2)))
            .mutable(FieldDef::new("x", FieldCodec::float(-100.0, 100.0, 0.01).unwrap()))
            .mutable(FieldDef::new("hp", FieldCodec::int(0, 100).unwrap()).interpolated())
            .mutable(FieldDef::new("stance", FieldCodec::uint(3)))
            .mutable(FieldDef::new("hidden", FieldCodec::float(-1.0, 1.0, 0.1).unwrap()).snapped())
            .controller(FieldDef::new("aim", FieldCodec::float(-4.0, 4.0, 0.01).unwrap()))
            .build()
            .unwrap()
    }

    fn pair(schema: &StateSchema) -> (EntityState, EntityState) {
        let mut a = EntityState::new(schema, TypeTag::new(0), EntityId::new(1));
        let mut b = a.clone();
        a.set(schema, "x", FieldValue::Float(0.0)).unwrap();
        b.set(schema, "x", FieldValue::Float(10.0)).unwrap();
        a.set(schema, "hp", FieldValue::Int(10)).unwrap();
        b.set(schema, "hp", FieldValue::Int(15)).unwrap();
        a.set(schema, "stance", FieldValue::UInt(1)).unwrap();
        b.set(schema, "stance", FieldValue::UInt(2)).unwrap();
        a.set(schema, "hidden", FieldValue::Float(-1.0)).unwrap();
        b.set(schema, "hidden", FieldValue::Float(1.0)).unwrap();
        a.set(schema, "aim", FieldValue::Float(1.0)).unwrap();
        b.set(schema, "aim", FieldValue::Float(2.0)).unwrap();
        b.set(schema, "team", FieldValue::UInt(3)).unwrap();
        (a, b)
    }

    fn float(state: &EntityState, schema: &StateSchema, name: &str) -> f32 {
        state.get(schema, name).and_then(|v| v.as_float()).unwrap()
    }

    #[test]
    fn midpoint() {
        let schema = schema();
        let (a, b) = pair(&schema);
        let mid = blend(&schema, &a, &b, 0.5);
        assert_relative_eq!(float(&mid, &schema, "x"), 5.0);
        assert_relative_eq!(float(&mid, &schema, "aim"), 1.5);
        assert_eq!(mid.get(&schema, "hp"), Some(FieldValue::Int(13)));
        assert_eq!(mid.get(&schema, "stance"), Some(FieldValue::UInt(1)));
        assert_relative_eq!(float(&mid, &schema, "hidden"), -1.0);
        assert_eq!(mid.get(&schema, "team"), Some(FieldValue::UInt(0)));
    }

    #[test]
    fn endpoints() {
        let schema = schema();
        let (a, b) = pair(&schema);
        assert_eq!(blend(&schema, &a, &b, 0.0), a);
        let end = blend(&schema, &a, &b, 1.0);
        assert_relative_eq!(float(&end, &schema, "x"), 10.0);
        assert_eq!(end.get(&schema, "stance"), Some(FieldValue::UInt(2)));
        assert_eq!(end.get(&schema, "team"), Some(FieldValue::UInt(3)));
    }

    #[test]
    fn extrapolates_past_one() {
        let schema = schema();
        let (a, b) = pair(&schema);
        let ahead = blend(&schema, &a, &b, 1.5);
        assert_relative_eq!(float(&ahead, &schema, "x"), 15.0);
        assert_eq!(ahead.get(&schema, "hp"), Some(FieldValue::Int(18)));
        assert_eq!(ahead.get(&schema, "stance"), Some(FieldValue::UInt(2)));
    }

    #[test]
    fn destroy_marker_follows_snap_rule() {
        let schema = schema();
        let (a, mut b) = pair(&schema);
        b.set_destroyed_at(Some(Tick::from_raw(9)));
        assert!(!blend(&schema, &a, &b, 0.9).is_destroyed());
        assert!(blend(&schema, &a, &b, 1.0).is_destroyed());
    }

    #[test]
    fn unsigned_lerp_never_goes_negative() {
        let def = FieldDef::new("n", FieldCodec::uint(8)).interpolated();
        let value = blend_field(&def, FieldValue::UInt(10), FieldValue::UInt(2), 3.0);
        assert_eq!(value, FieldValue::UInt(0));
    }
}
