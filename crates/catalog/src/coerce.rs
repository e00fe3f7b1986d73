//! Conversion of untyped write values to typed variants.

use serde_json::Value;

use plcwatch_protocol::{DataType, Variant};

use crate::error::CoercionError;

/// Converts `raw` to a [`Variant`] of `data_type`.
///
/// Integers are range-checked; fractional inputs are truncated toward zero.
/// Types without a dedicated conversion pass the raw value through untouched.
pub fn coerce(raw: &Value, data_type: DataType) -> Result<Variant, CoercionError> {
    let fail = || CoercionError {
        value: raw.clone(),
        data_type,
    };

    let variant = match data_type {
        DataType::Boolean => Variant::Boolean(to_bool(raw)),
        DataType::SByte => Variant::SByte(to_int(raw).ok_or_else(fail)?),
        DataType::Byte => Variant::Byte(to_int(raw).ok_or_else(fail)?),
        DataType::Int16 => Variant::Int16(to_int(raw).ok_or_else(fail)?),
        DataType::UInt16 => Variant::UInt16(to_int(raw).ok_or_else(fail)?),
        DataType::Int32 => Variant::Int32(to_int(raw).ok_or_else(fail)?),
        DataType::UInt32 => Variant::UInt32(to_int(raw).ok_or_else(fail)?),
        DataType::Int64 => Variant::Int64(to_int(raw).ok_or_else(fail)?),
        DataType::UInt64 => Variant::UInt64(to_int(raw).ok_or_else(fail)?),
        DataType::Float => {
            let single = to_f64(raw).ok_or_else(fail)? as f32;
            if !single.is_finite() {
                return Err(fail());
            }
            Variant::Float(single)
        }
        DataType::Double => Variant::Double(to_f64(raw).ok_or_else(fail)?),
        DataType::String => Variant::String(match raw {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }),
        DataType::DateTime | DataType::ByteString | DataType::Unknown => Variant::Raw(raw.clone()),
    };
    Ok(variant)
}

/// `"true"`/`"false"`/`"1"`/`"0"` strings are parsed; anything else follows
/// truthiness (non-zero numbers, non-empty strings, arrays and objects).
fn to_bool(raw: &Value) -> bool {
    match raw {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => true,
            "false" | "0" | "" => false,
            _ => true,
        },
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn to_int<T: TryFrom<i128>>(raw: &Value) -> Option<T> {
    let wide = match raw {
        Value::Number(n) => n
            .as_i64()
            .map(i128::from)
            .or_else(|| n.as_u64().map(i128::from))
            .or_else(|| truncate(n.as_f64()?)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i128>()
                .ok()
                .or_else(|| truncate(s.parse::<f64>().ok()?))
        }
        _ => None,
    }?;
    T::try_from(wide).ok()
}

fn truncate(f: f64) -> Option<i128> {
    f.is_finite().then(|| f.trunc() as i128)
}

fn to_f64(raw: &Value) -> Option<f64> {
    let f = match raw {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    f.is_finite().then_some(f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn boolean_accepts_common_spellings() {
        assert_eq!(coerce(&json!(true), DataType::Boolean).unwrap(), Variant::Boolean(true));
        assert_eq!(coerce(&json!("false"), DataType::Boolean).unwrap(), Variant::Boolean(false));
        assert_eq!(coerce(&json!("TRUE"), DataType::Boolean).unwrap(), Variant::Boolean(true));
        assert_eq!(coerce(&json!("0"), DataType::Boolean).unwrap(), Variant::Boolean(false));
        assert_eq!(coerce(&json!(1), DataType::Boolean).unwrap(), Variant::Boolean(true));
        assert_eq!(coerce(&json!(0), DataType::Boolean).unwrap(), Variant::Boolean(false));
        assert_eq!(coerce(&json!(null), DataType::Boolean).unwrap(), Variant::Boolean(false));
        assert_eq!(coerce(&json!("on"), DataType::Boolean).unwrap(), Variant::Boolean(true));
    }

    #[test]
    fn integers_are_range_checked() {
        assert_eq!(coerce(&json!(42), DataType::Int16).unwrap(), Variant::Int16(42));
        assert_eq!(coerce(&json!("-7"), DataType::Int32).unwrap(), Variant::Int32(-7));
        assert_eq!(coerce(&json!(3.9), DataType::UInt16).unwrap(), Variant::UInt16(3));
        assert_eq!(coerce(&json!(" 12 "), DataType::Byte).unwrap(), Variant::Byte(12));

        let err = coerce(&json!(70000), DataType::Int16).unwrap_err();
        assert_eq!(err.data_type, DataType::Int16);
        assert!(coerce(&json!(-1), DataType::UInt32).is_err());
        assert!(coerce(&json!(128), DataType::SByte).is_err());
        assert!(coerce(&json!("abc"), DataType::Int32).is_err());
        assert!(coerce(&json!(true), DataType::Int32).is_err());
    }

    #[test]
    fn wide_integers() {
        assert_eq!(
            coerce(&json!(u64::MAX), DataType::UInt64).unwrap(),
            Variant::UInt64(u64::MAX)
        );
        assert_eq!(
            coerce(&json!(i64::MIN), DataType::Int64).unwrap(),
            Variant::Int64(i64::MIN)
        );
        assert!(coerce(&json!(u64::MAX), DataType::Int64).is_err());
    }

    #[test]
    fn floats() {
        assert_eq!(coerce(&json!(1.5), DataType::Double).unwrap(), Variant::Double(1.5));
        assert_eq!(coerce(&json!("2.25"), DataType::Float).unwrap(), Variant::Float(2.25));
        assert!(coerce(&json!(1e300), DataType::Float).is_err());
        assert!(coerce(&json!("NaN"), DataType::Double).is_err());
        assert!(coerce(&json!([1.0]), DataType::Double).is_err());
    }

    #[test]
    fn strings_cast_anything() {
        assert_eq!(
            coerce(&json!("hi"), DataType::String).unwrap(),
            Variant::String("hi".into())
        );
        assert_eq!(
            coerce(&json!(12), DataType::String).unwrap(),
            Variant::String("12".into())
        );
    }

    #[test]
    fn untyped_kinds_pass_raw_value_through() {
        let raw = json!("2024-01-01T00:00:00Z");
        for ty in [DataType::DateTime, DataType::ByteString, DataType::Unknown] {
            assert_eq!(coerce(&raw, ty).unwrap(), Variant::Raw(raw.clone()));
        }
    }
}
