//! Coercion of untyped [`Value`]s into typed column values
//!
//! Every column setter registered in an entity schema is generic over a
//! `V: FromValue`. The record's `new_value` is coerced into `V` right before
//! the setter runs; a coercion failure rejects only that record.
//!
//! Nullable columns are declared as `Option<T>`: `Null` maps to `None`, and
//! any other value is coerced into the underlying `T`.

use crate::contract::Timestamp;
use crate::error::UpsyncError;
use crate::types::{ColumnName, RowId};
use crate::value::Value;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Why a value could not be coerced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoercionFailure {
    /// Target type
    pub expected: &'static str,
    /// Variant of the value supplied
    pub found: &'static str,
}

impl CoercionFailure {
    fn of<T: FromValue>(value: &Value) -> Self {
        CoercionFailure {
            expected: T::TYPE_NAME,
            found: value.type_name(),
        }
    }

    /// Attach the column name, producing the error reported for the record.
    pub fn for_column(self, column: &ColumnName) -> UpsyncError {
        UpsyncError::Coercion {
            column: column.clone(),
            expected: self.expected,
            found: self.found,
        }
    }
}

/// Conversion from an untyped [`Value`]
pub trait FromValue: Sized {
    /// Type name used in error messages
    const TYPE_NAME: &'static str;

    /// Coerce `value` into `Self`
    fn from_value(value: Value) -> Result<Self, CoercionFailure>;
}

const U64_EXCLUSIVE_MAX: f64 = 18_446_744_073_709_551_616.0;
const I64_INCLUSIVE_MIN: f64 = -9_223_372_036_854_775_808.0;

macro_rules! integer_from_value {
    ($($t:ty),* $(,)?) => {
        $(
            impl FromValue for $t {
                const TYPE_NAME: &'static str = stringify!($t);

                fn from_value(value: Value) -> Result<Self, CoercionFailure> {
                    let fail = CoercionFailure::of::<Self>(&value);
                    match value {
                        Value::Int(i) => <$t>::try_from(i).map_err(|_| fail),
                        // -2^63, 2^64 are exact in f64; `as` would saturate past them
                        Value::Float(f) if f.is_finite() && f.fract() == 0.0 => {
                            if f >= 0.0 {
                                if f >= U64_EXCLUSIVE_MAX {
                                    return Err(fail);
                                }
                                <$t>::try_from(f as u64).map_err(|_| fail)
                            } else {
                                if f < I64_INCLUSIVE_MIN {
                                    return Err(fail);
                                }
                                <$t>::try_from(f as i64).map_err(|_| fail)
                            }
                        }
                        Value::Bool(b) => Ok(b as $t),
                        Value::String(s) => s.trim().parse::<$t>().map_err(|_| fail),
                        _ => Err(fail),
                    }
                }
            }
        )*
    };
}

integer_from_value!(i8, i16, i32, i64, u8, u16, u32, u64);

impl FromValue for f64 {
    const TYPE_NAME: &'static str = "f64";

    fn from_value(value: Value) -> Result<Self, CoercionFailure> {
        let fail = CoercionFailure::of::<Self>(&value);
        match value {
            Value::Float(f) => Ok(f),
            Value::Int(i) => Ok(i as f64),
            Value::String(s) => s.trim().parse::<f64>().map_err(|_| fail),
            _ => Err(fail),
        }
    }
}

impl FromValue for f32 {
    const TYPE_NAME: &'static str = "f32";

    fn from_value(value: Value) -> Result<Self, CoercionFailure> {
        let fail = CoercionFailure::of::<Self>(&value);
        let wide = f64::from_value(value).map_err(|_| fail.clone())?;
        if wide.is_finite() && wide.abs() > f32::MAX as f64 {
            return Err(fail);
        }
        Ok(wide as f32)
    }
}

impl FromValue for bool {
    const TYPE_NAME: &'static str = "bool";

    fn from_value(value: Value) -> Result<Self, CoercionFailure> {
        let fail = CoercionFailure::of::<Self>(&value);
        match value {
            Value::Bool(b) => Ok(b),
            Value::Int(i) => Ok(i != 0),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" => Ok(true),
                "false" => Ok(false),
                _ => Err(fail),
            },
            _ => Err(fail),
        }
    }
}

impl FromValue for String {
    const TYPE_NAME: &'static str = "String";

    fn from_value(value: Value) -> Result<Self, CoercionFailure> {
        match value {
            Value::String(s) => Ok(s),
            Value::Int(i) => Ok(i.to_string()),
            Value::Float(f) => Ok(f.to_string()),
            Value::Bool(b) => Ok(b.to_string()),
            other => Err(CoercionFailure::of::<Self>(&other)),
        }
    }
}

impl FromValue for Vec<u8> {
    const TYPE_NAME: &'static str = "Vec<u8>";

    fn from_value(value: Value) -> Result<Self, CoercionFailure> {
        let fail = CoercionFailure::of::<Self>(&value);
        match value {
            Value::Bytes(b) => Ok(b),
            Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::Int(i) => u8::try_from(i).map_err(|_| fail.clone()),
                    _ => Err(fail.clone()),
                })
                .collect(),
            _ => Err(fail),
        }
    }
}

impl FromValue for Uuid {
    const TYPE_NAME: &'static str = "Uuid";

    fn from_value(value: Value) -> Result<Self, CoercionFailure> {
        let fail = CoercionFailure::of::<Self>(&value);
        match value {
            Value::String(s) => Uuid::parse_str(s.trim()).map_err(|_| fail),
            Value::Bytes(b) => Uuid::from_slice(&b).map_err(|_| fail),
            _ => Err(fail),
        }
    }
}

impl FromValue for RowId {
    const TYPE_NAME: &'static str = "RowId";

    fn from_value(value: Value) -> Result<Self, CoercionFailure> {
        let found = value.type_name();
        Uuid::from_value(value)
            .map(RowId::from_uuid)
            .map_err(|_| CoercionFailure {
                expected: Self::TYPE_NAME,
                found,
            })
    }
}

impl FromValue for Timestamp {
    const TYPE_NAME: &'static str = "Timestamp";

    fn from_value(value: Value) -> Result<Self, CoercionFailure> {
        let fail = CoercionFailure::of::<Self>(&value);
        match value {
            Value::Int(micros) => u64::try_from(micros)
                .map(Timestamp::from_micros)
                .map_err(|_| fail),
            Value::String(s) => Timestamp::parse_rfc3339(s.trim()).ok_or(fail),
            _ => Err(fail),
        }
    }
}

impl FromValue for DateTime<Utc> {
    const TYPE_NAME: &'static str = "DateTime<Utc>";

    fn from_value(value: Value) -> Result<Self, CoercionFailure> {
        let fail = CoercionFailure::of::<Self>(&value);
        match value {
            Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|_| fail),
            Value::Int(micros) => DateTime::from_timestamp_micros(micros).ok_or(fail),
            _ => Err(fail),
        }
    }
}

impl FromValue for Value {
    const TYPE_NAME: &'static str = "Value";

    fn from_value(value: Value) -> Result<Self, CoercionFailure> {
        Ok(value)
    }
}

impl<T: FromValue> FromValue for Option<T> {
    const TYPE_NAME: &'static str = T::TYPE_NAME;

    fn from_value(value: Value) -> Result<Self, CoercionFailure> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_integer_coercions() {
        assert_eq!(i32::from_value(Value::Int(42)), Ok(42));
        assert_eq!(i32::from_value(Value::Float(7.0)), Ok(7));
        assert_eq!(i32::from_value(Value::String(" 12 ".into())), Ok(12));
        assert_eq!(u8::from_value(Value::Bool(true)), Ok(1));
        assert!(i32::from_value(Value::Float(7.5)).is_err());
        assert!(u8::from_value(Value::Int(256)).is_err());
        assert!(u32::from_value(Value::Int(-1)).is_err());
        assert!(i64::from_value(Value::Float(f64::INFINITY)).is_err());
    }

    #[test]
    fn test_integral_floats_at_the_64_bit_edges() {
        let two_63 = 9_223_372_036_854_775_808.0;
        let two_64 = 18_446_744_073_709_551_616.0;

        // No saturation at i64::MAX
        assert!(i64::from_value(Value::Float(two_63)).is_err());
        assert_eq!(i64::from_value(Value::Float(-two_63)), Ok(i64::MIN));
        assert!(i64::from_value(Value::Float(-two_63 * 2.0)).is_err());

        // u64 columns reach past i64::MAX
        assert_eq!(u64::from_value(Value::Float(two_63)), Ok(1u64 << 63));
        assert_eq!(
            u64::from_value(Value::Float(18_446_744_073_709_549_568.0)),
            Ok(18_446_744_073_709_549_568)
        );
        assert!(u64::from_value(Value::Float(two_64)).is_err());
        assert!(u64::from_value(Value::Float(-1.0)).is_err());
        assert_eq!(u64::from_value(Value::Float(-0.0)), Ok(0));
    }

    #[test]
    fn test_u64_above_i64_max_from_json() {
        let value = Value::from(serde_json::json!(12_000_000_000_000_000_000u64));
        assert_eq!(u64::from_value(value), Ok(12_000_000_000_000_000_000));
    }

    #[test]
    fn test_null_into_non_nullable_fails() {
        let err = i32::from_value(Value::Null).unwrap_err();
        assert_eq!(err.expected, "i32");
        assert_eq!(err.found, "Null");
        assert!(String::from_value(Value::Null).is_err());
    }

    #[test]
    fn test_nullable_unwraps_before_coercion() {
        assert_eq!(Option::<i32>::from_value(Value::Null), Ok(None));
        assert_eq!(Option::<i32>::from_value(Value::String("5".into())), Ok(Some(5)));
        let err = Option::<i32>::from_value(Value::String("five".into())).unwrap_err();
        assert_eq!(err.expected, "i32");
    }

    #[test]
    fn test_string_accepts_scalars() {
        assert_eq!(String::from_value(Value::Int(3)), Ok("3".to_string()));
        assert_eq!(String::from_value(Value::Bool(false)), Ok("false".to_string()));
        assert!(String::from_value(Value::Array(vec![])).is_err());
    }

    #[test]
    fn test_bool_coercions() {
        assert_eq!(bool::from_value(Value::String("TRUE".into())), Ok(true));
        assert_eq!(bool::from_value(Value::Int(0)), Ok(false));
        assert!(bool::from_value(Value::String("yes".into())).is_err());
    }

    #[test]
    fn test_float_coercions() {
        assert_eq!(f64::from_value(Value::Int(2)), Ok(2.0));
        assert_eq!(f32::from_value(Value::String("1.5".into())), Ok(1.5));
        assert!(f32::from_value(Value::Float(1e300)).is_err());
    }

    #[test]
    fn test_bytes_from_array() {
        let v = Value::Array(vec![Value::Int(1), Value::Int(255)]);
        assert_eq!(Vec::<u8>::from_value(v), Ok(vec![1, 255]));
        let v = Value::Array(vec![Value::Int(256)]);
        assert!(Vec::<u8>::from_value(v).is_err());
    }

    #[test]
    fn test_uuid_and_row_id() {
        let id = Uuid::new_v4();
        assert_eq!(Uuid::from_value(Value::String(id.to_string())), Ok(id));
        assert_eq!(
            RowId::from_value(Value::String(id.to_string())),
            Ok(RowId::from_uuid(id))
        );
        let err = RowId::from_value(Value::Int(1)).unwrap_err();
        assert_eq!(err.expected, "RowId");
    }

    #[test]
    fn test_timestamp_coercions() {
        assert_eq!(
            Timestamp::from_value(Value::Int(1_000)),
            Ok(Timestamp::from_micros(1_000))
        );
        assert_eq!(
            Timestamp::from_value(Value::String("1970-01-01T00:00:02Z".into())),
            Ok(Timestamp::from_secs(2))
        );
        assert!(Timestamp::from_value(Value::Int(-1)).is_err());
    }

    #[test]
    fn test_datetime_coercion() {
        let dt = DateTime::<Utc>::from_value(Value::String("2024-05-01T00:00:00+02:00".into()))
            .unwrap();
        assert_eq!(dt.to_rfc3339(), "2024-04-30T22:00:00+00:00");
    }

    #[test]
    fn test_failure_names_column() {
        let err = CoercionFailure {
            expected: "i32",
            found: "String",
        }
        .for_column(&ColumnName::from("Age"));
        assert!(matches!(err, UpsyncError::Coercion { ref column, .. } if column.as_str() == "Age"));
    }

    proptest! {
        #[test]
        fn prop_i64_roundtrips_through_int(i in any::<i64>()) {
            prop_assert_eq!(i64::from_value(Value::Int(i)), Ok(i));
        }

        #[test]
        fn prop_i32_from_string_matches_parse(s in "-?[0-9]{1,12}") {
            let expected = s.parse::<i32>().ok();
            prop_assert_eq!(i32::from_value(Value::String(s)).ok(), expected);
        }
    }
}
