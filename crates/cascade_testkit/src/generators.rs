//! Property-based test generators using proptest.

use cascade_value::{DataType, Value};
use proptest::prelude::*;

/// Strategy for generating field names.
pub fn field_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_]{0,15}").expect("Invalid regex")
}

/// Strategy for generating any scalar value.
pub fn value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Integer),
        (-1.0e9f64..1.0e9).prop_map(Value::Float),
        "[ -~]{0,24}".prop_map(Value::Text),
    ]
}

/// Strategy for generating declared data types that round-trip through
/// text.
pub fn data_type_strategy() -> impl Strategy<Value = DataType> {
    prop_oneof![
        Just(DataType::Integer),
        Just(DataType::Float),
        Just(DataType::Boolean),
        Just(DataType::Text),
    ]
}

/// Strategy for generating a value already of `data_type`.
pub fn typed_value_strategy(data_type: DataType) -> BoxedStrategy<Value> {
    let value = match data_type {
        DataType::Integer => any::<i64>().prop_map(Value::Integer).boxed(),
        DataType::Float => (-1.0e9f64..1.0e9).prop_map(Value::Float).boxed(),
        DataType::Boolean => any::<bool>().prop_map(Value::Bool).boxed(),
        DataType::Text | DataType::Timestamp => "[a-zA-Z0-9 ]{0,24}".prop_map(Value::Text).boxed(),
        DataType::Blob => prop::collection::vec(any::<u8>(), 0..32)
            .prop_map(Value::Bytes)
            .boxed(),
    };
    prop_oneof![1 => Just(Value::Null), 8 => value].boxed()
}

/// Strategy for generating order line quantities.
pub fn quantities_strategy() -> impl Strategy<Value = Vec<i64>> {
    prop::collection::vec(1i64..100, 0..6)
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn typed_values_are_compatible(
            (data_type, value) in data_type_strategy()
                .prop_flat_map(|dt| (Just(dt), typed_value_strategy(dt)))
        ) {
            prop_assert!(value.is_null() || data_type.is_compatible(&value));
        }
    }
}
