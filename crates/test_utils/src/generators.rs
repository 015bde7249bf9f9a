//! Property-Based Test Generators
//!
//! Proptest strategies for column values, field mask paths and test
//! records.

use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use rowkit_kernel::Value;
use rust_decimal::Decimal;

use crate::models::TestUser;

/// Writable field names of [`TestUser`]
pub const USER_FIELDS: &[&str] = &["Name", "PhoneNumber", "Email"];

/// Strategy for column values of every variant except JSON
pub fn value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Int),
        (-1.0e9f64..1.0e9f64).prop_map(Value::Float),
        "[a-zA-Z0-9 ]{0,24}".prop_map(Value::Text),
        prop::collection::vec(any::<u8>(), 0..16).prop_map(Value::Bytes),
        (any::<i64>(), 0u32..10).prop_map(|(m, s)| Value::Decimal(Decimal::new(m, s))),
        (0i64..4_000_000_000i64).prop_map(|secs| {
            Value::Timestamp(Utc.timestamp_opt(secs, 0).single().unwrap_or_default())
        }),
    ]
}

/// Strategy for a non-empty subset of the writable user fields, in any case
pub fn user_field_paths_strategy() -> impl Strategy<Value = Vec<String>> {
    prop::sample::subsequence(USER_FIELDS.to_vec(), 1..=USER_FIELDS.len()).prop_flat_map(
        |fields| {
            let n = fields.len();
            (Just(fields), prop::collection::vec(any::<bool>(), n)).prop_map(|(fields, upper)| {
                fields
                    .iter()
                    .zip(upper)
                    .map(|(f, up)| if up { f.to_uppercase() } else { f.to_string() })
                    .collect()
            })
        },
    )
}

/// Strategy for users with every writable field non-empty
pub fn user_strategy() -> impl Strategy<Value = TestUser> {
    ("[a-z]{4,12}", "[a-z]{3,8}@example\\.com", "[0-9]{7,10}").prop_map(|(name, email, phone)| {
        let mut user = TestUser::new();
        user.name = name;
        user.email = email;
        user.phone_number = phone;
        user
    })
}

/// Strategy for retry attempt numbers
pub fn attempt_strategy() -> impl Strategy<Value = u32> {
    1u32..64
}
