//! Custom Test Assertions
//!
//! Assertion helpers for rowkit errors and records that give more
//! meaningful failure messages than a bare `assert!`.

use rowkit_kernel::{DbError, ErrorKind, Row, StoreErrorKind, Value};

use crate::models::TestUser;

/// Asserts that an error is an invalid parameter error mentioning `fragment`
///
/// # Panics
///
/// Panics if the error has a different kind or its message lacks `fragment`
pub fn assert_invalid_parameter(err: &DbError, fragment: &str) {
    assert_eq!(
        err.kind(),
        ErrorKind::InvalidParameter,
        "Expected invalid parameter error, got: {}",
        err
    );
    assert!(
        err.to_string().contains(fragment),
        "Error message {:?} does not contain {:?}",
        err.to_string(),
        fragment
    );
}

/// Asserts that an error came from the store with the given kind
pub fn assert_store_error(err: &DbError, kind: StoreErrorKind) {
    assert_eq!(
        err.store_kind(),
        Some(kind),
        "Expected store error {:?}, got: {}",
        kind,
        err
    );
}

/// Asserts that an error renders exactly as `expected`
pub fn assert_error_message(err: &DbError, expected: &str) {
    assert_eq!(err.to_string(), expected, "Unexpected error message");
}

/// Asserts that a row holds `expected` in `column`
///
/// # Panics
///
/// Panics if the column is missing or holds a different value
pub fn assert_column(row: &Row, column: &str, expected: &Value) {
    match row.get(column) {
        Some(actual) => assert_eq!(
            actual, expected,
            "Column {} holds {}, expected {}",
            column, actual, expected
        ),
        None => panic!("Row has no column {}: {:?}", column, row),
    }
}

/// Asserts that two users hold the same writable field values
///
/// Store-maintained timestamps are ignored.
pub fn assert_same_user(actual: &TestUser, expected: &TestUser) {
    assert_eq!(actual.public_id, expected.public_id, "public_id mismatch");
    assert_eq!(actual.name, expected.name, "name mismatch");
    assert_eq!(actual.email, expected.email, "email mismatch");
    assert_eq!(
        actual.phone_number, expected.phone_number,
        "phone_number mismatch"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assert_invalid_parameter() {
        let err = DbError::invalid("missing public id").with_op("rowkit.Create");
        assert_invalid_parameter(&err, "missing public id");
        assert_error_message(&err, "rowkit.Create: missing public id: invalid parameter");
    }

    #[test]
    #[should_panic(expected = "Expected store error")]
    fn test_assert_store_error_mismatch() {
        assert_store_error(&DbError::invalid("x"), StoreErrorKind::Deadlock);
    }

    #[test]
    fn test_assert_column() {
        let mut row = Row::new();
        row.insert("version".into(), Value::Int(2));
        assert_column(&row, "version", &Value::Int(2));
    }
}
