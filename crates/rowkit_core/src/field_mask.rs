//! Field mask reconciliation
//!
//! Callers describe a partial update with two lists of field names: the
//! fields to set to their current value and the fields to clear. This module
//! validates such a pair against a record and turns it into column
//! assignments, and builds the pair from a sparse map of values.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use rowkit_kernel::{AssignValue, DbError, FieldInfo, Resource, Value};

const UPDATE_FIELDS_OP: &str = "rowkit.UpdateFields";

/// Splits the masked entries of `field_values` into fields to update and
/// fields to null
///
/// A masked field whose value is the zero value for its type goes to the
/// null list unless it appears in `allow_zero_fields`; everything else that
/// is masked goes to the update list. Names are compared ignoring case and
/// fields missing from the mask are ignored. Both lists come back ordered
/// by field name.
///
/// # Example
///
/// ```rust
/// use std::collections::BTreeMap;
/// use rowkit_core::field_mask::build_update_paths;
/// use rowkit_kernel::Value;
///
/// let mut values = BTreeMap::new();
/// values.insert("Boolean".to_string(), Value::from(true));
/// values.insert("ZeroInt".to_string(), Value::from(0i64));
///
/// let (masks, nulls) = build_update_paths(&values, &["Boolean", "ZeroInt"], &[]);
/// assert_eq!(masks, vec!["Boolean"]);
/// assert_eq!(nulls, vec!["ZeroInt"]);
/// ```
pub fn build_update_paths(
    field_values: &BTreeMap<String, Value>,
    field_mask: &[&str],
    allow_zero_fields: &[&str],
) -> (Vec<String>, Vec<String>) {
    let mut masks = Vec::new();
    let mut nulls = Vec::new();
    for (name, value) in field_values {
        if !contains_ignore_case(field_mask, name) {
            continue;
        }
        if value.is_zero() && !contains_ignore_case(allow_zero_fields, name) {
            nulls.push(name.clone());
        } else {
            masks.push(name.clone());
        }
    }
    (masks, nulls)
}

/// Validates a field mask pair against `resource` and returns the column
/// assignments it describes
///
/// Mask members are assigned the record's current value, null members are
/// assigned SQL NULL. Keys are column names.
///
/// # Errors
///
/// `InvalidParameter` when both lists are empty, when they share a field,
/// or when either names a field the record does not declare.
pub fn update_fields(
    resource: &dyn Resource,
    field_mask_paths: &[&str],
    set_to_null_paths: &[&str],
) -> Result<BTreeMap<String, AssignValue>, DbError> {
    if field_mask_paths.is_empty() && set_to_null_paths.is_empty() {
        return Err(
            DbError::invalid("both field mask paths and null paths are empty")
                .with_op(UPDATE_FIELDS_OP),
        );
    }
    if !intersection(field_mask_paths, set_to_null_paths).common.is_empty() {
        return Err(intersect_error());
    }

    let (masked, missing_masks) = resolve(resource, field_mask_paths);
    let (nulled, missing_nulls) = resolve(resource, set_to_null_paths);
    if !missing_nulls.is_empty() {
        return Err(DbError::invalid(format!(
            "null paths not found in resource: {}",
            bracketed(&missing_nulls)
        ))
        .with_op(UPDATE_FIELDS_OP));
    }
    if !missing_masks.is_empty() {
        return Err(DbError::invalid(format!(
            "field mask paths not found in resource: {}",
            bracketed(&missing_masks)
        ))
        .with_op(UPDATE_FIELDS_OP));
    }

    let mut assignments = BTreeMap::new();
    for field in &masked {
        let value = resource.value_of(field.name).ok_or_else(|| {
            DbError::internal(format!("no accessor for field {}", field.name))
                .with_op(UPDATE_FIELDS_OP)
        })?;
        assignments.insert(field.column.to_string(), AssignValue::Value(value));
    }
    for field in &nulled {
        // "PhoneNumber" and "phone_number" resolve to the same column
        if assignments.contains_key(field.column) {
            return Err(intersect_error());
        }
        assignments.insert(field.column.to_string(), AssignValue::Null);
    }
    Ok(assignments)
}

/// Case-insensitive intersection of two name lists
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Intersection {
    /// Names present in both lists, lower-cased and sorted
    pub common: Vec<String>,
    /// Upper-cased name to original spelling, for the first list
    pub a: HashMap<String, String>,
    /// Upper-cased name to original spelling, for the second list
    pub b: HashMap<String, String>,
}

/// Intersects `a` and `b` ignoring case
pub fn intersection(a: &[&str], b: &[&str]) -> Intersection {
    let a_map: HashMap<String, String> = a
        .iter()
        .map(|v| (v.to_uppercase(), v.to_string()))
        .collect();
    let b_map: HashMap<String, String> = b
        .iter()
        .map(|v| (v.to_uppercase(), v.to_string()))
        .collect();
    let common: BTreeSet<String> = b
        .iter()
        .filter(|v| a_map.contains_key(&v.to_uppercase()))
        .map(|v| v.to_lowercase())
        .collect();
    Intersection {
        common: common.into_iter().collect(),
        a: a_map,
        b: b_map,
    }
}

fn resolve<'a>(resource: &dyn Resource, paths: &[&'a str]) -> (Vec<FieldInfo>, Vec<&'a str>) {
    let mut found = Vec::with_capacity(paths.len());
    let mut missing = Vec::new();
    for path in paths {
        match resource.field(path) {
            Some(field) => found.push(field),
            None => missing.push(*path),
        }
    }
    (found, missing)
}

fn intersect_error() -> DbError {
    DbError::invalid("field mask paths and null paths cannot intersect").with_op(UPDATE_FIELDS_OP)
}

fn contains_ignore_case(list: &[&str], name: &str) -> bool {
    list.iter().any(|s| s.eq_ignore_ascii_case(name))
}

pub(crate) fn bracketed(names: &[&str]) -> String {
    format!("[{}]", names.join(", "))
}
