//! Translation of [`OnConflict`] specs into insert clauses

use rowkit_kernel::{
    AssignValue, Assignment, ConflictAction, ConflictResolution, ConflictTarget, DbError,
    OnConflict, OnConflictClause, Options, Predicate, Resource, SetValue, VERSION_COLUMN,
};

use crate::config::WriterConfig;
use crate::rw::option_predicate;

/// Builds the `ON CONFLICT` clause for an insert of `resource`
///
/// # Arguments
///
/// * `resource` - Record being inserted
/// * `insert_columns` - Columns the insert provides values for
/// * `spec` - Requested conflict target and action
/// * `opts` - Write options; version and where clause guard the conflict update
/// * `config` - Supplies the immutable column list
///
/// # Returns
///
/// The resolved clause, or `InvalidParameter` for an empty target, an empty
/// assignment list or an assignment to an immutable column
pub fn resolve(
    resource: &dyn Resource,
    insert_columns: &[String],
    spec: &OnConflict,
    opts: &Options,
    config: &WriterConfig,
) -> Result<OnConflictClause, DbError> {
    let target_columns: &[String] = match &spec.target {
        ConflictTarget::Columns(cols) if !cols.is_empty() => cols.as_slice(),
        ConflictTarget::Constraint(name) if !name.trim().is_empty() => &[],
        other => {
            return Err(DbError::invalid(format!(
                "invalid conflict target {}",
                other.variant_name()
            )))
        }
    };

    // version and where options are checked even when no update follows
    let predicate = option_predicate(resource, opts, true)?;

    let pk = resource.primary_keys();
    let is_pk = |column: &str| {
        pk.iter().any(|f| {
            f.column.eq_ignore_ascii_case(column) || f.name.eq_ignore_ascii_case(column)
        })
    };

    let mut assignments = match &spec.action {
        ConflictAction::DoNothing => {
            return Ok(OnConflictClause {
                target: spec.target.clone(),
                resolution: ConflictResolution::DoNothing,
                predicate: Predicate::new(),
            })
        }
        ConflictAction::UpdateAll => insert_columns
            .iter()
            .filter(|c| {
                !is_pk(c.as_str())
                    && !target_columns.iter().any(|t| t.eq_ignore_ascii_case(c))
                    && !config.is_immutable_column(c)
                    && !c.eq_ignore_ascii_case(VERSION_COLUMN)
            })
            .map(|c| Assignment::new(c.clone(), AssignValue::Excluded(c.clone())))
            .collect::<Vec<_>>(),
        ConflictAction::SetColumns(values) if !values.is_empty() => {
            let mut out = Vec::with_capacity(values.len());
            for cv in values {
                if is_pk(cv.column.as_str()) || config.is_immutable_column(&cv.column) {
                    return Err(DbError::invalid(format!(
                        "cannot do update on conflict for column {}",
                        cv.column
                    )));
                }
                let value = match &cv.value {
                    SetValue::Excluded => AssignValue::Excluded(cv.column.clone()),
                    SetValue::Expr(expr) => AssignValue::Expr(expr.clone()),
                    SetValue::Value(v) => AssignValue::Value(v.clone()),
                };
                out.push(Assignment::new(cv.column.clone(), value));
            }
            out
        }
        other => {
            return Err(DbError::invalid(format!(
                "invalid conflict action {}",
                other.variant_name()
            )))
        }
    };

    if assignments.is_empty() {
        // nothing left to overwrite
        return Ok(OnConflictClause {
            target: spec.target.clone(),
            resolution: ConflictResolution::DoNothing,
            predicate: Predicate::new(),
        });
    }

    if resource.has_version()
        && !assignments
            .iter()
            .any(|a| a.column.eq_ignore_ascii_case(VERSION_COLUMN))
    {
        assignments.push(Assignment::new(VERSION_COLUMN, AssignValue::Increment(1)));
    }

    Ok(OnConflictClause {
        target: spec.target.clone(),
        resolution: ConflictResolution::Update(assignments),
        predicate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowkit_kernel::{set_columns, ColumnValue, Condition, Expr, Value};
    use test_utils::models::{TestCar, TestUser};

    fn insert_columns() -> Vec<String> {
        ["public_id", "name", "email", "phone_number"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn resolve_for(spec: OnConflict, opts: &Options) -> Result<OnConflictClause, DbError> {
        let user = TestUser::new();
        resolve(&user, &insert_columns(), &spec, opts, &WriterConfig::default())
    }

    #[test]
    fn test_do_nothing() {
        let clause = resolve_for(
            OnConflict::new(ConflictTarget::columns(["public_id"]), ConflictAction::DoNothing),
            &Options::new(),
        )
        .unwrap();
        assert_eq!(clause.resolution, ConflictResolution::DoNothing);
        assert!(clause.predicate.is_empty());
    }

    #[test]
    fn test_update_all_skips_keys_and_bumps_version() {
        let clause = resolve_for(
            OnConflict::new(ConflictTarget::columns(["public_id"]), ConflictAction::UpdateAll),
            &Options::new(),
        )
        .unwrap();
        let ConflictResolution::Update(assignments) = clause.resolution else {
            panic!("expected update");
        };
        let cols: Vec<&str> = assignments.iter().map(|a| a.column.as_str()).collect();
        assert_eq!(cols, vec!["name", "email", "phone_number", "version"]);
        assert_eq!(assignments[0].value, AssignValue::Excluded("name".into()));
        assert_eq!(assignments[3].value, AssignValue::Increment(1));
    }

    #[test]
    fn test_set_columns_with_version_and_where() {
        let clause = resolve_for(
            OnConflict::new(
                ConflictTarget::constraint("db_test_user_pkey"),
                ConflictAction::SetColumns(set_columns(["name"])),
            ),
            &Options::new()
                .version(3)
                .where_clause("email = ?", vec![Value::from("a@example.com")]),
        )
        .unwrap();
        let conds = clause.predicate.conditions();
        assert_eq!(conds.len(), 2);
        assert_eq!(
            conds[0],
            Condition::Eq {
                table: Some("db_test_user".into()),
                column: "version".into(),
                value: Value::Int(3),
            }
        );
        assert!(matches!(&conds[1], Condition::Expr(e) if e.sql == "email = ?"));
    }

    #[test]
    fn test_invalid_specs() {
        let err = resolve_for(
            OnConflict::new(ConflictTarget::Columns(vec![]), ConflictAction::DoNothing),
            &Options::new(),
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "invalid conflict target Columns: invalid parameter");

        let err = resolve_for(
            OnConflict::new(ConflictTarget::constraint("  "), ConflictAction::DoNothing),
            &Options::new(),
        )
        .unwrap_err();
        assert!(err.is_invalid_parameter());

        let err = resolve_for(
            OnConflict::new(
                ConflictTarget::columns(["public_id"]),
                ConflictAction::SetColumns(vec![]),
            ),
            &Options::new(),
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "invalid conflict action SetColumns: invalid parameter");
    }

    #[test]
    fn test_immutable_columns_rejected() {
        for column in ["public_id", "PublicId", "CREATE_TIME"] {
            let err = resolve_for(
                OnConflict::new(
                    ConflictTarget::columns(["name"]),
                    ConflictAction::SetColumns(vec![ColumnValue {
                        column: column.into(),
                        value: SetValue::Expr(Expr::raw("NULL")),
                    }]),
                ),
                &Options::new(),
            )
            .unwrap_err();
            assert!(err.is_invalid_parameter());
            assert!(err.to_string().contains(column));
        }
    }

    #[test]
    fn test_zero_version_rejected() {
        let err = resolve_for(
            OnConflict::new(ConflictTarget::columns(["public_id"]), ConflictAction::UpdateAll),
            &Options::new().version(0),
        )
        .unwrap_err();
        assert!(err.to_string().contains("with version option is zero"));
    }

    #[test]
    fn test_do_nothing_still_checks_options() {
        let do_nothing =
            || OnConflict::new(ConflictTarget::columns(["public_id"]), ConflictAction::DoNothing);

        let err = resolve_for(do_nothing(), &Options::new().version(0)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "with version option is zero: invalid parameter"
        );

        let car = TestCar::new();
        let err = resolve(
            &car,
            &insert_columns(),
            &do_nothing(),
            &Options::new().version(1),
            &WriterConfig::default(),
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "db_test_car does not have a version field: invalid parameter"
        );

        // a valid version is accepted but nothing is guarded
        let clause = resolve_for(do_nothing(), &Options::new().version(2)).unwrap();
        assert_eq!(clause.resolution, ConflictResolution::DoNothing);
        assert!(clause.predicate.is_empty());
    }
}
