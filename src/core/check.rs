//! Declarative assertion checks
//!
//! An assertion step either runs its own SQL and inspects the first row
//! (`sql`, `value`, `threshold`), or generates its SQL from column/table
//! check configuration (`columns`, `table`).

use crate::core::error::{DefinitionError, DefinitionResult};
use crate::warehouse::result::{as_f64, cell_to_string, is_truthy};
use crate::warehouse::QueryResult;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Assertion carried by an `Assertion` step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Assertion {
    /// Every cell of the first row must be truthy
    Sql,

    /// Every cell of the first row must match `pass_value`
    Value {
        pass_value: Value,
        #[serde(default)]
        tolerance: Option<f64>,
    },

    /// The first cell must lie within `[min, max]`
    Threshold { min: f64, max: f64 },

    /// Column-level checks against a table
    Columns {
        table: String,
        columns: BTreeMap<String, BTreeMap<ColumnCheckKind, CheckPredicate>>,
    },

    /// Named boolean predicates evaluated over a table
    Table {
        table: String,
        checks: BTreeMap<String, TableCheck>,
    },
}

/// Kind of column-level check
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnCheckKind {
    NullCheck,
    DistinctCheck,
    UniqueCheck,
    Min,
    Max,
}

impl ColumnCheckKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnCheckKind::NullCheck => "null_check",
            ColumnCheckKind::DistinctCheck => "distinct_check",
            ColumnCheckKind::UniqueCheck => "unique_check",
            ColumnCheckKind::Min => "min",
            ColumnCheckKind::Max => "max",
        }
    }

    fn expression(&self, column: &str) -> String {
        match self {
            ColumnCheckKind::NullCheck => {
                format!("SUM(CASE WHEN {column} IS NULL THEN 1 ELSE 0 END)")
            }
            ColumnCheckKind::DistinctCheck => format!("COUNT(DISTINCT({column}))"),
            ColumnCheckKind::UniqueCheck => {
                format!("COUNT({column}) - COUNT(DISTINCT({column}))")
            }
            ColumnCheckKind::Min => format!("MIN({column})"),
            ColumnCheckKind::Max => format!("MAX({column})"),
        }
    }
}

impl fmt::Display for ColumnCheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Comparison applied to a numeric check result
///
/// Every comparator that is set must hold. `tolerance` widens `equal_to`
/// to `equal_to * (1 ± tolerance)`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckPredicate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equal_to: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub greater_than: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geq_to: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub less_than: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leq_to: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tolerance: Option<f64>,
}

impl CheckPredicate {
    pub fn equal_to(value: f64) -> Self {
        Self {
            equal_to: Some(value),
            ..Self::default()
        }
    }

    pub fn geq_to(value: f64) -> Self {
        Self {
            geq_to: Some(value),
            ..Self::default()
        }
    }

    fn has_comparator(&self) -> bool {
        self.equal_to.is_some()
            || self.greater_than.is_some()
            || self.geq_to.is_some()
            || self.less_than.is_some()
            || self.leq_to.is_some()
    }

    pub fn matches(&self, value: f64) -> bool {
        if let Some(expected) = self.equal_to {
            let equal = match self.tolerance {
                Some(tolerance) => within_tolerance(value, expected, tolerance),
                None => value == expected,
            };
            if !equal {
                return false;
            }
        }

        self.greater_than.map_or(true, |bound| value > bound)
            && self.geq_to.map_or(true, |bound| value >= bound)
            && self.less_than.map_or(true, |bound| value < bound)
            && self.leq_to.map_or(true, |bound| value <= bound)
    }
}

impl fmt::Display for CheckPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = [
            ("equal_to", self.equal_to),
            ("greater_than", self.greater_than),
            ("geq_to", self.geq_to),
            ("less_than", self.less_than),
            ("leq_to", self.leq_to),
            ("tolerance", self.tolerance),
        ]
        .iter()
        .filter_map(|(name, bound)| bound.map(|b| format!("{name} {b}")))
        .collect();
        f.write_str(&parts.join(", "))
    }
}

/// A named table-level check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableCheck {
    /// Boolean SQL predicate, e.g. `COUNT(*) between 3000 and 4000`
    pub check_statement: String,
}

fn within_tolerance(value: f64, expected: f64, tolerance: f64) -> bool {
    let a = expected * (1.0 - tolerance);
    let b = expected * (1.0 + tolerance);
    value >= a.min(b) && value <= a.max(b)
}

impl Assertion {
    /// Whether the step must supply its own SQL
    pub fn needs_sql(&self) -> bool {
        !matches!(self, Assertion::Columns { .. } | Assertion::Table { .. })
    }

    /// SQL generated from column or table checks
    ///
    /// The table name is copied verbatim, so parameter placeholders in it are
    /// rendered together with the rest of the step's template.
    pub fn generated_sql(&self) -> Option<String> {
        match self {
            Assertion::Columns { table, columns } => {
                let arms: Vec<String> = columns
                    .iter()
                    .flat_map(|(column, checks)| {
                        checks.keys().map(move |kind| {
                            format!(
                                "SELECT '{column}' AS col_name, '{kind}' AS check_type, {} AS check_result FROM {table}",
                                kind.expression(column)
                            )
                        })
                    })
                    .collect();
                Some(arms.join("\nUNION ALL\n"))
            }
            Assertion::Table { table, checks } => {
                let arms: Vec<String> = checks
                    .iter()
                    .map(|(name, check)| {
                        format!(
                            "SELECT '{name}' AS check_name, MIN({name}) AS check_result FROM (SELECT CASE WHEN {} THEN 1 ELSE 0 END AS {name} FROM {table}) AS sq",
                            check.check_statement
                        )
                    })
                    .collect();
                Some(arms.join("\nUNION ALL\n"))
            }
            _ => None,
        }
    }

    /// Reject configurations that could never pass or never run
    pub fn validate(&self, step_id: &str) -> DefinitionResult<()> {
        let invalid = |message: String| DefinitionError::InvalidStep {
            step_id: step_id.to_string(),
            message,
        };

        match self {
            Assertion::Sql => Ok(()),
            Assertion::Value { tolerance, .. } => match tolerance {
                Some(t) if *t < 0.0 => Err(invalid(format!("tolerance must be >= 0, got {t}"))),
                _ => Ok(()),
            },
            Assertion::Threshold { min, max } => {
                if min > max {
                    Err(invalid(format!("threshold min {min} is greater than max {max}")))
                } else {
                    Ok(())
                }
            }
            Assertion::Columns { table, columns } => {
                if table.trim().is_empty() {
                    return Err(invalid("column checks need a table".to_string()));
                }
                if columns.values().all(|checks| checks.is_empty()) {
                    return Err(invalid("no column checks configured".to_string()));
                }
                for (column, checks) in columns {
                    for (kind, predicate) in checks {
                        if !predicate.has_comparator() {
                            return Err(invalid(format!(
                                "check {column}.{kind} has no comparison"
                            )));
                        }
                    }
                }
                Ok(())
            }
            Assertion::Table { table, checks } => {
                if table.trim().is_empty() {
                    return Err(invalid("table checks need a table".to_string()));
                }
                if checks.is_empty() {
                    return Err(invalid("no table checks configured".to_string()));
                }
                Ok(())
            }
        }
    }

    /// Evaluate the query result; the error lists every failed check
    pub fn evaluate(&self, result: &QueryResult) -> Result<(), String> {
        match self {
            Assertion::Sql => {
                let row = result.first_row().ok_or("query returned no rows")?;
                if row.iter().all(is_truthy) {
                    Ok(())
                } else {
                    Err(format!("test failed, first row: {}", result.format_row(row)))
                }
            }
            Assertion::Value {
                pass_value,
                tolerance,
            } => {
                let row = result.first_row().ok_or("query returned no rows")?;
                let expected_number = as_f64(pass_value);
                let expected_text = cell_to_string(pass_value);
                let failed: Vec<String> = row
                    .iter()
                    .filter(|cell| match (expected_number, as_f64(cell)) {
                        (Some(expected), Some(actual)) => match tolerance {
                            Some(t) => !within_tolerance(actual, expected, *t),
                            None => actual != expected,
                        },
                        _ => cell_to_string(cell) != expected_text,
                    })
                    .map(cell_to_string)
                    .collect();

                if failed.is_empty() {
                    Ok(())
                } else {
                    Err(format!(
                        "expected {expected_text}{}, got {}",
                        tolerance.map(|t| format!(" (tolerance {t})")).unwrap_or_default(),
                        failed.join(", ")
                    ))
                }
            }
            Assertion::Threshold { min, max } => {
                let cell = result
                    .first_row()
                    .and_then(|row| row.first())
                    .ok_or("query returned no rows")?;
                let value = as_f64(cell)
                    .ok_or_else(|| format!("result {} is not numeric", cell_to_string(cell)))?;
                if value >= *min && value <= *max {
                    Ok(())
                } else {
                    Err(format!("{value} is outside threshold [{min}, {max}]"))
                }
            }
            Assertion::Columns { columns, .. } => {
                let results: HashMap<(String, String), &Value> = result
                    .rows
                    .iter()
                    .filter(|row| row.len() >= 3)
                    .map(|row| {
                        (
                            (cell_to_string(&row[0]), cell_to_string(&row[1])),
                            &row[2],
                        )
                    })
                    .collect();

                let mut failures = Vec::new();
                for (column, checks) in columns {
                    for (kind, predicate) in checks {
                        let key = (column.clone(), kind.as_str().to_string());
                        match results.get(&key).map(|cell| (cell, as_f64(cell))) {
                            None => failures.push(format!("{column}.{kind}: no result")),
                            Some((cell, None)) => failures.push(format!(
                                "{column}.{kind}: non-numeric result {}",
                                cell_to_string(cell)
                            )),
                            Some((_, Some(value))) if !predicate.matches(value) => {
                                failures.push(format!(
                                    "{column}.{kind}: got {value}, expected {predicate}"
                                ))
                            }
                            Some(_) => {}
                        }
                    }
                }
                join_failures(failures)
            }
            Assertion::Table { checks, .. } => {
                let results: HashMap<String, &Value> = result
                    .rows
                    .iter()
                    .filter(|row| row.len() >= 2)
                    .map(|row| (cell_to_string(&row[0]), &row[1]))
                    .collect();

                let failures = checks
                    .iter()
                    .filter_map(|(name, check)| match results.get(name).and_then(|c| as_f64(c)) {
                        Some(value) if value == 1.0 => None,
                        Some(_) => Some(format!("{name}: '{}' is false", check.check_statement)),
                        None => Some(format!("{name}: no result")),
                    })
                    .collect();
                join_failures(failures)
            }
        }
    }
}

fn join_failures(failures: Vec<String>) -> Result<(), String> {
    if failures.is_empty() {
        Ok(())
    } else {
        Err(failures.join("; "))
    }
}
