//! Query results and the cursor handed to row handlers

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One result row; cells are JSON values (null, bool, number, string)
pub type Row = Vec<Value>;

/// Rows returned by a single statement
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    /// Column names in select order
    pub columns: Vec<String>,

    /// Returned rows
    pub rows: Vec<Row>,
}

impl QueryResult {
    pub fn new<S: Into<String>>(columns: Vec<S>, rows: Vec<Row>) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows,
        }
    }

    /// Result of a statement that returns nothing (DDL, DML)
    pub fn empty() -> Self {
        Self::default()
    }

    /// A one-row, one-column result
    pub fn single_value(column: &str, value: Value) -> Self {
        Self::new(vec![column], vec![vec![value]])
    }

    pub fn first_row(&self) -> Option<&Row> {
        self.rows.first()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Forward-only cursor over the rows
    pub fn cursor(&self) -> Cursor<'_> {
        Cursor {
            result: self,
            position: 0,
        }
    }

    /// Render a row as a tuple, e.g. `('JFK', 'John F Kennedy Intl', 40.6)`
    pub fn format_row(&self, row: &Row) -> String {
        let cells: Vec<String> = row
            .iter()
            .map(|cell| match cell {
                Value::String(s) => format!("'{}'", s),
                other => cell_to_string(other),
            })
            .collect();
        format!("({})", cells.join(", "))
    }
}

/// Forward-only iterator over a [`QueryResult`]
#[derive(Debug)]
pub struct Cursor<'a> {
    result: &'a QueryResult,
    position: usize,
}

impl<'a> Cursor<'a> {
    /// Next row, or `None` once exhausted
    pub fn fetch_one(&mut self) -> Option<&'a Row> {
        let row = self.result.rows.get(self.position)?;
        self.position += 1;
        Some(row)
    }

    /// Every row not yet fetched
    pub fn fetch_all(&mut self) -> Vec<&'a Row> {
        self.by_ref().collect()
    }

    pub fn format_row(&self, row: &Row) -> String {
        self.result.format_row(row)
    }
}

impl<'a> Iterator for Cursor<'a> {
    type Item = &'a Row;

    fn next(&mut self) -> Option<Self::Item> {
        self.fetch_one()
    }
}

/// Truthiness of a cell: null, false, zero and empty strings are false
pub fn is_truthy(cell: &Value) -> bool {
    match cell {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Numeric value of a cell; numeric strings are parsed
pub fn as_f64(cell: &Value) -> Option<f64> {
    match cell {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Plain text of a cell (strings without quotes)
pub fn cell_to_string(cell: &Value) -> String {
    match cell {
        Value::String(s) => s.clone(),
        Value::Null => "NULL".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn airports() -> QueryResult {
        QueryResult::new(
            vec!["iata", "airport"],
            vec![
                vec![json!("JFK"), json!("John F Kennedy Intl")],
                vec![json!("LAX"), json!("Los Angeles International")],
                vec![json!("ORD"), Value::Null],
            ],
        )
    }

    #[test]
    fn test_cursor_is_forward_only() {
        let result = airports();
        let mut cursor = result.cursor();

        assert_eq!(cursor.fetch_one().unwrap()[0], json!("JFK"));
        let rest = cursor.fetch_all();
        assert_eq!(rest.len(), 2);
        assert!(cursor.fetch_one().is_none());
        assert!(cursor.fetch_all().is_empty());
    }

    #[test]
    fn test_format_row() {
        let result = airports();
        assert_eq!(
            result.format_row(&result.rows[2]),
            "('ORD', NULL)"
        );
    }

    #[test]
    fn test_cell_helpers() {
        assert!(is_truthy(&json!(3)));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!("")));
        assert!(!is_truthy(&Value::Null));
        assert_eq!(as_f64(&json!(" 42 ")), Some(42.0));
        assert_eq!(as_f64(&json!(true)), None);
        assert_eq!(cell_to_string(&json!("x")), "x");
        assert_eq!(cell_to_string(&json!(1.5)), "1.5");
    }
}
