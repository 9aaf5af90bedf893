//! SQL template parameters
//!
//! Templates reference parameters as `{{ params.<name> }}`. Whitespace inside
//! the braces is optional. Any other `{{ ... }}` expression that mentions
//! `params` or `param` is rejected; the rest are left untouched.

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

fn placeholder_regex() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| {
        Regex::new(r"\{\{\s*params\.([A-Za-z_][A-Za-z0-9_]*)\s*\}\}")
            .expect("placeholder pattern is a valid regex")
    })
}

fn expression_regex() -> &'static Regex {
    static EXPRESSION: OnceLock<Regex> = OnceLock::new();
    EXPRESSION.get_or_init(|| {
        Regex::new(r"\{\{(.*?)\}\}").expect("expression pattern is a valid regex")
    })
}

fn params_reference_regex() -> &'static Regex {
    static REFERENCE: OnceLock<Regex> = OnceLock::new();
    REFERENCE.get_or_init(|| {
        Regex::new(r"\bparams?\b").expect("reference pattern is a valid regex")
    })
}

/// Why a template could not be rendered
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    /// A `{{ params.<name> }}` placeholder has no value
    Missing(String),
    /// An expression refers to parameters in a form the renderer cannot fill
    Unsupported(String),
}

/// Named values substituted into a step's SQL template
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Params(BTreeMap<String, String>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }

    /// Fill in every entry of `defaults` that is not already set
    pub fn merge_defaults(&mut self, defaults: &Params) {
        for (name, value) in defaults.iter() {
            self.0.entry(name.clone()).or_insert_with(|| value.clone());
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Names of all parameters a template requires
pub fn placeholders(template: &str) -> BTreeSet<String> {
    placeholder_regex()
        .captures_iter(template)
        .map(|caps| caps[1].to_string())
        .collect()
}

/// Parameter expressions that are not plain placeholders, such as
/// `{{ params.table | lower }}` or `{{ param.table }}`
fn unsupported_expression(template: &str) -> Option<String> {
    expression_regex()
        .captures_iter(template)
        .filter(|caps| !placeholder_regex().is_match(&caps[0]))
        .map(|caps| caps[1].trim().to_string())
        .find(|inner| params_reference_regex().is_match(inner))
}

/// Substitute `params` into `template`
///
/// A missing parameter is reported by name, the first alphabetically.
pub fn render(template: &str, params: &Params) -> Result<String, TemplateError> {
    if let Some(expression) = unsupported_expression(template) {
        return Err(TemplateError::Unsupported(expression));
    }
    if let Some(missing) = placeholders(template)
        .into_iter()
        .find(|name| !params.contains(name))
    {
        return Err(TemplateError::Missing(missing));
    }

    let rendered = placeholder_regex().replace_all(template, |caps: &Captures| {
        params.get(&caps[1]).unwrap_or_default().to_string()
    });

    Ok(rendered.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_substitutes_all_placeholders() {
        let params = Params::new().with("db", "airflow_sql").with("table", "airports");
        let rendered = render("select * from {{ params.db }}.{{params.table}}", &params).unwrap();
        assert_eq!(rendered, "select * from airflow_sql.airports");
    }

    #[test]
    fn test_render_reports_missing_parameter() {
        let params = Params::new().with("db", "airflow");
        let err = render("select * from {{ params.db }}.{{ params.table }}", &params).unwrap_err();
        assert_eq!(err, TemplateError::Missing("table".to_string()));
    }

    #[test]
    fn test_render_leaves_other_expressions_alone() {
        let rendered = render("select '{{ ds }}' as run_date", &Params::new()).unwrap();
        assert_eq!(rendered, "select '{{ ds }}' as run_date");
    }

    #[test]
    fn test_render_rejects_unsupported_parameter_expressions() {
        let params = Params::new().with("table", "airports");
        for (template, expression) in [
            ("select * from {{ params.table | lower }}", "params.table | lower"),
            ("select * from {{ params.source-table }}", "params.source-table"),
            ("select * from {{param.table}}", "param.table"),
        ] {
            assert_eq!(
                render(template, &params),
                Err(TemplateError::Unsupported(expression.to_string()))
            );
        }

        let rendered = render("select '{{ ds }}' from {{ params.table }}", &params).unwrap();
        assert_eq!(rendered, "select '{{ ds }}' from airports");
    }

    #[test]
    fn test_render_ignores_unused_parameters() {
        let params = Params::new().with("db", "a").with("unused", "b");
        assert_eq!(render("use {{ params.db }}", &params).unwrap(), "use a");
    }

    #[test]
    fn test_placeholders_are_deduplicated() {
        let names = placeholders("{{ params.t }} join {{ params.t }} on {{ params.col }}");
        assert_eq!(names.into_iter().collect::<Vec<_>>(), vec!["col", "t"]);
    }

    #[test]
    fn test_merge_defaults_keeps_existing_values() {
        let mut params = Params::new().with("table", "airports");
        params.merge_defaults(&Params::new().with("table", "other").with("db", "dw"));
        assert_eq!(params.get("table"), Some("airports"));
        assert_eq!(params.get("db"), Some("dw"));
    }
}
