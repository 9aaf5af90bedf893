//! Scenario-based tests for dq-pipeline runs against a mock warehouse

mod helpers;

mod assertion_failures;
mod branch_routing;
mod param_substitution;
mod row_handler;
