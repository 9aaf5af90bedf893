//! `impala-shell` subprocess client

use crate::warehouse::{ConnectionConfig, QueryResult, Row, Warehouse, WarehouseError};
use async_trait::async_trait;
use serde_json::{Number, Value};
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Client that runs each statement through `impala-shell` in delimited mode
#[derive(Debug, Clone)]
pub struct ImpalaShellClient {
    config: ConnectionConfig,
}

impl ImpalaShellClient {
    pub fn new(config: ConnectionConfig) -> Self {
        Self { config }
    }

    /// Command-line arguments for one statement
    pub fn args(&self, sql: &str) -> Vec<String> {
        let mut args = vec!["-i".to_string(), self.config.address()];
        if self.config.use_ssl {
            args.push("--ssl".to_string());
        }
        if let Some(database) = &self.config.database {
            args.push("-d".to_string());
            args.push(database.clone());
        }
        if let Some(user) = &self.config.user {
            args.push("-u".to_string());
            args.push(user.clone());
        }
        if self.config.ldap {
            args.push("-l".to_string());
        }
        args.extend(
            ["-B", "--output_delimiter=\t", "--print_header", "--quiet"]
                .iter()
                .map(|s| s.to_string()),
        );
        args.extend(self.config.extra_args.iter().cloned());
        args.push("-q".to_string());
        args.push(sql.to_string());
        args
    }

    /// Parse delimited output: a header line followed by tab-separated rows
    pub fn parse_output(stdout: &str) -> QueryResult {
        let mut lines = stdout.lines().filter(|line| !line.trim().is_empty());

        let Some(header) = lines.next() else {
            return QueryResult::empty();
        };
        let columns: Vec<String> = header.split('\t').map(|c| c.trim().to_string()).collect();
        let rows: Vec<Row> = lines
            .map(|line| line.split('\t').map(parse_cell).collect())
            .collect();

        QueryResult { columns, rows }
    }
}

fn parse_cell(raw: &str) -> Value {
    match raw {
        "NULL" => Value::Null,
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => {
            if let Ok(int) = raw.parse::<i64>() {
                Value::Number(int.into())
            } else if let Some(float) = raw.parse::<f64>().ok().and_then(Number::from_f64) {
                Value::Number(float)
            } else {
                Value::String(raw.to_string())
            }
        }
    }
}

#[async_trait]
impl Warehouse for ImpalaShellClient {
    async fn query(&self, sql: &str) -> Result<QueryResult, WarehouseError> {
        debug!(
            "Running statement on {} ({} bytes)",
            self.config.address(),
            sql.len()
        );

        let result = timeout(
            Duration::from_secs(self.config.timeout_secs),
            Command::new(&self.config.executable)
                .args(self.args(sql))
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| WarehouseError::Timeout(self.config.timeout_secs))?;

        let output = result.map_err(|e| {
            WarehouseError::Internal(format!(
                "Failed to execute {}: {}",
                self.config.executable, e
            ))
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let exit_code = output.status.code().unwrap_or(-1);
            warn!("{} exited with code {}: {}", self.config.executable, exit_code, stderr.trim());

            let message = format!("exit code {}: {}", exit_code, stderr.trim());
            let unreachable =
                stderr.contains("Could not connect") || stderr.contains("Error connecting");
            return Err(if unreachable {
                WarehouseError::Connection(message)
            } else {
                WarehouseError::Query(message)
            });
        }

        let stdout = String::from_utf8(output.stdout).map_err(|e| {
            WarehouseError::Internal(format!("Failed to decode impala-shell output: {}", e))
        })?;

        let result = Self::parse_output(&stdout);
        debug!("Statement returned {} rows", result.row_count());
        Ok(result)
    }
}
