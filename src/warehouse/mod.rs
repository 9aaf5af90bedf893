//! Warehouse access: the query seam, results, row handlers and connections

pub mod connection;
pub mod handler;
pub mod impala;
pub mod result;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

pub use connection::{ConnectionConfig, ConnectionsFile};
pub use handler::{HandlerRegistry, LineWriter, PrintRowHandler, RowHandler, PRINT_ROWS};
pub use impala::ImpalaShellClient;
pub use result::{Cursor, QueryResult, Row};

/// Error types for warehouse operations
#[derive(Debug, Error)]
pub enum WarehouseError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Timeout after {0} seconds")]
    Timeout(u64),

    #[error("Unknown connection: {0}")]
    UnknownConnection(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Trait for running SQL against a warehouse - allows for different implementations
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Run a single statement and return its rows
    async fn query(&self, sql: &str) -> Result<QueryResult, WarehouseError>;
}

#[async_trait]
impl<W: Warehouse + ?Sized> Warehouse for Arc<W> {
    async fn query(&self, sql: &str) -> Result<QueryResult, WarehouseError> {
        (**self).query(sql).await
    }
}
