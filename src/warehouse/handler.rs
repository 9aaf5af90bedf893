//! Row callbacks invoked with a query's cursor

use crate::warehouse::result::Cursor;
use std::collections::HashMap;
use std::sync::Arc;

/// Name under which [`PrintRowHandler`] is registered
pub const PRINT_ROWS: &str = "print_rows";

/// Callback that processes the rows of a query
///
/// Invoked once per executed statement of a step that names a handler. The
/// handler's work is a side effect; nothing it produces flows back into the
/// pipeline.
pub trait RowHandler: Send + Sync {
    fn handle(&self, step_id: &str, cursor: Cursor<'_>);
}

/// Destination for lines written by [`PrintRowHandler`]
pub type LineWriter = Arc<dyn Fn(String) + Send + Sync>;

/// Prints every row, to stdout unless given another writer
#[derive(Clone, Default)]
pub struct PrintRowHandler {
    writer: Option<LineWriter>,
}

impl PrintRowHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Send lines to `writer` instead of stdout
    pub fn with_writer<F>(writer: F) -> Self
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        Self {
            writer: Some(Arc::new(writer)),
        }
    }

    fn write(&self, line: String) {
        match &self.writer {
            Some(writer) => writer(line),
            None => println!("{}", line),
        }
    }
}

impl std::fmt::Debug for PrintRowHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrintRowHandler")
            .field("stdout", &self.writer.is_none())
            .finish()
    }
}

impl RowHandler for PrintRowHandler {
    fn handle(&self, _step_id: &str, mut cursor: Cursor<'_>) {
        let rows = cursor.fetch_all();
        for row in rows {
            self.write(format!("Row Data: {}", cursor.format_row(row)));
        }
    }
}

/// Row handlers by name
#[derive(Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn RowHandler>>,
}

impl HandlerRegistry {
    /// A registry with no handlers at all
    pub fn empty() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    pub fn register(&mut self, name: impl Into<String>, handler: Arc<dyn RowHandler>) {
        self.handlers.insert(name.into(), handler);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn RowHandler>> {
        self.handlers.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(PRINT_ROWS, Arc::new(PrintRowHandler::new()));
        registry
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("handlers", &self.names())
            .finish()
    }
}
