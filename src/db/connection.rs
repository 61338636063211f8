//! Connection and cursor session protocol.
//!
//! `Connection` owns one backend with one open foreign connection.
//! `Cursor` borrows the connection and drives the row-at-a-time fetch loop.
//! The foreign side holds a single result set per connection, so only the
//! cursor that executed last may fetch; other cursors get a logic error
//! instead of someone else's rows.

use std::cell::{Cell, RefCell};

use super::backend::{Backend, Column, Row};
use super::config::{create_backend, BackendKind, BackendOptions};
use super::DbError;

/// Create a backend of `kind` and open a session on it.
pub fn connect(
    host: &str,
    port: u16,
    user: Option<&str>,
    password: Option<&str>,
    kind: BackendKind,
    options: &BackendOptions,
) -> Result<Connection, DbError> {
    let backend = create_backend(kind, options)?;
    tracing::info!(backend = %kind, host, port, "opening connection");
    Connection::open(backend, host, port, user, password)
}

/// A session over one backend connection.
///
/// States: open after `open` succeeds, closed after `close`. Dropping an open
/// connection releases the foreign handle through the backend's own cleanup.
pub struct Connection {
    backend: RefCell<Option<Box<dyn Backend>>>,
    backend_name: &'static str,
    result_owner: Cell<Option<u64>>,
    next_cursor_id: Cell<u64>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("backend", &self.backend_name)
            .field("open", &self.is_open())
            .finish()
    }
}

impl Connection {
    /// Connect `backend` and wrap it in a session.
    ///
    /// Fails with `DbError::Connection` when the backend cannot obtain a
    /// connection; the backend is dropped in that case.
    pub fn open(
        mut backend: Box<dyn Backend>,
        host: &str,
        port: u16,
        user: Option<&str>,
        password: Option<&str>,
    ) -> Result<Self, DbError> {
        if !backend.connect(host, port, user, password)? {
            return Err(DbError::Connection {
                message: format!("Cannot connect to DB with URI {}:{}", host, port),
            });
        }
        let backend_name = backend.backend_name();
        Ok(Self {
            backend: RefCell::new(Some(backend)),
            backend_name,
            result_owner: Cell::new(None),
            next_cursor_id: Cell::new(0),
        })
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend_name
    }

    /// Whether the connection is neither closed nor dropped by the backend.
    pub fn is_open(&self) -> bool {
        match self.backend.try_borrow() {
            Ok(backend) => backend.as_ref().is_some_and(|b| b.is_connected()),
            Err(_) => true,
        }
    }

    /// Create a cursor over this connection.
    pub fn cursor(&self) -> Result<Cursor<'_>, DbError> {
        self.with_backend(|backend| {
            if backend.is_connected() {
                Ok(())
            } else {
                Err(DbError::Connection {
                    message: format!("{} connection was lost", backend.backend_name()),
                })
            }
        })?;
        let id = self.next_cursor_id.get();
        self.next_cursor_id.set(id + 1);
        Ok(Cursor {
            connection: self,
            id,
            closed: false,
            halted: false,
            description: None,
        })
    }

    /// Close the connection. Closing an already closed connection does nothing.
    pub fn close(&mut self) -> Result<(), DbError> {
        self.result_owner.set(None);
        match self.backend.get_mut().take() {
            Some(mut backend) => {
                tracing::info!(backend = self.backend_name, "closing connection");
                backend.disconnect()
            }
            None => Ok(()),
        }
    }

    /// Always fails: the database offers no transaction boundary.
    pub fn commit(&self) -> Result<(), DbError> {
        Err(DbError::NotSupported { operation: "commit" })
    }

    /// Always fails: the database offers no transaction boundary.
    pub fn rollback(&self) -> Result<(), DbError> {
        Err(DbError::NotSupported { operation: "rollback" })
    }

    fn with_backend<T>(
        &self,
        f: impl FnOnce(&mut dyn Backend) -> Result<T, DbError>,
    ) -> Result<T, DbError> {
        let mut guard = self.backend.try_borrow_mut().map_err(|_| DbError::Logic {
            message: "connection is already in use".to_string(),
        })?;
        match guard.as_mut() {
            Some(backend) => f(backend.as_mut()),
            None => Err(closed_connection()),
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(error = %e, "closing connection on drop failed");
        }
    }
}

fn closed_connection() -> DbError {
    DbError::Logic {
        message: "connection is closed".to_string(),
    }
}

fn closed_cursor() -> DbError {
    DbError::Logic {
        message: "cursor is closed".to_string(),
    }
}

/// Result iteration over a borrowed connection.
///
/// Also an `Iterator` of rows: iteration is lazy and single-pass, and stops
/// for good after yielding an error until the next `execute`.
pub struct Cursor<'conn> {
    connection: &'conn Connection,
    id: u64,
    closed: bool,
    halted: bool,
    description: Option<Vec<Column>>,
}

impl std::fmt::Debug for Cursor<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor")
            .field("id", &self.id)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl Cursor<'_> {
    fn ensure_open(&self) -> Result<(), DbError> {
        if self.closed {
            Err(closed_cursor())
        } else {
            Ok(())
        }
    }

    /// Execute one SQL statement. Results stay on the foreign side until fetched.
    pub fn execute(&mut self, query: &str) -> Result<(), DbError> {
        self.ensure_open()?;
        self.description = None;
        self.halted = false;
        // the foreign result set is replaced even if execution fails
        self.connection.result_owner.set(Some(self.id));
        self.connection.with_backend(|backend| backend.execute_sql(query))
    }

    pub fn executemany(&mut self, _query: &str, _params: &[Row]) -> Result<(), DbError> {
        Err(DbError::NotImplemented { operation: "executemany" })
    }

    /// Fetch the next row, or `None` once the result set is exhausted.
    pub fn fetchone(&mut self) -> Result<Option<Row>, DbError> {
        self.ensure_open()?;
        match self.connection.result_owner.get() {
            Some(owner) if owner == self.id => {}
            Some(_) => {
                return Err(DbError::Logic {
                    message: "result set belongs to another cursor".to_string(),
                })
            }
            None => {
                return Err(DbError::Logic {
                    message: "no result set; call execute first".to_string(),
                })
            }
        }

        let fetched = self.connection.with_backend(|backend| {
            if !backend.read_record()? {
                return Ok(None);
            }
            let count = backend.field_count()?;
            let mut row = Row::new();
            let mut columns = Vec::with_capacity(count);
            for index in 0..count {
                let name = backend.field_name(index)?;
                let kind = backend.field_type(index)?;
                let value = backend.field_value(index)?;
                tracing::trace!(field = %name, %kind, %value, "field fetched");
                columns.push(Column {
                    name: name.clone(),
                    kind,
                });
                if row.insert(name, value).is_some() {
                    tracing::debug!(index, "duplicate field name; later field wins");
                }
            }
            Ok(Some((row, columns)))
        })?;

        Ok(fetched.map(|(row, columns)| {
            self.description = Some(columns);
            row
        }))
    }

    pub fn fetchmany(&mut self, _size: usize) -> Result<Vec<Row>, DbError> {
        Err(DbError::NotImplemented { operation: "fetchmany" })
    }

    /// Columns of the last fetched row, in result order.
    pub fn description(&self) -> Option<&[Column]> {
        self.description.as_deref()
    }

    /// Number of rows fetched per `fetchmany` call; rows are fetched one at a time.
    pub fn arraysize(&self) -> usize {
        1
    }

    /// Affected/returned row count; the foreign side does not report one.
    pub fn rowcount(&self) -> i64 {
        -1
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Close the cursor. The connection stays open.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.description = None;
        if self.connection.result_owner.get() == Some(self.id) {
            self.connection.result_owner.set(None);
        }
    }
}

impl Iterator for Cursor<'_> {
    type Item = Result<Row, DbError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.halted {
            return None;
        }
        match self.fetchone() {
            Ok(Some(row)) => Some(Ok(row)),
            Ok(None) => None,
            Err(e) => {
                self.halted = true;
                Some(Err(e))
            }
        }
    }
}
