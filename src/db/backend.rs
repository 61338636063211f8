//! Backend capability trait shared by every gateway implementation.
//!
//! A backend owns at most one live connection to the database and exposes
//! the row-at-a-time verbs the cursor layer is built on. Result-set position
//! lives on the backend's side; nothing here buffers rows for the caller.

use std::collections::BTreeMap;

use serde::Serialize;

use super::tagged::FieldKind;
use super::value::Value;
use super::DbError;

/// One fetched record, keyed by field name.
///
/// Field names must be unique within a row; when they are not, the last
/// field with a given name wins.
pub type Row = BTreeMap<String, Value>;

/// Name and kind of one result column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Column {
    pub name: String,
    pub kind: FieldKind,
}

/// Uniform capability interface over the native library and the ODBC driver.
///
/// Every call blocks until the foreign side answers. Any call except
/// `connect`, `disconnect` and `is_connected` fails with `DbError::Connection`
/// when no connection is open.
pub trait Backend {
    /// Get the backend name for logging/debugging.
    fn backend_name(&self) -> &'static str;

    /// Open the foreign connection.
    ///
    /// Returns `Ok(false)` when the foreign side refuses to hand out a
    /// connection without saying why; the caller decides how to report that.
    /// A backend that has a diagnostic returns a `DbError::Connection` with it.
    fn connect(
        &mut self,
        host: &str,
        port: u16,
        user: Option<&str>,
        password: Option<&str>,
    ) -> Result<bool, DbError>;

    /// Release the foreign connection. Does nothing when none is open.
    fn disconnect(&mut self) -> Result<(), DbError>;

    fn is_connected(&self) -> bool;

    /// Run one statement and check the foreign error slot.
    fn execute_sql(&mut self, query: &str) -> Result<(), DbError>;

    /// Advance to the next row. `Ok(false)` means the result set is exhausted.
    fn read_record(&mut self) -> Result<bool, DbError>;

    /// Number of fields in the current row.
    fn field_count(&mut self) -> Result<usize, DbError>;

    fn field_name(&mut self, index: usize) -> Result<String, DbError>;

    fn field_type(&mut self, index: usize) -> Result<FieldKind, DbError>;

    /// Decoded value of a field of the current row.
    fn field_value(&mut self, index: usize) -> Result<Value, DbError>;

    /// Raise the foreign side's last error, if any.
    fn check_error(&mut self) -> Result<(), DbError>;
}
