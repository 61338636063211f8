//! nbase - NitrosBase database client
//!
//! Provides a DB-API style session (`Connection`/`Cursor`) over the NitrosBase
//! native client library or an ODBC driver, plus the configuration and output
//! layers of the `nbase` query runner.

#[macro_use]
pub mod test_macros;

pub mod cli;
pub mod config;
pub mod db;
pub mod output;

#[cfg(test)]
pub mod test_utils;

pub use config::ConnectOptions;
pub use db::{connect, BackendKind, BackendOptions, Connection, Cursor, DbError, Row, Value};
