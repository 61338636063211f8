//! Database access layer over the NitrosBase client.
//!
//! This module provides everything between the caller and the foreign side:
//! - Tagged value decoding (`tagged`) and host values (`value`)
//! - The backend capability trait (`backend`) and its implementations:
//!   the native library gateway (`native`) and, behind the `backend-odbc`
//!   feature, the ODBC gateway (`odbc`)
//! - Backend selection (`config`)
//! - The connection/cursor session protocol (`connection`)
//!
//! # Type Decisions
//!
//! **Why does `Cursor` borrow `Connection`?**
//! The foreign side keeps one result set per connection handle. Borrowing
//! makes it impossible to close a connection while a cursor still points at
//! it, and the connection tracks which cursor owns the current result set so
//! interleaved cursors are reported instead of reading each other's rows.
//!
//! **Why `BTreeMap` rows?**
//! Rows are name-keyed; a sorted map gives stable output for printing and
//! comparisons. Field order of the result set is available from
//! `Cursor::description`.

pub mod backend;
pub mod config;
pub mod connection;
pub mod native;
#[cfg(feature = "backend-odbc")]
pub mod odbc;
pub mod tagged;
pub mod value;

pub use backend::{Backend, Column, Row};
pub use config::{create_backend, BackendKind, BackendOptions};
pub use connection::{connect, Connection, Cursor};
pub use native::{NativeApi, NativeGateway, NbClientLibrary, RawHandle};
pub use tagged::{decode, FieldKind, StatusCode, TaggedValue};
pub use value::{DatabaseValue, Value};

use thiserror::Error;

fn describe_status(code: &i32) -> String {
    StatusCode::describe(*code)
}

/// Database error types
#[derive(Error, Debug)]
pub enum DbError {
    /// The foreign side handed out no connection, or none is open.
    #[error("Connection error: {message}")]
    Connection { message: String },

    /// The foreign side reported a non-OK status.
    #[error("Database error {}: {message}", describe_status(.code))]
    Database { code: i32, message: String },

    /// The session was used out of order (closed cursor, closed connection, ...).
    #[error("Logic error: {message}")]
    Logic { message: String },

    #[error("Operation not supported: {operation}")]
    NotSupported { operation: &'static str },

    #[error("Operation not implemented: {operation}")]
    NotImplemented { operation: &'static str },

    /// A tagged value could not be decoded.
    #[error("Decoding error: {message}")]
    Decoding { message: String },

    /// Library loading, backend selection, or configuration problem.
    #[error("Interface error: {message}")]
    Interface { message: String },
}

impl DbError {
    /// Status code of a `Database` error, if this is one.
    pub fn status(&self) -> Option<i32> {
        match self {
            DbError::Database { code, .. } => Some(*code),
            _ => None,
        }
    }
}
