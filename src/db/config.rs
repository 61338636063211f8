//! Backend selection.
//!
//! Maps a backend kind to the constructor of its gateway. The kind comes from
//! the CLI, the config file, or the `NBASE_BACKEND` environment variable.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::Span;

use super::backend::Backend;
use super::native::{NativeGateway, NbClientLibrary};
use super::DbError;

/// Available backend implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// NitrosBase native client library loaded at runtime
    #[default]
    #[value(aliases = ["cpp", "cpp_lib"])]
    #[serde(alias = "cpp", alias = "cpp-lib")]
    CppLib,
    /// Standard ODBC driver
    Odbc,
}

/// Builds a backend from options; one per `BackendKind`.
pub type BackendConstructor = fn(&BackendOptions) -> Result<Box<dyn Backend>, DbError>;

impl BackendKind {
    pub fn name(self) -> &'static str {
        match self {
            BackendKind::CppLib => "cpp_lib",
            BackendKind::Odbc => "odbc",
        }
    }

    /// Constructor of the gateway implementing this kind.
    pub fn constructor(self) -> BackendConstructor {
        match self {
            BackendKind::CppLib => native_backend,
            BackendKind::Odbc => odbc_backend,
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for BackendKind {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cpp_lib" | "cpp-lib" | "cpp" => Ok(BackendKind::CppLib),
            "odbc" => Ok(BackendKind::Odbc),
            other => Err(DbError::Interface {
                message: format!("unrecognized backend kind '{}' (expected cpp_lib or odbc)", other),
            }),
        }
    }
}

/// Backend-specific construction options.
#[derive(Debug, Clone, Default)]
pub struct BackendOptions {
    /// Path of `libnbclient` (native backend).
    pub lib_path: Option<PathBuf>,
    /// ODBC driver name used in the connection string (ODBC backend).
    pub odbc_driver: Option<String>,
    /// Span the gateway logs under; a per-backend default when unset.
    pub span: Option<Span>,
}

/// Create a backend instance of `kind`.
pub fn create_backend(kind: BackendKind, options: &BackendOptions) -> Result<Box<dyn Backend>, DbError> {
    (kind.constructor())(options)
}

fn native_backend(options: &BackendOptions) -> Result<Box<dyn Backend>, DbError> {
    let path = options.lib_path.as_ref().ok_or_else(|| DbError::Interface {
        message: "lib_path (NitrosBase client library path) must be provided for the cpp_lib backend"
            .to_string(),
    })?;
    tracing::info!(path = %path.display(), "loading NitrosBase client library");
    let gateway = NativeGateway::new(NbClientLibrary::load(path)?);
    let gateway = match &options.span {
        Some(span) => gateway.with_span(span.clone()),
        None => gateway,
    };
    Ok(Box::new(gateway))
}

#[cfg(feature = "backend-odbc")]
fn odbc_backend(options: &BackendOptions) -> Result<Box<dyn Backend>, DbError> {
    Ok(Box::new(super::odbc::OdbcGateway::new(options)?))
}

#[cfg(not(feature = "backend-odbc"))]
fn odbc_backend(_options: &BackendOptions) -> Result<Box<dyn Backend>, DbError> {
    Err(DbError::Interface {
        message: "odbc backend is not compiled in; rebuild with the `backend-odbc` feature".to_string(),
    })
}
