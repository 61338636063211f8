//! CLI argument definitions and the query runner.
//!
//! Connection flags override whatever `ConnectOptions::resolve` found in the
//! configuration file or the environment.

use clap::Parser;
use std::error::Error;
use std::path::PathBuf;

use crate::config::{ConfigFile, ConnectOptions};
use crate::db::{BackendKind, Connection, DbError};
use crate::output::{OutputFormat, Outputable, QueryOutput};

#[derive(Parser, Debug)]
#[command(author, version, about = "Run one SQL statement against a NitrosBase server", long_about = None)]
pub struct Args {
    /// SQL statement to execute
    pub query: String,

    /// Configuration file to use instead of ./.nbase.json and the environment
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Server host
    #[arg(long)]
    pub host: Option<String>,

    /// Server port
    #[arg(short, long)]
    pub port: Option<u16>,

    /// User name (ODBC backend only)
    #[arg(short, long)]
    pub user: Option<String>,

    /// Password (ODBC backend only)
    #[arg(long)]
    pub password: Option<String>,

    /// Backend implementation
    #[arg(short, long, value_enum)]
    pub backend: Option<BackendKind>,

    /// Path of the NitrosBase client library (cpp_lib backend)
    #[arg(long)]
    pub lib_path: Option<PathBuf>,

    /// ODBC driver name (odbc backend)
    #[arg(long)]
    pub odbc_driver: Option<String>,

    /// Output format
    #[arg(short = 'o', long, value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,

    /// Maximum number of rows to fetch
    #[arg(short, long, value_parser = clap::value_parser!(u32).range(1..))]
    pub limit: Option<u32>,
}

impl Args {
    /// Resolve connection options and apply the command-line overrides.
    pub fn connect_options(&self) -> Result<ConnectOptions, Box<dyn Error>> {
        let mut options = match &self.config {
            Some(path) => ConfigFile::load_from(path)?.connection,
            None => ConnectOptions::resolve()?,
        };
        if let Some(host) = &self.host {
            options.host = host.clone();
        }
        if let Some(port) = self.port {
            options.port = port;
        }
        if let Some(user) = &self.user {
            options.user = Some(user.clone());
        }
        if let Some(password) = &self.password {
            options.password = Some(password.clone());
        }
        if let Some(backend) = self.backend {
            options.backend = backend;
        }
        if let Some(lib_path) = &self.lib_path {
            options.lib_path = Some(lib_path.clone());
        }
        if let Some(driver) = &self.odbc_driver {
            options.odbc_driver = Some(driver.clone());
        }
        Ok(options)
    }

    /// Connect, run the query, and render its rows.
    pub fn run(&self) -> Result<String, Box<dyn Error>> {
        let options = self.connect_options()?;
        let mut connection = options.connect()?;
        let output = run_query(&connection, &self.query, self.limit)?;
        connection.close()?;
        Ok(output.format(self.format))
    }
}

/// Execute `query` on a fresh cursor and collect up to `limit` rows.
pub fn run_query(
    connection: &Connection,
    query: &str,
    limit: Option<u32>,
) -> Result<QueryOutput, DbError> {
    let mut cursor = connection.cursor()?;
    cursor.execute(query)?;

    let max_rows = limit.map_or(usize::MAX, |n| n as usize);
    let mut rows = Vec::new();
    while rows.len() < max_rows {
        match cursor.fetchone()? {
            Some(row) => rows.push(row),
            None => break,
        }
    }
    // no look-ahead past the limit, so an exact fit also counts as reached
    let truncated = limit.is_some() && rows.len() == max_rows;

    let columns = cursor.description().map(<[_]>::to_vec).unwrap_or_default();
    cursor.close();
    Ok(QueryOutput {
        query: query.to_string(),
        columns,
        rows,
        truncated,
    })
}
