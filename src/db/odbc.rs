//! Gateway over a standard ODBC driver (via `odbc-api`).
//!
//! ODBC cursors borrow their connection, which does not fit the row-at-a-time
//! `Backend` verbs. Each executed statement is therefore drained into an owned
//! buffer right away; `read_record` then walks that buffer. Every column is
//! fetched as text and re-typed from its ODBC data type, so callers see the
//! same `FieldKind`/`Value` space as with the native library.

use std::collections::VecDeque;
use std::sync::OnceLock;

use odbc_api::{Connection, ConnectionOptions, Cursor, DataType, Environment, ResultSetMetadata};
use tracing::Span;

use super::backend::Backend;
use super::config::BackendOptions;
use super::tagged::{FieldKind, StatusCode};
use super::value::Value;
use super::DbError;

static ENVIRONMENT: OnceLock<Environment> = OnceLock::new();

fn environment() -> Result<&'static Environment, DbError> {
    if let Some(env) = ENVIRONMENT.get() {
        return Ok(env);
    }
    let env = Environment::new().map_err(odbc_error)?;
    Ok(ENVIRONMENT.get_or_init(|| env))
}

fn odbc_error(e: odbc_api::Error) -> DbError {
    DbError::Database {
        code: StatusCode::ErrorAnother.code(),
        message: e.to_string(),
    }
}

fn field_kind(data_type: &DataType) -> FieldKind {
    match data_type {
        DataType::TinyInt | DataType::SmallInt | DataType::Integer => FieldKind::Int32,
        DataType::BigInt => FieldKind::Int64,
        DataType::Real
        | DataType::Float { .. }
        | DataType::Double
        | DataType::Numeric { .. }
        | DataType::Decimal { .. } => FieldKind::Double,
        DataType::Bit => FieldKind::Bool,
        DataType::Date => FieldKind::Date,
        DataType::Time { .. } | DataType::Timestamp { .. } => FieldKind::DateTime,
        _ => FieldKind::String,
    }
}

/// Re-type one text cell according to its column kind.
fn typed_value(kind: FieldKind, text: Option<String>) -> Result<Value, DbError> {
    let Some(text) = text else {
        return Ok(Value::Null);
    };
    let parse_error = |e: &dyn std::fmt::Display| DbError::Decoding {
        message: format!("cannot read '{}' as {}: {}", text, kind, e),
    };
    let value = match kind {
        FieldKind::None => Value::Null,
        FieldKind::Int32 => Value::Int32(text.trim().parse().map_err(|e| parse_error(&e))?),
        FieldKind::Int64 => Value::Int64(text.trim().parse().map_err(|e| parse_error(&e))?),
        FieldKind::Double => Value::Double(text.trim().parse().map_err(|e| parse_error(&e))?),
        FieldKind::Bool => match text.trim() {
            "1" => Value::Bool(true),
            "0" => Value::Bool(false),
            other => return Err(parse_error(&format!("unexpected bit '{}'", other))),
        },
        FieldKind::DateTime => Value::DateTime(text),
        FieldKind::Date => Value::Date(text),
        FieldKind::Uri => Value::Uri(text),
        FieldKind::String => Value::Text(text),
    };
    Ok(value)
}

#[derive(Debug)]
struct BufferedRow {
    values: Vec<Option<String>>,
}

#[derive(Debug, Default)]
struct ResultBuffer {
    columns: Vec<(String, FieldKind)>,
    rows: VecDeque<BufferedRow>,
    current: Option<BufferedRow>,
}

/// Backend speaking ODBC through the system driver manager.
pub struct OdbcGateway {
    driver: String,
    connection: Option<Connection<'static>>,
    result: ResultBuffer,
    span: Span,
}

impl OdbcGateway {
    pub fn new(options: &BackendOptions) -> Result<Self, DbError> {
        let driver = options.odbc_driver.clone().ok_or_else(|| DbError::Interface {
            message: "odbc_driver must be provided for the odbc backend".to_string(),
        })?;
        Ok(Self {
            driver,
            connection: None,
            result: ResultBuffer::default(),
            span: options
                .span
                .clone()
                .unwrap_or_else(|| tracing::info_span!("nbase.gateway", backend = "odbc")),
        })
    }

    fn connection_string(&self, host: &str, port: u16, user: Option<&str>, password: Option<&str>) -> String {
        let mut parts = vec![
            format!("Driver={{{}}}", self.driver),
            format!("Server={}", host),
            format!("Port={}", port),
        ];
        if let Some(user) = user {
            parts.push(format!("UID={}", user));
        }
        if let Some(password) = password {
            parts.push(format!("PWD={}", password));
        }
        parts.join(";")
    }

    fn connection(&self) -> Result<&Connection<'static>, DbError> {
        self.connection.as_ref().ok_or_else(|| DbError::Connection {
            message: "no open connection to the database".to_string(),
        })
    }

    fn current_row(&self) -> Result<&BufferedRow, DbError> {
        self.result.current.as_ref().ok_or_else(|| DbError::Logic {
            message: "no current row; call read_record first".to_string(),
        })
    }

    fn column(&self, index: usize) -> Result<&(String, FieldKind), DbError> {
        self.result.columns.get(index).ok_or_else(|| DbError::Interface {
            message: format!("field index {} out of range", index),
        })
    }
}

impl Backend for OdbcGateway {
    fn backend_name(&self) -> &'static str {
        "Odbc"
    }

    fn connect(
        &mut self,
        host: &str,
        port: u16,
        user: Option<&str>,
        password: Option<&str>,
    ) -> Result<bool, DbError> {
        if self.connection.is_some() {
            return Err(DbError::Logic {
                message: "gateway is already connected".to_string(),
            });
        }
        let env = environment()?;
        let connection_string = self.connection_string(host, port, user, password);
        tracing::info!(parent: &self.span, host, port, driver = %self.driver, "connecting");
        match env.connect_with_connection_string(&connection_string, ConnectionOptions::default()) {
            Ok(connection) => {
                self.connection = Some(connection);
                Ok(true)
            }
            Err(e) => {
                tracing::error!(parent: &self.span, error = %e, "ODBC connect failed");
                Err(DbError::Connection {
                    message: format!("Cannot connect to DB with URI {}:{}: {}", host, port, e),
                })
            }
        }
    }

    fn disconnect(&mut self) -> Result<(), DbError> {
        self.result = ResultBuffer::default();
        if let Some(connection) = self.connection.take() {
            tracing::info!(parent: &self.span, "disconnecting");
            drop(connection);
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    fn execute_sql(&mut self, query: &str) -> Result<(), DbError> {
        tracing::debug!(parent: &self.span, query, "executing SQL");
        let mut buffer = ResultBuffer::default();
        let connection = self.connection()?;
        if let Some(mut cursor) = connection.execute(query, (), None).map_err(odbc_error)? {
            let count = cursor.num_result_cols().map_err(odbc_error)?;
            let count = u16::try_from(count).map_err(|_| DbError::Decoding {
                message: format!("invalid column count {}", count),
            })?;
            for col in 1..=count {
                let name = cursor.col_name(col).map_err(odbc_error)?;
                let kind = field_kind(&cursor.col_data_type(col).map_err(odbc_error)?);
                buffer.columns.push((name, kind));
            }
            let mut text = Vec::new();
            while let Some(mut row) = cursor.next_row().map_err(odbc_error)? {
                let mut values = Vec::with_capacity(buffer.columns.len());
                for col in 1..=count {
                    let present = row.get_text(col, &mut text).map_err(odbc_error)?;
                    let value = if present {
                        Some(String::from_utf8(text.clone()).map_err(|e| DbError::Decoding {
                            message: format!("text value is not valid UTF-8: {}", e),
                        })?)
                    } else {
                        None
                    };
                    values.push(value);
                }
                buffer.rows.push_back(BufferedRow { values });
            }
        }
        tracing::debug!(parent: &self.span, rows = buffer.rows.len(), "result set buffered");
        self.result = buffer;
        Ok(())
    }

    fn read_record(&mut self) -> Result<bool, DbError> {
        self.connection()?;
        self.result.current = self.result.rows.pop_front();
        Ok(self.result.current.is_some())
    }

    fn field_count(&mut self) -> Result<usize, DbError> {
        self.connection()?;
        Ok(self.result.columns.len())
    }

    fn field_name(&mut self, index: usize) -> Result<String, DbError> {
        self.connection()?;
        Ok(self.column(index)?.0.clone())
    }

    fn field_type(&mut self, index: usize) -> Result<FieldKind, DbError> {
        self.connection()?;
        Ok(self.column(index)?.1)
    }

    fn field_value(&mut self, index: usize) -> Result<Value, DbError> {
        self.connection()?;
        let kind = self.column(index)?.1;
        let text = self
            .current_row()?
            .values
            .get(index)
            .cloned()
            .ok_or_else(|| DbError::Interface {
                message: format!("field index {} out of range", index),
            })?;
        typed_value(kind, text)
    }

    fn check_error(&mut self) -> Result<(), DbError> {
        // odbc-api reports diagnostics on the failing call itself.
        self.connection()?;
        Ok(())
    }
}
