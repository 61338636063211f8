//! Shared test utilities for session tests.
//!
//! `MockBackend` implements `Backend` over canned result sets keyed by query
//! text, and records calls in a `MockLog` that outlives the backend.

use std::cell::Cell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use crate::db::{Backend, DbError, FieldKind, Value};

type MockRow = Vec<(&'static str, Value)>;

/// Call counters shared between a `MockBackend` and the test holding it.
#[derive(Debug, Clone, Default)]
pub struct MockLog {
    disconnects: Rc<Cell<usize>>,
    executes: Rc<Cell<usize>>,
    fetches: Rc<Cell<usize>>,
}

impl MockLog {
    pub fn disconnects(&self) -> usize {
        self.disconnects.get()
    }

    pub fn executes(&self) -> usize {
        self.executes.get()
    }

    pub fn fetches(&self) -> usize {
        self.fetches.get()
    }
}

enum Canned {
    Rows(Vec<MockRow>),
    Error { code: i32, message: String },
}

/// In-memory backend for connection and cursor tests.
pub struct MockBackend {
    log: MockLog,
    accept: bool,
    connected: bool,
    results: HashMap<String, Canned>,
    pending: VecDeque<MockRow>,
    current: Option<MockRow>,
    fetches_before_failure: Option<usize>,
    drop_on: Option<String>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            log: MockLog::default(),
            accept: true,
            connected: false,
            results: HashMap::new(),
            pending: VecDeque::new(),
            current: None,
            fetches_before_failure: None,
            drop_on: None,
        }
    }

    pub fn log(&self) -> MockLog {
        self.log.clone()
    }

    /// Answer `query` with `rows`.
    pub fn with_result(mut self, query: &str, rows: Vec<MockRow>) -> Self {
        self.results.insert(query.to_string(), Canned::Rows(rows));
        self
    }

    /// Fail `query` with a database status.
    pub fn with_error(mut self, query: &str, code: i32, message: &str) -> Self {
        self.results.insert(
            query.to_string(),
            Canned::Error {
                code,
                message: message.to_string(),
            },
        );
        self
    }

    /// Refuse every connection attempt.
    pub fn refusing(mut self) -> Self {
        self.accept = false;
        self
    }

    /// Let `count` fetches succeed, then fail every further fetch.
    pub fn failing_fetch_after(mut self, count: usize) -> Self {
        self.fetches_before_failure = Some(count);
        self
    }

    /// Lose the connection when `query` is executed.
    pub fn dropping_connection_on(mut self, query: &str) -> Self {
        self.drop_on = Some(query.to_string());
        self
    }

    fn current(&self) -> Result<&MockRow, DbError> {
        self.current.as_ref().ok_or_else(|| DbError::Logic {
            message: "no current row".to_string(),
        })
    }

    fn field(&self, index: usize) -> Result<&(&'static str, Value), DbError> {
        self.current()?.get(index).ok_or_else(|| DbError::Interface {
            message: format!("field index {} out of range", index),
        })
    }
}

impl Backend for MockBackend {
    fn backend_name(&self) -> &'static str {
        "Mock"
    }

    fn connect(
        &mut self,
        _host: &str,
        _port: u16,
        _user: Option<&str>,
        _password: Option<&str>,
    ) -> Result<bool, DbError> {
        self.connected = self.accept;
        Ok(self.connected)
    }

    fn disconnect(&mut self) -> Result<(), DbError> {
        if self.connected {
            self.connected = false;
            self.log.disconnects.set(self.log.disconnects.get() + 1);
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn execute_sql(&mut self, query: &str) -> Result<(), DbError> {
        self.log.executes.set(self.log.executes.get() + 1);
        self.current = None;
        if self.drop_on.as_deref() == Some(query) {
            self.connected = false;
            return Err(DbError::Connection {
                message: "server closed the connection".to_string(),
            });
        }
        match self.results.get(query) {
            Some(Canned::Rows(rows)) => {
                self.pending = rows.iter().cloned().collect();
                Ok(())
            }
            Some(Canned::Error { code, message }) => {
                self.pending.clear();
                Err(DbError::Database {
                    code: *code,
                    message: message.clone(),
                })
            }
            None => {
                self.pending.clear();
                Ok(())
            }
        }
    }

    fn read_record(&mut self) -> Result<bool, DbError> {
        self.log.fetches.set(self.log.fetches.get() + 1);
        if let Some(remaining) = self.fetches_before_failure.as_mut() {
            if *remaining == 0 {
                return Err(DbError::Database {
                    code: 110,
                    message: "fetch failed".to_string(),
                });
            }
            *remaining -= 1;
        }
        self.current = self.pending.pop_front();
        Ok(self.current.is_some())
    }

    fn field_count(&mut self) -> Result<usize, DbError> {
        Ok(self.current()?.len())
    }

    fn field_name(&mut self, index: usize) -> Result<String, DbError> {
        Ok(self.field(index)?.0.to_string())
    }

    fn field_type(&mut self, index: usize) -> Result<FieldKind, DbError> {
        Ok(self.field(index)?.1.kind())
    }

    fn field_value(&mut self, index: usize) -> Result<Value, DbError> {
        Ok(self.field(index)?.1.clone())
    }

    fn check_error(&mut self) -> Result<(), DbError> {
        Ok(())
    }
}
