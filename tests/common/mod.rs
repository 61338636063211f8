//! In-process fake of the NitrosBase native client contract.
//!
//! `FakeNbClient` answers queries from canned result sets, hands out text
//! fields as addresses of `CString`s it owns, and records calls in a
//! `FakeLog` the test keeps after the client has been moved into a gateway.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::ffi::{CStr, CString};
use std::ptr::NonNull;
use std::rc::Rc;

use nbase::db::{Connection, FieldKind, NativeApi, NativeGateway, RawHandle, StatusCode, TaggedValue};

const OK: i32 = StatusCode::Ok.code();

/// One cell of a canned row.
#[derive(Debug, Clone)]
pub enum FakeCell {
    Int32(i32),
    Int64(i64),
    Double(f64),
    Bool(bool),
    Text(FieldKind, CString),
    Null(FieldKind),
    Tagged(TaggedValue),
}

impl FakeCell {
    pub fn text(s: &str) -> Self {
        Self::typed(FieldKind::String, s)
    }

    /// Address-carrying field of `kind` (DATETIME, DATE, URI or STRING).
    pub fn typed(kind: FieldKind, s: &str) -> Self {
        FakeCell::Text(kind, CString::new(s).unwrap())
    }

    /// Text field whose bytes are not valid UTF-8.
    pub fn bytes(b: &[u8]) -> Self {
        FakeCell::Text(FieldKind::String, CString::new(b.to_vec()).unwrap())
    }

    fn tagged(&self) -> TaggedValue {
        match self {
            FakeCell::Int32(v) => TaggedValue::int32(*v),
            FakeCell::Int64(v) => TaggedValue::int64(*v),
            FakeCell::Double(v) => TaggedValue::double(*v),
            FakeCell::Bool(v) => TaggedValue::boolean(*v),
            FakeCell::Text(kind, s) => TaggedValue::text(*kind, s.as_ptr() as usize as u64),
            FakeCell::Null(kind) => TaggedValue::null(*kind),
            FakeCell::Tagged(value) => *value,
        }
    }

    fn kind_code(&self) -> i32 {
        match self {
            FakeCell::Int32(_) => FieldKind::Int32.code(),
            FakeCell::Int64(_) => FieldKind::Int64.code(),
            FakeCell::Double(_) => FieldKind::Double.code(),
            FakeCell::Bool(_) => FieldKind::Bool.code(),
            FakeCell::Text(kind, _) => kind.code(),
            FakeCell::Null(kind) => kind.code(),
            FakeCell::Tagged(value) => value.kind,
        }
    }
}

#[derive(Debug, Clone)]
enum Canned {
    Rows {
        names: Vec<CString>,
        rows: Vec<Vec<FakeCell>>,
    },
    Error {
        code: i32,
        text: String,
    },
}

#[derive(Debug, Default)]
struct ResultSet {
    names: Vec<CString>,
    pending: VecDeque<Vec<FakeCell>>,
    current: Option<Vec<FakeCell>>,
}

/// Calls observed by the fake, shared with the test.
#[derive(Debug, Clone, Default)]
pub struct FakeLog {
    connects: Rc<Cell<usize>>,
    disconnects: Rc<Cell<usize>>,
    last_query: Rc<RefCell<Vec<u8>>>,
}

impl FakeLog {
    pub fn connects(&self) -> usize {
        self.connects.get()
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.get()
    }

    pub fn last_query(&self) -> Vec<u8> {
        self.last_query.borrow().clone()
    }
}

/// Fake native client serving canned results.
#[derive(Debug)]
pub struct FakeNbClient {
    accept: bool,
    canned: HashMap<String, Canned>,
    fetch_status: Option<i32>,
    fetch_failure: Option<(usize, i32, String)>,
    value_failure: Option<(i32, String)>,
    extra_fields: i32,
    fetches: Cell<usize>,
    errno: Cell<i32>,
    err_text: RefCell<String>,
    result: RefCell<ResultSet>,
    log: FakeLog,
}

impl FakeNbClient {
    pub fn new() -> Self {
        Self {
            accept: true,
            canned: HashMap::new(),
            fetch_status: None,
            fetch_failure: None,
            value_failure: None,
            extra_fields: 0,
            fetches: Cell::new(0),
            errno: Cell::new(OK),
            err_text: RefCell::new(String::new()),
            result: RefCell::new(ResultSet::default()),
            log: FakeLog::default(),
        }
    }

    pub fn log(&self) -> FakeLog {
        self.log.clone()
    }

    pub fn refusing(mut self) -> Self {
        self.accept = false;
        self
    }

    pub fn with_rows(mut self, query: &str, names: &[&str], rows: Vec<Vec<FakeCell>>) -> Self {
        let names = names.iter().map(|n| CString::new(*n).unwrap()).collect();
        self.canned.insert(query.to_string(), Canned::Rows { names, rows });
        self
    }

    pub fn with_error(mut self, query: &str, code: i32, text: &str) -> Self {
        self.canned.insert(
            query.to_string(),
            Canned::Error {
                code,
                text: text.to_string(),
            },
        );
        self
    }

    /// Make every `fetch_row` return `status` without filling the error slot.
    pub fn with_fetch_status(mut self, status: i32) -> Self {
        self.fetch_status = Some(status);
        self
    }

    /// Let `count` fetches succeed, then fail with `code` and fill the error slot with `text`.
    pub fn with_fetch_failure_after(mut self, count: usize, code: i32, text: &str) -> Self {
        self.fetch_failure = Some((count, code, text.to_string()));
        self
    }

    /// Make every `field_value` fail with `code` and `text`.
    pub fn with_value_failure(mut self, code: i32, text: &str) -> Self {
        self.value_failure = Some((code, text.to_string()));
        self
    }

    /// Report one more field than the result set has names for.
    pub fn overreporting_fields(mut self) -> Self {
        self.extra_fields = 1;
        self
    }

    fn fail(&self, code: i32, text: &str) -> i32 {
        self.errno.set(code);
        *self.err_text.borrow_mut() = text.to_string();
        code
    }

    fn cell(&self, index: i32) -> Option<FakeCell> {
        let result = self.result.borrow();
        let row = result.current.as_ref()?;
        row.get(usize::try_from(index).ok()?).cloned()
    }
}

pub fn dangling_handle() -> RawHandle {
    unsafe { RawHandle::from_ptr(NonNull::<u8>::dangling().as_ptr().cast()) }.unwrap()
}

// Text addresses point into `CString`s owned by `result`, which only changes
// on `execute_sql` and `fetch_row`.
unsafe impl NativeApi for FakeNbClient {
    fn connect(&self, _host: &CStr, _port: i32) -> Option<RawHandle> {
        self.log.connects.set(self.log.connects.get() + 1);
        self.accept.then(dangling_handle)
    }

    fn disconnect(&self, _handle: RawHandle) -> i32 {
        self.log.disconnects.set(self.log.disconnects.get() + 1);
        OK
    }

    fn errno(&self, _handle: RawHandle) -> i32 {
        self.errno.get()
    }

    fn err_text(&self, _handle: RawHandle) -> String {
        self.err_text.borrow().clone()
    }

    fn execute_sql(&self, _handle: RawHandle, query: &[u8]) -> i32 {
        *self.log.last_query.borrow_mut() = query.to_vec();
        self.errno.set(OK);
        let mut result = self.result.borrow_mut();
        *result = ResultSet::default();
        let query = String::from_utf8_lossy(query).into_owned();
        match self.canned.get(&query) {
            Some(Canned::Rows { names, rows }) => {
                result.names = names.clone();
                result.pending = rows.iter().cloned().collect();
                OK
            }
            Some(Canned::Error { code, text }) => self.fail(*code, text),
            None => self.fail(StatusCode::ErrorQuery.code(), "unknown table"),
        }
    }

    fn fetch_row(&self, _handle: RawHandle) -> i32 {
        if let Some(status) = self.fetch_status {
            return status;
        }
        let fetched = self.fetches.get();
        self.fetches.set(fetched + 1);
        if let Some((count, code, text)) = &self.fetch_failure {
            if fetched >= *count {
                return self.fail(*code, text);
            }
        }
        let mut result = self.result.borrow_mut();
        result.current = result.pending.pop_front();
        if result.current.is_some() {
            OK
        } else {
            StatusCode::NoData.code()
        }
    }

    fn field_count(&self, _handle: RawHandle) -> i32 {
        self.result.borrow().names.len() as i32 + self.extra_fields
    }

    fn field_name(&self, _handle: RawHandle, index: i32, out: &mut TaggedValue) -> i32 {
        let result = self.result.borrow();
        match usize::try_from(index).ok().and_then(|i| result.names.get(i)) {
            Some(name) => {
                *out = TaggedValue::text(FieldKind::String, name.as_ptr() as usize as u64);
                OK
            }
            None => self.fail(StatusCode::ErrorArgs.code(), "field index out of range"),
        }
    }

    fn field_type(&self, _handle: RawHandle, index: i32) -> i32 {
        self.cell(index).map(|cell| cell.kind_code()).unwrap_or(FieldKind::None.code())
    }

    fn field_value(&self, _handle: RawHandle, index: i32, out: &mut TaggedValue) -> i32 {
        if let Some((code, text)) = &self.value_failure {
            return self.fail(*code, text);
        }
        let result = self.result.borrow();
        let cell = result
            .current
            .as_ref()
            .and_then(|row| usize::try_from(index).ok().and_then(|i| row.get(i)));
        match cell {
            Some(cell) => {
                *out = cell.tagged();
                OK
            }
            None => self.fail(StatusCode::ErrorArgs.code(), "field index out of range"),
        }
    }
}

/// Open a session over a gateway wrapping `client`.
pub fn open(client: FakeNbClient) -> Connection {
    try_open(client).unwrap()
}

pub fn try_open(client: FakeNbClient) -> Result<Connection, nbase::DbError> {
    let gateway = NativeGateway::new(client);
    Connection::open(Box::new(gateway), "localhost", 3020, None, None)
}
