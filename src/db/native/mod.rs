//! Gateway over the NitrosBase native client library.
//!
//! `NativeApi` is the raw call contract of the library, one method per entry
//! point. `NbClientLibrary` implements it over a dynamically loaded
//! `libnbclient`; tests implement it in-process. `NativeGateway` turns the raw
//! contract into the `Backend` capability: it owns the connection handle,
//! checks every status code, and decodes tagged values.

mod library;

pub use library::NbClientLibrary;

use std::ffi::{c_void, CString};
use std::ptr::NonNull;

use tracing::Span;

use super::backend::Backend;
use super::tagged::{decode, FieldKind, ForeignMemory, StatusCode, TaggedValue};
use super::value::{DatabaseValue, Value};
use super::DbError;

/// Opaque connection handle handed out by the native library.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawHandle(NonNull<c_void>);

impl RawHandle {
    /// Wrap a handle pointer; `None` for null.
    ///
    /// # Safety
    ///
    /// A non-null `ptr` must be a handle the owning `NativeApi` accepts until
    /// it is passed to `NativeApi::disconnect`.
    pub unsafe fn from_ptr(ptr: *mut c_void) -> Option<Self> {
        NonNull::new(ptr).map(Self)
    }

    pub fn as_ptr(self) -> *mut c_void {
        self.0.as_ptr()
    }
}

/// Raw call contract of the native client library.
///
/// Status-returning methods return the library's status code unchanged;
/// interpretation is left to the gateway.
///
/// # Safety
///
/// Implementors guarantee that every text-carrying tagged value written by
/// `field_name` or `field_value` holds either a zero address or the address of
/// a NUL-terminated string that stays valid until the next `fetch_row`,
/// `execute_sql` or `disconnect` on the same handle.
pub unsafe trait NativeApi {
    fn connect(&self, host: &std::ffi::CStr, port: i32) -> Option<RawHandle>;
    fn disconnect(&self, handle: RawHandle) -> i32;
    fn errno(&self, handle: RawHandle) -> i32;
    fn err_text(&self, handle: RawHandle) -> String;
    fn execute_sql(&self, handle: RawHandle, query: &[u8]) -> i32;
    fn fetch_row(&self, handle: RawHandle) -> i32;
    fn field_count(&self, handle: RawHandle) -> i32;
    fn field_name(&self, handle: RawHandle, index: i32, out: &mut TaggedValue) -> i32;
    fn field_type(&self, handle: RawHandle, index: i32) -> i32;
    fn field_value(&self, handle: RawHandle, index: i32, out: &mut TaggedValue) -> i32;
}

/// Backend speaking the native client contract.
///
/// The connection handle is released exactly once: by `disconnect` or, failing
/// that, when the gateway is dropped.
pub struct NativeGateway<A: NativeApi = NbClientLibrary> {
    api: A,
    handle: Option<RawHandle>,
    span: Span,
}

impl<A: NativeApi> NativeGateway<A> {
    pub fn new(api: A) -> Self {
        Self {
            api,
            handle: None,
            span: tracing::info_span!("nbase.gateway", backend = "cpp_lib"),
        }
    }

    /// Emit this gateway's events under `span` instead of the default one.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    fn handle(&self) -> Result<RawHandle, DbError> {
        self.handle.ok_or_else(|| DbError::Connection {
            message: "no open connection to the database".to_string(),
        })
    }

    /// Turn a non-OK status from `verb` into an error.
    ///
    /// The foreign error slot is consulted first so its text wins; when the
    /// slot reports success the status code itself is raised.
    fn ensure_ok(&mut self, status: i32, verb: &str) -> Result<(), DbError> {
        if status == StatusCode::Ok.code() {
            return Ok(());
        }
        self.check_error()?;
        tracing::error!(
            parent: &self.span,
            status = %StatusCode::describe(status),
            verb,
            "native call failed without an error report"
        );
        Err(DbError::Database {
            code: status,
            message: format!("{} failed", verb),
        })
    }

    fn field_index(index: usize) -> Result<i32, DbError> {
        i32::try_from(index).map_err(|_| DbError::Interface {
            message: format!("field index {} out of range", index),
        })
    }

    fn decode_out(&self, value: &TaggedValue) -> Result<Value, DbError> {
        tracing::trace!(
            parent: &self.span,
            kind = value.kind,
            null = value.is_null,
            raw = %hex::encode(value.raw),
            "decoding tagged value"
        );
        // SAFETY: `NativeApi` implementors guarantee text addresses stay valid
        // until the next fetch, and no foreign call happens during decoding.
        let memory = unsafe { ForeignMemory::assume_valid() };
        decode(value, &memory)
    }
}

impl<A: NativeApi> Backend for NativeGateway<A> {
    fn backend_name(&self) -> &'static str {
        "NativeLibrary"
    }

    fn connect(
        &mut self,
        host: &str,
        port: u16,
        user: Option<&str>,
        password: Option<&str>,
    ) -> Result<bool, DbError> {
        if self.handle.is_some() {
            return Err(DbError::Logic {
                message: "gateway is already connected".to_string(),
            });
        }
        let host_c = CString::new(host).map_err(|_| DbError::Interface {
            message: format!("host '{}' contains a NUL byte", host.escape_debug()),
        })?;
        if user.is_some() || password.is_some() {
            tracing::debug!(parent: &self.span, "native client takes no credentials; ignoring user/password");
        }

        tracing::info!(parent: &self.span, host, port, "connecting");
        self.handle = self.api.connect(&host_c, i32::from(port));
        if self.handle.is_none() {
            tracing::error!(parent: &self.span, host, port, "native library returned no connection handle");
        }
        Ok(self.handle.is_some())
    }

    fn disconnect(&mut self) -> Result<(), DbError> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        tracing::info!(parent: &self.span, "disconnecting");
        let status = self.api.disconnect(handle);
        if status != StatusCode::Ok.code() {
            tracing::error!(parent: &self.span, status = %StatusCode::describe(status), "disconnect failed");
            return Err(DbError::Database {
                code: status,
                message: "disconnect failed".to_string(),
            });
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.handle.is_some()
    }

    fn execute_sql(&mut self, query: &str) -> Result<(), DbError> {
        let handle = self.handle()?;
        tracing::debug!(parent: &self.span, query, "executing SQL");
        let status = self.api.execute_sql(handle, query.as_bytes());
        self.check_error()?;
        self.ensure_ok(status, "execute_sql")
    }

    fn read_record(&mut self) -> Result<bool, DbError> {
        let handle = self.handle()?;
        let status = self.api.fetch_row(handle);
        match StatusCode::from_code(status) {
            Some(StatusCode::Ok) => {
                tracing::trace!(parent: &self.span, "row fetched");
                Ok(true)
            }
            Some(StatusCode::NoData) => {
                tracing::debug!(parent: &self.span, "end of result set");
                Ok(false)
            }
            _ => self.ensure_ok(status, "fetch_row").map(|()| false),
        }
    }

    fn field_count(&mut self) -> Result<usize, DbError> {
        let handle = self.handle()?;
        let count = self.api.field_count(handle);
        self.check_error()?;
        usize::try_from(count).map_err(|_| DbError::Decoding {
            message: format!("negative field count {}", count),
        })
    }

    fn field_name(&mut self, index: usize) -> Result<String, DbError> {
        let handle = self.handle()?;
        let mut out = TaggedValue::default();
        let status = self.api.field_name(handle, Self::field_index(index)?, &mut out);
        self.ensure_ok(status, "field_name")?;
        match self.decode_out(&out)? {
            Value::Text(name) => Ok(name),
            other => Err(DbError::Decoding {
                message: format!("field {} name is {} rather than text", index, other.type_name()),
            }),
        }
    }

    fn field_type(&mut self, index: usize) -> Result<FieldKind, DbError> {
        let handle = self.handle()?;
        let code = self.api.field_type(handle, Self::field_index(index)?);
        self.check_error()?;
        FieldKind::try_from(code)
    }

    fn field_value(&mut self, index: usize) -> Result<Value, DbError> {
        let handle = self.handle()?;
        let mut out = TaggedValue::default();
        let status = self.api.field_value(handle, Self::field_index(index)?, &mut out);
        self.ensure_ok(status, "field_value")?;
        self.decode_out(&out)
    }

    fn check_error(&mut self) -> Result<(), DbError> {
        let handle = self.handle()?;
        let code = self.api.errno(handle);
        if code == StatusCode::Ok.code() {
            return Ok(());
        }
        let message = self.api.err_text(handle);
        tracing::error!(parent: &self.span, status = %StatusCode::describe(code), "{}", message);
        Err(DbError::Database { code, message })
    }
}

impl<A: NativeApi> Drop for NativeGateway<A> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            let status = self.api.disconnect(handle);
            if status != StatusCode::Ok.code() {
                tracing::warn!(parent: &self.span, status = %StatusCode::describe(status), "disconnect on drop failed");
            }
        }
    }
}
