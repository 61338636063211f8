//! Dynamic loading of the NitrosBase client library (`libnbclient`).

use std::ffi::{c_char, c_int, c_void, CStr};
use std::path::{Path, PathBuf};

use libloading::Library;

use super::{NativeApi, RawHandle};
use crate::db::tagged::{TaggedValue, PAYLOAD_LEN};
use crate::db::DbError;

/// C layout of the library's tagged value.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
struct NbValue {
    kind: c_int,
    value: [u8; PAYLOAD_LEN],
    // C `bool`, read as a byte so a stray value cannot produce an invalid Rust bool.
    null: u8,
}

impl From<NbValue> for TaggedValue {
    fn from(v: NbValue) -> Self {
        TaggedValue {
            kind: v.kind,
            raw: v.value,
            is_null: v.null != 0,
        }
    }
}

type ConnectFn = unsafe extern "C" fn(*const c_char, c_int) -> *mut c_void;
type HandleStatusFn = unsafe extern "C" fn(*mut c_void) -> c_int;
type ErrTextFn = unsafe extern "C" fn(*mut c_void) -> *const c_char;
type ExecuteSqlFn = unsafe extern "C" fn(*mut c_void, *const c_char, usize) -> c_int;
type FieldTypeFn = unsafe extern "C" fn(*mut c_void, c_int) -> c_int;
type FieldOutFn = unsafe extern "C" fn(*mut c_void, c_int, *mut NbValue) -> c_int;

/// A loaded `libnbclient` with every entry point resolved.
pub struct NbClientLibrary {
    _lib: Library,
    path: PathBuf,
    connect_fn: ConnectFn,
    disconnect_fn: HandleStatusFn,
    errno_fn: HandleStatusFn,
    err_text_fn: ErrTextFn,
    execute_sql_fn: ExecuteSqlFn,
    fetch_row_fn: HandleStatusFn,
    field_count_fn: HandleStatusFn,
    field_name_fn: FieldOutFn,
    field_type_fn: FieldTypeFn,
    field_value_fn: FieldOutFn,
}

impl std::fmt::Debug for NbClientLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NbClientLibrary")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

fn symbol<T: Copy>(lib: &Library, name: &str, path: &Path) -> Result<T, DbError> {
    // SAFETY: every alias above matches the C prototype of the symbol it is used for.
    let sym = unsafe { lib.get::<T>(name.as_bytes()) }.map_err(|e| DbError::Interface {
        message: format!("library '{}' missing {} symbol: {}", path.display(), name, e),
    })?;
    Ok(*sym)
}

impl NbClientLibrary {
    /// Load the client library from `path` and resolve its entry points.
    pub fn load(path: &Path) -> Result<Self, DbError> {
        // SAFETY: loading runs the library's initializers; libnbclient has no
        // initialization requirements beyond being the library it claims to be.
        let lib = unsafe { Library::new(path) }.map_err(|e| DbError::Interface {
            message: format!("failed to load library '{}': {}", path.display(), e),
        })?;

        Ok(Self {
            connect_fn: symbol(&lib, "nb_connect", path)?,
            disconnect_fn: symbol(&lib, "nb_disconnect", path)?,
            errno_fn: symbol(&lib, "nb_errno", path)?,
            err_text_fn: symbol(&lib, "nb_err_text", path)?,
            execute_sql_fn: symbol(&lib, "nb_execute_sql", path)?,
            fetch_row_fn: symbol(&lib, "nb_fetch_row", path)?,
            field_count_fn: symbol(&lib, "nb_field_count", path)?,
            field_name_fn: symbol(&lib, "nb_field_name", path)?,
            field_type_fn: symbol(&lib, "nb_field_type", path)?,
            field_value_fn: symbol(&lib, "nb_field_value", path)?,
            path: path.to_path_buf(),
            _lib: lib,
        })
    }

    fn read_out(&self, f: FieldOutFn, handle: RawHandle, index: i32, out: &mut TaggedValue) -> i32 {
        let mut raw = NbValue::default();
        // SAFETY: `handle` came from `nb_connect` on this library and `raw` is a
        // live, properly laid out out-parameter.
        let status = unsafe { f(handle.as_ptr(), index, &mut raw) };
        *out = raw.into();
        status
    }
}

// SAFETY: libnbclient keeps the strings referenced by field names and values
// alive until the next `nb_fetch_row`/`nb_execute_sql` on the same handle.
unsafe impl NativeApi for NbClientLibrary {
    fn connect(&self, host: &CStr, port: i32) -> Option<RawHandle> {
        // SAFETY: `host` is a valid NUL-terminated string for the call.
        let ptr = unsafe { (self.connect_fn)(host.as_ptr(), port) };
        // SAFETY: a non-null pointer returned by nb_connect is a live connection handle.
        unsafe { RawHandle::from_ptr(ptr) }
    }

    fn disconnect(&self, handle: RawHandle) -> i32 {
        // SAFETY: handle is live; the gateway never uses it after this call.
        unsafe { (self.disconnect_fn)(handle.as_ptr()) }
    }

    fn errno(&self, handle: RawHandle) -> i32 {
        // SAFETY: handle is live.
        unsafe { (self.errno_fn)(handle.as_ptr()) }
    }

    fn err_text(&self, handle: RawHandle) -> String {
        // SAFETY: handle is live.
        let ptr = unsafe { (self.err_text_fn)(handle.as_ptr()) };
        if ptr.is_null() {
            return String::new();
        }
        // SAFETY: nb_err_text returns a NUL-terminated string owned by the handle.
        unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
    }

    fn execute_sql(&self, handle: RawHandle, query: &[u8]) -> i32 {
        // SAFETY: the library reads exactly `query.len()` bytes.
        unsafe {
            (self.execute_sql_fn)(handle.as_ptr(), query.as_ptr().cast::<c_char>(), query.len())
        }
    }

    fn fetch_row(&self, handle: RawHandle) -> i32 {
        // SAFETY: handle is live.
        unsafe { (self.fetch_row_fn)(handle.as_ptr()) }
    }

    fn field_count(&self, handle: RawHandle) -> i32 {
        // SAFETY: handle is live.
        unsafe { (self.field_count_fn)(handle.as_ptr()) }
    }

    fn field_name(&self, handle: RawHandle, index: i32, out: &mut TaggedValue) -> i32 {
        self.read_out(self.field_name_fn, handle, index, out)
    }

    fn field_type(&self, handle: RawHandle, index: i32) -> i32 {
        // SAFETY: handle is live.
        unsafe { (self.field_type_fn)(handle.as_ptr(), index) }
    }

    fn field_value(&self, handle: RawHandle, index: i32, out: &mut TaggedValue) -> i32 {
        self.read_out(self.field_value_fn, handle, index, out)
    }
}
