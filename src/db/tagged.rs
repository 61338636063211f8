//! Wire-level types of the native client contract and the tagged value decoder.
//!
//! The native library hands every field name and field value back as a
//! fixed-layout tagged value: a kind tag, a 12-byte payload and a null flag.
//! Scalars live inline in the payload; text kinds carry the address of a
//! NUL-terminated byte string owned by the library until the next fetch.
//!
//! Decoding is split in two steps so the unsafe part stays small:
//! - `Payload` reads fixed-width little-endian slots out of the 12 bytes with
//!   bounds checks, never reinterpreting memory.
//! - `TextSource` resolves a text address into bytes. The only implementation
//!   that touches foreign memory is `ForeignMemory`, which can only be
//!   constructed through an `unsafe` promise about address validity.

use std::ffi::{c_char, CStr};
use std::fmt;

use super::value::Value;
use super::DbError;

/// Size of the inline payload of a tagged value.
pub const PAYLOAD_LEN: usize = 12;

/// Status codes returned by the native library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum StatusCode {
    Ok = 0,
    NoData = 1,
    ErrorFile = 100,
    ErrorMem = 101,
    ErrorArgs = 102,
    ErrorCppFunc = 103,
    ErrorQuery = 104,
    ErrorConnect = 105,
    ErrorAnother = 200,
}

impl StatusCode {
    /// Map a raw status code to its symbolic value, if it is one the library documents.
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::Ok),
            1 => Some(Self::NoData),
            100 => Some(Self::ErrorFile),
            101 => Some(Self::ErrorMem),
            102 => Some(Self::ErrorArgs),
            103 => Some(Self::ErrorCppFunc),
            104 => Some(Self::ErrorQuery),
            105 => Some(Self::ErrorConnect),
            200 => Some(Self::ErrorAnother),
            _ => None,
        }
    }

    pub const fn code(self) -> i32 {
        self as i32
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::NoData => "NO_DATA",
            Self::ErrorFile => "ERROR_FILE",
            Self::ErrorMem => "ERROR_MEM",
            Self::ErrorArgs => "ERROR_ARGS",
            Self::ErrorCppFunc => "ERROR_CPPFUNC",
            Self::ErrorQuery => "ERROR_QUERY",
            Self::ErrorConnect => "ERROR_CONNECT",
            Self::ErrorAnother => "ERROR_ANOTHER",
        }
    }

    /// Human-readable label for any raw code, e.g. `ERROR_QUERY (104)` or `status 7`.
    pub fn describe(code: i32) -> String {
        match Self::from_code(code) {
            Some(status) => format!("{} ({})", status.name(), code),
            None => format!("status {}", code),
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Field kinds reported by the native library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "lowercase")]
#[repr(i32)]
pub enum FieldKind {
    None = 0,
    String = 1,
    Int32 = 2,
    Int64 = 3,
    Double = 4,
    DateTime = 5,
    Bool = 6,
    Date = 7,
    Uri = 8,
}

impl FieldKind {
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::String => "STRING",
            Self::Int32 => "INT32",
            Self::Int64 => "INT64",
            Self::Double => "DOUBLE",
            Self::DateTime => "DATETIME",
            Self::Bool => "BOOL",
            Self::Date => "DATE",
            Self::Uri => "URI",
        }
    }
}

impl TryFrom<i32> for FieldKind {
    type Error = DbError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::None),
            1 => Ok(Self::String),
            2 => Ok(Self::Int32),
            3 => Ok(Self::Int64),
            4 => Ok(Self::Double),
            5 => Ok(Self::DateTime),
            6 => Ok(Self::Bool),
            7 => Ok(Self::Date),
            8 => Ok(Self::Uri),
            other => Err(DbError::Decoding {
                message: format!("unrecognized field kind {}", other),
            }),
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A tagged value as received from the native library.
///
/// The library's C layout is mirrored by the loader; this is the host-side copy
/// with the null flag already normalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TaggedValue {
    pub kind: i32,
    pub raw: [u8; PAYLOAD_LEN],
    pub is_null: bool,
}

impl TaggedValue {
    /// A non-null value of `kind` with an all-zero payload.
    pub fn new(kind: FieldKind) -> Self {
        Self {
            kind: kind.code(),
            raw: [0; PAYLOAD_LEN],
            is_null: false,
        }
    }

    pub fn null(kind: FieldKind) -> Self {
        Self {
            is_null: true,
            ..Self::new(kind)
        }
    }

    pub fn int32(v: i32) -> Self {
        Self::new(FieldKind::Int32).with_payload(&v.to_le_bytes())
    }

    pub fn int64(v: i64) -> Self {
        Self::new(FieldKind::Int64).with_payload(&v.to_le_bytes())
    }

    pub fn double(v: f64) -> Self {
        Self::new(FieldKind::Double).with_payload(&v.to_le_bytes())
    }

    pub fn boolean(v: bool) -> Self {
        Self::new(FieldKind::Bool).with_payload(&[u8::from(v)])
    }

    /// A text-carrying value pointing at `address`.
    pub fn text(kind: FieldKind, address: u64) -> Self {
        Self::new(kind).with_payload(&address.to_le_bytes())
    }

    /// Copy `bytes` to the start of the payload; bytes past the payload are ignored.
    pub fn with_payload(mut self, bytes: &[u8]) -> Self {
        let len = bytes.len().min(PAYLOAD_LEN);
        self.raw[..len].copy_from_slice(&bytes[..len]);
        self
    }

    pub fn payload(&self) -> Payload<'_> {
        Payload(&self.raw)
    }
}

/// Bounds-checked little-endian reader over a tagged value payload.
#[derive(Debug, Clone, Copy)]
pub struct Payload<'a>(&'a [u8; PAYLOAD_LEN]);

impl Payload<'_> {
    fn slot<const N: usize>(&self, offset: usize) -> Result<[u8; N], DbError> {
        offset
            .checked_add(N)
            .and_then(|end| self.0.get(offset..end))
            .and_then(|bytes| bytes.try_into().ok())
            .ok_or_else(|| DbError::Decoding {
                message: format!(
                    "payload slot {}..{} out of bounds",
                    offset,
                    offset.saturating_add(N)
                ),
            })
    }

    pub fn i32_le(&self) -> Result<i32, DbError> {
        self.slot::<4>(0).map(i32::from_le_bytes)
    }

    pub fn i64_le(&self) -> Result<i64, DbError> {
        self.slot::<8>(0).map(i64::from_le_bytes)
    }

    pub fn f64_le(&self) -> Result<f64, DbError> {
        self.slot::<8>(0).map(f64::from_le_bytes)
    }

    pub fn address(&self) -> Result<u64, DbError> {
        self.slot::<8>(0).map(u64::from_le_bytes)
    }

    pub fn flag(&self) -> Result<bool, DbError> {
        match self.slot::<1>(0)? {
            [0] => Ok(false),
            [1] => Ok(true),
            [other] => Err(DbError::Decoding {
                message: format!("invalid boolean byte {:#04x}", other),
            }),
        }
    }
}

/// Resolves the address carried by a text value into its bytes (without the terminator).
pub trait TextSource {
    fn read_text(&self, address: u64) -> Result<Vec<u8>, DbError>;
}

/// Reads NUL-terminated strings straight out of process memory.
#[derive(Debug)]
pub struct ForeignMemory {
    _private: (),
}

impl ForeignMemory {
    /// # Safety
    ///
    /// Every non-zero address later passed to `read_text` must point at a
    /// NUL-terminated byte string that stays valid for the duration of the call.
    pub unsafe fn assume_valid() -> Self {
        Self { _private: () }
    }
}

impl TextSource for ForeignMemory {
    fn read_text(&self, address: u64) -> Result<Vec<u8>, DbError> {
        if address == 0 {
            return Err(DbError::Decoding {
                message: "text value carries a null address".to_string(),
            });
        }
        let ptr = usize::try_from(address).map_err(|_| DbError::Decoding {
            message: format!("text address {:#x} does not fit a pointer", address),
        })? as *const c_char;
        // SAFETY: guaranteed by the contract of `ForeignMemory::assume_valid`.
        let text = unsafe { CStr::from_ptr(ptr) };
        Ok(text.to_bytes().to_vec())
    }
}

/// Decode a tagged value into a host value.
///
/// The null flag wins over everything else. Unknown kinds and text that is
/// not valid UTF-8 are errors, never substituted.
pub fn decode(value: &TaggedValue, text: &dyn TextSource) -> Result<Value, DbError> {
    if value.is_null {
        return Ok(Value::Null);
    }

    let kind = FieldKind::try_from(value.kind)?;
    let payload = value.payload();

    let decoded = match kind {
        FieldKind::None => Value::Null,
        FieldKind::Int32 => Value::Int32(payload.i32_le()?),
        FieldKind::Int64 => Value::Int64(payload.i64_le()?),
        FieldKind::Double => Value::Double(payload.f64_le()?),
        FieldKind::Bool => Value::Bool(payload.flag()?),
        FieldKind::String => Value::Text(read_utf8(&payload, text)?),
        FieldKind::Uri => Value::Uri(read_utf8(&payload, text)?),
        FieldKind::DateTime => Value::DateTime(read_utf8(&payload, text)?),
        FieldKind::Date => Value::Date(read_utf8(&payload, text)?),
    };
    Ok(decoded)
}

fn read_utf8(payload: &Payload<'_>, text: &dyn TextSource) -> Result<String, DbError> {
    let bytes = text.read_text(payload.address()?)?;
    String::from_utf8(bytes).map_err(|e| DbError::Decoding {
        message: format!("text value is not valid UTF-8: {}", e),
    })
}
