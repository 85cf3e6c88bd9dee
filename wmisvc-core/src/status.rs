//! Native status codes.
//!
//! [`HResult`] carries a raw `HRESULT` independently of the `windows` crate so
//! the error taxonomy (and the mock runtime) compile on every target.

use std::fmt;

use serde::Serialize;

/// A raw COM / WMI `HRESULT`.
///
/// Negative values are failures; zero and positive values are success codes
/// (`S_OK`, `S_FALSE`, `WBEM_S_TIMEDOUT`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HResult(pub i32);

impl HResult {
    pub const fn from_u32(code: u32) -> Self {
        Self(code as i32)
    }

    pub const fn is_failure(self) -> bool {
        self.0 < 0
    }

    pub const fn is_success(self) -> bool {
        !self.is_failure()
    }

    /// The code as an unsigned value, the way Windows tooling prints it.
    pub const fn as_u32(self) -> u32 {
        self.0 as u32
    }
}

impl fmt::Display for HResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.as_u32())
    }
}

impl Serialize for HResult {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

#[cfg(windows)]
impl From<windows::core::Error> for HResult {
    fn from(err: windows::core::Error) -> Self {
        Self(err.code().0)
    }
}

#[cfg(windows)]
impl From<windows::core::HRESULT> for HResult {
    fn from(hr: windows::core::HRESULT) -> Self {
        Self(hr.0)
    }
}

// ---------------------------------------------------------------------------
// Well-known codes
// ---------------------------------------------------------------------------

pub const S_OK: HResult = HResult(0);
pub const S_FALSE: HResult = HResult(1);

pub const E_POINTER: HResult = HResult::from_u32(0x8000_4003);
pub const E_OUTOFMEMORY: HResult = HResult::from_u32(0x8007_000E);
pub const E_ACCESSDENIED: HResult = HResult::from_u32(0x8007_0005);

/// Thread already initialised in an incompatible apartment.
pub const RPC_E_CHANGED_MODE: HResult = HResult::from_u32(0x8001_0106);
pub const REGDB_E_CLASSNOTREG: HResult = HResult::from_u32(0x8004_0154);
pub const CO_E_NOTINITIALIZED: HResult = HResult::from_u32(0x8004_01F0);

pub const WBEM_S_TIMEDOUT: HResult = HResult::from_u32(0x0004_0004);
pub const WBEM_E_NOT_FOUND: HResult = HResult::from_u32(0x8004_1002);
pub const WBEM_E_ACCESS_DENIED: HResult = HResult::from_u32(0x8004_1003);
pub const WBEM_E_INVALID_NAMESPACE: HResult = HResult::from_u32(0x8004_100E);
pub const WBEM_E_TRANSPORT_FAILURE: HResult = HResult::from_u32(0x8004_1015);
pub const WBEM_E_INVALID_OBJECT_PATH: HResult = HResult::from_u32(0x8004_103A);
