//! C ABI DLL for wmisvc -- loadable by ctypes, C#, or any FFI consumer.
//!
//! All exported functions follow the convention:
//! - Return `i32` status code: `WMISVC_OK=0`, `WMISVC_ERROR=-1`
//! - Handles are opaque pointers from `wmisvc_connect` / `wmisvc_clone`,
//!   released with `wmisvc_release`, and only usable on the creating thread
//! - Strings allocated by Rust are freed via `wmisvc_free_string()`
//! - Last error retrievable via `wmisvc_last_error()`, its HRESULT via
//!   `wmisvc_last_status()` and the structured record via
//!   `wmisvc_last_failure_json()`

#![cfg_attr(not(windows), allow(dead_code, unused_imports))]

use std::cell::{Cell, RefCell};
use std::ffi::{c_char, CStr, CString};
use std::ptr;
use std::time::Duration;

use wmisvc_core::{FailureRecord, ServiceHandle, Wait, WmiError, WmiRuntime};

pub const WMISVC_OK: i32 = 0;
pub const WMISVC_ERROR: i32 = -1;

/// `timeout_ms` value for [`wmisvc_delete_path_timeout`] that waits forever.
pub const WMISVC_INFINITE: u32 = u32::MAX;

/// Opaque handle type seen by C callers.
#[cfg(windows)]
pub type WmisvcService = wmisvc_core::WmiService;

thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
    static LAST_FAILURE: RefCell<Option<FailureRecord>> = const { RefCell::new(None) };
    static LAST_STATUS: Cell<i32> = const { Cell::new(0) };
}

fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
    LAST_FAILURE.with(|f| *f.borrow_mut() = None);
    LAST_STATUS.with(|s| s.set(0));
}

/// Replace only the message, keeping the failure record and status of the
/// last failed operation readable.
fn set_last_message(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

fn set_last_failure(err: &WmiError) -> i32 {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(err.to_string()).ok();
    });
    LAST_FAILURE.with(|f| *f.borrow_mut() = Some(err.to_record()));
    LAST_STATUS.with(|s| s.set(err.status().map_or(0, |hr| hr.0)));
    WMISVC_ERROR
}

fn wait_from_ms(timeout_ms: u32) -> Wait {
    match timeout_ms {
        WMISVC_INFINITE => Wait::Infinite,
        ms => Wait::Bounded(Duration::from_millis(u64::from(ms))),
    }
}

unsafe fn read_str<'a>(arg: &str, ptr: *const c_char) -> Result<&'a str, i32> {
    if ptr.is_null() {
        set_last_error(&format!("{arg} is null"));
        return Err(WMISVC_ERROR);
    }
    unsafe { CStr::from_ptr(ptr) }.to_str().map_err(|e| {
        set_last_error(&format!("{arg}: invalid UTF-8: {e}"));
        WMISVC_ERROR
    })
}

// ---------------------------------------------------------------------------
// Runtime-generic implementations
// ---------------------------------------------------------------------------

unsafe fn connect_with<R: WmiRuntime>(
    namespace: *const c_char,
    out_handle: *mut *mut ServiceHandle<R>,
) -> i32 {
    if out_handle.is_null() {
        set_last_error("out_handle is null");
        return WMISVC_ERROR;
    }
    let namespace = match unsafe { read_str("namespace", namespace) } {
        Ok(s) => s,
        Err(code) => return code,
    };
    match ServiceHandle::<R>::connect(namespace) {
        Ok(handle) => {
            unsafe { *out_handle = Box::into_raw(Box::new(handle)) };
            WMISVC_OK
        }
        Err(e) => set_last_failure(&e),
    }
}

unsafe fn clone_with<R: WmiRuntime>(
    handle: *const ServiceHandle<R>,
    out_handle: *mut *mut ServiceHandle<R>,
) -> i32 {
    if handle.is_null() || out_handle.is_null() {
        set_last_error("null pointer argument");
        return WMISVC_ERROR;
    }
    match unsafe { &*handle }.try_clone() {
        Ok(copy) => {
            unsafe { *out_handle = Box::into_raw(Box::new(copy)) };
            WMISVC_OK
        }
        Err(e) => set_last_failure(&e),
    }
}

unsafe fn assign_with<R: WmiRuntime>(
    target: *mut ServiceHandle<R>,
    source: *const ServiceHandle<R>,
) -> i32 {
    if target.is_null() || source.is_null() {
        set_last_error("null pointer argument");
        return WMISVC_ERROR;
    }
    if ptr::eq(target, source) {
        return WMISVC_OK;
    }
    match unsafe { &mut *target }.assign_from(unsafe { &*source }) {
        Ok(()) => WMISVC_OK,
        Err(e) => set_last_failure(&e),
    }
}

unsafe fn equal_with<R: WmiRuntime>(a: *const ServiceHandle<R>, b: *const ServiceHandle<R>) -> i32 {
    if a.is_null() || b.is_null() {
        set_last_error("null pointer argument");
        return WMISVC_ERROR;
    }
    i32::from(unsafe { &*a } == unsafe { &*b })
}

unsafe fn delete_with<R: WmiRuntime>(
    handle: *const ServiceHandle<R>,
    object_path: *const c_char,
    wait: Wait,
) -> i32 {
    if handle.is_null() {
        set_last_error("handle is null");
        return WMISVC_ERROR;
    }
    let object_path = match unsafe { read_str("object_path", object_path) } {
        Ok(s) => s,
        Err(code) => return code,
    };
    let result = unsafe { &*handle }
        .submit_delete(object_path, None)
        .and_then(|pending| pending.wait_for(wait));
    match result {
        Ok(()) => WMISVC_OK,
        Err(e) => set_last_failure(&e),
    }
}

unsafe fn release_with<R: WmiRuntime>(handle: *mut ServiceHandle<R>) {
    if !handle.is_null() {
        drop(unsafe { Box::from_raw(handle) });
    }
}

// ---------------------------------------------------------------------------
// Error reporting
// ---------------------------------------------------------------------------

/// Retrieve the last error message (thread-local).
///
/// Returns a pointer valid until the next wmisvc_* call on this thread.
/// Returns null if no error has occurred.
#[no_mangle]
pub extern "C" fn wmisvc_last_error() -> *const c_char {
    LAST_ERROR.with(|e| {
        e.borrow()
            .as_ref()
            .map(|s| s.as_ptr())
            .unwrap_or(ptr::null())
    })
}

/// HRESULT of the last native failure on this thread, or 0.
#[no_mangle]
pub extern "C" fn wmisvc_last_status() -> i32 {
    LAST_STATUS.with(|s| s.get())
}

/// The last failure as a JSON record (`kind`, `stage`, `status`, ...).
///
/// # Safety
///
/// `out_json` must be a valid pointer to a `*mut c_char`.  On success it
/// receives a heap-allocated string; free with `wmisvc_free_string()`.
/// Errors here update `wmisvc_last_error()` but leave the record in place.
#[no_mangle]
pub unsafe extern "C" fn wmisvc_last_failure_json(out_json: *mut *mut c_char) -> i32 {
    if out_json.is_null() {
        set_last_message("out_json is null");
        return WMISVC_ERROR;
    }
    let Some(record) = LAST_FAILURE.with(|f| f.borrow().clone()) else {
        set_last_message("no failure recorded");
        return WMISVC_ERROR;
    };
    let json = match serde_json::to_string(&record) {
        Ok(json) => json,
        Err(e) => {
            set_last_message(&format!("serialization failed: {e}"));
            return WMISVC_ERROR;
        }
    };
    match CString::new(json) {
        Ok(cstr) => {
            unsafe { *out_json = cstr.into_raw() };
            WMISVC_OK
        }
        Err(e) => {
            set_last_message(&format!("record contains a NUL byte: {e}"));
            WMISVC_ERROR
        }
    }
}

/// Free a string previously allocated by a wmisvc_* function.
///
/// # Safety
///
/// `ptr` must be a pointer returned by a wmisvc_* function or null.
#[no_mangle]
pub unsafe extern "C" fn wmisvc_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(unsafe { CString::from_raw(ptr) });
    }
}

// ---------------------------------------------------------------------------
// Exports
// ---------------------------------------------------------------------------

/// Connect to a WMI namespace (e.g. `ROOT\CIMV2`).
///
/// # Safety
///
/// `namespace` must be a valid null-terminated UTF-8 C string and
/// `out_handle` a valid pointer.  Release the handle with `wmisvc_release()`.
#[cfg(windows)]
#[no_mangle]
pub unsafe extern "C" fn wmisvc_connect(
    namespace: *const c_char,
    out_handle: *mut *mut WmisvcService,
) -> i32 {
    unsafe { connect_with(namespace, out_handle) }
}

/// Create another handle sharing `handle`'s connection.
///
/// # Safety
///
/// `handle` must be a live handle created on this thread; `out_handle` a
/// valid pointer.
#[cfg(windows)]
#[no_mangle]
pub unsafe extern "C" fn wmisvc_clone(
    handle: *const WmisvcService,
    out_handle: *mut *mut WmisvcService,
) -> i32 {
    unsafe { clone_with(handle, out_handle) }
}

/// Make `target` share `source`'s connection.  On failure `target` is
/// unchanged.
///
/// # Safety
///
/// Both must be live handles created on this thread.
#[cfg(windows)]
#[no_mangle]
pub unsafe extern "C" fn wmisvc_assign(target: *mut WmisvcService, source: *const WmisvcService) -> i32 {
    unsafe { assign_with(target, source) }
}

/// `1` if both handles share one connection, `0` if not, `-1` on null.
///
/// # Safety
///
/// Both must be live handles or null.
#[cfg(windows)]
#[no_mangle]
pub unsafe extern "C" fn wmisvc_equal(a: *const WmisvcService, b: *const WmisvcService) -> i32 {
    unsafe { equal_with(a, b) }
}

/// Delete the instance at `object_path`, blocking until the service
/// confirms.
///
/// # Safety
///
/// `handle` must be a live handle created on this thread; `object_path` a
/// valid null-terminated UTF-8 C string.
#[cfg(windows)]
#[no_mangle]
pub unsafe extern "C" fn wmisvc_delete_path(handle: *const WmisvcService, object_path: *const c_char) -> i32 {
    unsafe { delete_with(handle, object_path, Wait::Infinite) }
}

/// [`wmisvc_delete_path`] giving up after `timeout_ms` milliseconds.
/// `WMISVC_INFINITE` (`0xFFFFFFFF`) waits without a bound, like
/// [`wmisvc_delete_path`].
///
/// # Safety
///
/// As for [`wmisvc_delete_path`].
#[cfg(windows)]
#[no_mangle]
pub unsafe extern "C" fn wmisvc_delete_path_timeout(
    handle: *const WmisvcService,
    object_path: *const c_char,
    timeout_ms: u32,
) -> i32 {
    unsafe { delete_with(handle, object_path, wait_from_ms(timeout_ms)) }
}

/// Release a handle.  The connection closes with its last handle.
///
/// # Safety
///
/// `handle` must come from `wmisvc_connect` / `wmisvc_clone` on this thread
/// and not be used afterwards.  Null is ignored.
#[cfg(windows)]
#[no_mangle]
pub unsafe extern "C" fn wmisvc_release(handle: *mut WmisvcService) {
    unsafe { release_with(handle) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wmisvc_core::mock::{MockCall, MockRuntime};
    use wmisvc_core::status::{E_OUTOFMEMORY, WBEM_E_NOT_FOUND, WBEM_S_TIMEDOUT};

    type Handle = ServiceHandle<MockRuntime>;

    const NS: &CStr = c"root\\test";
    const SHARE: &CStr = c"Win32_Share.Name='scratch'";

    fn connect() -> *mut Handle {
        MockRuntime::install_namespace(r"root\test", &["Win32_Share.Name='scratch'"]);
        let mut handle: *mut Handle = ptr::null_mut();
        assert_eq!(unsafe { connect_with(NS.as_ptr(), &mut handle) }, WMISVC_OK);
        assert!(!handle.is_null());
        handle
    }

    fn last_error() -> String {
        let p = wmisvc_last_error();
        assert!(!p.is_null());
        unsafe { CStr::from_ptr(p) }.to_string_lossy().into_owned()
    }

    #[test]
    fn test_connect_delete_release() {
        let h = connect();
        assert_eq!(unsafe { delete_with(h, SHARE.as_ptr(), Wait::Infinite) }, WMISVC_OK);
        assert!(!MockRuntime::contains(r"root\test", "Win32_Share.Name='scratch'"));
        unsafe { release_with(h) };
        assert_eq!(MockRuntime::live_services(), 0);
    }

    #[test]
    fn test_null_arguments() {
        let mut out: *mut Handle = ptr::null_mut();
        assert_eq!(unsafe { connect_with::<MockRuntime>(ptr::null(), &mut out) }, WMISVC_ERROR);
        assert_eq!(last_error(), "namespace is null");
        assert_eq!(unsafe { equal_with::<MockRuntime>(ptr::null(), ptr::null()) }, WMISVC_ERROR);
        unsafe { release_with::<MockRuntime>(ptr::null_mut()) };
    }

    #[test]
    fn test_failure_reports_status_and_record() {
        let h = connect();
        let ghost = c"Win32_Share.Name='ghost'";
        assert_eq!(unsafe { delete_with(h, ghost.as_ptr(), Wait::Infinite) }, WMISVC_ERROR);
        assert_eq!(wmisvc_last_status(), WBEM_E_NOT_FOUND.0);
        assert!(last_error().starts_with("OperationError (completed)"));

        let mut json: *mut c_char = ptr::null_mut();
        assert_eq!(unsafe { wmisvc_last_failure_json(&mut json) }, WMISVC_OK);
        let text = unsafe { CStr::from_ptr(json) }.to_string_lossy().into_owned();
        unsafe { wmisvc_free_string(json) };
        assert!(text.contains("\"stage\":\"completed\""));
        assert!(text.contains("\"status\":\"0x80041002\""));

        unsafe { release_with(h) };
    }

    #[test]
    fn test_failure_record_survives_bad_json_call() {
        let h = connect();
        let ghost = c"Win32_Share.Name='ghost'";
        assert_eq!(unsafe { delete_with(h, ghost.as_ptr(), Wait::Infinite) }, WMISVC_ERROR);

        assert_eq!(unsafe { wmisvc_last_failure_json(ptr::null_mut()) }, WMISVC_ERROR);
        assert_eq!(last_error(), "out_json is null");
        assert_eq!(wmisvc_last_status(), WBEM_E_NOT_FOUND.0);

        let mut json: *mut c_char = ptr::null_mut();
        assert_eq!(unsafe { wmisvc_last_failure_json(&mut json) }, WMISVC_OK);
        let text = unsafe { CStr::from_ptr(json) }.to_string_lossy().into_owned();
        unsafe { wmisvc_free_string(json) };
        assert!(text.contains("\"status\":\"0x80041002\""));

        unsafe { release_with(h) };
    }

    #[test]
    fn test_missing_failure_record() {
        let mut out: *mut Handle = ptr::null_mut();
        assert_eq!(unsafe { connect_with::<MockRuntime>(ptr::null(), &mut out) }, WMISVC_ERROR);

        let mut json: *mut c_char = ptr::null_mut();
        assert_eq!(unsafe { wmisvc_last_failure_json(&mut json) }, WMISVC_ERROR);
        assert!(json.is_null());
        assert_eq!(last_error(), "no failure recorded");
    }

    #[test]
    fn test_timeout_sentinel_waits_forever() {
        assert_eq!(wait_from_ms(WMISVC_INFINITE), Wait::Infinite);
        assert_eq!(wait_from_ms(0), Wait::Bounded(Duration::ZERO));
        assert_eq!(wait_from_ms(u32::MAX - 1), Wait::Bounded(Duration::from_millis(0xFFFF_FFFE)));

        // A delayed completion times out under a bound but not under the sentinel.
        let h = connect();
        MockRuntime::delay_next_completion();
        assert_eq!(unsafe { delete_with(h, SHARE.as_ptr(), wait_from_ms(50)) }, WMISVC_ERROR);
        assert_eq!(wmisvc_last_status(), WBEM_S_TIMEDOUT.0);

        MockRuntime::add_instance(r"root\test", "Win32_Share.Name='scratch'");
        MockRuntime::delay_next_completion();
        assert_eq!(unsafe { delete_with(h, SHARE.as_ptr(), wait_from_ms(WMISVC_INFINITE)) }, WMISVC_OK);
        unsafe { release_with(h) };
    }

    #[test]
    fn test_clone_equal_assign() {
        let a = connect();
        let mut b: *mut Handle = ptr::null_mut();
        assert_eq!(unsafe { clone_with(a, &mut b) }, WMISVC_OK);
        assert_eq!(unsafe { equal_with(a, b) }, 1);

        let c = connect();
        assert_eq!(unsafe { equal_with(a, c) }, 0);

        MockRuntime::fail_next(MockCall::InitializeThread, E_OUTOFMEMORY);
        assert_eq!(unsafe { assign_with(c, a) }, WMISVC_ERROR);
        assert_eq!(unsafe { equal_with(a, c) }, 0);

        assert_eq!(unsafe { assign_with(c, a) }, WMISVC_OK);
        assert_eq!(unsafe { equal_with(a, c) }, 1);

        for h in [a, b, c] {
            unsafe { release_with(h) };
        }
        assert_eq!(MockRuntime::live_services(), 0);
        assert_eq!(MockRuntime::native_init_depth(), 0);
    }
}
