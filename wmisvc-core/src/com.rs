//! COM / WMI binding of [`WmiRuntime`].
//!
//! [`ComRuntime`] maps the seam onto `CoInitializeEx`, `IWbemLocator`,
//! `CoSetProxyBlanket`, `IWbemServices::DeleteInstance` and
//! `IWbemCallResult::GetCallStatus` via `windows-rs`.  `Clone` on the
//! interface types is `AddRef`, `Drop` is `Release` and `==` compares
//! interface pointers.

use std::cell::Cell;
use std::thread::LocalKey;

use windows::core::{Interface, BSTR, PCWSTR};
use windows::Win32::System::Com::{
    CoCreateInstance, CoInitializeEx, CoSetProxyBlanket, CoUninitialize, CLSCTX_INPROC_SERVER,
    COINIT_MULTITHREADED, EOLE_AUTHENTICATION_CAPABILITIES, RPC_C_AUTHN_LEVEL, RPC_C_IMP_LEVEL,
};
use windows::Win32::System::Wmi::{
    IWbemCallResult, IWbemContext, IWbemLocator, IWbemServices, WbemLocator,
    WBEM_FLAG_RETURN_IMMEDIATELY,
};

use crate::runtime::{CallStatus, Wait, WmiRuntime};
use crate::security::SecurityContext;
use crate::status::{HResult, E_POINTER, WBEM_S_TIMEDOUT};

thread_local! {
    static COM_GUARDS: Cell<usize> = const { Cell::new(0) };
}

/// The production runtime: the local WMI service over COM.
pub struct ComRuntime;

impl WmiRuntime for ComRuntime {
    type Locator = IWbemLocator;
    type Services = IWbemServices;
    type Context = IWbemContext;
    type CallResult = IWbemCallResult;

    fn thread_guards() -> &'static LocalKey<Cell<usize>> {
        &COM_GUARDS
    }

    /// Join (or create) the thread's MTA.
    ///
    /// `S_OK` and `S_FALSE` both need a balancing `CoUninitialize`;
    /// everything else, including `RPC_E_CHANGED_MODE`, does not.
    fn initialize_thread() -> Result<HResult, HResult> {
        let hr = HResult::from(unsafe { CoInitializeEx(None, COINIT_MULTITHREADED) });
        match hr.as_u32() {
            0x0 | 0x1 => Ok(hr),
            _ => Err(hr),
        }
    }

    fn uninitialize_thread() {
        unsafe { CoUninitialize() };
    }

    fn create_locator() -> Result<IWbemLocator, HResult> {
        let locator: IWbemLocator =
            unsafe { CoCreateInstance(&WbemLocator, None, CLSCTX_INPROC_SERVER)? };
        Ok(locator)
    }

    fn connect_server(locator: &IWbemLocator, namespace: &str) -> Result<IWbemServices, HResult> {
        let services = unsafe {
            locator.ConnectServer(
                &BSTR::from(namespace),
                &BSTR::new(), // user: current
                &BSTR::new(), // password: current
                &BSTR::new(), // locale: current
                0,            // security flags
                &BSTR::new(), // authority
                None,         // context
            )?
        };
        Ok(services)
    }

    fn set_proxy_blanket(services: &IWbemServices, security: &SecurityContext) -> Result<(), HResult> {
        unsafe {
            CoSetProxyBlanket(
                services,
                security.authn_service(),
                security.authz_service(),
                PCWSTR::null(), // server principal
                RPC_C_AUTHN_LEVEL(security.authn_level()),
                RPC_C_IMP_LEVEL(security.impersonation_level()),
                None, // client identity: current
                EOLE_AUTHENTICATION_CAPABILITIES(security.capabilities() as i32),
            )?
        };
        Ok(())
    }

    fn delete_instance(
        services: &IWbemServices,
        object_path: &str,
        context: Option<&IWbemContext>,
    ) -> Result<IWbemCallResult, HResult> {
        let mut call: Option<IWbemCallResult> = None;
        unsafe {
            services.DeleteInstance(
                &BSTR::from(object_path),
                WBEM_FLAG_RETURN_IMMEDIATELY,
                context,
                Some(&mut call),
            )?
        };
        call.ok_or(E_POINTER)
    }

    fn call_status(call: &IWbemCallResult, wait: Wait) -> Result<CallStatus, HResult> {
        // Called through the vtable: the wrapper folds WBEM_S_TIMEDOUT into Ok.
        let mut status = 0i32;
        let hr = HResult::from(unsafe {
            (Interface::vtable(call).GetCallStatus)(Interface::as_raw(call), wait.timeout_ms(), &mut status)
        });
        if hr == WBEM_S_TIMEDOUT {
            Ok(CallStatus::TimedOut)
        } else if hr.is_failure() {
            Err(hr)
        } else {
            Ok(CallStatus::Finished(HResult(status)))
        }
    }
}

/// [`crate::ServiceHandle`] bound to the local WMI service.
pub type WmiService = crate::ServiceHandle<ComRuntime>;
