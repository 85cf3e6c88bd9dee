//! The native seam.
//!
//! [`WmiRuntime`] lists every native call the service handle makes.  The
//! resource types are reference-counted handles: `Clone` adds a reference,
//! `Drop` releases one and `PartialEq` compares identity.
//!
//! Production code uses [`crate::com::ComRuntime`] (Windows only); tests use
//! the in-memory runtime in [`crate::mock`].

use std::cell::Cell;
use std::thread::LocalKey;
use std::time::Duration;

use crate::security::SecurityContext;
use crate::status::HResult;

/// `WBEM_INFINITE`.
pub const INFINITE_TIMEOUT_MS: i32 = -1;

/// How long [`crate::CallCompletion`] blocks for a final status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Wait {
    /// Block until the service reports a final status.
    #[default]
    Infinite,
    /// Give up after the given duration.
    Bounded(Duration),
}

impl Wait {
    /// Timeout in the form `GetCallStatus` takes it.
    pub fn timeout_ms(self) -> i32 {
        match self {
            Self::Infinite => INFINITE_TIMEOUT_MS,
            Self::Bounded(d) => d.as_millis().min(i32::MAX as u128) as i32,
        }
    }
}

/// Result of polling a pending call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallStatus {
    /// The call finished; the payload is the service-reported status.
    Finished(HResult),
    /// A bounded wait expired before the call finished.
    TimedOut,
}

/// Native operations behind [`crate::ServiceHandle`].
pub trait WmiRuntime: Sized + 'static {
    /// `IWbemLocator`.
    type Locator: Clone + PartialEq + 'static;
    /// `IWbemServices`.
    type Services: Clone + PartialEq + 'static;
    /// `IWbemContext`, passed through untouched.
    type Context: 'static;
    /// `IWbemCallResult`.
    type CallResult: 'static;

    /// Per-thread count of live [`crate::SubsystemGuard`]s for this runtime.
    fn thread_guards() -> &'static LocalKey<Cell<usize>>;

    /// Initialise the thread's subsystem.  `Ok` means a balancing
    /// [`Self::uninitialize_thread`] is owed.
    fn initialize_thread() -> Result<HResult, HResult>;

    fn uninitialize_thread();

    fn create_locator() -> Result<Self::Locator, HResult>;

    /// Connect as the ambient identity with default locale and flags.
    fn connect_server(locator: &Self::Locator, namespace: &str) -> Result<Self::Services, HResult>;

    fn set_proxy_blanket(services: &Self::Services, security: &SecurityContext) -> Result<(), HResult>;

    /// Submit a delete in return-immediately mode and hand back the call token.
    fn delete_instance(
        services: &Self::Services,
        object_path: &str,
        context: Option<&Self::Context>,
    ) -> Result<Self::CallResult, HResult>;

    /// Block on the call token.  `Err` is a failure to retrieve the status.
    fn call_status(call: &Self::CallResult, wait: Wait) -> Result<CallStatus, HResult>;
}
