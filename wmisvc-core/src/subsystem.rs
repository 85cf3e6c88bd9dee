//! Thread-affine subsystem RAII guard.
//!
//! [`SubsystemGuard`] wraps the runtime's thread initialisation
//! (`CoInitializeEx` for COM) so every handle keeps the subsystem alive on
//! its thread for as long as the handle exists.
//!
//! The `PhantomData<*const ()>` field enforces `!Send` + `!Sync` at compile
//! time, preventing the guard (and every handle holding one) from being moved
//! across thread boundaries.

use std::marker::PhantomData;

use crate::errors::WmiError;
use crate::runtime::WmiRuntime;
use crate::status::RPC_E_CHANGED_MODE;

/// RAII wrapper that balances one thread initialisation on `Drop`.
///
/// Each guard owns exactly one successful initialisation (`S_OK` or
/// `S_FALSE`).  A thread-local counter tracks live guards; the native
/// subsystem is torn down when the last one on the thread is dropped.
#[must_use = "SubsystemGuard must be kept alive for the duration of subsystem usage"]
pub struct SubsystemGuard<R: WmiRuntime> {
    _runtime: PhantomData<R>,
    _not_send: PhantomData<*const ()>,
}

impl<R: WmiRuntime> SubsystemGuard<R> {
    /// Initialise (or join) the calling thread's subsystem.
    ///
    /// `RPC_E_CHANGED_MODE` (the thread already lives in an incompatible
    /// apartment) is reported as [`WmiError::SubsystemInit`] like any other
    /// failure.
    pub fn acquire() -> Result<Self, WmiError> {
        let hr = R::initialize_thread().map_err(|status| {
            if status == RPC_E_CHANGED_MODE {
                log::warn!(
                    "CoInitializeEx: RPC_E_CHANGED_MODE -- thread already has an incompatible \
                     apartment, refusing to join it"
                );
            }
            WmiError::SubsystemInit { status }
        })?;

        let depth = R::thread_guards().with(|count| {
            let depth = count.get() + 1;
            count.set(depth);
            depth
        });
        if depth == 1 {
            log::debug!("subsystem initialised on thread {:?} ({hr})", std::thread::current().id());
        }

        Ok(Self {
            _runtime: PhantomData,
            _not_send: PhantomData,
        })
    }

    /// Number of live guards on the calling thread.
    pub fn active_on_thread() -> usize {
        R::thread_guards().with(|count| count.get())
    }
}

impl<R: WmiRuntime> Drop for SubsystemGuard<R> {
    fn drop(&mut self) {
        let remaining = R::thread_guards().with(|count| {
            let remaining = count.get().saturating_sub(1);
            count.set(remaining);
            remaining
        });
        R::uninitialize_thread();
        if remaining == 0 {
            log::debug!("subsystem released on thread {:?}", std::thread::current().id());
        }
    }
}
