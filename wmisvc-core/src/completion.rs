//! Pending delete calls.

use std::marker::PhantomData;
use std::time::Duration;

use crate::errors::{OperationStage, WmiError};
use crate::runtime::{CallStatus, Wait, WmiRuntime};
use crate::service::ServiceHandle;
use crate::status::{HResult, WBEM_S_TIMEDOUT};

/// A submitted delete awaiting its final status.
///
/// Borrows the handle that submitted it, so the connection and the thread's
/// subsystem outlive the call token.  Consumed by whichever `wait` the caller
/// picks.
#[must_use = "a submitted delete is not confirmed until it is waited on"]
pub struct CallCompletion<'a, R: WmiRuntime> {
    call: R::CallResult,
    path: String,
    _handle: PhantomData<&'a ServiceHandle<R>>,
}

impl<'a, R: WmiRuntime> CallCompletion<'a, R> {
    pub(crate) fn new(call: R::CallResult, path: &str) -> Self {
        Self {
            call,
            path: path.to_owned(),
            _handle: PhantomData,
        }
    }

    /// The object path the call was submitted for.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Block until the service reports a final status.  No timeout.
    pub fn wait(self) -> Result<(), WmiError> {
        self.wait_for(Wait::Infinite)
    }

    /// Like [`Self::wait`] but gives up after `timeout`, failing with
    /// `await-status` / `WBEM_S_TIMEDOUT`.  The call itself is not cancelled.
    pub fn wait_timeout(self, timeout: Duration) -> Result<(), WmiError> {
        self.wait_for(Wait::Bounded(timeout))
    }

    pub fn wait_for(self, wait: Wait) -> Result<(), WmiError> {
        let status = match R::call_status(&self.call, wait) {
            Ok(CallStatus::Finished(status)) => status,
            Ok(CallStatus::TimedOut) => {
                log::warn!("DeleteInstance({}) still pending after {wait:?}", self.path);
                return Err(self.fail(OperationStage::AwaitStatus, WBEM_S_TIMEDOUT));
            }
            Err(status) => {
                log::debug!("GetCallStatus({}) failed: {status}", self.path);
                return Err(self.fail(OperationStage::AwaitStatus, status));
            }
        };

        if status.is_failure() {
            log::warn!("DeleteInstance({}) completed with {status}", self.path);
            return Err(self.fail(OperationStage::Completed, status));
        }
        log::debug!("DeleteInstance({}) completed", self.path);
        Ok(())
    }

    fn fail(self, stage: OperationStage, status: HResult) -> WmiError {
        WmiError::Operation {
            stage,
            status,
            path: self.path,
        }
    }
}
