//! One-shot namespace resolution.

use crate::errors::{ConnectStage, WmiError};
use crate::runtime::WmiRuntime;

/// A freshly created locator, good for exactly one [`ServiceLocator::connect`].
pub struct ServiceLocator<R: WmiRuntime> {
    locator: R::Locator,
}

impl<R: WmiRuntime> ServiceLocator<R> {
    /// `CoCreateInstance(CLSID_WbemLocator)`.
    pub fn create() -> Result<Self, WmiError> {
        let locator = R::create_locator().map_err(|status| WmiError::Connection {
            stage: ConnectStage::LocatorCreate,
            status,
        })?;
        Ok(Self { locator })
    }

    /// Connect to `namespace` as the calling identity.
    ///
    /// Consumes the locator; on failure it is released along with anything
    /// the connect attempt produced.
    pub fn connect(self, namespace: &str) -> Result<(R::Locator, R::Services), WmiError> {
        let services = R::connect_server(&self.locator, namespace).map_err(|status| {
            log::debug!("ConnectServer({namespace}) failed: {status}");
            WmiError::Connection {
                stage: ConnectStage::Connect,
                status,
            }
        })?;
        Ok((self.locator, services))
    }
}
