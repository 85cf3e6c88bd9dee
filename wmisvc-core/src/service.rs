//! The service handle: a shared, security-configured WMI connection.
//!
//! [`ServiceHandle`] owns a reference to the locator and to the connected
//! `IWbemServices` proxy plus a [`SubsystemGuard`] for the thread it lives
//! on.  Copies share the same proxy; the connection closes when the last copy
//! is dropped.
//!
//! # Thread affinity
//!
//! Handles are `!Send`.  Threads that need their own calls connect their own
//! handle.

use std::fmt;
use std::rc::Rc;

use crate::completion::CallCompletion;
use crate::errors::{OperationStage, WmiError};
use crate::locator::ServiceLocator;
use crate::runtime::WmiRuntime;
use crate::security::{self, SecurityContext};
use crate::subsystem::SubsystemGuard;

/// A connected, security-configured management namespace.
pub struct ServiceHandle<R: WmiRuntime> {
    // Field order is drop order: COM references go before the guard.
    services: R::Services,
    locator: R::Locator,
    namespace: Rc<str>,
    _subsystem: SubsystemGuard<R>,
}

impl<R: WmiRuntime> ServiceHandle<R> {
    /// Connect to `namespace` (e.g. `ROOT\CIMV2`) on the local machine.
    ///
    /// Initialises the thread's subsystem, creates a locator, connects as the
    /// calling identity and applies [`SecurityContext::CALL_IMPERSONATE`] to
    /// the proxy.  Any failure releases everything acquired so far.
    pub fn connect(namespace: &str) -> Result<Self, WmiError> {
        let subsystem = SubsystemGuard::acquire()?;
        let (locator, services) = ServiceLocator::<R>::create()?.connect(namespace)?;
        security::configure::<R>(&services, &SecurityContext::CALL_IMPERSONATE)?;
        log::debug!("connected to {namespace}");

        Ok(Self {
            services,
            locator,
            namespace: Rc::from(namespace),
            _subsystem: subsystem,
        })
    }

    /// Share this connection.
    ///
    /// No new connect happens; the copy takes its own subsystem reference,
    /// which is the only step that can fail.
    pub fn try_clone(&self) -> Result<Self, WmiError> {
        let subsystem = SubsystemGuard::acquire()?;
        Ok(Self {
            services: self.services.clone(),
            locator: self.locator.clone(),
            namespace: Rc::clone(&self.namespace),
            _subsystem: subsystem,
        })
    }

    /// Make `self` share `source`'s connection.
    ///
    /// Copy-then-swap: if the copy fails `self` is left untouched; otherwise
    /// the previous references are released when the temporary drops.
    pub fn assign_from(&mut self, source: &Self) -> Result<(), WmiError> {
        let mut temp = source.try_clone()?;
        std::mem::swap(&mut self.services, &mut temp.services);
        std::mem::swap(&mut self.locator, &mut temp.locator);
        std::mem::swap(&mut self.namespace, &mut temp.namespace);
        Ok(())
    }

    /// The connected proxy, for calls this crate does not wrap.
    pub fn services(&self) -> &R::Services {
        &self.services
    }

    pub fn locator(&self) -> &R::Locator {
        &self.locator
    }

    /// The namespace this handle was connected to.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Delete the instance at `object_path` and wait for the service to
    /// confirm.
    ///
    /// The path takes the form `MyClass.MyProperty1='33',MyProperty2='value'`.
    pub fn delete_path(&self, object_path: &str) -> Result<(), WmiError> {
        self.delete_path_with_context(object_path, None)
    }

    /// [`Self::delete_path`] with an optional call context passed through to
    /// the service.
    pub fn delete_path_with_context(
        &self,
        object_path: &str,
        context: Option<&R::Context>,
    ) -> Result<(), WmiError> {
        self.submit_delete(object_path, context)?.wait()
    }

    /// Submit a delete without waiting.  The returned completion must be
    /// waited on to learn the outcome.
    pub fn submit_delete(
        &self,
        object_path: &str,
        context: Option<&R::Context>,
    ) -> Result<CallCompletion<'_, R>, WmiError> {
        let call = R::delete_instance(&self.services, object_path, context).map_err(|status| {
            log::debug!("DeleteInstance({object_path}) rejected: {status}");
            WmiError::Operation {
                stage: OperationStage::Submit,
                status,
                path: object_path.to_owned(),
            }
        })?;
        log::debug!("DeleteInstance({object_path}) submitted on {}", self.namespace);
        Ok(CallCompletion::new(call, object_path))
    }
}

/// Identity: both the locator and the proxy must be the same objects.
impl<R: WmiRuntime> PartialEq for ServiceHandle<R> {
    fn eq(&self, other: &Self) -> bool {
        self.locator == other.locator && self.services == other.services
    }
}

impl<R: WmiRuntime> fmt::Debug for ServiceHandle<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceHandle")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockCall, MockRuntime};
    use crate::status::{
        E_ACCESSDENIED, E_OUTOFMEMORY, WBEM_E_INVALID_NAMESPACE, WBEM_E_INVALID_OBJECT_PATH,
        WBEM_E_NOT_FOUND,
    };
    use crate::ConnectStage;

    type Handle = ServiceHandle<MockRuntime>;

    const NS: &str = r"root\test";
    const SHARE: &str = "Win32_Share.Name='scratch'";

    fn connect() -> Handle {
        MockRuntime::install_namespace(NS, &[SHARE]);
        Handle::connect(NS).unwrap()
    }

    #[test]
    fn test_connect_applies_security() {
        let h = connect();
        assert_eq!(h.namespace(), NS);
        assert_eq!(h.services().security(), Some(SecurityContext::CALL_IMPERSONATE));
        assert_eq!(MockRuntime::live_services(), 1);
    }

    #[test]
    fn test_connect_invalid_namespace() {
        let err = Handle::connect(r"root\nope").unwrap_err();
        assert_eq!(
            err,
            WmiError::Connection {
                stage: ConnectStage::Connect,
                status: WBEM_E_INVALID_NAMESPACE,
            }
        );
        assert_eq!(MockRuntime::native_init_depth(), 0);
    }

    #[test]
    fn test_security_failure_releases_connection() {
        MockRuntime::install_namespace(NS, &[]);
        MockRuntime::fail_next(MockCall::SetProxyBlanket, E_ACCESSDENIED);
        let err = Handle::connect(NS).unwrap_err();
        assert_eq!(err, WmiError::SecurityConfiguration { status: E_ACCESSDENIED });
        assert_eq!(MockRuntime::live_services(), 0);
        assert_eq!(MockRuntime::live_locators(), 0);
        assert_eq!(SubsystemGuard::<MockRuntime>::active_on_thread(), 0);
    }

    #[test]
    fn test_clone_shares_identity() {
        let h = connect();
        let h2 = h.try_clone().unwrap();
        assert_eq!(h2, h);
        assert_eq!(MockRuntime::live_services(), 1);
        assert_eq!(SubsystemGuard::<MockRuntime>::active_on_thread(), 2);
    }

    #[test]
    fn test_independent_connect_is_not_equal() {
        let a = connect();
        let b = Handle::connect(NS).unwrap();
        assert!(a != b);
        assert_eq!(MockRuntime::live_services(), 2);
    }

    #[test]
    fn test_last_copy_keeps_connection() {
        let h = connect();
        let copies: Vec<Handle> = (0..3).map(|_| h.try_clone().unwrap()).collect();
        drop(h);
        let mut copies = copies.into_iter();
        let survivor = copies.next().unwrap();
        drop(copies);

        assert_eq!(MockRuntime::live_services(), 1);
        survivor.delete_path(SHARE).unwrap();

        drop(survivor);
        assert_eq!(MockRuntime::live_services(), 0);
        assert_eq!(MockRuntime::native_init_depth(), 0);
    }

    #[test]
    fn test_assign_from_shares_source() {
        MockRuntime::install_namespace(r"root\other", &[]);
        let source = connect();
        let mut target = Handle::connect(r"root\other").unwrap();
        assert_eq!(MockRuntime::live_services(), 2);

        target.assign_from(&source).unwrap();
        assert_eq!(target, source);
        assert_eq!(target.namespace(), NS);
        // The old connection was released by the temporary.
        assert_eq!(MockRuntime::live_services(), 1);
        assert_eq!(SubsystemGuard::<MockRuntime>::active_on_thread(), 2);
    }

    #[test]
    fn test_assign_from_failure_leaves_target() {
        MockRuntime::install_namespace(r"root\other", &[]);
        let source = connect();
        let mut target = Handle::connect(r"root\other").unwrap();
        let before = target.try_clone().unwrap();

        MockRuntime::fail_next(MockCall::InitializeThread, E_OUTOFMEMORY);
        let err = target.assign_from(&source).unwrap_err();
        assert_eq!(err, WmiError::SubsystemInit { status: E_OUTOFMEMORY });

        assert_eq!(target, before);
        assert!(target != source);
        assert_eq!(target.namespace(), r"root\other");
    }

    #[test]
    fn test_delete_existing() {
        let h = connect();
        h.delete_path(SHARE).unwrap();
        assert!(!MockRuntime::contains(NS, SHARE));
    }

    #[test]
    fn test_delete_malformed_fails_at_submit() {
        let h = connect();
        let err = h.delete_path("Win32_Share.Name=").unwrap_err();
        assert_eq!(err.stage(), Some("submit"));
        assert_eq!(err.status(), Some(WBEM_E_INVALID_OBJECT_PATH));
    }

    #[test]
    fn test_delete_missing_fails_at_completion() {
        let h = connect();
        let err = h.delete_path("Win32_Share.Name='ghost'").unwrap_err();
        assert_eq!(
            err,
            WmiError::Operation {
                stage: OperationStage::Completed,
                status: WBEM_E_NOT_FOUND,
                path: "Win32_Share.Name='ghost'".into(),
            }
        );
    }

    #[test]
    fn test_null_context_matches_default() {
        let h = connect();
        MockRuntime::add_instance(NS, "Win32_Share.Name='second'");

        assert_eq!(h.delete_path(SHARE), Ok(()));
        assert_eq!(h.delete_path_with_context("Win32_Share.Name='second'", None), Ok(()));

        let missing = "Win32_Share.Name='gone'";
        assert_eq!(h.delete_path(missing), h.delete_path_with_context(missing, None));
    }

    #[test]
    fn test_debug_shows_namespace() {
        let h = connect();
        assert!(format!("{h:?}").contains("root\\\\test"));
    }
}
