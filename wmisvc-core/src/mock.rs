//! In-memory runtime for tests.
//!
//! [`MockRuntime`] models one management service per thread: namespaces hold
//! sets of instance paths, resources count themselves so tests can observe
//! releases, and [`MockRuntime::fail_next`] injects a status into the next
//! call of a given kind.  State is thread-local, so tests running in
//! parallel never see each other.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeSet, HashMap};
use std::rc::Rc;
use std::thread::LocalKey;

use crate::object_path::ObjectPath;
use crate::runtime::{CallStatus, Wait, WmiRuntime};
use crate::security::SecurityContext;
use crate::status::{
    HResult, CO_E_NOTINITIALIZED, S_FALSE, S_OK, WBEM_E_INVALID_NAMESPACE,
    WBEM_E_INVALID_OBJECT_PATH, WBEM_E_NOT_FOUND,
};

/// Native calls that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockCall {
    InitializeThread,
    CreateLocator,
    ConnectServer,
    SetProxyBlanket,
    DeleteInstance,
    CallStatus,
    /// The service finishes the next delete with this status.
    Completion,
}

#[derive(Default)]
struct State {
    native_depth: usize,
    namespaces: HashMap<String, BTreeSet<String>>,
    faults: HashMap<MockCall, HResult>,
    delay_next: bool,
    last_context: Option<Vec<(String, String)>>,
    live_locators: usize,
    live_services: usize,
}

thread_local! {
    static STATE: RefCell<State> = RefCell::new(State::default());
    static GUARDS: Cell<usize> = const { Cell::new(0) };
}

fn with_state<T>(f: impl FnOnce(&mut State) -> T) -> T {
    STATE.with(|s| f(&mut s.borrow_mut()))
}

fn take_fault(call: MockCall) -> Result<(), HResult> {
    match with_state(|s| s.faults.remove(&call)) {
        Some(status) => Err(status),
        None => Ok(()),
    }
}

/// Namespaces and paths compare case-insensitively, as WMI does.
fn canonical_path(object_path: &str) -> Option<String> {
    object_path
        .parse::<ObjectPath>()
        .ok()
        .map(|p| p.into_relative().to_string().to_lowercase())
}

// ---------------------------------------------------------------------------
// Resources
// ---------------------------------------------------------------------------

struct LocatorInner;

impl Drop for LocatorInner {
    fn drop(&mut self) {
        let _ = STATE.try_with(|s| s.borrow_mut().live_locators -= 1);
    }
}

/// Shared locator; identity is the allocation.
#[derive(Clone)]
pub struct MockLocator(Rc<LocatorInner>);

impl PartialEq for MockLocator {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

struct ServicesInner {
    namespace: String,
    security: Cell<Option<SecurityContext>>,
}

impl Drop for ServicesInner {
    fn drop(&mut self) {
        let _ = STATE.try_with(|s| s.borrow_mut().live_services -= 1);
    }
}

/// Shared connection to one namespace; identity is the allocation.
#[derive(Clone)]
pub struct MockServices(Rc<ServicesInner>);

impl MockServices {
    /// Lower-cased namespace the proxy is bound to.
    pub fn namespace(&self) -> &str {
        &self.0.namespace
    }

    /// Blanket applied by `set_proxy_blanket`, if any.
    pub fn security(&self) -> Option<SecurityContext> {
        self.0.security.get()
    }
}

impl PartialEq for MockServices {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

/// Call context; the mock records what each delete receives.
#[derive(Debug, Clone, Default)]
pub struct MockContext {
    pub values: Vec<(String, String)>,
}

/// A submitted delete.
pub struct MockCallResult {
    outcome: HResult,
    slow: bool,
}

// ---------------------------------------------------------------------------
// Runtime
// ---------------------------------------------------------------------------

pub struct MockRuntime;

impl MockRuntime {
    /// Create (or replace) `namespace` holding `paths`.
    pub fn install_namespace(namespace: &str, paths: &[&str]) {
        let set = paths.iter().filter_map(|p| canonical_path(p)).collect();
        with_state(|s| s.namespaces.insert(namespace.to_lowercase(), set));
    }

    pub fn add_instance(namespace: &str, object_path: &str) {
        if let Some(path) = canonical_path(object_path) {
            with_state(|s| {
                s.namespaces
                    .entry(namespace.to_lowercase())
                    .or_default()
                    .insert(path)
            });
        }
    }

    pub fn contains(namespace: &str, object_path: &str) -> bool {
        let Some(path) = canonical_path(object_path) else {
            return false;
        };
        with_state(|s| {
            s.namespaces
                .get(&namespace.to_lowercase())
                .is_some_and(|set| set.contains(&path))
        })
    }

    /// Make the next call of kind `call` on this thread fail with `status`.
    pub fn fail_next(call: MockCall, status: HResult) {
        with_state(|s| s.faults.insert(call, status));
    }

    /// The next delete stays pending past any bounded wait.
    pub fn delay_next_completion() {
        with_state(|s| s.delay_next = true);
    }

    /// Balanced native initialisations outstanding on this thread.
    pub fn native_init_depth() -> usize {
        with_state(|s| s.native_depth)
    }

    pub fn live_locators() -> usize {
        with_state(|s| s.live_locators)
    }

    pub fn live_services() -> usize {
        with_state(|s| s.live_services)
    }

    /// Context values seen by the most recent delete, `None` for no context.
    pub fn last_context() -> Option<Vec<(String, String)>> {
        with_state(|s| s.last_context.clone())
    }
}

impl WmiRuntime for MockRuntime {
    type Locator = MockLocator;
    type Services = MockServices;
    type Context = MockContext;
    type CallResult = MockCallResult;

    fn thread_guards() -> &'static LocalKey<Cell<usize>> {
        &GUARDS
    }

    fn initialize_thread() -> Result<HResult, HResult> {
        take_fault(MockCall::InitializeThread)?;
        let depth = with_state(|s| {
            s.native_depth += 1;
            s.native_depth
        });
        Ok(if depth == 1 { S_OK } else { S_FALSE })
    }

    fn uninitialize_thread() {
        with_state(|s| s.native_depth = s.native_depth.saturating_sub(1));
    }

    fn create_locator() -> Result<MockLocator, HResult> {
        take_fault(MockCall::CreateLocator)?;
        with_state(|s| {
            if s.native_depth == 0 {
                return Err(CO_E_NOTINITIALIZED);
            }
            s.live_locators += 1;
            Ok(())
        })?;
        Ok(MockLocator(Rc::new(LocatorInner)))
    }

    fn connect_server(_locator: &MockLocator, namespace: &str) -> Result<MockServices, HResult> {
        take_fault(MockCall::ConnectServer)?;
        let namespace = namespace.to_lowercase();
        with_state(|s| {
            if !s.namespaces.contains_key(&namespace) {
                return Err(WBEM_E_INVALID_NAMESPACE);
            }
            s.live_services += 1;
            Ok(())
        })?;
        Ok(MockServices(Rc::new(ServicesInner {
            namespace,
            security: Cell::new(None),
        })))
    }

    fn set_proxy_blanket(services: &MockServices, security: &SecurityContext) -> Result<(), HResult> {
        take_fault(MockCall::SetProxyBlanket)?;
        services.0.security.set(Some(*security));
        Ok(())
    }

    fn delete_instance(
        services: &MockServices,
        object_path: &str,
        context: Option<&MockContext>,
    ) -> Result<MockCallResult, HResult> {
        with_state(|s| s.last_context = context.map(|c| c.values.clone()));
        take_fault(MockCall::DeleteInstance)?;
        let path = canonical_path(object_path).ok_or(WBEM_E_INVALID_OBJECT_PATH)?;
        let slow = with_state(|s| std::mem::take(&mut s.delay_next));

        let outcome = match take_fault(MockCall::Completion) {
            Err(status) => status,
            Ok(()) => with_state(|s| {
                let removed = s
                    .namespaces
                    .get_mut(services.namespace())
                    .is_some_and(|set| set.remove(&path));
                if removed {
                    S_OK
                } else {
                    WBEM_E_NOT_FOUND
                }
            }),
        };
        Ok(MockCallResult { outcome, slow })
    }

    fn call_status(call: &MockCallResult, wait: Wait) -> Result<CallStatus, HResult> {
        take_fault(MockCall::CallStatus)?;
        match wait {
            Wait::Bounded(_) if call.slow => Ok(CallStatus::TimedOut),
            _ => Ok(CallStatus::Finished(call.outcome)),
        }
    }
}
