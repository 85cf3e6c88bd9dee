//! `wmisvc_core` -- Reference-counted WMI service connection.
//!
//! Connects to a local management namespace, applies a fixed proxy security
//! blanket, and deletes instances by object path with wait-for-completion
//! semantics.  Query, enumeration and event subscription live elsewhere and
//! reach the connected proxy through [`ServiceHandle::services`].
//!
//! # Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`errors`] | `WmiError` enum via `thiserror` |
//! | [`status`] | `HResult` and the well-known codes |
//! | [`runtime`] | `WmiRuntime` trait -- every native call goes through it |
//! | [`subsystem`] | `SubsystemGuard` RAII wrapper for thread initialisation |
//! | [`locator`] | `ServiceLocator` one-shot connect |
//! | [`security`] | `SecurityContext` applied to every proxy |
//! | [`service`] | `ServiceHandle` -- connect, share, delete |
//! | [`completion`] | `CallCompletion` -- waiting on a submitted delete |
//! | [`object_path`] | `ObjectPath` builder / parser |
//! | `com` | `ComRuntime` via `windows-rs` (Windows only) |
//! | `mock` | `MockRuntime` for tests (`mock` feature) |
//!
//! # Usage
//!
//! ```no_run
//! # #[cfg(windows)]
//! # fn main() -> Result<(), wmisvc_core::WmiError> {
//! use wmisvc_core::{ObjectPath, WmiService};
//!
//! let svc = WmiService::connect(r"ROOT\StandardCimv2")?;
//! let rule = ObjectPath::new("MSFT_NetFirewallRule")?.key("InstanceID", "block-smb")?;
//! svc.delete_path(&rule.to_string())?;
//! # Ok(())
//! # }
//! # #[cfg(not(windows))]
//! # fn main() {}
//! ```

#[cfg(windows)]
pub mod com;
pub mod completion;
pub mod errors;
pub mod locator;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod object_path;
pub mod runtime;
pub mod security;
pub mod service;
pub mod status;
pub mod subsystem;

#[cfg(windows)]
pub use com::{ComRuntime, WmiService};
pub use completion::CallCompletion;
pub use errors::{ConnectStage, FailureRecord, OperationStage, WmiError};
pub use locator::ServiceLocator;
pub use object_path::ObjectPath;
pub use runtime::{CallStatus, Wait, WmiRuntime};
pub use security::SecurityContext;
pub use service::ServiceHandle;
pub use status::HResult;
pub use subsystem::SubsystemGuard;
