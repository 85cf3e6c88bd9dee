//! Error types for `wmisvc_core`.
//!
//! Every failure is funnelled through [`WmiError`], which uses `thiserror`
//! for `Display` and `Error` derives.  Variants mirror the stage at which the
//! native call failed so callers can match on the kind of failure instead of
//! parsing messages.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::status::HResult;

/// The step of [`crate::ServiceHandle::connect`] that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConnectStage {
    /// `CoCreateInstance(CLSID_WbemLocator)`.
    LocatorCreate,
    /// `IWbemLocator::ConnectServer`.
    Connect,
}

impl ConnectStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LocatorCreate => "locator-create",
            Self::Connect => "connect",
        }
    }
}

impl fmt::Display for ConnectStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The phase of a delete call that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationStage {
    /// `IWbemServices::DeleteInstance` rejected the request.
    Submit,
    /// `IWbemCallResult::GetCallStatus` itself failed (or a bounded wait expired).
    AwaitStatus,
    /// The service finished the call and reported a failure status.
    Completed,
}

impl OperationStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Submit => "submit",
            Self::AwaitStatus => "await-status",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for OperationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Top-level error type for the `wmisvc_core` library.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WmiError {
    /// The calling thread could not initialise COM.
    #[error("SubsystemInitError: CoInitializeEx failed: HRESULT {status}")]
    SubsystemInit { status: HResult },

    /// Locator creation or `ConnectServer` failed.
    #[error("ConnectionError ({stage}): HRESULT {status}")]
    Connection { stage: ConnectStage, status: HResult },

    /// `CoSetProxyBlanket` on the freshly connected proxy failed.
    #[error("SecurityConfigurationError: CoSetProxyBlanket failed: HRESULT {status}")]
    SecurityConfiguration { status: HResult },

    /// A delete call failed; `stage` tells which phase.
    #[error("OperationError ({stage}) deleting '{path}': HRESULT {status}")]
    Operation {
        stage: OperationStage,
        status: HResult,
        path: String,
    },

    /// An [`crate::ObjectPath`] could not be built or parsed.
    #[error("InvalidObjectPath: {reason}")]
    InvalidObjectPath { reason: String },
}

impl WmiError {
    /// The failing native status, if the error came from a native call.
    pub fn status(&self) -> Option<HResult> {
        match self {
            Self::SubsystemInit { status }
            | Self::Connection { status, .. }
            | Self::SecurityConfiguration { status }
            | Self::Operation { status, .. } => Some(*status),
            Self::InvalidObjectPath { .. } => None,
        }
    }

    /// Stage tag (`"connect"`, `"submit"`, ...) for staged failures.
    pub fn stage(&self) -> Option<&'static str> {
        match self {
            Self::Connection { stage, .. } => Some(stage.as_str()),
            Self::Operation { stage, .. } => Some(stage.as_str()),
            _ => None,
        }
    }

    /// Name of the native API that reported the failure.
    pub fn native_api(&self) -> Option<&'static str> {
        match self {
            Self::SubsystemInit { .. } => Some("CoInitializeEx"),
            Self::Connection {
                stage: ConnectStage::LocatorCreate,
                ..
            } => Some("CoCreateInstance(WbemLocator)"),
            Self::Connection {
                stage: ConnectStage::Connect,
                ..
            } => Some("IWbemLocator::ConnectServer"),
            Self::SecurityConfiguration { .. } => Some("CoSetProxyBlanket"),
            Self::Operation {
                stage: OperationStage::AwaitStatus,
                ..
            } => Some("IWbemCallResult::GetCallStatus"),
            Self::Operation { .. } => Some("IWbemServices::DeleteInstance"),
            Self::InvalidObjectPath { .. } => None,
        }
    }

    /// Name of the local operation that was running.
    pub fn operation(&self) -> &'static str {
        match self {
            Self::SubsystemInit { .. } => "SubsystemGuard::acquire",
            Self::Connection { .. } | Self::SecurityConfiguration { .. } => "ServiceHandle::connect",
            Self::Operation { .. } => "ServiceHandle::delete_path",
            Self::InvalidObjectPath { .. } => "ObjectPath",
        }
    }

    /// Whether the caller should treat the failure as fatal.
    ///
    /// None of the failures raised by this crate are: a failed connect leaves
    /// nothing behind and a failed delete leaves the handle usable.
    pub fn is_critical(&self) -> bool {
        false
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::SubsystemInit { .. } => "subsystem-init",
            Self::Connection { .. } => "connection",
            Self::SecurityConfiguration { .. } => "security-configuration",
            Self::Operation { .. } => "operation",
            Self::InvalidObjectPath { .. } => "invalid-object-path",
        }
    }

    /// Owned, serialisable view of the failure for the FFI and worker surfaces.
    pub fn to_record(&self) -> FailureRecord {
        FailureRecord {
            kind: self.kind(),
            stage: self.stage(),
            status: self.status(),
            native_api: self.native_api(),
            operation: self.operation(),
            critical: self.is_critical(),
            message: self.to_string(),
        }
    }
}

/// Structured failure record -- fully owned and serialisable.
#[derive(Debug, Clone, Serialize)]
pub struct FailureRecord {
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<HResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub native_api: Option<&'static str>,
    pub operation: &'static str,
    pub critical: bool,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::{RPC_E_CHANGED_MODE, WBEM_E_INVALID_NAMESPACE, WBEM_E_NOT_FOUND};

    #[test]
    fn test_stage_tags() {
        assert_eq!(ConnectStage::LocatorCreate.to_string(), "locator-create");
        assert_eq!(ConnectStage::Connect.to_string(), "connect");
        assert_eq!(OperationStage::Submit.to_string(), "submit");
        assert_eq!(OperationStage::AwaitStatus.to_string(), "await-status");
        assert_eq!(OperationStage::Completed.to_string(), "completed");
    }

    #[test]
    fn test_display_carries_stage_and_status() {
        let err = WmiError::Connection {
            stage: ConnectStage::Connect,
            status: WBEM_E_INVALID_NAMESPACE,
        };
        assert_eq!(err.to_string(), "ConnectionError (connect): HRESULT 0x8004100E");
        assert_eq!(err.native_api(), Some("IWbemLocator::ConnectServer"));
        assert_eq!(err.operation(), "ServiceHandle::connect");
    }

    #[test]
    fn test_completed_failure_reports_delete_instance() {
        let err = WmiError::Operation {
            stage: OperationStage::Completed,
            status: WBEM_E_NOT_FOUND,
            path: "Win32_Share.Name='x'".into(),
        };
        assert_eq!(err.status(), Some(WBEM_E_NOT_FOUND));
        assert_eq!(err.stage(), Some("completed"));
        assert_eq!(err.native_api(), Some("IWbemServices::DeleteInstance"));
        assert!(!err.is_critical());
    }

    #[test]
    fn test_record_serialization() {
        let err = WmiError::SubsystemInit {
            status: RPC_E_CHANGED_MODE,
        };
        let json = serde_json::to_string(&err.to_record()).unwrap();
        assert!(json.contains("\"kind\":\"subsystem-init\""));
        assert!(json.contains("\"status\":\"0x80010106\""));
        assert!(json.contains("\"native_api\":\"CoInitializeEx\""));
        assert!(!json.contains("\"stage\""));
    }

    #[test]
    fn test_invalid_path_has_no_status() {
        let err = WmiError::InvalidObjectPath {
            reason: "empty class name".into(),
        };
        assert_eq!(err.status(), None);
        assert_eq!(err.native_api(), None);
        let json = serde_json::to_string(&err.to_record()).unwrap();
        assert!(!json.contains("\"status\""));
    }
}
