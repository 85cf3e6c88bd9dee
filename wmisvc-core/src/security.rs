//! Proxy security applied to every connection.

use std::fmt;

use serde::Serialize;

use crate::errors::WmiError;
use crate::runtime::WmiRuntime;

/// `CoSetProxyBlanket` arguments, as raw RPC constants.
///
/// There is exactly one configuration in use ([`SecurityContext::CALL_IMPERSONATE`]);
/// process-wide policy (`CoInitializeSecurity`) is left to the embedding
/// application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SecurityContext {
    authn_service: u32,
    authz_service: u32,
    authn_level: u32,
    impersonation_level: u32,
    capabilities: u32,
}

impl SecurityContext {
    /// NTLM/Kerberos via `RPC_C_AUTHN_WINNT`, no authorization service,
    /// call-level authentication, impersonate, no explicit principal, no
    /// capabilities.
    pub const CALL_IMPERSONATE: SecurityContext = SecurityContext {
        authn_service: 10, // RPC_C_AUTHN_WINNT
        authz_service: 0, // RPC_C_AUTHZ_NONE
        authn_level: 3, // RPC_C_AUTHN_LEVEL_CALL
        impersonation_level: 3, // RPC_C_IMP_LEVEL_IMPERSONATE
        capabilities: 0, // EOAC_NONE
    };

    pub fn authn_service(&self) -> u32 {
        self.authn_service
    }

    pub fn authz_service(&self) -> u32 {
        self.authz_service
    }

    pub fn authn_level(&self) -> u32 {
        self.authn_level
    }

    pub fn impersonation_level(&self) -> u32 {
        self.impersonation_level
    }

    pub fn capabilities(&self) -> u32 {
        self.capabilities
    }
}

impl fmt::Display for SecurityContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "authn={} authz={} level={} imp={} caps={}",
            self.authn_service,
            self.authz_service,
            self.authn_level,
            self.impersonation_level,
            self.capabilities
        )
    }
}

/// Apply `security` to a freshly connected proxy.
pub(crate) fn configure<R: WmiRuntime>(
    services: &R::Services,
    security: &SecurityContext,
) -> Result<(), WmiError> {
    R::set_proxy_blanket(services, security).map_err(|status| {
        log::debug!("CoSetProxyBlanket({security}) failed: {status}");
        WmiError::SecurityConfiguration { status }
    })
}
