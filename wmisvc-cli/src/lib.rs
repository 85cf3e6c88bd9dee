//! Shared pieces of the wmisvc command-line tools.

pub mod worker;

/// Namespace used when none is given.
pub const DEFAULT_NAMESPACE: &str = r"ROOT\CIMV2";
