//! Static configuration sets used when validating data source input.
//!
//! Allowed values are plain constant slices. Callers that need a different
//! set pass it explicitly (see [`Provider::with_auth_drivers`]); nothing here
//! is mutable at runtime.
//!
//! [`Provider::with_auth_drivers`]: crate::provider::Provider::with_auth_drivers

/// Authentication drivers understood by OpenNebula.
pub const AUTH_DRIVERS: &[&str] = &[
    "core",
    "public",
    "ssh",
    "x509",
    "ldap",
    "server_cipher",
    "server_x509",
    "custom",
];

/// Driver assumed when the configuration does not name one.
pub const DEFAULT_AUTH_DRIVER: &str = "core";

/// Deprecation notice attached to attributes that should no longer drive selection.
pub const SELECTION_DEPRECATION: &str = "use 'tags' for selection instead";

/// Check whether `value` is one of `allowed`.
///
/// Comparison is exact and case-sensitive.
///
/// # Examples
///
/// ```
/// use hemmer_provider_opennebula::config::{is_allowed, AUTH_DRIVERS};
///
/// assert!(is_allowed("ldap", AUTH_DRIVERS));
/// assert!(!is_allowed("LDAP", AUTH_DRIVERS));
/// ```
pub fn is_allowed<S: AsRef<str>>(value: &str, allowed: &[S]) -> bool {
    allowed.iter().any(|candidate| candidate.as_ref() == value)
}
