//! Testing utilities for the OpenNebula data sources.
//!
//! [`StaticController`] is an in-memory user pool that counts how often it is
//! called, and [`ProviderTester`] drives a [`Provider`] the way the host would,
//! without a gRPC server.
//!
//! # Example
//!
//! ```
//! use hemmer_provider_opennebula::testing::{ProviderTester, StaticController};
//! use hemmer_provider_opennebula::types::User;
//! use serde_json::json;
//!
//! # tokio_test::block_on(async {
//! let controller = StaticController::new(vec![
//!     User::new(5, "alice").with_groups([1, 2]),
//!     User::new(6, "bob").with_groups([1]),
//! ]);
//! let tester = ProviderTester::new(controller);
//!
//! let state = tester.read_user(json!({"name": "alice"})).await.unwrap();
//! assert_eq!(state["id"], "5");
//! assert_eq!(tester.controller().list_calls(), 1);
//! # });
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde_json::Value;

use crate::controller::Controller;
use crate::diagnostics::{Diagnostic, DiagnosticSeverity};
use crate::error::TransportError;
use crate::provider::{Provider, USER_DATA_SOURCE};
use crate::types::{User, UserId};

/// A fixed user pool served from memory.
///
/// Users without registered quotas report `null`, which projects to an empty
/// quota map.
#[derive(Debug, Default)]
pub struct StaticController {
    users: Vec<User>,
    quotas: HashMap<UserId, Value>,
    list_error: Option<TransportError>,
    quota_error: Option<TransportError>,
    list_calls: AtomicUsize,
    quota_calls: AtomicUsize,
}

impl StaticController {
    /// Serve the given pool.
    pub fn new(users: Vec<User>) -> Self {
        Self {
            users,
            ..Default::default()
        }
    }

    /// Register the raw quota structure returned for `id`.
    pub fn with_quotas(mut self, id: UserId, quotas: Value) -> Self {
        self.quotas.insert(id, quotas);
        self
    }

    /// Make every pool listing fail with `message`.
    pub fn failing_list(mut self, message: impl Into<String>) -> Self {
        self.list_error = Some(TransportError::new(message));
        self
    }

    /// Make every quota fetch fail with `message`.
    pub fn failing_quotas(mut self, message: impl Into<String>) -> Self {
        self.quota_error = Some(TransportError::new(message));
        self
    }

    /// Number of pool listings served so far.
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Number of quota fetches served so far.
    pub fn quota_calls(&self) -> usize {
        self.quota_calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Controller for StaticController {
    async fn list_users(&self) -> Result<Vec<User>, TransportError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        match &self.list_error {
            Some(err) => Err(err.clone()),
            None => Ok(self.users.clone()),
        }
    }

    async fn user_quotas(&self, id: UserId) -> Result<Value, TransportError> {
        self.quota_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = &self.quota_error {
            return Err(err.clone());
        }
        Ok(self.quotas.get(&id).cloned().unwrap_or(Value::Null))
    }
}

/// A test harness around [`Provider`].
pub struct ProviderTester<C: Controller> {
    provider: Provider<C>,
}

impl<C: Controller> ProviderTester<C> {
    /// Create a tester over a provider backed by `controller`.
    pub fn new(controller: C) -> Self {
        Self {
            provider: Provider::new(controller),
        }
    }

    /// Create a tester over an already configured provider.
    pub fn with_provider(provider: Provider<C>) -> Self {
        Self { provider }
    }

    /// Get a reference to the underlying provider.
    pub fn provider(&self) -> &Provider<C> {
        &self.provider
    }

    /// Get a reference to the controller behind the provider.
    pub fn controller(&self) -> &C {
        self.provider.controller()
    }

    /// Validate an `opennebula_user` configuration.
    ///
    /// Warnings are not failures.
    pub fn validate_user(&self, config: &Value) -> Result<Vec<Diagnostic>, TestError> {
        let diagnostics = self
            .provider
            .validate_data_source_config(USER_DATA_SOURCE, config)
            .into_vec();
        check_diagnostics(&diagnostics)?;
        Ok(diagnostics)
    }

    /// Read `opennebula_user` and return the resulting state.
    pub async fn read_user(&self, config: Value) -> Result<Value, TestError> {
        self.read(USER_DATA_SOURCE, config).await
    }

    /// Read any data source type and return the resulting state.
    pub async fn read(&self, data_source_type: &str, config: Value) -> Result<Value, TestError> {
        let response = self.provider.read_data_source(data_source_type, config).await;
        let diagnostics = response.diagnostics.into_vec();
        check_diagnostics(&diagnostics)?;
        response.state.ok_or(TestError::MissingState)
    }
}

/// Error type for test operations that may fail with diagnostics.
#[derive(Debug)]
pub enum TestError {
    /// The operation failed with diagnostics.
    Diagnostics(Vec<Diagnostic>),
    /// The read reported no error but produced no state.
    MissingState,
}

impl TestError {
    /// The error diagnostics, if any.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        match self {
            TestError::Diagnostics(diags) => diags,
            TestError::MissingState => &[],
        }
    }
}

impl std::fmt::Display for TestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TestError::Diagnostics(diags) => {
                writeln!(f, "Operation failed with {} diagnostic(s):", diags.len())?;
                for diag in diags {
                    write!(f, "  [{:?}] {}", diag.severity, diag.summary)?;
                    if let Some(detail) = &diag.detail {
                        write!(f, ": {}", detail)?;
                    }
                    if let Some(attr) = &diag.attribute {
                        write!(f, " (at {})", attr)?;
                    }
                    writeln!(f)?;
                }
                Ok(())
            },
            TestError::MissingState => write!(f, "Read returned neither state nor errors"),
        }
    }
}

impl std::error::Error for TestError {}

fn check_diagnostics(diagnostics: &[Diagnostic]) -> Result<(), TestError> {
    let errors: Vec<_> = diagnostics
        .iter()
        .filter(|d| matches!(d.severity, DiagnosticSeverity::Error))
        .cloned()
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(TestError::Diagnostics(errors))
    }
}

// =========================================================================
// Assertion Helpers
// =========================================================================

/// Assert that diagnostics contain no errors.
///
/// # Panics
///
/// Panics if there are any error diagnostics.
pub fn assert_no_errors(diagnostics: &[Diagnostic]) {
    let errors: Vec<_> = diagnostics
        .iter()
        .filter(|d| matches!(d.severity, DiagnosticSeverity::Error))
        .collect();

    assert!(
        errors.is_empty(),
        "Expected no errors, but got {} error(s): {:?}",
        errors.len(),
        errors.iter().map(|d| &d.summary).collect::<Vec<_>>()
    );
}

/// Assert that diagnostics contain at least one error.
///
/// # Panics
///
/// Panics if there are no error diagnostics.
pub fn assert_has_errors(diagnostics: &[Diagnostic]) {
    let has_errors = diagnostics
        .iter()
        .any(|d| matches!(d.severity, DiagnosticSeverity::Error));

    assert!(has_errors, "Expected at least one error, but got none");
}

/// Assert that an error's summary or detail contains `substring`.
///
/// # Panics
///
/// Panics if no error diagnostic contains the given substring.
pub fn assert_error_contains(diagnostics: &[Diagnostic], substring: &str) {
    let has_matching_error = diagnostics.iter().any(|d| {
        matches!(d.severity, DiagnosticSeverity::Error)
            && (d.summary.contains(substring)
                || d.detail.as_deref().is_some_and(|detail| detail.contains(substring)))
    });

    assert!(
        has_matching_error,
        "Expected an error containing '{}', but no matching error found. Errors: {:?}",
        substring,
        diagnostics
            .iter()
            .filter(|d| matches!(d.severity, DiagnosticSeverity::Error))
            .map(|d| (&d.summary, &d.detail))
            .collect::<Vec<_>>()
    );
}

/// Assert that diagnostics contain a warning with the given summary substring.
///
/// # Panics
///
/// Panics if no warning contains the given substring.
pub fn assert_warning_contains(diagnostics: &[Diagnostic], substring: &str) {
    let has_matching_warning = diagnostics
        .iter()
        .any(|d| matches!(d.severity, DiagnosticSeverity::Warning) && d.summary.contains(substring));

    assert!(
        has_matching_warning,
        "Expected a warning containing '{}', but none found",
        substring
    );
}
