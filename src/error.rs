//! Error types for the OpenNebula lookup engine.
//!
//! Each pipeline stage has its own error type; [`ProviderError`] wraps them at
//! the read boundary and knows how to turn itself into a user-facing
//! [`Diagnostic`] or a gRPC status.

use thiserror::Error;

use crate::diagnostics::Diagnostic;
use crate::types::UserId;

/// Failure decoding loosely-typed input into a typed value.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// A value had the wrong JSON type.
    #[error("expected {expected} at '{path}', got {got}")]
    UnexpectedType {
        /// Path of the offending value.
        path: String,
        /// The type that was expected.
        expected: &'static str,
        /// The type that was found.
        got: &'static str,
    },

    /// serde rejected the input.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Outcome of a filter pass that did not yield exactly one candidate.
///
/// Both variants surface under the same diagnostic summary but stay distinct
/// here: the remedy for `NotFound` is to loosen the criteria, for `Ambiguous`
/// to tighten them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    /// No candidate satisfied every active predicate.
    #[error("no {kind}s match the constraints")]
    NotFound {
        /// Entity kind that was searched.
        kind: &'static str,
        /// Classes of the predicates that were active.
        constraints: Vec<&'static str>,
    },

    /// More than one candidate satisfied every active predicate.
    #[error("several {kind}s match the constraints")]
    Ambiguous {
        /// Entity kind that was searched.
        kind: &'static str,
        /// Number of surviving candidates.
        matches: usize,
        /// Classes of the predicates that were active.
        constraints: Vec<&'static str>,
    },
}

impl FilterError {
    /// The entity kind the filter ran over.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { kind, .. } | Self::Ambiguous { kind, .. } => kind,
        }
    }

    /// Classes of the predicates that were active during the pass.
    pub fn constraints(&self) -> &[&'static str] {
        match self {
            Self::NotFound { constraints, .. } | Self::Ambiguous { constraints, .. } => {
                constraints
            }
        }
    }
}

/// A nested remote structure could not be projected into its flat field.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {cause}")]
pub struct ProjectionError {
    /// Output field being produced.
    pub field: String,
    /// What was wrong with the input.
    pub cause: String,
}

impl ProjectionError {
    /// Create a projection error for `field`.
    pub fn new(field: impl Into<String>, cause: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            cause: cause.into(),
        }
    }
}

/// Opaque failure reported by the remote transport.
///
/// The message is passed through to the user untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct TransportError {
    message: String,
}

impl TransportError {
    /// Wrap a transport failure message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The message reported by the transport.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Errors surfaced at the read boundary.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The data source configuration could not be decoded.
    #[error("Invalid data source configuration: {0}")]
    Decode(#[from] DecodeError),

    /// Listing candidates failed in the transport.
    #[error("Listing {kind}s failed: {source}")]
    Listing {
        /// Entity kind being listed.
        kind: &'static str,
        /// Transport failure.
        source: TransportError,
    },

    /// Filtering did not yield exactly one candidate.
    #[error("Filtering failed: {0}")]
    Filter(#[from] FilterError),

    /// Fetching auxiliary data for the selected entity failed.
    #[error("{} (ID: {id}): {source}", entity_label(.kind))]
    Fetch {
        /// Entity kind.
        kind: &'static str,
        /// Identity of the selected entity.
        id: UserId,
        /// Transport failure.
        source: TransportError,
    },

    /// Projecting the selected entity into the output record failed.
    #[error("{} (ID: {id}): {source}", entity_label(.kind))]
    Projection {
        /// Entity kind.
        kind: &'static str,
        /// Identity of the selected entity.
        id: UserId,
        /// Projection failure.
        source: ProjectionError,
    },

    /// The requested data source type is unknown.
    #[error("Unknown data source type: {0}")]
    UnknownDataSource(String),

    /// The output record could not be serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ProviderError {
    /// Convert into the diagnostic reported to the host.
    ///
    /// # Examples
    ///
    /// ```
    /// use hemmer_provider_opennebula::error::{FilterError, ProviderError};
    ///
    /// let err = ProviderError::from(FilterError::NotFound {
    ///     kind: "user",
    ///     constraints: vec!["name"],
    /// });
    /// let diag = err.to_diagnostic();
    /// assert_eq!(diag.summary, "users filtering failed");
    /// assert_eq!(diag.detail.as_deref(), Some("no users match the constraints"));
    /// ```
    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            Self::Decode(err) => {
                Diagnostic::error("invalid data source configuration").with_detail(err.to_string())
            },
            Self::Listing { kind, source } => {
                Diagnostic::error(format!("{}s filtering failed", kind))
                    .with_detail(source.message())
            },
            Self::Filter(err) => Diagnostic::error(format!("{}s filtering failed", err.kind()))
                .with_detail(err.to_string()),
            Self::Fetch { kind, id, source } => Diagnostic::error(format!("{} info error", kind))
                .with_detail(format!("{} (ID: {}): {}", entity_label(kind), id, source)),
            Self::Projection { kind, id, source } => {
                Diagnostic::error(format!("failed to flatten {}", source.field))
                    .with_detail(format!(
                        "{} (ID: {}): {}",
                        entity_label(kind),
                        id,
                        source.cause
                    ))
                    .with_attribute(source.field.clone())
            },
            Self::UnknownDataSource(name) => {
                Diagnostic::error(format!("Unknown data source type: {}", name))
            },
            Self::Serialization(err) => {
                Diagnostic::error("setting attribute failed").with_detail(err.to_string())
            },
        }
    }
}

impl From<ProviderError> for tonic::Status {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Decode(err) => tonic::Status::invalid_argument(err.to_string()),
            ProviderError::Listing { source, .. } => tonic::Status::unavailable(source.message),
            ProviderError::Filter(err @ FilterError::NotFound { .. }) => {
                tonic::Status::not_found(err.to_string())
            },
            ProviderError::Filter(err @ FilterError::Ambiguous { .. }) => {
                tonic::Status::invalid_argument(err.to_string())
            },
            err @ ProviderError::Fetch { .. } => tonic::Status::unavailable(err.to_string()),
            err @ ProviderError::Projection { .. } => tonic::Status::internal(err.to_string()),
            ProviderError::UnknownDataSource(name) => {
                tonic::Status::not_found(format!("Unknown data source type: {}", name))
            },
            ProviderError::Serialization(err) => {
                tonic::Status::internal(format!("Serialization error: {}", err))
            },
        }
    }
}

/// "user" -> "User"
fn entity_label(kind: &str) -> String {
    let mut chars = kind.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
