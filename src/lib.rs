//! OpenNebula data sources for Hemmer.
//!
//! This crate resolves declarative lookup criteria to exactly one OpenNebula
//! object and projects its loosely-typed attributes into a flat,
//! strongly-typed state record.
//!
//! # Overview
//!
//! - **Templates** ([`template`]): ordered key/value records as OpenNebula
//!   stores them, with repeated keys and nested vectors
//! - **Selection** ([`filter`], [`tags`]): conjunctive criteria evaluated in a
//!   single pass, with "not found" and "ambiguous" kept apart
//! - **Projection** ([`groups`], [`quotas`]): nested remote structures turned
//!   into flat output fields
//! - **Read pipeline** ([`read`]): list, filter, project, compose
//! - **Provider surface** ([`provider`]): schema, validation and
//!   diagnostics-based reads for the host
//!
//! The remote transport is abstracted behind [`Controller`].
//!
//! # Quick Start
//!
//! ```
//! use hemmer_provider_opennebula::{Provider, USER_DATA_SOURCE};
//! use hemmer_provider_opennebula::testing::StaticController;
//! use hemmer_provider_opennebula::types::User;
//! use serde_json::json;
//!
//! # tokio_test::block_on(async {
//! let provider = Provider::new(StaticController::new(vec![
//!     User::new(5, "alice").with_groups([1, 2]),
//!     User::new(6, "bob").with_groups([1]),
//! ]));
//!
//! let response = provider
//!     .read_data_source(USER_DATA_SOURCE, json!({"name": "alice"}))
//!     .await;
//! let state = response.state.unwrap();
//! assert_eq!(state["id"], "5");
//! assert_eq!(state["groups"], json!([1, 2]));
//!
//! let response = provider
//!     .read_data_source(USER_DATA_SOURCE, json!({"groups": [1]}))
//!     .await;
//! assert!(response.state.is_none());
//! assert_eq!(
//!     response.diagnostics.iter().next().unwrap().summary,
//!     "users filtering failed"
//! );
//! # });
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod controller;
pub mod diagnostics;
pub mod error;
pub mod filter;
pub mod groups;
pub mod logging;
pub mod provider;
pub mod quotas;
pub mod read;
pub mod schema;
pub mod tags;
pub mod template;
pub mod testing;
pub mod types;
pub mod validation;

// Re-export main types at crate root
pub use controller::Controller;
pub use diagnostics::{Diagnostic, DiagnosticSeverity, Diagnostics};
pub use error::{DecodeError, FilterError, ProjectionError, ProviderError, TransportError};
pub use filter::{filter, Criteria, MatchResult};
pub use groups::flatten_groups;
pub use logging::{init_logging, init_logging_with_default, try_init_logging};
pub use provider::{Provider, ReadResponse, USER_DATA_SOURCE};
pub use quotas::flatten_quotas;
pub use read::{read_user, UserQuery};
pub use schema::ProviderSchema;
pub use tags::match_tags;
pub use template::{pairs_to_map, Template};
pub use types::{User, UserRecord};
pub use validation::{is_valid, validate};

// Re-export async_trait for convenience
pub use async_trait::async_trait;

// Re-export commonly used external types
pub use serde_json;
pub use tonic;
pub use tracing;
