//! The host-facing surface: schema, validation and data source reads.
//!
//! [`Provider`] is what a host adapter (gRPC service, test harness) calls. It
//! never fails outright; every outcome is a [`ReadResponse`] carrying either a
//! state object or the diagnostics explaining why there is none.

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, error, info, instrument, warn};

use crate::config::{AUTH_DRIVERS, DEFAULT_AUTH_DRIVER, SELECTION_DEPRECATION};
use crate::controller::Controller;
use crate::diagnostics::Diagnostics;
use crate::error::ProviderError;
use crate::read::{read_user, UserQuery};
use crate::schema::{Attribute, AttributeType, ProviderSchema, Schema};
use crate::validation::validate;

/// Type name of the user data source.
pub const USER_DATA_SOURCE: &str = "opennebula_user";

/// Result of a data source read.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReadResponse {
    /// State object of the matched entity. `None` whenever an error occurred.
    pub state: Option<Value>,
    /// Warnings gathered along the way, followed by the error that ended the
    /// read if there was one.
    pub diagnostics: Diagnostics,
}

impl ReadResponse {
    /// Whether the read produced a state object.
    pub fn is_success(&self) -> bool {
        self.state.is_some()
    }
}

/// OpenNebula data sources over a [`Controller`].
pub struct Provider<C> {
    controller: C,
    auth_drivers: Vec<String>,
}

impl<C: Controller> Provider<C> {
    /// Create a provider that accepts the standard OpenNebula auth drivers.
    pub fn new(controller: C) -> Self {
        Self {
            controller,
            auth_drivers: AUTH_DRIVERS.iter().map(|d| d.to_string()).collect(),
        }
    }

    /// Replace the set of accepted auth drivers.
    pub fn with_auth_drivers<I, S>(mut self, drivers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.auth_drivers = drivers.into_iter().map(Into::into).collect();
        self
    }

    /// The controller reads go through.
    pub fn controller(&self) -> &C {
        &self.controller
    }

    /// Accepted auth drivers.
    pub fn auth_drivers(&self) -> &[String] {
        &self.auth_drivers
    }

    /// Schemas of every data source served.
    pub fn schema(&self) -> ProviderSchema {
        ProviderSchema::new().with_data_source(USER_DATA_SOURCE, user_schema(&self.auth_drivers))
    }

    /// Names of every data source served.
    pub fn data_source_types(&self) -> Vec<String> {
        self.schema().data_sources.keys().cloned().collect()
    }

    /// Validate a data source configuration against its schema.
    pub fn validate_data_source_config(&self, data_source_type: &str, config: &Value) -> Diagnostics {
        match self.schema().data_source(data_source_type) {
            Some(schema) => validate(schema, config),
            None => ProviderError::UnknownDataSource(data_source_type.to_string())
                .to_diagnostic()
                .into(),
        }
    }

    /// Validate and read a data source.
    ///
    /// Validation errors stop the read before the controller is contacted.
    /// Validation warnings are kept and returned with the state.
    #[instrument(skip(self, config), name = "provider.read_data_source")]
    pub async fn read_data_source(&self, data_source_type: &str, config: Value) -> ReadResponse {
        debug!("ReadDataSource called");

        let mut diagnostics = self.validate_data_source_config(data_source_type, &config);
        if diagnostics.has_errors() {
            warn!(
                diagnostics = diagnostics.len(),
                "ReadDataSource rejected the configuration"
            );
            return ReadResponse {
                state: None,
                diagnostics,
            };
        }

        match self.read_user_state(&config).await {
            Ok(state) => {
                info!(
                    warnings = diagnostics.len(),
                    "ReadDataSource completed successfully"
                );
                ReadResponse {
                    state: Some(state),
                    diagnostics,
                }
            },
            Err(err) => {
                error!(error = %err, "ReadDataSource failed");
                diagnostics.push(err.to_diagnostic());
                ReadResponse {
                    state: None,
                    diagnostics,
                }
            },
        }
    }

    /// Read `opennebula_user` without schema validation.
    ///
    /// gRPC adapters that report failures as a status rather than diagnostics
    /// can call this and convert the error with `tonic::Status::from`.
    pub async fn read_user_state(&self, config: &Value) -> Result<Value, ProviderError> {
        let query = UserQuery::from_config(config)?;
        let record = read_user(&self.controller, &query).await?;
        Ok(serde_json::to_value(record)?)
    }
}

/// Schema of the `opennebula_user` data source.
pub fn user_schema(auth_drivers: &[String]) -> Schema {
    Schema::v0()
        .with_description("Look up a single OpenNebula user")
        .with_attribute(
            "id",
            Attribute::computed_string().with_description("ID of the User"),
        )
        .with_attribute(
            "name",
            Attribute::optional_computed(AttributeType::String)
                .with_description("Name of the User"),
        )
        .with_attribute(
            "auth_driver",
            Attribute::optional_computed(AttributeType::String)
                .with_description(format!(
                    "Authentication driver. Select between: {}. Defaults to '{}'.",
                    auth_drivers.join(", "),
                    DEFAULT_AUTH_DRIVER
                ))
                .with_default(json!(DEFAULT_AUTH_DRIVER))
                .with_deprecation(SELECTION_DEPRECATION)
                .with_allowed_values(auth_drivers.iter().cloned()),
        )
        .with_attribute(
            "primary_group",
            Attribute::optional_computed(AttributeType::Int64)
                .with_description("Primary (Default) Group ID of the user"),
        )
        .with_attribute(
            "groups",
            Attribute::optional_computed(AttributeType::list(AttributeType::Int64))
                .with_description("List of group IDs the user belongs to"),
        )
        .with_attribute(
            "tags",
            Attribute::optional_computed(AttributeType::map(AttributeType::String))
                .with_description("Template tags the user must carry"),
        )
        .with_attribute(
            "quotas",
            Attribute::optional_computed(AttributeType::map(AttributeType::map(
                AttributeType::String,
            )))
            .with_description("Quota limits and usage by category; set to a map to request them")
            .with_deprecation(SELECTION_DEPRECATION),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::DiagnosticSeverity;
    use crate::template::Template;
    use crate::testing::{
        assert_error_contains, assert_has_errors, assert_no_errors, assert_warning_contains,
        StaticController,
    };
    use crate::types::User;

    fn provider() -> Provider<StaticController> {
        Provider::new(
            StaticController::new(vec![
                User::new(5, "alice")
                    .with_groups([1, 2])
                    .with_template(Template::new().with("TEAM", "infra")),
                User::new(6, "bob").with_groups([1]),
            ])
            .with_quotas(5, json!({"datastore": "broken"})),
        )
    }

    fn diags(response: &ReadResponse) -> Vec<crate::diagnostics::Diagnostic> {
        response.diagnostics.clone().into_vec()
    }

    #[test]
    fn test_schema_describes_user_data_source() {
        let provider = provider();
        assert_eq!(provider.data_source_types(), vec![USER_DATA_SOURCE.to_string()]);

        let schema = provider.schema();
        let user = schema.data_source(USER_DATA_SOURCE).unwrap();
        let names: Vec<_> = user.attributes.keys().map(String::as_str).collect();
        assert_eq!(
            names,
            vec!["auth_driver", "groups", "id", "name", "primary_group", "quotas", "tags"]
        );

        let driver = &user.attributes["auth_driver"];
        assert_eq!(driver.default, Some(json!("core")));
        assert!(driver.deprecated.is_some());
        assert_eq!(driver.allowed_values.as_ref().unwrap().len(), AUTH_DRIVERS.len());
        assert!(user.attributes["quotas"].deprecated.is_some());
        assert!(user.attributes["id"].flags.is_computed_only());
    }

    #[test]
    fn test_validate_unknown_data_source() {
        let diagnostics = provider()
            .validate_data_source_config("opennebula_group", &json!({}))
            .into_vec();
        assert_error_contains(&diagnostics, "Unknown data source type: opennebula_group");
    }

    #[test]
    fn test_validate_auth_driver() {
        let provider = provider();

        let diagnostics = provider
            .validate_data_source_config(USER_DATA_SOURCE, &json!({"auth_driver": "ldap"}))
            .into_vec();
        assert_no_errors(&diagnostics);
        assert_warning_contains(&diagnostics, "auth_driver");

        let diagnostics = provider
            .validate_data_source_config(USER_DATA_SOURCE, &json!({"auth_driver": "kerberos"}))
            .into_vec();
        assert_error_contains(&diagnostics, "Invalid value for attribute 'auth_driver'");
    }

    #[test]
    fn test_custom_auth_drivers() {
        let provider = provider().with_auth_drivers(["kerberos"]);
        assert_eq!(provider.auth_drivers(), &["kerberos".to_string()]);

        let diagnostics = provider
            .validate_data_source_config(USER_DATA_SOURCE, &json!({"auth_driver": "kerberos"}))
            .into_vec();
        assert_no_errors(&diagnostics);

        let diagnostics = provider
            .validate_data_source_config(USER_DATA_SOURCE, &json!({"auth_driver": "core"}))
            .into_vec();
        assert_has_errors(&diagnostics);
    }

    #[tokio::test]
    async fn test_read_unique_user() {
        let response = provider()
            .read_data_source(USER_DATA_SOURCE, json!({"name": "alice"}))
            .await;

        assert!(response.is_success());
        assert!(response.diagnostics.is_empty());
        assert_eq!(
            response.state,
            Some(json!({
                "id": "5",
                "name": "alice",
                "auth_driver": "core",
                "primary_group": 0,
                "groups": [1, 2],
                "tags": {"TEAM": "infra"}
            }))
        );
    }

    #[tokio::test]
    async fn test_read_keeps_warnings_on_success() {
        let response = provider()
            .read_data_source(USER_DATA_SOURCE, json!({"name": "bob", "auth_driver": "core"}))
            .await;

        assert!(response.is_success());
        assert_eq!(response.diagnostics.len(), 1);
        assert_warning_contains(&diags(&response), "deprecated");
    }

    #[tokio::test]
    async fn test_read_ambiguous() {
        let response = provider()
            .read_data_source(USER_DATA_SOURCE, json!({"groups": [1]}))
            .await;

        assert!(!response.is_success());
        let diagnostics = diags(&response);
        assert_error_contains(&diagnostics, "users filtering failed");
        assert_error_contains(&diagnostics, "several users match the constraints");
    }

    #[tokio::test]
    async fn test_read_not_found() {
        let response = provider()
            .read_data_source(USER_DATA_SOURCE, json!({"name": "carol"}))
            .await;

        assert_eq!(response.state, None);
        assert_error_contains(&diags(&response), "no users match the constraints");
    }

    #[tokio::test]
    async fn test_invalid_config_never_reaches_controller() {
        let provider = provider();
        let response = provider
            .read_data_source(USER_DATA_SOURCE, json!({"primary_group": "zero"}))
            .await;

        assert!(!response.is_success());
        assert_error_contains(&diags(&response), "Invalid type for attribute 'primary_group'");
        assert_eq!(provider.controller().list_calls(), 0);
    }

    #[tokio::test]
    async fn test_whole_float_ids_never_reach_controller() {
        let provider = provider();

        let response = provider
            .read_data_source(USER_DATA_SOURCE, json!({"primary_group": 1.0}))
            .await;
        assert!(!response.is_success());
        let diagnostics = diags(&response);
        assert_error_contains(&diagnostics, "Invalid type for attribute 'primary_group'");
        assert_eq!(diagnostics[0].attribute.as_deref(), Some("primary_group"));

        let response = provider
            .read_data_source(USER_DATA_SOURCE, json!({"groups": [1.0]}))
            .await;
        assert!(!response.is_success());
        let diagnostics = diags(&response);
        assert_error_contains(&diagnostics, "Invalid type for attribute 'groups.0'");

        assert_eq!(provider.controller().list_calls(), 0);
    }

    #[tokio::test]
    async fn test_quota_flag_is_rejected_by_schema() {
        let provider = provider();
        let response = provider
            .read_data_source(USER_DATA_SOURCE, json!({"name": "alice", "quotas": true}))
            .await;

        assert!(!response.is_success());
        assert_error_contains(&diags(&response), "Invalid type for attribute 'quotas'");
        assert_eq!(provider.controller().list_calls(), 0);
        assert_eq!(provider.controller().quota_calls(), 0);
    }

    #[tokio::test]
    async fn test_read_unknown_data_source() {
        let provider = provider();
        let response = provider.read_data_source("opennebula_vm", json!({})).await;

        assert_error_contains(&diags(&response), "Unknown data source type: opennebula_vm");
        assert_eq!(provider.controller().list_calls(), 0);
    }

    #[tokio::test]
    async fn test_read_quotas_on_request_only() {
        let provider = provider();

        let response = provider
            .read_data_source(USER_DATA_SOURCE, json!({"name": "alice"}))
            .await;
        assert!(response.is_success());
        assert_eq!(provider.controller().quota_calls(), 0);

        let response = provider
            .read_data_source(USER_DATA_SOURCE, json!({"name": "alice", "quotas": {}}))
            .await;
        assert!(!response.is_success());
        assert_eq!(provider.controller().quota_calls(), 1);

        let diagnostics = diags(&response);
        let error = diagnostics
            .iter()
            .find(|d| d.severity == DiagnosticSeverity::Error)
            .unwrap();
        assert_eq!(error.summary, "failed to flatten quotas");
        assert!(error.detail.as_deref().unwrap().starts_with("User (ID: 5):"));
        assert_warning_contains(&diagnostics, "quotas");
    }

    #[tokio::test]
    async fn test_read_user_state_maps_to_status() {
        let err = provider()
            .read_user_state(&json!({"groups": [1]}))
            .await
            .unwrap_err();
        let status = tonic::Status::from(err);
        assert_eq!(status.code(), tonic::Code::InvalidArgument);
    }
}
