//! The `opennebula_user` read pipeline.
//!
//! One read lists the pool once, filters it once, projects the selected user
//! and, only when asked for, fetches and projects its quotas. The first
//! failure ends the read; no partial record is ever produced.

use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

use crate::controller::Controller;
use crate::error::{DecodeError, ProviderError};
use crate::filter::{filter, Candidate, Criteria};
use crate::groups::flatten_groups;
use crate::quotas::flatten_quotas;
use crate::template::{pairs_to_map, value_type_name};
use crate::types::{identity, User, UserRecord};

/// A decoded `opennebula_user` read request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct UserQuery {
    /// Selection criteria.
    #[serde(flatten)]
    pub criteria: Criteria,
    /// Authentication driver named in the configuration. Informational only.
    #[serde(default)]
    pub auth_driver: Option<String>,
    /// Whether the caller wants the `quotas` field populated.
    #[serde(default, rename = "quotas", deserialize_with = "quota_interest")]
    pub quotas_requested: bool,
}

impl UserQuery {
    /// Query with the given criteria and no quota interest.
    pub fn new(criteria: Criteria) -> Self {
        Self {
            criteria,
            ..Default::default()
        }
    }

    /// Ask for quotas to be fetched and projected.
    pub fn with_quotas(mut self) -> Self {
        self.quotas_requested = true;
        self
    }

    /// Decode a data source configuration object.
    ///
    /// `null` decodes to an empty query. Keys the lookup does not use (such
    /// as the computed `id`) are ignored.
    ///
    /// # Examples
    ///
    /// ```
    /// use hemmer_provider_opennebula::read::UserQuery;
    /// use serde_json::json;
    ///
    /// let query = UserQuery::from_config(&json!({
    ///     "name": "alice",
    ///     "groups": [1],
    ///     "quotas": {}
    /// }))
    /// .unwrap();
    /// assert_eq!(query.criteria.name.as_deref(), Some("alice"));
    /// assert!(query.quotas_requested);
    ///
    /// assert!(UserQuery::from_config(&json!({"primary_group": "zero"})).is_err());
    /// ```
    pub fn from_config(config: &Value) -> Result<Self, DecodeError> {
        match config {
            Value::Null => Ok(Self::default()),
            Value::Object(_) => Ok(Self::deserialize(config)?),
            other => Err(DecodeError::UnexpectedType {
                path: String::new(),
                expected: "object",
                got: value_type_name(other),
            }),
        }
    }
}

/// Quotas count as requested when the key holds a map: `{}` or the prior
/// state. Absent and `null` mean not requested; any other value is a decode
/// error, matching the `map(map(string))` type the schema declares.
fn quota_interest<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Map<String, Value>>::deserialize(deserializer)?;
    Ok(value.is_some())
}

/// Resolve a query to exactly one user and project it.
///
/// # Errors
///
/// - [`ProviderError::Listing`] when the pool cannot be listed
/// - [`ProviderError::Filter`] when zero or several users match
/// - [`ProviderError::Projection`] when the group list or quotas cannot be
///   projected
/// - [`ProviderError::Fetch`] when the quota fetch fails
pub async fn read_user<C>(controller: &C, query: &UserQuery) -> Result<UserRecord, ProviderError>
where
    C: Controller + ?Sized,
{
    let users = controller.list_users().await.map_err(|source| {
        error!(error = %source, "Listing users failed");
        ProviderError::Listing {
            kind: User::KIND,
            source,
        }
    })?;

    let user = filter(&users, &query.criteria)
        .into_unique(&query.criteria)
        .map_err(|err| {
            warn!(
                error = %err,
                constraints = ?err.constraints(),
                candidates = users.len(),
                "User lookup did not resolve to a single user"
            );
            err
        })?;
    let id = user.id();
    info!(id, name = %user.name, "Matched user");

    if let Some(driver) = query.auth_driver.as_deref() {
        if driver != user.auth_driver {
            debug!(
                configured = driver,
                actual = %user.auth_driver,
                "Configured auth_driver differs from the matched user"
            );
        }
    }

    let groups = flatten_groups(user).map_err(|source| ProviderError::Projection {
        kind: User::KIND,
        id,
        source,
    })?;

    let quotas = if query.quotas_requested {
        let raw = controller
            .user_quotas(id)
            .await
            .map_err(|source| ProviderError::Fetch {
                kind: User::KIND,
                id,
                source,
            })?;
        let quotas = flatten_quotas(&raw).map_err(|source| ProviderError::Projection {
            kind: User::KIND,
            id,
            source,
        })?;
        debug!(id, categories = quotas.len(), "Projected quotas");
        Some(quotas)
    } else {
        None
    };

    Ok(UserRecord {
        id: identity(id),
        name: user.name.clone(),
        auth_driver: user.auth_driver.clone(),
        primary_group: user.primary_group,
        groups,
        tags: pairs_to_map(&user.template),
        quotas,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FilterError;
    use crate::template::Template;
    use crate::testing::StaticController;
    use proptest::prelude::*;
    use serde_json::json;

    fn pool() -> Vec<User> {
        vec![
            User::new(5, "alice").with_groups([1, 2]),
            User::new(6, "bob").with_groups([1]),
        ]
    }

    fn by_name(name: &str) -> UserQuery {
        UserQuery::new(Criteria::new().with_name(name))
    }

    #[tokio::test]
    async fn test_unique_match_is_projected() {
        let controller = StaticController::new(pool());
        let record = read_user(&controller, &by_name("alice")).await.unwrap();

        assert_eq!(record.id, "5");
        assert_eq!(record.name, "alice");
        assert_eq!(record.groups, vec![1, 2]);
        assert_eq!(record.quotas, None);
        assert_eq!(controller.list_calls(), 1);
    }

    #[tokio::test]
    async fn test_ambiguous_groups() {
        let controller = StaticController::new(pool());
        let query = UserQuery::new(Criteria::new().with_groups([1]));

        let err = read_user(&controller, &query).await.unwrap_err();
        match err {
            ProviderError::Filter(FilterError::Ambiguous { matches, .. }) => assert_eq!(matches, 2),
            other => panic!("expected ambiguity, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_not_found() {
        let controller = StaticController::new(pool());
        let err = read_user(&controller, &by_name("carol")).await.unwrap_err();

        assert!(matches!(
            err,
            ProviderError::Filter(FilterError::NotFound { .. })
        ));
        assert_eq!(err.to_diagnostic().detail.as_deref(), Some("no users match the constraints"));
    }

    #[tokio::test]
    async fn test_quotas_not_fetched_unless_requested() {
        let controller =
            StaticController::new(pool()).with_quotas(5, json!({"vm": {"vms": 4}}));

        let record = read_user(&controller, &by_name("alice")).await.unwrap();
        assert_eq!(record.quotas, None);
        assert_eq!(controller.quota_calls(), 0);
    }

    #[tokio::test]
    async fn test_quotas_fetched_when_requested() {
        let controller =
            StaticController::new(pool()).with_quotas(5, json!({"vm": {"vms": 4, "vms_used": 1}}));

        let record = read_user(&controller, &by_name("alice").with_quotas())
            .await
            .unwrap();
        let quotas = record.quotas.unwrap();
        assert_eq!(quotas["vm"]["vms"], "4");
        assert_eq!(quotas["vm"]["vms_used"], "1");
        assert_eq!(controller.quota_calls(), 1);
    }

    #[tokio::test]
    async fn test_malformed_quotas_name_owner() {
        let controller =
            StaticController::new(pool()).with_quotas(5, json!({"vm": {"vms": -3}}));

        let err = read_user(&controller, &by_name("alice").with_quotas())
            .await
            .unwrap_err();
        match &err {
            ProviderError::Projection { id, source, .. } => {
                assert_eq!(*id, 5);
                assert_eq!(source.field, "quotas");
            },
            other => panic!("expected projection error, got {:?}", other),
        }
        let diag = err.to_diagnostic();
        assert_eq!(diag.summary, "failed to flatten quotas");
        assert!(diag.detail.unwrap().starts_with("User (ID: 5):"));
    }

    #[tokio::test]
    async fn test_missing_group_list_fails() {
        let controller = StaticController::new(vec![User::new(9, "dave").without_groups()]);
        let err = read_user(&controller, &by_name("dave")).await.unwrap_err();

        let diag = err.to_diagnostic();
        assert_eq!(diag.summary, "failed to flatten groups");
        assert_eq!(diag.detail.as_deref(), Some("User (ID: 9): group list is missing"));
    }

    #[tokio::test]
    async fn test_listing_failure() {
        let controller = StaticController::new(pool()).failing_list("connection refused");
        let err = read_user(&controller, &by_name("alice")).await.unwrap_err();

        assert!(matches!(err, ProviderError::Listing { .. }));
        assert_eq!(err.to_diagnostic().detail.as_deref(), Some("connection refused"));
    }

    #[tokio::test]
    async fn test_quota_fetch_failure() {
        let controller = StaticController::new(pool()).failing_quotas("timeout");
        let err = read_user(&controller, &by_name("alice").with_quotas())
            .await
            .unwrap_err();

        let diag = err.to_diagnostic();
        assert_eq!(diag.summary, "user info error");
        assert_eq!(diag.detail.as_deref(), Some("User (ID: 5): timeout"));
    }

    #[tokio::test]
    async fn test_tags_are_scalar_template_pairs() {
        let template = Template::new()
            .with("TEAM", "infra")
            .with("NIC", Template::new().with("IP", "10.0.0.1"))
            .with("TEAM", "platform");
        let controller =
            StaticController::new(vec![User::new(1, "eve").with_template(template)]);

        let query = UserQuery::new(Criteria::new().with_tag("TEAM", "platform"));
        let record = read_user(&controller, &query).await.unwrap();

        assert_eq!(record.tags.len(), 1);
        assert_eq!(record.tags["TEAM"], "platform");
    }

    #[test]
    fn test_query_decoding() {
        let query = UserQuery::from_config(&json!({
            "id": "5",
            "name": "alice",
            "primary_group": 0,
            "groups": [1, 2],
            "tags": {"TEAM": "infra"},
            "auth_driver": "core"
        }))
        .unwrap();

        assert_eq!(query.criteria.name.as_deref(), Some("alice"));
        assert_eq!(query.criteria.primary_group, Some(0));
        assert_eq!(query.criteria.groups, Some(vec![1, 2]));
        assert_eq!(query.auth_driver.as_deref(), Some("core"));
        assert!(!query.quotas_requested);
    }

    #[test]
    fn test_query_quota_interest() {
        let requested = |config| UserQuery::from_config(&config).unwrap().quotas_requested;

        assert!(!requested(json!({})));
        assert!(!requested(json!({"quotas": null})));
        assert!(requested(json!({"quotas": {}})));
        assert!(requested(json!({"quotas": {"vm": {"vms": "4"}}})));
    }

    #[test]
    fn test_query_quota_flags_rejected() {
        assert!(UserQuery::from_config(&json!({"quotas": true})).is_err());
        assert!(UserQuery::from_config(&json!({"quotas": false})).is_err());
        assert!(UserQuery::from_config(&json!({"quotas": "yes"})).is_err());
    }

    #[test]
    fn test_query_decoding_errors() {
        assert!(UserQuery::from_config(&Value::Null).unwrap().criteria.is_empty());
        assert!(matches!(
            UserQuery::from_config(&json!([1])),
            Err(DecodeError::UnexpectedType { expected: "object", got: "array", .. })
        ));
        assert!(UserQuery::from_config(&json!({"groups": "1,2"})).is_err());
        assert!(UserQuery::from_config(&json!({"tags": {"TEAM": 1}})).is_err());
    }

    proptest! {
        #[test]
        fn reading_twice_yields_identical_records(
            pick in 0usize..3,
            with_quotas in any::<bool>(),
        ) {
            let names = ["alice", "bob", "carol"];
            let controller = StaticController::new(pool())
                .with_quotas(5, json!({"vm": {"vms": 2}}))
                .with_quotas(6, json!({"network": [{"id": 0, "leases": 1}]}));
            let mut query = by_name(names[pick]);
            query.quotas_requested = with_quotas;

            let first = tokio_test::block_on(read_user(&controller, &query));
            let second = tokio_test::block_on(read_user(&controller, &query));

            match (first, second) {
                (Ok(a), Ok(b)) => prop_assert_eq!(a, b),
                (Err(a), Err(b)) => prop_assert_eq!(a.to_diagnostic(), b.to_diagnostic()),
                (a, b) => prop_assert!(false, "reads diverged: {:?} vs {:?}", a, b),
            }
        }
    }
}
