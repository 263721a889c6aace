//! Remote entity and output record types.
//!
//! [`User`] is what the transport hands back for each pool entry. [`UserRecord`]
//! is the flat, strongly-typed state written back to the host.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::template::Template;

/// Numeric identity of a user in OpenNebula.
pub type UserId = i64;

/// Numeric identity of a group in OpenNebula.
pub type GroupId = i64;

/// A user as returned by the user pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Pool identity.
    pub id: UserId,
    /// Login name.
    pub name: String,
    /// Authentication driver the account uses.
    #[serde(default)]
    pub auth_driver: String,
    /// Primary group.
    #[serde(rename = "gid")]
    pub primary_group: GroupId,
    /// Secondary group membership, including the primary group.
    ///
    /// `None` when the pool entry carried no group list at all.
    #[serde(default)]
    pub groups: Option<Vec<GroupId>>,
    /// Free-form user template.
    #[serde(default)]
    pub template: Template,
}

impl User {
    /// Create a user with an empty group list and template.
    pub fn new(id: UserId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            auth_driver: crate::config::DEFAULT_AUTH_DRIVER.to_string(),
            primary_group: 0,
            groups: Some(Vec::new()),
            template: Template::new(),
        }
    }

    /// Set the authentication driver.
    pub fn with_auth_driver(mut self, driver: impl Into<String>) -> Self {
        self.auth_driver = driver.into();
        self
    }

    /// Set the primary group.
    pub fn with_primary_group(mut self, gid: GroupId) -> Self {
        self.primary_group = gid;
        self
    }

    /// Set the group list.
    pub fn with_groups(mut self, groups: impl IntoIterator<Item = GroupId>) -> Self {
        self.groups = Some(groups.into_iter().collect());
        self
    }

    /// Drop the group list entirely.
    pub fn without_groups(mut self) -> Self {
        self.groups = None;
        self
    }

    /// Set the template.
    pub fn with_template(mut self, template: Template) -> Self {
        self.template = template;
        self
    }
}

/// Flat projection of a selected user.
///
/// Built from scratch on every read; never patched in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    /// Decimal form of the user id, used by the host for drift detection.
    pub id: String,
    /// Login name.
    pub name: String,
    /// Authentication driver.
    pub auth_driver: String,
    /// Primary group id.
    pub primary_group: GroupId,
    /// Group membership in pool order.
    pub groups: Vec<GroupId>,
    /// Scalar template attributes.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
    /// Quota usage and limits, present only when requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quotas: Option<BTreeMap<String, BTreeMap<String, String>>>,
}

/// Decimal identity string for a remote id.
///
/// # Examples
///
/// ```
/// use hemmer_provider_opennebula::types::identity;
///
/// assert_eq!(identity(5), "5");
/// assert_eq!(identity(1024), "1024");
/// ```
pub fn identity(id: UserId) -> String {
    id.to_string()
}
