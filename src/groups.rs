//! Projection of group membership into the flat `groups` field.

use crate::error::ProjectionError;
use crate::types::{GroupId, User};

/// Output field written by [`flatten_groups`].
pub const GROUPS_FIELD: &str = "groups";

/// Flatten a user's group membership into the ordered `groups` list.
///
/// Pool order is kept. A user whose pool entry carried no group list at all
/// cannot be projected; that is different from an empty list, which projects
/// to an empty field.
///
/// # Examples
///
/// ```
/// use hemmer_provider_opennebula::groups::flatten_groups;
/// use hemmer_provider_opennebula::types::User;
///
/// let user = User::new(5, "alice").with_groups([1, 2]);
/// assert_eq!(flatten_groups(&user).unwrap(), vec![1, 2]);
///
/// let broken = User::new(6, "bob").without_groups();
/// assert!(flatten_groups(&broken).is_err());
/// ```
pub fn flatten_groups(user: &User) -> Result<Vec<GroupId>, ProjectionError> {
    match &user.groups {
        Some(groups) => Ok(groups.clone()),
        None => Err(ProjectionError::new(GROUPS_FIELD, "group list is missing")),
    }
}
