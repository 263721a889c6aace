//! Selection of exactly one remote object from a candidate pool.
//!
//! A [`Criteria`] set holds optional predicates. [`filter`] walks the pool
//! once, keeps every candidate that satisfies all active predicates, and
//! reports one of three outcomes through [`MatchResult`].

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::FilterError;
use crate::tags::match_tags;
use crate::template::Template;
use crate::types::{GroupId, User, UserId};

/// A remote object that can be selected by [`filter`].
pub trait Candidate {
    /// Singular, lowercase entity kind, e.g. `"user"`.
    const KIND: &'static str;

    /// Pool identity.
    fn id(&self) -> UserId;

    /// Object name.
    fn name(&self) -> &str;

    /// Primary group id.
    fn primary_group(&self) -> GroupId;

    /// Group membership. Empty when the object carries no group list.
    fn group_ids(&self) -> &[GroupId];

    /// Free-form template.
    fn template(&self) -> &Template;
}

impl Candidate for User {
    const KIND: &'static str = "user";

    fn id(&self) -> UserId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn primary_group(&self) -> GroupId {
        self.primary_group
    }

    fn group_ids(&self) -> &[GroupId] {
        self.groups.as_deref().unwrap_or(&[])
    }

    fn template(&self) -> &Template {
        &self.template
    }
}

/// User-supplied selection criteria. Every field is optional; `None` means
/// "don't care".
///
/// An empty set matches every candidate, so a lookup without criteria only
/// succeeds against a pool of exactly one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Criteria {
    /// Exact name.
    #[serde(default)]
    pub name: Option<String>,
    /// Exact primary group id.
    #[serde(default)]
    pub primary_group: Option<GroupId>,
    /// Groups the candidate must belong to, all of them.
    #[serde(default)]
    pub groups: Option<Vec<GroupId>>,
    /// Template tags the candidate must carry, all of them.
    #[serde(default)]
    pub tags: Option<BTreeMap<String, String>>,
}

impl Criteria {
    /// Create an empty criteria set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Require an exact name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Require an exact primary group.
    pub fn with_primary_group(mut self, gid: GroupId) -> Self {
        self.primary_group = Some(gid);
        self
    }

    /// Require membership of every listed group.
    pub fn with_groups(mut self, groups: impl IntoIterator<Item = GroupId>) -> Self {
        self.groups = Some(groups.into_iter().collect());
        self
    }

    /// Require a template tag.
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
        self
    }

    /// The predicates that actually constrain the pool.
    ///
    /// Empty group lists and empty tag maps are vacuous and are left out.
    pub fn predicates(&self) -> Vec<Predicate<'_>> {
        let mut predicates = Vec::new();
        if let Some(name) = &self.name {
            predicates.push(Predicate::Name(name));
        }
        if let Some(gid) = self.primary_group {
            predicates.push(Predicate::PrimaryGroup(gid));
        }
        if let Some(groups) = self.groups.as_deref().filter(|g| !g.is_empty()) {
            predicates.push(Predicate::Groups(groups));
        }
        if let Some(tags) = self.tags.as_ref().filter(|t| !t.is_empty()) {
            predicates.push(Predicate::Tags(tags));
        }
        predicates
    }

    /// Whether no predicate is active.
    pub fn is_empty(&self) -> bool {
        self.predicates().is_empty()
    }
}

/// A single active selection predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Predicate<'a> {
    /// Name equality.
    Name(&'a str),
    /// Primary group equality.
    PrimaryGroup(GroupId),
    /// Membership of every listed group.
    Groups(&'a [GroupId]),
    /// Every tag present with an equal value.
    Tags(&'a BTreeMap<String, String>),
}

impl Predicate<'_> {
    /// Stable class name, used in diagnostics and logs.
    pub fn class(&self) -> &'static str {
        match self {
            Self::Name(_) => "name",
            Self::PrimaryGroup(_) => "primary_group",
            Self::Groups(_) => "groups",
            Self::Tags(_) => "tags",
        }
    }

    /// Evaluate the predicate against one candidate.
    pub fn matches<C: Candidate>(&self, candidate: &C) -> bool {
        match self {
            Self::Name(name) => candidate.name() == *name,
            Self::PrimaryGroup(gid) => candidate.primary_group() == *gid,
            Self::Groups(required) => {
                let member_of: BTreeSet<GroupId> = candidate.group_ids().iter().copied().collect();
                required.iter().all(|gid| member_of.contains(gid))
            },
            Self::Tags(tags) => match_tags(candidate.template(), tags),
        }
    }
}

/// Outcome of a filter pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchResult<'c, C> {
    /// Exactly one candidate survived.
    Unique(&'c C),
    /// No candidate survived.
    NotFound,
    /// More than one candidate survived.
    Ambiguous(Vec<&'c C>),
}

impl<'c, C: Candidate> MatchResult<'c, C> {
    /// Turn the outcome into the selected candidate or a [`FilterError`]
    /// naming the active constraint classes.
    pub fn into_unique(self, criteria: &Criteria) -> Result<&'c C, FilterError> {
        let constraints = || -> Vec<&'static str> {
            criteria.predicates().iter().map(Predicate::class).collect()
        };
        match self {
            Self::Unique(candidate) => Ok(candidate),
            Self::NotFound => Err(FilterError::NotFound {
                kind: C::KIND,
                constraints: constraints(),
            }),
            Self::Ambiguous(matches) => Err(FilterError::Ambiguous {
                kind: C::KIND,
                matches: matches.len(),
                constraints: constraints(),
            }),
        }
    }
}

/// Select the candidates that satisfy every active predicate in `criteria`.
///
/// Each candidate is dropped on its first failing predicate; the pool itself
/// is always walked to the end so that ambiguity is detected.
///
/// # Examples
///
/// ```
/// use hemmer_provider_opennebula::filter::{filter, Criteria, MatchResult};
/// use hemmer_provider_opennebula::types::User;
///
/// let pool = vec![
///     User::new(5, "alice").with_groups([1, 2]),
///     User::new(6, "bob").with_groups([1]),
/// ];
///
/// match filter(&pool, &Criteria::new().with_name("alice")) {
///     MatchResult::Unique(user) => assert_eq!(user.id, 5),
///     other => panic!("unexpected outcome: {:?}", other),
/// }
/// assert!(matches!(
///     filter(&pool, &Criteria::new().with_groups([1])),
///     MatchResult::Ambiguous(_)
/// ));
/// ```
pub fn filter<'c, C: Candidate>(candidates: &'c [C], criteria: &Criteria) -> MatchResult<'c, C> {
    let predicates = criteria.predicates();
    debug!(
        kind = C::KIND,
        candidates = candidates.len(),
        predicates = ?predicates.iter().map(Predicate::class).collect::<Vec<_>>(),
        "Filtering candidates"
    );

    let survivors: Vec<&C> = candidates
        .iter()
        .filter(|candidate| predicates.iter().all(|p| p.matches(*candidate)))
        .collect();

    debug!(kind = C::KIND, survivors = survivors.len(), "Filtering completed");

    match survivors.as_slice() {
        [] => MatchResult::NotFound,
        [one] => MatchResult::Unique(*one),
        _ => MatchResult::Ambiguous(survivors),
    }
}
