//! Tag matching against user templates.
//!
//! Tags are the scalar attributes of a template. A set of required tags
//! matches when every required key resolves, through [`pairs_to_map`], to the
//! exact same value. The comparison is byte-exact and case-sensitive; there is
//! no wildcard or normalisation.

use std::collections::BTreeMap;

use crate::template::{pairs_to_map, Template};

/// Check whether `template` carries every tag in `required`.
///
/// An empty `required` map matches any template. Repeated keys resolve to
/// their last value, the same value the `tags` output field reports.
///
/// # Examples
///
/// ```
/// use std::collections::BTreeMap;
/// use hemmer_provider_opennebula::tags::match_tags;
/// use hemmer_provider_opennebula::template::Template;
///
/// let tpl = Template::new().with("TEAM", "infra").with("ENV", "prod");
/// let mut required = BTreeMap::new();
/// required.insert("TEAM".to_string(), "infra".to_string());
///
/// assert!(match_tags(&tpl, &required));
/// required.insert("ENV".to_string(), "dev".to_string());
/// assert!(!match_tags(&tpl, &required));
/// ```
pub fn match_tags(template: &Template, required: &BTreeMap<String, String>) -> bool {
    if required.is_empty() {
        return true;
    }

    let tags = pairs_to_map(template);
    required
        .iter()
        .all(|(key, value)| tags.get(key).is_some_and(|found| found == value))
}
