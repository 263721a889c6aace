//! Projection of OpenNebula quota sets into the flat `quotas` field.
//!
//! The transport hands over quotas as loosely-typed JSON. They are decoded
//! into [`QuotaSet`] and every value is checked before it is written out as a
//! decimal string, grouped by category:
//!
//! | category         | keys                                                    |
//! |------------------|---------------------------------------------------------|
//! | `datastore/<id>` | `images`, `images_used`, `size`, `size_used`            |
//! | `network/<id>`   | `leases`, `leases_used`                                 |
//! | `image/<id>`     | `running_vms`, `running_vms_used`                       |
//! | `vm`             | `cpu`, `memory`, `running_cpu`, `running_memory`, `running_vms`, `system_disk_size`, `vms`, each with a `_used` twin |
//!
//! Fields absent from the input are absent from the output.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

use crate::error::ProjectionError;

/// Output field written by [`flatten_quotas`].
pub const QUOTAS_FIELD: &str = "quotas";

/// Flat quota projection: category to metric to value.
pub type QuotaMap = BTreeMap<String, BTreeMap<String, String>>;

/// A numeric quota value as it may appear on the wire.
///
/// XML-RPC payloads carry numbers as text, so numeric strings are accepted.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum QuotaValue {
    /// Whole number.
    Integer(i64),
    /// Fractional number (CPU quotas).
    Decimal(f64),
    /// Number encoded as text.
    Text(String),
}

impl QuotaValue {
    /// Validate and render as a decimal string.
    fn normalize(&self, path: &str) -> Result<String, ProjectionError> {
        match self {
            Self::Integer(n) if *n < 0 => Err(negative(path, n)),
            Self::Integer(n) => Ok(n.to_string()),
            Self::Decimal(f) if !f.is_finite() => Err(ProjectionError::new(
                QUOTAS_FIELD,
                format!("{} is not a finite number", path),
            )),
            Self::Decimal(f) if *f < 0.0 => Err(negative(path, f)),
            Self::Decimal(f) if *f == 0.0 => Ok("0".to_string()),
            Self::Decimal(f) => Ok(f.to_string()),
            Self::Text(text) => Self::parse(text, path)?.normalize(path),
        }
    }

    /// Validate as a pool identity.
    fn identity(&self, path: &str) -> Result<i64, ProjectionError> {
        match self {
            Self::Integer(n) if *n < 0 => Err(negative(path, n)),
            Self::Integer(n) => Ok(*n),
            Self::Text(text) => match Self::parse(text, path)? {
                Self::Integer(n) => Self::Integer(n).identity(path),
                _ => Err(not_an_id(path, text)),
            },
            Self::Decimal(f) => Err(not_an_id(path, f)),
        }
    }

    fn parse(text: &str, path: &str) -> Result<Self, ProjectionError> {
        let trimmed = text.trim();
        if let Ok(n) = trimmed.parse::<i64>() {
            return Ok(Self::Integer(n));
        }
        match trimmed.parse::<f64>() {
            Ok(f) => Ok(Self::Decimal(f)),
            Err(_) => Err(ProjectionError::new(
                QUOTAS_FIELD,
                format!("{} is not numeric: {:?}", path, text),
            )),
        }
    }
}

fn negative(path: &str, value: impl std::fmt::Display) -> ProjectionError {
    ProjectionError::new(
        QUOTAS_FIELD,
        format!("{} must not be negative, got {}", path, value),
    )
}

fn not_an_id(path: &str, value: impl std::fmt::Debug) -> ProjectionError {
    ProjectionError::new(
        QUOTAS_FIELD,
        format!("{} is not a valid id: {:?}", path, value),
    )
}

/// Per-datastore image and size quotas.
#[derive(Debug, Clone, Deserialize)]
pub struct DatastoreQuota {
    /// Datastore id.
    pub id: QuotaValue,
    /// Image count limit.
    pub images: Option<QuotaValue>,
    /// Images in use.
    pub images_used: Option<QuotaValue>,
    /// Size limit in MB.
    pub size: Option<QuotaValue>,
    /// Size in use in MB.
    pub size_used: Option<QuotaValue>,
}

/// Per-network lease quotas.
#[derive(Debug, Clone, Deserialize)]
pub struct NetworkQuota {
    /// Virtual network id.
    pub id: QuotaValue,
    /// Lease limit.
    pub leases: Option<QuotaValue>,
    /// Leases in use.
    pub leases_used: Option<QuotaValue>,
}

/// Per-image running VM quotas.
#[derive(Debug, Clone, Deserialize)]
pub struct ImageQuota {
    /// Image id.
    pub id: QuotaValue,
    /// Running VM limit.
    pub running_vms: Option<QuotaValue>,
    /// Running VMs using the image.
    pub running_vms_used: Option<QuotaValue>,
}

/// Compute quotas across all VMs of the owner.
#[derive(Debug, Clone, Default, Deserialize)]
#[allow(missing_docs)]
pub struct VmQuota {
    pub cpu: Option<QuotaValue>,
    pub cpu_used: Option<QuotaValue>,
    pub memory: Option<QuotaValue>,
    pub memory_used: Option<QuotaValue>,
    pub running_cpu: Option<QuotaValue>,
    pub running_cpu_used: Option<QuotaValue>,
    pub running_memory: Option<QuotaValue>,
    pub running_memory_used: Option<QuotaValue>,
    pub running_vms: Option<QuotaValue>,
    pub running_vms_used: Option<QuotaValue>,
    pub system_disk_size: Option<QuotaValue>,
    pub system_disk_size_used: Option<QuotaValue>,
    pub vms: Option<QuotaValue>,
    pub vms_used: Option<QuotaValue>,
}

/// Every quota attached to one owner.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QuotaSet {
    /// Datastore quotas.
    #[serde(default)]
    pub datastore: Vec<DatastoreQuota>,
    /// Network quotas.
    #[serde(default)]
    pub network: Vec<NetworkQuota>,
    /// Image quotas.
    #[serde(default)]
    pub image: Vec<ImageQuota>,
    /// VM quotas.
    #[serde(default)]
    pub vm: Option<VmQuota>,
}

impl QuotaSet {
    /// Decode a quota set from its JSON form. `null` is an empty set.
    pub fn from_value(raw: &Value) -> Result<Self, ProjectionError> {
        if raw.is_null() {
            return Ok(Self::default());
        }
        Self::deserialize(raw).map_err(|err| {
            ProjectionError::new(QUOTAS_FIELD, format!("malformed quota structure: {}", err))
        })
    }

    /// Flatten into the `quotas` output field.
    pub fn flatten(&self) -> Result<QuotaMap, ProjectionError> {
        let mut out = QuotaMap::new();

        for ds in &self.datastore {
            let category = format!("datastore/{}", ds.id.identity("datastore.id")?);
            let metrics = metrics(
                &category,
                &[
                    ("images", &ds.images),
                    ("images_used", &ds.images_used),
                    ("size", &ds.size),
                    ("size_used", &ds.size_used),
                ],
            )?;
            insert_category(&mut out, category, metrics)?;
        }

        for net in &self.network {
            let category = format!("network/{}", net.id.identity("network.id")?);
            let metrics = metrics(
                &category,
                &[("leases", &net.leases), ("leases_used", &net.leases_used)],
            )?;
            insert_category(&mut out, category, metrics)?;
        }

        for image in &self.image {
            let category = format!("image/{}", image.id.identity("image.id")?);
            let metrics = metrics(
                &category,
                &[
                    ("running_vms", &image.running_vms),
                    ("running_vms_used", &image.running_vms_used),
                ],
            )?;
            insert_category(&mut out, category, metrics)?;
        }

        if let Some(vm) = &self.vm {
            let metrics = metrics(
                "vm",
                &[
                    ("cpu", &vm.cpu),
                    ("cpu_used", &vm.cpu_used),
                    ("memory", &vm.memory),
                    ("memory_used", &vm.memory_used),
                    ("running_cpu", &vm.running_cpu),
                    ("running_cpu_used", &vm.running_cpu_used),
                    ("running_memory", &vm.running_memory),
                    ("running_memory_used", &vm.running_memory_used),
                    ("running_vms", &vm.running_vms),
                    ("running_vms_used", &vm.running_vms_used),
                    ("system_disk_size", &vm.system_disk_size),
                    ("system_disk_size_used", &vm.system_disk_size_used),
                    ("vms", &vm.vms),
                    ("vms_used", &vm.vms_used),
                ],
            )?;
            insert_category(&mut out, "vm".to_string(), metrics)?;
        }

        Ok(out)
    }
}

fn metrics(
    category: &str,
    fields: &[(&str, &Option<QuotaValue>)],
) -> Result<BTreeMap<String, String>, ProjectionError> {
    let mut out = BTreeMap::new();
    for (name, value) in fields {
        if let Some(value) = value {
            let path = format!("{}.{}", category, name);
            out.insert(name.to_string(), value.normalize(&path)?);
        }
    }
    Ok(out)
}

fn insert_category(
    out: &mut QuotaMap,
    category: String,
    metrics: BTreeMap<String, String>,
) -> Result<(), ProjectionError> {
    if out.contains_key(&category) {
        return Err(ProjectionError::new(
            QUOTAS_FIELD,
            format!("duplicate quota entry {}", category),
        ));
    }
    out.insert(category, metrics);
    Ok(())
}

/// Flatten a raw quota structure into the `quotas` output field.
///
/// Every value must be a non-negative number. OpenNebula's limit sentinels
/// `-1` (use the default quota) and `-2` (unlimited) are negative and are
/// rejected like any other negative value, so a user carrying them fails the
/// projection instead of reporting a misleading limit.
///
/// # Examples
///
/// ```
/// use hemmer_provider_opennebula::quotas::flatten_quotas;
/// use serde_json::json;
///
/// let quotas = flatten_quotas(&json!({
///     "vm": {"vms": 10, "vms_used": "3"}
/// }))
/// .unwrap();
/// assert_eq!(quotas["vm"]["vms"], "10");
/// assert_eq!(quotas["vm"]["vms_used"], "3");
///
/// assert!(flatten_quotas(&json!({"vm": {"vms": -4}})).is_err());
/// ```
pub fn flatten_quotas(raw: &Value) -> Result<QuotaMap, ProjectionError> {
    QuotaSet::from_value(raw)?.flatten()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flatten_full_set() {
        let quotas = flatten_quotas(&json!({
            "datastore": [{"id": 1, "images": 10, "images_used": 2, "size": 1024, "size_used": 100}],
            "network": [{"id": "0", "leases": 5, "leases_used": 1}],
            "image": [{"id": 7, "running_vms": 3, "running_vms_used": 0}],
            "vm": {"cpu": 4.0, "cpu_used": 1.5, "memory": 2048, "memory_used": "512"}
        }))
        .unwrap();

        let categories: Vec<_> = quotas.keys().cloned().collect();
        assert_eq!(categories, vec!["datastore/1", "image/7", "network/0", "vm"]);

        assert_eq!(quotas["datastore/1"]["images"], "10");
        assert_eq!(quotas["datastore/1"]["size_used"], "100");
        assert_eq!(quotas["network/0"]["leases_used"], "1");
        assert_eq!(quotas["image/7"]["running_vms_used"], "0");
        assert_eq!(quotas["vm"]["cpu"], "4");
        assert_eq!(quotas["vm"]["cpu_used"], "1.5");
        assert_eq!(quotas["vm"]["memory_used"], "512");
        assert!(!quotas["vm"].contains_key("vms"));
    }

    #[test]
    fn test_flatten_empty_and_null() {
        assert!(flatten_quotas(&json!({})).unwrap().is_empty());
        assert!(flatten_quotas(&Value::Null).unwrap().is_empty());
    }

    #[test]
    fn test_negative_usage_rejected() {
        let err = flatten_quotas(&json!({
            "datastore": [{"id": 1, "images_used": -2}]
        }))
        .unwrap_err();
        assert_eq!(err.field, "quotas");
        assert_eq!(err.cause, "datastore/1.images_used must not be negative, got -2");
    }

    #[test]
    fn test_limit_sentinels_rejected() {
        let err = flatten_quotas(&json!({"vm": {"vms": -1}})).unwrap_err();
        assert_eq!(err.cause, "vm.vms must not be negative, got -1");

        let err = flatten_quotas(&json!({"network": [{"id": 0, "leases": -2}]})).unwrap_err();
        assert_eq!(err.cause, "network/0.leases must not be negative, got -2");

        assert!(flatten_quotas(&json!({"image": [{"id": 3, "running_vms": "-2"}]})).is_err());
    }

    #[test]
    fn test_negative_decimal_rejected() {
        let err = flatten_quotas(&json!({"vm": {"cpu_used": -0.5}})).unwrap_err();
        assert!(err.cause.contains("vm.cpu_used must not be negative"));
    }

    #[test]
    fn test_negative_text_rejected() {
        assert!(flatten_quotas(&json!({"vm": {"memory": "-1"}})).is_err());
    }

    #[test]
    fn test_type_mismatch_rejected() {
        let err = flatten_quotas(&json!({"vm": {"vms": true}})).unwrap_err();
        assert!(err.cause.starts_with("malformed quota structure"));

        let err = flatten_quotas(&json!({"datastore": {"id": 1}})).unwrap_err();
        assert!(err.cause.starts_with("malformed quota structure"));

        assert!(flatten_quotas(&json!("10 VMs")).is_err());
    }

    #[test]
    fn test_non_numeric_text_rejected() {
        let err = flatten_quotas(&json!({"vm": {"vms": "lots"}})).unwrap_err();
        assert_eq!(err.cause, "vm.vms is not numeric: \"lots\"");
    }

    #[test]
    fn test_bad_identity_rejected() {
        assert!(flatten_quotas(&json!({"network": [{"id": -1}]})).is_err());
        assert!(flatten_quotas(&json!({"network": [{"id": 1.5}]})).is_err());
        assert!(flatten_quotas(&json!({"network": [{"id": "x"}]})).is_err());
    }

    #[test]
    fn test_duplicate_category_rejected() {
        let err = flatten_quotas(&json!({
            "network": [{"id": 1, "leases": 1}, {"id": "1", "leases": 2}]
        }))
        .unwrap_err();
        assert_eq!(err.cause, "duplicate quota entry network/1");
    }

    #[test]
    fn test_missing_identity_rejected() {
        let err = flatten_quotas(&json!({"image": [{"running_vms": 1}]})).unwrap_err();
        assert!(err.cause.starts_with("malformed quota structure"));
    }
}
