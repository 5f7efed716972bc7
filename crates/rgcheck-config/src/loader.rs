use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use rgcheck_domain::{
    ExpectedAccess, LockExpectation, LockLevel, ResourceGroupExpectation, SubscriptionId,
};
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::ConfigError;
use crate::raw::{RawCheckConfig, RawLock, RawResourceGroup};

/// Everything a run needs to know about the expected state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckConfig {
    /// Subscription named in the file, if any.
    pub subscription_id: Option<SubscriptionId>,
    /// Keyed by resource-group name; iteration order is the report order.
    pub resource_groups: BTreeMap<String, ResourceGroupExpectation>,
    pub access: ExpectedAccess,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Yaml,
}

impl ConfigFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Some(ConfigFormat::Json),
            Some("yml") | Some("yaml") => Some(ConfigFormat::Yaml),
            _ => None,
        }
    }
}

/// Read and validate the expectation file at `path`.
///
/// The format is chosen from the extension: `.json`, `.yml` or `.yaml`.
pub fn load_config(path: &Path) -> Result<CheckConfig, ConfigError> {
    let format = ConfigFormat::from_path(path).ok_or_else(|| ConfigError::UnsupportedFormat {
        path: path.display().to_string(),
    })?;
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    debug!("Loading expectations from {}", path.display());
    parse_config(&content, format, &path.display().to_string())
}

/// Parse and validate an expectation document already in memory. `origin`
/// only labels errors.
pub fn parse_config(
    content: &str,
    format: ConfigFormat,
    origin: &str,
) -> Result<CheckConfig, ConfigError> {
    let raw: RawCheckConfig = match format {
        ConfigFormat::Json => serde_json::from_str(content).map_err(|e| ConfigError::JsonParse {
            path: origin.to_string(),
            source: e,
        })?,
        ConfigFormat::Yaml => serde_yaml::from_str(content).map_err(|e| ConfigError::YamlParse {
            path: origin.to_string(),
            source: e,
        })?,
    };
    convert_config(raw, origin)
}

fn convert_config(raw: RawCheckConfig, path: &str) -> Result<CheckConfig, ConfigError> {
    let subscription_id = raw
        .subscription_id
        .as_deref()
        .map(SubscriptionId::parse)
        .transpose()?;

    let access = convert_access(raw.expected_principal_id, raw.expected_roles, path)?;

    if raw.resource_groups.is_empty() {
        warn!(path, "no resource groups configured; only an empty report will be produced");
    }

    let resource_groups = raw
        .resource_groups
        .into_iter()
        .map(|(name, rg)| -> Result<_, ConfigError> {
            let expectation = convert_resource_group(&name, rg, path)?;
            Ok((name, expectation))
        })
        .collect::<Result<BTreeMap<_, _>, _>>()?;

    Ok(CheckConfig { subscription_id, resource_groups, access })
}

fn convert_access(
    principal_id: String,
    roles: Vec<String>,
    path: &str,
) -> Result<ExpectedAccess, ConfigError> {
    let principal_id = principal_id.trim().to_string();
    if principal_id.is_empty() {
        return Err(conversion(path, "expectedPrincipalId must not be empty"));
    }
    if roles.is_empty() {
        return Err(conversion(path, "expectedRoles must list at least one role"));
    }
    let mut allowed_role_names = BTreeSet::new();
    for role in roles {
        let role = role.trim();
        if role.is_empty() {
            return Err(conversion(path, "expectedRoles contains a blank role name"));
        }
        allowed_role_names.insert(role.to_string());
    }
    Ok(ExpectedAccess { principal_id, allowed_role_names })
}

fn convert_resource_group(
    name: &str,
    raw: RawResourceGroup,
    path: &str,
) -> Result<ResourceGroupExpectation, ConfigError> {
    if name.trim().is_empty() {
        return Err(conversion(path, "resource group name must not be empty"));
    }
    if raw.location.trim().is_empty() {
        return Err(conversion(
            path,
            &format!("resource group '{}' has an empty location", name),
        ));
    }
    let lock = raw.lock.map(|l| convert_lock(name, l, path)).transpose()?;

    Ok(ResourceGroupExpectation {
        name: name.to_string(),
        location: raw.location,
        tags: raw.tags,
        lock,
    })
}

fn convert_lock(name: &str, raw: RawLock, path: &str) -> Result<LockExpectation, ConfigError> {
    let level = raw.level.parse::<LockLevel>().map_err(|_| {
        conversion(
            path,
            &format!("unknown lock level '{}' for resource group '{}'", raw.level, name),
        )
    })?;
    Ok(LockExpectation { level })
}

fn conversion(path: &str, message: &str) -> ConfigError {
    ConfigError::Conversion {
        path: path.to_string(),
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"{
        "resourceGroups": { "rg1": { "location": "eastus" } },
        "expectedPrincipalId": "p-1",
        "expectedRoles": ["Reader"]
    }"#;

    #[test]
    fn minimal_json() {
        let cfg = parse_config(MINIMAL, ConfigFormat::Json, "inline").unwrap();
        assert!(cfg.subscription_id.is_none());
        let rg = &cfg.resource_groups["rg1"];
        assert_eq!(rg.name, "rg1");
        assert!(rg.tags.is_empty());
        assert!(rg.lock.is_none());
        assert_eq!(cfg.access.principal_id, "p-1");
    }

    #[test]
    fn null_lock_means_no_lock() {
        let doc = r#"{
            "resourceGroups": { "rg1": { "location": "eastus", "lock": null } },
            "expectedPrincipalId": "p-1",
            "expectedRoles": ["Reader"]
        }"#;
        let cfg = parse_config(doc, ConfigFormat::Json, "inline").unwrap();
        assert!(cfg.resource_groups["rg1"].lock.is_none());
    }

    #[test]
    fn snake_case_keys_accepted() {
        let doc = "subscription_id: abc\nresource_groups:\n  rg1:\n    location: westeurope\nexpected_principal_id: p-1\nexpected_roles: [Owner]\n";
        let cfg = parse_config(doc, ConfigFormat::Yaml, "inline").unwrap();
        assert_eq!(cfg.subscription_id, Some(SubscriptionId::new("abc")));
        assert_eq!(cfg.resource_groups["rg1"].location, "westeurope");
    }

    #[test]
    fn unknown_lock_level_rejected() {
        let doc = r#"{
            "resourceGroups": { "rg1": { "location": "eastus", "lock": { "level": "Frozen" } } },
            "expectedPrincipalId": "p-1",
            "expectedRoles": ["Reader"]
        }"#;
        let err = parse_config(doc, ConfigFormat::Json, "inline").unwrap_err();
        assert!(err.to_string().contains("Frozen"), "got: {}", err);
    }

    #[test]
    fn empty_principal_rejected() {
        let doc = r#"{ "resourceGroups": {}, "expectedPrincipalId": "  ", "expectedRoles": ["Reader"] }"#;
        let err = parse_config(doc, ConfigFormat::Json, "inline").unwrap_err();
        assert!(matches!(err, ConfigError::Conversion { .. }), "got: {}", err);
    }

    #[test]
    fn empty_roles_rejected() {
        let doc = r#"{ "resourceGroups": {}, "expectedPrincipalId": "p-1", "expectedRoles": [] }"#;
        assert!(parse_config(doc, ConfigFormat::Json, "inline").is_err());
    }

    #[test]
    fn empty_location_rejected() {
        let doc = r#"{
            "resourceGroups": { "rg1": { "location": "" } },
            "expectedPrincipalId": "p-1",
            "expectedRoles": ["Reader"]
        }"#;
        assert!(parse_config(doc, ConfigFormat::Json, "inline").is_err());
    }

    #[test]
    fn malformed_json_is_parse_error() {
        let err = parse_config("{ nope", ConfigFormat::Json, "inline").unwrap_err();
        assert!(matches!(err, ConfigError::JsonParse { .. }));
    }

    #[test]
    fn format_from_extension() {
        assert_eq!(ConfigFormat::from_path(Path::new("a.json")), Some(ConfigFormat::Json));
        assert_eq!(ConfigFormat::from_path(Path::new("a.yml")), Some(ConfigFormat::Yaml));
        assert_eq!(ConfigFormat::from_path(Path::new("a.yaml")), Some(ConfigFormat::Yaml));
        assert_eq!(ConfigFormat::from_path(Path::new("a.toml")), None);
    }
}
