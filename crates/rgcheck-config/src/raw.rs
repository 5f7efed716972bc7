use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Raw representation of the expectation file (JSON or YAML).
#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCheckConfig {
    /// Optional; the CLI flag takes precedence.
    #[serde(default, alias = "subscription_id")]
    pub subscription_id: Option<String>,
    #[serde(default, alias = "resource_groups")]
    pub resource_groups: BTreeMap<String, RawResourceGroup>,
    #[serde(default, alias = "expected_principal_id", alias = "expectedPrincipalID")]
    pub expected_principal_id: String,
    #[serde(default, alias = "expected_roles")]
    pub expected_roles: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct RawResourceGroup {
    pub location: String,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    /// `null` and absent both mean "no lock expected".
    #[serde(default)]
    pub lock: Option<RawLock>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct RawLock {
    pub level: String,
}
