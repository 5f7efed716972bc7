use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use rgcheck_domain::{
    parse_resource_group_id, ObservedLock, ObservedResourceGroup, ObservedRoleBinding,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::FetchError;
use crate::fetcher::Fetcher;

/// Captured state of one resource group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotGroup {
    pub group: ObservedResourceGroup,
    #[serde(default)]
    pub locks: Vec<ObservedLock>,
    #[serde(default)]
    pub role_assignments: Vec<ObservedRoleBinding>,
}

/// A JSON document describing resource groups as they were observed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub resource_groups: BTreeMap<String, SnapshotGroup>,
}

/// A fetcher that answers from a [`Snapshot`] instead of the network.
///
/// - Unknown resource groups fail with `NotFound`.
/// - Role-assignment scopes must be resource-group scopes.
/// - Performs no I/O after construction.
#[derive(Debug, Default, Clone)]
pub struct StaticFetcher {
    snapshot: Snapshot,
}

impl StaticFetcher {
    pub fn new(snapshot: Snapshot) -> Self {
        Self { snapshot }
    }

    pub fn from_path(path: &Path) -> Result<Self, FetchError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            FetchError::Internal(format!("read snapshot {}: {}", path.display(), e))
        })?;
        let snapshot: Snapshot = serde_json::from_str(&content).map_err(|e| {
            FetchError::Decode(format!("snapshot {}: {}", path.display(), e))
        })?;
        debug!(
            path = %path.display(),
            groups = snapshot.resource_groups.len(),
            "Loaded snapshot"
        );
        Ok(Self::new(snapshot))
    }

    /// Add or replace one group. Returns `self` for chaining.
    pub fn with_group(
        mut self,
        name: impl Into<String>,
        group: ObservedResourceGroup,
        locks: Vec<ObservedLock>,
        role_assignments: Vec<ObservedRoleBinding>,
    ) -> Self {
        self.snapshot.resource_groups.insert(
            name.into(),
            SnapshotGroup { group, locks, role_assignments },
        );
        self
    }

    fn group(&self, name: &str) -> Result<&SnapshotGroup, FetchError> {
        self.snapshot
            .resource_groups
            .get(name)
            .ok_or_else(|| FetchError::NotFound(format!("resource group '{}' not in snapshot", name)))
    }
}

#[async_trait]
impl Fetcher for StaticFetcher {
    fn name(&self) -> &'static str {
        "snapshot"
    }

    async fn fetch_resource_group(&self, name: &str) -> Result<ObservedResourceGroup, FetchError> {
        debug!(resource_group = name, "StaticFetcher: fetch_resource_group");
        Ok(self.group(name)?.group.clone())
    }

    async fn fetch_locks(&self, resource_group: &str) -> Result<Vec<ObservedLock>, FetchError> {
        debug!(resource_group, "StaticFetcher: fetch_locks");
        Ok(self.group(resource_group)?.locks.clone())
    }

    async fn fetch_role_assignments(
        &self,
        scope: &str,
    ) -> Result<Vec<ObservedRoleBinding>, FetchError> {
        debug!(scope, "StaticFetcher: fetch_role_assignments");
        let parsed = parse_resource_group_id(scope).ok_or_else(|| {
            FetchError::NotFound(format!("scope '{}' is not a resource group scope", scope))
        })?;
        Ok(self.group(parsed.name)?.role_assignments.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rgcheck_domain::LockLevel;
    use std::io::Write;

    fn sample() -> StaticFetcher {
        StaticFetcher::default().with_group(
            "rg1",
            ObservedResourceGroup {
                id:       "/subscriptions/abc/resourceGroups/rg1".into(),
                location: "eastus".into(),
                tags:     BTreeMap::new(),
            },
            vec![ObservedLock { name: "keep".into(), level: LockLevel::CanNotDelete }],
            vec![ObservedRoleBinding {
                principal_id:       "p-1".into(),
                role_definition_id: "reader".into(),
                role_name:          None,
            }],
        )
    }

    #[tokio::test]
    async fn serves_known_group() {
        let f = sample();
        assert_eq!(f.fetch_resource_group("rg1").await.unwrap().location, "eastus");
        assert_eq!(f.fetch_locks("rg1").await.unwrap().len(), 1);
        let bindings = f
            .fetch_role_assignments("/subscriptions/abc/resourceGroups/rg1")
            .await
            .unwrap();
        assert_eq!(bindings[0].principal_id, "p-1");
    }

    #[tokio::test]
    async fn unknown_group_is_not_found() {
        let err = sample().fetch_resource_group("nope").await.unwrap_err();
        assert!(matches!(err, FetchError::NotFound(_)));
    }

    #[tokio::test]
    async fn non_group_scope_is_not_found() {
        let err = sample().fetch_role_assignments("/subscriptions/abc").await.unwrap_err();
        assert!(matches!(err, FetchError::NotFound(_)));
    }

    #[test]
    fn loads_snapshot_file() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(
            file,
            r#"{{
                "resource_groups": {{
                    "rg1": {{
                        "group": {{ "id": "/subscriptions/abc/resourceGroups/rg1", "location": "eastus" }},
                        "locks": [ {{ "name": "freeze", "level": "ReadOnly" }} ]
                    }}
                }}
            }}"#
        )
        .unwrap();

        let f = StaticFetcher::from_path(file.path()).unwrap();
        let group = &f.snapshot.resource_groups["rg1"];
        assert_eq!(group.locks[0].level, LockLevel::ReadOnly);
        assert!(group.role_assignments.is_empty());
    }

    #[tokio::test]
    async fn snapshot_accepts_not_specified_lock_level() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(
            file,
            r#"{{
                "resource_groups": {{
                    "rg1": {{
                        "group": {{ "id": "/subscriptions/abc/resourceGroups/rg1", "location": "eastus" }},
                        "locks": [ {{ "name": "placeholder", "level": "NotSpecified" }} ]
                    }}
                }}
            }}"#
        )
        .unwrap();

        let f = StaticFetcher::from_path(file.path()).unwrap();
        let locks = f.fetch_locks("rg1").await.unwrap();
        assert_eq!(locks[0].level, LockLevel::None);
    }
}
