use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

use crate::error::DomainError;

// ── Identifiers ──────────────────────────────────────────────────────────────

/// Azure subscription the run targets. Threaded explicitly into the checker
/// and the fetchers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(pub String);

impl SubscriptionId {
    pub fn new(s: impl Into<String>) -> Self {
        SubscriptionId(s.into())
    }

    /// Reject values that cannot appear as a path segment of an ARM id.
    pub fn parse(s: &str) -> Result<Self, DomainError> {
        let trimmed = s.trim();
        if trimmed.is_empty() || trimmed.contains('/') {
            return Err(DomainError::InvalidSubscriptionId(s.to_string()));
        }
        Ok(SubscriptionId(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// ARM scope of a resource group inside this subscription.
    pub fn resource_group_scope(&self, name: &str) -> String {
        format!("/subscriptions/{}/resourceGroups/{}", self.0, name)
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The two variable segments of a resource-group ARM id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceGroupPath<'a> {
    pub subscription: &'a str,
    pub name: &'a str,
}

/// Parse `/subscriptions/{s}/resourceGroups/{n}`.
///
/// The literal segments are matched ASCII-case-insensitively since ARM is not
/// consistent about `resourceGroups` vs `resourcegroups`. Anything with extra
/// or missing segments is rejected.
pub fn parse_resource_group_id(id: &str) -> Option<ResourceGroupPath<'_>> {
    let mut segments = id.split('/');
    if segments.next() != Some("") {
        return None;
    }
    let subs = segments.next()?;
    let subscription = segments.next()?;
    let groups = segments.next()?;
    let name = segments.next()?;
    if segments.next().is_some() {
        return None;
    }
    if !subs.eq_ignore_ascii_case("subscriptions") || !groups.eq_ignore_ascii_case("resourceGroups") {
        return None;
    }
    if subscription.is_empty() || name.is_empty() {
        return None;
    }
    Some(ResourceGroupPath { subscription, name })
}

// ── Enums ─────────────────────────────────────────────────────────────────────

/// Deserializes through [`FromStr`], so ARM spellings like `NotSpecified`
/// are accepted wherever a level is read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub enum LockLevel {
    #[default]
    None,
    CanNotDelete,
    ReadOnly,
}

impl LockLevel {
    /// Ordering used by the most-restrictive tie-break.
    pub fn restriction(&self) -> u8 {
        match self {
            LockLevel::None => 0,
            LockLevel::CanNotDelete => 1,
            LockLevel::ReadOnly => 2,
        }
    }
}

impl FromStr for LockLevel {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "None" | "" | "NotSpecified" => Ok(LockLevel::None),
            "CanNotDelete" => Ok(LockLevel::CanNotDelete),
            "ReadOnly" => Ok(LockLevel::ReadOnly),
            other => Err(DomainError::InvalidLockLevel(other.to_string())),
        }
    }
}

impl TryFrom<String> for LockLevel {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl std::fmt::Display for LockLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LockLevel::None => write!(f, "None"),
            LockLevel::CanNotDelete => write!(f, "CanNotDelete"),
            LockLevel::ReadOnly => write!(f, "ReadOnly"),
        }
    }
}

/// How a drained lock sequence collapses into one observed level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockTieBreak {
    /// Last element of the last page wins.
    #[default]
    Last,
    /// `ReadOnly` beats `CanNotDelete` beats `None`.
    MostRestrictive,
}

impl LockTieBreak {
    pub fn resolve(&self, locks: &[ObservedLock]) -> LockLevel {
        match self {
            LockTieBreak::Last => locks.last().map(|l| l.level).unwrap_or_default(),
            LockTieBreak::MostRestrictive => locks
                .iter()
                .map(|l| l.level)
                .max_by_key(LockLevel::restriction)
                .unwrap_or_default(),
        }
    }
}

// ── Expectations ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockExpectation {
    pub level: LockLevel,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceGroupExpectation {
    pub name: String,
    pub location: String,
    pub tags: BTreeMap<String, String>,
    /// Absent means no lock may be present.
    pub lock: Option<LockExpectation>,
}

impl ResourceGroupExpectation {
    pub fn expected_lock_level(&self) -> LockLevel {
        self.lock.as_ref().map(|l| l.level).unwrap_or_default()
    }
}

/// Principal and role names that must be bound on every resource group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectedAccess {
    pub principal_id: String,
    pub allowed_role_names: BTreeSet<String>,
}

// ── Observations ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedResourceGroup {
    pub id: String,
    pub location: String,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedLock {
    #[serde(default)]
    pub name: String,
    pub level: LockLevel,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedRoleBinding {
    pub principal_id: String,
    pub role_definition_id: String,
    /// Display name of the role definition, when the fetcher resolved it.
    #[serde(default)]
    pub role_name: Option<String>,
}

impl ObservedRoleBinding {
    /// True if the role definition id, or the resolved role name, contains
    /// `role` ignoring case.
    pub fn grants_role(&self, role: &str) -> bool {
        let needle = role.to_lowercase();
        if self.role_definition_id.to_lowercase().contains(&needle) {
            return true;
        }
        self.role_name
            .as_deref()
            .is_some_and(|n| n.to_lowercase().contains(&needle))
    }
}
