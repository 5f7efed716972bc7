use std::path::PathBuf;

use chrono::{DateTime, Utc};
use rgcheck_domain::{LockLevel, LockTieBreak, SubscriptionId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckRequest {
    pub config_path: PathBuf,
    /// Overrides the subscription named in the config file.
    pub subscription_id: Option<SubscriptionId>,
    pub lock_policy: LockTieBreak,
}

/// The five independent sub-checks, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    Location,
    IdShape,
    Tags,
    Lock,
    Rbac,
}

impl CheckKind {
    pub const ALL: [CheckKind; 5] = [
        CheckKind::Location,
        CheckKind::IdShape,
        CheckKind::Tags,
        CheckKind::Lock,
        CheckKind::Rbac,
    ];
}

impl std::fmt::Display for CheckKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckKind::Location => write!(f, "location"),
            CheckKind::IdShape => write!(f, "id"),
            CheckKind::Tags => write!(f, "tags"),
            CheckKind::Lock => write!(f, "lock"),
            CheckKind::Rbac => write!(f, "rbac"),
        }
    }
}

/// One discrepancy between expected and observed state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Mismatch {
    LocationMismatch { expected: String, actual: String },
    MalformedId { id: String },
    IdScopeMismatch { id: String, expected: String },
    MissingTag { key: String, expected: String },
    TagValueMismatch { key: String, expected: String, actual: String },
    LockMismatch { expected: LockLevel, actual: LockLevel },
    MissingRoleAssignment { principal_id: String, allowed_roles: Vec<String> },
}

impl Mismatch {
    /// The sub-check that produced this mismatch.
    pub fn check(&self) -> CheckKind {
        match self {
            Mismatch::LocationMismatch { .. } => CheckKind::Location,
            Mismatch::MalformedId { .. } | Mismatch::IdScopeMismatch { .. } => CheckKind::IdShape,
            Mismatch::MissingTag { .. } | Mismatch::TagValueMismatch { .. } => CheckKind::Tags,
            Mismatch::LockMismatch { .. } => CheckKind::Lock,
            Mismatch::MissingRoleAssignment { .. } => CheckKind::Rbac,
        }
    }
}

impl std::fmt::Display for Mismatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mismatch::LocationMismatch { expected, actual } => {
                write!(f, "location: expected '{}', found '{}'", expected, actual)
            }
            Mismatch::MalformedId { id } => {
                write!(f, "id: '{}' is not /subscriptions/{{id}}/resourceGroups/{{name}}", id)
            }
            Mismatch::IdScopeMismatch { id, expected } => {
                write!(f, "id: expected '{}', found '{}'", expected, id)
            }
            Mismatch::MissingTag { key, expected } => {
                write!(f, "tags: missing '{}' (expected '{}')", key, expected)
            }
            Mismatch::TagValueMismatch { key, expected, actual } => {
                write!(f, "tags: '{}' expected '{}', found '{}'", key, expected, actual)
            }
            Mismatch::LockMismatch { expected, actual } => {
                write!(f, "lock: expected {}, found {}", expected, actual)
            }
            Mismatch::MissingRoleAssignment { principal_id, allowed_roles } => write!(
                f,
                "rbac: principal '{}' holds none of [{}]",
                principal_id,
                allowed_roles.join(", ")
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubCheckResult {
    pub check: CheckKind,
    pub failures: Vec<Mismatch>,
}

impl SubCheckResult {
    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceGroupVerdict {
    pub resource_group: String,
    /// One entry per [`CheckKind`], in [`CheckKind::ALL`] order.
    pub checks: Vec<SubCheckResult>,
}

impl ResourceGroupVerdict {
    pub fn passed(&self) -> bool {
        self.checks.iter().all(SubCheckResult::passed)
    }

    pub fn result(&self, check: CheckKind) -> Option<&SubCheckResult> {
        self.checks.iter().find(|c| c.check == check)
    }

    pub fn check_passed(&self, check: CheckKind) -> bool {
        self.result(check).is_some_and(SubCheckResult::passed)
    }

    pub fn failures(&self) -> impl Iterator<Item = &Mismatch> {
        self.checks.iter().flat_map(|c| c.failures.iter())
    }
}

/// Which collaborator call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchStage {
    ResourceGroup,
    Locks,
    RoleAssignments,
}

impl std::fmt::Display for FetchStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchStage::ResourceGroup => write!(f, "resource group"),
            FetchStage::Locks => write!(f, "locks"),
            FetchStage::RoleAssignments => write!(f, "role assignments"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ResourceGroupOutcome {
    Checked(ResourceGroupVerdict),
    FetchFailed {
        stage: FetchStage,
        error: String,
        transient: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceGroupReport {
    pub name: String,
    pub outcome: ResourceGroupOutcome,
}

impl ResourceGroupReport {
    pub fn passed(&self) -> bool {
        match &self.outcome {
            ResourceGroupOutcome::Checked(v) => v.passed(),
            ResourceGroupOutcome::FetchFailed { .. } => false,
        }
    }

    /// False when the RBAC sub-check failed or never ran.
    pub fn rbac_passed(&self) -> bool {
        match &self.outcome {
            ResourceGroupOutcome::Checked(v) => v.check_passed(CheckKind::Rbac),
            ResourceGroupOutcome::FetchFailed { .. } => false,
        }
    }
}

/// Aggregate RBAC verdict across every resource group in the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RbacSummary {
    pub passed: bool,
    pub failing: Vec<String>,
}

impl RbacSummary {
    pub fn from_reports(reports: &[ResourceGroupReport]) -> Self {
        let failing: Vec<String> = reports
            .iter()
            .filter(|r| !r.rbac_passed())
            .map(|r| r.name.clone())
            .collect();
        Self { passed: failing.is_empty(), failing }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub subscription_id: SubscriptionId,
    pub lock_policy: LockTieBreak,
    pub resource_groups: Vec<ResourceGroupReport>,
    pub rbac: RbacSummary,
}

impl RunReport {
    pub fn passed(&self) -> bool {
        self.resource_groups.iter().all(ResourceGroupReport::passed) && self.rbac.passed
    }

    pub fn failed_groups(&self) -> usize {
        self.resource_groups.iter().filter(|r| !r.passed()).count()
    }
}
