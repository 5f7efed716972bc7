use std::collections::BTreeMap;

use rgcheck_domain::{
    parse_resource_group_id, ExpectedAccess, LockLevel, ObservedResourceGroup,
    ObservedRoleBinding, ResourceGroupExpectation, SubscriptionId,
};

use crate::report::{CheckKind, Mismatch, ResourceGroupVerdict, SubCheckResult};

/// Compares one resource group's expected state with what was observed.
///
/// Pure and synchronous: every sub-check runs, failures are collected, and
/// nothing is fetched.
#[derive(Debug, Clone)]
pub struct Checker {
    subscription_id: SubscriptionId,
}

impl Checker {
    pub fn new(subscription_id: SubscriptionId) -> Self {
        Self { subscription_id }
    }

    pub fn subscription_id(&self) -> &SubscriptionId {
        &self.subscription_id
    }

    pub fn check(
        &self,
        expectation: &ResourceGroupExpectation,
        observed: &ObservedResourceGroup,
        observed_lock_level: LockLevel,
        access_bindings: &[ObservedRoleBinding],
        access: &ExpectedAccess,
    ) -> ResourceGroupVerdict {
        let checks = CheckKind::ALL
            .iter()
            .map(|&check| {
                let failures = match check {
                    CheckKind::Location => check_location(&expectation.location, &observed.location),
                    CheckKind::IdShape => self.check_id(&expectation.name, &observed.id),
                    CheckKind::Tags => check_tags(&expectation.tags, &observed.tags),
                    CheckKind::Lock => {
                        check_lock(expectation.expected_lock_level(), observed_lock_level)
                    }
                    CheckKind::Rbac => check_rbac(access_bindings, access),
                };
                SubCheckResult { check, failures }
            })
            .collect();

        ResourceGroupVerdict {
            resource_group: expectation.name.clone(),
            checks,
        }
    }

    fn check_id(&self, name: &str, id: &str) -> Vec<Mismatch> {
        let Some(parsed) = parse_resource_group_id(id) else {
            return vec![Mismatch::MalformedId { id: id.to_string() }];
        };
        let same_subscription = parsed
            .subscription
            .eq_ignore_ascii_case(self.subscription_id.as_str());
        let same_name = parsed.name.eq_ignore_ascii_case(name);
        if same_subscription && same_name {
            return Vec::new();
        }
        vec![Mismatch::IdScopeMismatch {
            id: id.to_string(),
            expected: self.subscription_id.resource_group_scope(name),
        }]
    }
}

/// Exact string equality; no case folding.
pub fn check_location(expected: &str, actual: &str) -> Vec<Mismatch> {
    if expected == actual {
        return Vec::new();
    }
    vec![Mismatch::LocationMismatch {
        expected: expected.to_string(),
        actual: actual.to_string(),
    }]
}

/// Every expected tag must be present with the same value. Extra observed
/// tags are ignored.
pub fn check_tags(
    expected: &BTreeMap<String, String>,
    observed: &BTreeMap<String, String>,
) -> Vec<Mismatch> {
    expected
        .iter()
        .filter_map(|(key, want)| match observed.get(key) {
            None => Some(Mismatch::MissingTag {
                key: key.clone(),
                expected: want.clone(),
            }),
            Some(got) if got != want => Some(Mismatch::TagValueMismatch {
                key: key.clone(),
                expected: want.clone(),
                actual: got.clone(),
            }),
            Some(_) => None,
        })
        .collect()
}

pub fn check_lock(expected: LockLevel, actual: LockLevel) -> Vec<Mismatch> {
    if expected == actual {
        return Vec::new();
    }
    vec![Mismatch::LockMismatch { expected, actual }]
}

/// At least one binding for the expected principal must grant one of the
/// allowed roles.
pub fn check_rbac(bindings: &[ObservedRoleBinding], access: &ExpectedAccess) -> Vec<Mismatch> {
    let granted = bindings
        .iter()
        .filter(|b| b.principal_id == access.principal_id)
        .any(|b| access.allowed_role_names.iter().any(|role| b.grants_role(role)));
    if granted {
        return Vec::new();
    }
    vec![Mismatch::MissingRoleAssignment {
        principal_id: access.principal_id.clone(),
        allowed_roles: access.allowed_role_names.iter().cloned().collect(),
    }]
}
