use chrono::Utc;
use rgcheck_config::CheckConfig;
use rgcheck_domain::{LockTieBreak, ResourceGroupExpectation, SubscriptionId};
use rgcheck_driver::{FetchError, Fetcher};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::check::Checker;
use crate::error::ReconcileError;
use crate::report::{
    CheckRequest, FetchStage, RbacSummary, ResourceGroupOutcome, ResourceGroupReport, RunReport,
};

/// Load the expectation file named by `req` and settle which subscription the
/// run targets: the request wins over the file.
pub fn prepare(req: &CheckRequest) -> Result<(CheckConfig, SubscriptionId), ReconcileError> {
    info!("Loading expectations from {:?}", req.config_path);
    let config = rgcheck_config::load_config(&req.config_path)?;
    debug!("Loaded {} resource group expectations", config.resource_groups.len());

    let subscription_id = req
        .subscription_id
        .clone()
        .or_else(|| config.subscription_id.clone())
        .ok_or(ReconcileError::MissingSubscription)?;
    Ok((config, subscription_id))
}

/// Check every configured resource group, one at a time in name order.
///
/// A fetch failure is recorded against its resource group and the run moves
/// on; mismatches are collected, never short-circuited.
pub async fn run(
    config: &CheckConfig,
    subscription_id: &SubscriptionId,
    fetcher: &dyn Fetcher,
    lock_policy: LockTieBreak,
) -> RunReport {
    let run_id = Uuid::new_v4();
    let started_at = Utc::now();
    let checker = Checker::new(subscription_id.clone());
    info!(%run_id, subscription = %subscription_id, fetcher = fetcher.name(), "Starting check run");

    let mut resource_groups = Vec::with_capacity(config.resource_groups.len());
    for (name, expectation) in &config.resource_groups {
        let outcome = check_resource_group(expectation, config, &checker, fetcher, lock_policy).await;
        match &outcome {
            ResourceGroupOutcome::Checked(v) if v.passed() => {
                info!(resource_group = %name, "Resource group matches expectations");
            }
            ResourceGroupOutcome::Checked(v) => {
                for failure in v.failures() {
                    warn!(resource_group = %name, check = %failure.check(), "{}", failure);
                }
            }
            ResourceGroupOutcome::FetchFailed { stage, error, .. } => {
                warn!(resource_group = %name, %stage, "Fetch failed: {}", error);
            }
        }
        resource_groups.push(ResourceGroupReport {
            name: name.clone(),
            outcome,
        });
    }

    let rbac = RbacSummary::from_reports(&resource_groups);
    let report = RunReport {
        run_id,
        started_at,
        finished_at: Utc::now(),
        subscription_id: subscription_id.clone(),
        lock_policy,
        resource_groups,
        rbac,
    };
    info!(
        %run_id,
        passed = report.passed(),
        failed_groups = report.failed_groups(),
        "Check run complete"
    );
    report
}

async fn check_resource_group(
    expectation: &ResourceGroupExpectation,
    config: &CheckConfig,
    checker: &Checker,
    fetcher: &dyn Fetcher,
    lock_policy: LockTieBreak,
) -> ResourceGroupOutcome {
    let name = expectation.name.as_str();
    debug!(resource_group = name, "Fetching resource group state");

    let observed = match fetcher.fetch_resource_group(name).await {
        Ok(o) => o,
        Err(e) => return fetch_failed(FetchStage::ResourceGroup, e),
    };

    let locks = match fetcher.fetch_locks(name).await {
        Ok(l) => l,
        Err(e) => return fetch_failed(FetchStage::Locks, e),
    };
    if locks.len() > 1 {
        let names: Vec<&str> = locks.iter().map(|l| l.name.as_str()).collect();
        warn!(
            resource_group = name,
            ?names,
            policy = ?lock_policy,
            "Multiple locks found; resolving with tie-break policy"
        );
    }
    let observed_lock_level = lock_policy.resolve(&locks);

    let scope = checker.subscription_id().resource_group_scope(name);
    let bindings = match fetcher.fetch_role_assignments(&scope).await {
        Ok(b) => b,
        Err(e) => return fetch_failed(FetchStage::RoleAssignments, e),
    };
    debug!(
        resource_group = name,
        locks = locks.len(),
        role_assignments = bindings.len(),
        "Fetched resource group state"
    );

    ResourceGroupOutcome::Checked(checker.check(
        expectation,
        &observed,
        observed_lock_level,
        &bindings,
        &config.access,
    ))
}

fn fetch_failed(stage: FetchStage, error: FetchError) -> ResourceGroupOutcome {
    ResourceGroupOutcome::FetchFailed {
        stage,
        transient: error.is_transient(),
        error: error.to_string(),
    }
}
