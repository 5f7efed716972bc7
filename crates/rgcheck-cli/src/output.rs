use rgcheck_config::CheckConfig;
use rgcheck_reconciler::{ResourceGroupOutcome, RunReport};

/// Render a run report as human-readable text.
pub fn render_report(report: &RunReport) -> String {
    let mut out = format!(
        "Subscription {} (run {}, lock policy {:?})\n",
        report.subscription_id, report.run_id, report.lock_policy
    );
    if report.resource_groups.is_empty() {
        out.push_str("No resource groups configured.\n");
    }

    for rg in &report.resource_groups {
        let status = if rg.passed() { "PASS" } else { "FAIL" };
        out.push_str(&format!("{} {}\n", status, rg.name));
        match &rg.outcome {
            ResourceGroupOutcome::Checked(verdict) => {
                for failure in verdict.failures() {
                    out.push_str(&format!("  - {}\n", failure));
                }
            }
            ResourceGroupOutcome::FetchFailed { stage, error, transient } => {
                out.push_str(&format!(
                    "  ! {} fetch failed{}: {}\n",
                    stage,
                    if *transient { " (transient)" } else { "" },
                    error
                ));
            }
        }
    }

    if report.rbac.passed {
        out.push_str("RBAC: PASS\n");
    } else {
        out.push_str(&format!("RBAC: FAIL ({})\n", report.rbac.failing.join(", ")));
    }

    let failed = report.failed_groups();
    if failed == 0 {
        out.push_str(&format!(
            "All {} resource group(s) match expectations.\n",
            report.resource_groups.len()
        ));
    } else {
        out.push_str(&format!(
            "{} of {} resource group(s) failed.\n",
            failed,
            report.resource_groups.len()
        ));
    }
    out
}

/// Render what a loaded expectation file will check.
pub fn render_config_summary(config: &CheckConfig) -> String {
    let mut out = String::new();
    match &config.subscription_id {
        Some(sub) => out.push_str(&format!("Subscription: {}\n", sub)),
        None => out.push_str("Subscription: (from --subscription-id)\n"),
    }
    out.push_str(&format!(
        "Principal: {} with one of [{}]\n",
        config.access.principal_id,
        config
            .access
            .allowed_role_names
            .iter()
            .cloned()
            .collect::<Vec<_>>()
            .join(", ")
    ));
    for (name, rg) in &config.resource_groups {
        out.push_str(&format!("Resource group: {} ({})\n", name, rg.location));
        for (k, v) in &rg.tags {
            out.push_str(&format!("  tag {} = {}\n", k, v));
        }
        out.push_str(&format!("  lock: {}\n", rg.expected_lock_level()));
    }
    out
}
