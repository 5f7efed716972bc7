use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use rgcheck_domain::SubscriptionId;
use rgcheck_driver::{AzureFetcher, AzureFetcherConfig, Fetcher, StaticFetcher};
use rgcheck_reconciler::{prepare, run, CheckRequest, RunReport};
use tracing::info;

use crate::cli::{CheckArgs, OutputFormat};
use crate::output;

// ── Check ─────────────────────────────────────────────────────────────────────

/// Run one check pass. Returns whether every resource group passed.
pub async fn check(args: CheckArgs) -> Result<bool> {
    let subscription_id = args
        .subscription_id
        .as_deref()
        .map(SubscriptionId::parse)
        .transpose()
        .context("Invalid --subscription-id")?;

    let req = CheckRequest {
        config_path: args.config.clone(),
        subscription_id,
        lock_policy: args.lock_policy.policy(),
    };
    let (config, subscription_id) = prepare(&req)
        .with_context(|| format!("Failed to prepare check of {}", args.config.display()))?;

    let fetcher: Box<dyn Fetcher> = match &args.snapshot {
        Some(path) => {
            info!(path = %path.display(), "Answering from snapshot instead of Azure");
            Box::new(
                StaticFetcher::from_path(path)
                    .with_context(|| format!("Failed to load snapshot {}", path.display()))?,
            )
        }
        None => {
            let mut fetcher_config = AzureFetcherConfig::new(subscription_id.clone());
            fetcher_config.tenant_id = args.tenant_id;
            fetcher_config.client_id = args.client_id;
            fetcher_config.client_secret = args.client_secret;
            fetcher_config.request_timeout = Duration::from_secs(args.timeout_secs);
            fetcher_config.resolve_role_names = args.resolve_role_names;
            Box::new(AzureFetcher::new(fetcher_config).context("Failed to initialise Azure fetcher")?)
        }
    };

    let report = run(&config, &subscription_id, fetcher.as_ref(), req.lock_policy).await;

    print!("{}", render(&report, args.output)?);
    Ok(report.passed())
}

fn render(report: &RunReport, format: OutputFormat) -> Result<String> {
    Ok(match format {
        OutputFormat::Text => output::render_report(report),
        OutputFormat::Json => format!("{}\n", serde_json::to_string_pretty(report)?),
    })
}

/// Process exit status: 0 when everything passed, 1 on mismatches, 2 on errors.
pub fn exit_status(result: &Result<bool>) -> u8 {
    match result {
        Ok(true) => 0,
        Ok(false) => 1,
        Err(_) => 2,
    }
}

// ── Validate ──────────────────────────────────────────────────────────────────

pub fn validate(config_path: PathBuf) -> Result<()> {
    let config = rgcheck_config::load_config(&config_path)
        .with_context(|| format!("Invalid expectation file {}", config_path.display()))?;
    print!("{}", output::render_config_summary(&config));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::LockPolicyArg;
    use serde_json::Value;
    use std::io::Write;

    fn demos() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../demos")
    }

    fn snapshot_args(config: PathBuf) -> CheckArgs {
        CheckArgs {
            config,
            subscription_id:    None,
            tenant_id:          None,
            client_id:          None,
            client_secret:      None,
            snapshot:           Some(demos().join("snapshot.json")),
            output:             OutputFormat::Json,
            lock_policy:        LockPolicyArg::Last,
            resolve_role_names: false,
            timeout_secs:       30,
        }
    }

    fn config_file(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, "{}", content).unwrap();
        file
    }

    #[tokio::test]
    async fn demo_snapshot_run_fails_with_status_one() {
        let result = check(snapshot_args(demos().join("expectations.json"))).await;
        assert_eq!(exit_status(&result), 1, "{:?}", result);
    }

    #[tokio::test]
    async fn matching_snapshot_run_passes_with_status_zero() {
        let file = config_file(
            r#"{
                "subscriptionId": "00000000-0000-0000-0000-0000000000aa",
                "resourceGroups": {
                    "rg-payments-prod": {
                        "location": "eastus",
                        "tags": { "env": "prod" },
                        "lock": { "level": "CanNotDelete" }
                    }
                },
                "expectedPrincipalId": "9f1c2d3e-0000-4000-8000-000000000001",
                "expectedRoles": ["Reader"]
            }"#,
        );
        let result = check(snapshot_args(file.path().to_path_buf())).await;
        assert_eq!(exit_status(&result), 0, "{:?}", result);
    }

    #[tokio::test]
    async fn missing_subscription_is_status_two() {
        let file = config_file(
            r#"{ "resourceGroups": {}, "expectedPrincipalId": "p-1", "expectedRoles": ["Reader"] }"#,
        );
        let result = check(snapshot_args(file.path().to_path_buf())).await;
        assert!(result.is_err());
        assert_eq!(exit_status(&result), 2);
    }

    #[tokio::test]
    async fn missing_snapshot_file_is_status_two() {
        let mut args = snapshot_args(demos().join("expectations.json"));
        args.snapshot = Some(demos().join("no-such-snapshot.json"));
        assert_eq!(exit_status(&check(args).await), 2);
    }

    #[tokio::test]
    async fn json_output_tags_each_outcome() {
        let file = config_file(
            r#"{
                "subscriptionId": "00000000-0000-0000-0000-0000000000aa",
                "resourceGroups": {
                    "rg-payments-dev": { "location": "eastus", "tags": { "env": "dev" } },
                    "rg-gone": { "location": "eastus" }
                },
                "expectedPrincipalId": "9f1c2d3e-0000-4000-8000-000000000001",
                "expectedRoles": ["Reader"]
            }"#,
        );
        let req = CheckRequest {
            config_path:     file.path().to_path_buf(),
            subscription_id: None,
            lock_policy:     LockPolicyArg::Last.policy(),
        };
        let (config, sub) = prepare(&req).unwrap();
        let fetcher = StaticFetcher::from_path(&demos().join("snapshot.json")).unwrap();
        let report = run(&config, &sub, &fetcher, req.lock_policy).await;

        let json: Value = serde_json::from_str(&render(&report, OutputFormat::Json).unwrap()).unwrap();
        let groups = json["resource_groups"].as_array().unwrap();
        assert_eq!(groups[0]["name"], "rg-gone");
        assert_eq!(groups[0]["outcome"]["status"], "fetch_failed");
        assert_eq!(groups[0]["outcome"]["stage"], "resource_group");
        assert_eq!(groups[1]["name"], "rg-payments-dev");
        assert_eq!(groups[1]["outcome"]["status"], "checked");
        assert_eq!(groups[1]["outcome"]["resource_group"], "rg-payments-dev");

        let failures: Vec<&str> = groups[1]["outcome"]["checks"]
            .as_array()
            .unwrap()
            .iter()
            .flat_map(|c| c["failures"].as_array().unwrap())
            .map(|f| f["kind"].as_str().unwrap())
            .collect();
        assert_eq!(failures, vec!["tag_value_mismatch", "lock_mismatch", "missing_role_assignment"]);
        assert_eq!(json["rbac"]["passed"], false);
        assert_eq!(json["lock_policy"], "last");
    }
}
