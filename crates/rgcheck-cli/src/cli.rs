use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "rgcheck",
    about = "Validate Azure resource groups against an expected-state file",
    version
)]
pub struct Cli {
    /// Log line format on stderr.
    #[arg(long, value_enum, default_value = "text", env = "RGCHECK_LOG_FORMAT", global = true)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch live state and compare it with the expectation file.
    Check(CheckArgs),

    /// Load and validate the expectation file without calling Azure.
    Validate {
        /// Path to the expectation file (.json, .yml or .yaml).
        config: PathBuf,
    },
}

#[derive(Debug, Args)]
pub struct CheckArgs {
    /// Path to the expectation file (.json, .yml or .yaml).
    pub config: PathBuf,

    /// Subscription to check. Overrides `subscriptionId` in the config file.
    #[arg(long, env = "AZURE_SUBSCRIPTION_ID")]
    pub subscription_id: Option<String>,

    /// Azure tenant ID.
    #[arg(long, env = "AZURE_TENANT_ID")]
    pub tenant_id: Option<String>,

    /// Service principal client ID.
    #[arg(long, env = "AZURE_CLIENT_ID")]
    pub client_id: Option<String>,

    /// Service principal client secret.
    #[arg(long, env = "AZURE_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: Option<String>,

    /// Answer from a captured JSON snapshot instead of calling Azure.
    #[arg(long)]
    pub snapshot: Option<PathBuf>,

    /// Report format on stdout.
    #[arg(long, value_enum, default_value = "text")]
    pub output: OutputFormat,

    /// How several locks on one resource group collapse into one level.
    #[arg(long, value_enum, default_value = "last")]
    pub lock_policy: LockPolicyArg,

    /// Resolve role definition ids to role names before matching.
    #[arg(long)]
    pub resolve_role_names: bool,

    /// Per-request timeout for Azure calls, in seconds.
    #[arg(long, default_value_t = 30)]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LockPolicyArg {
    Last,
    MostRestrictive,
}

impl LockPolicyArg {
    pub fn policy(self) -> rgcheck_domain::LockTieBreak {
        match self {
            LockPolicyArg::Last => rgcheck_domain::LockTieBreak::Last,
            LockPolicyArg::MostRestrictive => rgcheck_domain::LockTieBreak::MostRestrictive,
        }
    }
}
