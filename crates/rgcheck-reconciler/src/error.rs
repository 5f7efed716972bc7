use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("config error: {0}")]
    Config(#[from] rgcheck_config::ConfigError),

    #[error("no subscription id: pass --subscription-id or set subscriptionId in the config file")]
    MissingSubscription,
}
