use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("invalid lock level: {0}")]
    InvalidLockLevel(String),

    #[error("invalid subscription id: {0}")]
    InvalidSubscriptionId(String),
}
