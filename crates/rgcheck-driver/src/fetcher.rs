use async_trait::async_trait;
use rgcheck_domain::{ObservedLock, ObservedResourceGroup, ObservedRoleBinding};

use crate::error::FetchError;

/// Read-only access to the live state of resource groups.
///
/// Implementations never modify cloud state. List calls drain every page
/// before returning.
#[async_trait]
pub trait Fetcher: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    async fn fetch_resource_group(&self, name: &str) -> Result<ObservedResourceGroup, FetchError>;

    /// Every management lock listed at the resource-group level, in the order
    /// the provider returned them.
    async fn fetch_locks(&self, resource_group: &str) -> Result<Vec<ObservedLock>, FetchError>;

    /// Role assignments visible at `scope`, e.g.
    /// `/subscriptions/{s}/resourceGroups/{n}`.
    async fn fetch_role_assignments(
        &self,
        scope: &str,
    ) -> Result<Vec<ObservedRoleBinding>, FetchError>;
}
