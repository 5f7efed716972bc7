pub mod azure;
pub mod error;
pub mod fetcher;
pub mod snapshot;

pub use azure::{AzureFetcher, AzureFetcherConfig};
pub use error::FetchError;
pub use fetcher::Fetcher;
pub use snapshot::{Snapshot, SnapshotGroup, StaticFetcher};
