//! The transaction-source boundary. This module owns the contract the
//! engine relies on (§4.1): fetching outgoing transactions for an address,
//! with an in-call retry/backoff policy and a response cache layered on
//! top. The concrete blockchain-explorer integration is an external
//! collaborator; [`RawFetcher`] is the seam a caller plugs one in at.

mod cache;
mod explorer_client;

pub use cache::{default_retry_delays, CachingTransactionSource};
pub use explorer_client::ExplorerClient;

use crate::model::RawTx;
use async_trait::async_trait;
use std::fmt;

/// Failures at the transaction-source boundary. Both are recoverable at the
/// engine boundary: the current node is abandoned and traversal continues.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SourceError {
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("upstream error: {0}")]
    Upstream(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Available,
    Unavailable,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthStatus::Available => write!(f, "available"),
            HealthStatus::Unavailable => write!(f, "unavailable"),
        }
    }
}

/// The capability the engine depends on. A production implementation talks
/// to a real blockchain explorer; tests inject a fake.
#[async_trait]
pub trait TransactionSource: Send + Sync {
    async fn fetch_outgoing(
        &self,
        address: &str,
        start_block: u64,
        limit: u32,
        ascending: bool,
    ) -> Result<Vec<RawTx>, SourceError>;

    async fn health_check(&self) -> HealthStatus;
}

/// The low-level, uncached, unretried call a concrete source plugs in. Kept
/// separate from [`TransactionSource`] so the retry/backoff/cache wrapper in
/// [`cache`] applies uniformly regardless of which explorer backs it.
#[async_trait]
pub trait RawFetcher: Send + Sync {
    async fn fetch_outgoing_once(
        &self,
        address: &str,
        start_block: u64,
        limit: u32,
        ascending: bool,
    ) -> Result<Vec<RawTx>, SourceError>;

    async fn health_check(&self) -> HealthStatus;
}
