use super::{HealthStatus, RawFetcher, SourceError, TransactionSource};
use crate::model::RawTx;
use async_trait::async_trait;
use moka::future::Cache;
use std::time::Duration;
use tokio::time::sleep;

/// Wraps a [`RawFetcher`] with the retry-with-backoff and TTL-cached-response
/// behavior the engine depends on (§4.1). A cache hit is indistinguishable
/// from a fresh call except for latency.
pub struct CachingTransactionSource<F> {
    fetcher: F,
    cache: Cache<String, Vec<RawTx>>,
    retry_delays: Vec<Duration>,
}

impl<F: RawFetcher> CachingTransactionSource<F> {
    pub fn new(fetcher: F, cache_ttl: Duration, retry_delays: Vec<Duration>) -> Self {
        let cache = Cache::builder().time_to_live(cache_ttl).build();
        Self {
            fetcher,
            cache,
            retry_delays,
        }
    }

    fn cache_key(address: &str, start_block: u64, limit: u32, ascending: bool) -> String {
        // Sorted, credential-free parameters: the address, block cursor,
        // page size, and sort order fully determine the response.
        format!(
            "fetch_outgoing:address={address}&ascending={ascending}&limit={limit}&start_block={start_block}"
        )
    }
}

#[async_trait]
impl<F: RawFetcher + Send + Sync> TransactionSource for CachingTransactionSource<F> {
    async fn fetch_outgoing(
        &self,
        address: &str,
        start_block: u64,
        limit: u32,
        ascending: bool,
    ) -> Result<Vec<RawTx>, SourceError> {
        let key = Self::cache_key(address, start_block, limit, ascending);

        if let Some(cached) = self.cache.get(&key).await {
            return Ok(cached);
        }

        let mut delays = self.retry_delays.iter();
        loop {
            match self
                .fetcher
                .fetch_outgoing_once(address, start_block, limit, ascending)
                .await
            {
                Ok(txs) => {
                    self.cache.insert(key, txs.clone()).await;
                    return Ok(txs);
                }
                Err(SourceError::RateLimited(msg)) => match delays.next() {
                    Some(delay) => {
                        tracing::warn!(address, ?delay, "rate limited, retrying");
                        sleep(*delay).await;
                    }
                    None => return Err(SourceError::RateLimited(msg)),
                },
                Err(SourceError::Upstream(msg)) => match delays.next() {
                    Some(delay) => {
                        tracing::warn!(address, ?delay, error = %msg, "upstream error, retrying");
                        sleep(*delay).await;
                    }
                    None => return Err(SourceError::Upstream(msg)),
                },
            }
        }
    }

    async fn health_check(&self) -> HealthStatus {
        self.fetcher.health_check().await
    }
}

/// The default exponential backoff schedule: a handful of short retries
/// before the failure is surfaced to the engine.
pub fn default_retry_delays() -> Vec<Duration> {
    vec![
        Duration::from_millis(250),
        Duration::from_secs(1),
        Duration::from_secs(4),
    ]
}
