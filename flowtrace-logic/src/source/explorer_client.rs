use super::{HealthStatus, RawFetcher, SourceError};
use crate::model::RawTx;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::Deserialize;
use std::time::Duration;

/// A minimal Etherscan-style block-explorer client: `module=account`,
/// `action=txlist`. This is the concrete external integration behind
/// [`super::RawFetcher`]; its own transport-level retries are handled by
/// `reqwest-retry`, leaving the rate-limit/upstream distinction to this
/// layer, which reads the response body.
pub struct ExplorerClient {
    client: ClientWithMiddleware,
    base_url: String,
    api_key: String,
}

impl ExplorerClient {
    pub fn new(base_url: String, api_key: String, timeout: Duration) -> Self {
        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(2);
        let client = ClientBuilder::new(
            reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .expect("reqwest client"),
        )
        .with(RetryTransientMiddleware::new_with_policy(retry_policy))
        .build();

        Self {
            client,
            base_url,
            api_key,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ExplorerEnvelope {
    status: String,
    message: String,
    #[serde(default)]
    result: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ExplorerTx {
    hash: String,
    from: String,
    #[serde(default)]
    to: String,
    value: String,
    #[serde(rename = "blockNumber")]
    block_number: String,
    #[serde(rename = "timeStamp", default)]
    timestamp: Option<String>,
    #[serde(rename = "gasUsed", default)]
    gas_used: Option<String>,
    #[serde(rename = "gasPrice", default)]
    gas_price: Option<String>,
}

#[async_trait]
impl RawFetcher for ExplorerClient {
    async fn fetch_outgoing_once(
        &self,
        address: &str,
        start_block: u64,
        limit: u32,
        ascending: bool,
    ) -> Result<Vec<RawTx>, SourceError> {
        let sort = if ascending { "asc" } else { "desc" };
        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("module", "account"),
                ("action", "txlist"),
                ("address", address),
                ("startblock", &start_block.to_string()),
                ("endblock", "99999999"),
                ("offset", &limit.to_string()),
                ("sort", sort),
                ("apikey", &self.api_key),
            ])
            .send()
            .await
            .map_err(|e| SourceError::Upstream(e.to_string()))?;

        if response.status().as_u16() == 429 {
            return Err(SourceError::RateLimited("HTTP 429".to_string()));
        }
        if !response.status().is_success() {
            return Err(SourceError::Upstream(format!(
                "HTTP {}",
                response.status()
            )));
        }

        let body: ExplorerEnvelope = response
            .json()
            .await
            .map_err(|e| SourceError::Upstream(format!("invalid response body: {e}")))?;

        if body.status == "0" && body.message != "No transactions found" {
            return if body.message.to_lowercase().contains("rate limit") {
                Err(SourceError::RateLimited(body.message))
            } else {
                Err(SourceError::Upstream(body.message))
            };
        }

        let raw_txs: Vec<ExplorerTx> = serde_json::from_value(body.result).unwrap_or_default();
        Ok(raw_txs.into_iter().map(convert).collect())
    }

    async fn health_check(&self) -> HealthStatus {
        match self
            .client
            .get(&self.base_url)
            .query(&[("module", "proxy"), ("action", "eth_blockNumber")])
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => HealthStatus::Available,
            _ => HealthStatus::Unavailable,
        }
    }
}

fn convert(tx: ExplorerTx) -> RawTx {
    let timestamp = tx
        .timestamp
        .and_then(|s| s.parse::<i64>().ok())
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0));

    RawTx {
        tx_hash: tx.hash,
        from: tx.from,
        to: tx.to,
        value_base_units: tx.value,
        block_number: tx.block_number.parse().unwrap_or(0),
        timestamp,
        gas_used: tx.gas_used.and_then(|s| s.parse().ok()),
        gas_price: tx.gas_price.and_then(|s| s.parse().ok()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client_against(mock: &MockServer) -> ExplorerClient {
        ExplorerClient::new(mock.uri(), "test-key".to_string(), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn fetch_outgoing_once_parses_transactions() {
        let mock = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("action", "txlist"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "1",
                "message": "OK",
                "result": [{
                    "hash": "0xabc",
                    "from": "0x1111111111111111111111111111111111111111",
                    "to": "0x2222222222222222222222222222222222222222",
                    "value": "1000000000000000000",
                    "blockNumber": "100",
                    "timeStamp": "1700000000",
                    "gasUsed": "21000",
                    "gasPrice": "30000000000"
                }]
            })))
            .mount(&mock)
            .await;

        let client = client_against(&mock).await;
        let txs = client
            .fetch_outgoing_once("0x1111111111111111111111111111111111111111", 0, 100, true)
            .await
            .expect("fetch should succeed");

        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].tx_hash, "0xabc");
        assert_eq!(txs[0].block_number, 100);
        assert_eq!(txs[0].gas_price, Some(30_000_000_000));
    }

    #[tokio::test]
    async fn fetch_outgoing_once_treats_no_transactions_as_empty_not_error() {
        let mock = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "0",
                "message": "No transactions found",
                "result": []
            })))
            .mount(&mock)
            .await;

        let client = client_against(&mock).await;
        let txs = client
            .fetch_outgoing_once("0x1111111111111111111111111111111111111111", 0, 100, true)
            .await
            .expect("absence of transactions is not an error");

        assert!(txs.is_empty());
    }

    #[tokio::test]
    async fn fetch_outgoing_once_maps_rate_limit_message_to_rate_limited() {
        let mock = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "0",
                "message": "Max rate limit reached",
                "result": []
            })))
            .mount(&mock)
            .await;

        let client = client_against(&mock).await;
        let err = client
            .fetch_outgoing_once("0x1111111111111111111111111111111111111111", 0, 100, true)
            .await
            .expect_err("rate-limit message should surface as an error");

        assert!(matches!(err, SourceError::RateLimited(_)));
    }

    #[tokio::test]
    async fn fetch_outgoing_once_maps_http_429_to_rate_limited() {
        let mock = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&mock)
            .await;

        let client = client_against(&mock).await;
        let err = client
            .fetch_outgoing_once("0x1111111111111111111111111111111111111111", 0, 100, true)
            .await
            .expect_err("HTTP 429 should surface as rate-limited");

        assert!(matches!(err, SourceError::RateLimited(_)));
    }
}
