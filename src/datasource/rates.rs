//! APR collection pipeline client.

use super::indexer::get_json_with_retry;
use super::{parse_float, DataSourceError, RateSource};
use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

/// Rate feed over the collection pipeline's read API.
///
/// `GET {base}/rates/{protocol}/{market}` returns
/// `{"apr": 12.5, "exchange_rate": "0.0213"}`; `exchange_rate` is optional
/// and only present for lending markets with receipt tokens.
#[derive(Debug, Clone)]
pub struct RateFeedDataSource {
    client: Client,
    base_url: String,
}

impl RateFeedDataSource {
    pub fn new(base_url: String) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn fetch_market(
        &self,
        protocol: &str,
        market: &str,
    ) -> Result<serde_json::Value, DataSourceError> {
        let url = format!(
            "{}/rates/{}/{}",
            self.base_url,
            protocol,
            market.replace('/', "-")
        );
        get_json_with_retry(&self.client, &url).await
    }
}

#[async_trait]
impl RateSource for RateFeedDataSource {
    async fn get_current_apr(&self, protocol: &str, market: &str) -> Result<f64, DataSourceError> {
        debug!(protocol, market, "Fetching current APR");
        let response = self.fetch_market(protocol, market).await?;
        parse_apr(&response)
    }

    async fn get_exchange_rate(
        &self,
        protocol: &str,
        market: &str,
    ) -> Result<Option<f64>, DataSourceError> {
        let response = self.fetch_market(protocol, market).await?;
        parse_exchange_rate(&response)
    }
}

fn parse_apr(response: &serde_json::Value) -> Result<f64, DataSourceError> {
    let apr = response
        .get("apr")
        .ok_or_else(|| DataSourceError::ParseError("Missing apr field".to_string()))?;
    parse_float(apr, "apr")
}

fn parse_exchange_rate(response: &serde_json::Value) -> Result<Option<f64>, DataSourceError> {
    match response.get("exchange_rate") {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(value) => {
            let rate = parse_float(value, "exchange_rate")?;
            Ok((rate > 0.0).then_some(rate))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_apr() {
        assert_eq!(parse_apr(&json!({"apr": 36.5})).unwrap(), 36.5);
        assert_eq!(parse_apr(&json!({"apr": "4.25"})).unwrap(), 4.25);
        assert!(parse_apr(&json!({})).is_err());
    }

    #[test]
    fn test_parse_exchange_rate_optional() {
        assert_eq!(parse_exchange_rate(&json!({"apr": 1})).unwrap(), None);
        assert_eq!(
            parse_exchange_rate(&json!({"exchange_rate": null})).unwrap(),
            None
        );
        assert_eq!(
            parse_exchange_rate(&json!({"exchange_rate": "0.02"})).unwrap(),
            Some(0.02)
        );
        assert_eq!(parse_exchange_rate(&json!({"exchange_rate": 0})).unwrap(), None);
    }
}
