//! Chain indexer client: wallet balances and pool reserves.

use super::{parse_quantity, BalanceSource, DataSourceError, ReserveSource};
use crate::domain::{PoolReserves, TokenUnit, WalletAddress};
use async_trait::async_trait;
use backoff::future::retry;
use backoff::ExponentialBackoff;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

/// Indexer data source over a Blockfrost-style REST API.
///
/// - `GET {base}/addresses/{wallet}` returns `{"amount": [{"unit", "quantity"}]}`
/// - `GET {base}/pools/{pool_id}` returns reserves, LP supply and decimals
#[derive(Debug, Clone)]
pub struct IndexerDataSource {
    client: Client,
    base_url: String,
}

impl IndexerDataSource {
    pub fn new(base_url: String) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn get_json(&self, path: &str) -> Result<serde_json::Value, DataSourceError> {
        let url = format!("{}{}", self.base_url, path);
        get_json_with_retry(&self.client, &url).await
    }
}

/// GET with exponential backoff on network errors, 429 and 5xx.
pub(crate) async fn get_json_with_retry(
    client: &Client,
    url: &str,
) -> Result<serde_json::Value, DataSourceError> {
    let backoff = ExponentialBackoff {
        max_elapsed_time: Some(Duration::from_secs(30)),
        ..Default::default()
    };

    retry(backoff, || async {
        let response = client.get(url).send().await.map_err(|e| {
            backoff::Error::transient(DataSourceError::NetworkError(e.to_string()))
        })?;

        let status = response.status();
        if status == 429 {
            return Err(backoff::Error::transient(DataSourceError::RateLimited));
        }
        if status.is_server_error() {
            return Err(backoff::Error::transient(DataSourceError::HttpError {
                status: status.as_u16(),
                message: "Server error".to_string(),
            }));
        }
        if !status.is_success() {
            return Err(backoff::Error::permanent(DataSourceError::HttpError {
                status: status.as_u16(),
                message: "Client error".to_string(),
            }));
        }

        response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| backoff::Error::permanent(DataSourceError::ParseError(e.to_string())))
    })
    .await
}

#[async_trait]
impl BalanceSource for IndexerDataSource {
    async fn get_token_amount(
        &self,
        wallet: &WalletAddress,
        token_unit: &TokenUnit,
    ) -> Result<i128, DataSourceError> {
        debug!(wallet = %wallet, token_unit = %token_unit, "Fetching token amount");
        let response = self.get_json(&format!("/addresses/{}", wallet)).await?;
        parse_token_amount(&response, token_unit)
    }
}

#[async_trait]
impl ReserveSource for IndexerDataSource {
    async fn get_pool_reserves(&self, pool_id: &str) -> Result<PoolReserves, DataSourceError> {
        debug!(pool_id, "Fetching pool reserves");
        let response = self.get_json(&format!("/pools/{}", pool_id)).await?;
        parse_pool_reserves(&response)
    }
}

fn parse_token_amount(
    response: &serde_json::Value,
    token_unit: &TokenUnit,
) -> Result<i128, DataSourceError> {
    let amounts = response
        .get("amount")
        .and_then(|v| v.as_array())
        .ok_or_else(|| DataSourceError::ParseError("Missing amount array".to_string()))?;

    let mut total: i128 = 0;
    for entry in amounts {
        if entry.get("unit").and_then(|v| v.as_str()) != Some(token_unit.as_str()) {
            continue;
        }
        let quantity = entry
            .get("quantity")
            .ok_or_else(|| DataSourceError::ParseError("Missing quantity field".to_string()))?;
        total = total
            .checked_add(parse_quantity(quantity, "quantity")?)
            .ok_or_else(|| DataSourceError::ParseError("Quantity overflow".to_string()))?;
    }
    Ok(total)
}

fn parse_pool_reserves(response: &serde_json::Value) -> Result<PoolReserves, DataSourceError> {
    let field = |name: &str| -> Result<u128, DataSourceError> {
        let raw = parse_quantity(
            response
                .get(name)
                .ok_or_else(|| DataSourceError::ParseError(format!("Missing {} field", name)))?,
            name,
        )?;
        u128::try_from(raw)
            .map_err(|_| DataSourceError::ParseError(format!("Negative {}: {}", name, raw)))
    };
    let decimals = |name: &str| -> u32 {
        response
            .get(name)
            .and_then(|v| v.as_u64())
            .and_then(|d| u32::try_from(d).ok())
            .unwrap_or(0)
    };

    let mut reserves = PoolReserves::new(field("reserve_a")?, field("reserve_b")?)
        .with_decimals(decimals("decimals_a"), decimals("decimals_b"));
    if response.get("total_lp").is_some() {
        reserves = reserves.with_total_supply(field("total_lp")?);
    }
    Ok(reserves)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_token_amount_sums_matching_unit() {
        let response = json!({
            "amount": [
                {"unit": "lovelace", "quantity": "5000000"},
                {"unit": "lp01", "quantity": "1000"},
                {"unit": "lp01", "quantity": "250"}
            ]
        });
        let unit = TokenUnit::new("lp01".to_string());
        assert_eq!(parse_token_amount(&response, &unit).unwrap(), 1250);
    }

    #[test]
    fn test_parse_token_amount_absent_unit_is_zero() {
        let response = json!({"amount": [{"unit": "lovelace", "quantity": "1"}]});
        let unit = TokenUnit::new("lp01".to_string());
        assert_eq!(parse_token_amount(&response, &unit).unwrap(), 0);
    }

    #[test]
    fn test_parse_token_amount_malformed() {
        let unit = TokenUnit::new("lp01".to_string());
        assert!(parse_token_amount(&json!({}), &unit).is_err());
        let bad = json!({"amount": [{"unit": "lp01", "quantity": "abc"}]});
        assert!(matches!(
            parse_token_amount(&bad, &unit),
            Err(DataSourceError::ParseError(_))
        ));
    }

    #[test]
    fn test_parse_pool_reserves() {
        let response = json!({
            "reserve_a": "2000000000",
            "reserve_b": 500,
            "total_lp": "1000",
            "decimals_a": 6,
            "decimals_b": 0
        });
        let reserves = parse_pool_reserves(&response).unwrap();
        assert_eq!(reserves.reserve_a, 2_000_000_000);
        assert_eq!(reserves.reserve_b, 500);
        assert_eq!(reserves.total_supply, Some(1000));
        assert_eq!(reserves.decimals_a, 6);
    }

    #[test]
    fn test_parse_pool_reserves_rejects_negative() {
        let response = json!({"reserve_a": "-1", "reserve_b": "5"});
        assert!(parse_pool_reserves(&response).is_err());
    }
}
