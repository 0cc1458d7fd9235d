//! Upstream collaborators: the chain indexer (balances, pool reserves) and the
//! rate collection pipeline (APR, exchange rates).

use crate::domain::{PoolReserves, TokenUnit, WalletAddress};
use async_trait::async_trait;
use std::fmt;

pub mod indexer;
pub mod mock;
pub mod rates;
pub mod throttle;

pub use indexer::IndexerDataSource;
pub use mock::MockDataSource;
pub use rates::RateFeedDataSource;
pub use throttle::Throttled;

/// Current on-chain balance of a position token.
#[async_trait]
pub trait BalanceSource: Send + Sync + fmt::Debug {
    /// Raw integer quantity of `token_unit` held by `wallet`.
    ///
    /// A wallet that holds none of the token yields `Ok(0)`. The value is
    /// signed so that a malformed upstream response reaches validation
    /// instead of being silently clamped.
    async fn get_token_amount(
        &self,
        wallet: &WalletAddress,
        token_unit: &TokenUnit,
    ) -> Result<i128, DataSourceError>;
}

/// Current reserves of a two-asset pool.
#[async_trait]
pub trait ReserveSource: Send + Sync + fmt::Debug {
    async fn get_pool_reserves(&self, pool_id: &str) -> Result<PoolReserves, DataSourceError>;
}

/// Protocol-reported yield rates.
#[async_trait]
pub trait RateSource: Send + Sync + fmt::Debug {
    /// Current APR for a market, as a percentage (e.g. `12.5` for 12.5%).
    async fn get_current_apr(&self, protocol: &str, market: &str) -> Result<f64, DataSourceError>;

    /// Underlying units per receipt token (qToken), when the protocol has one.
    async fn get_exchange_rate(
        &self,
        _protocol: &str,
        _market: &str,
    ) -> Result<Option<f64>, DataSourceError> {
        Ok(None)
    }
}

/// Error type for data source operations.
#[derive(Debug, Clone, PartialEq)]
pub enum DataSourceError {
    /// Network error (e.g., connection refused, DNS failure)
    NetworkError(String),
    /// HTTP error (e.g., 404 unknown pool, 5xx server error)
    HttpError { status: u16, message: String },
    /// Parsing error (invalid JSON or malformed response)
    ParseError(String),
    /// Rate limit exceeded after retries
    RateLimited,
    /// Call did not complete within the per-source timeout
    Timeout { after_ms: u64 },
    /// Other error
    Other(String),
}

impl fmt::Display for DataSourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSourceError::NetworkError(msg) => write!(f, "Network error: {}", msg),
            DataSourceError::HttpError { status, message } => {
                write!(f, "HTTP error {}: {}", status, message)
            }
            DataSourceError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            DataSourceError::RateLimited => write!(f, "Rate limited"),
            DataSourceError::Timeout { after_ms } => write!(f, "Timed out after {}ms", after_ms),
            DataSourceError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for DataSourceError {}

/// Parse an integer quantity that upstream APIs send as a JSON string or number.
pub(crate) fn parse_quantity(value: &serde_json::Value, field: &str) -> Result<i128, DataSourceError> {
    match value {
        serde_json::Value::String(s) => s
            .trim()
            .parse::<i128>()
            .map_err(|e| DataSourceError::ParseError(format!("Invalid {}: {}", field, e))),
        serde_json::Value::Number(n) => n
            .as_i64()
            .map(i128::from)
            .or_else(|| n.as_u64().map(i128::from))
            .ok_or_else(|| DataSourceError::ParseError(format!("Invalid {}: {}", field, n))),
        _ => Err(DataSourceError::ParseError(format!("Missing {} field", field))),
    }
}

/// Parse a float that upstream APIs send as a JSON string or number.
pub(crate) fn parse_float(value: &serde_json::Value, field: &str) -> Result<f64, DataSourceError> {
    let parsed = match value {
        serde_json::Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|e| DataSourceError::ParseError(format!("Invalid {}: {}", field, e)))?,
        serde_json::Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| DataSourceError::ParseError(format!("Invalid {}: {}", field, n)))?,
        _ => return Err(DataSourceError::ParseError(format!("Missing {} field", field))),
    };
    if !parsed.is_finite() {
        return Err(DataSourceError::ParseError(format!("Non-finite {}", field)));
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_datasource_error_display() {
        let err = DataSourceError::NetworkError("connection refused".to_string());
        assert_eq!(err.to_string(), "Network error: connection refused");

        let err = DataSourceError::HttpError {
            status: 429,
            message: "Too many requests".to_string(),
        };
        assert_eq!(err.to_string(), "HTTP error 429: Too many requests");

        let err = DataSourceError::Timeout { after_ms: 15000 };
        assert_eq!(err.to_string(), "Timed out after 15000ms");

        let err = DataSourceError::RateLimited;
        assert_eq!(err.to_string(), "Rate limited");
    }

    #[test]
    fn test_parse_quantity_accepts_strings_and_numbers() {
        assert_eq!(parse_quantity(&json!("123456789012345678901"), "q").unwrap(), 123456789012345678901);
        assert_eq!(parse_quantity(&json!(42), "q").unwrap(), 42);
        assert_eq!(parse_quantity(&json!("-7"), "q").unwrap(), -7);
        assert!(parse_quantity(&json!("1.5"), "q").is_err());
        assert!(parse_quantity(&json!(null), "q").is_err());
    }

    #[test]
    fn test_parse_float() {
        assert_eq!(parse_float(&json!("12.5"), "apr").unwrap(), 12.5);
        assert_eq!(parse_float(&json!(3), "apr").unwrap(), 3.0);
        assert!(parse_float(&json!("NaN"), "apr").is_err());
        assert!(parse_float(&json!([]), "apr").is_err());
    }
}
