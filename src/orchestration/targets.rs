//! Loading the set of (wallet, token unit) pairs the sweep reconciles.

use crate::domain::{PositionKey, PositionType, TokenUnit, TrackedPosition, WalletAddress};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TargetsError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("line {line}: {message}")]
    Csv { line: u64, message: String },
    #[error("line {line}: duplicate pair {key}")]
    Duplicate { line: u64, key: PositionKey },
}

#[derive(Debug, Deserialize)]
struct Row {
    wallet: String,
    token_unit: String,
    protocol: String,
    market: String,
    position_type: String,
    #[serde(default)]
    pool_id: Option<String>,
    #[serde(default)]
    token_decimals: Option<u32>,
}

/// Read tracked positions from a CSV file.
///
/// Header: `wallet,token_unit,protocol,market,position_type,pool_id,token_decimals`.
pub fn load_tracked_positions(path: &Path) -> Result<Vec<TrackedPosition>, TargetsError> {
    let bytes = std::fs::read(path).map_err(|source| TargetsError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_tracked_positions(&bytes)
}

/// Parse tracked positions from CSV bytes. LP rows must name a pool.
pub fn parse_tracked_positions(csv_bytes: &[u8]) -> Result<Vec<TrackedPosition>, TargetsError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(csv_bytes);

    let mut seen = HashSet::new();
    let mut targets = Vec::new();
    for (index, record) in reader.deserialize::<Row>().enumerate() {
        // header is line 1
        let line = index as u64 + 2;
        let row = record.map_err(|e| TargetsError::Csv {
            line: e.position().map(|p| p.line()).unwrap_or(line),
            message: e.to_string(),
        })?;
        let invalid = |message: String| TargetsError::Csv { line, message };

        let wallet = WalletAddress::from_str(&row.wallet).map_err(|e| invalid(e.to_string()))?;
        let token_unit = TokenUnit::from_str(&row.token_unit).map_err(|e| invalid(e.to_string()))?;
        let position_type =
            PositionType::from_str(&row.position_type).map_err(|e| invalid(e.to_string()))?;
        let pool_id = row.pool_id.filter(|p| !p.is_empty());
        if position_type.is_lp() && pool_id.is_none() {
            return Err(invalid("lp rows require pool_id".to_string()));
        }

        let key = PositionKey::new(wallet, token_unit);
        if !seen.insert(key.clone()) {
            return Err(TargetsError::Duplicate { line, key });
        }

        targets.push(TrackedPosition {
            key,
            protocol: row.protocol,
            market: row.market,
            position_type,
            pool_id,
            token_decimals: row.token_decimals.unwrap_or(0),
        });
    }
    Ok(targets)
}
