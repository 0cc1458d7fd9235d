//! Mock data source for testing without network calls.

use super::{BalanceSource, DataSourceError, RateSource, ReserveSource};
use crate::domain::{PoolReserves, PositionKey, TokenUnit, WalletAddress};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Default)]
struct MockState {
    balances: HashMap<PositionKey, i128>,
    balance_failures: HashMap<PositionKey, DataSourceError>,
    slow_balances: HashMap<PositionKey, Duration>,
    reserves: HashMap<String, PoolReserves>,
    reserve_failures: HashMap<String, DataSourceError>,
    aprs: HashMap<(String, String), f64>,
    exchange_rates: HashMap<(String, String), f64>,
}

#[derive(Debug, Default)]
struct CallStats {
    balance_calls: AtomicUsize,
    reserve_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

/// In-memory balances, reserves and rates.
///
/// Balances can be changed between sweeps with [`MockDataSource::set_balance`];
/// clones share state.
#[derive(Debug, Clone, Default)]
pub struct MockDataSource {
    state: Arc<Mutex<MockState>>,
    stats: Arc<CallStats>,
    latency: Option<Duration>,
}

fn key(wallet: &WalletAddress, token_unit: &TokenUnit) -> PositionKey {
    PositionKey::new(wallet.clone(), token_unit.clone())
}

impl MockDataSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_balance(self, wallet: &WalletAddress, token_unit: &TokenUnit, amount: i128) -> Self {
        self.set_balance(wallet, token_unit, amount);
        self
    }

    pub fn with_reserves(self, pool_id: &str, reserves: PoolReserves) -> Self {
        self.set_reserves(pool_id, reserves);
        self
    }

    pub fn with_apr(self, protocol: &str, market: &str, apr: f64) -> Self {
        self.lock()
            .aprs
            .insert((protocol.to_string(), market.to_string()), apr);
        self
    }

    pub fn with_exchange_rate(self, protocol: &str, market: &str, rate: f64) -> Self {
        self.lock()
            .exchange_rates
            .insert((protocol.to_string(), market.to_string()), rate);
        self
    }

    /// Delay applied to every call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Delay applied only to balance lookups for one pair.
    pub fn with_slow_balance(
        self,
        wallet: &WalletAddress,
        token_unit: &TokenUnit,
        latency: Duration,
    ) -> Self {
        self.lock()
            .slow_balances
            .insert(key(wallet, token_unit), latency);
        self
    }

    pub fn with_balance_failure(
        self,
        wallet: &WalletAddress,
        token_unit: &TokenUnit,
        error: DataSourceError,
    ) -> Self {
        self.lock()
            .balance_failures
            .insert(key(wallet, token_unit), error);
        self
    }

    pub fn with_reserve_failure(self, pool_id: &str, error: DataSourceError) -> Self {
        self.lock()
            .reserve_failures
            .insert(pool_id.to_string(), error);
        self
    }

    pub fn set_balance(&self, wallet: &WalletAddress, token_unit: &TokenUnit, amount: i128) {
        self.lock().balances.insert(key(wallet, token_unit), amount);
    }

    pub fn set_reserves(&self, pool_id: &str, reserves: PoolReserves) {
        self.lock().reserves.insert(pool_id.to_string(), reserves);
    }

    pub fn clear_failures(&self) {
        let mut state = self.lock();
        state.balance_failures.clear();
        state.reserve_failures.clear();
    }

    pub fn balance_calls(&self) -> usize {
        self.stats.balance_calls.load(Ordering::SeqCst)
    }

    pub fn reserve_calls(&self) -> usize {
        self.stats.reserve_calls.load(Ordering::SeqCst)
    }

    /// Highest number of calls observed running at once.
    pub fn max_concurrent_calls(&self) -> usize {
        self.stats.max_in_flight.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        // a poisoned lock only means another test thread panicked
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn simulate(&self, extra: Option<Duration>) {
        let now = self.stats.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.stats.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = extra.or(self.latency) {
            tokio::time::sleep(delay).await;
        }
        self.stats.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl BalanceSource for MockDataSource {
    async fn get_token_amount(
        &self,
        wallet: &WalletAddress,
        token_unit: &TokenUnit,
    ) -> Result<i128, DataSourceError> {
        self.stats.balance_calls.fetch_add(1, Ordering::SeqCst);
        let k = key(wallet, token_unit);
        let slow = self.lock().slow_balances.get(&k).copied();
        self.simulate(slow).await;

        let state = self.lock();
        if let Some(err) = state.balance_failures.get(&k) {
            return Err(err.clone());
        }
        Ok(state.balances.get(&k).copied().unwrap_or(0))
    }
}

#[async_trait]
impl ReserveSource for MockDataSource {
    async fn get_pool_reserves(&self, pool_id: &str) -> Result<PoolReserves, DataSourceError> {
        self.stats.reserve_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate(None).await;

        let state = self.lock();
        if let Some(err) = state.reserve_failures.get(pool_id) {
            return Err(err.clone());
        }
        state
            .reserves
            .get(pool_id)
            .copied()
            .ok_or_else(|| DataSourceError::HttpError {
                status: 404,
                message: format!("unknown pool {}", pool_id),
            })
    }
}

#[async_trait]
impl RateSource for MockDataSource {
    async fn get_current_apr(&self, protocol: &str, market: &str) -> Result<f64, DataSourceError> {
        self.simulate(None).await;
        self.lock()
            .aprs
            .get(&(protocol.to_string(), market.to_string()))
            .copied()
            .ok_or_else(|| DataSourceError::Other(format!("no APR for {}/{}", protocol, market)))
    }

    async fn get_exchange_rate(
        &self,
        protocol: &str,
        market: &str,
    ) -> Result<Option<f64>, DataSourceError> {
        Ok(self
            .lock()
            .exchange_rates
            .get(&(protocol.to_string(), market.to_string()))
            .copied())
    }
}
