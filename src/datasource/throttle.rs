//! Per-source concurrency cap and call timeout.

use super::{BalanceSource, DataSourceError, RateSource, ReserveSource};
use crate::domain::{PoolReserves, TokenUnit, WalletAddress};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::warn;

/// Wraps one upstream source with its own in-flight limit.
///
/// Throttling is per source rather than per worker: every caller sharing a
/// `Throttled` competes for the same permits no matter how many sweep
/// workers are running.
#[derive(Debug, Clone)]
pub struct Throttled<S> {
    inner: Arc<S>,
    name: &'static str,
    permits: Arc<Semaphore>,
    timeout: Duration,
}

impl<S> Throttled<S> {
    pub fn new(inner: Arc<S>, name: &'static str, max_in_flight: usize, timeout: Duration) -> Self {
        Self {
            inner,
            name,
            permits: Arc::new(Semaphore::new(max_in_flight.max(1))),
            timeout,
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Permits currently free.
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    async fn call<T, F>(&self, fut: F) -> Result<T, DataSourceError>
    where
        F: Future<Output = Result<T, DataSourceError>>,
    {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| DataSourceError::Other(format!("{} throttle closed", self.name)))?;

        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                let after_ms = self.timeout.as_millis() as u64;
                warn!(source = self.name, after_ms, "Upstream call timed out");
                Err(DataSourceError::Timeout { after_ms })
            }
        }
    }
}

#[async_trait]
impl<S: BalanceSource> BalanceSource for Throttled<S> {
    async fn get_token_amount(
        &self,
        wallet: &WalletAddress,
        token_unit: &TokenUnit,
    ) -> Result<i128, DataSourceError> {
        self.call(self.inner.get_token_amount(wallet, token_unit))
            .await
    }
}

#[async_trait]
impl<S: ReserveSource> ReserveSource for Throttled<S> {
    async fn get_pool_reserves(&self, pool_id: &str) -> Result<PoolReserves, DataSourceError> {
        self.call(self.inner.get_pool_reserves(pool_id)).await
    }
}

#[async_trait]
impl<S: RateSource> RateSource for Throttled<S> {
    async fn get_current_apr(&self, protocol: &str, market: &str) -> Result<f64, DataSourceError> {
        self.call(self.inner.get_current_apr(protocol, market)).await
    }

    async fn get_exchange_rate(
        &self,
        protocol: &str,
        market: &str,
    ) -> Result<Option<f64>, DataSourceError> {
        self.call(self.inner.get_exchange_rate(protocol, market))
            .await
    }
}
