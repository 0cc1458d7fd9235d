use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_path: String,
    pub indexer_api_url: String,
    pub rates_api_url: String,
    pub tracked_positions_file: Option<String>,
    /// 0 disables the in-process sweep trigger.
    pub sweep_interval_secs: u64,
    pub sweep_concurrency: usize,
    pub upstream_max_in_flight: usize,
    pub upstream_timeout_ms: u64,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let port = parse_or(&env_map, "PORT", 8080u16, "must be a valid u16")?;

        let database_path = required(&env_map, "DATABASE_PATH")?;
        let indexer_api_url = required(&env_map, "INDEXER_API_URL")?;
        let rates_api_url = required(&env_map, "RATES_API_URL")?;

        let tracked_positions_file = env_map
            .get("TRACKED_POSITIONS_FILE")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        let sweep_interval_secs = parse_or(
            &env_map,
            "SWEEP_INTERVAL_SECS",
            21_600u64,
            "must be a non-negative integer",
        )?;
        let sweep_concurrency =
            parse_positive(&env_map, "SWEEP_CONCURRENCY", 8usize)?;
        let upstream_max_in_flight =
            parse_positive(&env_map, "UPSTREAM_MAX_IN_FLIGHT", 4usize)?;
        let upstream_timeout_ms =
            parse_positive(&env_map, "UPSTREAM_TIMEOUT_MS", 15_000u64)?;

        Ok(Config {
            port,
            database_path,
            indexer_api_url,
            rates_api_url,
            tracked_positions_file,
            sweep_interval_secs,
            sweep_concurrency,
            upstream_max_in_flight,
            upstream_timeout_ms,
        })
    }

    /// Interval between scheduled sweeps, or None when disabled.
    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_secs > 0).then(|| Duration::from_secs(self.sweep_interval_secs))
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_millis(self.upstream_timeout_ms)
    }
}

fn required(env_map: &HashMap<String, String>, name: &str) -> Result<String, ConfigError> {
    env_map
        .get(name)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ConfigError::MissingEnv(name.to_string()))
}

fn parse_or<T: FromStr>(
    env_map: &HashMap<String, String>,
    name: &str,
    default: T,
    expectation: &str,
) -> Result<T, ConfigError> {
    match env_map.get(name) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidValue(name.to_string(), expectation.to_string())),
    }
}

fn parse_positive<T>(
    env_map: &HashMap<String, String>,
    name: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr + PartialOrd + Default,
{
    let value = parse_or(env_map, name, default, "must be a positive integer")?;
    if value <= T::default() {
        return Err(ConfigError::InvalidValue(
            name.to_string(),
            "must be greater than zero".to_string(),
        ));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_required_env() -> HashMap<String, String> {
        let mut map = HashMap::new();
        map.insert("DATABASE_PATH".to_string(), "/tmp/test.db".to_string());
        map.insert(
            "INDEXER_API_URL".to_string(),
            "https://indexer.example".to_string(),
        );
        map.insert(
            "RATES_API_URL".to_string(),
            "https://rates.example".to_string(),
        );
        map
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_env_map(setup_required_env()).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.sweep_interval(), Some(Duration::from_secs(21_600)));
        assert_eq!(config.sweep_concurrency, 8);
        assert_eq!(config.upstream_max_in_flight, 4);
        assert_eq!(config.upstream_timeout(), Duration::from_millis(15_000));
        assert!(config.tracked_positions_file.is_none());
    }

    #[test]
    fn test_missing_database_path() {
        let mut env_map = setup_required_env();
        env_map.remove("DATABASE_PATH");
        match Config::from_env_map(env_map) {
            Err(ConfigError::MissingEnv(s)) => assert_eq!(s, "DATABASE_PATH"),
            _ => panic!("Expected MissingEnv error"),
        }
    }

    #[test]
    fn test_blank_indexer_url_is_missing() {
        let mut env_map = setup_required_env();
        env_map.insert("INDEXER_API_URL".to_string(), "  ".to_string());
        match Config::from_env_map(env_map) {
            Err(ConfigError::MissingEnv(s)) => assert_eq!(s, "INDEXER_API_URL"),
            _ => panic!("Expected MissingEnv error"),
        }
    }

    #[test]
    fn test_missing_rates_api_url() {
        let mut env_map = setup_required_env();
        env_map.remove("RATES_API_URL");
        match Config::from_env_map(env_map) {
            Err(ConfigError::MissingEnv(s)) => assert_eq!(s, "RATES_API_URL"),
            _ => panic!("Expected MissingEnv error"),
        }
    }

    #[test]
    fn test_invalid_port() {
        let mut env_map = setup_required_env();
        env_map.insert("PORT".to_string(), "not_a_number".to_string());
        match Config::from_env_map(env_map) {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "PORT"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_zero_interval_disables_sweep() {
        let mut env_map = setup_required_env();
        env_map.insert("SWEEP_INTERVAL_SECS".to_string(), "0".to_string());
        let config = Config::from_env_map(env_map).unwrap();
        assert_eq!(config.sweep_interval(), None);
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let mut env_map = setup_required_env();
        env_map.insert("SWEEP_CONCURRENCY".to_string(), "0".to_string());
        match Config::from_env_map(env_map) {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "SWEEP_CONCURRENCY"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_invalid_timeout() {
        let mut env_map = setup_required_env();
        env_map.insert("UPSTREAM_TIMEOUT_MS".to_string(), "-5".to_string());
        match Config::from_env_map(env_map) {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "UPSTREAM_TIMEOUT_MS"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_tracked_positions_file() {
        let mut env_map = setup_required_env();
        env_map.insert(
            "TRACKED_POSITIONS_FILE".to_string(),
            "/etc/yieldledger/targets.csv".to_string(),
        );
        let config = Config::from_env_map(env_map).unwrap();
        assert_eq!(
            config.tracked_positions_file.as_deref(),
            Some("/etc/yieldledger/targets.csv")
        );
    }
}
