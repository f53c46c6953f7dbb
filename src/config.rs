use crate::domain::Address;
use crate::fetch::DEFAULT_MAX_REWARD_EPOCHS;
use crate::sync::scheduler::DEFAULT_REFRESH_INTERVAL;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_path: String,
    pub rpc_url: String,
    pub core_vault_address: Address,
    pub vault_extension_address: Address,
    pub native_asset_symbol: String,
    pub refresh_interval_ms: u64,
    pub cache_freshness_ms: i64,
    pub optimistic_expiry_ms: i64,
    pub max_reward_epochs: usize,
    pub tx_poll_interval_ms: u64,
    pub tx_timeout_ms: u64,
    pub account: Option<Address>,
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
        let rpc_url = required(&env_map, "RPC_URL")?;
        let core_vault_address = parse_address(&env_map, "CORE_VAULT_ADDRESS")?
            .ok_or_else(|| ConfigError::MissingEnv("CORE_VAULT_ADDRESS".to_string()))?;
        let vault_extension_address = parse_address(&env_map, "VAULT_EXTENSION_ADDRESS")?
            .ok_or_else(|| ConfigError::MissingEnv("VAULT_EXTENSION_ADDRESS".to_string()))?;

        let native_asset_symbol = env_map
            .get("NATIVE_ASSET_SYMBOL")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "FLOW".to_string());

        let refresh_interval_ms = positive(
            "REFRESH_INTERVAL_MS",
            parse_or(
                &env_map,
                "REFRESH_INTERVAL_MS",
                DEFAULT_REFRESH_INTERVAL.as_millis() as u64,
                "must be a valid u64",
            )?,
        )?;
        let cache_freshness_ms = parse_or(
            &env_map,
            "CACHE_FRESHNESS_MS",
            crate::cache::DEFAULT_FRESHNESS_MS,
            "must be a valid i64",
        )?;
        let optimistic_expiry_ms = parse_or(
            &env_map,
            "OPTIMISTIC_EXPIRY_MS",
            crate::ledger::DEFAULT_EXPIRY_MS,
            "must be a valid i64",
        )?;
        let max_reward_epochs = positive(
            "MAX_REWARD_EPOCHS",
            parse_or(
                &env_map,
                "MAX_REWARD_EPOCHS",
                DEFAULT_MAX_REWARD_EPOCHS,
                "must be a valid usize",
            )?,
        )?;
        let tx_poll_interval_ms = positive(
            "TX_POLL_INTERVAL_MS",
            parse_or(&env_map, "TX_POLL_INTERVAL_MS", 2_000u64, "must be a valid u64")?,
        )?;
        let tx_timeout_ms = parse_or(&env_map, "TX_TIMEOUT_MS", 300_000u64, "must be a valid u64")?;

        let account = parse_address(&env_map, "ACCOUNT")?;

        Ok(Config {
            port,
            database_path,
            rpc_url,
            core_vault_address,
            vault_extension_address,
            native_asset_symbol,
            refresh_interval_ms,
            cache_freshness_ms,
            optimistic_expiry_ms,
            max_reward_epochs,
            tx_poll_interval_ms,
            tx_timeout_ms,
            account,
        })
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }
}

fn required(env_map: &HashMap<String, String>, name: &str) -> Result<String, ConfigError> {
    env_map
        .get(name)
        .cloned()
        .ok_or_else(|| ConfigError::MissingEnv(name.to_string()))
}

fn parse_or<T: std::str::FromStr>(
    env_map: &HashMap<String, String>,
    name: &str,
    default: T,
    reason: &str,
) -> Result<T, ConfigError> {
    match env_map.get(name) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidValue(name.to_string(), reason.to_string())),
        None => Ok(default),
    }
}

fn positive<T: PartialOrd + Default>(name: &str, value: T) -> Result<T, ConfigError> {
    if value > T::default() {
        Ok(value)
    } else {
        Err(ConfigError::InvalidValue(
            name.to_string(),
            "must be at least 1".to_string(),
        ))
    }
}

fn parse_address(
    env_map: &HashMap<String, String>,
    name: &str,
) -> Result<Option<Address>, ConfigError> {
    match env_map.get(name).map(|s| s.trim()).filter(|s| !s.is_empty()) {
        Some(raw) => raw
            .parse::<Address>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_required_env() -> HashMap<String, String> {
        let mut map = HashMap::new();
        map.insert("DATABASE_PATH".to_string(), "/tmp/test.db".to_string());
        map.insert("RPC_URL".to_string(), "http://localhost:8545".to_string());
        map.insert(
            "CORE_VAULT_ADDRESS".to_string(),
            "0x1000000000000000000000000000000000000001".to_string(),
        );
        map.insert(
            "VAULT_EXTENSION_ADDRESS".to_string(),
            "0x2000000000000000000000000000000000000002".to_string(),
        );
        map
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_env_map(setup_required_env()).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.native_asset_symbol, "FLOW");
        assert_eq!(config.refresh_interval(), Duration::from_secs(30));
        assert_eq!(config.cache_freshness_ms, 60_000);
        assert_eq!(config.optimistic_expiry_ms, 30_000);
        assert_eq!(config.max_reward_epochs, 10);
        assert_eq!(config.tx_poll_interval_ms, 2_000);
        assert_eq!(config.tx_timeout_ms, 300_000);
        assert!(config.account.is_none());
    }

    #[test]
    fn test_missing_database_path() {
        let mut env_map = setup_required_env();
        env_map.remove("DATABASE_PATH");
        let result = Config::from_env_map(env_map);
        match result {
            Err(ConfigError::MissingEnv(s)) => assert_eq!(s, "DATABASE_PATH"),
            _ => panic!("Expected MissingEnv error"),
        }
    }

    #[test]
    fn test_missing_rpc_url() {
        let mut env_map = setup_required_env();
        env_map.remove("RPC_URL");
        let result = Config::from_env_map(env_map);
        match result {
            Err(ConfigError::MissingEnv(s)) => assert_eq!(s, "RPC_URL"),
            _ => panic!("Expected MissingEnv error"),
        }
    }

    #[test]
    fn test_missing_vault_extension_address() {
        let mut env_map = setup_required_env();
        env_map.remove("VAULT_EXTENSION_ADDRESS");
        let result = Config::from_env_map(env_map);
        match result {
            Err(ConfigError::MissingEnv(s)) => assert_eq!(s, "VAULT_EXTENSION_ADDRESS"),
            _ => panic!("Expected MissingEnv error"),
        }
    }

    #[test]
    fn test_invalid_port() {
        let mut env_map = setup_required_env();
        env_map.insert("PORT".to_string(), "not_a_number".to_string());
        let result = Config::from_env_map(env_map);
        match result {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "PORT"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_invalid_contract_address() {
        let mut env_map = setup_required_env();
        env_map.insert("CORE_VAULT_ADDRESS".to_string(), "0x123".to_string());
        let result = Config::from_env_map(env_map);
        match result {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "CORE_VAULT_ADDRESS"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_zero_reward_epochs_rejected() {
        let mut env_map = setup_required_env();
        env_map.insert("MAX_REWARD_EPOCHS".to_string(), "0".to_string());
        let result = Config::from_env_map(env_map);
        match result {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "MAX_REWARD_EPOCHS"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_account_is_normalized() {
        let mut env_map = setup_required_env();
        env_map.insert(
            "ACCOUNT".to_string(),
            "0xABCDEFabcdefABCDEFabcdefABCDEFabcdefABCD".to_string(),
        );
        let config = Config::from_env_map(env_map).unwrap();
        assert_eq!(
            config.account.unwrap().as_str(),
            "0xabcdefabcdefabcdefabcdefabcdefabcdefabcd"
        );
    }
}
