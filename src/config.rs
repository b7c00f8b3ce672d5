use crate::domain::TaxMethod;
use crate::engine::{EstimateOptions, TaxRate, TaxRates};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_path: String,
    /// Method used when a request does not name one.
    pub default_tax_method: TaxMethod,
    /// Rates used when a liability request does not override them.
    pub default_rates: TaxRates,
    pub include_loss_offset: bool,
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
        let port = env_map
            .get("PORT")
            .map(|s| s.as_str())
            .unwrap_or("8080")
            .parse::<u16>()
            .map_err(|_| {
                ConfigError::InvalidValue("PORT".to_string(), "must be a valid u16".to_string())
            })?;

        let database_path = env_map
            .get("DATABASE_PATH")
            .cloned()
            .ok_or_else(|| ConfigError::MissingEnv("DATABASE_PATH".to_string()))?;

        let default_tax_method = env_map
            .get("DEFAULT_TAX_METHOD")
            .map(|s| s.as_str())
            .unwrap_or("fifo")
            .parse::<TaxMethod>()
            .map_err(|e| {
                ConfigError::InvalidValue("DEFAULT_TAX_METHOD".to_string(), e.to_string())
            })?;

        let short_term = parse_rate(&env_map, "SHORT_TERM_RATE", "0.37")?;
        let long_term = parse_rate(&env_map, "LONG_TERM_RATE", "0.20")?;

        let include_loss_offset = match env_map
            .get("INCLUDE_LOSS_OFFSET")
            .map(|s| s.trim().to_ascii_lowercase())
            .as_deref()
            .unwrap_or("false")
        {
            "true" | "1" => true,
            "false" | "0" => false,
            other => {
                return Err(ConfigError::InvalidValue(
                    "INCLUDE_LOSS_OFFSET".to_string(),
                    format!("must be true or false, got {}", other),
                ))
            }
        };

        Ok(Config {
            port,
            database_path,
            default_tax_method,
            default_rates: TaxRates::new(short_term, long_term),
            include_loss_offset,
        })
    }

    pub fn default_estimate_options(&self) -> EstimateOptions {
        EstimateOptions {
            include_loss_offset: self.include_loss_offset,
        }
    }
}

fn parse_rate(
    env_map: &HashMap<String, String>,
    key: &str,
    default: &str,
) -> Result<TaxRate, ConfigError> {
    env_map
        .get(key)
        .map(|s| s.as_str())
        .unwrap_or(default)
        .parse::<TaxRate>()
        .map_err(|e| ConfigError::InvalidValue(key.to_string(), e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Decimal;

    fn setup_required_env() -> HashMap<String, String> {
        let mut map = HashMap::new();
        map.insert("DATABASE_PATH".to_string(), "/tmp/test.db".to_string());
        map
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_env_map(setup_required_env()).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.default_tax_method, TaxMethod::Fifo);
        assert_eq!(
            config.default_rates.short_term.value(),
            Decimal::from_str_canonical("0.37").unwrap()
        );
        assert_eq!(
            config.default_rates.long_term.value(),
            Decimal::from_str_canonical("0.20").unwrap()
        );
        assert!(!config.include_loss_offset);
    }

    #[test]
    fn test_overrides() {
        let mut env_map = setup_required_env();
        env_map.insert("PORT".to_string(), "9000".to_string());
        env_map.insert("DEFAULT_TAX_METHOD".to_string(), "HIFO".to_string());
        env_map.insert("SHORT_TERM_RATE".to_string(), "0.24".to_string());
        env_map.insert("INCLUDE_LOSS_OFFSET".to_string(), "true".to_string());
        let config = Config::from_env_map(env_map).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.default_tax_method, TaxMethod::Hifo);
        assert_eq!(
            config.default_rates.short_term.value(),
            Decimal::from_str_canonical("0.24").unwrap()
        );
        assert!(config.default_estimate_options().include_loss_offset);
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
    fn test_invalid_tax_method() {
        let mut env_map = setup_required_env();
        env_map.insert("DEFAULT_TAX_METHOD".to_string(), "average".to_string());
        let result = Config::from_env_map(env_map);
        match result {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "DEFAULT_TAX_METHOD"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_invalid_rates() {
        for bad in ["-0.1", "abc", "NaN"] {
            let mut env_map = setup_required_env();
            env_map.insert("LONG_TERM_RATE".to_string(), bad.to_string());
            match Config::from_env_map(env_map) {
                Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "LONG_TERM_RATE"),
                other => panic!("Expected InvalidValue error for {}, got {:?}", bad, other),
            }
        }
    }

    #[test]
    fn test_invalid_loss_offset_flag() {
        let mut env_map = setup_required_env();
        env_map.insert("INCLUDE_LOSS_OFFSET".to_string(), "maybe".to_string());
        let result = Config::from_env_map(env_map);
        match result {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "INCLUDE_LOSS_OFFSET"),
            _ => panic!("Expected InvalidValue error"),
        }
    }
}
