//! API configuration

use std::time::Duration;

use serde::Deserialize;

use core_kernel::CoreError;
use infra_db::DatabaseConfig;

/// API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// JWT secret for authentication
    pub jwt_secret: String,
    /// JWT expiration in seconds
    pub jwt_expiration_secs: u64,
    /// Database URL
    pub database_url: String,
    /// Upper bound for the connection pool
    pub database_max_connections: u32,
    /// Idle connections the pool keeps open
    pub database_min_connections: u32,
    /// Seconds a request waits for a pooled connection
    pub database_acquire_timeout_secs: u64,
    pub database_max_lifetime_secs: u64,
    pub database_idle_timeout_secs: u64,
    /// Log level
    pub log_level: String,
    /// Serve from the in-memory store instead of PostgreSQL
    pub in_memory: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            jwt_secret: "change-me-in-production".to_string(),
            jwt_expiration_secs: 3600,
            database_url: "postgres://localhost/clinic".to_string(),
            database_max_connections: 10,
            database_min_connections: 2,
            database_acquire_timeout_secs: 30,
            database_max_lifetime_secs: 30 * 60,
            database_idle_timeout_secs: 10 * 60,
            log_level: "info".to_string(),
            in_memory: false,
        }
    }
}

impl ApiConfig {
    /// Loads configuration from `API_*` environment variables
    ///
    /// Unset variables keep their `Default` values.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        let defaults = Self::default();
        config::Config::builder()
            .set_default("host", defaults.host)?
            .set_default("port", i64::from(defaults.port))?
            .set_default("jwt_secret", defaults.jwt_secret)?
            .set_default("jwt_expiration_secs", defaults.jwt_expiration_secs as i64)?
            .set_default("database_url", defaults.database_url)?
            .set_default("database_max_connections", i64::from(defaults.database_max_connections))?
            .set_default("database_min_connections", i64::from(defaults.database_min_connections))?
            .set_default("database_acquire_timeout_secs", defaults.database_acquire_timeout_secs as i64)?
            .set_default("database_max_lifetime_secs", defaults.database_max_lifetime_secs as i64)?
            .set_default("database_idle_timeout_secs", defaults.database_idle_timeout_secs as i64)?
            .set_default("log_level", defaults.log_level)?
            .set_default("in_memory", defaults.in_memory)?
            .add_source(config::Environment::with_prefix("API").try_parsing(true))
            .build()?
            .try_deserialize()
    }

    /// Rejects settings the server cannot start with
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.jwt_secret.trim().is_empty() {
            return Err(CoreError::configuration("jwt_secret must not be empty"));
        }
        if self.jwt_expiration_secs == 0 {
            return Err(CoreError::configuration("jwt_expiration_secs must be positive"));
        }
        if !self.in_memory {
            self.database_config()
                .validate()
                .map_err(|e| CoreError::configuration(e.to_string()))?;
        }
        Ok(())
    }

    /// Pool settings for the PostgreSQL store
    pub fn database_config(&self) -> DatabaseConfig {
        DatabaseConfig {
            url: self.database_url.clone(),
            max_connections: self.database_max_connections,
            min_connections: self.database_min_connections,
            acquire_timeout: Duration::from_secs(self.database_acquire_timeout_secs),
            max_lifetime: Duration::from_secs(self.database_max_lifetime_secs),
            idle_timeout: Duration::from_secs(self.database_idle_timeout_secs),
        }
    }

    /// Returns the server address
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_server_addr() {
        let config = ApiConfig::default();
        assert_eq!(config.server_addr(), "0.0.0.0:8080");
        assert!(!config.in_memory);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_secret_is_rejected() {
        let config = ApiConfig {
            jwt_secret: "  ".to_string(),
            ..ApiConfig::default()
        };
        assert!(matches!(config.validate(), Err(CoreError::Configuration(_))));
    }

    #[test]
    fn test_zero_pool_is_allowed_in_memory() {
        let config = ApiConfig {
            database_max_connections: 0,
            in_memory: true,
            ..ApiConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_database_config_carries_pool_settings() {
        let config = ApiConfig {
            database_max_connections: 4,
            database_min_connections: 1,
            database_acquire_timeout_secs: 5,
            ..ApiConfig::default()
        };
        let database = config.database_config();
        assert_eq!(database.url, "postgres://localhost/clinic");
        assert_eq!(database.max_connections, 4);
        assert_eq!(database.min_connections, 1);
        assert_eq!(database.acquire_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_inconsistent_pool_is_rejected() {
        let config = ApiConfig {
            database_max_connections: 2,
            database_min_connections: 8,
            ..ApiConfig::default()
        };
        assert!(matches!(config.validate(), Err(CoreError::Configuration(_))));
    }
}
