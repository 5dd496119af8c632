//! Environment-driven configuration, mirroring the `VIGIL_`-prefixed
//! settings of the original server and its production-key safety checks.

use std::env;

const DEFAULT_API_KEY: &str = "dev-api-key-change-me";
const DEFAULT_JWT_SECRET: &str = "dev-jwt-secret-change-me";

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub cors_origins: Vec<String>,

    pub api_key: String,
    pub jwt_secret: String,
    pub jwt_algorithm: String,
    pub jwt_expire_minutes: i64,

    pub rate_limit_requests: u32,
    pub rate_limit_window_seconds: u64,

    pub encryption_key: String,
    pub env: String,
}

fn env_var(suffix: &str, default: &str) -> String {
    env::var(format!("VIGIL_{suffix}")).unwrap_or_else(|_| default.to_string())
}

fn env_parsed<T: std::str::FromStr>(suffix: &str, default: T) -> T {
    env::var(format!("VIGIL_{suffix}"))
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from the process environment, applying the same
    /// defaults as the Python original, then run the production-safety
    /// checks before returning.
    pub fn from_env() -> anyhow::Result<Self> {
        let cors_origins = env::var("VIGIL_CORS_ORIGINS")
            .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
            .unwrap_or_else(|_| vec!["http://localhost:3000".to_string()]);

        let cfg = Config {
            database_url: env_var("DATABASE_URL", "vigil.db"),
            redis_url: env_var("REDIS_URL", "redis://localhost:6379/0"),
            host: env_var("HOST", "0.0.0.0"),
            port: env_parsed("PORT", 8000u16),
            log_level: env_var("LOG_LEVEL", "info"),
            cors_origins,
            api_key: env_var("API_KEY", DEFAULT_API_KEY),
            jwt_secret: env_var("JWT_SECRET", DEFAULT_JWT_SECRET),
            jwt_algorithm: env_var("JWT_ALGORITHM", "HS256"),
            jwt_expire_minutes: env_parsed("JWT_EXPIRE_MINUTES", 60i64),
            rate_limit_requests: env_parsed("RATE_LIMIT_REQUESTS", 100u32),
            rate_limit_window_seconds: env_parsed("RATE_LIMIT_WINDOW_SECONDS", 60u64),
            encryption_key: env_var("ENCRYPTION_KEY", ""),
            env: env_var("ENV", "development"),
        };

        cfg.check_api_key_security()?;
        cfg.check_jwt_secret_security()?;
        cfg.check_encryption_key_security()?;

        Ok(cfg)
    }

    fn is_development(&self) -> bool {
        self.env == "development"
    }

    /// Reject the default API key outside development; warn inside it.
    fn check_api_key_security(&self) -> anyhow::Result<()> {
        if self.api_key != DEFAULT_API_KEY {
            return Ok(());
        }
        if !self.is_development() {
            anyhow::bail!(
                "Default API key must not be used in production. Set VIGIL_API_KEY to a secure value."
            );
        }
        tracing::warn!(
            "Using default API key — do NOT use in production. Set VIGIL_API_KEY to a secure value."
        );
        Ok(())
    }

    /// Reject the default JWT secret outside development; warn inside it.
    fn check_jwt_secret_security(&self) -> anyhow::Result<()> {
        if self.jwt_secret != DEFAULT_JWT_SECRET {
            return Ok(());
        }
        if !self.is_development() {
            anyhow::bail!(
                "Default JWT secret must not be used in production. Set VIGIL_JWT_SECRET to a secure value."
            );
        }
        tracing::warn!(
            "Using default JWT secret — do NOT use in production. Set VIGIL_JWT_SECRET to a secure value."
        );
        Ok(())
    }

    /// Reject an unset encryption key outside development; warn inside it.
    fn check_encryption_key_security(&self) -> anyhow::Result<()> {
        if !self.encryption_key.is_empty() {
            return Ok(());
        }
        if !self.is_development() {
            anyhow::bail!(
                "VIGIL_ENCRYPTION_KEY must be set in production. Provider API keys cannot be encrypted without it."
            );
        }
        tracing::warn!(
            "VIGIL_ENCRYPTION_KEY is not set — do NOT use in production. Set it to a secure value."
        );
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_addr_joins_host_and_port() {
        let cfg = Config {
            database_url: String::new(),
            redis_url: String::new(),
            host: "127.0.0.1".into(),
            port: 9000,
            log_level: "info".into(),
            cors_origins: vec![],
            api_key: "k".into(),
            jwt_secret: "s".into(),
            jwt_algorithm: "HS256".into(),
            jwt_expire_minutes: 60,
            rate_limit_requests: 100,
            rate_limit_window_seconds: 60,
            encryption_key: String::new(),
            env: "development".into(),
        };
        assert_eq!(cfg.bind_addr(), "127.0.0.1:9000");
    }

    #[test]
    fn default_api_key_is_rejected_outside_development() {
        let cfg = Config {
            database_url: String::new(),
            redis_url: String::new(),
            host: "0.0.0.0".into(),
            port: 8000,
            log_level: "info".into(),
            cors_origins: vec![],
            api_key: DEFAULT_API_KEY.into(),
            jwt_secret: "s".into(),
            jwt_algorithm: "HS256".into(),
            jwt_expire_minutes: 60,
            rate_limit_requests: 100,
            rate_limit_window_seconds: 60,
            encryption_key: String::new(),
            env: "production".into(),
        };
        assert!(cfg.check_api_key_security().is_err());
    }

    #[test]
    fn default_api_key_warns_in_development() {
        let cfg = Config {
            database_url: String::new(),
            redis_url: String::new(),
            host: "0.0.0.0".into(),
            port: 8000,
            log_level: "info".into(),
            cors_origins: vec![],
            api_key: DEFAULT_API_KEY.into(),
            jwt_secret: "s".into(),
            jwt_algorithm: "HS256".into(),
            jwt_expire_minutes: 60,
            rate_limit_requests: 100,
            rate_limit_window_seconds: 60,
            encryption_key: String::new(),
            env: "development".into(),
        };
        assert!(cfg.check_api_key_security().is_ok());
    }

    #[test]
    fn unset_encryption_key_is_rejected_outside_development() {
        let cfg = Config {
            database_url: String::new(),
            redis_url: String::new(),
            host: "0.0.0.0".into(),
            port: 8000,
            log_level: "info".into(),
            cors_origins: vec![],
            api_key: "k".into(),
            jwt_secret: "s".into(),
            jwt_algorithm: "HS256".into(),
            jwt_expire_minutes: 60,
            rate_limit_requests: 100,
            rate_limit_window_seconds: 60,
            encryption_key: String::new(),
            env: "production".into(),
        };
        assert!(cfg.check_encryption_key_security().is_err());
    }

    #[test]
    fn unset_encryption_key_warns_in_development() {
        let cfg = Config {
            database_url: String::new(),
            redis_url: String::new(),
            host: "0.0.0.0".into(),
            port: 8000,
            log_level: "info".into(),
            cors_origins: vec![],
            api_key: "k".into(),
            jwt_secret: "s".into(),
            jwt_algorithm: "HS256".into(),
            jwt_expire_minutes: 60,
            rate_limit_requests: 100,
            rate_limit_window_seconds: 60,
            encryption_key: String::new(),
            env: "development".into(),
        };
        assert!(cfg.check_encryption_key_security().is_ok());
    }
}
