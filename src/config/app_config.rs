use std::{env, str::FromStr, time::Duration};

use crate::error::{AppError, Result};

const DEFAULT_RAZORPAY_API_BASE: &str = "https://api.razorpay.com/v1";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub cors: CorsConfig,
    pub razorpay: RazorpayConfig,
    pub identity: IdentityConfig,
    pub session: SessionConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_body_size: usize,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

#[derive(Clone)]
pub struct RazorpayConfig {
    pub key_id: String,
    pub key_secret: String,
    pub api_base: String,
}

// Keeps the secret out of startup logs.
impl std::fmt::Debug for RazorpayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RazorpayConfig")
            .field("key_id", &self.key_id)
            .field("key_secret", &"***")
            .field("api_base", &self.api_base)
            .finish()
    }
}

#[derive(Clone)]
pub struct IdentityConfig {
    pub jwt_secret: String,
    pub issuer: Option<String>,
    pub audience: Option<String>,
}

impl std::fmt::Debug for IdentityConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityConfig")
            .field("jwt_secret", &"***")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub timeout: Duration,
    pub warning: Duration,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key lookup, `from_env` passes the
    /// process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| AppError::ConfigError(format!("{} not set", key)))
        };

        let session = SessionConfig {
            timeout: Duration::from_secs(parse_or(&lookup, "SESSION_TIMEOUT_SECS", 1800u64)?),
            warning: Duration::from_secs(parse_or(&lookup, "SESSION_WARNING_SECS", 60u64)?),
        };

        if session.timeout.is_zero() || session.warning >= session.timeout {
            return Err(AppError::ConfigError(
                "SESSION_WARNING_SECS must be smaller than a non-zero SESSION_TIMEOUT_SECS"
                    .to_string(),
            ));
        }

        Ok(Self {
            server: ServerConfig {
                host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                port: parse_or(&lookup, "PORT", 3000u16)?,
                max_body_size: parse_or(&lookup, "MAX_BODY_SIZE", 10_485_760usize)?,
            },
            database: DatabaseConfig {
                url: required("DB_URL")?,
                max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", 20u32)?,
            },
            cors: CorsConfig {
                allowed_origins: required("FRONTEND_URL")?
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            },
            razorpay: RazorpayConfig {
                key_id: required("RAZORPAY_KEY_ID")?,
                key_secret: required("RAZORPAY_KEY_SECRET")?,
                api_base: lookup("RAZORPAY_API_BASE")
                    .unwrap_or_else(|| DEFAULT_RAZORPAY_API_BASE.to_string())
                    .trim_end_matches('/')
                    .to_string(),
            },
            identity: IdentityConfig {
                jwt_secret: required("IDENTITY_JWT_SECRET")?,
                issuer: lookup("IDENTITY_ISSUER").filter(|v| !v.is_empty()),
                audience: lookup("IDENTITY_AUDIENCE").filter(|v| !v.is_empty()),
            },
            session,
        })
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| AppError::ConfigError(format!("Invalid {} value", key))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn base_env() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("DB_URL", "postgres://localhost/handloom"),
            ("FRONTEND_URL", "http://localhost:5173, https://shop.example.com"),
            ("RAZORPAY_KEY_ID", "rzp_test_key"),
            ("RAZORPAY_KEY_SECRET", "secret"),
            ("IDENTITY_JWT_SECRET", "jwt-secret"),
        ])
    }

    fn load(vars: &HashMap<&'static str, &'static str>) -> Result<AppConfig> {
        AppConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string()))
    }

    #[test]
    fn test_defaults_applied() {
        let config = load(&base_env()).unwrap();

        assert_eq!(config.server_address(), "0.0.0.0:3000");
        assert_eq!(config.server.max_body_size, 10_485_760);
        assert_eq!(config.database.max_connections, 20);
        assert_eq!(config.razorpay.api_base, "https://api.razorpay.com/v1");
        assert_eq!(config.session.timeout, Duration::from_secs(1800));
        assert_eq!(config.session.warning, Duration::from_secs(60));
        assert!(config.identity.issuer.is_none());
    }

    #[test]
    fn test_cors_origins_split_and_trimmed() {
        let config = load(&base_env()).unwrap();
        assert_eq!(
            config.cors.allowed_origins,
            vec!["http://localhost:5173", "https://shop.example.com"]
        );
    }

    #[test]
    fn test_missing_required_key() {
        let mut vars = base_env();
        vars.remove("RAZORPAY_KEY_SECRET");

        let err = load(&vars).unwrap_err();
        assert!(err.to_string().contains("RAZORPAY_KEY_SECRET"));
    }

    #[test]
    fn test_invalid_port_rejected() {
        let mut vars = base_env();
        vars.insert("PORT", "eighty");

        assert!(matches!(load(&vars), Err(AppError::ConfigError(_))));
    }

    #[test]
    fn test_warning_window_must_fit_inside_timeout() {
        let mut vars = base_env();
        vars.insert("SESSION_TIMEOUT_SECS", "60");
        vars.insert("SESSION_WARNING_SECS", "60");

        assert!(matches!(load(&vars), Err(AppError::ConfigError(_))));
    }

    #[test]
    fn test_api_base_trailing_slash_removed() {
        let mut vars = base_env();
        vars.insert("RAZORPAY_API_BASE", "http://127.0.0.1:9000/v1/");

        let config = load(&vars).unwrap();
        assert_eq!(config.razorpay.api_base, "http://127.0.0.1:9000/v1");
    }

    #[test]
    fn test_secrets_redacted_in_debug() {
        let config = load(&base_env()).unwrap();
        let rendered = format!("{:?}", config);

        assert!(!rendered.contains("jwt-secret"));
        assert!(rendered.contains("rzp_test_key"));
    }
}
