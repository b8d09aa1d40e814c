//! Environment-driven configuration. In production every violation aborts
//! startup; in development violations are logged and defaults take over.

use std::fmt;
use std::path::PathBuf;

/// Environment mode, from `AGENTHUB_ENV`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Production,
    Development,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub mode: Mode,
    /// Embedded store file
    pub db_path: PathBuf,
    pub pool_size: usize,
    pub db_max_retries: u32,
    pub api_host: String,
    pub api_port: u16,
    pub realtime_port: u16,
    /// Applied to messages sent without an explicit TTL
    pub message_ttl_secs: Option<i64>,
    pub healthcheck_secs: u64,
    pub cleanup_interval_secs: u64,
    /// Active sessions quiet for this long are flagged inactive
    pub inactive_minutes: i64,
    /// Active sessions quiet for this long are closed
    pub stale_minutes: i64,
    pub snapshot_max_hours: i64,
    pub read_message_max_hours: i64,
    /// CORS allowlist; `*` is refused in production
    pub cors_origins: Vec<String>,
    pub auth_secret: String,
}

/// Error types that can occur while loading configuration
#[derive(Debug)]
pub enum ConfigError {
    /// A value failed to parse
    Invalid { key: &'static str, value: String },

    /// Production validation failures (all of them)
    Rejected(Vec<String>),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Invalid { key, value } => {
                write!(f, "Invalid configuration {}={}", key, value)
            }
            ConfigError::Rejected(issues) => {
                write!(f, "Configuration rejected: {}", issues.join("; "))
            }
        }
    }
}

impl std::error::Error for ConfigError {}

const DEV_SECRET: &str = "agenthub-development-secret-not-for-production";
const MIN_SECRET_LEN: usize = 32;

fn env_var(key: &'static str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &'static str) -> Result<Option<T>, ConfigError> {
    match env_var(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
    }
}

impl Config {
    /// Reads the closed configuration set from the environment, validates it
    /// for the detected mode, and returns the result. Development-mode
    /// violations are logged as warnings and replaced by defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mode = match env_var("AGENTHUB_ENV").as_deref() {
            Some("production") => Mode::Production,
            Some("development") | None => Mode::Development,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "AGENTHUB_ENV",
                    value: other.to_string(),
                });
            }
        };

        let mut config = Config {
            mode,
            db_path: env_var("AGENTHUB_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("agenthub.db")),
            pool_size: env_parse("AGENTHUB_POOL_SIZE")?.unwrap_or(10),
            db_max_retries: env_parse("AGENTHUB_DB_MAX_RETRIES")?.unwrap_or(3),
            api_host: env_var("AGENTHUB_API_HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            api_port: env_parse("AGENTHUB_API_PORT")?.unwrap_or(3020),
            realtime_port: env_parse("AGENTHUB_REALTIME_PORT")?.unwrap_or(3021),
            message_ttl_secs: env_parse("AGENTHUB_MESSAGE_TTL_SECS")?,
            healthcheck_secs: env_parse("AGENTHUB_HEALTHCHECK_SECS")?.unwrap_or(30),
            cleanup_interval_secs: env_parse("AGENTHUB_CLEANUP_INTERVAL_SECS")?.unwrap_or(60),
            inactive_minutes: env_parse("AGENTHUB_INACTIVE_MINUTES")?.unwrap_or(10),
            stale_minutes: env_parse("AGENTHUB_STALE_MINUTES")?.unwrap_or(30),
            snapshot_max_hours: env_parse("AGENTHUB_SNAPSHOT_MAX_HOURS")?.unwrap_or(24),
            read_message_max_hours: env_parse("AGENTHUB_READ_MESSAGE_MAX_HOURS")?.unwrap_or(24),
            cors_origins: env_var("AGENTHUB_CORS_ORIGINS")
                .map(|raw| {
                    raw.split(',')
                        .map(str::trim)
                        .filter(|o| !o.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_else(|| vec!["*".to_string()]),
            auth_secret: env_var("AGENTHUB_AUTH_SECRET").unwrap_or_default(),
        };

        let issues = config.validate();
        match mode {
            Mode::Production if !issues.is_empty() => Err(ConfigError::Rejected(issues)),
            Mode::Production => Ok(config),
            Mode::Development => {
                for issue in &issues {
                    tracing::warn!("configuration: {} (continuing in development)", issue);
                }
                config.apply_dev_fallbacks();
                Ok(config)
            }
        }
    }

    fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();
        if self.auth_secret.is_empty() {
            issues.push("auth secret is required".to_string());
        } else if self.auth_secret.len() < MIN_SECRET_LEN {
            issues.push(format!(
                "auth secret must be at least {} characters",
                MIN_SECRET_LEN
            ));
        }
        if self.pool_size < 1 {
            issues.push("pool size must be at least 1".to_string());
        }
        if self.api_port == 0 {
            issues.push("api port must be in 1-65535".to_string());
        }
        if self.realtime_port == 0 {
            issues.push("realtime port must be in 1-65535".to_string());
        }
        if self.cors_origins.iter().any(|o| o == "*") && self.mode == Mode::Production {
            issues.push("CORS wildcard is not allowed in production".to_string());
        }
        issues
    }

    fn apply_dev_fallbacks(&mut self) {
        if self.auth_secret.len() < MIN_SECRET_LEN {
            self.auth_secret = DEV_SECRET.to_string();
        }
        if self.pool_size < 1 {
            self.pool_size = 1;
        }
        if self.api_port == 0 {
            self.api_port = 3020;
        }
        if self.realtime_port == 0 {
            self.realtime_port = 3021;
        }
    }

    pub fn is_production(&self) -> bool {
        self.mode == Mode::Production
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::{Mutex, MutexGuard};

    // env-var tests mutate process state; serialize them
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn lock_env() -> MutexGuard<'static, ()> {
        ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn clear_env() {
        for key in [
            "AGENTHUB_ENV",
            "AGENTHUB_DB_PATH",
            "AGENTHUB_POOL_SIZE",
            "AGENTHUB_AUTH_SECRET",
            "AGENTHUB_API_PORT",
            "AGENTHUB_CORS_ORIGINS",
        ] {
            unsafe { std::env::remove_var(key) };
        }
    }

    #[test]
    fn development_defaults_are_usable() {
        let _guard = lock_env();
        clear_env();
        let config = Config::from_env().unwrap();
        assert_eq!(config.mode, Mode::Development);
        assert_eq!(config.pool_size, 10);
        assert_eq!(config.api_port, 3020);
        assert!(config.auth_secret.len() >= MIN_SECRET_LEN);
    }

    #[test]
    fn production_requires_long_secret() {
        let _guard = lock_env();
        clear_env();
        unsafe {
            std::env::set_var("AGENTHUB_ENV", "production");
            std::env::set_var("AGENTHUB_AUTH_SECRET", "short");
            std::env::set_var("AGENTHUB_CORS_ORIGINS", "https://hub.example.com");
        }
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::Rejected(_)));
        clear_env();
    }

    #[test]
    fn production_rejects_cors_wildcard() {
        let _guard = lock_env();
        clear_env();
        unsafe {
            std::env::set_var("AGENTHUB_ENV", "production");
            std::env::set_var(
                "AGENTHUB_AUTH_SECRET",
                "a-proper-production-secret-of-enough-length",
            );
            std::env::set_var("AGENTHUB_CORS_ORIGINS", "*");
        }
        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::Rejected(issues) => {
                assert!(issues.iter().any(|i| i.contains("wildcard")));
            }
            other => panic!("expected rejection, got {:?}", other),
        }
        clear_env();
    }

    #[test]
    fn malformed_numbers_are_invalid_in_any_mode() {
        let _guard = lock_env();
        clear_env();
        unsafe { std::env::set_var("AGENTHUB_POOL_SIZE", "many") };
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::Invalid { key: "AGENTHUB_POOL_SIZE", .. })
        ));
        clear_env();
    }
}
