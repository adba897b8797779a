//! Configuration management for the rbay command line
//!
//! Values are layered, lowest precedence first: `conf/application.yml`,
//! `RBAY__*` environment variables, then command line flags.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use clap::{Args, ValueEnum};
use config::{Config, Environment, File};
use rbay_common::RbayError;
use rbay_lock::{
    DEFAULT_LEASE_MS, DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY_MS, DEFAULT_TTL_MS, LockConfig,
};
use tracing::Level;

use crate::logging::LoggingConfig;

pub const DEFAULT_CONFIG_FILE: &str = "conf/application.yml";
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

pub const STORE_BACKEND_PROPERTY: &str = "store.backend";
pub const REDIS_URL_PROPERTY: &str = "redis.url";
pub const LOCK_TTL_PROPERTY: &str = "lock.ttl_ms";
pub const LOCK_LEASE_PROPERTY: &str = "lock.lease_ms";
pub const LOCK_RETRY_DELAY_PROPERTY: &str = "lock.retry_delay_ms";
pub const LOCK_MAX_ATTEMPTS_PROPERTY: &str = "lock.max_attempts";
pub const LOG_LEVEL_PROPERTY: &str = "log.level";
pub const LOG_DIR_PROPERTY: &str = "log.dir";

/// Store implementation backing the commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    #[default]
    Redis,
    /// Process-local keyspace, discarded on exit
    Memory,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Redis => "redis",
            Backend::Memory => "memory",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Backend {
    type Err = RbayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "redis" => Ok(Backend::Redis),
            "memory" => Ok(Backend::Memory),
            other => Err(RbayError::Config(format!(
                "unknown store backend '{}', expected redis or memory",
                other
            ))),
        }
    }
}

/// Flags shared by every subcommand
#[derive(Debug, Clone, Args)]
pub struct GlobalArgs {
    /// Configuration file
    #[arg(short = 'c', long = "config", global = true, default_value = DEFAULT_CONFIG_FILE)]
    pub config_file: PathBuf,
    #[arg(long = "redis-url", global = true, env = "REDIS_URL")]
    pub redis_url: Option<String>,
    #[arg(long = "backend", global = true, value_enum)]
    pub backend: Option<Backend>,
}

/// Application configuration loaded from config files, environment and flags
#[derive(Clone, Debug, Default)]
pub struct Configuration {
    pub config: Config,
}

impl Configuration {
    pub fn new(args: &GlobalArgs) -> anyhow::Result<Self> {
        let mut config_builder = Config::builder()
            .add_source(File::from(args.config_file.as_path()).required(false))
            .add_source(
                Environment::with_prefix("RBAY")
                    .separator("__")
                    .try_parsing(true),
            );

        if let Some(v) = &args.redis_url {
            config_builder = config_builder.set_override(REDIS_URL_PROPERTY, v.as_str())?;
        }
        if let Some(v) = args.backend {
            config_builder = config_builder.set_override(STORE_BACKEND_PROPERTY, v.as_str())?;
        }

        Ok(Configuration {
            config: config_builder.build()?,
        })
    }

    pub fn backend(&self) -> Result<Backend, RbayError> {
        match self.config.get_string(STORE_BACKEND_PROPERTY) {
            Ok(v) => v.parse(),
            Err(_) => Ok(Backend::default()),
        }
    }

    pub fn redis_url(&self) -> String {
        self.config
            .get_string(REDIS_URL_PROPERTY)
            .unwrap_or(DEFAULT_REDIS_URL.to_string())
    }

    /// Lock settings; validated when the lock manager is built.
    pub fn lock_config(&self) -> LockConfig {
        LockConfig::from_millis(
            self.config
                .get::<u64>(LOCK_TTL_PROPERTY)
                .unwrap_or(DEFAULT_TTL_MS),
            self.config
                .get::<u64>(LOCK_LEASE_PROPERTY)
                .unwrap_or(DEFAULT_LEASE_MS),
            self.config
                .get::<u64>(LOCK_RETRY_DELAY_PROPERTY)
                .unwrap_or(DEFAULT_RETRY_DELAY_MS),
            self.config
                .get::<u32>(LOCK_MAX_ATTEMPTS_PROPERTY)
                .unwrap_or(DEFAULT_MAX_ATTEMPTS),
        )
    }

    pub fn log_level(&self) -> Level {
        self.config
            .get_string(LOG_LEVEL_PROPERTY)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(Level::INFO)
    }

    pub fn log_dir(&self) -> Option<PathBuf> {
        self.config.get_string(LOG_DIR_PROPERTY).ok().map(PathBuf::from)
    }

    pub fn logging_config(&self) -> LoggingConfig {
        LoggingConfig::from_config(self.log_dir(), self.log_level())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;

    fn args(config_file: PathBuf) -> GlobalArgs {
        GlobalArgs {
            config_file,
            redis_url: None,
            backend: None,
        }
    }

    #[test]
    fn test_defaults_without_file() {
        let configuration =
            Configuration::new(&args(PathBuf::from("does/not/exist.yml"))).unwrap();

        assert_eq!(configuration.backend().unwrap(), Backend::Redis);
        assert_eq!(configuration.redis_url(), DEFAULT_REDIS_URL);
        assert_eq!(configuration.lock_config(), LockConfig::default());
        assert_eq!(configuration.log_level(), Level::INFO);
        assert!(configuration.log_dir().is_none());
    }

    #[test]
    fn test_file_values_and_flag_overrides() {
        let mut file = tempfile::Builder::new().suffix(".yml").tempfile().unwrap();
        writeln!(
            file,
            "store:\n  backend: memory\nredis:\n  url: redis://file:6379\nlock:\n  ttl_ms: 500\n  lease_ms: 400\n  retry_delay_ms: 10\n  max_attempts: 3\nlog:\n  level: debug\n  dir: /tmp/rbay-logs"
        )
        .unwrap();

        let mut global = args(file.path().to_path_buf());
        let configuration = Configuration::new(&global).unwrap();
        assert_eq!(configuration.backend().unwrap(), Backend::Memory);
        assert_eq!(configuration.redis_url(), "redis://file:6379");
        assert_eq!(
            configuration.lock_config(),
            LockConfig {
                ttl: Duration::from_millis(500),
                lease: Duration::from_millis(400),
                retry_delay: Duration::from_millis(10),
                max_attempts: 3,
            }
        );
        assert_eq!(configuration.log_level(), Level::DEBUG);
        assert_eq!(
            configuration.log_dir(),
            Some(PathBuf::from("/tmp/rbay-logs"))
        );

        global.redis_url = Some("redis://flag:6379".to_string());
        global.backend = Some(Backend::Redis);
        let configuration = Configuration::new(&global).unwrap();
        assert_eq!(configuration.redis_url(), "redis://flag:6379");
        assert_eq!(configuration.backend().unwrap(), Backend::Redis);
    }

    #[test]
    fn test_backend_parsing() {
        assert_eq!("MEMORY".parse::<Backend>().unwrap(), Backend::Memory);
        assert!(matches!(
            "etcd".parse::<Backend>(),
            Err(RbayError::Config(_))
        ));
    }
}
