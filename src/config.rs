//! Configuration module for Switchyard.
//!
//! Loads configuration from TOML files with environment variable substitution.
//!
//! # Example
//!
//! ```toml
//! [router]
//! queue_capacity = 256
//! pool_size = 8
//! acquire_timeout_ms = 60000
//!
//! [routes]
//! "image.pull" = ["log:audit", "log"]
//! "image.delete" = ["log:audit"]
//!
//! [handlers.log.audit]
//! prefix = "${AUDIT_PREFIX}"
//! level = "warn"
//! ```

use crate::handler::{Handler, LogHandler};
use crate::registry::{HandlerRegistry, RegistryBuilder};
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn, Level};

/// Environment variable naming the config file.
pub const CONFIG_PATH_ENV: &str = "SWITCHYARD_CONFIG";

/// Used when [`CONFIG_PATH_ENV`] is unset.
pub const DEFAULT_CONFIG_PATH: &str = "config/switchyard.toml";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid substitution pattern: {0}")]
    PatternError(#[from] regex::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// Root configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct SwitchyardConfig {
    #[serde(default)]
    pub router: RouterConfig,

    /// Event routing rules: category -> [handler references]
    #[serde(default)]
    pub routes: HashMap<String, Vec<String>>,

    /// Named handler configurations
    #[serde(default)]
    pub handlers: HandlersConfig,
}

/// Router construction parameters
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct RouterConfig {
    /// Events buffered between the source and the dispatch loop
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Maximum events handled concurrently
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    /// How long the dispatch loop waits for a worker before logging and
    /// waiting again
    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,

    /// How long shutdown waits for in-flight executions
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            pool_size: default_pool_size(),
            acquire_timeout_ms: default_acquire_timeout_ms(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
        }
    }
}

fn default_queue_capacity() -> usize {
    256
}

fn default_pool_size() -> usize {
    8
}

fn default_acquire_timeout_ms() -> u64 {
    60_000
}

fn default_shutdown_grace_ms() -> u64 {
    30_000
}

impl RouterConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    /// Reject values the router cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "router.queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.pool_size == 0 {
            return Err(ConfigError::ValidationError(
                "router.pool_size must be at least 1".to_string(),
            ));
        }
        // the semaphore backing the pool counts permits in a u32
        if u32::try_from(self.pool_size).is_err() {
            return Err(ConfigError::ValidationError(format!(
                "router.pool_size must be at most {}",
                u32::MAX
            )));
        }
        if self.acquire_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "router.acquire_timeout_ms must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Handler configurations, grouped by handler type
#[derive(Debug, Deserialize, Clone, Default)]
pub struct HandlersConfig {
    #[serde(default)]
    pub log: HashMap<String, LogHandlerConfig>,
}

/// Log handler configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LogHandlerConfig {
    #[serde(default = "default_log_prefix")]
    pub prefix: String,

    /// One of trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_prefix() -> String {
    "switchyard".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl SwitchyardConfig {
    /// Build the handler registry from `routes` and `handlers`.
    ///
    /// References are either `"log"` (a default log handler) or
    /// `"<type>:<name>"` pointing into `[handlers.<type>.<name>]`. Unknown
    /// references are skipped with a warning.
    pub fn build_registry(&self) -> HandlerRegistry {
        let mut log_handlers: HashMap<&str, Arc<dyn Handler>> = HashMap::new();
        for (name, config) in &self.handlers.log {
            // validate() has already vetted the level
            let level = config.level.parse::<Level>().unwrap_or(Level::INFO);
            log_handlers.insert(
                name.as_str(),
                Arc::new(LogHandler::with_prefix(&config.prefix).at_level(level)),
            );
        }
        let default_log: Arc<dyn Handler> = Arc::new(LogHandler::new());

        // sorted so registration logs are stable between runs
        let mut categories: Vec<&String> = self.routes.keys().collect();
        categories.sort();

        let mut builder = RegistryBuilder::new();
        for category in categories {
            for handler_ref in &self.routes[category] {
                match handler_ref.split_once(':') {
                    Some(("log", name)) => match log_handlers.get(name) {
                        Some(handler) => builder.register(category, handler.clone()),
                        None => warn!(
                            category = %category,
                            handler = %handler_ref,
                            "Log handler '{}' not found in config",
                            name
                        ),
                    },
                    Some((handler_type, _)) => warn!(
                        category = %category,
                        handler = %handler_ref,
                        "Unknown handler type: {}",
                        handler_type
                    ),
                    None if handler_ref == "log" => {
                        builder.register(category, default_log.clone())
                    }
                    None => warn!(
                        category = %category,
                        handler = %handler_ref,
                        "Invalid handler reference format"
                    ),
                }
            }
        }

        builder.build()
    }

    /// Load configuration from the default path or `SWITCHYARD_CONFIG`.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path =
            env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            info!(
                path = %path.display(),
                "Config file not found, using defaults"
            );
            return Ok(Self::default());
        }

        info!(path = %path.display(), "Loading configuration");

        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let content = substitute_env_vars(content)?;

        debug!("Parsing TOML configuration");
        let config: SwitchyardConfig = toml::from_str(&content)?;

        config.validate()?;

        info!(
            routes = config.routes.len(),
            log_handlers = config.handlers.log.len(),
            pool_size = config.router.pool_size,
            queue_capacity = config.router.queue_capacity,
            "Configuration loaded"
        );

        Ok(config)
    }

    /// Validate the configuration
    fn validate(&self) -> Result<(), ConfigError> {
        self.router.validate()?;

        for (name, log) in &self.handlers.log {
            if log.level.parse::<Level>().is_err() {
                return Err(ConfigError::ValidationError(format!(
                    "Log handler '{}' level must be one of trace, debug, info, warn, error",
                    name
                )));
            }

            if log.prefix.contains("${") {
                warn!(
                    handler = %name,
                    prefix = %log.prefix,
                    "Log prefix contains unsubstituted environment variable"
                );
            }
        }

        for (category, handlers) in &self.routes {
            if category.trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "Route category must not be empty".to_string(),
                ));
            }

            for handler_ref in handlers {
                if !self.handler_exists(handler_ref) {
                    warn!(
                        category = %category,
                        handler = %handler_ref,
                        "Route references undefined handler (will be skipped)"
                    );
                }
            }
        }

        Ok(())
    }

    /// Check if a handler reference exists in configuration
    fn handler_exists(&self, handler_ref: &str) -> bool {
        match handler_ref.split_once(':') {
            Some(("log", name)) => self.handlers.log.contains_key(name),
            Some(_) => false,
            None => handler_ref == "log",
        }
    }
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(content: &str) -> Result<String, ConfigError> {
    let re = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}")?;

    let substituted = re.replace_all(content, |caps: &regex::Captures| {
        let var_name = &caps[1];
        match env::var(var_name) {
            Ok(value) => value,
            Err(_) => {
                debug!(var = %var_name, "Environment variable not set, keeping placeholder");
                caps[0].to_string()
            }
        }
    });

    Ok(substituted.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_var_substitution() {
        env::set_var("SWITCHYARD_TEST_PREFIX", "substituted_value");
        let input = "prefix = \"${SWITCHYARD_TEST_PREFIX}\"";
        let output = substitute_env_vars(input).unwrap();
        assert_eq!(output, "prefix = \"substituted_value\"");
        env::remove_var("SWITCHYARD_TEST_PREFIX");
    }

    #[test]
    fn test_env_var_not_set() {
        let input = "prefix = \"${SWITCHYARD_NONEXISTENT_VAR}\"";
        let output = substitute_env_vars(input).unwrap();
        assert_eq!(output, input);
    }

    #[test]
    fn test_parse_router_section() {
        let config = SwitchyardConfig::from_toml(
            r#"
            [router]
            queue_capacity = 32
            pool_size = 2
            acquire_timeout_ms = 500
        "#,
        )
        .unwrap();

        assert_eq!(config.router.queue_capacity, 32);
        assert_eq!(config.router.pool_size, 2);
        assert_eq!(config.router.acquire_timeout(), Duration::from_millis(500));
        assert_eq!(config.router.shutdown_grace(), Duration::from_secs(30));
    }

    #[test]
    fn test_default_config() {
        let config = SwitchyardConfig::default();
        assert_eq!(config.router.queue_capacity, 256);
        assert_eq!(config.router.pool_size, 8);
        assert_eq!(config.router.acquire_timeout(), Duration::from_secs(60));
        assert!(config.routes.is_empty());
    }

    #[test]
    fn test_build_registry_from_routes() {
        let config = SwitchyardConfig::from_toml(
            r#"
            [routes]
            "image.pull" = ["log:audit", "log"]
            "image.delete" = ["log:audit", "log:missing", "webhook:x", "bogus"]

            [handlers.log.audit]
            prefix = "audit"
            level = "warn"
        "#,
        )
        .unwrap();

        let registry = config.build_registry();
        assert_eq!(registry.categories(), vec!["image.delete", "image.pull"]);
        assert_eq!(registry.handlers_for("image.pull").map(<[_]>::len), Some(2));
        // unknown references are skipped
        assert_eq!(registry.handlers_for("image.delete").map(<[_]>::len), Some(1));
    }

    #[test]
    fn test_validation_zero_pool() {
        let result = SwitchyardConfig::from_toml(
            r#"
            [router]
            pool_size = 0
        "#,
        );
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_validation_zero_queue() {
        let config = RouterConfig {
            queue_capacity: 0,
            ..RouterConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_invalid_level() {
        let result = SwitchyardConfig::from_toml(
            r#"
            [handlers.log.loud]
            level = "shouting"
        "#,
        );
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = SwitchyardConfig::load_from("/nonexistent/switchyard.toml").unwrap();
        assert_eq!(config.router, RouterConfig::default());
    }

    #[test]
    fn test_parse_error() {
        let result = SwitchyardConfig::from_toml("[router\npool_size = 1");
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }
}
