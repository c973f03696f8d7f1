//! Configuration management
//!
//! Configuration is loaded from `config.yml` and may be overridden by
//! `TYPEIDEA_*` environment variables. Every section is optional; missing
//! values fall back to defaults.

use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Admin site configuration
    #[serde(default)]
    pub admin: AdminConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database driver (sqlite or mysql)
    #[serde(default)]
    pub driver: DatabaseDriver,
    /// Database connection URL
    #[serde(default = "default_database_url")]
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: DatabaseDriver::default(),
            url: default_database_url(),
        }
    }
}

fn default_database_url() -> String {
    "data/typeidea.db".to_string()
}

/// Database driver type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseDriver {
    /// SQLite (default)
    #[default]
    Sqlite,
    /// MySQL
    Mysql,
}

/// Admin site configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminConfig {
    /// Rows per change list page
    #[serde(default = "default_list_per_page")]
    pub list_per_page: u32,
    /// Lifetime of a login session in days
    #[serde(default = "default_session_days")]
    pub session_days: i64,
    /// URL prefix of the default site (category and tag admin)
    #[serde(default = "default_super_admin_prefix")]
    pub super_admin_prefix: String,
    /// URL prefix of the custom site (post admin)
    #[serde(default = "default_custom_admin_prefix")]
    pub custom_admin_prefix: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            list_per_page: default_list_per_page(),
            session_days: default_session_days(),
            super_admin_prefix: default_super_admin_prefix(),
            custom_admin_prefix: default_custom_admin_prefix(),
        }
    }
}

fn default_list_per_page() -> u32 {
    100
}

fn default_session_days() -> i64 {
    14
}

fn default_super_admin_prefix() -> String {
    "/super_admin".to_string()
}

fn default_custom_admin_prefix() -> String {
    "/admin".to_string()
}

/// Error type for configuration parsing
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {message}")]
    ParseError { path: String, message: String },
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

impl Config {
    /// Load configuration from file
    ///
    /// A missing or empty file yields the default configuration. Invalid
    /// YAML is an error carrying the line and column of the problem.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config =
            serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError {
                path: path.display().to_string(),
                message: format_yaml_error(&e),
            })?;

        config.validate()?;

        Ok(config)
    }

    /// Load configuration from file with environment variable overrides
    ///
    /// Recognized variables:
    /// - TYPEIDEA_SERVER_HOST
    /// - TYPEIDEA_SERVER_PORT
    /// - TYPEIDEA_DATABASE_DRIVER
    /// - TYPEIDEA_DATABASE_URL
    /// - TYPEIDEA_ADMIN_LIST_PER_PAGE
    /// - TYPEIDEA_ADMIN_SESSION_DAYS
    pub fn load_with_env(path: &std::path::Path) -> anyhow::Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("TYPEIDEA_SERVER_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("TYPEIDEA_SERVER_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.server.port = port;
            }
        }

        if let Ok(driver) = std::env::var("TYPEIDEA_DATABASE_DRIVER") {
            match driver.to_lowercase().as_str() {
                "sqlite" => self.database.driver = DatabaseDriver::Sqlite,
                "mysql" => self.database.driver = DatabaseDriver::Mysql,
                _ => {} // Ignore invalid values
            }
        }
        if let Ok(url) = std::env::var("TYPEIDEA_DATABASE_URL") {
            self.database.url = url;
        }

        if let Ok(per_page) = std::env::var("TYPEIDEA_ADMIN_LIST_PER_PAGE") {
            if let Ok(per_page) = per_page.parse::<u32>() {
                self.admin.list_per_page = per_page;
            }
        }
        if let Ok(days) = std::env::var("TYPEIDEA_ADMIN_SESSION_DAYS") {
            if let Ok(days) = days.parse::<i64>() {
                self.admin.session_days = days;
            }
        }
    }

    /// Reject values the admin cannot work with
    fn validate(&self) -> Result<(), ConfigError> {
        if self.admin.list_per_page == 0 {
            return Err(ConfigError::ValidationError(
                "admin.list_per_page must be greater than zero".to_string(),
            ));
        }
        if self.admin.session_days <= 0 {
            return Err(ConfigError::ValidationError(
                "admin.session_days must be greater than zero".to_string(),
            ));
        }
        for prefix in [&self.admin.super_admin_prefix, &self.admin.custom_admin_prefix] {
            if !prefix.starts_with('/') || prefix.len() < 2 || prefix.ends_with('/') {
                return Err(ConfigError::ValidationError(format!(
                    "admin site prefix must look like '/name', got '{}'",
                    prefix
                )));
            }
        }
        if self.admin.super_admin_prefix == self.admin.custom_admin_prefix {
            return Err(ConfigError::ValidationError(
                "admin site prefixes must differ".to_string(),
            ));
        }
        Ok(())
    }
}

/// Format YAML parsing error with location and context
fn format_yaml_error(e: &serde_yaml::Error) -> String {
    if let Some(location) = e.location() {
        format!(
            "at line {}, column {}: {}",
            location.line(),
            location.column(),
            e
        )
    } else {
        e.to_string()
    }
}

// Environment variables are process-global; tests touching them take this lock.
#[cfg(test)]
static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn valid_admin_config_strategy() -> impl Strategy<Value = AdminConfig> {
        (1u32..=500, 1i64..=365, "[a-z]{2,10}", "[a-z]{2,10}")
            .prop_filter("prefixes must differ", |(_, _, a, b)| a != b)
            .prop_map(|(list_per_page, session_days, a, b)| AdminConfig {
                list_per_page,
                session_days,
                super_admin_prefix: format!("/{}", a),
                custom_admin_prefix: format!("/{}", b),
            })
    }

    fn valid_config_strategy() -> impl Strategy<Value = Config> {
        (
            "[a-z][a-z0-9]{0,10}",
            1u16..=65535,
            prop_oneof![Just(DatabaseDriver::Sqlite), Just(DatabaseDriver::Mysql)],
            "[a-z][a-z0-9_/]{0,20}\\.db",
            valid_admin_config_strategy(),
        )
            .prop_map(|(host, port, driver, url, admin)| Config {
                server: ServerConfig { host, port },
                database: DatabaseConfig { driver, url },
                admin,
            })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(20))]

        #[test]
        fn config_survives_yaml_roundtrip(config in valid_config_strategy()) {
            let yaml = serde_yaml::to_string(&config).unwrap();
            let mut file = NamedTempFile::new().unwrap();
            write!(file, "{}", yaml).unwrap();

            let loaded = Config::load(file.path()).unwrap();

            prop_assert_eq!(loaded.server.host, config.server.host);
            prop_assert_eq!(loaded.server.port, config.server.port);
            prop_assert_eq!(loaded.database.driver, config.database.driver);
            prop_assert_eq!(loaded.database.url, config.database.url);
            prop_assert_eq!(loaded.admin.list_per_page, config.admin.list_per_page);
            prop_assert_eq!(loaded.admin.session_days, config.admin.session_days);
            prop_assert_eq!(loaded.admin.super_admin_prefix, config.admin.super_admin_prefix);
            prop_assert_eq!(loaded.admin.custom_admin_prefix, config.admin.custom_admin_prefix);
        }

        #[test]
        fn partial_server_section_keeps_other_defaults(port in 1u16..=65535) {
            let mut file = NamedTempFile::new().unwrap();
            write!(file, "server:\n  port: {}\n", port).unwrap();

            let loaded = Config::load(file.path()).unwrap();

            prop_assert_eq!(loaded.server.port, port);
            prop_assert_eq!(loaded.admin.list_per_page, 100);
            prop_assert_eq!(loaded.database.driver, DatabaseDriver::Sqlite);
        }
    }
}
