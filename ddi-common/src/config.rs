//! Configuration loading and root folder resolution
//!
//! Bootstrap configuration comes from a TOML file. Resolution priority:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. OS-dependent compiled default (fallback)
//!
//! A few secrets and endpoints can additionally be overridden from the
//! environment (`DDI_BASE_UUID`, `DDI_WEBHOOK_SECRET`, `DDI_SEARCH_URL`).

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Environment variable holding the root folder
pub const ENV_ROOT_FOLDER: &str = "DDI_ROOT_FOLDER";
/// Environment variable holding an explicit config file path
pub const ENV_CONFIG: &str = "DDI_CONFIG";
/// Environment override for the base namespace
pub const ENV_BASE_UUID: &str = "DDI_BASE_UUID";
/// Environment override for the webhook secret
pub const ENV_WEBHOOK_SECRET: &str = "DDI_WEBHOOK_SECRET";
/// Environment override for the search endpoint
pub const ENV_SEARCH_URL: &str = "DDI_SEARCH_URL";

/// Base namespace used when the configuration names none
pub const DEFAULT_BASE_UUID: Uuid = Uuid::from_u128(0x7f3a_3c9e_5d1b_4e8a_9c2f_0b6d_4a1e_8f25);

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Deserialize)]
pub struct DdiConfig {
    /// Root folder holding the database and cloned repositories
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    /// SQLite database file (default: `<root>/ddi.db`)
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// Namespace for root entity ids
    #[serde(default = "default_base_uuid")]
    pub base_uuid: Uuid,

    /// Directory inside each study repository holding import files
    #[serde(default = "default_import_subdir")]
    pub import_subdir: String,

    /// Where study repositories are cloned (default: `<root>/repos`)
    #[serde(default)]
    pub repos_dir: Option<PathBuf>,

    /// Git URL of the system repository (studies.csv)
    #[serde(default)]
    pub system_repo: Option<String>,

    /// Number of concurrent import jobs
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Capacity of the id derivation memo cache
    #[serde(default = "default_id_cache_capacity")]
    pub id_cache_capacity: usize,

    /// Shared secret for push webhooks (unsigned webhooks are rejected when set)
    #[serde(default)]
    pub webhook_secret: Option<String>,

    /// HTTP bind address for the portal
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Search backend configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SearchConfig {
    /// Elasticsearch base URL; search indexing is disabled when absent
    #[serde(default)]
    pub url: Option<String>,

    /// Prefix for index names (`<prefix>.<document type>`)
    #[serde(default = "default_index_prefix")]
    pub index_prefix: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            url: None,
            index_prefix: default_index_prefix(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_base_uuid() -> Uuid {
    DEFAULT_BASE_UUID
}

fn default_import_subdir() -> String {
    "ddionrails".to_string()
}

fn default_workers() -> usize {
    4
}

fn default_id_cache_capacity() -> usize {
    crate::ids::DEFAULT_CACHE_CAPACITY
}

fn default_bind_address() -> String {
    "127.0.0.1:5730".to_string()
}

fn default_index_prefix() -> String {
    "ddionrails".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for DdiConfig {
    fn default() -> Self {
        Self {
            root_folder: None,
            database_path: None,
            base_uuid: default_base_uuid(),
            import_subdir: default_import_subdir(),
            repos_dir: None,
            system_repo: None,
            workers: default_workers(),
            id_cache_capacity: default_id_cache_capacity(),
            webhook_secret: None,
            bind_address: default_bind_address(),
            search: SearchConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl DdiConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Invalid config: {}", e)))
    }

    /// Load configuration following the priority order
    ///
    /// `cli_config` is an explicit config file path; `cli_root` an explicit root folder.
    pub fn load(cli_config: Option<&Path>, cli_root: Option<&Path>) -> Result<Self> {
        let mut config = match config_file_path(cli_config)? {
            Some(path) => {
                let content = std::fs::read_to_string(&path).map_err(|e| {
                    Error::Config(format!("Cannot read config file {}: {}", path.display(), e))
                })?;
                tracing::info!(path = %path.display(), "Loaded configuration file");
                Self::from_toml_str(&content)?
            }
            None => {
                tracing::debug!("No configuration file found, using defaults");
                Self::default()
            }
        };

        config.root_folder = Some(resolve_root_folder(cli_root, config.root_folder.as_deref()));
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `DDI_BASE_UUID`, `DDI_WEBHOOK_SECRET` and `DDI_SEARCH_URL`
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(value) = std::env::var(ENV_BASE_UUID) {
            self.base_uuid = Uuid::parse_str(value.trim())
                .map_err(|e| Error::Config(format!("{} is not a UUID: {}", ENV_BASE_UUID, e)))?;
        }
        if let Ok(value) = std::env::var(ENV_WEBHOOK_SECRET) {
            self.webhook_secret = Some(value);
        }
        if let Ok(value) = std::env::var(ENV_SEARCH_URL) {
            self.search.url = Some(value);
        }
        Ok(())
    }

    /// Reject configurations that cannot run
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(Error::Config("workers must be at least 1".to_string()));
        }
        if self.import_subdir.trim().is_empty() {
            return Err(Error::Config("import_subdir must not be empty".to_string()));
        }
        Ok(())
    }

    /// Resolved root folder
    pub fn root_folder(&self) -> PathBuf {
        self.root_folder
            .clone()
            .unwrap_or_else(get_default_root_folder)
    }

    /// Resolved database file
    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| self.root_folder().join("ddi.db"))
    }

    /// Resolved repository checkout directory
    pub fn repos_dir(&self) -> PathBuf {
        self.repos_dir
            .clone()
            .unwrap_or_else(|| self.root_folder().join("repos"))
    }

    /// Local checkout of a study repository
    pub fn study_repo_path(&self, study_name: &str) -> PathBuf {
        self.repos_dir().join(study_name)
    }

    /// Local checkout of the system repository
    pub fn system_repo_path(&self) -> PathBuf {
        self.repos_dir().join("_system")
    }
}

/// Root folder resolution: CLI argument, environment, config file, default
pub fn resolve_root_folder(cli_arg: Option<&Path>, config_value: Option<&Path>) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(ENV_ROOT_FOLDER) {
        return PathBuf::from(path);
    }

    if let Some(path) = config_value {
        return path.to_path_buf();
    }

    get_default_root_folder()
}

/// Locate the config file: explicit path, `DDI_CONFIG`, then platform locations
fn config_file_path(cli_config: Option<&Path>) -> Result<Option<PathBuf>> {
    if let Some(path) = cli_config {
        if !path.exists() {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        return Ok(Some(path.to_path_buf()));
    }

    if let Ok(path) = std::env::var(ENV_CONFIG) {
        let path = PathBuf::from(path);
        if !path.exists() {
            return Err(Error::Config(format!(
                "{} points to a missing file: {}",
                ENV_CONFIG,
                path.display()
            )));
        }
        return Ok(Some(path));
    }

    let user_config = dirs::config_dir().map(|d| d.join("ddi").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Ok(Some(path));
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/ddi/config.toml");
        if system_config.exists() {
            return Ok(Some(system_config));
        }
    }

    Ok(None)
}

/// Get OS-dependent default root folder path
fn get_default_root_folder() -> PathBuf {
    if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("ddi"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\ddi"))
    } else {
        dirs::data_local_dir()
            .map(|d| d.join("ddi"))
            .unwrap_or_else(|| PathBuf::from("./ddi_data"))
    }
}
