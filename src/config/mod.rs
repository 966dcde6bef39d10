//! Configuration management for sifter
//!
//! Handles loading, saving, and validating configuration from TOML files.

mod defaults;

pub use defaults::*;

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// URL probing configuration
    #[serde(default)]
    pub probe: ProbeConfig,

    /// Task manager and operator configuration
    #[serde(default)]
    pub tasks: TaskConfig,

    /// Scheduled registry configuration
    #[serde(default)]
    pub schedule: ScheduleConfig,

    /// External collaborator services
    #[serde(default)]
    pub services: ServicesConfig,

    /// Alert sink configuration
    #[serde(default)]
    pub alerts: AlertConfig,

    /// Paths configuration (internal, not user-editable)
    #[serde(skip)]
    pub paths: PathsConfig,
}

/// URL probing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// User agent string
    #[serde(default = "default_probe_user_agent")]
    pub user_agent: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_probe_timeout")]
    pub timeout_secs: u64,

    /// Deadline for one whole batch of probes, in seconds
    #[serde(default = "default_probe_batch_timeout")]
    pub batch_timeout_secs: u64,

    /// Maximum requests in flight per batch
    #[serde(default = "default_probe_max_concurrency")]
    pub max_concurrency: usize,

    /// Maximum redirect hops followed per request
    #[serde(default = "default_probe_max_redirects")]
    pub max_redirects: usize,
}

/// Task manager configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Consecutive runs of one operator allowed per cycle before alerting
    #[serde(default = "default_repeat_threshold")]
    pub repeat_threshold: u32,

    /// URLs selected per operator run
    #[serde(default = "default_task_batch_size")]
    pub batch_size: i64,

    /// Days before a URL becomes eligible for another 404 probe
    #[serde(default = "default_probe_404_window_days")]
    pub probe_404_window_days: i64,

    /// Per-operator enable flags
    #[serde(default)]
    pub enabled: OperatorToggles,
}

/// Enable flags for each URL operator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatorToggles {
    #[serde(default = "default_operator_enabled")]
    pub probe: bool,

    #[serde(default = "default_operator_enabled")]
    pub html: bool,

    #[serde(default = "default_operator_enabled")]
    pub duplicate: bool,

    #[serde(default = "default_operator_enabled")]
    pub probe_404: bool,

    #[serde(default = "default_operator_enabled")]
    pub record_type: bool,

    #[serde(default = "default_operator_enabled")]
    pub agency_identification: bool,

    #[serde(default = "default_operator_enabled")]
    pub root_url: bool,

    #[serde(default = "default_operator_enabled")]
    pub misc_metadata: bool,

    #[serde(default = "default_operator_enabled")]
    pub submit_approved: bool,

    #[serde(default = "default_operator_enabled")]
    pub relevancy: bool,
}

/// Scheduled registry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Start scheduled operators when serving
    #[serde(default = "default_schedule_enabled")]
    pub enabled: bool,

    /// Minutes between URL task cycles
    #[serde(default = "default_run_url_tasks_interval")]
    pub run_url_tasks_interval_mins: u64,

    /// Minutes between backlog snapshots
    #[serde(default = "default_backlog_snapshot_interval")]
    pub backlog_snapshot_interval_mins: u64,
}

/// External collaborator services
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServicesConfig {
    /// Base URL of the data-sources API (duplicate checks, submissions)
    #[serde(
        default = "default_data_sources_url",
        skip_serializing_if = "Option::is_none"
    )]
    pub data_sources_url: Option<String>,

    /// Environment variable holding the data-sources API key
    #[serde(default = "default_data_sources_api_key_env")]
    pub data_sources_api_key_env: String,

    /// Requests per second allowed against the data-sources API
    #[serde(default = "default_data_sources_rate_limit")]
    pub data_sources_rate_limit: u32,

    /// Record type classifier endpoint
    #[serde(
        default = "default_record_type_classifier_url",
        skip_serializing_if = "Option::is_none"
    )]
    pub record_type_classifier_url: Option<String>,

    /// Relevancy classifier endpoint
    #[serde(
        default = "default_relevancy_classifier_url",
        skip_serializing_if = "Option::is_none"
    )]
    pub relevancy_classifier_url: Option<String>,

    /// Agency identification endpoint
    #[serde(
        default = "default_agency_identifier_url",
        skip_serializing_if = "Option::is_none"
    )]
    pub agency_identifier_url: Option<String>,
}

/// Alert sink configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertConfig {
    /// Discord-compatible webhook; alerts are only logged when unset
    #[serde(
        default = "default_discord_webhook_url",
        skip_serializing_if = "Option::is_none"
    )]
    pub discord_webhook_url: Option<String>,
}

/// Internal paths configuration
#[derive(Debug, Clone, Default)]
pub struct PathsConfig {
    /// Base directory for sifter data
    pub base_dir: PathBuf,

    /// Path to config file
    pub config_file: PathBuf,

    /// Path to SQLite database
    pub db_file: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            probe: ProbeConfig::default(),
            tasks: TaskConfig::default(),
            schedule: ScheduleConfig::default(),
            services: ServicesConfig::default(),
            alerts: AlertConfig::default(),
            paths: PathsConfig::default(),
        }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            user_agent: default_probe_user_agent(),
            timeout_secs: default_probe_timeout(),
            batch_timeout_secs: default_probe_batch_timeout(),
            max_concurrency: default_probe_max_concurrency(),
            max_redirects: default_probe_max_redirects(),
        }
    }
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            repeat_threshold: default_repeat_threshold(),
            batch_size: default_task_batch_size(),
            probe_404_window_days: default_probe_404_window_days(),
            enabled: OperatorToggles::default(),
        }
    }
}

impl Default for OperatorToggles {
    fn default() -> Self {
        Self {
            probe: true,
            html: true,
            duplicate: true,
            probe_404: true,
            record_type: true,
            agency_identification: true,
            root_url: true,
            misc_metadata: true,
            submit_approved: true,
            relevancy: true,
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            enabled: default_schedule_enabled(),
            run_url_tasks_interval_mins: default_run_url_tasks_interval(),
            backlog_snapshot_interval_mins: default_backlog_snapshot_interval(),
        }
    }
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            data_sources_url: default_data_sources_url(),
            data_sources_api_key_env: default_data_sources_api_key_env(),
            data_sources_rate_limit: default_data_sources_rate_limit(),
            record_type_classifier_url: default_record_type_classifier_url(),
            relevancy_classifier_url: default_relevancy_classifier_url(),
            agency_identifier_url: default_agency_identifier_url(),
        }
    }
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            discord_webhook_url: default_discord_webhook_url(),
        }
    }
}

impl Config {
    /// Get the default base directory for sifter (~/.sifter)
    pub fn default_base_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".sifter")
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        Self::default_base_dir().join("config.toml")
    }

    /// Initialize paths configuration
    pub fn init_paths(&mut self, base_dir: Option<PathBuf>) {
        let base = base_dir.unwrap_or_else(Self::default_base_dir);
        self.paths = PathsConfig {
            config_file: base.join("config.toml"),
            db_file: base.join("sifter.db"),
            base_dir: base,
        };
    }

    /// Load configuration from a specific file path
    pub fn load(config_path: &Path) -> Result<Self> {
        debug!("Loading config from {:?}", config_path);

        if !config_path.exists() {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                config_path.display()
            )));
        }

        let content = std::fs::read_to_string(config_path)?;
        let mut config: Config = toml::from_str(&content)?;

        let base = config_path.parent().unwrap_or(Path::new(".")).to_path_buf();
        config.paths = PathsConfig {
            config_file: config_path.to_path_buf(),
            db_file: base.join("sifter.db"),
            base_dir: base,
        };

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific base directory
    pub fn load_from(base_dir: Option<PathBuf>) -> Result<Self> {
        let mut config = Config::default();
        config.init_paths(base_dir);

        if config.paths.config_file.exists() {
            debug!("Loading config from {:?}", config.paths.config_file);
            let content = std::fs::read_to_string(&config.paths.config_file)?;
            let mut loaded: Config = toml::from_str(&content)?;
            loaded.paths = config.paths;
            config = loaded;
        } else {
            debug!("No config file found, using defaults");
        }

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.paths.config_file.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&self.paths.config_file, content)?;
        info!("Saved config to {:?}", self.paths.config_file);
        Ok(())
    }

    /// Get the data-sources API key from environment
    pub fn data_sources_api_key(&self) -> Option<String> {
        std::env::var(&self.services.data_sources_api_key_env).ok()
    }

    /// Check if sifter is initialized (config and DB exist)
    pub fn is_initialized(&self) -> bool {
        self.paths.config_file.exists() && self.paths.db_file.exists()
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.probe.timeout_secs == 0 {
            return Err(Error::Config(
                "probe.timeout_secs must be positive".to_string(),
            ));
        }

        if self.probe.batch_timeout_secs < self.probe.timeout_secs {
            return Err(Error::Config(
                "probe.batch_timeout_secs must be >= probe.timeout_secs".to_string(),
            ));
        }

        if self.probe.max_concurrency == 0 {
            return Err(Error::Config(
                "probe.max_concurrency must be positive".to_string(),
            ));
        }

        if self.tasks.repeat_threshold == 0 {
            return Err(Error::Config(
                "tasks.repeat_threshold must be positive".to_string(),
            ));
        }

        if self.tasks.batch_size <= 0 {
            return Err(Error::Config(
                "tasks.batch_size must be positive".to_string(),
            ));
        }

        if self.tasks.probe_404_window_days < 0 {
            return Err(Error::Config(
                "tasks.probe_404_window_days must not be negative".to_string(),
            ));
        }

        if self.schedule.run_url_tasks_interval_mins == 0
            || self.schedule.backlog_snapshot_interval_mins == 0
        {
            return Err(Error::Config(
                "schedule intervals must be positive".to_string(),
            ));
        }

        if self.services.data_sources_rate_limit == 0 {
            return Err(Error::Config(
                "services.data_sources_rate_limit must be positive".to_string(),
            ));
        }

        Ok(())
    }
}
