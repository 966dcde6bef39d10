//! Init command implementation

use crate::config::Config;
use crate::error::{Error, Result};
use crate::store::UrlStore;
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Clone)]
pub struct InitOptions {
    pub base_dir: PathBuf,
    pub config_path: PathBuf,
    pub force: bool,
}

impl InitOptions {
    /// Resolve where to initialize from an optional `--config` argument.
    ///
    /// A `.toml` path names the config file itself; anything else is taken
    /// as the directory to hold it.
    pub fn from_config_arg(config: Option<PathBuf>, force: bool) -> Self {
        let (base_dir, config_path) = match config {
            Some(path) if path.extension().is_some_and(|e| e == "toml") => {
                let base = path
                    .parent()
                    .filter(|p| !p.as_os_str().is_empty())
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("."));
                (base, path)
            }
            Some(dir) => (dir.clone(), dir.join("config.toml")),
            None => {
                let base = Config::default_base_dir();
                (base.clone(), base.join("config.toml"))
            }
        };
        Self {
            base_dir,
            config_path,
            force,
        }
    }
}

/// Write a default config and create the database schema
pub async fn cmd_init(options: InitOptions) -> Result<Config> {
    let InitOptions {
        base_dir,
        config_path,
        force,
    } = options;

    if config_path.exists() && !force {
        return Err(Error::AlreadyInitialized(format!(
            "{} (use --force to overwrite)",
            config_path.display()
        )));
    }

    let mut config = Config::default();
    config.init_paths(Some(base_dir));
    config.paths.config_file = config_path;
    config.validate()?;
    config.save()?;

    let store = UrlStore::connect(&config).await?;
    store.init_schema().await?;
    info!("Created database at {:?}", config.paths.db_file);

    Ok(config)
}

pub fn print_init(config: &Config) {
    println!("✓ Initialized sifter at {:?}", config.paths.base_dir);
    println!("\nConfiguration: {:?}", config.paths.config_file);
    println!("Database: {:?}", config.paths.db_file);
    println!("\nNext steps:");
    println!("  sifter add https://example.gov/records   # Queue URLs");
    println!("  sifter run                               # Run one task cycle");
    println!("  sifter serve                             # Run on a schedule");
}
