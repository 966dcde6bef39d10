//! sifter CLI entry point

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use sifter::{
    alert::create_alerter,
    commands::{
        cmd_add_urls, cmd_init, cmd_list_tasks, cmd_run, cmd_serve, cmd_status, print_added_urls,
        print_cycle_report, print_init, print_status, print_tasks, InitOptions,
    },
    config::Config,
    error::{Error, Result},
    progress::LogWriterFactory,
    store::{TaskFilter, TaskStatus, TaskType, UrlSource, UrlStore},
};
use std::path::{Path, PathBuf};
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "sifter")]
#[command(version, about = "Probe, enrich and triage collected URLs", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize sifter configuration and database
    Init {
        /// Force overwrite existing config
        #[arg(long)]
        force: bool,
    },

    /// Queue URLs for processing
    Add {
        /// URLs to add
        #[arg(required = true)]
        urls: Vec<String>,

        /// Collector metadata as a JSON object (name, description, record_formats, ...)
        #[arg(long)]
        metadata: Option<String>,

        /// How the URLs were found (collector or manual)
        #[arg(long, default_value = "manual")]
        source: UrlSource,
    },

    /// Run one task cycle and exit
    Run,

    /// Run a task cycle, then keep running scheduled tasks until Ctrl-C
    Serve,

    /// Show URL and task counts
    Status,

    /// List recent tasks
    Tasks {
        /// Maximum number of tasks
        #[arg(short, long, default_value = "20")]
        limit: i64,

        /// Only tasks of this type (e.g. probe, html, root_url)
        #[arg(long = "type")]
        task_type: Option<TaskType>,

        /// Only tasks with this status (in_process, ready_to_label, error, aborted)
        #[arg(long)]
        status: Option<TaskStatus>,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(LogWriterFactory::default()))
        .with(filter)
        .init();

    // Commands that don't need an existing config
    match cli.command {
        Commands::Init { force } => {
            let config = cmd_init(InitOptions::from_config_arg(cli.config, force)).await?;
            if cli.json {
                println!(
                    "{}",
                    serde_json::json!({
                        "config_path": config.paths.config_file,
                        "db_path": config.paths.db_file,
                    })
                );
            } else {
                print_init(&config);
            }
            return Ok(());
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "sifter", &mut std::io::stdout());
            return Ok(());
        }
        _ => {}
    }

    let config = load_config(cli.config.as_deref())?;
    let store = UrlStore::new(&config.paths.db_file).await?;
    let alerter = create_alerter(&config.alerts)?;

    match cli.command {
        Commands::Init { .. } | Commands::Completions { .. } => unreachable!(),

        Commands::Add {
            urls,
            metadata,
            source,
        } => {
            let added = cmd_add_urls(&store, &urls, metadata.as_deref(), source).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&added)?);
            } else {
                print_added_urls(&added);
            }
        }

        Commands::Run => {
            let report = cmd_run(&config, &store, alerter).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_cycle_report(&report);
            }
        }

        Commands::Serve => {
            cmd_serve(&config, &store, alerter).await?;
        }

        Commands::Status => {
            let status = cmd_status(&config, &store).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                print_status(&status);
            }
        }

        Commands::Tasks {
            limit,
            task_type,
            status,
        } => {
            let filter = TaskFilter {
                task_type,
                task_status: status,
                limit,
            };
            let tasks = cmd_list_tasks(&store, &filter).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&tasks)?);
            } else {
                print_tasks(&tasks);
            }
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let config_path = match path {
        Some(path) if path.is_dir() => path.join("config.toml"),
        Some(path) => path.to_path_buf(),
        None => Config::default_config_path(),
    };

    if !config_path.exists() {
        return Err(Error::NotInitialized);
    }

    Config::load(&config_path)
}
