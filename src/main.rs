//! cecdb CLI - load the CEC research dataset into SQLite

mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use cecdb::config::{self, CecConfig};
use cecdb::UnresolvedPolicy;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "cecdb")]
#[command(version)]
#[command(about = "Load departments, capabilities, faculty and grants CSVs into a SQLite database")]
#[command(long_about = r#"
cecdb materializes the CEC research dataset into a SQLite store:
  • Column contracts checked before any write
  • Department, capability and faculty names resolved to stable ids
  • Every table replaced in one transaction, foreign keys enforced

Example usage:
  cecdb init
  cecdb load
  cecdb rebuild --unresolved skip
  cecdb scrape-faculty --input faculty_entries.txt
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to the config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Path to the database file (overrides config)
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    /// Directory holding the source CSVs (overrides config)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// What to do with unresolvable references: abort or skip (overrides config)
    #[arg(long, global = true)]
    unresolved: Option<UnresolvedPolicy>,

    /// Output format
    #[arg(short, long, global = true, value_enum, default_value = "human")]
    format: OutputMode,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a config file and create an empty schema
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },

    /// Apply the schema, or drop and recreate it
    Schema {
        /// Drop every table (dependents first) and recreate it empty
        #[arg(long)]
        reset: bool,
    },

    /// Replace every table with the contents of the source CSVs
    Load,

    /// Reset the schema and load, in one transaction
    Rebuild,

    /// Row counts and content fingerprints per table
    Stats,

    /// Report rows whose foreign keys point nowhere
    Check,

    /// Parse extracted faculty catalog text and append it to the faculty CSV
    ScrapeFaculty {
        /// Text file with one entry per blank-line separated block
        #[arg(short, long)]
        input: PathBuf,

        /// Faculty CSV to append to (defaults to the configured source)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Parse extracted grant announcements and append them to the grants CSV
    ScrapeGrants {
        /// Text file with one announcement per blank-line separated block
        #[arg(short, long)]
        input: PathBuf,

        /// Grants CSV to append to (defaults to the configured source)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputMode {
    Human,
    Json,
}

impl OutputMode {
    pub fn is_human(self) -> bool {
        self == OutputMode::Human
    }
}

/// Print a machine-readable success document
pub fn emit_success(output_mode: OutputMode, command: &str, data: serde_json::Value) -> anyhow::Result<()> {
    if output_mode == OutputMode::Json {
        let doc = serde_json::json!({
            "ok": true,
            "command": command,
            "data": data,
        });
        println!("{}", serde_json::to_string_pretty(&doc)?);
    }
    Ok(())
}

/// Config file values with command-line overrides applied
fn effective_config(cli: &Cli) -> anyhow::Result<CecConfig> {
    let mut config = config::load_config(cli.config.as_deref())?.unwrap_or_default();
    if let Some(database) = &cli.database {
        config.database = database.display().to_string();
    }
    if let Some(data_dir) = &cli.data_dir {
        config.data_dir = data_dir.display().to_string();
    }
    if let Some(policy) = cli.unresolved {
        config.unresolved = policy;
    }
    Ok(config)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let config = effective_config(&cli)?;
    tracing::debug!(?config, "effective configuration");

    let result = match &cli.command {
        Commands::Init { force } => {
            let path = cli.config.clone().unwrap_or_else(config::default_config_path);
            commands::run_init(&path, &config, *force)
        }
        Commands::Schema { reset } => commands::run_schema(&config, *reset),
        Commands::Load => commands::run_load(&config, cli.format),
        Commands::Rebuild => commands::run_rebuild(&config, cli.format),
        Commands::Stats => commands::run_stats(&config, cli.format),
        Commands::Check => commands::run_check(&config, cli.format),
        Commands::ScrapeFaculty { input, output } => {
            commands::run_scrape_faculty(&config, input, output.as_deref(), cli.format)
        }
        Commands::ScrapeGrants { input, output } => {
            commands::run_scrape_grants(&config, input, output.as_deref(), cli.format)
        }
    };

    if let Err(err) = result {
        cecdb::ui::error(&format!("{:#}", err));
        std::process::exit(1);
    }
    Ok(())
}
