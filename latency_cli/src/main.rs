mod commands;
mod ui;

use clap::{Parser, Subcommand};
use latency_core::CategoryFilter;
use std::path::PathBuf;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;

#[derive(Parser)]
#[command(name = "latency")]
#[command(about = "Per-origin endpoint latency summaries from request lifecycle events", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Engine config file (YAML, TOML, or JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Store file, overriding the config
    #[arg(short, long, global = true)]
    store: Option<PathBuf>,

    /// Also write logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a request event trace into the store
    Replay {
        /// Path to trace file (.jsonl, .json, .yaml)
        trace_file: PathBuf,

        /// Write the replay report as JSON
        #[arg(long)]
        report_json: Option<PathBuf>,
    },

    /// Show the endpoint summary for a profile
    Show {
        /// Origin such as https://a.com, or a bare host
        profile: String,

        /// Category filter, e.g. "JS,Img"; defaults to the saved filter
        #[arg(short, long)]
        filter: Option<CategoryFilter>,
    },

    /// Export a profile summary
    Export {
        profile: String,

        #[arg(short, long)]
        filter: Option<CategoryFilter>,

        #[arg(long, value_enum, default_value = "json")]
        format: commands::export::ExportFormat,

        /// Output file; "-" for stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Clear all recorded endpoints for a profile
    Clear { profile: String },

    /// Show or set the saved category filter for a profile
    Filter {
        profile: String,

        /// Categories to select; "All" resets
        categories: Vec<String>,
    },

    /// Print the badge text for a profile under its saved filter
    Badge { profile: String },

    /// List profiles with recorded endpoints
    Profiles,

    /// List endpoint categories
    Categories,

    /// Validate an engine config file
    Validate { config_file: PathBuf },
}

fn init_logging(cli: &Cli) -> anyhow::Result<Option<WorkerGuard>> {
    let log_level = if cli.verbose {
        Level::DEBUG
    } else if cli.quiet {
        Level::ERROR
    } else {
        Level::INFO
    };

    match &cli.log_file {
        Some(path) => {
            let directory = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."));
            let file_name = path
                .file_name()
                .ok_or_else(|| anyhow::anyhow!("--log-file must name a file"))?;
            let appender = tracing_appender::rolling::never(directory, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);

            tracing_subscriber::fmt()
                .with_max_level(log_level)
                .with_target(false)
                .with_ansi(false)
                .with_writer(writer)
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::fmt()
                .with_max_level(log_level)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
            Ok(None)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _log_guard = init_logging(&cli)?;

    let ctx = commands::Context {
        config: cli.config,
        store: cli.store,
    };

    match cli.command {
        Commands::Replay {
            trace_file,
            report_json,
        } => {
            commands::replay::execute(&ctx, trace_file, report_json).await?;
        }

        Commands::Show { profile, filter } => {
            commands::show::execute(&ctx, profile, filter).await?;
        }

        Commands::Export {
            profile,
            filter,
            format,
            output,
        } => {
            commands::export::execute(&ctx, profile, filter, format, output).await?;
        }

        Commands::Clear { profile } => {
            commands::clear::execute(&ctx, profile).await?;
        }

        Commands::Filter {
            profile,
            categories,
        } => {
            commands::filter::execute(&ctx, profile, categories).await?;
        }

        Commands::Badge { profile } => {
            commands::badge::execute(&ctx, profile).await?;
        }

        Commands::Profiles => {
            commands::profiles::execute(&ctx).await?;
        }

        Commands::Categories => {
            commands::categories::execute().await?;
        }

        Commands::Validate { config_file } => {
            commands::validate::execute(config_file).await?;
        }
    }

    Ok(())
}
