use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tasklift::commands;
use tasklift::commands::init::OwnerArgs;
use tasklift::commands::migrate::MigrateArgs;
use tasklift::config::{DEFAULT_CONFIG_FILE, DEFAULT_CONNECTION};
use tasklift::output::Format;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "tasklift",
    version,
    about = "Migrate a schema-per-space legacy task tracker into applications"
)]
struct Cli {
    /// Output format
    #[arg(long, global = true, value_enum, default_value = "json")]
    format: Format,
    /// Shorthand for --format pretty
    #[arg(long, global = true, hide = true)]
    pretty: bool,
    /// Config file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,
    /// Only log warnings and errors
    #[arg(long, short, global = true)]
    quiet: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a starter config and create the target schema
    Init {
        /// Legacy SQLite database registered as the default connection
        #[arg(long, default_value = "legacy.db")]
        legacy: PathBuf,
        /// Target SQLite database
        #[arg(long, default_value = "target.db")]
        target: PathBuf,
        /// Create (or reuse) an admin user that owns migrated services
        #[arg(long)]
        owner_email: Option<String>,
        /// Display name for the owner user
        #[arg(long, requires = "owner_email")]
        owner_name: Option<String>,
    },
    /// Check the legacy schema and target readiness without migrating
    Preflight {
        /// Named legacy connection from the config file
        #[arg(long, default_value = DEFAULT_CONNECTION)]
        connection: String,
    },
    /// Migrate legacy tasks into applications
    Migrate {
        /// Named legacy connection from the config file
        #[arg(long, default_value = DEFAULT_CONNECTION)]
        connection: String,
        /// Tasks fetched per chunk (defaults to the config value)
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        chunk_size: Option<u64>,
        /// Stop after this many tasks
        #[arg(long)]
        limit: Option<usize>,
        /// Only migrate tasks of this legacy list
        #[arg(long)]
        list_id: Option<i64>,
        /// Only migrate this legacy task
        #[arg(long)]
        task_id: Option<i64>,
        /// Resolve and count everything, write nothing
        #[arg(long)]
        dry_run: bool,
        /// Do not import finance transactions
        #[arg(long)]
        skip_payments: bool,
    },
}

fn init_logging(quiet: bool) {
    let fallback = if quiet { "tasklift=warn" } else { "tasklift=info" };
    let filter = if quiet {
        EnvFilter::new(fallback)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| fallback.into())
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli, format: Format) -> tasklift::error::Result<()> {
    match cli.command {
        Commands::Init {
            legacy,
            target,
            owner_email,
            owner_name,
        } => commands::init::run(
            &cli.config,
            legacy,
            target,
            OwnerArgs {
                name: owner_name,
                email: owner_email,
            },
            format,
        ),
        Commands::Preflight { connection } => {
            commands::preflight::run(&cli.config, &connection, format)
        }
        Commands::Migrate {
            connection,
            chunk_size,
            limit,
            list_id,
            task_id,
            dry_run,
            skip_payments,
        } => commands::migrate::run(
            &cli.config,
            MigrateArgs {
                connection,
                chunk_size: chunk_size.map(|size| size as usize),
                limit,
                list_id,
                task_id,
                dry_run,
                skip_payments,
            },
            format,
        ),
    }
}

fn main() {
    let cli = Cli::parse();
    let format = if cli.pretty {
        Format::Pretty
    } else {
        cli.format
    };
    init_logging(cli.quiet);
    if let Err(e) = run(cli, format) {
        match format {
            Format::Json => {
                eprintln!(
                    "{}",
                    serde_json::json!({
                        "error": e.code(),
                        "message": e.to_string()
                    })
                );
            }
            _ => eprintln!("error: {e}"),
        }
        std::process::exit(1);
    }
}
