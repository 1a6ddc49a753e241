//! Cascade CLI
//!
//! Migration helpers for databases managed with Cascade.
//!
//! # Commands
//!
//! - `create-index` - Print an index construction statement
//! - `version` - Show version information

mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// Cascade migration helpers.
#[derive(Parser)]
#[command(name = "cascade")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print a CREATE INDEX statement
    CreateIndex {
        /// Database engine (mysql, postgres, sqlite)
        #[arg(short, long)]
        engine: String,

        /// Table to index
        #[arg(short, long)]
        table: String,

        /// Index name
        #[arg(short, long)]
        name: String,

        /// Indexed columns, in order
        #[arg(short, long, value_delimiter = ',', required = true)]
        columns: Vec<String>,

        /// Create a unique index
        #[arg(short, long)]
        unique: bool,

        /// Tolerate table names stored with different case
        #[arg(short = 'i', long)]
        case_insensitive: bool,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::CreateIndex {
            engine,
            table,
            name,
            columns,
            unique,
            case_insensitive,
        } => {
            commands::index::run(&engine, &table, &name, &columns, unique, case_insensitive)?;
        }
        Commands::Version => {
            println!("Cascade CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("Cascade Core v{}", cascade_core::VERSION);
        }
    }

    Ok(())
}
