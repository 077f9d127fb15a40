//! classmap command-line tool
//!
//! Imports class schemas into a table store, prints the DDL a schema maps to,
//! diffs two schema versions and browses the catalog.

mod commands;
mod formatter;

use clap::{Parser, Subcommand, ValueEnum};
use formatter::OutputFormat;
use std::path::PathBuf;

/// Store backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// sled trees (table definitions and catalog)
    Sled,
    /// SQLite database file (real tables)
    Sqlite,
}

/// Foreign key column naming policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FkNaming {
    /// `<Class>Id`, `<Class>Id_2`, ...
    Ordinal,
    /// `<Class>__src_01_id` / `<Class>__trg_01_id`
    EndpointSuffixed,
}

/// classmap - class schema to relational table mapping
#[derive(Parser, Debug)]
#[command(name = "classmap")]
#[command(version, about = "Class schema to relational table mapping")]
pub struct Args {
    /// Store location (directory for sled, file for SQLite)
    #[arg(long, global = true, default_value = "./classmap_data")]
    pub data: PathBuf,

    /// Store backend
    #[arg(long, global = true, default_value = "sled", value_enum)]
    pub backend: Backend,

    /// Output format
    #[arg(long, global = true, default_value = "table", value_enum)]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Command,
}

/// Mapping options shared by `import` and `ddl`.
#[derive(clap::Args, Debug, Clone)]
pub struct MappingArgs {
    /// JSON file of column renames (`{"Owner.path": "Column"}`)
    #[arg(long)]
    pub renames: Option<PathBuf>,

    /// Foreign key column naming policy
    #[arg(long, default_value = "ordinal", value_enum)]
    pub fk_naming: FkNaming,

    /// Map class groups on one thread
    #[arg(long)]
    pub sequential: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Import a schema into the store
    Import {
        /// Schema JSON file
        schema: PathBuf,

        #[command(flatten)]
        mapping: MappingArgs,

        /// Plan only, leave the store untouched
        #[arg(long)]
        dry_run: bool,

        /// Allow dropping and recreating every table on a major version change
        #[arg(long)]
        replace: bool,
    },
    /// Print the DDL creating a schema's tables
    Ddl {
        /// Schema JSON file
        schema: PathBuf,

        #[command(flatten)]
        mapping: MappingArgs,
    },
    /// Compare two schema files
    Diff {
        /// Older schema JSON file
        from: PathBuf,
        /// Newer schema JSON file
        to: PathBuf,
    },
    /// Browse the catalog
    Show {
        /// Schema to show; lists every schema when omitted
        schema: Option<String>,

        /// Show one table's columns
        #[arg(long)]
        table: Option<String>,
    },
}

fn main() {
    // Initialize tracing
    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    if let Ok(directive) = "classmap_cli=info".parse() {
        filter = filter.add_directive(directive);
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    match commands::run(args) {
        Ok(outcome) => {
            println!("{}", outcome.output);
            if !outcome.success {
                std::process::exit(1);
            }
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
