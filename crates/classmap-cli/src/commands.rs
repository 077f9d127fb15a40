//! Subcommand execution.

use crate::formatter::{create_formatter, Formatter};
use crate::{Args, Backend, Command, FkNaming, MappingArgs};
use classmap_core::mapping::{ColumnRenames, ForeignKeyNaming, SchemaMapper};
use classmap_core::migration::{Evolver, SchemaDiff};
use classmap_core::store::{MappingStore, SledStore, SqliteStore, StoreConfig};
use classmap_core::{ImportConfig, SchemaDef, SchemaImporter};
use std::error::Error;
use std::path::Path;
use tracing::info;

/// Text to print and whether the command succeeded.
pub struct Outcome {
    pub output: String,
    pub success: bool,
}

impl Outcome {
    fn ok(output: String) -> Self {
        Self {
            output,
            success: true,
        }
    }
}

/// Execute the parsed command line.
pub fn run(args: Args) -> Result<Outcome, Box<dyn Error>> {
    let Args {
        data,
        backend,
        format,
        command,
    } = args;
    let formatter = create_formatter(format);

    match command {
        Command::Import {
            schema,
            mapping,
            dry_run,
            replace,
        } => {
            let schema = SchemaDef::load(&schema)?;
            let config = import_config(&mapping)?
                .with_dry_run(dry_run)
                .with_allow_replace(replace);
            let mut store = open_store(&data, backend)?;

            info!(schema = %schema.name, version = %schema.version, "importing");
            let result = SchemaImporter::new(config).import(&schema, store.as_mut());
            Ok(Outcome {
                output: formatter.format_import(&result),
                success: result.is_success(),
            })
        }
        Command::Ddl { schema, mapping } => {
            let schema = SchemaDef::load(&schema)?;
            let config = import_config(&mapping)?;
            let mapped = SchemaMapper::new(&schema)
                .with_renames(&config.renames)
                .with_fk_naming(config.fk_naming)
                .with_parallel(config.parallel)
                .map()?;
            let plan = Evolver::new().evolve(&mapped, None)?;
            Ok(Outcome::ok(formatter.format_statements(&plan.statements())))
        }
        Command::Diff { from, to } => {
            let from = SchemaDef::load(&from)?;
            let to = SchemaDef::load(&to)?;
            let diff = SchemaDiff::compute(&from, &to);
            Ok(Outcome::ok(formatter.format_diff(&diff)))
        }
        Command::Show { schema, table } => {
            let store = open_store(&data, backend)?;
            let Some(name) = schema else {
                return Ok(Outcome::ok(formatter.format_schemas(&store.list_schemas()?)));
            };
            let entry = store
                .get_mapping(&name)?
                .ok_or_else(|| format!("schema {name} is not catalogued"))?;
            match table {
                Some(table) => {
                    if entry.get_table(&table).is_none() {
                        return Err(format!("table {table} does not belong to schema {name}").into());
                    }
                    let definition = store
                        .table(&table)?
                        .ok_or_else(|| format!("table {table} not found in store"))?;
                    Ok(Outcome::ok(formatter.format_table(&definition)))
                }
                None => Ok(Outcome::ok(formatter.format_entry(&entry))),
            }
        }
    }
}

fn import_config(args: &MappingArgs) -> Result<ImportConfig, Box<dyn Error>> {
    let renames = match &args.renames {
        Some(path) => serde_json::from_str::<ColumnRenames>(&std::fs::read_to_string(path)?)?,
        None => ColumnRenames::new(),
    };
    let fk_naming = match args.fk_naming {
        FkNaming::Ordinal => ForeignKeyNaming::Ordinal,
        FkNaming::EndpointSuffixed => ForeignKeyNaming::EndpointSuffixed,
    };
    Ok(ImportConfig::default()
        .with_renames(renames)
        .with_fk_naming(fk_naming)
        .with_parallel(!args.sequential))
}

fn open_store(data: &Path, backend: Backend) -> Result<Box<dyn MappingStore>, Box<dyn Error>> {
    Ok(match backend {
        Backend::Sled => Box::new(SledStore::open(&StoreConfig::new(data))?),
        Backend::Sqlite => Box::new(SqliteStore::open(data)?),
    })
}
