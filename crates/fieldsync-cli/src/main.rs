//! Fieldsync admin CLI
//!
//! Migrates the database, seeds checklist templates and inspects the sync
//! engine's stored state.

mod cli;
mod commands;
mod error;
#[cfg(test)]
mod tests;

use clap::Parser;

use crate::cli::{
    Cli, Commands, ConflictCommands, InspectionCommands, OperationCommands, TemplateCommands,
};
use crate::commands::completions::run_completions;
use crate::commands::conflicts::{run_conflicts_list, run_conflicts_resolve};
use crate::commands::inspections::run_inspections_list;
use crate::commands::migrate::run_migrate;
use crate::commands::operations::run_operations_list;
use crate::commands::template::{run_template_add, run_template_list};
use crate::error::CliError;

fn main() {
    if let Err(error) = run() {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("fieldsync_core=warn".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    let db_path = cli.db_path;

    match cli.command {
        Commands::Migrate => run_migrate(&db_path)?,
        Commands::Template { command } => match command {
            TemplateCommands::Add { name, items, json } => {
                run_template_add(&name, &items, json, &db_path)?;
            }
            TemplateCommands::List { limit, json } => run_template_list(limit, json, &db_path)?,
        },
        Commands::Inspections { command } => match command {
            InspectionCommands::List {
                include_deleted,
                inspector,
                limit,
                json,
            } => run_inspections_list(include_deleted, inspector, limit, json, &db_path)?,
        },
        Commands::Conflicts { command } => match command {
            ConflictCommands::List {
                entity_id,
                unresolved,
                limit,
                json,
            } => run_conflicts_list(entity_id.as_deref(), unresolved, limit, json, &db_path)?,
            ConflictCommands::Resolve {
                id,
                strategy,
                as_user,
                json,
            } => run_conflicts_resolve(id, strategy.into(), &as_user, json, &db_path)?,
        },
        Commands::Operations { command } => match command {
            OperationCommands::List { user, limit, json } => {
                run_operations_list(&user, limit, json, &db_path)?;
            }
        },
        Commands::Completions { shell, output } => {
            run_completions(shell, output.as_deref())?;
        }
    }

    Ok(())
}
