use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use fieldsync_core::models::ResolutionStrategy;

#[derive(Parser)]
#[command(name = "fieldsync")]
#[command(about = "Administer the Fieldsync inspection database")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to the database file
    #[arg(
        long,
        global = true,
        value_name = "PATH",
        env = "FIELDSYNC_DATABASE_PATH",
        default_value = "fieldsync.db"
    )]
    pub db_path: PathBuf,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the database if needed and apply pending migrations
    Migrate,
    /// Manage checklist templates
    Template {
        #[command(subcommand)]
        command: TemplateCommands,
    },
    /// Inspect stored inspections
    Inspections {
        #[command(subcommand)]
        command: InspectionCommands,
    },
    /// Review and resolve version conflicts
    Conflicts {
        #[command(subcommand)]
        command: ConflictCommands,
    },
    /// Browse the idempotency ledger
    Operations {
        #[command(subcommand)]
        command: OperationCommands,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
pub enum TemplateCommands {
    /// Add a checklist template
    Add {
        /// Template name
        #[arg(long)]
        name: String,
        /// Checklist items as a JSON array
        #[arg(long, value_name = "JSON")]
        items: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List templates
    List {
        /// Number of templates to show
        #[arg(short, long, default_value = "50")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
pub enum InspectionCommands {
    /// List inspections, newest first
    List {
        /// Include soft-deleted inspections
        #[arg(long)]
        include_deleted: bool,
        /// Only show one inspector's records
        #[arg(long, value_name = "USER_ID")]
        inspector: Option<String>,
        /// Number of inspections to show
        #[arg(short, long, default_value = "50")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
pub enum ConflictCommands {
    /// List detected conflicts, newest first
    List {
        /// Only conflicts for this inspection
        #[arg(long, value_name = "ID")]
        entity_id: Option<String>,
        /// Only unresolved conflicts
        #[arg(long)]
        unresolved: bool,
        /// Number of conflicts to show
        #[arg(short, long, default_value = "50")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Mark a conflict resolved
    Resolve {
        /// Conflict ID
        id: i64,
        /// How the conflict was settled
        #[arg(long, value_enum)]
        strategy: StrategyArg,
        /// User id recorded as the resolver
        #[arg(long, value_name = "USER_ID", default_value = "admin")]
        as_user: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
pub enum OperationCommands {
    /// List a user's processed operations, newest first
    List {
        /// User id whose ledger entries to show
        #[arg(long, value_name = "USER_ID")]
        user: String,
        /// Number of operations to show
        #[arg(short, long, default_value = "50")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum StrategyArg {
    KeepMine,
    KeepTheirs,
    Merge,
}

impl From<StrategyArg> for ResolutionStrategy {
    fn from(value: StrategyArg) -> Self {
        match value {
            StrategyArg::KeepMine => Self::KeepMine,
            StrategyArg::KeepTheirs => Self::KeepTheirs,
            StrategyArg::Merge => Self::Merge,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}
