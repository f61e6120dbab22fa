//! Command-line interface definition for `fq`.

use clap::{Args, Parser, Subcommand};

/// A personal, append-only fact database with a tagged query language.
#[derive(Debug, Parser)]
#[command(name = "fq", version, about)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Flags shared by every subcommand.
#[derive(Debug, Args)]
pub struct GlobalArgs {
    /// Store database file (overrides .factdb discovery).
    #[arg(long, global = true)]
    pub db: Option<String>,

    /// Client name stamped on changesets.
    #[arg(long, global = true)]
    pub client: Option<String>,

    /// User name stamped on changesets.
    #[arg(long, global = true, env = "FACTDB_USER")]
    pub user: Option<String>,

    /// Output JSON instead of human-readable text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Verbose logging to stderr.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output.
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Create a .factdb directory and store in the current directory.
    Init(InitArgs),

    /// Run a query against the store.
    Q(QueryArgs),

    /// Push unreplicated changesets and pull from configured sources.
    Replicate,

    /// Check store invariants and report inconsistencies.
    Doctor,

    /// Print version information.
    Version,
}

#[derive(Debug, Args)]
pub struct InitArgs {
    /// Store identity; generated when omitted. Only a fresh store takes it.
    #[arg(long)]
    pub salt: Option<uuid::Uuid>,

    /// Shared replication log path to configure.
    #[arg(long)]
    pub replication_log: Option<String>,
}

#[derive(Debug, Args)]
pub struct QueryArgs {
    /// The query text (joined with spaces when given as multiple words).
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
    pub query: Vec<String>,
}
