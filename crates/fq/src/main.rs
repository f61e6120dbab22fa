//! `fq` -- append-only fact database CLI.
//!
//! Parses CLI arguments with clap, resolves the runtime context, and
//! dispatches to command handlers. The core lives in the factdb-* crates;
//! this binary is one embedding of it.

mod cli;
mod commands;
mod context;
mod output;

use clap::Parser;

use cli::{Cli, Commands};
use context::RuntimeContext;

fn main() {
    let cli = Cli::parse();

    // Set up logging based on verbosity before touching the store.
    if cli.global.verbose {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_env("FACTDB_LOG")
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
            )
            .with_writer(std::io::stderr)
            .init();
    }

    let ctx = match RuntimeContext::from_global_args(&cli.global) {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Some(Commands::Init(args)) => commands::init::run(&ctx, &args),
        Some(Commands::Q(args)) => commands::query::run(&ctx, &args),
        Some(Commands::Replicate) => commands::replicate::run(&ctx),
        Some(Commands::Doctor) => commands::doctor::run(&ctx),
        Some(Commands::Version) => commands::version::run(&ctx),
        None => {
            use clap::CommandFactory;
            Cli::command().print_help().ok();
            println!();
            Ok(())
        }
    };

    if let Err(e) = result {
        if cli.global.json {
            let err_json = serde_json::json!({
                "error": format!("{e:#}"),
            });
            if let Ok(s) = serde_json::to_string_pretty(&err_json) {
                eprintln!("{s}");
            }
        } else {
            eprintln!("Error: {e:#}");
        }
        std::process::exit(1);
    }
}
