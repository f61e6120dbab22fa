//! `fq init` -- create the `.factdb/` directory and store.

use std::env;

use anyhow::Result;

use factdb_config::config::{load_config, save_config};
use factdb_config::ensure_factdb_dir;
use factdb_storage::SqliteStore;

use crate::cli::InitArgs;
use crate::context::RuntimeContext;

pub fn run(ctx: &RuntimeContext, args: &InitArgs) -> Result<()> {
    let cwd = env::current_dir()?;
    let dir = ensure_factdb_dir(&cwd)?;

    let mut config = load_config(&dir)?;
    if let Some(log) = &args.replication_log {
        config.replication.log = Some(log.clone());
        config.replication.enabled = true;
    }
    save_config(&dir, &config)?;

    let store = SqliteStore::open(config.store_path(&dir), args.salt)?;
    let uuid = store.store_uuid();

    if ctx.json {
        println!(
            "{}",
            serde_json::json!({
                "store": uuid.to_string(),
                "path": config.store_path(&dir).display().to_string(),
            })
        );
    } else if !ctx.quiet {
        println!("Initialised store {uuid} at {}", dir.display());
    }
    Ok(())
}
