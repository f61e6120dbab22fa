//! `fq replicate` -- push unreplicated changesets, then pull from sources.

use anyhow::{Context as _, Result};

use crate::context::RuntimeContext;

pub fn run(ctx: &RuntimeContext) -> Result<()> {
    let store = ctx.open_store()?;
    let replicator = ctx
        .open_replicator(store)?
        .context("no replication log configured (set replication.log in .factdb/config.yaml)")?;

    let (pushed, pulled) = replicator.run()?;
    if ctx.json {
        println!("{}", serde_json::json!({ "pushed": pushed, "pulled": pulled }));
    } else if !ctx.quiet {
        println!("Pushed {pushed} changesets, ingested {pulled}");
    }
    Ok(())
}
