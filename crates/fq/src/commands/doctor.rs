//! `fq doctor` -- verify store invariants.

use anyhow::{Result, bail};

use factdb_storage::doctor;

use crate::context::RuntimeContext;

pub fn run(ctx: &RuntimeContext) -> Result<()> {
    let store = ctx.open_store()?;
    let problems = doctor::check(&store)?;

    if ctx.json {
        println!("{}", serde_json::json!({ "problems": problems }));
    } else {
        for problem in &problems {
            println!("problem: {problem}");
        }
        if problems.is_empty() && !ctx.quiet {
            println!("Store is healthy");
        }
    }

    if !problems.is_empty() {
        bail!("{} problem(s) found", problems.len());
    }
    Ok(())
}
