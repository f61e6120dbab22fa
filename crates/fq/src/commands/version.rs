//! `fq version` -- print version information.

use anyhow::Result;

use crate::context::RuntimeContext;

pub fn run(ctx: &RuntimeContext) -> Result<()> {
    if ctx.json {
        println!(
            "{}",
            serde_json::json!({ "version": env!("CARGO_PKG_VERSION") })
        );
    } else {
        println!("fq {}", env!("CARGO_PKG_VERSION"));
    }
    Ok(())
}
