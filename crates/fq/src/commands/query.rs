//! `fq q` -- run one query and print the response items.

use anyhow::Result;

use crate::cli::QueryArgs;
use crate::context::RuntimeContext;
use crate::output::print_items;

pub fn run(ctx: &RuntimeContext, args: &QueryArgs) -> Result<()> {
    let query = args.query.join(" ");
    let client = ctx.build_client()?;
    let items = client.query(&query)?;
    print_items(&items, ctx.json);
    Ok(())
}
