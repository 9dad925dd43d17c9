use std::io::{BufRead, Write};

use anyhow::{bail, Context, Result};
use serde_json::json;

use crate::args::ResetArgs;
use crate::context::AppContext;
use crate::output;

fn confirmed(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

fn prompt(path: &std::path::Path) -> Result<bool> {
    let mut stderr = std::io::stderr().lock();
    write!(stderr, "Delete {} and every imported record? [y/N] ", path.display())?;
    stderr.flush()?;

    let mut answer = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut answer)
        .context("read confirmation")?;
    Ok(confirmed(&answer))
}

pub async fn run(ctx: &AppContext, args: ResetArgs) -> Result<()> {
    if !args.yes && !prompt(&ctx.db_path)? {
        bail!("reset aborted");
    }

    let store = ctx.open_store().await?;
    let store = store.reset().await.context("reset store")?;
    store.close().await;

    output::emit(ctx.format, &json!({ "reset": ctx.db_path }))
}
