use std::io::BufRead;

use anyhow::{bail, Context, Result};
use common::paths;
use common::AppError;
use gh_broker::BearerToken;
use serde_json::json;
use tracing::info;

use crate::args::AuthArgs;
use crate::context::AppContext;
use crate::output;

pub async fn run(ctx: &AppContext, args: AuthArgs) -> Result<()> {
    let raw = match args.token {
        Some(token) => token,
        None => {
            eprintln!("Paste a GitHub token and press enter:");
            let mut line = String::new();
            std::io::stdin()
                .lock()
                .read_line(&mut line)
                .context("read token from stdin")?;
            line
        }
    };
    let Some(token) = BearerToken::new(raw) else {
        bail!(AppError::invalid("token must not be empty"));
    };

    let path = paths::token_file().ok_or(AppError::MissingConfig("HOME is not set"))?;
    paths::write_private_file(&path, token.secret())
        .with_context(|| format!("write {}", path.display()))?;
    info!(path = %path.display(), "token stored");

    output::emit(ctx.format, &json!({ "token_file": path }))
}
