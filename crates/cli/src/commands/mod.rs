mod auth;
mod import;
mod query;
mod reset;
mod server;
mod substitute;

use anyhow::Result;

use crate::args::Command;
use crate::context::AppContext;

pub async fn dispatch(ctx: &AppContext, command: Command) -> Result<()> {
    match command {
        Command::Auth(args) => auth::run(ctx, args).await,
        Command::Import(args) => import::run(ctx, args).await,
        Command::Substitute(args) => substitute::run(ctx, args).await,
        Command::Query(query) => query::run(ctx, query).await,
        Command::Reset(args) => reset::run(ctx, args).await,
        Command::Server(args) => server::run(ctx, args).await,
    }
}
