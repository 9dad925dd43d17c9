use anyhow::Result;
use serde_json::json;

use crate::args::SubstituteArgs;
use crate::context::AppContext;
use crate::output;

pub async fn run(ctx: &AppContext, args: SubstituteArgs) -> Result<()> {
    let store = ctx.open_store().await?;
    let updated = enricher::substitute(&store, &args.kind, &args.old, &args.new).await;
    store.close().await;

    output::emit(
        ctx.format,
        &json!({
            "type": args.kind,
            "old": args.old,
            "new": args.new,
            "updated": updated?,
        }),
    )
}
